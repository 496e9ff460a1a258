//! 変換専用エンドポイント、対応状況の確認、統計の取得。

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use heic_converter::{
    ConversionMetrics, ConvertedFile, ServerLoad, StatsSnapshot, probe_support,
};
use serde::Serialize;
use serde_json::json;

use crate::error::{ApiError, ErrorCode};
use crate::middleware::HeicMiddleware;
use crate::upload::{FormFields, UploadParser, UploadShape, parse_uploads};

/// 変換結果の統計を JSON で載せるレスポンスヘッダー。
pub const STATS_HEADER: &str = "x-conversion-stats";

const CONVERSION_FAILED_MESSAGE: &str = "Failed to convert HEIC image";

/// `/convert` `/support` `/stats` をまとめたルーター。
///
/// `/convert` は `image` フィールドの単一ファイルを受け取る。
pub fn heic_router(heic: Arc<HeicMiddleware>, max_request_size: u64) -> Router {
    let parser = Arc::new(
        UploadParser::single("image")
            .with_max_request_size(max_request_size)
            .with_error_details(heic.config().expose_error_details),
    );

    Router::new()
        .route(
            "/convert",
            post(convert_route).layer(axum::middleware::from_fn_with_state(parser, parse_uploads)),
        )
        .route("/support", get(support_route))
        .route("/stats", get(stats_route))
        .with_state(heic)
}

/// アップロードされた HEIC を変換し、変換後の画像をそのまま返す。
///
/// 本文の `quality` と `format` で設定を上書きできる。
pub async fn convert_route(State(heic): State<Arc<HeicMiddleware>>, request: Request) -> Response {
    let extensions = request.extensions();
    let Some(file) = extensions.get::<UploadShape>().and_then(UploadShape::first) else {
        return ApiError::new(ErrorCode::NoFileProvided, "No file provided").into_response();
    };
    let fields = extensions.get::<FormFields>().cloned().unwrap_or_default();
    let config = heic.config();

    let quality = fields
        .get("quality")
        .and_then(|q| q.trim().parse::<i32>().ok());
    let format = fields.get("format");

    if let Err(e) = heic.detector().validate(Some(file), config.max_size) {
        tracing::info!(file = %file.display_name(), reason = %e, "Rejected conversion request");
        return ApiError::new(ErrorCode::InvalidFile, e.to_string()).into_response();
    }

    let started = Instant::now();
    // 本文で指定されなかった項目はミドルウェアの設定に従う
    let result = match heic.conversion_options().with_overrides(format, quality) {
        Ok(options) => heic
            .convert_blocking(file, options)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    let response = result.and_then(|converted| {
        let response = binary_response(&converted).map_err(|e| e.to_string())?;
        Ok((converted.metrics, response))
    });

    match response {
        Ok((metrics, response)) => {
            tracing::info!(
                file = %file.display_name(),
                original_size = metrics.original_size,
                converted_size = metrics.converted_size,
                elapsed_ms = metrics.conversion_time_ms(),
                "Converted upload"
            );
            if config.enable_stats {
                heic.stats().add_conversion(
                    metrics.original_size,
                    metrics.converted_size,
                    metrics.conversion_time,
                    true,
                );
            }
            response
        }
        Err(message) => {
            tracing::error!(file = %file.display_name(), error = %message, "Conversion request failed");
            if config.enable_stats {
                heic.stats()
                    .add_conversion(file.len(), 0, started.elapsed(), false);
            }
            ApiError::new(ErrorCode::ConversionFailed, CONVERSION_FAILED_MESSAGE)
                .with_details(message, config.expose_error_details)
                .into_response()
        }
    }
}

fn binary_response(converted: &ConvertedFile) -> Result<Response, axum::http::Error> {
    let file = &converted.file;
    let content_type = file.mime_type.as_deref().unwrap_or("application/octet-stream");
    let disposition = format!(
        "attachment; filename=\"{}\"",
        header_safe_filename(file.display_name())
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, file.buffer.len())
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(STATS_HEADER, stats_header(&converted.metrics))
        .body(Body::from(file.buffer.clone()))
}

fn stats_header(metrics: &ConversionMetrics) -> String {
    json!({
        "originalSize": metrics.original_size,
        "convertedSize": metrics.converted_size,
        "conversionTime": metrics.conversion_time_ms(),
        "compressionRatio": metrics.compression_ratio(),
    })
    .to_string()
}

/// ヘッダーに載せられない文字を `_` に置き換える。
fn header_safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// HEIF 入力と各出力フォーマットの対応状況を返す。
///
/// libheif の初期化に失敗した場合は 500 `SUPPORT_CHECK_FAILED`。
pub async fn support_route(State(heic): State<Arc<HeicMiddleware>>) -> Response {
    let message = match tokio::task::spawn_blocking(probe_support).await {
        Ok(Ok(report)) => return Json(report).into_response(),
        Ok(Err(e)) => e.to_string(),
        Err(e) => e.to_string(),
    };

    tracing::error!(error = %message, "Failed to check HEIC support");
    support_check_failed(message, heic.config().expose_error_details)
}

fn support_check_failed(message: String, expose_details: bool) -> Response {
    let mut body = json!({
        "supported": false,
        "error": ErrorCode::SupportCheckFailed,
        "message": "Failed to check HEIC support",
    });
    if expose_details {
        body["details"] = message.into();
    }
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(flatten)]
    snapshot: StatsSnapshot,
    /// プロセス起動からの変換回数 (暦日ではない)
    conversions_today: u64,
    server_load: ServerLoad,
    stats_enabled: bool,
}

/// 変換統計を返す。
pub async fn stats_route(State(heic): State<Arc<HeicMiddleware>>) -> Json<impl Serialize> {
    let snapshot = heic.stats().snapshot();

    Json(StatsResponse {
        conversions_today: snapshot.conversions,
        server_load: ServerLoad::classify(&snapshot),
        stats_enabled: heic.config().enable_stats,
        snapshot,
    })
}
