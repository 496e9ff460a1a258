//! HEIC 変換ミドルウェアの後段に置くアップロード受付ハンドラー。

use axum::Json;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use heic_converter::UploadedFile;
use heic_upload::{ApiError, ErrorCode, UploadShape};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileSummary {
    field: Option<String>,
    name: Option<String>,
    mime_type: Option<String>,
    size: usize,
}

impl From<&UploadedFile> for FileSummary {
    fn from(file: &UploadedFile) -> Self {
        Self {
            field: file.field_name.clone(),
            name: file.original_name.clone(),
            mime_type: file.mime_type.clone(),
            size: file.len(),
        }
    }
}

#[derive(Debug, Serialize)]
struct UploadSummary {
    success: bool,
    count: usize,
    files: Vec<FileSummary>,
}

/// 受け取ったファイルの一覧を返す。
///
/// HEIC はミドルウェアで変換済みなので、ここに届くのは変換後のファイル。
pub async fn receive_uploads(request: Request) -> Response {
    let Some(shape) = request.extensions().get::<UploadShape>() else {
        return ApiError::new(ErrorCode::NoFileProvided, "No file provided").into_response();
    };

    let files: Vec<FileSummary> = shape.files().into_iter().map(FileSummary::from).collect();
    info!(
        path = %request.uri().path(),
        count = files.len(),
        "Received uploads"
    );

    Json(UploadSummary {
        success: true,
        count: files.len(),
        files,
    })
    .into_response()
}
