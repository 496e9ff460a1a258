use std::sync::Arc;

use anyhow::{Context as _, Result};
use axum::Router;
use axum::routing::post;
use heic_upload::{HeicMiddleware, UploadParser, convert_uploads, heic_router};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Config;
use crate::uploads::receive_uploads;

/// HEIC 関連のエンドポイントとアップロード受付をまとめたルーター。
pub fn router(heic: Arc<HeicMiddleware>, max_request_size: u64) -> Router {
    let uploads = |parser: UploadParser| {
        convert_uploads(
            post(receive_uploads),
            parser.with_max_request_size(max_request_size),
            Arc::clone(&heic),
        )
    };

    Router::new()
        .route("/api/uploads", uploads(UploadParser::fields()))
        .route("/api/uploads/image", uploads(UploadParser::single("image")))
        .route("/api/uploads/images", uploads(UploadParser::array("images")))
        .nest("/api/heic", heic_router(Arc::clone(&heic), max_request_size))
}

/// Ctrl-C を受け取るまでサーバーを動かす。
pub async fn serve(config: &Config, heic: Arc<HeicMiddleware>) -> Result<()> {
    let app = router(heic, config.upload.max_request_size);

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                config.server.host, config.server.port
            )
        })?;
    info!(
        addr = %listener.local_addr().context("Failed to read local address")?,
        environment = %config.server.environment,
        "Listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        return;
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use heic_upload::HeicConfig;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    const BOUNDARY: &str = "heicd-boundary";

    fn app() -> Router {
        let heic = Arc::new(HeicMiddleware::builder(HeicConfig::default()).build());
        router(heic, 1024 * 1024)
    }

    fn multipart(uri: &str, parts: &[(&str, &str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (field, name, mime_type) in parts {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\nContent-Type: {mime_type}\r\n\r\ndata\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn array_uploads_are_summarised() {
        let request = multipart(
            "/api/uploads/images",
            &[
                ("images", "a.jpg", "image/jpeg"),
                ("images", "b.png", "image/png"),
                ("other", "c.jpg", "image/jpeg"),
            ],
        );

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 2);
        assert_eq!(
            body["files"][1],
            json!({"field": "images", "name": "b.png", "mimeType": "image/png", "size": 4})
        );
    }

    #[tokio::test]
    async fn field_uploads_accept_any_field() {
        let request = multipart(
            "/api/uploads",
            &[("front", "f.jpg", "image/jpeg"), ("back", "b.jpg", "image/jpeg")],
        );

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["count"], 2);
    }

    #[tokio::test]
    async fn single_upload_without_file_is_rejected() {
        let request = multipart("/api/uploads/image", &[("photo", "a.jpg", "image/jpeg")]);

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "NO_FILE_PROVIDED");
    }

    #[tokio::test]
    async fn heic_routes_are_nested() {
        let request = Request::builder()
            .uri("/api/heic/stats")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["conversions"], 0);
    }
}
