use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use heic_converter::{ConvertError, ValidationError};
use serde::Serialize;
use thiserror::Error;

/// エラーレスポンスの機械可読なコード。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    HeicProcessingFailed,
    NoFileProvided,
    InvalidFile,
    ConversionFailed,
    InvalidUpload,
    SupportCheckFailed,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            Self::HeicProcessingFailed | Self::ConversionFailed => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NoFileProvided | Self::InvalidFile | Self::InvalidUpload => {
                StatusCode::BAD_REQUEST
            }
            Self::SupportCheckFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// エラーレスポンスの本文。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub error: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// JSON で返すエラー。
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// `expose` が真のときだけ詳細を付ける。
    pub fn with_details(mut self, details: impl Into<String>, expose: bool) -> Self {
        if expose {
            self.details = Some(details.into());
        }
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            message: self.message,
            error: self.code,
            details: self.details,
        };
        (self.code.status(), Json(body)).into_response()
    }
}

/// multipart の解析エラー。
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Invalid multipart boundary: {0}")]
    Boundary(#[source] multer::Error),

    #[error("Failed to read multipart body: {0}")]
    Read(#[from] multer::Error),
}

/// 変換対象と判定されたファイルの処理に失敗した理由。
#[derive(Debug, Error)]
pub enum FailureKind {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Conversion(#[from] ConvertError),

    #[error("Conversion task failed: {0}")]
    Task(String),
}

/// ミドルウェアでのファイル処理の失敗。
///
/// 統計に失敗を記録するため、元のサイズと経過時間を保持する。
#[derive(Debug, Error)]
#[error("Failed to process {file_name}: {source}")]
pub struct HeicError {
    pub file_name: String,
    pub original_size: usize,
    pub elapsed: Duration,
    #[source]
    pub source: FailureKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            ErrorCode::HeicProcessingFailed.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ErrorCode::ConversionFailed.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ErrorCode::NoFileProvided.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::InvalidFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorCode::SupportCheckFailed.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn body_omits_details_unless_exposed() {
        let hidden = ApiError::new(ErrorCode::ConversionFailed, "failed")
            .with_details("decoder exploded", false);
        let body = serde_json::to_value(ErrorBody {
            success: false,
            message: hidden.message,
            error: hidden.code,
            details: hidden.details,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "success": false,
                "message": "failed",
                "error": "CONVERSION_FAILED"
            })
        );

        let shown = ApiError::new(ErrorCode::ConversionFailed, "failed")
            .with_details("decoder exploded", true);
        assert_eq!(shown.details.as_deref(), Some("decoder exploded"));
    }
}
