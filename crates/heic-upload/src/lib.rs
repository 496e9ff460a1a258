//! アップロードされた HEIC/HEIF 画像を、業務ハンドラーに渡る前に変換する axum 向けのミドルウェア。
//!
//! リクエストは `parse_uploads` (multipart の解析) → `heic_middleware` (検出と変換)
//! → 業務ハンドラーの順に処理される。変換専用のエンドポイント、対応状況の確認、
//! 統計の取得は `heic_router` でまとめて提供する。

mod config;
mod error;
mod middleware;
mod observer;
mod routes;
mod upload;

pub use config::HeicConfig;
pub use error::{ApiError, ErrorBody, ErrorCode, FailureKind, HeicError, UploadError};
pub use middleware::{HeicMiddleware, HeicMiddlewareBuilder, convert_uploads, heic_middleware};
pub use observer::ConversionObserver;
pub use routes::{STATS_HEADER, convert_route, heic_router, stats_route, support_route};
pub use upload::{
    DEFAULT_MAX_REQUEST_SIZE, FieldFiles, FormFields, ParsedUpload, UploadLayout, UploadParser,
    UploadShape, parse_uploads,
};
