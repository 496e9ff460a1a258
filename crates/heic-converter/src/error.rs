use thiserror::Error;

use crate::format::OutputFormat;

/// 変換処理で発生するエラー。
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("No file buffer provided")]
    MissingBuffer,

    #[error("File is not a HEIC/HEIF image: {name} ({mime_type})")]
    NotHeic { name: String, mime_type: String },

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("HEIC conversion failed: {0}")]
    Conversion(#[source] CodecError),

    #[error("Failed to initialize HEIF decoder: {0}")]
    Decoder(String),
}

/// デコード・エンコード処理そのものの失敗。
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to create image reader: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode image as {format}: {source}")]
    Encode {
        format: OutputFormat,
        #[source]
        source: image::ImageError,
    },

    /// libwebp のエラーコード (`VP8_ENC_ERROR_*`)
    #[error("Failed to encode image as webp: {0}")]
    WebP(String),
}

pub type Result<T> = std::result::Result<T, ConvertError>;

/// 変換前の事前検証で検出されるエラー。
///
/// メッセージはそのままユーザーに表示される。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No file provided")]
    NoFile,

    #[error("File buffer is empty")]
    EmptyBuffer,

    #[error("File size exceeds maximum allowed size of {limit_mb}MB")]
    TooLarge { size: usize, limit_mb: u64 },

    #[error("File is not a HEIC/HEIF image")]
    NotHeic,
}
