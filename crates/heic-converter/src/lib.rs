//! HEIC/HEIF 画像を JPEG / PNG / WebP に変換するライブラリ。
//!
//! Unix 環境では libheif-rs (embedded-libheif) のデコーダーフックを登録して変換を行う。
//! それ以外の環境では HEIF のデコードは無効化され、変換はエラーになる。

mod convert;
mod detect;
mod error;
mod file;
mod format;
mod stats;
mod support;

pub use convert::{
    ConversionMetrics, ConversionOptions, ConversionResult, ConvertedFile, DEFAULT_QUALITY,
    MAX_QUALITY, MIN_QUALITY, convert_heic_buffer, convert_heic_file, validate_heic_file,
};
pub use detect::{
    HEIC_MIME_TYPES, HeicDetector, generate_converted_filename, is_heic_file,
    looks_client_converted,
};
pub use error::{CodecError, ConvertError, Result, ValidationError};
pub use file::UploadedFile;
pub use format::{OutputFormat, output_extension, output_mime_type};
pub use stats::{ConversionStats, ServerLoad, StatsSnapshot};
pub use support::{FormatSupport, SupportReport, probe_support};
