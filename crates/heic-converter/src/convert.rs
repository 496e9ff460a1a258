//! HEIC/HEIF のデコードと、指定フォーマットへの再エンコード。

use std::io::Cursor;
use std::time::{Duration, Instant};

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader};
use serde::{Serialize, Serializer};

use crate::detect::{HeicDetector, generate_converted_filename};
use crate::error::{CodecError, ConvertError, Result, ValidationError};
use crate::file::UploadedFile;
use crate::format::OutputFormat;

pub const DEFAULT_QUALITY: i32 = 85;
/// 品質の下限。これより低いと実用に耐えない画質になる。
pub const MIN_QUALITY: u8 = 10;
pub const MAX_QUALITY: u8 = 100;

const MIB: f64 = 1024.0 * 1024.0;

/// 変換オプション。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionOptions {
    pub format: OutputFormat,
    /// 要求された品質。範囲外の値も受け付け、エンコード時に丸める。
    pub quality: i32,
    /// プログレッシブ出力の要求 (jpeg/png)
    pub progressive: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            quality: DEFAULT_QUALITY,
            progressive: true,
        }
    }
}

impl ConversionOptions {
    /// リクエストから受け取った文字列のフォーマット名でオプションを作成する。
    ///
    /// 未知のフォーマット名はデコード前にエラーになる。
    pub fn from_request(format: Option<&str>, quality: Option<i32>) -> Result<Self> {
        Self::default().with_overrides(format, quality)
    }

    /// 指定された項目だけを上書きする。指定がなければ `self` の値を使う。
    pub fn with_overrides(self, format: Option<&str>, quality: Option<i32>) -> Result<Self> {
        let format = match format {
            Some(name) => name.parse()?,
            None => self.format,
        };
        Ok(Self {
            format,
            quality: quality.unwrap_or(self.quality),
            ..self
        })
    }

    /// エンコーダーに渡す品質 (`MIN_QUALITY..=MAX_QUALITY`)。
    pub fn effective_quality(&self) -> u8 {
        self.quality
            .clamp(i32::from(MIN_QUALITY), i32::from(MAX_QUALITY)) as u8
    }
}

/// 1 回の変換の計測結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionMetrics {
    pub original_size: usize,
    pub converted_size: usize,
    #[serde(serialize_with = "serialize_millis")]
    pub conversion_time: Duration,
    pub format: OutputFormat,
}

impl ConversionMetrics {
    /// 削減率 (%)。小数点以下 1 桁に丸める。
    pub fn compression_ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        let ratio = (1.0 - self.converted_size as f64 / self.original_size as f64) * 100.0;
        (ratio * 10.0).round() / 10.0
    }

    pub fn conversion_time_ms(&self) -> u64 {
        self.conversion_time.as_millis() as u64
    }
}

fn serialize_millis<S: Serializer>(value: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

/// バッファ変換の結果。
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub buffer: Bytes,
    pub metrics: ConversionMetrics,
}

/// ファイル変換の結果。
#[derive(Debug, Clone)]
pub struct ConvertedFile {
    pub file: UploadedFile,
    pub metrics: ConversionMetrics,
}

/// HEIC/HEIF のバッファを指定フォーマットに変換する。
///
/// 入力フォーマットはバッファのヘッダーから自動判別される。
pub fn convert_heic_buffer(buffer: &[u8], options: &ConversionOptions) -> Result<ConversionResult> {
    if buffer.is_empty() {
        return Err(ConvertError::MissingBuffer);
    }

    let quality = options.effective_quality();
    let started = Instant::now();

    let encoded = decode(buffer).and_then(|img| encode(&img, options.format, quality));

    let elapsed = started.elapsed();

    match encoded {
        Ok(data) => {
            tracing::debug!(
                format = %options.format,
                quality,
                progressive = options.progressive,
                input_size = buffer.len(),
                output_size = data.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "HEIC conversion succeeded"
            );

            let metrics = ConversionMetrics {
                original_size: buffer.len(),
                converted_size: data.len(),
                conversion_time: elapsed,
                format: options.format,
            };
            Ok(ConversionResult {
                buffer: Bytes::from(data),
                metrics,
            })
        }
        Err(e) => {
            tracing::error!(
                format = %options.format,
                quality,
                input_size = buffer.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "HEIC conversion failed"
            );
            Err(ConvertError::Conversion(e))
        }
    }
}

/// デフォルトの判定条件で HEIC ファイルを変換する。
pub fn convert_heic_file(file: &UploadedFile, options: &ConversionOptions) -> Result<ConvertedFile> {
    HeicDetector::default().convert_file(file, options)
}

/// デフォルトの判定条件でファイルを事前検証する。
pub fn validate_heic_file(
    file: Option<&UploadedFile>,
    max_size: usize,
) -> std::result::Result<(), ValidationError> {
    HeicDetector::default().validate(file, max_size)
}

impl HeicDetector {
    /// HEIC ファイルを変換し、新しいファイルを返す。
    ///
    /// フィールド名やエンコーディングなど、変換に関係しない項目は元のファイルから引き継ぐ。
    pub fn convert_file(
        &self,
        file: &UploadedFile,
        options: &ConversionOptions,
    ) -> Result<ConvertedFile> {
        if !file.has_content() {
            return Err(ConvertError::MissingBuffer);
        }
        if !self.is_heic(file) {
            return Err(ConvertError::NotHeic {
                name: file.display_name().to_string(),
                mime_type: file.display_mime_type().to_string(),
            });
        }

        let result = convert_heic_buffer(&file.buffer, options)?;

        let converted = UploadedFile {
            mime_type: Some(options.format.mime_type().to_string()),
            original_name: Some(generate_converted_filename(
                file.original_name.as_deref(),
                options.format,
            )),
            size: Some(result.buffer.len()),
            buffer: result.buffer,
            ..file.clone()
        };

        Ok(ConvertedFile {
            file: converted,
            metrics: result.metrics,
        })
    }

    /// 変換前の事前検証を行う。最初に失敗した項目のエラーを返す。
    pub fn validate(
        &self,
        file: Option<&UploadedFile>,
        max_size: usize,
    ) -> std::result::Result<(), ValidationError> {
        let file = file.ok_or(ValidationError::NoFile)?;

        if !file.has_content() {
            return Err(ValidationError::EmptyBuffer);
        }

        let size = file.len();
        if size > max_size {
            return Err(ValidationError::TooLarge {
                size,
                limit_mb: (max_size as f64 / MIB).round() as u64,
            });
        }

        if !self.is_heic(file) {
            return Err(ValidationError::NotHeic);
        }

        Ok(())
    }
}

#[cfg(unix)]
fn register_heif_hooks() {
    use std::sync::Once;

    static HOOKS: Once = Once::new();
    HOOKS.call_once(|| {
        libheif_rs::integration::image::register_all_decoding_hooks();
    });
}

#[cfg(not(unix))]
fn register_heif_hooks() {}

pub(crate) fn decode(data: &[u8]) -> std::result::Result<DynamicImage, CodecError> {
    register_heif_hooks();

    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(CodecError::Read)?
        .decode()
        .map_err(CodecError::Decode)
}

pub(crate) fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: u8,
) -> std::result::Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    let encode_error = |source: image::ImageError| CodecError::Encode { format, source };

    match format {
        OutputFormat::Jpeg => {
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut out, quality)
                .write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )
                .map_err(encode_error)?;
        }
        OutputFormat::Png => {
            // CompressionType::Default は zlib のレベル 6
            let rgba = img.to_rgba8();
            PngEncoder::new_with_quality(&mut out, CompressionType::Default, FilterType::Adaptive)
                .write_image(
                    rgba.as_raw(),
                    rgba.width(),
                    rgba.height(),
                    ExtendedColorType::Rgba8,
                )
                .map_err(encode_error)?;
        }
        OutputFormat::Webp => {
            // libwebp のデフォルト method (4) を使う
            let rgba = img.to_rgba8();
            // `encode` / `encode_simple` は失敗時に panic するので `encode_advanced` を使う
            let mut config = webp::WebPConfig::new()
                .map_err(|()| CodecError::WebP("invalid libwebp config".to_string()))?;
            config.quality = f32::from(quality);
            config.alpha_compression = 1;

            let encoded = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
                .encode_advanced(&config)
                .map_err(|e| CodecError::WebP(format!("{e:?}")))?;
            out.extend_from_slice(&encoded);
        }
    }

    Ok(out)
}
