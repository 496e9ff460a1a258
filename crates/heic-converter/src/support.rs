use image::{DynamicImage, RgbImage};
use serde::Serialize;

use crate::convert::encode;
use crate::error::Result;
use crate::format::OutputFormat;

/// 変換機能の対応状況。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportReport {
    pub supported: bool,
    pub converter_version: &'static str,
    /// リンクされている libheif のバージョン。HEIF デコードが組み込まれていなければ `None`
    pub libheif_version: Option<String>,
    /// 優先度が最も高い HEVC デコーダーの名前
    pub decoder: Option<String>,
    pub formats: FormatSupport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatSupport {
    pub heif: bool,
    pub jpeg: bool,
    pub png: bool,
    pub webp: bool,
}

/// 実行時に libheif から取得した情報。
#[cfg_attr(not(unix), allow(dead_code))]
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeifRuntime {
    version: String,
    hevc_decoders: Vec<String>,
}

#[cfg(unix)]
fn libheif_runtime() -> Result<Option<HeifRuntime>> {
    use libheif_rs::{CompressionFormat, LibHeif};

    let lib = LibHeif::new_checked()
        .map_err(|e| crate::error::ConvertError::Decoder(e.to_string()))?;
    let [major, minor, patch] = lib.version();
    let hevc_decoders = lib
        .decoder_descriptors(8, Some(CompressionFormat::Hevc))
        .into_iter()
        .map(|d| d.name())
        .collect();

    Ok(Some(HeifRuntime {
        version: format!("{major}.{minor}.{patch}"),
        hevc_decoders,
    }))
}

#[cfg(not(unix))]
fn libheif_runtime() -> Result<Option<HeifRuntime>> {
    Ok(None)
}

/// 実行環境で HEIF 入力と各出力フォーマットが使えるかを調べる。
///
/// HEIF は libheif に問い合わせ、HEVC デコーダーが登録されているかで判定する。
/// 出力フォーマットは 1x1 の画像を実際にエンコードして確認する。
/// libheif の初期化に失敗した場合はエラーを返す。
pub fn probe_support() -> Result<SupportReport> {
    let heif = libheif_runtime()?;

    let sample = DynamicImage::ImageRgb8(RgbImage::new(1, 1));
    let can_encode = |format| match encode(&sample, format, 80) {
        Ok(data) => !data.is_empty(),
        Err(e) => {
            tracing::warn!(%format, error = %e, "Output format is unavailable");
            false
        }
    };

    let formats = FormatSupport {
        heif: heif.as_ref().is_some_and(|h| !h.hevc_decoders.is_empty()),
        jpeg: can_encode(OutputFormat::Jpeg),
        png: can_encode(OutputFormat::Png),
        webp: can_encode(OutputFormat::Webp),
    };

    tracing::debug!(
        libheif = heif.as_ref().map(|h| h.version.as_str()),
        heif = formats.heif,
        "Checked conversion support"
    );

    Ok(SupportReport {
        supported: formats.heif,
        converter_version: env!("CARGO_PKG_VERSION"),
        decoder: heif
            .as_ref()
            .and_then(|h| h.hevc_decoders.first().cloned()),
        libheif_version: heif.map(|h| h.version),
        formats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_formats_are_available() {
        let report = probe_support().unwrap();
        assert!(report.formats.jpeg);
        assert!(report.formats.png);
        assert!(report.formats.webp);
        assert_eq!(report.supported, report.formats.heif);
        assert_eq!(report.decoder.is_some(), report.formats.heif);
    }

    #[cfg(unix)]
    #[test]
    fn libheif_version_is_reported() {
        let report = probe_support().unwrap();
        let version = report.libheif_version.clone().expect("libheif version missing");

        let parts: Vec<_> = version.split('.').collect();
        assert_eq!(parts.len(), 3, "{version}");
        assert!(parts.iter().all(|p| p.parse::<u8>().is_ok()), "{version}");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["libheifVersion"], version);
        assert_eq!(json["supported"], json["formats"]["heif"]);
    }

    #[cfg(not(unix))]
    #[test]
    fn heif_is_unsupported_without_libheif() {
        let report = probe_support().unwrap();
        assert!(!report.supported);
        assert!(report.libheif_version.is_none());
    }
}
