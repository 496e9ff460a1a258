use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

/// 変換後の出力フォーマット。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    pub fn name(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }

    /// 先頭のドットを含む拡張子。
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => ".jpg",
            Self::Png => ".png",
            Self::Webp => ".webp",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            _ => Err(ConvertError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// フォーマット名から拡張子を求める。未知の名前や未指定の場合は `.jpg`。
pub fn output_extension(format: Option<&str>) -> &'static str {
    lookup(format).extension()
}

/// フォーマット名から MIME タイプを求める。未知の名前や未指定の場合は `image/jpeg`。
pub fn output_mime_type(format: Option<&str>) -> &'static str {
    lookup(format).mime_type()
}

fn lookup(format: Option<&str>) -> OutputFormat {
    format.and_then(|f| f.parse().ok()).unwrap_or_default()
}
