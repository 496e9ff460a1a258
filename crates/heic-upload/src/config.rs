use heic_converter::{DEFAULT_QUALITY, HEIC_MIME_TYPES, OutputFormat};
use serde::{Deserialize, Serialize};

/// 変換ミドルウェアの設定。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HeicConfig {
    /// 出力品質 (1-100)
    pub quality: i32,
    /// 変換を受け付ける最大ファイルサイズ (バイト)
    pub max_size: usize,
    /// HEIC として扱う MIME タイプ
    pub allowed_mime_types: Vec<String>,
    /// クライアント側で変換済みと思われるファイルをスキップする
    pub skip_client_converted: bool,
    pub output_format: OutputFormat,
    /// 変換統計を記録する
    pub enable_stats: bool,
    /// エラーレスポンスに詳細を含める (開発環境向け)
    pub expose_error_details: bool,
}

impl Default for HeicConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            max_size: 20 * 1024 * 1024,
            allowed_mime_types: HEIC_MIME_TYPES.iter().map(|m| m.to_string()).collect(),
            skip_client_converted: false,
            output_format: OutputFormat::Jpeg,
            enable_stats: true,
            expose_error_details: false,
        }
    }
}
