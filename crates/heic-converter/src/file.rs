use bytes::Bytes;

/// アップロードパーサーが生成するファイル。
///
/// 変換後も同じ形のまま後段のハンドラーに渡される。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadedFile {
    /// multipart のフィールド名
    pub field_name: Option<String>,
    /// クライアントが送ってきたファイル名
    pub original_name: Option<String>,
    /// Content-Transfer-Encoding など、パーサーが付与したエンコーディング
    pub encoding: Option<String>,
    /// クライアントが申告した MIME タイプ (正しいとは限らない)
    pub mime_type: Option<String>,
    /// ファイル本体
    pub buffer: Bytes,
    /// バイト数
    pub size: Option<usize>,
}

impl UploadedFile {
    /// バッファからファイルを作成する。`size` はバッファ長から設定される。
    pub fn new(buffer: impl Into<Bytes>) -> Self {
        let buffer = buffer.into();
        Self {
            size: Some(buffer.len()),
            buffer,
            ..Default::default()
        }
    }

    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = Some(name.into());
        self
    }

    pub fn with_original_name(mut self, name: impl Into<String>) -> Self {
        self.original_name = Some(name.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// ファイルサイズを返す。`size` が無ければバッファ長を使う。
    pub fn len(&self) -> usize {
        self.size.unwrap_or(self.buffer.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 変換対象になり得る中身を持っているかどうか。
    pub fn has_content(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// ログ用の表示名。
    pub fn display_name(&self) -> &str {
        self.original_name.as_deref().unwrap_or("<unnamed>")
    }

    /// ログ用の MIME タイプ表示。
    pub fn display_mime_type(&self) -> &str {
        self.mime_type.as_deref().unwrap_or("<unknown>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_falls_back_to_buffer_length() {
        let mut file = UploadedFile::new(vec![1u8, 2, 3]);
        assert_eq!(file.len(), 3);

        file.size = None;
        assert_eq!(file.len(), 3);

        file.size = Some(10);
        assert_eq!(file.len(), 10);
    }

    #[test]
    fn empty_buffer_has_no_content() {
        let file = UploadedFile::default();
        assert!(!file.has_content());
        assert!(file.is_empty());
        assert_eq!(file.display_name(), "<unnamed>");
    }
}
