use crate::file::UploadedFile;
use crate::format::OutputFormat;

/// HEIC/HEIF として扱う MIME タイプ。
pub const HEIC_MIME_TYPES: &[&str] = &["image/heic", "image/heif", "image/x-heic", "image/x-heif"];

const HEIC_EXTENSIONS: &[&str] = &[".heic", ".heif"];

/// ファイルが HEIC/HEIF かどうかを判定する。
///
/// MIME タイプの判定を優先し、一致しなければファイル名の拡張子を見る。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeicDetector {
    mime_types: Vec<String>,
}

impl Default for HeicDetector {
    fn default() -> Self {
        Self::new(HEIC_MIME_TYPES.iter().copied())
    }
}

impl HeicDetector {
    /// 判定に使う MIME タイプの集合を指定して作成する。
    pub fn new<I, S>(mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            mime_types: mime_types
                .into_iter()
                .map(|m| m.as_ref().trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn mime_types(&self) -> &[String] {
        &self.mime_types
    }

    pub fn is_heic(&self, file: &UploadedFile) -> bool {
        if let Some(mime_type) = &file.mime_type {
            let mime_type = mime_type.to_ascii_lowercase();
            if self.mime_types.iter().any(|m| *m == mime_type) {
                return true;
            }
        }

        file.original_name.as_deref().is_some_and(has_heic_extension)
    }
}

/// デフォルトの MIME タイプ集合で HEIC/HEIF かどうかを判定する。
pub fn is_heic_file(file: &UploadedFile) -> bool {
    HeicDetector::default().is_heic(file)
}

fn has_heic_extension(name: &str) -> bool {
    let lower = name.to_lowercase();
    HEIC_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// 末尾の `.heic` / `.heif` (大文字小文字を区別しない) を出力フォーマットの拡張子に置き換える。
///
/// ファイル名が無い場合は `converted` に拡張子を付けた名前を返す。
/// HEIC の拡張子で終わっていない名前はそのまま返す。
pub fn generate_converted_filename(original_name: Option<&str>, format: OutputFormat) -> String {
    let Some(name) = original_name else {
        return format!("converted{}", format.extension());
    };

    let Some(split) = name.len().checked_sub(5) else {
        return name.to_string();
    };

    match (name.get(..split), name.get(split..)) {
        (Some(stem), Some(suffix))
            if HEIC_EXTENSIONS
                .iter()
                .any(|ext| suffix.eq_ignore_ascii_case(ext)) =>
        {
            format!("{}{}", stem, format.extension())
        }
        _ => name.to_string(),
    }
}

/// クライアント側で既に変換済みと思われるファイルかどうか。
///
/// `image/jpeg` で、かつファイル名に `converted` を含む場合に真を返す。
/// 部分一致なので誤検出はあり得る。
pub fn looks_client_converted(file: &UploadedFile) -> bool {
    let is_jpeg = file
        .mime_type
        .as_deref()
        .is_some_and(|m| m.eq_ignore_ascii_case("image/jpeg"));
    let named_converted = file
        .original_name
        .as_deref()
        .is_some_and(|n| n.contains("converted"));

    is_jpeg && named_converted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(mime_type: Option<&str>, name: Option<&str>) -> UploadedFile {
        UploadedFile {
            mime_type: mime_type.map(str::to_string),
            original_name: name.map(str::to_string),
            ..UploadedFile::new(vec![0u8; 4])
        }
    }

    #[test]
    fn detects_heic_mime_types() {
        for mime_type in HEIC_MIME_TYPES {
            assert!(is_heic_file(&file(Some(mime_type), None)), "{mime_type}");
        }
        assert!(is_heic_file(&file(Some("IMAGE/HEIC"), None)));
    }

    #[test]
    fn detects_heic_extensions_case_insensitively() {
        for name in ["a.heic", "b.HEIC", "c.heif", "d.HeIf"] {
            assert!(is_heic_file(&file(None, Some(name))), "{name}");
        }
    }

    #[test]
    fn extension_wins_when_mime_type_is_generic() {
        assert!(is_heic_file(&file(
            Some("application/octet-stream"),
            Some("IMG_0001.HEIC")
        )));
    }

    #[test]
    fn rejects_other_types() {
        assert!(!is_heic_file(&file(Some("image/jpeg"), Some("photo.jpg"))));
        assert!(!is_heic_file(&file(Some("image/png"), None)));
        assert!(!is_heic_file(&file(None, Some("notes.txt"))));
        assert!(!is_heic_file(&file(None, None)));
    }

    #[test]
    fn custom_mime_types_override_defaults() {
        let detector = HeicDetector::new(["application/octet-stream"]);
        assert!(detector.is_heic(&file(Some("application/octet-stream"), None)));
        assert!(!detector.is_heic(&file(Some("image/heic"), None)));
        // 拡張子による判定は MIME タイプの集合に関係なく有効
        assert!(detector.is_heic(&file(Some("image/heic"), Some("x.heic"))));
    }

    #[test]
    fn converted_filename_replaces_heic_suffix() {
        assert_eq!(
            generate_converted_filename(Some("IMG_0001.HEIC"), OutputFormat::Jpeg),
            "IMG_0001.jpg"
        );
        assert_eq!(
            generate_converted_filename(Some("photo.heif"), OutputFormat::Webp),
            "photo.webp"
        );
        assert_eq!(
            generate_converted_filename(Some("archive.heic.heic"), OutputFormat::Png),
            "archive.heic.png"
        );
    }

    #[test]
    fn converted_filename_without_name() {
        assert_eq!(
            generate_converted_filename(None, OutputFormat::Png),
            "converted.png"
        );
        assert_eq!(
            generate_converted_filename(None, OutputFormat::Jpeg),
            "converted.jpg"
        );
    }

    #[test]
    fn converted_filename_keeps_other_names() {
        assert_eq!(
            generate_converted_filename(Some("photo"), OutputFormat::Jpeg),
            "photo"
        );
        assert_eq!(
            generate_converted_filename(Some("写真.jpg"), OutputFormat::Jpeg),
            "写真.jpg"
        );
    }

    #[test]
    fn client_converted_heuristic() {
        assert!(looks_client_converted(&file(
            Some("image/jpeg"),
            Some("IMG_0001_converted.jpg")
        )));
        assert!(!looks_client_converted(&file(
            Some("image/png"),
            Some("converted.png")
        )));
        assert!(!looks_client_converted(&file(
            Some("image/jpeg"),
            Some("IMG_0001.jpg")
        )));
        assert!(!looks_client_converted(&file(Some("image/jpeg"), None)));
    }
}
