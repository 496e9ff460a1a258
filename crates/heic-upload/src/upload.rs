//! multipart/form-data の解析。
//!
//! 解析結果は `UploadShape` としてリクエストの extensions に格納され、
//! 後段のミドルウェアとハンドラーが取り出して使う。

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::Stream;
use heic_converter::UploadedFile;

use crate::error::{ApiError, ErrorCode, UploadError};

/// multipart 全体の大きさの上限のデフォルト。
pub const DEFAULT_MAX_REQUEST_SIZE: u64 = 100 * 1024 * 1024;

const INVALID_UPLOAD_MESSAGE: &str = "Invalid multipart upload";

/// 1 つのフィールドに含まれるファイル。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldFiles {
    One(UploadedFile),
    Many(Vec<UploadedFile>),
}

/// アップロードされたファイルの形。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadShape {
    /// 単一フィールドの単一ファイル
    Single(UploadedFile),
    /// 単一フィールドの複数ファイル
    List(Vec<UploadedFile>),
    /// フィールド名ごとのファイル (出現順)
    Fields(Vec<(String, FieldFiles)>),
}

impl UploadShape {
    /// 含まれるすべてのファイルを出現順に返す。
    pub fn files(&self) -> Vec<&UploadedFile> {
        match self {
            Self::Single(file) => vec![file],
            Self::List(files) => files.iter().collect(),
            Self::Fields(fields) => fields
                .iter()
                .flat_map(|(_, files)| match files {
                    FieldFiles::One(file) => std::slice::from_ref(file),
                    FieldFiles::Many(files) => files.as_slice(),
                })
                .collect(),
        }
    }

    /// 最初のファイル。
    pub fn first(&self) -> Option<&UploadedFile> {
        self.files().into_iter().next()
    }

    /// フィールド名でファイルを探す。
    pub fn field(&self, name: &str) -> Option<&FieldFiles> {
        match self {
            Self::Fields(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, f)| f),
            _ => None,
        }
    }
}

/// ファイル以外のテキストフィールド。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields(HashMap<String, String>);

impl FormFields {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }
}

/// どのフィールドのファイルをどの形で受け取るか。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadLayout {
    /// 指定フィールドの最初のファイルを `UploadShape::Single` として受け取る
    Single(String),
    /// 指定フィールドのファイルを `UploadShape::List` として受け取る
    Array(String),
    /// すべてのファイルフィールドを `UploadShape::Fields` として受け取る
    Fields,
}

/// 解析結果。
#[derive(Debug, Clone, Default)]
pub struct ParsedUpload {
    pub shape: Option<UploadShape>,
    pub fields: FormFields,
}

/// multipart を解析してファイルとテキストフィールドに振り分けるパーサー。
#[derive(Debug, Clone)]
pub struct UploadParser {
    layout: UploadLayout,
    max_request_size: u64,
    expose_error_details: bool,
}

impl UploadParser {
    pub fn new(layout: UploadLayout) -> Self {
        Self {
            layout,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            expose_error_details: false,
        }
    }

    pub fn single(field: impl Into<String>) -> Self {
        Self::new(UploadLayout::Single(field.into()))
    }

    pub fn array(field: impl Into<String>) -> Self {
        Self::new(UploadLayout::Array(field.into()))
    }

    pub fn fields() -> Self {
        Self::new(UploadLayout::Fields)
    }

    pub fn with_max_request_size(mut self, max_request_size: u64) -> Self {
        self.max_request_size = max_request_size;
        self
    }

    /// 解析エラーの詳細をレスポンスに含めるか。
    pub fn with_error_details(mut self, expose: bool) -> Self {
        self.expose_error_details = expose;
        self
    }

    pub fn layout(&self) -> &UploadLayout {
        &self.layout
    }

    /// multipart の本文を解析する。
    pub async fn parse<S, O, E>(
        &self,
        content_type: &str,
        stream: S,
    ) -> Result<ParsedUpload, UploadError>
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let boundary = multer::parse_boundary(content_type).map_err(UploadError::Boundary)?;
        let constraints = multer::Constraints::new()
            .size_limit(multer::SizeLimit::new().whole_stream(self.max_request_size));
        let mut multipart = multer::Multipart::with_constraints(stream, boundary, constraints);

        let mut files = Vec::new();
        let mut fields = FormFields::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            let Some(file_name) = field.file_name().map(str::to_string) else {
                let value = field.text().await?;
                fields.insert(name, value);
                continue;
            };

            let mime_type = field.content_type().map(|m| m.to_string());
            let encoding = field
                .headers()
                .get("content-transfer-encoding")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let buffer = field.bytes().await?;

            tracing::debug!(
                field = %name,
                file = %file_name,
                size = buffer.len(),
                "Received upload"
            );

            files.push(UploadedFile {
                field_name: Some(name),
                original_name: Some(file_name),
                encoding,
                mime_type,
                size: Some(buffer.len()),
                buffer,
            });
        }

        Ok(ParsedUpload {
            shape: self.arrange(files),
            fields,
        })
    }

    fn arrange(&self, files: Vec<UploadedFile>) -> Option<UploadShape> {
        let in_field = |file: &UploadedFile, field: &str| file.field_name.as_deref() == Some(field);

        match &self.layout {
            UploadLayout::Single(field) => files
                .into_iter()
                .find(|f| in_field(f, field))
                .map(UploadShape::Single),
            UploadLayout::Array(field) => {
                let files: Vec<_> = files.into_iter().filter(|f| in_field(f, field)).collect();
                (!files.is_empty()).then_some(UploadShape::List(files))
            }
            UploadLayout::Fields => {
                let mut grouped: Vec<(String, Vec<UploadedFile>)> = Vec::new();
                for file in files {
                    let name = file.field_name.clone().unwrap_or_default();
                    match grouped.iter_mut().find(|(n, _)| *n == name) {
                        Some((_, group)) => group.push(file),
                        None => grouped.push((name, vec![file])),
                    }
                }
                if grouped.is_empty() {
                    return None;
                }

                let fields = grouped
                    .into_iter()
                    .map(|(name, mut group)| {
                        let files = if group.len() == 1 {
                            FieldFiles::One(group.remove(0))
                        } else {
                            FieldFiles::Many(group)
                        };
                        (name, files)
                    })
                    .collect();
                Some(UploadShape::Fields(fields))
            }
        }
    }
}

fn multipart_content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.to_ascii_lowercase().starts_with("multipart/form-data"))
        .map(str::to_string)
}

/// multipart のリクエストを解析し、結果を extensions に格納する axum ミドルウェア。
///
/// multipart 以外のリクエストはそのまま次に渡す。
pub async fn parse_uploads(
    State(parser): State<Arc<UploadParser>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(content_type) = multipart_content_type(request.headers()) else {
        return next.run(request).await;
    };

    let (mut parts, body) = request.into_parts();

    match parser.parse(&content_type, body.into_data_stream()).await {
        Ok(parsed) => {
            if let Some(shape) = parsed.shape {
                parts.extensions.insert(shape);
            }
            parts.extensions.insert(parsed.fields);
            next.run(Request::from_parts(parts, Body::empty())).await
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse multipart upload");
            ApiError::new(ErrorCode::InvalidUpload, INVALID_UPLOAD_MESSAGE)
                .with_details(e.to_string(), parser.expose_error_details)
                .into_response()
        }
    }
}
