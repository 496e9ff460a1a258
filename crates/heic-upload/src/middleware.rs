//! アップロードされたファイルの検出と変換。

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::MethodRouter;
use heic_converter::{
    ConversionOptions, ConversionStats, ConvertedFile, HeicDetector, UploadedFile,
    looks_client_converted,
};

use crate::config::HeicConfig;
use crate::error::{ApiError, ErrorCode, FailureKind, HeicError};
use crate::observer::{ConversionObserver, notify_guarded};
use crate::upload::{FieldFiles, UploadParser, UploadShape, parse_uploads};

const PROCESSING_FAILED_MESSAGE: &str =
    "Failed to process HEIC image. Please try a different image or format.";

/// HEIC/HEIF ファイルを検出して変換するミドルウェア本体。
pub struct HeicMiddleware {
    config: HeicConfig,
    detector: Arc<HeicDetector>,
    stats: Arc<ConversionStats>,
    observer: Option<Arc<dyn ConversionObserver>>,
}

pub struct HeicMiddlewareBuilder {
    config: HeicConfig,
    stats: Option<Arc<ConversionStats>>,
    observer: Option<Arc<dyn ConversionObserver>>,
}

impl HeicMiddlewareBuilder {
    /// 統計の記録先。指定しない場合は新しく作成する。
    pub fn stats(mut self, stats: Arc<ConversionStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ConversionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> HeicMiddleware {
        HeicMiddleware {
            detector: Arc::new(HeicDetector::new(&self.config.allowed_mime_types)),
            stats: self.stats.unwrap_or_default(),
            observer: self.observer,
            config: self.config,
        }
    }
}

impl HeicMiddleware {
    pub fn builder(config: HeicConfig) -> HeicMiddlewareBuilder {
        HeicMiddlewareBuilder {
            config,
            stats: None,
            observer: None,
        }
    }

    pub fn config(&self) -> &HeicConfig {
        &self.config
    }

    pub fn detector(&self) -> &HeicDetector {
        &self.detector
    }

    pub fn stats(&self) -> &Arc<ConversionStats> {
        &self.stats
    }

    pub(crate) fn conversion_options(&self) -> ConversionOptions {
        ConversionOptions {
            format: self.config.output_format,
            quality: self.config.quality,
            progressive: true,
        }
    }

    /// アップロードされたすべてのファイルを出現順に処理し、変換したものを置き換える。
    ///
    /// 1 つでも失敗したらそこで中断する。失敗は統計とオブザーバーに通知される。
    pub async fn process(&self, shape: &mut UploadShape) -> Result<(), HeicError> {
        let result = self.process_shape(shape).await;

        if let Err(error) = &result {
            tracing::error!(
                file = %error.file_name,
                error = %error.source,
                "HEIC middleware failed"
            );
            if self.config.enable_stats {
                self.stats
                    .add_conversion(error.original_size, 0, error.elapsed, false);
            }
            if let Some(observer) = &self.observer {
                notify_guarded("on_error", || observer.on_error(error));
            }
        }

        result
    }

    async fn process_shape(&self, shape: &mut UploadShape) -> Result<(), HeicError> {
        match shape {
            UploadShape::Single(file) => self.replace(file).await?,
            UploadShape::List(files) => {
                for file in files.iter_mut() {
                    self.replace(file).await?;
                }
            }
            UploadShape::Fields(fields) => {
                for (_, files) in fields.iter_mut() {
                    match files {
                        FieldFiles::One(file) => self.replace(file).await?,
                        FieldFiles::Many(files) => {
                            for file in files.iter_mut() {
                                self.replace(file).await?;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn replace(&self, slot: &mut UploadedFile) -> Result<(), HeicError> {
        if let Some(converted) = self.process_file(slot).await? {
            *slot = converted;
        }
        Ok(())
    }

    /// 1 ファイルを処理する。変換しなかった場合は `None` を返す。
    pub async fn process_file(&self, file: &UploadedFile) -> Result<Option<UploadedFile>, HeicError> {
        if !file.has_content() {
            return Ok(None);
        }

        if !self.detector.is_heic(file) {
            tracing::debug!(
                file = %file.display_name(),
                mime_type = %file.display_mime_type(),
                "Skipping non-HEIC file"
            );
            return Ok(None);
        }

        if self.config.skip_client_converted && looks_client_converted(file) {
            tracing::info!(
                file = %file.display_name(),
                "Skipping file already converted by the client"
            );
            return Ok(None);
        }

        let started = Instant::now();
        let fail = |source: FailureKind| HeicError {
            file_name: file.display_name().to_string(),
            original_size: file.len(),
            elapsed: started.elapsed(),
            source,
        };

        self.detector
            .validate(Some(file), self.config.max_size)
            .map_err(|e| fail(e.into()))?;

        let converted = self
            .convert_blocking(file, self.conversion_options())
            .await
            .map_err(fail)?;

        let ConvertedFile {
            file: converted,
            metrics,
        } = converted;

        tracing::info!(
            original = %file.display_name(),
            original_size = metrics.original_size,
            converted = %converted.display_name(),
            converted_size = metrics.converted_size,
            compression_ratio = %format!("{:.1}%", metrics.compression_ratio()),
            elapsed_ms = metrics.conversion_time_ms(),
            "HEIC conversion completed"
        );

        if self.config.enable_stats {
            self.stats.add_conversion(
                metrics.original_size,
                metrics.converted_size,
                metrics.conversion_time,
                true,
            );
        }

        if let Some(observer) = &self.observer {
            notify_guarded("on_success", || {
                observer.on_success(file, &converted, &metrics)
            });
        }

        Ok(Some(converted))
    }

    /// 変換をブロッキング用のスレッドプールで実行する。
    pub(crate) async fn convert_blocking(
        &self,
        file: &UploadedFile,
        options: ConversionOptions,
    ) -> Result<ConvertedFile, FailureKind> {
        let detector = Arc::clone(&self.detector);
        let input = file.clone();

        tokio::task::spawn_blocking(move || detector.convert_file(&input, &options))
            .await
            .map_err(|e| FailureKind::Task(e.to_string()))?
            .map_err(FailureKind::from)
    }

    /// 失敗を 422 のレスポンスに変換する。
    pub fn reject(&self, error: &HeicError) -> ApiError {
        ApiError::new(ErrorCode::HeicProcessingFailed, PROCESSING_FAILED_MESSAGE)
            .with_details(error.to_string(), self.config.expose_error_details)
    }
}

/// extensions の `UploadShape` を変換してから次に渡す axum ミドルウェア。
///
/// ファイルが無いリクエストはそのまま次に渡す。
pub async fn heic_middleware(
    State(heic): State<Arc<HeicMiddleware>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(mut shape) = request.extensions_mut().remove::<UploadShape>() else {
        return next.run(request).await;
    };

    match heic.process(&mut shape).await {
        Ok(()) => {
            request.extensions_mut().insert(shape);
            next.run(request).await
        }
        Err(error) => heic.reject(&error).into_response(),
    }
}

/// ルートの前段に multipart の解析と HEIC 変換を挟む。
pub fn convert_uploads<S>(
    route: MethodRouter<S>,
    parser: UploadParser,
    heic: Arc<HeicMiddleware>,
) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    let parser = parser.with_error_details(heic.config().expose_error_details);
    route
        .layer(middleware::from_fn_with_state(heic, heic_middleware))
        .layer(middleware::from_fn_with_state(Arc::new(parser), parse_uploads))
}
