use std::panic::{AssertUnwindSafe, catch_unwind};

use heic_converter::{ConversionMetrics, UploadedFile};

use crate::error::HeicError;

/// 変換の成功・失敗を受け取るオブザーバー。
///
/// オブザーバーが返したエラーや panic はログに記録されるだけで、
/// リクエストの結果には影響しない。
pub trait ConversionObserver: Send + Sync {
    fn on_success(
        &self,
        _original: &UploadedFile,
        _converted: &UploadedFile,
        _metrics: &ConversionMetrics,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_error(&self, _error: &HeicError) -> anyhow::Result<()> {
        Ok(())
    }
}

/// オブザーバーを呼び出し、エラーと panic をログに落とす。
pub(crate) fn notify_guarded<F>(event: &'static str, call: F)
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(event, error = %e, "Conversion observer returned an error");
        }
        Err(_) => {
            tracing::warn!(event, "Conversion observer panicked");
        }
    }
}
