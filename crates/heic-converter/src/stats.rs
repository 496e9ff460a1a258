//! 変換統計の集計。
//!
//! プロセス内で 1 つだけ作成し、`Arc` で各コンポーネントに渡して共有する。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 変換の試行回数・失敗回数・サイズ・所要時間を集計する。
///
/// 複数のリクエストから同時に更新されるため、カウンターはすべてアトミックに扱う。
#[derive(Debug)]
pub struct ConversionStats {
    conversions: AtomicU64,
    errors: AtomicU64,
    total_original_size: AtomicU64,
    total_converted_size: AtomicU64,
    total_time_us: AtomicU64,
    started: Instant,
    start_time: DateTime<Utc>,
}

/// 統計のスナップショット。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub conversions: u64,
    pub errors: u64,
    /// 変換前サイズの平均 (バイト)
    pub average_size: f64,
    /// 変換後サイズの平均 (バイト)
    pub average_converted_size: f64,
    /// 平均所要時間 (ミリ秒)
    pub average_time: f64,
    /// 成功率 (%)。試行が無い場合は 100
    pub success_rate: f64,
    pub uptime_ms: u64,
    pub start_time: DateTime<Utc>,
}

impl Default for ConversionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionStats {
    pub fn new() -> Self {
        Self {
            conversions: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_original_size: AtomicU64::new(0),
            total_converted_size: AtomicU64::new(0),
            total_time_us: AtomicU64::new(0),
            started: Instant::now(),
            start_time: Utc::now(),
        }
    }

    /// 変換の試行を 1 件記録する。
    ///
    /// サイズと時間は成否に関係なく加算される。
    pub fn add_conversion(
        &self,
        original_size: usize,
        converted_size: usize,
        elapsed: Duration,
        success: bool,
    ) {
        self.total_original_size
            .fetch_add(original_size as u64, Ordering::Relaxed);
        self.total_converted_size
            .fetch_add(converted_size as u64, Ordering::Relaxed);
        self.total_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);

        // errors <= conversions を保つため、conversions を先に加算する
        self.conversions.fetch_add(1, Ordering::SeqCst);
        if !success {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        // 読み出しは errors -> conversions の順
        let errors = self.errors.load(Ordering::SeqCst);
        let conversions = self.conversions.load(Ordering::SeqCst);
        let total_original_size = self.total_original_size.load(Ordering::Relaxed);
        let total_converted_size = self.total_converted_size.load(Ordering::Relaxed);
        let total_time_us = self.total_time_us.load(Ordering::Relaxed);

        let (average_size, average_converted_size, average_time, success_rate) =
            if conversions == 0 {
                (0.0, 0.0, 0.0, 100.0)
            } else {
                let n = conversions as f64;
                (
                    total_original_size as f64 / n,
                    total_converted_size as f64 / n,
                    total_time_us as f64 / 1000.0 / n,
                    (conversions - errors) as f64 / n * 100.0,
                )
            };

        StatsSnapshot {
            conversions,
            errors,
            average_size,
            average_converted_size,
            average_time,
            success_rate,
            uptime_ms: self.started.elapsed().as_millis() as u64,
            start_time: self.start_time,
        }
    }
}

/// 統計から推定したサーバー負荷。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerLoad {
    Low,
    Medium,
    High,
}

impl ServerLoad {
    const HIGH_TIME_MS: f64 = 3000.0;
    const HIGH_ERROR_RATE: f64 = 10.0;
    const MEDIUM_TIME_MS: f64 = 1500.0;
    const MEDIUM_ERROR_RATE: f64 = 5.0;

    pub fn classify(snapshot: &StatsSnapshot) -> Self {
        if snapshot.conversions == 0 {
            return Self::Low;
        }

        let error_rate = snapshot.errors as f64 / snapshot.conversions as f64 * 100.0;

        if snapshot.average_time > Self::HIGH_TIME_MS || error_rate > Self::HIGH_ERROR_RATE {
            Self::High
        } else if snapshot.average_time > Self::MEDIUM_TIME_MS
            || error_rate > Self::MEDIUM_ERROR_RATE
        {
            Self::Medium
        } else {
            Self::Low
        }
    }
}
