//! Pipeline metrics
//!
//! Thin wrappers over the `metrics` facade so every crate records the same
//! names and labels. Without an installed recorder they are no-ops.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Record one full relink
///
/// `active_len` excludes the head/tail sentinels.
pub fn record_relink(active_len: usize, elapsed: Duration) {
    counter!("pipeline_relinks_total").increment(1);
    gauge!("pipeline_active_processors").set(active_len as f64);
    histogram!("pipeline_relink_duration_us").record(elapsed.as_secs_f64() * 1_000_000.0);
}

/// Record a value entering through an entry point
pub fn record_dispatch(pipeline: &str, entry_point: &str) {
    counter!(
        "pipeline_dispatches_total",
        "pipeline" => pipeline.to_string(),
        "entry_point" => entry_point.to_string()
    )
    .increment(1);
}

/// Record a processing error and what became of it
pub fn record_processing_error(pipeline: &str, processor: &str, disposition: &str) {
    counter!(
        "pipeline_processing_errors_total",
        "pipeline" => pipeline.to_string(),
        "processor" => processor.to_string(),
        "disposition" => disposition.to_string()
    )
    .increment(1);
}

/// Record end-to-end latency of one dispatch, as seen by the caller
pub fn record_dispatch_latency(pipeline: &str, elapsed: Duration) {
    histogram!(
        "pipeline_dispatch_latency_us",
        "pipeline" => pipeline.to_string()
    )
    .record(elapsed.as_secs_f64() * 1_000_000.0);
}

/// Online latency statistics (Welford)
///
/// Used by callers that want a summary without a metrics backend.
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    count: u64,
    mean_us: f64,
    m2: f64,
    min_us: f64,
    max_us: f64,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, elapsed: Duration) {
        let sample = elapsed.as_secs_f64() * 1_000_000.0;
        self.count += 1;

        if self.count == 1 {
            self.min_us = sample;
            self.max_us = sample;
            self.mean_us = sample;
            self.m2 = 0.0;
            return;
        }

        self.min_us = self.min_us.min(sample);
        self.max_us = self.max_us.max(sample);
        let delta = sample - self.mean_us;
        self.mean_us += delta / self.count as f64;
        self.m2 += delta * (sample - self.mean_us);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn summary(&self) -> LatencySummary {
        let std_dev_us = if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        };
        LatencySummary {
            count: self.count,
            min_us: self.min_us,
            max_us: self.max_us,
            mean_us: self.mean_us,
            std_dev_us,
        }
    }
}

/// Snapshot of [`LatencyStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub min_us: f64,
    pub max_us: f64,
    pub mean_us: f64,
    pub std_dev_us: f64,
}

impl std::fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            return write!(f, "N/A");
        }
        write!(
            f,
            "min={:.1}us max={:.1}us mean={:.1}us std={:.1}us (n={})",
            self.min_us, self.max_us, self.mean_us, self.std_dev_us, self.count
        )
    }
}
