//! Per-pipeline counters for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for a single pipeline
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Full relinks (structural changes)
    relinks: AtomicU64,
    /// Partial recomputes (taps, bypass, points)
    cascades: AtomicU64,
    /// Values dispatched through entry points
    dispatches: AtomicU64,
    /// Processing errors reported by stages
    processing_errors: AtomicU64,
    /// Dispatches refused after termination
    dropped: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relinks(&self) -> u64 {
        self.relinks.load(Ordering::Relaxed)
    }

    pub fn inc_relinks(&self) {
        self.relinks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cascades(&self) -> u64 {
        self.cascades.load(Ordering::Relaxed)
    }

    pub fn inc_cascades(&self) {
        self.cascades.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    pub fn inc_dispatches(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processing_errors(&self) -> u64 {
        self.processing_errors.load(Ordering::Relaxed)
    }

    pub fn inc_processing_errors(&self) {
        self.processing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            relinks: self.relinks(),
            cascades: self.cascades(),
            dispatches: self.dispatches(),
            processing_errors: self.processing_errors(),
            dropped: self.dropped(),
        }
    }
}

/// Snapshot of pipeline counters (for reporting)
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
    pub relinks: u64,
    pub cascades: u64,
    pub dispatches: u64,
    pub processing_errors: u64,
    pub dropped: u64,
}
