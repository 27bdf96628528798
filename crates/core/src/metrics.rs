//! Ambient observability counters.
//!
//! A small current-state counter set, incremented alongside the crate's
//! `tracing` calls and surfaced for logging and health probes. These are
//! point-in-time counters, not historical analytics — nothing here is
//! retained per-session or time-series.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct StoreMetrics {
    pub accepted: AtomicU64,
    pub rejected_duplicate: AtomicU64,
    pub rejected_malformed: AtomicU64,
    pub stale_ignored: AtomicU64,
    pub expired: AtomicU64,
    pub queries_total: AtomicU64,
    pub queries_empty_params: AtomicU64,
}

impl StoreMetrics {
    pub fn snapshot(&self) -> StoreMetricsSnapshot {
        StoreMetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected_duplicate: self.rejected_duplicate.load(Ordering::Relaxed),
            rejected_malformed: self.rejected_malformed.load(Ordering::Relaxed),
            stale_ignored: self.stale_ignored.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            queries_total: self.queries_total.load(Ordering::Relaxed),
            queries_empty_params: self.queries_empty_params.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StoreMetricsSnapshot {
    pub accepted: u64,
    pub rejected_duplicate: u64,
    pub rejected_malformed: u64,
    pub stale_ignored: u64,
    pub expired: u64,
    pub queries_total: u64,
    pub queries_empty_params: u64,
}
