//! Run statistics, shared lock-free between workers, collector, and runner.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome counters for one run. All counters relax to zero on
/// [`reset`](RunStats::reset) so a re-run starts clean.
#[derive(Debug, Default)]
pub struct RunStats {
    rows_committed: AtomicU64,
    events_cut: AtomicU64,
    rows_rejected: AtomicU64,
    worker_failures: AtomicU64,
    pause_timeouts: AtomicU64,
    reorder_high_water: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_commit(&self) {
        self.rows_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cut(&self) {
        self.events_cut.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rows_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_failure(&self) {
        self.worker_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pause_timeout(&self) {
        self.pause_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Track the deepest reorder-buffer occupancy seen.
    pub fn note_reorder_lag(&self, lag: u64) {
        self.reorder_high_water.fetch_max(lag, Ordering::Relaxed);
    }

    pub fn rows_committed(&self) -> u64 {
        self.rows_committed.load(Ordering::Relaxed)
    }

    pub fn events_cut(&self) -> u64 {
        self.events_cut.load(Ordering::Relaxed)
    }

    pub fn rows_rejected(&self) -> u64 {
        self.rows_rejected.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rows_committed: self.rows_committed.load(Ordering::Relaxed),
            events_cut: self.events_cut.load(Ordering::Relaxed),
            rows_rejected: self.rows_rejected.load(Ordering::Relaxed),
            worker_failures: self.worker_failures.load(Ordering::Relaxed),
            pause_timeouts: self.pause_timeouts.load(Ordering::Relaxed),
            reorder_high_water: self.reorder_high_water.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.rows_committed.store(0, Ordering::Relaxed);
        self.events_cut.store(0, Ordering::Relaxed);
        self.rows_rejected.store(0, Ordering::Relaxed);
        self.worker_failures.store(0, Ordering::Relaxed);
        self.pause_timeouts.store(0, Ordering::Relaxed);
        self.reorder_high_water.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub rows_committed: u64,
    pub events_cut: u64,
    pub rows_rejected: u64,
    pub worker_failures: u64,
    pub pause_timeouts: u64,
    pub reorder_high_water: u64,
}
