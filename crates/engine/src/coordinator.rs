//! Write request bookkeeping
//!
//! The RequestCoordinator counts write requests through their lifecycle:
//! - Active request tracking
//! - Request metrics (started, committed, aborted)
//! - Commit rate calculation
//!
//! Revision numbers are not allocated here; they belong to the store's
//! revision scope and are read inside the request's transaction.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle counters for write requests
///
/// # Memory Ordering
///
/// The counters use Relaxed ordering: they are observational only and do not
/// synchronize any other memory operations.
#[derive(Debug, Default)]
pub struct RequestCoordinator {
    active_count: AtomicU64,
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
}

impl RequestCoordinator {
    /// Create a coordinator with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record request start
    pub fn record_start(&self) {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.total_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record request commit
    pub fn record_commit(&self) {
        self.finish();
        self.total_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record request abort
    pub fn record_abort(&self) {
        self.finish();
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self) {
        let _ = self
            .active_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            });
    }

    /// Current snapshot of the counters
    pub fn metrics(&self) -> RequestMetrics {
        let started = self.total_started.load(Ordering::Relaxed);
        let committed = self.total_committed.load(Ordering::Relaxed);

        RequestMetrics {
            active_count: self.active_count.load(Ordering::Relaxed),
            total_started: started,
            total_committed: committed,
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            commit_rate: if started > 0 {
                committed as f64 / started as f64
            } else {
                0.0
            },
        }
    }
}

/// Write request metrics
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    /// Requests currently in flight
    pub active_count: u64,
    /// Requests started
    pub total_started: u64,
    /// Requests committed
    pub total_committed: u64,
    /// Requests rolled back
    pub total_aborted: u64,
    /// committed / started
    pub commit_rate: f64,
}

impl RequestMetrics {
    /// Requests that finished either way
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted
    }

    /// aborted / started
    pub fn abort_rate(&self) -> f64 {
        if self.total_started > 0 {
            self.total_aborted as f64 / self.total_started as f64
        } else {
            0.0
        }
    }
}
