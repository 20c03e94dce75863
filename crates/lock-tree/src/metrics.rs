//! Counters for lock request outcomes
//!
//! One [`LockTreeMetrics`] lives in each manager and is shared by all of its
//! trees. Counters are relaxed atomics; a [`MetricsSnapshot`] is a
//! point-in-time copy, not a consistent cut.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for lock request outcomes.
#[derive(Debug, Default)]
pub struct LockTreeMetrics {
    /// Requests started against any tree
    pub requests_started: AtomicU64,
    /// Requests granted without waiting
    pub immediate_grants: AtomicU64,
    /// Requests that entered a pending queue
    pub requests_queued: AtomicU64,
    /// Pending requests granted by a retry pass
    pub retry_grants: AtomicU64,
    /// Requests refused for lack of lock resources
    pub out_of_locks: AtomicU64,
    /// Pending requests whose timed wait expired
    pub timeouts: AtomicU64,
    /// Pending requests withdrawn by their owner
    pub cancellations: AtomicU64,
    /// Retry passes run by `release_all`
    pub retry_passes: AtomicU64,
}

impl LockTreeMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_started(&self) {
        self.requests_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_immediate_grant(&self) {
        self.immediate_grants.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_queued(&self) {
        self.requests_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry_grant(&self) {
        self.retry_grants.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_out_of_locks(&self) {
        self.out_of_locks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancellation(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry_pass(&self) {
        self.retry_passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_started: self.requests_started.load(Ordering::Relaxed),
            immediate_grants: self.immediate_grants.load(Ordering::Relaxed),
            requests_queued: self.requests_queued.load(Ordering::Relaxed),
            retry_grants: self.retry_grants.load(Ordering::Relaxed),
            out_of_locks: self.out_of_locks.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            retry_passes: self.retry_passes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LockTreeMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests_started: u64,
    pub immediate_grants: u64,
    pub requests_queued: u64,
    pub retry_grants: u64,
    pub out_of_locks: u64,
    pub timeouts: u64,
    pub cancellations: u64,
    pub retry_passes: u64,
}

impl MetricsSnapshot {
    /// Grants from either path.
    pub fn total_grants(&self) -> u64 {
        self.immediate_grants + self.retry_grants
    }
}
