//! Synchronization counters.
//!
//! Counters are relaxed atomics bumped by the threaded implementation only;
//! the inline implementation never touches them. Read them through
//! [`SyncMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by every user of one [`SyncContext`](crate::SyncContext).
#[derive(Debug, Default)]
pub struct SyncMetrics {
    granule_acquisitions: AtomicU64,
    granule_contended: AtomicU64,
    mark_lock_acquisitions: AtomicU64,
    marker_waits: AtomicU64,
    rounds_completed: AtomicU64,
}

/// Point-in-time copy of [`SyncMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncMetricsSnapshot {
    /// Successful granule lock acquisitions (blocking and `try`).
    pub granule_acquisitions: u64,
    /// Blocking granule acquisitions that found the lock held.
    pub granule_contended: u64,
    /// Mark lock acquisitions.
    pub mark_lock_acquisitions: u64,
    /// Calls to `wait_marker`.
    pub marker_waits: u64,
    /// Barrier rounds completed.
    pub rounds_completed: u64,
}

impl SyncMetrics {
    /// Create a zeroed set of counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            granule_acquisitions: AtomicU64::new(0),
            granule_contended: AtomicU64::new(0),
            mark_lock_acquisitions: AtomicU64::new(0),
            marker_waits: AtomicU64::new(0),
            rounds_completed: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_granule_acquired(&self, contended: bool) {
        self.granule_acquisitions.fetch_add(1, Ordering::Relaxed);
        if contended {
            self.granule_contended.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_mark_lock(&self) {
        self.mark_lock_acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_wait(&self) {
        self.marker_waits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_round(&self) {
        self.rounds_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            granule_acquisitions: self.granule_acquisitions.load(Ordering::Relaxed),
            granule_contended: self.granule_contended.load(Ordering::Relaxed),
            mark_lock_acquisitions: self.mark_lock_acquisitions.load(Ordering::Relaxed),
            marker_waits: self.marker_waits.load(Ordering::Relaxed),
            rounds_completed: self.rounds_completed.load(Ordering::Relaxed),
        }
    }
}
