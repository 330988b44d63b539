use std::sync::Arc;

use super::granule::{self, GranuleGuard, GranuleLockTable};
use super::mark_lock::{GlobalMarkLock, MarkLockGuard};
use super::{CollectorSync, SyncMode};
use crate::metrics::SyncMetrics;

/// Real locking for parallel marking.
#[derive(Debug)]
pub struct ThreadedSync {
    granules: GranuleLockTable,
    mark_lock: GlobalMarkLock,
    metrics: Arc<SyncMetrics>,
}

impl ThreadedSync {
    /// Create a table of `granules` locks and an idle mark lock.
    #[must_use]
    pub fn new(granules: usize, metrics: Arc<SyncMetrics>) -> Self {
        Self {
            granules: GranuleLockTable::new(granules),
            mark_lock: GlobalMarkLock::new(true),
            metrics,
        }
    }

    /// The underlying granule table.
    #[must_use]
    pub const fn granule_table(&self) -> &GranuleLockTable {
        &self.granules
    }
}

impl CollectorSync for ThreadedSync {
    fn mode(&self) -> SyncMode {
        SyncMode::Threaded
    }

    fn granules(&self) -> usize {
        self.granules.len()
    }

    fn lock_granule(&self, index: usize) -> GranuleGuard<'_> {
        let (guard, contended) = granule::acquire(&self.granules, index);
        self.metrics.record_granule_acquired(contended);
        guard
    }

    fn try_lock_granule(&self, index: usize) -> Option<GranuleGuard<'_>> {
        let guard = granule::try_acquire(&self.granules, index)?;
        self.metrics.record_granule_acquired(false);
        Some(guard)
    }

    fn acquire_mark_lock(&self) -> MarkLockGuard<'_> {
        let guard = self.mark_lock.acquire();
        self.metrics.record_mark_lock();
        guard
    }

    fn wait_marker(&self, guard: &mut MarkLockGuard<'_>) {
        debug_assert!(guard.is_locked(), "wait_marker requires the mark lock");
        self.metrics.record_wait();
        self.mark_lock.wait(guard);
    }

    fn notify_all_marker(&self) {
        self.mark_lock.notify_all();
    }
}
