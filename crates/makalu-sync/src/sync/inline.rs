use super::granule::GranuleGuard;
use super::mark_lock::MarkLockGuard;
use super::{CollectorSync, SyncMode};

/// No-op synchronization for single-threaded marking.
///
/// Granule indices are still range checked so misuse shows up in both modes.
#[derive(Debug, Clone, Copy)]
pub struct InlineSync {
    granules: usize,
}

impl InlineSync {
    /// Create an inline implementation covering `granules` granules.
    #[must_use]
    pub const fn new(granules: usize) -> Self {
        Self { granules }
    }

    fn check(&self, index: usize) {
        assert!(
            index < self.granules,
            "granule index {index} out of range for table of {} granules",
            self.granules
        );
    }
}

impl CollectorSync for InlineSync {
    fn mode(&self) -> SyncMode {
        SyncMode::Inline
    }

    fn granules(&self) -> usize {
        self.granules
    }

    fn lock_granule(&self, index: usize) -> GranuleGuard<'_> {
        self.check(index);
        GranuleGuard::inline(index)
    }

    fn try_lock_granule(&self, index: usize) -> Option<GranuleGuard<'_>> {
        self.check(index);
        Some(GranuleGuard::inline(index))
    }

    fn acquire_mark_lock(&self) -> MarkLockGuard<'_> {
        MarkLockGuard::inline()
    }

    fn wait_marker(&self, _guard: &mut MarkLockGuard<'_>) {}

    fn notify_all_marker(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_everything_is_noop() {
        let sync = InlineSync::new(4);
        let a = sync.lock_granule(1);
        // Relocking is harmless without real locks.
        let b = sync.lock_granule(1);
        assert!(!a.is_locked() && !b.is_locked());

        let mut guard = sync.acquire_mark_lock();
        sync.wait_marker(&mut guard);
        sync.notify_all_marker();
        assert!(!guard.is_parallel());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_panics() {
        let sync = InlineSync::new(4);
        let _ = sync.lock_granule(4);
    }
}
