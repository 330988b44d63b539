//! The global mark lock and its condition variable.
//!
//! One coarse lock serializes the marking-phase bookkeeping shared by all
//! markers. It is only ever held for a handful of instructions, so contention
//! stays low even though every marker takes it at the end of each round.

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::order::{LockOrder, OrderToken};

/// Marking-phase state guarded by the mark lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkPhase {
    /// Markers still working on the current round (`MarkerCount`).
    pub(crate) markers_active: usize,
    /// Whether parallel marking is enabled.
    pub(crate) parallel: bool,
    /// Stop decision taken by the last marker of the most recent round.
    pub(crate) stop_latched: bool,
    /// Set when a marker left the pool; the current round can never fill.
    pub(crate) abandoned: bool,
}

impl MarkPhase {
    const fn new(parallel: bool) -> Self {
        Self {
            markers_active: 0,
            parallel,
            stop_latched: false,
            abandoned: false,
        }
    }
}

/// Mutex over [`MarkPhase`] plus the condition variable markers wait on.
#[derive(Debug)]
pub struct GlobalMarkLock {
    phase: Mutex<MarkPhase>,
    marker_cv: Condvar,
}

impl GlobalMarkLock {
    /// Create the lock with `MarkerCount` at zero.
    #[must_use]
    pub fn new(parallel: bool) -> Self {
        Self {
            phase: Mutex::new(MarkPhase::new(parallel)),
            marker_cv: Condvar::new(),
        }
    }

    pub(crate) fn acquire(&self) -> MarkLockGuard<'_> {
        let order = OrderToken::acquire(LockOrder::MarkLock);
        MarkLockGuard {
            lock: Some(self.phase.lock()),
            _order: Some(order),
        }
    }

    /// Release the lock held by `guard`, sleep until notified, reacquire.
    pub(crate) fn wait(&self, guard: &mut MarkLockGuard<'_>) {
        if let Some(lock) = guard.lock.as_mut() {
            self.marker_cv.wait(lock);
        }
    }

    /// Wake every waiter. Returns how many were woken.
    pub(crate) fn notify_all(&self) -> usize {
        self.marker_cv.notify_all()
    }
}

/// Hold on the mark lock. Releases when dropped.
///
/// In inline mode the guard holds nothing and reports an idle,
/// non-parallel phase.
#[must_use = "the mark lock is released as soon as the guard is dropped"]
pub struct MarkLockGuard<'a> {
    lock: Option<MutexGuard<'a, MarkPhase>>,
    _order: Option<OrderToken>,
}

impl MarkLockGuard<'_> {
    pub(crate) const fn inline() -> Self {
        Self {
            lock: None,
            _order: None,
        }
    }

    /// Returns `true` if this guard holds the real mark lock.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// The parallel-mode flag.
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        self.lock.as_ref().is_some_and(|phase| phase.parallel)
    }

    /// Current `MarkerCount`.
    #[must_use]
    pub fn markers_active(&self) -> usize {
        self.lock.as_ref().map_or(0, |phase| phase.markers_active)
    }

    pub(crate) fn phase_mut(&mut self) -> Option<&mut MarkPhase> {
        self.lock.as_deref_mut()
    }

    /// Release the mark lock.
    pub fn release(self) {
        drop(self);
    }
}

impl std::fmt::Debug for MarkLockGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkLockGuard")
            .field("phase", &self.lock.as_deref())
            .finish()
    }
}
