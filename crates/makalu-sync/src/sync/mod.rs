//! The synchronization interface and its two implementations.
//!
//! The collector engine only talks to [`CollectorSync`]. At startup the
//! configuration picks one implementation:
//!
//! - [`ThreadedSync`]: real granule mutexes, a real mark lock and condition
//!   variable. Used when parallel marking is enabled.
//! - [`InlineSync`]: every operation is a no-op. Marking runs on a single
//!   thread and needs no synchronization at all.
//!
//! Callers never branch on the mode; they hold the guards returned here and
//! let them drop.

use std::fmt;
use std::sync::Arc;

pub mod granule;
pub mod mark_lock;
pub mod order;

mod inline;
mod threaded;

#[cfg(feature = "tracing")]
pub(crate) mod tracing;

pub use granule::{lock_granules, GranuleGuard, GranuleLockTable, GranuleSet};
pub use inline::InlineSync;
pub use mark_lock::{GlobalMarkLock, MarkLockGuard};
pub use order::LockOrder;
pub use threaded::ThreadedSync;

use crate::config::SyncConfig;
use crate::metrics::SyncMetrics;

/// Which implementation of [`CollectorSync`] is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncMode {
    /// Multi-threaded marking with real locking.
    Threaded,
    /// Single-threaded marking; all operations are no-ops.
    Inline,
}

/// Synchronization operations the collector engine calls into.
///
/// Guards returned by this trait must be dropped on the thread that created
/// them.
pub trait CollectorSync: Send + Sync + fmt::Debug {
    /// The implementation in use.
    fn mode(&self) -> SyncMode;

    /// Number of granules (G).
    fn granules(&self) -> usize;

    /// Block until granule `index` is held by the caller.
    ///
    /// Not reentrant. Holding several granules requires ascending order, see
    /// [`lock_granules`].
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.granules()`. Debug builds also panic on lock
    /// ordering violations.
    fn lock_granule(&self, index: usize) -> GranuleGuard<'_>;

    /// Acquire granule `index` without blocking.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.granules()`.
    fn try_lock_granule(&self, index: usize) -> Option<GranuleGuard<'_>>;

    /// Block until the mark lock is held by the caller.
    fn acquire_mark_lock(&self) -> MarkLockGuard<'_>;

    /// Atomically release the mark lock held by `guard`, sleep until
    /// [`notify_all_marker`](Self::notify_all_marker), reacquire it.
    ///
    /// Wakeups may be spurious; re-check the shared state in a loop.
    fn wait_marker(&self, guard: &mut MarkLockGuard<'_>);

    /// Wake every thread blocked in [`wait_marker`](Self::wait_marker).
    ///
    /// Does not release the mark lock. Wake order is unspecified.
    fn notify_all_marker(&self);

    /// Returns `true` for the threaded implementation.
    fn is_parallel(&self) -> bool {
        self.mode() == SyncMode::Threaded
    }
}

/// Build the implementation selected by `config`.
#[must_use]
pub fn for_config(config: &SyncConfig, metrics: Arc<SyncMetrics>) -> Arc<dyn CollectorSync> {
    match config.mode() {
        SyncMode::Threaded => Arc::new(ThreadedSync::new(config.granules, metrics)),
        SyncMode::Inline => Arc::new(InlineSync::new(config.granules)),
    }
}
