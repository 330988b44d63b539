//! Per-granule mutual exclusion.
//!
//! The heap is split into G disjoint granules and each one owns a mutex that
//! guards the mutable metadata of every block inside it. Mutators and markers
//! touching different granules never contend; work on the same granule
//! serializes.
//!
//! Locks are not reentrant and no order is imposed between two single
//! acquisitions. Code that needs several granules at once should go through
//! [`lock_granules`], which takes them in ascending index order (see
//! [`order`](super::order)).

use crossbeam::utils::CachePadded;
use parking_lot::{Mutex, MutexGuard};

use super::order::{LockOrder, OrderToken};
use super::CollectorSync;

/// Fixed-size table of independent granule mutexes.
pub struct GranuleLockTable {
    locks: Box<[CachePadded<Mutex<()>>]>,
}

impl GranuleLockTable {
    /// Create a table with `granules` unlocked entries.
    #[must_use]
    pub fn new(granules: usize) -> Self {
        Self {
            locks: (0..granules)
                .map(|_| CachePadded::new(Mutex::new(())))
                .collect(),
        }
    }

    /// Number of granules (G).
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns `true` if the table has no granules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Block until granule `index` is acquired.
    ///
    /// The second value is `true` if the lock was held by someone else when
    /// this call arrived.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn lock(&self, index: usize) -> (MutexGuard<'_, ()>, bool) {
        let mutex = self.slot(index);
        mutex
            .try_lock()
            .map_or_else(|| (mutex.lock(), true), |guard| (guard, false))
    }

    /// Acquire granule `index` if it is free.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn try_lock(&self, index: usize) -> Option<MutexGuard<'_, ()>> {
        self.slot(index).try_lock()
    }

    /// Returns `true` if some thread currently holds granule `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn is_locked(&self, index: usize) -> bool {
        self.slot(index).is_locked()
    }

    fn slot(&self, index: usize) -> &Mutex<()> {
        assert!(
            index < self.locks.len(),
            "granule index {index} out of range for table of {} granules",
            self.locks.len()
        );
        &self.locks[index]
    }
}

impl std::fmt::Debug for GranuleLockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GranuleLockTable")
            .field("granules", &self.locks.len())
            .finish()
    }
}

/// Exclusive hold on one granule. Unlocks when dropped.
///
/// In inline mode the guard holds nothing.
#[must_use = "the granule is unlocked as soon as the guard is dropped"]
pub struct GranuleGuard<'a> {
    index: usize,
    lock: Option<MutexGuard<'a, ()>>,
    _order: Option<OrderToken>,
}

impl<'a> GranuleGuard<'a> {
    pub(crate) fn locked(index: usize, lock: MutexGuard<'a, ()>, order: OrderToken) -> Self {
        Self {
            index,
            lock: Some(lock),
            _order: Some(order),
        }
    }

    pub(crate) const fn inline(index: usize) -> Self {
        Self {
            index,
            lock: None,
            _order: None,
        }
    }

    /// Index of the granule this guard protects.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Returns `true` if this guard holds a real lock.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// Release the granule.
    pub fn unlock(self) {
        drop(self);
    }
}

impl std::fmt::Debug for GranuleGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GranuleGuard")
            .field("index", &self.index)
            .field("locked", &self.lock.is_some())
            .finish()
    }
}

/// Several granules held at once, acquired in ascending order and released
/// in reverse.
#[must_use = "the granules are unlocked as soon as the set is dropped"]
#[derive(Debug)]
pub struct GranuleSet<'a> {
    guards: Vec<GranuleGuard<'a>>,
}

impl GranuleSet<'_> {
    /// Indices held by this set, ascending.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.guards.iter().map(GranuleGuard::index)
    }

    /// Number of granules held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Returns `true` if the set holds no granules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Release every granule in the set.
    pub fn unlock(self) {
        drop(self);
    }
}

impl Drop for GranuleSet<'_> {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

/// Lock every granule in `indices`.
///
/// Duplicates are ignored and the locks are taken in ascending index order,
/// so two threads locking overlapping sets cannot deadlock each other.
///
/// # Panics
///
/// Panics if any index is out of range.
pub fn lock_granules<'a, S>(sync: &'a S, indices: &[usize]) -> GranuleSet<'a>
where
    S: CollectorSync + ?Sized,
{
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let guards = sorted
        .into_iter()
        .map(|index| sync.lock_granule(index))
        .collect();
    GranuleSet { guards }
}

/// Blocking acquisition used by the threaded implementation.
pub(crate) fn acquire<'a>(
    table: &'a GranuleLockTable,
    index: usize,
) -> (GranuleGuard<'a>, bool) {
    let order = OrderToken::acquire(LockOrder::Granule(index));
    let (lock, contended) = table.lock(index);
    (GranuleGuard::locked(index, lock, order), contended)
}

/// Non-blocking acquisition used by the threaded implementation.
pub(crate) fn try_acquire(table: &GranuleLockTable, index: usize) -> Option<GranuleGuard<'_>> {
    let lock = table.try_lock(index)?;
    let order = OrderToken::acquired_without_blocking(LockOrder::Granule(index));
    Some(GranuleGuard::locked(index, lock, order))
}
