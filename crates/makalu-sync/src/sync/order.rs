//! # Lock Ordering Discipline
//!
//! Every lock in this layer belongs to one of two levels:
//!
//! | Level | Lock            | Protects                               |
//! |-------|-----------------|----------------------------------------|
//! | 1     | Granule `g`     | Block metadata of heap partition `g`   |
//! | 2     | Mark lock       | `MarkerCount`, parallel-mode flag      |
//!
//! ## Acquisition Rules
//!
//! 1. **Increasing Level**: the mark lock may be taken while holding granule
//!    locks, never the other way round.
//! 2. **Ascending Granules**: a thread holding several granule locks must have
//!    acquired them in strictly ascending index order.
//!    [`lock_granules`](super::granule::lock_granules) does this for you.
//! 3. **No Reentry**: neither a granule nor the mark lock may be locked again
//!    by the thread that holds it.
//!
//! `try_lock_granule` cannot deadlock, so it is recorded but never rejected.
//!
//! ## Validation
//!
//! Debug builds keep a per-thread list of held locks and panic with
//! `"Lock ordering violation"` on the first rule broken. Release builds do
//! not track anything; [`OrderToken`] is then a zero-sized no-op.

#[cfg(debug_assertions)]
use std::cell::RefCell;

/// Identity of a lock for ordering purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOrder {
    /// Granule lock with its table index (level 1).
    Granule(usize),
    /// Global mark lock (level 2).
    MarkLock,
}

impl LockOrder {
    /// Level of this lock in the acquisition hierarchy.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Granule(_) => 1,
            Self::MarkLock => 2,
        }
    }
}

#[cfg(debug_assertions)]
const MAX_LOCK_DEPTH: usize = 16;

#[cfg(debug_assertions)]
thread_local!(static HELD_LOCKS: RefCell<Vec<LockOrder>> = RefCell::new(Vec::with_capacity(MAX_LOCK_DEPTH)));

/// Record of one held lock. Dropping it forgets the lock.
#[derive(Debug)]
#[must_use]
pub(crate) struct OrderToken {
    #[cfg(debug_assertions)]
    tag: LockOrder,
}

impl OrderToken {
    /// Validate and record a blocking acquisition of `tag`.
    ///
    /// Call before blocking on the lock, so a violation panics instead of
    /// deadlocking.
    pub(crate) fn acquire(tag: LockOrder) -> Self {
        #[cfg(debug_assertions)]
        {
            validate_lock_order(tag);
            record(tag);
            Self { tag }
        }
        #[cfg(not(debug_assertions))]
        {
            let _ = tag;
            Self {}
        }
    }

    /// Record a non-blocking acquisition of `tag` without validation.
    pub(crate) fn acquired_without_blocking(tag: LockOrder) -> Self {
        #[cfg(debug_assertions)]
        {
            record(tag);
            Self { tag }
        }
        #[cfg(not(debug_assertions))]
        {
            let _ = tag;
            Self {}
        }
    }
}

#[cfg(debug_assertions)]
impl Drop for OrderToken {
    fn drop(&mut self) {
        let tag = self.tag;
        let _ = HELD_LOCKS.try_with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|h| *h == tag) {
                held.remove(pos);
            }
        });
    }
}

#[cfg(debug_assertions)]
fn record(tag: LockOrder) {
    let _ = HELD_LOCKS.try_with(|held| held.borrow_mut().push(tag));
}

/// Panic if acquiring `tag` now would break the ordering discipline.
#[cfg(debug_assertions)]
fn validate_lock_order(tag: LockOrder) {
    let _ = HELD_LOCKS.try_with(|held| {
        for &current in held.borrow().iter() {
            assert!(
                current != tag,
                "Lock ordering violation: {tag:?} is already held by this thread"
            );
            assert!(
                current.level() <= tag.level(),
                "Lock ordering violation: {tag:?} (level {}) cannot be acquired while holding {current:?} (level {})",
                tag.level(),
                current.level()
            );

            if let (LockOrder::Granule(wanted), LockOrder::Granule(owned)) = (tag, current) {
                assert!(
                    wanted > owned,
                    "Lock ordering violation: granule {wanted} acquired while holding granule {owned}; granules must be locked in ascending order"
                );
            }
        }
    });
}

/// Locks currently recorded for this thread, oldest first.
#[cfg(all(test, debug_assertions))]
pub(crate) fn held_locks() -> Vec<LockOrder> {
    HELD_LOCKS.with(|held| held.borrow().clone())
}
