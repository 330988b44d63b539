//! Reusable N-of-N completion barrier for marker threads.
//!
//! Each marker calls [`MarkerBarrier::arrive`] once it has finished its share
//! of the traversal. Under the mark lock the call decrements `MarkerCount`:
//!
//! - the marker that brings the count to zero closes the round, advances the
//!   round counter and wakes everyone with `notify_all_marker`;
//! - every other marker sleeps in `wait_marker` until the round counter moves.
//!
//! Waiters compare round numbers instead of the count, so spurious wakeups
//! and markers racing ahead into the next round are harmless. A marker that
//! arrives while no round is in flight (count at zero) opens the next round
//! by resetting the count to N first; [`MarkerBarrier::begin_round`] does the
//! same explicitly.
//!
//! A marker that leaves for good calls [`MarkerBarrier::abandon`]. The round
//! in flight can then never fill up, so every waiter is woken and gets
//! [`Arrival::Abandoned`], and so does every later arrival until the next
//! [`MarkerBarrier::begin_round`]. The marker pool does this on behalf of
//! every marker thread that returns or unwinds.
//!
//! In inline mode there is one marker and `arrive` completes immediately.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cancel::StopToken;
use crate::error::{Result, SyncError};
use crate::metrics::SyncMetrics;
use crate::sync::CollectorSync;

/// How a call to [`MarkerBarrier::arrive`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// This marker was the last to arrive and completed the round.
    Completed {
        /// The round number, starting at 1.
        round: u64,
    },
    /// Another marker completed the round and released this one.
    Released {
        /// The round number, starting at 1.
        round: u64,
    },
    /// The round was given up because a marker left the barrier.
    Abandoned {
        /// The round that did not complete.
        round: u64,
    },
}

impl Arrival {
    /// The round this arrival belonged to.
    #[must_use]
    pub const fn round(self) -> u64 {
        match self {
            Self::Completed { round } | Self::Released { round } | Self::Abandoned { round } => {
                round
            }
        }
    }

    /// Returns `true` if this marker completed the round.
    #[must_use]
    pub const fn is_last(self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Returns `true` if the round did not complete.
    #[must_use]
    pub const fn is_abandoned(self) -> bool {
        matches!(self, Self::Abandoned { .. })
    }
}

/// Completion barrier over the mark lock of a [`CollectorSync`].
pub struct MarkerBarrier {
    sync: Arc<dyn CollectorSync>,
    participants: usize,
    // Written only while holding the mark lock in threaded mode.
    completed: AtomicU64,
    metrics: Arc<SyncMetrics>,
}

impl MarkerBarrier {
    /// Create a barrier for `participants` markers.
    ///
    /// # Panics
    ///
    /// Panics if `participants` is zero.
    #[must_use]
    pub fn new(
        sync: Arc<dyn CollectorSync>,
        participants: usize,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        assert!(participants > 0, "a barrier needs at least one participant");
        Self {
            sync,
            participants,
            completed: AtomicU64::new(0),
            metrics,
        }
    }

    /// Number of markers that must arrive to complete a round (N).
    #[must_use]
    pub const fn participants(&self) -> usize {
        self.participants
    }

    /// Number of rounds completed so far.
    #[must_use]
    pub fn rounds_completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Set `MarkerCount` to N, opening a new round.
    ///
    /// Also clears an earlier [`abandon`](Self::abandon). Must not be called
    /// while a round is in flight.
    pub fn begin_round(&self) {
        let mut guard = self.sync.acquire_mark_lock();
        if let Some(phase) = guard.phase_mut() {
            debug_assert!(
                phase.markers_active == 0 || phase.abandoned,
                "begin_round called while a round is in flight"
            );
            phase.markers_active = self.participants;
            phase.stop_latched = false;
            phase.abandoned = false;
        }
    }

    /// Give up the round in flight because a marker will not arrive again.
    ///
    /// Wakes every waiter with [`Arrival::Abandoned`]. Waiters whose round
    /// already completed still get their normal result.
    pub fn abandon(&self) {
        let mut guard = self.sync.acquire_mark_lock();
        if let Some(phase) = guard.phase_mut() {
            if !phase.abandoned {
                phase.abandoned = true;
                self.sync.notify_all_marker();
            }
        }
    }

    /// Returns `true` if the barrier was abandoned and not reopened since.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        let mut guard = self.sync.acquire_mark_lock();
        guard.phase_mut().is_some_and(|phase| phase.abandoned)
    }

    /// Arrive at the barrier and block until all N markers of this round
    /// have arrived.
    pub fn arrive(&self) -> Arrival {
        self.arrive_inner(|| false).0
    }

    /// Like [`arrive`](Self::arrive), and also report a stop request.
    ///
    /// The last marker of the round samples `stop` once and every marker of
    /// that round gets the same answer, so either all of them leave the
    /// marking loop or none do.
    ///
    /// # Errors
    ///
    /// - [`SyncError::StopRequested`] when the round closed with a stop
    ///   pending.
    /// - [`SyncError::BarrierAbandoned`] when the round was abandoned.
    pub fn arrive_and_check(&self, stop: &StopToken) -> Result<Arrival> {
        let (arrival, stopped) = self.arrive_inner(|| stop.is_stop_requested());
        if stopped {
            Err(SyncError::StopRequested)
        } else if arrival.is_abandoned() {
            Err(SyncError::BarrierAbandoned)
        } else {
            Ok(arrival)
        }
    }

    /// Block until more than `after` rounds have completed and return the
    /// new count.
    ///
    /// For threads that do not take part in the round, such as the collector
    /// thread driving the markers. Returns early, with the count unchanged,
    /// if the barrier is abandoned.
    pub fn wait_round(&self, after: u64) -> u64 {
        let mut guard = self.sync.acquire_mark_lock();
        loop {
            let now = self.completed.load(Ordering::Acquire);
            let abandoned = guard.phase_mut().is_some_and(|phase| phase.abandoned);
            if now > after || abandoned || !guard.is_locked() {
                return now;
            }
            self.sync.wait_marker(&mut guard);
        }
    }

    // tests/loom_barrier.rs models this protocol on loom primitives; keep the
    // two in step.
    fn arrive_inner<F>(&self, decide_stop: F) -> (Arrival, bool)
    where
        F: FnOnce() -> bool,
    {
        let mut guard = self.sync.acquire_mark_lock();

        let Some(phase) = guard.phase_mut() else {
            let round = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
            return (Arrival::Completed { round }, decide_stop());
        };

        if phase.abandoned {
            let round = self.completed.load(Ordering::Acquire) + 1;
            return (Arrival::Abandoned { round }, false);
        }
        if phase.markers_active == 0 {
            phase.markers_active = self.participants;
            phase.stop_latched = false;
        }
        phase.markers_active -= 1;

        if phase.markers_active == 0 {
            let stop = decide_stop();
            phase.stop_latched = stop;
            let round = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
            self.metrics.record_round();
            #[cfg(feature = "tracing")]
            crate::sync::tracing::log_round_complete(round, self.participants);
            self.sync.notify_all_marker();
            return (Arrival::Completed { round }, stop);
        }

        let waiting_on = self.completed.load(Ordering::Acquire);
        #[cfg(feature = "tracing")]
        crate::sync::tracing::log_marker_wait(waiting_on + 1, phase.markers_active);

        loop {
            if self.completed.load(Ordering::Acquire) != waiting_on {
                // The next round cannot close before this marker arrives
                // again, so the latched decision still belongs to our round.
                let stop = guard.phase_mut().is_some_and(|phase| phase.stop_latched);
                return (
                    Arrival::Released {
                        round: waiting_on + 1,
                    },
                    stop,
                );
            }
            if guard.phase_mut().is_some_and(|phase| phase.abandoned) {
                return (
                    Arrival::Abandoned {
                        round: waiting_on + 1,
                    },
                    false,
                );
            }
            self.sync.wait_marker(&mut guard);
        }
    }
}

impl fmt::Debug for MarkerBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerBarrier")
            .field("participants", &self.participants)
            .field("rounds_completed", &self.rounds_completed())
            .finish_non_exhaustive()
    }
}
