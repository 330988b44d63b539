//! Marker thread lifecycle.
//!
//! [`MarkerThreadPool::start_mark_threads`] spawns the N marker threads of a
//! [`SyncContext`]; each one runs the engine's tracing loop once. Threads are
//! spawned behind a start gate: if any spawn fails, the ones already created
//! exit without running the loop, so a partial pool never blocks on a
//! barrier that can no longer fill up.
//!
//! Shutdown is cooperative. [`MarkerThreadPool::shutdown`] raises the pool's
//! [`StopToken`] and joins the markers; each marker leaves its loop when
//! [`MarkerContext::arrive`] or [`MarkerContext::checkpoint`] reports the
//! stop. A marker that never reaches a safe point keeps `shutdown` waiting.
//!
//! Markers that share the barrier should leave their loop through
//! [`MarkerContext::arrive`], where every marker of the closing round gets the
//! same answer. A marker thread that returns any other way, or panics,
//! abandons the barrier on its way out: the markers still waiting get
//! [`SyncError::BarrierAbandoned`] instead of blocking forever.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::barrier::{Arrival, MarkerBarrier};
use crate::cancel::StopToken;
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::sync::{CollectorSync, SyncMode};

/// What a marker thread sees of the pool.
#[derive(Clone)]
pub struct MarkerContext {
    id: usize,
    context: Arc<SyncContext>,
    stop: StopToken,
}

impl MarkerContext {
    /// Create a marker context.
    ///
    /// The pool builds these for its threads. In inline mode the engine
    /// builds one for the thread that does the marking.
    #[must_use]
    pub const fn new(id: usize, context: Arc<SyncContext>, stop: StopToken) -> Self {
        Self { id, context, stop }
    }

    /// Index of this marker, `0..N`.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// The shared synchronization context.
    #[must_use]
    pub const fn context(&self) -> &Arc<SyncContext> {
        &self.context
    }

    /// The synchronization interface.
    #[must_use]
    pub fn sync(&self) -> &dyn CollectorSync {
        self.context.sync()
    }

    /// The marker completion barrier.
    #[must_use]
    pub fn barrier(&self) -> &MarkerBarrier {
        self.context.barrier()
    }

    /// The pool's stop token.
    #[must_use]
    pub const fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    /// Arrive at the end-of-round barrier.
    ///
    /// # Errors
    ///
    /// - [`SyncError::StopRequested`] when the round closed with a shutdown
    ///   pending; every marker of that round gets the same answer.
    /// - [`SyncError::BarrierAbandoned`] when another marker left the pool
    ///   before the round completed.
    pub fn arrive(&self) -> Result<Arrival> {
        self.context.barrier().arrive_and_check(&self.stop)
    }

    /// A safe point outside the barrier.
    ///
    /// Leaving the marking loop here abandons the barrier for the other
    /// markers; prefer [`arrive`](Self::arrive) when they share rounds.
    ///
    /// # Errors
    ///
    /// See [`StopToken::checkpoint`].
    pub fn checkpoint(&self) -> Result<()> {
        self.stop.checkpoint()
    }
}

impl fmt::Debug for MarkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerContext")
            .field("id", &self.id)
            .field("stop_requested", &self.stop.is_stop_requested())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Pending,
    Open,
    Aborted,
}

/// Start gate shared by freshly spawned markers.
#[derive(Debug)]
struct StartGate {
    state: Mutex<Gate>,
    changed: Condvar,
}

impl StartGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(Gate::Pending),
            changed: Condvar::new(),
        }
    }

    fn set(&self, gate: Gate) {
        *self.state.lock() = gate;
        self.changed.notify_all();
    }

    /// Block until the gate leaves `Pending`; returns `true` if it opened.
    fn pass(&self) -> bool {
        let mut state = self.state.lock();
        while *state == Gate::Pending {
            self.changed.wait(&mut state);
        }
        *state == Gate::Open
    }
}

/// Abandons the barrier when a marker thread leaves `work`, by return or
/// by unwinding.
struct LeaveBarrier<'a> {
    marker: &'a MarkerContext,
}

impl Drop for LeaveBarrier<'_> {
    fn drop(&mut self) {
        #[cfg(feature = "tracing")]
        crate::sync::tracing::log_marker_left(self.marker.id(), thread::panicking());
        self.marker.barrier().abandon();
    }
}

/// Owner of the marker threads of one [`SyncContext`].
pub struct MarkerThreadPool {
    context: Arc<SyncContext>,
    stop: StopToken,
    started: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MarkerThreadPool {
    /// Create a pool for `context`. No threads are started yet.
    #[must_use]
    pub fn new(context: Arc<SyncContext>) -> Self {
        Self {
            context,
            stop: StopToken::new(),
            started: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// The shared synchronization context.
    #[must_use]
    pub const fn context(&self) -> &Arc<SyncContext> {
        &self.context
    }

    /// The stop token handed to every marker.
    #[must_use]
    pub const fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    /// Number of marker threads currently owned by the pool.
    #[must_use]
    pub fn running(&self) -> usize {
        self.handles.lock().len()
    }

    /// A marker context for the calling thread, with id 0.
    ///
    /// Meant for inline mode, where no marker threads exist and the engine
    /// marks on its own thread.
    #[must_use]
    pub fn inline_context(&self) -> MarkerContext {
        MarkerContext::new(0, Arc::clone(&self.context), self.stop.clone())
    }

    /// Spawn the configured number of marker threads, each running `work`.
    ///
    /// Returns the number of threads spawned once they are all running; it
    /// does not wait for any marking round. In inline mode nothing is spawned
    /// and `Ok(0)` is returned.
    ///
    /// # Errors
    ///
    /// - [`SyncError::AlreadyStarted`] if the pool was started before.
    /// - [`SyncError::Spawn`] if the OS could not create a thread. Threads
    ///   created before the failure exit without calling `work`, and the
    ///   pool may be started again.
    pub fn start_mark_threads<F>(&self, work: F) -> Result<usize>
    where
        F: Fn(&MarkerContext) + Send + Sync + 'static,
    {
        self.start_with(work, |name, body| {
            thread::Builder::new().name(name).spawn(body)
        })
    }

    fn start_with<F, S>(&self, work: F, mut spawn: S) -> Result<usize>
    where
        F: Fn(&MarkerContext) + Send + Sync + 'static,
        S: FnMut(String, Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>>,
    {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SyncError::AlreadyStarted);
        }
        if self.context.mode() == SyncMode::Inline {
            return Ok(0);
        }

        let markers = self.context.config().markers;
        let work = Arc::new(work);
        let gate = Arc::new(StartGate::new());
        let mut spawned = Vec::with_capacity(markers);

        for id in 0..markers {
            let marker = MarkerContext::new(id, Arc::clone(&self.context), self.stop.clone());
            let marker_work = Arc::clone(&work);
            let marker_gate = Arc::clone(&gate);

            let body: Box<dyn FnOnce() + Send> = Box::new(move || {
                if !marker_gate.pass() {
                    return;
                }
                #[cfg(feature = "tracing")]
                let _span = crate::sync::tracing::span_marker(marker.id());
                let _leave = LeaveBarrier { marker: &marker };
                marker_work(&marker);
            });

            match spawn(format!("makalu-marker-{id}"), body) {
                Ok(handle) => spawned.push(handle),
                Err(err) => {
                    gate.set(Gate::Aborted);
                    for handle in spawned {
                        let _ = handle.join();
                    }
                    self.started.store(false, Ordering::Release);
                    return Err(SyncError::Spawn(err));
                }
            }
        }

        let count = spawned.len();
        self.handles.lock().extend(spawned);
        gate.set(Gate::Open);

        #[cfg(feature = "tracing")]
        crate::sync::tracing::log_markers_started(count);

        Ok(count)
    }

    /// Request a cooperative stop and join every marker thread.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MarkerPanicked`] naming the first marker that
    /// panicked. All markers are joined either way.
    pub fn shutdown(&self) -> Result<()> {
        self.stop.request_stop();

        let handles = std::mem::take(&mut *self.handles.lock());
        #[cfg(feature = "tracing")]
        crate::sync::tracing::log_markers_stopped(handles.len());

        let mut first_panic = None;
        for (marker, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() && first_panic.is_none() {
                first_panic = Some(marker);
            }
        }

        first_panic.map_or(Ok(()), |marker| Err(SyncError::MarkerPanicked { marker }))
    }
}

impl Drop for MarkerThreadPool {
    fn drop(&mut self) {
        if !self.handles.get_mut().is_empty() {
            let _ = self.shutdown();
        }
    }
}

impl fmt::Debug for MarkerThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerThreadPool")
            .field("running", &self.running())
            .field("stop_requested", &self.stop.is_stop_requested())
            .finish_non_exhaustive()
    }
}
