//! Cancellation-safe critical sections.
//!
//! Updates to persistent metadata that span several writes (unlinking a free
//! block, then marking the heap clean) must not be cut short, or the on-media
//! state cannot be recovered after a restart. This module makes such sections
//! non-interruptible in two layers:
//!
//! - **Cooperative**: each thread carries a [`CancelDisposition`]. A
//!   [`StopToken`] only takes effect at a safe point
//!   ([`StopToken::checkpoint`]) while the disposition is `Enabled`; inside a
//!   guarded section the stop is deferred.
//! - **OS level**: where the platform has asynchronous thread cancellation
//!   (POSIX), the thread's OS disposition is switched to disabled for the
//!   same span via `sys_cancel`. This is best-effort; if the OS refuses, the
//!   section is still protected cooperatively.
//!
//! # Examples
//!
//! ```
//! use makalu_sync::cancel::{current_disposition, CancelDisposition, CancellationGuard};
//!
//! fn unlink_and_mark_clean() -> Result<(), std::io::Error> {
//!     let _guard = CancellationGuard::new();
//!     assert_eq!(current_disposition(), CancelDisposition::Deferred);
//!     // ... several persistent writes, possibly returning early with `?` ...
//!     Ok(())
//! }
//!
//! unlink_and_mark_clean().unwrap();
//! assert_eq!(current_disposition(), CancelDisposition::Enabled);
//! ```

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, SyncError};

/// Whether the current thread acts on stop requests at safe points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelDisposition {
    /// Stop requests are honored at the next safe point.
    Enabled,
    /// Stop requests are held back until the disposition is restored.
    Deferred,
}

thread_local! {
    static DISPOSITION: Cell<CancelDisposition> = const { Cell::new(CancelDisposition::Enabled) };
}

/// Disposition captured by [`disable_cancel`].
///
/// Must be handed to exactly one [`restore_cancel`] on the same thread. It
/// cannot be cloned or sent to another thread.
#[must_use = "a disabled cancellation state must be passed to `restore_cancel`"]
#[derive(Debug)]
pub struct CancelState {
    previous: CancelDisposition,
    os: Option<sys_cancel::CancelState>,
    _not_send: PhantomData<*const ()>,
}

impl CancelState {
    /// The disposition that was in effect before `disable_cancel`.
    #[must_use]
    pub const fn previous(&self) -> CancelDisposition {
        self.previous
    }

    /// Returns `true` if the OS-level disposition was also changed.
    #[must_use]
    pub const fn covers_os(&self) -> bool {
        self.os.is_some()
    }
}

/// The calling thread's current disposition.
#[must_use]
pub fn current_disposition() -> CancelDisposition {
    DISPOSITION.with(Cell::get)
}

/// Capture the calling thread's disposition and defer cancellation.
///
/// Pair with [`restore_cancel`], or use [`CancellationGuard`] to have the
/// restore happen on every exit path.
pub fn disable_cancel() -> CancelState {
    let previous = DISPOSITION.with(|d| d.replace(CancelDisposition::Deferred));

    let os = if sys_cancel::is_supported() {
        match sys_cancel::set_cancel_state(sys_cancel::CancelState::Disabled) {
            Ok(old) => Some(old),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                crate::sync::tracing::log_cancel_degraded(&_err);
                None
            }
        }
    } else {
        None
    };

    CancelState {
        previous,
        os,
        _not_send: PhantomData,
    }
}

/// Restore the disposition captured by the matching [`disable_cancel`].
pub fn restore_cancel(state: CancelState) {
    if let Some(os) = state.os {
        if let Err(_err) = sys_cancel::set_cancel_state(os) {
            #[cfg(feature = "tracing")]
            crate::sync::tracing::log_cancel_degraded(&_err);
        }
    }
    DISPOSITION.with(|d| d.set(state.previous));
}

/// Scope during which the current thread cannot be cancelled.
///
/// Dropping the guard restores the previous disposition, so normal returns,
/// `?` early returns and panics all leave the thread as they found it.
/// Guards may nest as long as they are dropped in reverse order.
#[must_use = "cancellation is re-enabled as soon as the guard is dropped"]
#[derive(Debug)]
pub struct CancellationGuard {
    state: Option<CancelState>,
}

impl CancellationGuard {
    /// Disable cancellation until the guard is dropped.
    pub fn new() -> Self {
        Self {
            state: Some(disable_cancel()),
        }
    }

    /// Whether the OS-level disposition is also held disabled.
    #[must_use]
    pub fn covers_os(&self) -> bool {
        self.state.as_ref().is_some_and(CancelState::covers_os)
    }
}

impl Default for CancellationGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CancellationGuard {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            restore_cancel(state);
        }
    }
}

/// Run `f` with cancellation disabled.
pub fn without_cancellation<R, F>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = CancellationGuard::new();
    f()
}

/// Shared cooperative stop request.
///
/// Cloning shares the flag. Threads observe the request only at safe points.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    requested: Arc<AtomicBool>,
}

impl StopToken {
    /// Create a token with no stop requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this token to stop at its next safe point.
    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Returns `true` once a stop has been requested.
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// A safe point.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::StopRequested`] if a stop was requested and the
    /// calling thread is not inside a [`CancellationGuard`].
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_stop_requested() && current_disposition() == CancelDisposition::Enabled {
            Err(SyncError::StopRequested)
        } else {
            Ok(())
        }
    }
}
