use std::io;

#[cfg(all(unix, not(target_os = "android"), not(miri)))]
mod posix;
#[cfg(all(unix, not(target_os = "android"), not(miri)))]
use posix as os;

#[cfg(any(not(unix), target_os = "android", miri))]
mod unsupported;
#[cfg(any(not(unix), target_os = "android", miri))]
use unsupported as os;

/// The cancellation disposition of a thread.
///
/// `Enabled` means a cancellation request delivered to the thread is acted on
/// (at the next cancellation point); `Disabled` means it stays pending until
/// the disposition is enabled again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelState {
    /// Cancellation requests are honored.
    Enabled,
    /// Cancellation requests are deferred.
    Disabled,
}

/// Returns `true` if this platform exposes a thread cancellation disposition.
///
/// When this returns `false`, every other function in this crate fails with
/// [`io::ErrorKind::Unsupported`].
#[must_use]
pub const fn is_supported() -> bool {
    os::SUPPORTED
}

/// Sets the calling thread's cancellation disposition and returns the
/// previous one.
///
/// # Errors
///
/// Returns the OS error if the disposition could not be changed, or
/// [`io::ErrorKind::Unsupported`] on platforms without thread cancellation.
pub fn set_cancel_state(state: CancelState) -> io::Result<CancelState> {
    os::set_cancel_state(state)
}

/// Returns the calling thread's current cancellation disposition.
///
/// POSIX has no read-only query, so this switches to `Disabled` and
/// immediately writes the old value back.
///
/// # Errors
///
/// Same as [`set_cancel_state`].
pub fn cancel_state() -> io::Result<CancelState> {
    let previous = os::set_cancel_state(CancelState::Disabled)?;
    os::set_cancel_state(previous)?;
    Ok(previous)
}
