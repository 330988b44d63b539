//! Error type for the recoverable failures of this crate.
//!
//! Lock, wait and notify operations have no error path: `parking_lot`
//! primitives cannot fail or be poisoned. Only configuration, thread startup,
//! cooperative stop requests and abandoned barrier rounds surface as
//! [`SyncError`].

use std::fmt;
use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors reported by initialization, the marker pool and stop checkpoints.
#[derive(Debug)]
pub enum SyncError {
    /// A configuration value is out of range or could not be parsed.
    InvalidConfig {
        /// Name of the offending field or environment variable.
        field: &'static str,
        /// Human readable reason.
        reason: String,
    },
    /// The OS refused to spawn a marker thread.
    Spawn(io::Error),
    /// `start_mark_threads` was called on a pool that is already running.
    AlreadyStarted,
    /// A stop was requested and the thread reached a safe point.
    StopRequested,
    /// A marker left the pool, so the current barrier round cannot complete.
    BarrierAbandoned,
    /// A marker thread panicked before it could be joined.
    MarkerPanicked {
        /// Index of the marker that panicked.
        marker: usize,
    },
}

impl SyncError {
    pub(crate) fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error is a cooperative stop rather than a failure.
    #[must_use]
    pub const fn is_stop(&self) -> bool {
        matches!(self, Self::StopRequested)
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { field, reason } => {
                write!(f, "invalid configuration for `{field}`: {reason}")
            }
            Self::Spawn(err) => write!(f, "failed to spawn marker thread: {err}"),
            Self::AlreadyStarted => f.write_str("marker threads have already been started"),
            Self::StopRequested => f.write_str("stop requested"),
            Self::BarrierAbandoned => {
                f.write_str("marker barrier abandoned: a marker left before the round completed")
            }
            Self::MarkerPanicked { marker } => write!(f, "marker thread {marker} panicked"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SyncError {
    fn from(err: io::Error) -> Self {
        Self::Spawn(err)
    }
}
