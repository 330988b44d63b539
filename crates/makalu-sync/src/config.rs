//! Configuration for the synchronization layer.
//!
//! The collector engine decides how many markers to run and how the heap is
//! split into granules; this layer only receives the numbers.

use std::num::NonZeroUsize;

use crate::error::{Result, SyncError};
use crate::sync::SyncMode;

/// Upper bound on the number of marker threads.
pub const MAX_MARKERS: usize = 16;

/// Granule table size used when none is configured.
pub const DEFAULT_GRANULES: usize = 64;

/// Environment variable enabling or disabling parallel marking.
pub const ENV_PARALLEL_MARK: &str = "MAKALU_PARALLEL_MARK";
/// Environment variable overriding the marker count.
pub const ENV_MARKERS: &str = "MAKALU_MARKERS";
/// Environment variable overriding the granule table size.
pub const ENV_GRANULES: &str = "MAKALU_GRANULES";

/// Configuration consumed by [`thr_init`](crate::thr_init).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Whether marking runs on multiple threads with real locking.
    /// When `false` every synchronization operation is a no-op.
    pub parallel_mark: bool,
    /// Number of marker threads (N).
    pub markers: usize,
    /// Number of heap granules (G).
    pub granules: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            parallel_mark: true,
            markers: available_parallelism().clamp(1, MAX_MARKERS),
            granules: DEFAULT_GRANULES,
        }
    }
}

impl SyncConfig {
    /// Create a parallel configuration with the given marker and granule counts.
    #[must_use]
    pub const fn new(markers: usize, granules: usize) -> Self {
        Self {
            parallel_mark: true,
            markers,
            granules,
        }
    }

    /// Create a single-threaded configuration. Markers is fixed at 1.
    #[must_use]
    pub const fn inline(granules: usize) -> Self {
        Self {
            parallel_mark: false,
            markers: 1,
            granules,
        }
    }

    /// Read the configuration from the process environment on top of the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if a variable is set to a value
    /// that cannot be parsed or the result fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), with a caller supplied lookup.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_PARALLEL_MARK) {
            config.parallel_mark = parse_flag(ENV_PARALLEL_MARK, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MARKERS) {
            config.markers = parse_count(ENV_MARKERS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_GRANULES) {
            config.granules = parse_count(ENV_GRANULES, &raw)?;
        }
        if !config.parallel_mark {
            config.markers = 1;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the marker and granule counts are usable.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] for zero markers, more than
    /// [`MAX_MARKERS`] markers, or zero granules.
    pub fn validate(&self) -> Result<()> {
        if self.markers == 0 {
            return Err(SyncError::invalid_config("markers", "must be at least 1"));
        }
        if self.markers > MAX_MARKERS {
            return Err(SyncError::invalid_config(
                "markers",
                format!("{} exceeds the maximum of {MAX_MARKERS}", self.markers),
            ));
        }
        if self.granules == 0 {
            return Err(SyncError::invalid_config("granules", "must be at least 1"));
        }
        Ok(())
    }

    /// The synchronization mode selected by this configuration.
    #[must_use]
    pub const fn mode(&self) -> SyncMode {
        if self.parallel_mark {
            SyncMode::Threaded
        } else {
            SyncMode::Inline
        }
    }

    /// Set the number of marker threads.
    pub const fn set_markers(&mut self, markers: usize) {
        self.markers = markers;
    }

    /// Set the number of granules.
    pub const fn set_granules(&mut self, granules: usize) {
        self.granules = granules;
    }

    /// Enable or disable parallel marking.
    pub const fn set_parallel_mark(&mut self, enabled: bool) {
        self.parallel_mark = enabled;
    }
}

/// Get the number of CPUs available for parallel marking.
#[must_use]
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

fn parse_flag(field: &'static str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(SyncError::invalid_config(
            field,
            format!("expected a boolean, got {other:?}"),
        )),
    }
}

fn parse_count(field: &'static str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|err| SyncError::invalid_config(field, format!("{raw:?}: {err}")))
}
