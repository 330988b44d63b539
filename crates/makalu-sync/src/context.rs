//! The collector synchronization context.
//!
//! Everything the layer shares between threads lives in one [`SyncContext`]
//! built by [`thr_init`] at collector startup and handed out by `Arc`. There
//! are no process-wide statics; two collectors in one process get two
//! independent contexts.

use std::sync::Arc;

use crate::barrier::MarkerBarrier;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::metrics::{SyncMetrics, SyncMetricsSnapshot};
use crate::sync::{self, CollectorSync, GranuleGuard, MarkLockGuard, SyncMode};

/// Granule locks, mark lock and marker barrier for one collector.
#[derive(Debug)]
pub struct SyncContext {
    config: SyncConfig,
    sync: Arc<dyn CollectorSync>,
    barrier: MarkerBarrier,
    metrics: Arc<SyncMetrics>,
}

/// Validate `config` and build the shared synchronization state.
///
/// Must run before any allocation or collection activity that uses the
/// context. Each call builds a fresh, independent context.
///
/// # Errors
///
/// Returns [`SyncError::InvalidConfig`](crate::SyncError::InvalidConfig) if
/// the configuration does not validate.
pub fn thr_init(config: SyncConfig) -> Result<Arc<SyncContext>> {
    SyncContext::new(config).map(Arc::new)
}

impl SyncContext {
    /// Build a context without wrapping it in an `Arc`.
    ///
    /// # Errors
    ///
    /// See [`thr_init`].
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(SyncMetrics::new());
        let sync = sync::for_config(&config, Arc::clone(&metrics));
        let participants = match config.mode() {
            SyncMode::Threaded => config.markers,
            SyncMode::Inline => 1,
        };
        let barrier = MarkerBarrier::new(Arc::clone(&sync), participants, Arc::clone(&metrics));

        #[cfg(feature = "tracing")]
        crate::sync::tracing::log_context_init(&config);

        Ok(Self {
            config,
            sync,
            barrier,
            metrics,
        })
    }

    /// The configuration this context was built from.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The synchronization mode in use.
    #[must_use]
    pub fn mode(&self) -> SyncMode {
        self.sync.mode()
    }

    /// The synchronization interface.
    #[must_use]
    pub fn sync(&self) -> &dyn CollectorSync {
        self.sync.as_ref()
    }

    /// A shared handle to the synchronization interface.
    #[must_use]
    pub fn sync_handle(&self) -> Arc<dyn CollectorSync> {
        Arc::clone(&self.sync)
    }

    /// The marker completion barrier.
    #[must_use]
    pub const fn barrier(&self) -> &MarkerBarrier {
        &self.barrier
    }

    /// Current counter values.
    #[must_use]
    pub fn metrics(&self) -> SyncMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// See [`CollectorSync::lock_granule`].
    pub fn lock_granule(&self, index: usize) -> GranuleGuard<'_> {
        self.sync.lock_granule(index)
    }

    /// See [`CollectorSync::acquire_mark_lock`].
    pub fn acquire_mark_lock(&self) -> MarkLockGuard<'_> {
        self.sync.acquire_mark_lock()
    }

    /// See [`CollectorSync::wait_marker`].
    pub fn wait_marker(&self, guard: &mut MarkLockGuard<'_>) {
        self.sync.wait_marker(guard);
    }

    /// See [`CollectorSync::notify_all_marker`].
    pub fn notify_all_marker(&self) {
        self.sync.notify_all_marker();
    }
}
