//! Synchronization layer for a parallel mark-sweep collector embedded in a
//! persistent-memory allocator.
//!
//! `makalu-sync` lets several marker threads traverse the live-object graph
//! while mutators keep allocating and freeing, and guarantees that:
//!
//! - heap metadata is never written by two threads at once, through one lock
//!   per heap **granule** ([`CollectorSync::lock_granule`]);
//! - every marking round has one completion point that all markers observe
//!   ([`MarkerBarrier`]);
//! - multi-write updates of persistent metadata are not cut short by thread
//!   cancellation ([`CancellationGuard`]).
//!
//! The allocator, the tracing algorithm and the persistent heap layout are
//! outside this crate; they call into it.
//!
//! # Quick Start
//!
//! ```
//! use makalu_sync::{thr_init, MarkerThreadPool, SyncConfig};
//!
//! let context = thr_init(SyncConfig::new(4, 64)).unwrap();
//! let pool = MarkerThreadPool::new(context.clone());
//!
//! pool.start_mark_threads(|marker| {
//!     loop {
//!         {
//!             let _granule = marker.sync().lock_granule(marker.id());
//!             // ... mark objects in this granule ...
//!         }
//!         if marker.arrive().is_err() {
//!             break;
//!         }
//!     }
//! })
//! .unwrap();
//!
//! let seen = context.barrier().wait_round(0);
//! assert!(seen >= 1);
//! pool.shutdown().unwrap();
//! ```
//!
//! # Single-threaded Mode
//!
//! With `parallel_mark` off, [`thr_init`] selects [`InlineSync`]: every lock
//! and wait is a no-op, the barrier completes immediately, and the pool spawns
//! no threads.
//!
//! # Lock Ordering
//!
//! Granule locks must be taken in ascending index order, and the mark lock
//! only after them. See [`sync::order`].

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod barrier;
pub mod cancel;
pub mod config;
pub mod context;
mod error;
pub mod metrics;
pub mod pool;
pub mod sync;

pub use barrier::{Arrival, MarkerBarrier};
pub use cancel::{
    disable_cancel, restore_cancel, without_cancellation, CancelDisposition, CancelState,
    CancellationGuard, StopToken,
};
pub use config::SyncConfig;
pub use context::{thr_init, SyncContext};
pub use error::{Result, SyncError};
pub use metrics::{SyncMetrics, SyncMetricsSnapshot};
pub use pool::{MarkerContext, MarkerThreadPool};
pub use sync::{
    lock_granules, CollectorSync, GranuleGuard, GranuleSet, InlineSync, MarkLockGuard, SyncMode,
    ThreadedSync,
};
