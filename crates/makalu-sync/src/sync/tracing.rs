//! Tracing spans and events for the synchronization layer.

use tracing::span::EnteredSpan;

use crate::config::SyncConfig;

/// Create a span covering the lifetime of one marker thread.
pub fn span_marker(marker: usize) -> EnteredSpan {
    tracing::debug_span!("marker", marker = marker).entered()
}

/// Log creation of a synchronization context.
pub fn log_context_init(config: &SyncConfig) {
    tracing::debug!(
        parallel_mark = config.parallel_mark,
        markers = config.markers,
        granules = config.granules,
        "sync_context_init"
    );
}

/// Log that the marker pool finished spawning.
pub fn log_markers_started(count: usize) {
    tracing::debug!(count = count, "markers_started");
}

/// Log pool shutdown.
pub fn log_markers_stopped(count: usize) {
    tracing::debug!(count = count, "markers_stopped");
}

/// Log that the last marker arrived and closed a round.
pub fn log_round_complete(round: u64, participants: usize) {
    tracing::debug!(round = round, participants = participants, "round_complete");
}

/// Log a marker blocking on the barrier.
pub fn log_marker_wait(round: u64, remaining: usize) {
    tracing::trace!(round = round, remaining = remaining, "marker_wait");
}

/// Log that the OS cancellation disposition could not be changed.
pub fn log_cancel_degraded(err: &std::io::Error) {
    tracing::warn!(error = %err, "os_cancel_state_unavailable");
}

/// Log a marker thread leaving its work function.
pub fn log_marker_left(marker: usize, panicking: bool) {
    if panicking {
        tracing::warn!(marker = marker, "marker_panicked");
    } else {
        tracing::debug!(marker = marker, "marker_left");
    }
}
