//! Tests for the marker thread pool.
//!
//! These tests drive full marking loops through `start_mark_threads`, observe
//! rounds from the collector thread, and check that cooperative shutdown
//! stops every marker at the same round.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use makalu_sync::{thr_init, MarkerContext, MarkerThreadPool, SyncConfig, SyncError, SyncMode};
use parking_lot::Mutex;

fn looping_marker(
    rounds_seen: Arc<Mutex<Vec<u64>>>,
) -> impl Fn(&MarkerContext) + Send + Sync + 'static {
    move |marker| {
        let mut last = 0;
        loop {
            {
                let granule = marker.id() % marker.sync().granules();
                let _guard = marker.sync().lock_granule(granule);
            }
            match marker.arrive() {
                Ok(arrival) => last = arrival.round(),
                Err(err) => {
                    assert!(err.is_stop());
                    break;
                }
            }
        }
        rounds_seen.lock().push(last);
    }
}

#[test]
fn test_markers_run_rounds_until_shutdown() {
    let ctx = thr_init(SyncConfig::new(3, 8)).unwrap();
    let pool = MarkerThreadPool::new(Arc::clone(&ctx));
    let rounds_seen = Arc::new(Mutex::new(Vec::new()));

    let spawned = pool
        .start_mark_threads(looping_marker(Arc::clone(&rounds_seen)))
        .unwrap();
    assert_eq!(spawned, 3);
    assert_eq!(pool.running(), 3);

    // Let the markers complete a few rounds.
    let mut seen = 0;
    while seen < 5 {
        seen = ctx.barrier().wait_round(seen);
    }

    pool.shutdown().unwrap();
    assert_eq!(pool.running(), 0);

    // Everyone left after the same round: the one that latched the stop.
    let rounds = rounds_seen.lock().clone();
    assert_eq!(rounds.len(), 3);
    assert!(rounds.iter().all(|&r| r == rounds[0]));
    assert!(rounds[0] >= 5);
    assert!(ctx.metrics().rounds_completed >= 6);
}

#[test]
fn test_drop_joins_markers() {
    let ctx = thr_init(SyncConfig::new(2, 4)).unwrap();
    let exited = Arc::new(AtomicUsize::new(0));

    {
        let pool = MarkerThreadPool::new(Arc::clone(&ctx));
        pool.start_mark_threads({
            let exited = Arc::clone(&exited);
            move |marker| {
                while marker.arrive().is_ok() {}
                exited.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();
        ctx.barrier().wait_round(0);
    }

    assert_eq!(exited.load(Ordering::SeqCst), 2);
}

#[test]
fn test_checkpoint_observes_shutdown() {
    let ctx = thr_init(SyncConfig::new(2, 4)).unwrap();
    let pool = MarkerThreadPool::new(ctx);
    let stopped = Arc::new(AtomicUsize::new(0));

    pool.start_mark_threads({
        let stopped = Arc::clone(&stopped);
        move |marker| {
            while marker.checkpoint().is_ok() {
                std::thread::yield_now();
            }
            stopped.fetch_add(1, Ordering::SeqCst);
        }
    })
    .unwrap();

    pool.shutdown().unwrap();
    assert_eq!(stopped.load(Ordering::SeqCst), 2);
}

/// Marking loop with a safe point before each barrier arrival.
fn checkpointed_rounds(marker: &MarkerContext) -> makalu_sync::Result<()> {
    loop {
        if marker.id() == 1 {
            thread::sleep(Duration::from_millis(20));
        }
        marker.checkpoint()?;
        marker.arrive()?;
    }
}

#[test]
fn test_checkpoint_exit_does_not_strand_peers() {
    let ctx = thr_init(SyncConfig::new(2, 4)).unwrap();
    let pool = MarkerThreadPool::new(Arc::clone(&ctx));
    let exits = Arc::new(Mutex::new(Vec::new()));

    pool.start_mark_threads({
        let exits = Arc::clone(&exits);
        move |marker| {
            let err = checkpointed_rounds(marker).unwrap_err();
            exits.lock().push((marker.id(), err));
        }
    })
    .unwrap();

    ctx.barrier().wait_round(0);
    // Marker 0 is usually parked in arrive() while marker 1 sleeps, so
    // marker 1 sees the stop at its checkpoint and leaves mid-round.
    thread::sleep(Duration::from_millis(5));
    pool.shutdown().unwrap();

    let exits = exits.lock();
    assert_eq!(exits.len(), 2);
    for (id, err) in exits.iter() {
        assert!(
            err.is_stop() || matches!(err, SyncError::BarrierAbandoned),
            "marker {id} left with {err}"
        );
    }
}

#[test]
fn test_panicking_marker_does_not_hang_shutdown() {
    let ctx = thr_init(SyncConfig::new(3, 4)).unwrap();
    let pool = MarkerThreadPool::new(Arc::clone(&ctx));
    let exited = Arc::new(AtomicUsize::new(0));

    pool.start_mark_threads({
        let exited = Arc::clone(&exited);
        move |marker| {
            if marker.id() == 2 {
                thread::sleep(Duration::from_millis(10));
                panic!("marker 2 fails before its first round");
            }
            while marker.arrive().is_ok() {}
            exited.fetch_add(1, Ordering::SeqCst);
        }
    })
    .unwrap();

    let err = pool.shutdown().unwrap_err();
    assert!(matches!(err, SyncError::MarkerPanicked { marker: 2 }));
    assert_eq!(exited.load(Ordering::SeqCst), 2);
    assert!(ctx.barrier().is_abandoned());
}

#[test]
fn test_shutdown_is_repeatable() {
    let pool = MarkerThreadPool::new(thr_init(SyncConfig::new(2, 4)).unwrap());
    pool.start_mark_threads(|_| {}).unwrap();
    pool.shutdown().unwrap();
    pool.shutdown().unwrap();
    assert!(pool.stop_token().is_stop_requested());
}

#[test]
fn test_second_start_is_rejected_while_running() {
    let pool = MarkerThreadPool::new(thr_init(SyncConfig::new(2, 4)).unwrap());
    pool.start_mark_threads(|marker| while marker.arrive().is_ok() {})
        .unwrap();

    let err = pool.start_mark_threads(|_| {}).unwrap_err();
    assert!(matches!(err, SyncError::AlreadyStarted));
    assert_eq!(pool.running(), 2);

    pool.shutdown().unwrap();
}

#[test]
fn test_inline_pool_marks_on_caller() {
    let ctx = thr_init(SyncConfig::inline(4)).unwrap();
    assert_eq!(ctx.mode(), SyncMode::Inline);

    let pool = MarkerThreadPool::new(Arc::clone(&ctx));
    assert_eq!(pool.start_mark_threads(|_| unreachable!()).unwrap(), 0);

    let marker = pool.inline_context();
    let mut last = 0;
    for _ in 0..3 {
        let _granule = marker.sync().lock_granule(1);
        let arrival = marker.arrive().unwrap();
        assert!(arrival.is_last());
        last = arrival.round();
    }
    assert_eq!(last, 3);

    pool.shutdown().unwrap();
    assert!(marker.arrive().unwrap_err().is_stop());
}

#[test]
fn test_marker_debug_output() {
    let pool = MarkerThreadPool::new(thr_init(SyncConfig::inline(1)).unwrap());
    let marker = pool.inline_context();
    let text = format!("{marker:?}");
    assert!(text.contains("MarkerContext"));
    assert!(text.contains("stop_requested: false"));
    assert!(format!("{pool:?}").contains("running: 0"));
}
