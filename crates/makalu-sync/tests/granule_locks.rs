//! Tests for per-granule mutual exclusion.
//!
//! These tests verify that distinct granules never block each other, that
//! lockers of the same granule serialize, and that multi-granule locking in
//! ascending order does not deadlock.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use makalu_sync::{lock_granules, thr_init, SyncConfig};

const TIMEOUT: Duration = Duration::from_secs(10);

#[test]
fn test_distinct_granules_do_not_block() {
    let ctx = thr_init(SyncConfig::new(2, 16)).unwrap();
    let (held_tx, held_rx) = channel::bounded(0);
    let (done_tx, done_rx) = channel::bounded(0);
    let (release_tx, release_rx) = channel::bounded::<()>(0);

    let holder = thread::spawn({
        let ctx = Arc::clone(&ctx);
        move || {
            let _guard = ctx.lock_granule(1);
            held_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        }
    });

    held_rx.recv_timeout(TIMEOUT).unwrap();

    let other = thread::spawn({
        let ctx = Arc::clone(&ctx);
        move || {
            let guard = ctx.lock_granule(2);
            assert_eq!(guard.index(), 2);
            done_tx.send(()).unwrap();
        }
    });

    // Granule 1 is still held; granule 2 must be acquired anyway.
    done_rx
        .recv_timeout(TIMEOUT)
        .expect("locking a different granule blocked");
    release_tx.send(()).unwrap();

    holder.join().unwrap();
    other.join().unwrap();
}

#[test]
fn test_same_granule_occupancy_never_exceeds_one() {
    let ctx = thr_init(SyncConfig::new(8, 4)).unwrap();
    let occupancy = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            let occupancy = Arc::clone(&occupancy);
            let max_seen = Arc::clone(&max_seen);
            thread::spawn(move || {
                for _ in 0..2_000 {
                    let guard = ctx.lock_granule(2);
                    let inside = occupancy.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(inside, Ordering::SeqCst);
                    occupancy.fetch_sub(1, Ordering::SeqCst);
                    guard.unlock();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.metrics().granule_acquisitions, 16_000);
}

/// G=16: A holds granule 3 with the occupancy at 1; B only gets in after A's
/// release and then sees the occupancy back at 0.
#[test]
fn test_blocked_locker_sees_released_state() {
    let ctx = thr_init(SyncConfig::new(2, 16)).unwrap();
    let occupancy = Arc::new(AtomicUsize::new(0));
    let b_entered = Arc::new(AtomicBool::new(false));
    let (held_tx, held_rx) = channel::bounded(0);

    let a = thread::spawn({
        let ctx = Arc::clone(&ctx);
        let occupancy = Arc::clone(&occupancy);
        let b_entered = Arc::clone(&b_entered);
        move || {
            let guard = ctx.lock_granule(3);
            assert_eq!(occupancy.fetch_add(1, Ordering::SeqCst), 0);
            held_tx.send(()).unwrap();

            // Give B time to block on the granule.
            thread::sleep(Duration::from_millis(50));
            assert!(!b_entered.load(Ordering::SeqCst));

            occupancy.fetch_sub(1, Ordering::SeqCst);
            guard.unlock();
        }
    });

    held_rx.recv_timeout(TIMEOUT).unwrap();

    let b = thread::spawn({
        let ctx = Arc::clone(&ctx);
        let occupancy = Arc::clone(&occupancy);
        let b_entered = Arc::clone(&b_entered);
        move || {
            let _guard = ctx.lock_granule(3);
            b_entered.store(true, Ordering::SeqCst);
            let seen = occupancy.fetch_add(1, Ordering::SeqCst);
            occupancy.fetch_sub(1, Ordering::SeqCst);
            seen
        }
    });

    a.join().unwrap();
    assert_eq!(b.join().unwrap(), 0);
    assert!(b_entered.load(Ordering::SeqCst));
    assert!(ctx.metrics().granule_contended >= 1);
}

#[test]
fn test_overlapping_granule_sets_do_not_deadlock() {
    let ctx = thr_init(SyncConfig::new(4, 8)).unwrap();
    let sets: [&[usize]; 4] = [&[7, 0, 3], &[3, 7], &[0, 5, 7, 1], &[5, 3, 0]];

    let handles: Vec<_> = sets
        .iter()
        .map(|set| {
            let ctx = Arc::clone(&ctx);
            let set = set.to_vec();
            thread::spawn(move || {
                for _ in 0..500 {
                    let held = lock_granules(ctx.sync(), &set);
                    assert!(held.indices().is_sorted());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_try_lock_granule() {
    let ctx = thr_init(SyncConfig::new(2, 4)).unwrap();
    let held = ctx.lock_granule(0);

    let from_other = thread::spawn({
        let ctx = Arc::clone(&ctx);
        move || ctx.sync().try_lock_granule(0).is_some()
    })
    .join()
    .unwrap();
    assert!(!from_other);

    drop(held);
    assert!(ctx.sync().try_lock_granule(0).is_some());
}

#[test]
fn test_inline_mode_never_blocks() {
    let ctx = thr_init(SyncConfig::inline(4)).unwrap();
    let a = ctx.lock_granule(1);
    let b = ctx.sync().try_lock_granule(1);
    assert!(!a.is_locked());
    assert!(b.is_some_and(|guard| !guard.is_locked()));
    assert_eq!(ctx.metrics().granule_acquisitions, 0);
}

#[test]
#[should_panic(expected = "out of range")]
fn test_out_of_range_granule_panics() {
    let ctx = thr_init(SyncConfig::new(2, 16)).unwrap();
    let _guard = ctx.lock_granule(16);
}
