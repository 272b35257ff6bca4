use kernel_sync::{SpinMutex, lock_ordered};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::{panic, thread};

#[test]
fn basic_lock_and_raii() {
    let l = SpinMutex::new(0_u32);

    {
        let mut g = l.lock();
        *g = 41;
        assert!(l.is_locked());
    }
    assert!(!l.is_locked());

    // lock again; previous drop must have unlocked
    {
        let mut g = l.lock();
        *g += 1;
        assert_eq!(*g, 42);
    }
}

#[test]
fn try_lock_fails_while_held() {
    let l = SpinMutex::new(1u8);

    let g1 = l.try_lock();
    assert!(g1.is_some());
    assert!(l.try_lock().is_none());

    drop(g1);
    assert!(l.try_lock().is_some());
}

#[test]
fn with_lock_works_and_unlocks() {
    let l = SpinMutex::new(String::from("a"));
    let len = l.with_lock(|s| {
        s.push('b');
        s.len()
    });
    assert_eq!(len, 2);
    assert_eq!(l.with_lock(|s| s.clone()), "ab");
}

#[test]
fn lock_is_released_on_panic() {
    let l = SpinMutex::new(0u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err(), "expected panic");
    assert_eq!(l.with_lock(|v| *v), 123);
}

#[test]
fn contended_increments_are_exact_and_exclusive() {
    let threads = 8;
    let iters = 5_000;

    let lock = Arc::new(SpinMutex::new(0usize));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let in_cs = Arc::clone(&in_cs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..iters {
                    lock.with_lock(|v| {
                        let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(prev, 0, "mutual exclusion violated");
                        *v += 1;
                        in_cs.fetch_sub(1, Ordering::SeqCst);
                    });
                    thread::yield_now();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(lock.with_lock(|v| *v), threads * iters);
}

#[test]
fn lock_ordered_returns_guards_in_argument_order() {
    let parts = [SpinMutex::new('a'), SpinMutex::new('b')];
    let (high, low) = lock_ordered((1, &parts[1]), (0, &parts[0]));
    assert_eq!(*high, 'b');
    assert_eq!(*low, 'a');
    assert!(parts[0].is_locked() && parts[1].is_locked());
    drop((high, low));
    assert!(!parts[0].is_locked() && !parts[1].is_locked());
}

#[test]
#[should_panic(expected = "requested twice")]
fn lock_ordered_rejects_same_rank() {
    let m = SpinMutex::new(());
    let _ = lock_ordered((3, &m), (3, &m));
}

/// Two threads repeatedly lock the same pair in opposite argument order.
/// Without the rank ordering this deadlocks almost immediately.
#[test]
fn lock_ordered_opposite_directions_do_not_deadlock() {
    let parts = Arc::new([SpinMutex::new(0u64), SpinMutex::new(0u64)]);
    let start = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [(0usize, 1usize), (1, 0)]
        .into_iter()
        .map(|(a, b)| {
            let parts = Arc::clone(&parts);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..10_000 {
                    let (mut ga, mut gb) = lock_ordered((a, &parts[a]), (b, &parts[b]));
                    *ga += 1;
                    *gb += 1;
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(*parts[0].lock(), 20_000);
    assert_eq!(*parts[1].lock(), 20_000);
}

#[test]
fn spin_mutex_is_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    let l = SpinMutex::new(0u8);
    takes_sync(&l);
}
