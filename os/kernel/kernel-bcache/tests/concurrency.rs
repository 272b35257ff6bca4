mod common;

use common::{MemDisk, TestCache, ThreadScheduler};
use kernel_bcache::{BlockId, BufferCacheError, ExclusiveBuffer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;

fn acquire_retrying(
    cache: &TestCache,
    block: BlockId,
) -> ExclusiveBuffer<'_, MemDisk, ThreadScheduler> {
    loop {
        match cache.acquire(block) {
            Ok(buf) => return buf,
            Err(BufferCacheError::Exhausted(_)) => thread::yield_now(),
            Err(e) => panic!("unexpected error {e}"),
        }
    }
}

/// Every thread bumps a counter stored in the same block with a plain
/// read-modify-write. Lost updates would mean two holders at once.
#[test]
fn one_holder_per_block() {
    const ROUNDS: u64 = 1_000;
    let disk = MemDisk::new();
    let cache = Arc::new(disk.cache(4, 3));
    let inside = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(THREADS));
    let block = BlockId::new(1, 7);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let inside = Arc::clone(&inside);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..ROUNDS {
                    let mut buf = acquire_retrying(&cache, block);
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    let n = u64::from_le_bytes(buf[16..24].try_into().unwrap());
                    thread::yield_now();
                    buf[16..24].copy_from_slice(&(n + 1).to_le_bytes());
                    inside.fetch_sub(1, Ordering::SeqCst);
                    buf.release();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let buf = cache.acquire(block).unwrap();
    assert_eq!(u64::from_le_bytes(buf[16..24].try_into().unwrap()), THREADS as u64 * ROUNDS);
    assert_eq!(disk.reads_of(block), 1);
}

/// A small pool under random load keeps recycling and stealing slots. Each
/// holder tags its buffer and checks the tag and the block stamp before
/// letting go; a slot shared by two blocks would trip either check.
#[test]
fn distinct_blocks_never_share_a_buffer() {
    let disk = MemDisk::new();
    let cache = Arc::new(disk.cache(6, 3));
    let start = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(0xb10c + t as u64);
                let tag = (t as u64 + 1).to_le_bytes();
                start.wait();
                for _ in 0..2_000 {
                    let block = BlockId::new(1, rng.random_range(0..32));
                    let mut buf = acquire_retrying(&cache, block);
                    assert_eq!(MemDisk::stamp_of(&buf), block);
                    buf[8..16].copy_from_slice(&tag);
                    thread::yield_now();
                    assert_eq!(buf[8..16], tag);
                    assert_eq!(MemDisk::stamp_of(&buf), block);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, THREADS as u64 * 2_000);
    assert_eq!(stats.misses, stats.recycled + stats.stolen);
    assert_eq!(stats.reads, stats.misses);
}

/// Many buckets, one buffer each, and threads that hold two blocks at a time
/// while pinning some of them: slots keep migrating between buckets, yet
/// every bucket search finishes and no reference leaks.
#[test]
fn relinking_under_contention_terminates() {
    const BUFFERS: usize = 7;
    const ROUNDS: usize = 3_000;
    let disk = MemDisk::new();
    let cache = Arc::new(disk.cache(BUFFERS, BUFFERS));
    let served = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let served = Arc::clone(&served);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(0x57ea1 + t as u64);
                let mut pins = Vec::new();
                start.wait();
                for _ in 0..ROUNDS {
                    let a = rng.random_range(0..64u32);
                    let c = rng.random_range(0..64u32);
                    // Ascending order, so two holders never wait on each other.
                    let (lo, hi) = (a.min(c), a.max(c));

                    let Ok(first) = cache.acquire(BlockId::new(1, lo)) else {
                        if let Some(pin) = pins.pop() {
                            cache.unpin(pin);
                        }
                        thread::yield_now();
                        continue;
                    };
                    served.fetch_add(1, Ordering::Relaxed);
                    if rng.random_bool(0.1) && pins.len() < 2 {
                        pins.push(first.pin());
                    }
                    if hi != lo {
                        if let Ok(second) = cache.acquire(BlockId::new(1, hi)) {
                            served.fetch_add(1, Ordering::Relaxed);
                            assert_eq!(MemDisk::stamp_of(&second), BlockId::new(1, hi));
                        }
                    }
                    assert_eq!(MemDisk::stamp_of(&first), BlockId::new(1, lo));
                    drop(first);

                    if rng.random_bool(0.3) {
                        if let Some(pin) = pins.pop() {
                            cache.unpin(pin);
                        }
                    }
                }
                for pin in pins {
                    cache.unpin(pin);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let stats = cache.stats();
    assert!(stats.stolen > 0);
    assert_eq!(stats.hits + stats.misses, served.load(Ordering::Relaxed) as u64);

    // Nothing is left referenced or pinned: the whole pool can be held at once.
    let held: Vec<_> = (1000..1000 + BUFFERS as u32)
        .map(|n| cache.acquire(BlockId::new(2, n)).unwrap())
        .collect();
    assert_eq!(held.len(), cache.capacity());
}
