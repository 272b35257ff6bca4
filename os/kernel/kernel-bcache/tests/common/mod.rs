#![allow(dead_code)]

use kernel_bcache::{BlockData, BlockDevice, BlockId, BufferCache, BufferCacheConfig, IoOp};
use kernel_info::fs::BLOCK_SIZE;
use kernel_sync::{ContextId, Scheduler, WaitChannel};
use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Maps every OS thread to its own execution context. Sleeping parks the
/// thread on a condition variable until the channel's wakeup counter moves.
pub struct ThreadScheduler;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);
static WAKEUPS: Mutex<BTreeMap<WaitChannel, u64>> = Mutex::new(BTreeMap::new());
static WOKEN: Condvar = Condvar::new();

thread_local! {
    static CONTEXT: Cell<u64> = const { Cell::new(0) };
}

fn wakeups() -> MutexGuard<'static, BTreeMap<WaitChannel, u64>> {
    WAKEUPS.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler for ThreadScheduler {
    fn context_id(&self) -> ContextId {
        CONTEXT.with(|id| {
            if id.get() == 0 {
                id.set(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed));
            }
            ContextId::new(id.get())
        })
    }

    fn sleep(&self, channel: WaitChannel, still_blocked: &dyn Fn() -> bool) {
        let mut counters = wakeups();
        if !still_blocked() {
            return;
        }
        let seen = counters.get(&channel).copied().unwrap_or(0);
        while counters.get(&channel).copied().unwrap_or(0) == seen {
            counters = WOKEN.wait(counters).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn wakeup(&self, channel: WaitChannel) {
        *wakeups().entry(channel).or_default() += 1;
        WOKEN.notify_all();
    }
}

/// A RAM disk. Blocks that were never written read back as their stamp:
/// the device number and block number in the first eight bytes, zeroes after.
#[derive(Clone, Default)]
pub struct MemDisk {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    blocks: Mutex<HashMap<BlockId, Box<BlockData>>>,
    reads: Mutex<HashMap<BlockId, usize>>,
    writes: AtomicUsize,
}

pub type TestCache = BufferCache<MemDisk, ThreadScheduler>;

impl MemDisk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stamped(block: BlockId) -> Box<BlockData> {
        let mut data = Box::new([0; BLOCK_SIZE]);
        data[0..4].copy_from_slice(&block.dev.to_le_bytes());
        data[4..8].copy_from_slice(&block.blockno.to_le_bytes());
        data
    }

    /// The block identity encoded in a buffer read from this disk.
    pub fn stamp_of(data: &BlockData) -> BlockId {
        let dev = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let blockno = u32::from_le_bytes(data[4..8].try_into().unwrap());
        BlockId::new(dev, blockno)
    }

    pub fn block(&self, block: BlockId) -> Box<BlockData> {
        let blocks = self.inner.blocks.lock().unwrap();
        blocks.get(&block).cloned().unwrap_or_else(|| Self::stamped(block))
    }

    pub fn reads_of(&self, block: BlockId) -> usize {
        self.inner.reads.lock().unwrap().get(&block).copied().unwrap_or(0)
    }

    pub fn writes(&self) -> usize {
        self.inner.writes.load(Ordering::Relaxed)
    }

    pub fn cache(&self, buffers: usize, buckets: usize) -> TestCache {
        let config = BufferCacheConfig { buffers, buckets };
        BufferCache::new(self.clone(), ThreadScheduler, config).unwrap()
    }
}

impl BlockDevice for MemDisk {
    fn read_or_write(&self, block: BlockId, data: &mut BlockData, op: IoOp) {
        match op {
            IoOp::Read => {
                *self.inner.reads.lock().unwrap().entry(block).or_default() += 1;
                data.copy_from_slice(&self.block(block)[..]);
            }
            IoOp::Write => {
                self.inner.writes.fetch_add(1, Ordering::Relaxed);
                self.inner.blocks.lock().unwrap().insert(block, Box::new(*data));
            }
        }
    }
}
