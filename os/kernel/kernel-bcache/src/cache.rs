//! # The bucketed buffer cache
//!
//! Buffers live in a fixed pool of slots. Each slot's metadata (block
//! identity, references, pins, last use) is linked into exactly one bucket
//! and guarded by that bucket's spin lock; the block payload sits behind the
//! slot's own [`SleepLock`] so a holder may sleep on device I/O without
//! blocking lookups of unrelated blocks.
//!
//! ## Locking
//!
//! * A bucket lock is only ever held for list manipulation. It is released
//!   before anyone waits on a content lock or talks to the device.
//! * Probing other buckets for a free slot happens under the cache-wide steal
//!   lock. The home bucket is unlocked before the steal lock is taken and
//!   relocked afterwards, so at most one context holds two bucket locks at a
//!   time and the home bucket is always the outer one.
//! * The steal lock is never taken while a bucket lock is held.

use crate::bucket::{Bucket, SlotIndex, SlotMeta};
use crate::buffer::{ExclusiveBuffer, PinnedBuffer};
use crate::device::{BlockData, BlockDevice, BlockId, IoOp};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use kernel_info::fs::{BLOCK_SIZE, NBUCKETS, NBUF};
use kernel_sync::{Scheduler, SleepLock, SpinMutex, SpinMutexGuard};
use log::{debug, trace, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferCacheError {
    #[error("no unreferenced buffer left to hold {0}")]
    Exhausted(BlockId),
    #[error("buffer cache needs buffers and buckets (got {buffers} in {buckets} buckets)")]
    InvalidConfig { buffers: usize, buckets: usize },
    #[error("the global buffer cache is already initialized")]
    AlreadyInitialized,
}

/// Pool geometry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BufferCacheConfig {
    /// Number of buffer slots.
    pub buffers: usize,
    /// Number of hash buckets. A prime spreads sequential block numbers best.
    pub buckets: usize,
}

impl Default for BufferCacheConfig {
    fn default() -> Self {
        Self {
            buffers: NBUF,
            buckets: NBUCKETS,
        }
    }
}

/// Counters since construction.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found the block already cached.
    pub hits: u64,
    /// Lookups that had to claim a slot.
    pub misses: u64,
    /// Misses served from the home bucket's own slots.
    pub recycled: u64,
    /// Misses served by relinking a slot from another bucket.
    pub stolen: u64,
    /// Device reads.
    pub reads: u64,
    /// Device writes.
    pub writes: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    recycled: AtomicU64,
    stolen: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            stolen: self.stolen.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

/// Payload half of a slot. The metadata half lives in whichever bucket the
/// slot is linked into.
pub(crate) struct Slot {
    /// Cleared when the slot is handed to a new block; set once the payload
    /// has been read from the device.
    valid: AtomicBool,
    pub(crate) data: SleepLock<Box<BlockData>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            valid: AtomicBool::new(false),
            data: SleepLock::new(Box::new([0; BLOCK_SIZE])),
        }
    }
}

/// A cache of disk blocks, shared by every context of the kernel.
///
/// # Examples
///
/// ```rust
/// use kernel_bcache::{BlockData, BlockDevice, BlockId, BufferCache, BufferCacheConfig, IoOp};
/// use kernel_sync::{ContextId, Scheduler, WaitChannel};
///
/// struct Zeroes;
/// impl BlockDevice for Zeroes {
///     fn read_or_write(&self, _: BlockId, data: &mut BlockData, op: IoOp) {
///         if op == IoOp::Read {
///             data.fill(0);
///         }
///     }
/// }
///
/// struct Single;
/// impl Scheduler for Single {
///     fn context_id(&self) -> ContextId { ContextId::new(1) }
///     fn sleep(&self, _: WaitChannel, _: &dyn Fn() -> bool) {}
///     fn wakeup(&self, _: WaitChannel) {}
/// }
///
/// let cache = BufferCache::new(Zeroes, Single, BufferCacheConfig { buffers: 4, buckets: 2 })?;
/// let mut buf = cache.acquire(BlockId::new(1, 7))?;
/// buf[0] = 0xff;
/// buf.write();
/// buf.release();
/// assert_eq!(cache.stats().writes, 1);
/// # Ok::<(), kernel_bcache::BufferCacheError>(())
/// ```
pub struct BufferCache<D, S> {
    device: D,
    scheduler: S,
    slots: Box<[Slot]>,
    buckets: Box<[SpinMutex<Bucket>]>,
    steal: SpinMutex<()>,
    clock: AtomicU64,
    stats: Counters,
}

impl<D, S> BufferCache<D, S>
where
    D: BlockDevice,
    S: Scheduler,
{
    /// Build a cache whose slot `i` starts out in bucket `i % buckets`.
    ///
    /// # Errors
    /// [`BufferCacheError::InvalidConfig`] if either dimension is zero.
    pub fn new(
        device: D,
        scheduler: S,
        config: BufferCacheConfig,
    ) -> Result<Self, BufferCacheError> {
        let BufferCacheConfig { buffers, buckets } = config;
        if buffers == 0 || buckets == 0 {
            return Err(BufferCacheError::InvalidConfig { buffers, buckets });
        }

        let slots: Box<[Slot]> = (0..buffers).map(|_| Slot::new()).collect();
        let mut lists: Vec<Bucket> = (0..buckets)
            .map(|_| Bucket::with_capacity(buffers))
            .collect();
        for i in 0..buffers {
            lists[i % buckets].push_front(SlotMeta::unused(SlotIndex::new(i)));
        }

        debug!("buffer cache: {buffers} buffers of {BLOCK_SIZE} bytes in {buckets} buckets");

        Ok(Self {
            device,
            scheduler,
            slots,
            buckets: lists.into_iter().map(SpinMutex::new).collect(),
            steal: SpinMutex::new(()),
            clock: AtomicU64::new(0),
            stats: Counters::default(),
        })
    }

    /// Number of buffer slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of hash buckets.
    #[inline]
    #[must_use]
    pub fn buckets(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    #[inline]
    pub(crate) const fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Return a locked buffer holding `block`'s content.
    ///
    /// Waits (by yielding to the scheduler) while another context holds the
    /// same block. Reads the block from the device if the buffer was recycled.
    ///
    /// # Errors
    /// [`BufferCacheError::Exhausted`] if the block is not cached and every
    /// buffer is referenced or pinned.
    ///
    /// # Panics
    /// Panics if the calling context already holds `block`.
    pub fn acquire(&self, block: BlockId) -> Result<ExclusiveBuffer<'_, D, S>, BufferCacheError> {
        let slot = self.lookup_or_claim(block)?;
        let entry = &self.slots[slot.get()];

        let mut data = entry.data.lock(&self.scheduler);
        if !entry.valid.load(Ordering::Acquire) {
            self.device.read_or_write(block, &mut **data, IoOp::Read);
            Counters::bump(&self.stats.reads);
            entry.valid.store(true, Ordering::Release);
        }

        Ok(ExclusiveBuffer::new(self, slot, block, data))
    }

    /// Write `buf`'s content through to the device.
    ///
    /// # Panics
    /// Panics if `buf` belongs to another cache or its content lock is not
    /// held by the calling context.
    pub fn write(&self, buf: &mut ExclusiveBuffer<'_, D, S>) {
        assert!(
            core::ptr::eq(buf.cache(), self),
            "write: {} belongs to another buffer cache",
            buf.block()
        );
        assert!(
            self.slots[buf.slot().get()].data.holding(&self.scheduler),
            "write: {} is not locked by the calling context",
            buf.block()
        );
        let block = buf.block();
        self.device.read_or_write(block, buf.data_mut(), IoOp::Write);
        Counters::bump(&self.stats.writes);
    }

    /// Keep `buf`'s block resident after it is released.
    ///
    /// Pinning goes through a held buffer because only a held buffer is
    /// guaranteed to still carry its block; a bare [`BlockId`] could name a
    /// slot that was recycled in the meantime. The pin itself does not keep
    /// the content lock, and [`unpin`](Self::unpin) needs no buffer at all.
    ///
    /// # Panics
    /// Panics if the buffer's slot no longer caches its block, which means
    /// the cache's bookkeeping is corrupt.
    pub fn pin(&self, buf: &ExclusiveBuffer<'_, D, S>) -> PinnedBuffer {
        let block = buf.block();
        let slot = buf.slot();
        let mut bucket = self.bucket_of(block);
        let meta = Self::resident(&mut bucket, slot, block, "pin");
        meta.pins += 1;
        PinnedBuffer::new(slot, block)
    }

    /// Drop a pin taken with [`pin`](Self::pin).
    ///
    /// # Panics
    /// Panics if the buffer is not pinned (the pin came from another cache).
    #[allow(clippy::needless_pass_by_value)]
    pub fn unpin(&self, pin: PinnedBuffer) {
        let mut bucket = self.bucket_of(pin.block());
        let meta = Self::resident(&mut bucket, pin.slot(), pin.block(), "unpin");
        meta.pins = meta
            .pins
            .checked_sub(1)
            .unwrap_or_else(|| panic!("unpin: {} is not pinned", pin.block()));
    }

    /// Drop one live reference and stamp the slot's last use.
    ///
    /// Runs while the caller still holds the content lock.
    pub(crate) fn release_slot(&self, slot: SlotIndex, block: BlockId) {
        let mut bucket = self.bucket_of(block);
        let meta = Self::resident(&mut bucket, slot, block, "release");
        meta.refs = meta
            .refs
            .checked_sub(1)
            .unwrap_or_else(|| panic!("release: {block} has no live reference"));
        meta.last_use = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
    }

    fn lookup_or_claim(&self, block: BlockId) -> Result<SlotIndex, BufferCacheError> {
        let home = self.bucket_index(block);

        {
            let mut bucket = self.buckets[home].lock();
            if let Some(slot) = self.hit_or_recycle(&mut bucket, block) {
                return Ok(slot);
            }
        }

        let _steal = self.steal.lock();
        let mut bucket = self.buckets[home].lock();

        // Another context may have cached the block, or released a local
        // slot, while the home bucket was unlocked.
        if let Some(slot) = self.hit_or_recycle(&mut bucket, block) {
            return Ok(slot);
        }

        let n = self.buckets.len();
        for probe in (1..n).map(|d| (home + d) % n) {
            debug_assert!(probe != home && self.steal.is_locked());
            let mut victim = self.buckets[probe].lock();
            let Some(pos) = victim.lru_position() else {
                continue;
            };
            let meta = victim.take(pos);
            trace!(
                "buffer cache: {block} takes slot {} from bucket {probe} into bucket {home}",
                meta.slot.get()
            );
            bucket.push_front(meta);
            drop(victim);

            let slot = self.claim(&mut bucket, 0, block);
            Counters::bump(&self.stats.stolen);
            return Ok(slot);
        }

        warn!("buffer cache: all {} buffers are in use, cannot load {block}", self.slots.len());
        Err(BufferCacheError::Exhausted(block))
    }

    fn hit_or_recycle(&self, bucket: &mut Bucket, block: BlockId) -> Option<SlotIndex> {
        if let Some(meta) = bucket.lookup(block) {
            meta.refs += 1;
            Counters::bump(&self.stats.hits);
            return Some(meta.slot);
        }
        let pos = bucket.lru_position()?;
        let slot = self.claim(bucket, pos, block);
        Counters::bump(&self.stats.recycled);
        Some(slot)
    }

    fn claim(&self, bucket: &mut Bucket, pos: usize, block: BlockId) -> SlotIndex {
        let slot = bucket.claim(pos, block);
        self.slots[slot.get()].valid.store(false, Ordering::Release);
        Counters::bump(&self.stats.misses);
        slot
    }

    fn resident<'b>(
        bucket: &'b mut Bucket,
        slot: SlotIndex,
        block: BlockId,
        op: &str,
    ) -> &'b mut SlotMeta {
        match bucket.entry_mut(slot) {
            Some(meta) if meta.block == Some(block) => meta,
            _ => panic!("{op}: {block} is not cached in slot {}", slot.get()),
        }
    }

    #[inline]
    fn bucket_index(&self, block: BlockId) -> usize {
        block.blockno as usize % self.buckets.len()
    }

    #[inline]
    fn bucket_of(&self, block: BlockId) -> SpinMutexGuard<'_, Bucket> {
        self.buckets[self.bucket_index(block)].lock()
    }
}

impl<D, S> fmt::Debug for BufferCache<D, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferCache")
            .field("buffers", &self.slots.len())
            .field("buckets", &self.buckets.len())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_sync::{ContextId, WaitChannel};

    struct Zeroes;

    impl BlockDevice for Zeroes {
        fn read_or_write(&self, _: BlockId, data: &mut BlockData, op: IoOp) {
            if op == IoOp::Read {
                data.fill(0);
            }
        }
    }

    struct Single;

    impl Scheduler for Single {
        fn context_id(&self) -> ContextId {
            ContextId::new(1)
        }

        fn sleep(&self, _: WaitChannel, _: &dyn Fn() -> bool) {}

        fn wakeup(&self, _: WaitChannel) {}
    }

    fn capacities(cache: &BufferCache<Zeroes, Single>) -> Vec<usize> {
        cache.buckets.iter().map(|b| b.lock().capacity()).collect()
    }

    #[test]
    fn stealing_never_grows_a_bucket() {
        let config = BufferCacheConfig { buffers: 4, buckets: 2 };
        let cache = BufferCache::new(Zeroes, Single, config).unwrap();
        let before = capacities(&cache);
        assert!(before.iter().all(|&c| c >= 4));

        // All four blocks hash to bucket 0, so it ends up holding the whole pool.
        let held: Vec<_> = [10, 12, 14, 16]
            .into_iter()
            .map(|n| cache.acquire(BlockId::new(1, n)).unwrap())
            .collect();
        assert_eq!(cache.stats().stolen, 2);
        assert_eq!(cache.buckets[0].lock().len(), 4);
        assert_eq!(capacities(&cache), before);
        drop(held);
    }
}
