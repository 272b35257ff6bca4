use crate::bucket::SlotIndex;
use crate::cache::BufferCache;
use crate::device::{BlockData, BlockDevice, BlockId};
use alloc::boxed::Box;
use core::fmt;
use core::ops::{Deref, DerefMut};
use kernel_sync::{Scheduler, SleepLockGuard};

/// A cached block whose content lock is held by the calling context.
///
/// Dropping the buffer (or calling [`release`](Self::release)) gives up the
/// live reference, records the access time for LRU ordering and then unlocks
/// the content, in that order. The buffer cannot outlive its cache and cannot
/// move to another context.
#[must_use = "dropping the buffer releases it immediately"]
pub struct ExclusiveBuffer<'a, D, S>
where
    D: BlockDevice,
    S: Scheduler,
{
    cache: &'a BufferCache<D, S>,
    slot: SlotIndex,
    block: BlockId,
    data: SleepLockGuard<'a, Box<BlockData>>,
}

impl<'a, D, S> ExclusiveBuffer<'a, D, S>
where
    D: BlockDevice,
    S: Scheduler,
{
    pub(crate) const fn new(
        cache: &'a BufferCache<D, S>,
        slot: SlotIndex,
        block: BlockId,
        data: SleepLockGuard<'a, Box<BlockData>>,
    ) -> Self {
        Self {
            cache,
            slot,
            block,
            data,
        }
    }

    #[inline]
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &BlockData {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut BlockData {
        &mut self.data
    }

    /// Whether the calling context is the one holding this buffer.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.data.is_held() && self.cache.scheduler().context_id() == self.data.owner()
    }

    /// Persist the content to the device. See [`BufferCache::write`].
    pub fn write(&mut self) {
        let cache = self.cache;
        cache.write(self);
    }

    /// Pin the block. See [`BufferCache::pin`].
    pub fn pin(&self) -> PinnedBuffer {
        self.cache.pin(self)
    }

    /// Give the buffer back to the cache.
    #[inline]
    pub fn release(self) {
        drop(self);
    }

    #[inline]
    pub(crate) const fn cache(&self) -> &'a BufferCache<D, S> {
        self.cache
    }

    #[inline]
    pub(crate) const fn slot(&self) -> SlotIndex {
        self.slot
    }
}

impl<D, S> Deref for ExclusiveBuffer<'_, D, S>
where
    D: BlockDevice,
    S: Scheduler,
{
    type Target = BlockData;

    fn deref(&self) -> &BlockData {
        self.data()
    }
}

impl<D, S> DerefMut for ExclusiveBuffer<'_, D, S>
where
    D: BlockDevice,
    S: Scheduler,
{
    fn deref_mut(&mut self) -> &mut BlockData {
        self.data_mut()
    }
}

impl<D, S> Drop for ExclusiveBuffer<'_, D, S>
where
    D: BlockDevice,
    S: Scheduler,
{
    fn drop(&mut self) {
        // The content guard is dropped after this returns.
        self.cache.release_slot(self.slot, self.block);
    }
}

impl<D, S> fmt::Debug for ExclusiveBuffer<'_, D, S>
where
    D: BlockDevice,
    S: Scheduler,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusiveBuffer")
            .field("block", &self.block)
            .field("slot", &self.slot.get())
            .field("owner", &self.data.owner())
            .finish_non_exhaustive()
    }
}

/// Proof that a block is pinned in the cache. Hand it back to
/// [`BufferCache::unpin`]; forgetting it keeps the buffer resident forever.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a pin that is never unpinned leaks a buffer"]
pub struct PinnedBuffer {
    slot: SlotIndex,
    block: BlockId,
}

impl PinnedBuffer {
    pub(crate) const fn new(slot: SlotIndex, block: BlockId) -> Self {
        Self { slot, block }
    }

    #[inline]
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    #[inline]
    pub(crate) const fn slot(&self) -> SlotIndex {
        self.slot
    }
}
