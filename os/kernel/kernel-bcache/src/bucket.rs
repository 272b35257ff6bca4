use crate::device::BlockId;
use alloc::vec::Vec;

/// Index of a buffer slot in the cache's pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct SlotIndex(usize);

impl SlotIndex {
    #[inline]
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub(crate) const fn get(self) -> usize {
        self.0
    }
}

/// Bookkeeping of one buffer slot, owned by the bucket it is linked into.
///
/// Moving a slot to another bucket moves this record with it, so the fields
/// are always guarded by the lock of the bucket that currently holds the slot.
#[derive(Debug, Clone)]
pub(crate) struct SlotMeta {
    pub(crate) slot: SlotIndex,
    /// `None` until the slot caches its first block.
    pub(crate) block: Option<BlockId>,
    /// Live references: handed-out buffers plus callers waiting for the content lock.
    pub(crate) refs: u32,
    /// Secondary references that keep the block resident without the content lock.
    pub(crate) pins: u32,
    pub(crate) last_use: u64,
}

impl SlotMeta {
    pub(crate) const fn unused(slot: SlotIndex) -> Self {
        Self {
            slot,
            block: None,
            refs: 0,
            pins: 0,
            last_use: 0,
        }
    }

    #[inline]
    pub(crate) const fn is_evictable(&self) -> bool {
        self.refs == 0 && self.pins == 0
    }
}

/// One stripe of the cache's hash table: the slots whose block hashes here,
/// plus slots stolen for such blocks. Most recently relinked slots first.
///
/// Any bucket may end up holding every slot of the pool, so it is created
/// with room for all of them and never allocates once the cache is built.
#[derive(Debug)]
pub(crate) struct Bucket {
    entries: Vec<SlotMeta>,
}

impl Bucket {
    pub(crate) fn with_capacity(slots: usize) -> Self {
        Self {
            entries: Vec::with_capacity(slots),
        }
    }

    /// Link `meta` at the head.
    pub(crate) fn push_front(&mut self, meta: SlotMeta) {
        debug_assert!(
            self.entries.len() < self.entries.capacity(),
            "bucket would grow under its lock"
        );
        self.entries.insert(0, meta);
    }

    pub(crate) fn lookup(&mut self, block: BlockId) -> Option<&mut SlotMeta> {
        self.entries.iter_mut().find(|m| m.block == Some(block))
    }

    pub(crate) fn entry_mut(&mut self, slot: SlotIndex) -> Option<&mut SlotMeta> {
        self.entries.iter_mut().find(|m| m.slot == slot)
    }

    /// Position of the least recently used slot nobody references or pins.
    /// Ties go to the slot closest to the head.
    pub(crate) fn lru_position(&self) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;
        for (pos, meta) in self.entries.iter().enumerate() {
            if meta.is_evictable() && best.is_none_or(|(_, t)| meta.last_use < t) {
                best = Some((pos, meta.last_use));
            }
        }
        best.map(|(pos, _)| pos)
    }

    /// Unlink the slot at `pos`.
    pub(crate) fn take(&mut self, pos: usize) -> SlotMeta {
        self.entries.remove(pos)
    }

    /// Hand the evictable slot at `pos` to `block` with one live reference.
    pub(crate) fn claim(&mut self, pos: usize, block: BlockId) -> SlotIndex {
        let meta = &mut self.entries[pos];
        debug_assert!(meta.is_evictable(), "claiming a referenced slot");
        meta.block = Some(block);
        meta.refs = 1;
        meta.slot
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.entries.capacity()
    }
}
