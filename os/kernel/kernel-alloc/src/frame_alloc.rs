//! # Partitioned physical frame allocator
//!
//! The managed range is cut into one contiguous slice per processor. Each
//! slice seeds a [`Partition`]: a free list plus its own spin lock. The fast
//! paths of [`PageAllocator::allocate`] and [`PageAllocator::free`] only ever
//! take the caller's partition lock.
//!
//! When a partition runs dry it *steals*: it looks for the partition with the
//! most free frames and moves the back half of that partition's list over,
//! locking the two partitions in ascending index order. Only when every
//! partition is empty does allocation fail, and that failure is an ordinary
//! [`FrameAllocError::Exhausted`].
//!
//! Frame lifetime is governed by a reference-count table that spans all
//! partitions. A frame returns to a free list only when its last owner frees
//! it, which is what lets the virtual-memory layer share frames copy-on-write.
//!
//! ```text
//!  cpu 0                 cpu 1                 cpu 2
//! ┌──────────────┐      ┌──────────────┐      ┌──────────────┐
//! │ lock, free=0 │◄─────│ lock, free=8 │      │ lock, free=3 │
//! │ head ─► ∅    │ steal│ head ─► ...  │      │ head ─► ...  │
//! └──────────────┘  4   └──────────────┘      └──────────────┘
//!         refcount table: [ frame 0 | frame 1 | ... | frame n-1 ]
//! ```

use crate::addresses::{Frame, PhysicalAddress};
use crate::free_list::{FrameIndex, FreeList, Links};
use crate::phys_mapper::PhysMapper;
use crate::refcount::RefCounts;
use alloc::boxed::Box;
use kernel_info::memory::{JUNK_ON_ALLOC, JUNK_ON_FREE, MAX_CPUS, PAGE_SIZE};
use kernel_sync::{SpinMutex, lock_ordered};
use log::{debug, trace, warn};

const FRAME_BYTES: u64 = PAGE_SIZE as u64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameAllocError {
    /// No partition has a free frame left.
    #[error("out of physical frames")]
    Exhausted,
    /// The physical range does not contain a single whole frame.
    #[error("physical range {start}..{end} holds no whole frame")]
    EmptyRange {
        start: PhysicalAddress,
        end: PhysicalAddress,
    },
    #[error("at least one partition is required")]
    NoPartitions,
    #[error("{requested} partitions requested, at most {max} supported")]
    TooManyPartitions { requested: usize, max: usize },
    #[error("the global page allocator is already initialized")]
    AlreadyInitialized,
}

/// Per-processor slice of the frame pool.
struct Partition {
    free: SpinMutex<FreeList>,
}

/// Result of one attempt to refill a partition from its neighbors.
enum Steal {
    Moved(usize),
    /// The chosen victim drained before we could lock it; scan again.
    Raced,
    NothingFree,
}

/// Physical page allocator with per-processor partitions and shared reference counts.
///
/// # Example
/// ```rust
/// use kernel_alloc::{PageAllocator, PhysicalAddress};
/// use kernel_alloc::phys_mapper::HhdmPhysMapper;
///
/// // Back a fake physical range [0x10_0000, 0x10_4000) with heap memory.
/// #[repr(align(4096))]
/// struct Page([u8; 4096]);
/// let mut ram: Vec<Page> = (0..4).map(|_| Page([0; 4096])).collect();
/// let va = ram.as_mut_ptr().expose_provenance() as u64;
/// let mapper = HhdmPhysMapper::with_offset(va.wrapping_sub(0x10_0000));
///
/// let frames = PageAllocator::new(
///     mapper,
///     PhysicalAddress::new(0x10_0000),
///     PhysicalAddress::new(0x10_4000),
///     2,
/// )?;
/// let f = frames.allocate(0)?;
/// assert_eq!(frames.ref_count(f), 1);
/// frames.free(0, f);
/// assert_eq!(frames.total_free(), 4);
/// # drop(frames);
/// # drop(ram);
/// # Ok::<(), kernel_alloc::FrameAllocError>(())
/// ```
pub struct PageAllocator<M> {
    mapper: M,
    base: PhysicalAddress,
    frames: usize,
    links: Links,
    partitions: Box<[Partition]>,
    refs: RefCounts,
}

impl<M: PhysMapper> PageAllocator<M> {
    /// Take ownership of the physical range `[start, end)` and split it into
    /// `partitions` contiguous slices.
    ///
    /// `start` is rounded up to a page boundary; a trailing partial page is
    /// ignored. Every frame is poisoned and placed on its slice's free list.
    ///
    /// # Errors
    /// - [`FrameAllocError::EmptyRange`] if no whole frame fits.
    /// - [`FrameAllocError::NoPartitions`] / [`FrameAllocError::TooManyPartitions`]
    ///   if `partitions` is not in `1..=MAX_CPUS`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(
        mapper: M,
        start: PhysicalAddress,
        end: PhysicalAddress,
        partitions: usize,
    ) -> Result<Self, FrameAllocError> {
        if partitions == 0 {
            return Err(FrameAllocError::NoPartitions);
        }
        if partitions > MAX_CPUS {
            return Err(FrameAllocError::TooManyPartitions {
                requested: partitions,
                max: MAX_CPUS,
            });
        }

        let base = start
            .page_align_up()
            .ok_or(FrameAllocError::EmptyRange { start, end })?;
        let frames = (end.as_u64().saturating_sub(base.as_u64()) / FRAME_BYTES) as usize;
        if frames == 0 {
            return Err(FrameAllocError::EmptyRange { start, end });
        }

        let this = Self {
            mapper,
            base,
            frames,
            links: Links::new(frames),
            partitions: (0..partitions)
                .map(|_| Partition {
                    free: SpinMutex::new(FreeList::new()),
                })
                .collect(),
            refs: RefCounts::new(frames),
        };

        for (p, partition) in this.partitions.iter().enumerate() {
            let first = p * frames / partitions;
            let last = (p + 1) * frames / partitions;
            let mut list = partition.free.lock();
            for i in (first..last).rev() {
                let index = FrameIndex::new(i);
                this.poison(index, JUNK_ON_FREE);
                list.push(&this.links, index);
            }
        }

        debug!(
            "page allocator: {frames} frames at {base}, {partitions} partition(s) of ~{} frames",
            frames / partitions
        );
        Ok(this)
    }

    /// Allocate one frame on behalf of processor `cpu`.
    ///
    /// The frame's reference count is set to exactly 1. Tries the local
    /// partition first, then steals from the richest other partition.
    ///
    /// # Errors
    /// [`FrameAllocError::Exhausted`] if no partition has a free frame.
    ///
    /// # Panics
    /// Panics if `cpu` does not name a partition.
    pub fn allocate(&self, cpu: usize) -> Result<Frame, FrameAllocError> {
        let local = self.partition(cpu);
        loop {
            let popped = local.free.lock().pop(&self.links);
            if let Some(index) = popped {
                self.poison(index, JUNK_ON_ALLOC);
                self.refs.reset_to_one(index);
                return Ok(self.frame_at(index));
            }

            match self.steal(cpu) {
                Steal::Moved(n) => trace!("page allocator: cpu {cpu} stole {n} frame(s)"),
                Steal::Raced => {}
                Steal::NothingFree => {
                    warn!("page allocator: out of frames (cpu {cpu})");
                    return Err(FrameAllocError::Exhausted);
                }
            }
        }
    }

    /// Drop one reference to `frame`; the last reference returns it to `cpu`'s free list.
    ///
    /// # Panics
    /// Panics if `frame` lies outside the managed range or is already free
    /// (double free). Both indicate a kernel bug.
    pub fn free(&self, cpu: usize, frame: Frame) {
        let index = self.index_of(frame);
        let local = self.partition(cpu);
        match self.refs.release(index) {
            None => panic!("free: double free of {frame:?}"),
            Some(0) => {}
            Some(_) => return,
        }
        self.poison(index, JUNK_ON_FREE);
        local.free.lock().push(&self.links, index);
    }

    /// Add `n` owners to an allocated frame and return the new count.
    ///
    /// # Panics
    /// Panics if `frame` is outside the managed range, currently free, or if
    /// the count would overflow.
    pub fn add_ref(&self, frame: Frame, n: u32) -> u32 {
        let index = self.index_of(frame);
        self.refs.add(index, n).unwrap_or_else(|| {
            panic!("add_ref: {frame:?} is free or its count overflows by {n}")
        })
    }

    /// Current number of owners of `frame`; 0 means free.
    ///
    /// # Panics
    /// Panics if `frame` is outside the managed range.
    #[must_use]
    pub fn ref_count(&self, frame: Frame) -> u32 {
        self.refs.get(self.index_of(frame))
    }

    /// Free frames currently held by partition `cpu`.
    ///
    /// # Panics
    /// Panics if `cpu` does not name a partition.
    #[must_use]
    pub fn free_frames(&self, cpu: usize) -> usize {
        self.partition(cpu).free.lock().len()
    }

    /// Free frames over all partitions. Not a consistent snapshot under concurrency.
    #[must_use]
    pub fn total_free(&self) -> usize {
        self.partitions.iter().map(|p| p.free.lock().len()).sum()
    }

    #[must_use]
    pub const fn total_frames(&self) -> usize {
        self.frames
    }

    #[must_use]
    pub const fn partitions(&self) -> usize {
        self.partitions.len()
    }

    /// The managed range `[start, end)`.
    #[must_use]
    pub fn range(&self) -> (PhysicalAddress, PhysicalAddress) {
        (self.base, self.base + self.frames as u64 * FRAME_BYTES)
    }

    #[must_use]
    pub fn contains(&self, frame: Frame) -> bool {
        let (start, end) = self.range();
        start <= frame.base() && frame.base() < end
    }

    /// Move the back half of the richest other partition's list to `cpu`.
    fn steal(&self, cpu: usize) -> Steal {
        let mut victim = None;
        let mut best = 0;
        for (p, partition) in self.partitions.iter().enumerate() {
            if p == cpu {
                continue;
            }
            let free = partition.free.lock().len();
            if free > best {
                best = free;
                victim = Some(p);
            }
        }
        let Some(victim) = victim else {
            return Steal::NothingFree;
        };

        let (mut local, mut remote) = lock_ordered(
            (cpu, &self.partitions[cpu].free),
            (victim, &self.partitions[victim].free),
        );
        let Some(chain) = remote.split_off_back_half(&self.links) else {
            return Steal::Raced;
        };
        let moved = chain.len();
        local.splice_front(&self.links, chain);
        trace!(
            "page allocator: moved {moved} frame(s) from partition {victim} ({} left) to {cpu} ({} now)",
            remote.len(),
            local.len()
        );
        Steal::Moved(moved)
    }

    fn partition(&self, cpu: usize) -> &Partition {
        self.partitions.get(cpu).unwrap_or_else(|| {
            panic!(
                "page allocator: cpu {cpu} has no partition ({} configured)",
                self.partitions.len()
            )
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn index_of(&self, frame: Frame) -> FrameIndex {
        assert!(
            self.contains(frame),
            "page allocator: {frame:?} is outside the managed range"
        );
        FrameIndex::new(((frame.base().as_u64() - self.base.as_u64()) / FRAME_BYTES) as usize)
    }

    fn frame_at(&self, index: FrameIndex) -> Frame {
        Frame::new(self.base + index.get() as u64 * FRAME_BYTES)
    }

    fn poison(&self, index: FrameIndex, junk: u8) {
        if cfg!(any(debug_assertions, feature = "poison")) {
            let base = self.frame_at(index).base();
            // SAFETY: the allocator owns the managed range exclusively and the
            // frame is on no free list and has no owner while being poisoned.
            let bytes = unsafe { self.mapper.phys_to_mut::<[u8; PAGE_SIZE]>(base) };
            bytes.fill(junk);
        }
    }
}
