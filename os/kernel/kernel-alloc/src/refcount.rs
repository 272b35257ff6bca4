use crate::free_list::FrameIndex;
use alloc::boxed::Box;
use alloc::vec;
use kernel_sync::SpinMutex;

/// Per-frame owner counts for copy-on-write sharing.
///
/// The table spans the whole managed range and is independent of the
/// partitioning: a frame keeps its slot no matter which free list it sits on.
/// A count of zero means the frame is free.
pub(crate) struct RefCounts {
    counts: SpinMutex<Box<[u32]>>,
}

impl RefCounts {
    pub(crate) fn new(frames: usize) -> Self {
        Self {
            counts: SpinMutex::new(vec![0; frames].into_boxed_slice()),
        }
    }

    pub(crate) fn get(&self, frame: FrameIndex) -> u32 {
        self.counts.lock()[frame.get()]
    }

    /// A freshly allocated frame has exactly one owner, whatever was left before.
    pub(crate) fn reset_to_one(&self, frame: FrameIndex) {
        self.counts.lock()[frame.get()] = 1;
    }

    /// Add `n` owners. `None` if the frame is free or the count would overflow.
    pub(crate) fn add(&self, frame: FrameIndex, n: u32) -> Option<u32> {
        let mut counts = self.counts.lock();
        let count = &mut counts[frame.get()];
        if *count == 0 {
            return None;
        }
        *count = count.checked_add(n)?;
        Some(*count)
    }

    /// Drop one owner and return how many remain. `None` if the count was already zero.
    pub(crate) fn release(&self, frame: FrameIndex) -> Option<u32> {
        let mut counts = self.counts.lock();
        let count = &mut counts[frame.get()];
        *count = count.checked_sub(1)?;
        Some(*count)
    }
}
