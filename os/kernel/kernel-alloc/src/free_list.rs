use alloc::boxed::Box;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Index of a frame within the managed range.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) struct FrameIndex(usize);

impl FrameIndex {
    #[inline]
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub(crate) const fn get(self) -> usize {
        self.0
    }
}

/// Sentinel for "no next frame".
const NIL: usize = usize::MAX;

/// The `next` pointer of every managed frame, stored out of line.
///
/// Frames migrate between partitions, so the links cannot live inside any one
/// partition's mutex. Instead a link is only read or written by the holder of
/// the lock of the partition whose free list currently contains that frame;
/// the lock provides the ordering, the atomics merely make the shared slice
/// `Sync`.
pub(crate) struct Links(Box<[AtomicUsize]>);

impl Links {
    pub(crate) fn new(frames: usize) -> Self {
        Self((0..frames).map(|_| AtomicUsize::new(NIL)).collect())
    }

    #[inline]
    fn next(&self, at: FrameIndex) -> Option<FrameIndex> {
        match self.0[at.0].load(Ordering::Relaxed) {
            NIL => None,
            i => Some(FrameIndex(i)),
        }
    }

    #[inline]
    fn set_next(&self, at: FrameIndex, next: Option<FrameIndex>) {
        self.0[at.0].store(next.map_or(NIL, |n| n.0), Ordering::Relaxed);
    }
}

/// A run of linked frames detached from a [`FreeList`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Chain {
    head: FrameIndex,
    tail: FrameIndex,
    len: usize,
}

impl Chain {
    pub(crate) const fn len(&self) -> usize {
        self.len
    }
}

/// Singly linked LIFO list of free frames, threaded through [`Links`].
///
/// # Invariants
/// - `len` equals the number of frames reachable from `head`.
/// - Every reachable frame is reachable from exactly one list.
#[derive(Debug)]
pub(crate) struct FreeList {
    head: Option<FrameIndex>,
    len: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn push(&mut self, links: &Links, frame: FrameIndex) {
        links.set_next(frame, self.head);
        self.head = Some(frame);
        self.len += 1;
    }

    pub(crate) fn pop(&mut self, links: &Links) -> Option<FrameIndex> {
        let head = self.head?;
        self.head = links.next(head);
        links.set_next(head, None);
        self.len -= 1;
        Some(head)
    }

    /// Detach the trailing half of the list.
    ///
    /// The midpoint is found with a slow/fast walk (the fast cursor moves two
    /// links per step) rather than from `len`. With `n` frames the list keeps
    /// `ceil(n / 2)` and the chain receives `floor(n / 2)`, except that a
    /// single frame is handed over whole so a steal can always make progress.
    pub(crate) fn split_off_back_half(&mut self, links: &Links) -> Option<Chain> {
        let head = self.head?;
        let Some(mut fast) = links.next(head) else {
            self.head = None;
            self.len = 0;
            return Some(Chain {
                head,
                tail: head,
                len: 1,
            });
        };

        let mut slow = head;
        while let Some(after) = links.next(fast) {
            let Some(step) = links.next(slow) else { break };
            slow = step;
            match links.next(after) {
                Some(next) => fast = next,
                None => break,
            }
        }

        let back = links.next(slow)?;
        links.set_next(slow, None);

        let mut tail = back;
        let mut len = 1;
        while let Some(next) = links.next(tail) {
            tail = next;
            len += 1;
        }
        self.len -= len;
        Some(Chain {
            head: back,
            tail,
            len,
        })
    }

    /// Splice a detached chain in front of this list.
    pub(crate) fn splice_front(&mut self, links: &Links, chain: Chain) {
        links.set_next(chain.tail, self.head);
        self.head = Some(chain.head);
        self.len += chain.len;
    }

    #[cfg(test)]
    fn collect(&self, links: &Links) -> alloc::vec::Vec<usize> {
        let mut out = alloc::vec::Vec::new();
        let mut at = self.head;
        while let Some(i) = at {
            out.push(i.get());
            at = links.next(i);
        }
        out
    }
}
