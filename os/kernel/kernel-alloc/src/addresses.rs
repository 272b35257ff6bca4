//! Typed physical addresses and frames.

use core::fmt;
use core::ops::Add;
use kernel_info::memory::PAGE_SIZE;

const PAGE_MASK: u64 = PAGE_SIZE as u64 - 1;

/// Physical memory address.
///
/// A thin wrapper around `u64` that carries intent: it is never dereferenced
/// directly, only translated through a [`PhysMapper`](crate::phys_mapper::PhysMapper).
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Round up to the next page boundary, or `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn page_align_up(self) -> Option<Self> {
        match self.0.checked_add(PAGE_MASK) {
            Some(v) => Some(Self(v & !PAGE_MASK)),
            None => None,
        }
    }

    /// Round down to the containing page boundary.
    #[inline]
    #[must_use]
    pub const fn page_align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;

    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

/// One page-aligned physical frame of [`PAGE_SIZE`] bytes.
///
/// A `Frame` is always aligned; misaligned addresses are rejected when the
/// frame is constructed, before they can reach the allocator.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Frame(PhysicalAddress);

impl Frame {
    /// The frame starting at `base`.
    ///
    /// # Panics
    /// Panics if `base` is not page aligned.
    #[inline]
    #[must_use]
    pub const fn new(base: PhysicalAddress) -> Self {
        assert!(base.is_page_aligned(), "frame: misaligned base address");
        Self(base)
    }

    /// The frame starting at `base`, or `None` if `base` is misaligned.
    #[inline]
    #[must_use]
    pub const fn from_base(base: PhysicalAddress) -> Option<Self> {
        if base.is_page_aligned() {
            Some(Self(base))
        } else {
            None
        }
    }

    /// The frame that contains `pa`.
    #[inline]
    #[must_use]
    pub const fn containing(pa: PhysicalAddress) -> Self {
        Self(pa.page_align_down())
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        self.0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame(0x{:016X})", self.0.as_u64())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Frame> for PhysicalAddress {
    fn from(value: Frame) -> Self {
        value.base()
    }
}
