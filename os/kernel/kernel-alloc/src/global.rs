//! # The kernel's page allocator singleton
//!
//! The allocator is built once during early boot, after the memory map is
//! known, and lives until shutdown. [`init`] may succeed only once per
//! address space; everything afterwards goes through [`page_allocator`].
//! Tests that need a private pool construct a [`PageAllocator`] directly.

use crate::addresses::PhysicalAddress;
use crate::frame_alloc::{FrameAllocError, PageAllocator};
use crate::phys_mapper::HhdmPhysMapper;
use kernel_sync::SyncOnceCell;

pub type KernelPageAllocator = PageAllocator<HhdmPhysMapper>;

static PAGE_ALLOCATOR: SyncOnceCell<KernelPageAllocator> = SyncOnceCell::new();

/// Build the global allocator over `[start, end)` with one partition per processor.
///
/// # Errors
/// - [`FrameAllocError::AlreadyInitialized`] on every call after the first
///   successful one.
/// - Any construction error of [`PageAllocator::new`].
pub fn init(
    mapper: HhdmPhysMapper,
    start: PhysicalAddress,
    end: PhysicalAddress,
    cpus: usize,
) -> Result<&'static KernelPageAllocator, FrameAllocError> {
    if PAGE_ALLOCATOR.is_initialized() {
        return Err(FrameAllocError::AlreadyInitialized);
    }
    let allocator = PageAllocator::new(mapper, start, end, cpus)?;
    PAGE_ALLOCATOR
        .set(allocator)
        .map_err(|_| FrameAllocError::AlreadyInitialized)
}

/// The global allocator, if [`init`] has run.
#[inline]
#[must_use]
pub fn page_allocator() -> Option<&'static KernelPageAllocator> {
    PAGE_ALLOCATOR.get()
}
