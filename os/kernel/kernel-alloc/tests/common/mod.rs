#![allow(dead_code)]

use kernel_alloc::{Frame, HhdmPhysMapper, PageAllocator, PhysicalAddress};
use kernel_info::memory::PAGE_SIZE;

#[derive(Clone)]
#[repr(C, align(4096))]
struct Page([u8; PAGE_SIZE]);

/// Heap memory standing in for the physical range `[base, base + pages * PAGE_SIZE)`.
pub struct PhysMemory {
    ptr: *mut Page,
    pages: usize,
    base: u64,
}

// Safety: the memory is only touched through the allocator's locks or after all threads joined.
unsafe impl Send for PhysMemory {}
unsafe impl Sync for PhysMemory {}

impl PhysMemory {
    pub fn new(base: u64, pages: usize) -> Self {
        let boxed = vec![Page([0xAA; PAGE_SIZE]); pages].into_boxed_slice();
        let ptr = Box::into_raw(boxed).cast::<Page>();
        Self { ptr, pages, base }
    }

    pub fn mapper(&self) -> HhdmPhysMapper {
        let va = self.ptr.expose_provenance() as u64;
        HhdmPhysMapper::with_offset(va.wrapping_sub(self.base))
    }

    pub fn start(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base)
    }

    pub fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base + (self.pages * PAGE_SIZE) as u64)
    }

    pub fn allocator(&self, partitions: usize) -> PageAllocator<HhdmPhysMapper> {
        PageAllocator::new(self.mapper(), self.start(), self.end(), partitions)
            .expect("valid test range")
    }

    /// Content of `frame`; only call while no other thread touches it.
    pub fn bytes(&self, frame: Frame) -> &[u8] {
        let index = ((frame.base().as_u64() - self.base) as usize) / PAGE_SIZE;
        assert!(index < self.pages);
        unsafe { &(*self.ptr.add(index)).0 }
    }

    pub fn write(&self, frame: Frame, value: u8) {
        let index = ((frame.base().as_u64() - self.base) as usize) / PAGE_SIZE;
        assert!(index < self.pages);
        unsafe { (*self.ptr.add(index)).0.fill(value) }
    }
}

impl Drop for PhysMemory {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(core::ptr::slice_from_raw_parts_mut(
                self.ptr, self.pages,
            )));
        }
    }
}

/// Allocate until exhaustion and return everything that came out.
pub fn drain(alloc: &PageAllocator<HhdmPhysMapper>, cpu: usize) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Ok(f) = alloc.allocate(cpu) {
        frames.push(f);
    }
    frames
}
