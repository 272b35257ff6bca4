//! # Memory Layout

/// Size of one physical frame in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Upper bound on the number of processors, and thus on allocator partitions.
pub const MAX_CPUS: usize = 8;

/// Byte pattern written over a frame when it returns to a free list.
///
/// Reads through a dangling reference then observe garbage instead of stale data.
pub const JUNK_ON_FREE: u8 = 0x01;

/// Byte pattern written over a frame when it is handed out.
///
/// Callers that read before writing observe garbage instead of zeroes.
pub const JUNK_ON_ALLOC: u8 = 0x05;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(MAX_CPUS > 0);
    assert!(JUNK_ON_FREE != JUNK_ON_ALLOC);
    assert!(HHDM_BASE.is_multiple_of(PAGE_SIZE as u64));
};
