//! # Direct-map physical memory access
//!
//! The allocator never dereferences a [`PhysicalAddress`] itself. Whenever it
//! has to touch frame content (poisoning on free and allocation), it asks a
//! [`PhysMapper`] for a pointer in the current address space.
//!
//! - In the kernel, every physical address is mapped at `HHDM_BASE + pa`
//!   ([`HhdmPhysMapper::kernel`]).
//! - Hosted tests back a fake physical range with heap memory and map it with
//!   an arbitrary offset ([`HhdmPhysMapper::with_offset`]).

use crate::addresses::PhysicalAddress;
use kernel_info::memory::HHDM_BASE;

/// Converts physical addresses to *temporarily* usable pointers in the current
/// virtual address space.
///
/// # Safety
/// - You must ensure `pa` is mapped as writable in the current page tables
///   for `&mut T`.
/// - Lifetime `'a` is purely borrow-checked; the mapping must remain valid
///   for `'a`.
/// - Type `T` must match the bytes at `pa` (no aliasing UB).
pub trait PhysMapper: Sync {
    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// See the trait documentation.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// [`PhysMapper`] for a linear direct map: `va = pa + offset`.
///
/// # Example
/// ```rust
/// use kernel_alloc::phys_mapper::{HhdmPhysMapper, PhysMapper};
/// use kernel_alloc::PhysicalAddress;
///
/// let mut word = 0u64;
/// let va = core::ptr::from_mut(&mut word).expose_provenance() as u64;
/// let mapper = HhdmPhysMapper::with_offset(va.wrapping_sub(0x8000));
/// unsafe {
///     *mapper.phys_to_mut::<u64>(PhysicalAddress::new(0x8000)) = 42;
/// }
/// assert_eq!(word, 42);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HhdmPhysMapper {
    offset: u64,
}

impl HhdmPhysMapper {
    /// The kernel's higher-half direct map at [`HHDM_BASE`].
    #[must_use]
    pub const fn kernel() -> Self {
        Self { offset: HHDM_BASE }
    }

    /// A direct map at an arbitrary (wrapping) offset.
    #[must_use]
    pub const fn with_offset(offset: u64) -> Self {
        Self { offset }
    }
}

impl PhysMapper for HhdmPhysMapper {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = pa.as_u64().wrapping_add(self.offset) as usize;
        let ptr = core::ptr::with_exposed_provenance_mut::<T>(va);
        // SAFETY: Caller must ensure the physical address is valid and mapped.
        unsafe { &mut *ptr }
    }
}
