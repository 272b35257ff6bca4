//! # Physical Page-Frame Allocation
//!
//! This crate owns the physical memory that is left after the kernel image is
//! loaded and hands it out in 4 KiB frames to the rest of the kernel: page
//! tables, kernel stacks, pipe buffers and user pages.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 PageAllocator                       │
//! │    • allocate / free on behalf of a processor       │
//! │    • add_ref / ref_count for copy-on-write          │
//! └───────┬──────────────────┬──────────────────┬───────┘
//!         │                  │                  │
//! ┌───────▼───────┐  ┌───────▼───────┐  ┌───────▼───────┐
//! │ Partition 0   │  │ Partition 1   │  │ Partition N   │
//! │ lock + list   │◄─┤ lock + list   │  │ lock + list   │
//! └───────────────┘  └───────────────┘  └───────────────┘
//!         ▲        steal (back half, ordered locking)
//! ┌───────┴─────────────────────────────────────────────┐
//! │          Reference-count table (own lock)           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! * [`frame_alloc`]: the partitioned allocator, its stealing policy and the
//!   [`FrameAllocError`] type.
//! * [`phys_mapper`]: how frame content is reached from the kernel's address
//!   space ([`PhysMapper`], [`HhdmPhysMapper`]).
//! * [`addresses`]: [`PhysicalAddress`] and the always-aligned [`Frame`].
//! * [`global`]: the boot-time singleton.
//!
//! ## Failure Policy
//!
//! Running out of frames is expected and reported as
//! [`FrameAllocError::Exhausted`]. Misuse is not: freeing a frame twice,
//! freeing a frame the allocator does not manage, or adding references to a
//! free frame panics, because each of them means the kernel's bookkeeping is
//! already corrupt.
//!
//! ## Poisoning
//!
//! Frame content is overwritten with
//! [`JUNK_ON_FREE`](kernel_info::memory::JUNK_ON_FREE) when a frame becomes
//! free and with [`JUNK_ON_ALLOC`](kernel_info::memory::JUNK_ON_ALLOC) when it
//! is handed out, in debug builds and whenever the `poison` feature (on by
//! default) is enabled.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod addresses;
pub mod frame_alloc;
mod free_list;
pub mod global;
pub mod phys_mapper;
mod refcount;

pub use addresses::{Frame, PhysicalAddress};
pub use frame_alloc::{FrameAllocError, PageAllocator};
pub use phys_mapper::{HhdmPhysMapper, PhysMapper};
