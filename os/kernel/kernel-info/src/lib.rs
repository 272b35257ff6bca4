//! # Kernel Configuration
//!
//! Compile-time configuration shared by the kernel's resource managers. This
//! crate is the single source of truth for the sizes that the buffer cache and
//! the physical frame allocator are built around, so that both subsystems (and
//! their tests) agree on them without passing numbers around by hand.
//!
//! ## Modules
//!
//! ### Memory ([`memory`])
//! * **Page geometry**: size and shift of a physical frame
//! * **Processor bound**: upper limit for per-processor partitions
//! * **Poison patterns**: byte values written over freed and freshly
//!   allocated frames to surface dangling and uninitialized accesses
//! * **HHDM**: the higher-half direct map offset used to touch physical memory
//!
//! ### File System ([`fs`])
//! * **Block geometry**: size of one cached disk block
//! * **Buffer pool**: number of buffers and hash buckets of the block cache
//!
//! ## Validation
//!
//! Every module closes with a `const` block of assertions, so an invalid
//! combination of values fails the build instead of failing at boot:
//!
//! ```rust
//! use kernel_info::{fs, memory};
//!
//! assert!(memory::PAGE_SIZE.is_power_of_two());
//! assert!(fs::NBUF >= fs::NBUCKETS);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod fs;
pub mod memory;
