//! # Block Buffer Cache
//!
//! An in-memory cache of disk blocks shared by every execution context. The
//! file system reads and writes blocks exclusively through it, which gives
//! two guarantees:
//!
//! * a block is cached in at most one buffer, so all contexts see the same
//!   bytes;
//! * a buffer is used by at most one context at a time.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   BufferCache                       │
//! │    • acquire / write / release (ExclusiveBuffer)    │
//! │    • pin / unpin (PinnedBuffer) for the log layer   │
//! └───────┬──────────────────┬──────────────────┬───────┘
//!         │ blockno % n      │                  │
//! ┌───────▼───────┐  ┌───────▼───────┐  ┌───────▼───────┐
//! │ Bucket 0      │  │ Bucket 1      │  │ Bucket n-1    │
//! │ spin + slots  │◄─┤ spin + slots  │  │ spin + slots  │
//! └───────────────┘  └───────────────┘  └───────────────┘
//!         ▲        steal (under the cache-wide steal lock)
//! ┌───────┴─────────────────────────────────────────────┐
//! │     Slot payloads: SleepLock<[u8; BLOCK_SIZE]>      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! * [`cache`]: [`BufferCache`], its configuration, statistics and errors.
//! * [`buffer`]: the [`ExclusiveBuffer`] guard and the [`PinnedBuffer`] token.
//! * [`device`]: the [`BlockDevice`] seam to the disk driver.
//! * [`global`]: the boot-time singleton.
//!
//! ## Failure Policy
//!
//! Running out of unreferenced buffers is reported as
//! [`BufferCacheError::Exhausted`]; callers may release buffers and retry.
//! Writing a buffer from the wrong context, or unpinning a block that is not
//! pinned, panics.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

mod bucket;
pub mod buffer;
pub mod cache;
pub mod device;
pub mod global;

pub use buffer::{ExclusiveBuffer, PinnedBuffer};
pub use cache::{BufferCache, BufferCacheConfig, BufferCacheError, CacheStats};
pub use device::{BlockData, BlockDevice, BlockId, IoOp};
