//! # The kernel's buffer cache singleton
//!
//! Installed once the root device driver is up. Device and scheduler are
//! referenced through trait objects so the file system does not need to name
//! the driver type.

use crate::cache::{BufferCache, BufferCacheConfig, BufferCacheError};
use crate::device::BlockDevice;
use kernel_sync::{Scheduler, SyncOnceCell};

pub type KernelBufferCache = BufferCache<&'static dyn BlockDevice, &'static dyn Scheduler>;

static BUFFER_CACHE: SyncOnceCell<KernelBufferCache> = SyncOnceCell::new();

/// Build the global cache.
///
/// # Errors
/// - [`BufferCacheError::AlreadyInitialized`] on every call after the first
///   successful one.
/// - [`BufferCacheError::InvalidConfig`] from [`BufferCache::new`].
pub fn init(
    device: &'static dyn BlockDevice,
    scheduler: &'static dyn Scheduler,
    config: BufferCacheConfig,
) -> Result<&'static KernelBufferCache, BufferCacheError> {
    if BUFFER_CACHE.is_initialized() {
        return Err(BufferCacheError::AlreadyInitialized);
    }
    let cache = BufferCache::new(device, scheduler, config)?;
    BUFFER_CACHE
        .set(cache)
        .map_err(|_| BufferCacheError::AlreadyInitialized)
}

#[inline]
#[must_use]
pub fn buffer_cache() -> Option<&'static KernelBufferCache> {
    BUFFER_CACHE.get()
}
