//! # Kernel synchronization primitives
//!
//! * [`Mutex`] with a pluggable raw lock ([`RawSpin`]) for short, non-blocking
//!   critical sections such as hash buckets and allocator partitions.
//! * [`lock_ordered`] to take two locks of one family in a fixed total order.
//! * [`SleepLock`] for long-held, single-owner locks whose waiters sleep on a
//!   [`WaitChannel`] through the [`Scheduler`] until the holder lets go.
//! * [`SyncOnceCell`] for subsystems that are installed exactly once at boot.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod mutex;
mod raw_spin;
mod scheduler;
mod sleep_lock;
mod sync_once_cell;

pub use mutex::{Mutex, MutexGuard, lock_ordered};
pub use raw_spin::RawSpin;
pub use scheduler::{ContextId, Scheduler, WaitChannel};
pub use sleep_lock::{SleepLock, SleepLockGuard};
pub use sync_once_cell::SyncOnceCell;

pub type SpinMutex<T> = Mutex<T, RawSpin>;
pub type SpinMutexGuard<'a, T> = MutexGuard<'a, T, RawSpin>;

impl<T> SpinMutex<T> {
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawSpin::new(), value)
    }
}

pub trait RawLock {
    fn raw_lock(&self);
    fn raw_try_lock(&self) -> bool;
    fn raw_is_locked(&self) -> bool;
}

pub trait RawUnlock {
    unsafe fn raw_unlock(&self);
}
