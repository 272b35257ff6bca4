use crate::{RawLock, RawUnlock};
use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

/// Mutual exclusion over `T`, parameterized by the raw lock `R`.
pub struct Mutex<T, R> {
    raw: R,
    cell: UnsafeCell<T>,
    _no_send_sync: PhantomData<*mut ()>, // !Send/!Sync by default; we implement below
}

unsafe impl<T: Send, R: Sync> Sync for Mutex<T, R> {}
unsafe impl<T: Send, R: Send> Send for Mutex<T, R> {}

impl<T, R> Mutex<T, R> {
    pub const fn from_raw(raw: R, value: T) -> Self {
        Self {
            raw,
            cell: UnsafeCell::new(value),
            _no_send_sync: PhantomData,
        }
    }
}

pub struct MutexGuard<'a, T, R>
where
    R: RawUnlock,
{
    m: &'a Mutex<T, R>,
}

impl<T, R> Deref for MutexGuard<'_, T, R>
where
    R: RawUnlock,
{
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.m.cell.get() }
    }
}

impl<T, R> DerefMut for MutexGuard<'_, T, R>
where
    R: RawUnlock,
{
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.m.cell.get() }
    }
}

impl<T, R> Drop for MutexGuard<'_, T, R>
where
    R: RawUnlock,
{
    fn drop(&mut self) {
        unsafe { self.m.raw.raw_unlock() }
    }
}

impl<T, R> Mutex<T, R>
where
    R: RawLock + RawUnlock,
{
    #[inline]
    #[must_use]
    pub fn lock(&self) -> MutexGuard<'_, T, R> {
        self.raw.raw_lock();
        MutexGuard { m: self }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T, R>> {
        if self.raw.raw_try_lock() {
            Some(MutexGuard { m: self })
        } else {
            None
        }
    }

    /// Closure convenience, built on the guard.
    #[inline]
    pub fn with_lock<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        let mut g = self.lock();
        f(&mut g)
    }

    /// Whether some context currently holds the lock. Racy; use in assertions only.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.raw.raw_is_locked()
    }
}

/// Locks two mutexes of the same family in ascending `rank` order.
///
/// Every context that needs two locks of a family (e.g. two allocator
/// partitions) goes through this function, so all of them agree on one total
/// order and no cycle of waiters can form. The guards are returned in argument
/// order regardless of which lock was taken first.
///
/// # Panics
/// Panics if both ranks are equal; locking the same member twice would
/// self-deadlock.
///
/// # Example
/// ```rust
/// use kernel_sync::{SpinMutex, lock_ordered};
///
/// let parts = [SpinMutex::new(1), SpinMutex::new(2)];
/// let (mut hi, mut lo) = lock_ordered((1, &parts[1]), (0, &parts[0]));
/// core::mem::swap(&mut *hi, &mut *lo);
/// drop((hi, lo));
/// assert_eq!(*parts[0].lock(), 2);
/// ```
pub fn lock_ordered<'a, T, R>(
    a: (usize, &'a Mutex<T, R>),
    b: (usize, &'a Mutex<T, R>),
) -> (MutexGuard<'a, T, R>, MutexGuard<'a, T, R>)
where
    R: RawLock + RawUnlock,
{
    let ((rank_a, lock_a), (rank_b, lock_b)) = (a, b);
    assert_ne!(rank_a, rank_b, "lock_ordered: rank {rank_a} requested twice");
    if rank_a < rank_b {
        let ga = lock_a.lock();
        let gb = lock_b.lock();
        (ga, gb)
    } else {
        let gb = lock_b.lock();
        let ga = lock_a.lock();
        (ga, gb)
    }
}
