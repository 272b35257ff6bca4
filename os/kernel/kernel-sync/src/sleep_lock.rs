use crate::{ContextId, RawSpin, Scheduler, SpinMutex, WaitChannel};
use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

/// A single-owner lock for long critical sections.
///
/// Unlike [`SpinMutex`], a context that finds the lock taken does not burn its
/// processor: it sleeps on the lock's [`WaitChannel`] until the holder's guard
/// is dropped and wakes it. The lock remembers which [`ContextId`] holds it,
/// so misuse (re-acquiring, or checking ownership from the wrong context) is
/// detectable.
///
/// The internal spin lock only guards the ownership word and is never held
/// while the protected value is in use or while a waiter sleeps.
///
/// # Examples
///
/// ```rust
/// use kernel_sync::{ContextId, Scheduler, SleepLock, WaitChannel};
///
/// struct Single;
/// impl Scheduler for Single {
///     fn context_id(&self) -> ContextId { ContextId::new(1) }
///     fn sleep(&self, _: WaitChannel, _: &dyn Fn() -> bool) {}
///     fn wakeup(&self, _: WaitChannel) {}
/// }
///
/// let lock = SleepLock::new([0u8; 4]);
/// {
///     let mut g = lock.lock(&Single);
///     g[0] = 7;
///     assert!(lock.holding(&Single));
/// }
/// assert!(!lock.is_locked());
/// ```
pub struct SleepLock<T> {
    owner: SpinMutex<Option<ContextId>>,
    cell: UnsafeCell<T>,
}

// Safety: access to `cell` is serialized by the ownership word.
unsafe impl<T: Send> Sync for SleepLock<T> {}
unsafe impl<T: Send> Send for SleepLock<T> {}

impl<T> SleepLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            owner: SpinMutex::from_raw(RawSpin::new(), None),
            cell: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock for the calling context, sleeping while it is held elsewhere.
    ///
    /// The returned guard wakes the remaining waiters through `scheduler`
    /// when it is dropped.
    ///
    /// # Panics
    /// Panics if the calling context already holds this lock; waiting on
    /// ourselves would never end.
    pub fn lock<'a, S: Scheduler>(&'a self, scheduler: &'a S) -> SleepLockGuard<'a, T> {
        let me = scheduler.context_id();
        let channel = WaitChannel::of(self);
        loop {
            if let Some(guard) = self.try_lock_as(me, scheduler) {
                return guard;
            }
            scheduler.sleep(channel, &|| self.is_locked());
        }
    }

    /// Try once; returns immediately.
    ///
    /// # Panics
    /// Panics if the calling context already holds this lock.
    pub fn try_lock<'a, S>(&'a self, scheduler: &'a S) -> Option<SleepLockGuard<'a, T>>
    where
        S: Scheduler,
    {
        self.try_lock_as(scheduler.context_id(), scheduler)
    }

    fn try_lock_as<'a>(
        &'a self,
        me: ContextId,
        scheduler: &'a dyn Scheduler,
    ) -> Option<SleepLockGuard<'a, T>> {
        let mut owner = self.owner.lock();
        match *owner {
            None => {
                *owner = Some(me);
                Some(SleepLockGuard {
                    lock: self,
                    owner: me,
                    scheduler,
                    _not_send: PhantomData,
                })
            }
            Some(holder) => {
                assert_ne!(holder, me, "sleep lock: {me} acquired a lock it already holds");
                None
            }
        }
    }

    /// Whether the calling context is the current holder.
    #[must_use]
    pub fn holding<S>(&self, scheduler: &S) -> bool
    where
        S: Scheduler + ?Sized,
    {
        *self.owner.lock() == Some(scheduler.context_id())
    }

    /// Whether any context holds the lock. Racy: fit for assertions and for
    /// the condition handed to [`Scheduler::sleep`].
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.owner.lock().is_some()
    }

}

impl<T> fmt::Debug for SleepLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SleepLock")
            .field("owner", &*self.owner.lock())
            .finish_non_exhaustive()
    }
}

/// Proof of ownership of a [`SleepLock`]; releases it on drop.
///
/// The guard is tied to the context that acquired it and cannot be moved to
/// another thread.
pub struct SleepLockGuard<'a, T> {
    lock: &'a SleepLock<T>,
    owner: ContextId,
    scheduler: &'a dyn Scheduler,
    _not_send: PhantomData<*const ()>,
}

// Safety: a shared guard only hands out `&T`.
unsafe impl<T: Sync> Sync for SleepLockGuard<'_, T> {}

impl<T> SleepLockGuard<'_, T> {
    /// The context that holds the lock through this guard.
    #[inline]
    #[must_use]
    pub const fn owner(&self) -> ContextId {
        self.owner
    }

    /// Whether the lock is still recorded as held by this guard's owner.
    #[must_use]
    pub fn is_held(&self) -> bool {
        *self.lock.owner.lock() == Some(self.owner)
    }
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.cell.get() }
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.cell.get() }
    }
}

impl<T> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        {
            let mut owner = self.lock.owner.lock();
            debug_assert_eq!(*owner, Some(self.owner), "sleep lock released by a non-owner");
            *owner = None;
        }
        self.scheduler.wakeup(WaitChannel::of(self.lock));
    }
}
