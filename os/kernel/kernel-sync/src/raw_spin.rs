use crate::{RawLock, RawUnlock};
use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

/// Upper bound for the number of `spin_loop` hints between two probes.
const MAX_BACKOFF: u32 = 64;

/// Test-and-test-and-set spin lock without payload.
///
/// Waiters probe the flag with plain loads and double their pause between
/// probes up to [`MAX_BACKOFF`], so a contended bucket or partition lock does
/// not turn into a cache-line ping-pong between processors.
pub struct RawSpin {
    held: AtomicBool,
}

impl Default for RawSpin {
    fn default() -> Self {
        Self::new()
    }
}

impl RawSpin {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn lock(&self) {
        if self.try_lock() {
            return;
        }
        self.lock_contended();
    }

    #[cold]
    fn lock_contended(&self) {
        let mut pause = 1;
        loop {
            while self.held.load(Ordering::Relaxed) {
                for _ in 0..pause {
                    spin_loop();
                }
                pause = (pause * 2).min(MAX_BACKOFF);
            }
            if self.try_lock() {
                return;
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn try_lock(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Snapshot of the lock state; only meaningful for assertions.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }

    /// # Safety
    /// The caller must be the current holder.
    #[inline]
    pub unsafe fn unlock(&self) {
        debug_assert!(self.is_locked(), "RawSpin::unlock on an unlocked lock");
        self.held.store(false, Ordering::Release);
    }
}

impl RawLock for RawSpin {
    fn raw_lock(&self) {
        self.lock();
    }

    fn raw_try_lock(&self) -> bool {
        self.try_lock()
    }

    fn raw_is_locked(&self) -> bool {
        self.is_locked()
    }
}

impl RawUnlock for RawSpin {
    unsafe fn raw_unlock(&self) {
        unsafe { self.unlock() }
    }
}
