use kernel_sync::{ContextId, Scheduler, WaitChannel};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Maps every OS thread to its own execution context. Sleeping parks the
/// thread on a condition variable until the channel's wakeup counter moves.
pub struct ThreadScheduler;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);
static WAKEUPS: Mutex<BTreeMap<WaitChannel, u64>> = Mutex::new(BTreeMap::new());
static WOKEN: Condvar = Condvar::new();

thread_local! {
    static CONTEXT: Cell<u64> = const { Cell::new(0) };
}

fn wakeups() -> MutexGuard<'static, BTreeMap<WaitChannel, u64>> {
    WAKEUPS.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler for ThreadScheduler {
    fn context_id(&self) -> ContextId {
        CONTEXT.with(|id| {
            if id.get() == 0 {
                id.set(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed));
            }
            ContextId::new(id.get())
        })
    }

    fn sleep(&self, channel: WaitChannel, still_blocked: &dyn Fn() -> bool) {
        let mut counters = wakeups();
        if !still_blocked() {
            return;
        }
        let seen = counters.get(&channel).copied().unwrap_or(0);
        while counters.get(&channel).copied().unwrap_or(0) == seen {
            counters = WOKEN.wait(counters).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn wakeup(&self, channel: WaitChannel) {
        *wakeups().entry(channel).or_default() += 1;
        WOKEN.notify_all();
    }
}
