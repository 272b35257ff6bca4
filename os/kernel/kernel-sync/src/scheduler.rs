use core::fmt;

/// Identity of an execution context (a process or kernel thread).
///
/// Used to record who owns a [`SleepLock`](crate::SleepLock).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(u64);

impl ContextId {
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// What sleepers wait on and wakers signal: the address of the object
/// whose state change ends the wait.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaitChannel(usize);

impl WaitChannel {
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized>(object: &T) -> Self {
        Self(core::ptr::from_ref(object).cast::<()>().addr())
    }
}

impl fmt::Display for WaitChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan@{:#x}", self.0)
    }
}

/// The scheduler as seen by blocking primitives.
///
/// The kernel implements this on top of its process table; hosted tests map
/// contexts to OS threads.
pub trait Scheduler: Sync {
    /// The context currently running on this processor.
    fn context_id(&self) -> ContextId;

    /// Suspend the calling context on `channel` until a [`wakeup`](Self::wakeup)
    /// for that channel.
    ///
    /// `still_blocked` is evaluated after the context has been queued on the
    /// channel and before it gives up the processor; if it returns `false`
    /// the call returns at once. A wakeup that races with the check must not
    /// be lost. Spurious returns are allowed, callers re-check their condition.
    fn sleep(&self, channel: WaitChannel, still_blocked: &dyn Fn() -> bool);

    /// Make every context sleeping on `channel` runnable again.
    fn wakeup(&self, channel: WaitChannel);
}

impl<S> Scheduler for &S
where
    S: Scheduler + ?Sized,
{
    #[inline]
    fn context_id(&self) -> ContextId {
        (**self).context_id()
    }

    #[inline]
    fn sleep(&self, channel: WaitChannel, still_blocked: &dyn Fn() -> bool) {
        (**self).sleep(channel, still_blocked);
    }

    #[inline]
    fn wakeup(&self, channel: WaitChannel) {
        (**self).wakeup(channel);
    }
}
