//! Process-shared synchronization for the queue region.
//!
//! A mutex and two broadcast events live at fixed offsets inside the shared
//! region, so every process attaching to the same queue sees the same
//! primitives. The events are level-triggered: `notify_*` leaves them
//! signaled until the next waiter clears them, which is what lets a single
//! `stop()` reach every blocked caller at once.

use raw_sync::events::{Event, EventImpl, EventInit, EventState};
use raw_sync::locks::{LockGuard, LockImpl, LockInit, Mutex};
use raw_sync::Timeout;
use std::time::Duration;

use crate::error::{Error, Result};

/// Upper bound on a single event wait.
///
/// Every notification is issued while the shared mutex is held and every
/// waiter clears the event under the same mutex before releasing it, so no
/// wakeup can be lost. The bound exists so a waiter re-examines shared state
/// at a known cadence even if the underlying event primitive wakes it late
/// or not at all; expiry is treated as a spurious wakeup, never an error.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Bytes the mutex occupies inside the region.
pub(crate) fn mutex_size() -> usize {
    Mutex::size_of(None)
}

/// Bytes one event occupies inside the region.
pub(crate) fn event_size() -> usize {
    Event::size_of(None)
}

/// The mutex plus the "not full" / "not empty" events of one attached queue.
pub(crate) struct QueueSync {
    mutex: Box<dyn LockImpl>,
    not_full: Box<dyn EventImpl>,
    not_empty: Box<dyn EventImpl>,
}

impl QueueSync {
    /// Constructs the primitives in place inside a freshly created region.
    ///
    /// # Safety
    ///
    /// The three pointers must address writable, zeroed memory inside the
    /// mapped region, each with room for [`mutex_size`] / [`event_size`]
    /// bytes, and `data` must point at the queue header the mutex protects.
    pub(crate) unsafe fn init_new(
        mutex_mem: *mut u8,
        data: *mut u8,
        not_full_mem: *mut u8,
        not_empty_mem: *mut u8,
    ) -> Result<Self> {
        let (mutex, _) = Mutex::new(mutex_mem, data).map_err(Error::sync)?;
        // Manual-reset events: a set stays visible to every waiter.
        let (not_full, _) = Event::new(not_full_mem, false).map_err(Error::sync)?;
        let (not_empty, _) = Event::new(not_empty_mem, false).map_err(Error::sync)?;
        Ok(Self {
            mutex,
            not_full,
            not_empty,
        })
    }

    /// Reattaches to primitives another process already constructed.
    ///
    /// # Safety
    ///
    /// The pointers must address the same offsets [`Self::init_new`] used in
    /// the creating process, within a region whose magic has been validated.
    pub(crate) unsafe fn from_existing(
        mutex_mem: *mut u8,
        data: *mut u8,
        not_full_mem: *mut u8,
        not_empty_mem: *mut u8,
    ) -> Result<Self> {
        let (mutex, _) = Mutex::from_existing(mutex_mem, data).map_err(Error::sync)?;
        let (not_full, _) = Event::from_existing(not_full_mem).map_err(Error::sync)?;
        let (not_empty, _) = Event::from_existing(not_empty_mem).map_err(Error::sync)?;
        Ok(Self {
            mutex,
            not_full,
            not_empty,
        })
    }

    /// Acquires the shared mutex; dropping the guard releases it.
    pub(crate) fn lock(&self) -> Result<LockGuard<'_>> {
        self.mutex.lock().map_err(Error::sync)
    }

    /// Releases the lock, sleeps until "not full" fires (or the poll bound
    /// elapses), then reacquires the lock and hands back a fresh guard.
    ///
    /// Callers must re-test both the running flag and the fullness condition
    /// after this returns; a wakeup carries no promise of progress.
    pub(crate) fn wait_not_full<'a>(&'a self, guard: LockGuard<'a>) -> Result<LockGuard<'a>> {
        self.wait(self.not_full.as_ref(), guard)
    }

    /// Counterpart of [`Self::wait_not_full`] for the "not empty" event.
    pub(crate) fn wait_not_empty<'a>(&'a self, guard: LockGuard<'a>) -> Result<LockGuard<'a>> {
        self.wait(self.not_empty.as_ref(), guard)
    }

    /// Wakes every sender waiting for a free slot. Call with the lock held.
    pub(crate) fn notify_not_full(&self) -> Result<()> {
        self.not_full.set(EventState::Signaled).map_err(Error::sync)
    }

    /// Wakes every receiver waiting for a message. Call with the lock held.
    pub(crate) fn notify_not_empty(&self) -> Result<()> {
        self.not_empty.set(EventState::Signaled).map_err(Error::sync)
    }

    fn wait<'a>(&'a self, event: &dyn EventImpl, guard: LockGuard<'a>) -> Result<LockGuard<'a>> {
        // Clearing under the lock closes the race against notifiers, which
        // only ever set the event while holding the same lock.
        event.set(EventState::Clear).map_err(Error::sync)?;
        drop(guard);
        // Timeout expiry surfaces as an error from the primitive and is
        // indistinguishable from a spurious wakeup here; the caller re-tests
        // shared state under the lock either way, so the wait outcome
        // itself carries no information.
        let _ = event.wait(Timeout::Val(WAIT_POLL_INTERVAL));
        self.lock()
    }
}
