//! Event flags
//!
//! An event holds 32 independently settable bits. One thread at a time may
//! block until any bit of its wait mask is set. The wait is resolved by
//! exactly one of `set`, `delete` or the timeout, whichever takes the
//! critical section first; the others then find the waiter slot empty.
//!
//! Every operation takes an `Option<&OsEvent>` so a missing object is
//! reported as `InvalidArgument`, matching the rest of the kernel API. The
//! methods on [`OsEvent`] are thin wrappers for the common case.

use critical_section::CriticalSection;

use crate::critical::critical_section;
use crate::cs_cell::CsCell;
use crate::error::{OsError, OsResult};
use crate::kernel::{Kernel, KernelState};
use crate::port::Port;
use crate::time::TimerData;
use crate::types::{OsFlags, OsTaskState, OsTick, ThreadId, WakeStatus};

/// Mutable part of an event, guarded by the critical section
#[derive(Debug, Clone, Copy)]
struct EventInner {
    flags: OsFlags,
    /// Thread blocked on this event
    waiter: Option<ThreadId>,
    /// Bits the waiter is blocked on, meaningful only while `waiter` is set
    wait_mask: OsFlags,
}

impl EventInner {
    const fn new() -> Self {
        EventInner { flags: 0, waiter: None, wait_mask: 0 }
    }

    /// Empty the waiter slot, returning the thread that occupied it
    fn take_waiter(&mut self) -> Option<ThreadId> {
        self.wait_mask = 0;
        self.waiter.take()
    }
}

/// How an `os_event_wait` call left its critical section
enum WaitStart {
    /// Some of the requested bits were already set
    Satisfied(OsFlags),
    /// The caller suspended; holds its id and the thread to resume from
    Blocked(ThreadId, Option<ThreadId>),
}

/// Event flag group
pub struct OsEvent {
    inner: CsCell<EventInner>,
}

impl OsEvent {
    /// Create a new event with all flags cleared
    pub const fn new() -> Self {
        OsEvent { inner: CsCell::new(EventInner::new()) }
    }

    /// See [`os_event_create`]
    pub fn create<P: Port>(&self, kernel: &Kernel<P>) -> OsResult<()> {
        os_event_create(kernel, Some(self))
    }

    /// See [`os_event_delete`]
    pub fn delete<P: Port>(&self, kernel: &Kernel<P>) -> OsResult<()> {
        os_event_delete(kernel, Some(self))
    }

    /// See [`os_event_wait`]
    pub fn wait<P: Port>(&self, kernel: &Kernel<P>, mask: OsFlags, timeout: i32) -> OsResult<OsFlags> {
        os_event_wait(kernel, Some(self), mask, timeout)
    }

    /// See [`os_event_set`]
    pub fn set<P: Port>(&self, kernel: &Kernel<P>, mask: OsFlags) -> OsResult<()> {
        os_event_set(kernel, Some(self), mask)
    }

    /// See [`os_event_clear`]
    pub fn clear<P: Port>(&self, kernel: &Kernel<P>, mask: OsFlags) -> OsResult<()> {
        os_event_clear(kernel, Some(self), mask)
    }

    /// Current flag bits
    #[inline]
    pub fn flags(&self) -> OsFlags {
        self.inner.get().flags
    }

    /// Thread currently blocked on the event
    #[inline]
    pub fn waiter(&self) -> Option<ThreadId> {
        self.inner.get().waiter
    }
}

impl Default for OsEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize an event
///
/// Clears all flags. Callable from any context.
///
/// # Returns
/// * `Err(OsError::InvalidArgument)` - No event given
/// * `Err(OsError::QueueError)` - A thread is still blocked on the event
pub fn os_event_create<P: Port>(_kernel: &Kernel<P>, event: Option<&OsEvent>) -> OsResult<()> {
    let event = event.ok_or(OsError::InvalidArgument)?;

    critical_section(|cs| {
        let mut ev = event.inner.borrow(cs);
        if ev.waiter.is_some() {
            return Err(OsError::QueueError);
        }
        *ev = EventInner::new();
        Ok(())
    })
}

/// Delete an event
///
/// Wakes the blocked thread, if any, with `Deleted`. The flags and the
/// event's storage are left as they are.
///
/// # Returns
/// * `Err(OsError::InvalidArgument)` - No event given
/// * `Err(OsError::QueueError)` - Ready queue is inconsistent; reported
///   to the port as a fault first
pub fn os_event_delete<P: Port>(kernel: &Kernel<P>, event: Option<&OsEvent>) -> OsResult<()> {
    let event = event.ok_or(OsError::InvalidArgument)?;

    let from = critical_section(|cs| {
        let mut ev = event.inner.borrow(cs);
        let Some(id) = ev.take_waiter() else {
            return Ok(None);
        };

        let mut st = kernel.state().borrow(cs);
        st.make_ready(id, WakeStatus::Deleted).map_err(|err| kernel.fault(err))?;
        crate::debug!("event deleted, woke thread {}", id.index());

        Ok(kernel.sched_if_thread(&mut st))
    })?;

    kernel.resume(from);
    Ok(())
}

/// Wait for any bit of `mask`
///
/// # Arguments
/// * `mask` - Bits to wait for
/// * `timeout` - `timeout::NO_WAIT` (negative) to probe, `timeout::FOREVER`
///   (zero) to block without limit, or a number of ticks
///
/// # Returns
/// * `Ok(bits)` - The bits of `mask` that were set when the wait ended
/// * `Err(OsError::WouldBlock)` - Probe found no bit set
/// * `Err(OsError::Timeout)` - Timeout expired
/// * `Err(OsError::Deleted)` - Event deleted while waiting
/// * `Err(OsError::ContextError)` - Would block outside a thread
/// * `Err(OsError::QueueError)` - Another thread is already waiting
/// * `Err(OsError::TimerError)` - No timer available for the timeout
pub fn os_event_wait<P: Port>(
    kernel: &Kernel<P>,
    event: Option<&OsEvent>,
    mask: OsFlags,
    timeout: i32,
) -> OsResult<OsFlags> {
    let event = event.ok_or(OsError::InvalidArgument)?;

    let start = critical_section(|cs| {
        let mut ev = event.inner.borrow(cs);

        let bits = ev.flags & mask;
        if bits != 0 {
            return Ok(WaitStart::Satisfied(bits));
        }
        if timeout < 0 {
            return Err(OsError::WouldBlock);
        }

        let mut st = kernel.state().borrow(cs);
        let id = kernel.context_locked(&st).thread().ok_or(OsError::ContextError)?;
        if ev.waiter.is_some() {
            return Err(OsError::QueueError);
        }

        let handle = if timeout > 0 {
            let data = TimerData {
                owner: id,
                object: event as *const OsEvent as *const (),
            };
            Some(st.timers.register(kernel.os_time_get(), timeout as OsTick, event_timeout, data)?)
        } else {
            None
        };

        let tcb = st.tcb_mut(id);
        tcb.suspend(OsTaskState::Pend);
        tcb.pending_timeout = handle;
        ev.waiter = Some(id);
        ev.wait_mask = mask;
        crate::trace!("thread {} waits for {=u32:#x}", id.index(), mask);

        Ok(WaitStart::Blocked(id, kernel.sched_locked(&mut st, false)))
    })?;

    let (id, from) = match start {
        WaitStart::Satisfied(bits) => return Ok(bits),
        WaitStart::Blocked(id, from) => (id, from),
    };

    kernel.resume(from);

    critical_section(|cs| {
        let st = kernel.state().borrow(cs);
        let tcb = st.tcb(id);
        tcb.wake_status().into_result().map(|()| tcb.flags_rdy)
    })
}

/// Set bits and wake the waiter if any of its bits are now set
///
/// # Returns
/// * `Err(OsError::InvalidArgument)` - No event given or `mask` is zero
/// * `Err(OsError::QueueError)` - Ready queue is inconsistent; reported
///   to the port as a fault first
pub fn os_event_set<P: Port>(kernel: &Kernel<P>, event: Option<&OsEvent>, mask: OsFlags) -> OsResult<()> {
    let event = event.ok_or(OsError::InvalidArgument)?;
    if mask == 0 {
        return Err(OsError::InvalidArgument);
    }

    let from = critical_section(|cs| {
        let mut ev = event.inner.borrow(cs);
        ev.flags |= mask;

        let bits = ev.flags & ev.wait_mask;
        if bits == 0 {
            return Ok(None);
        }
        let Some(id) = ev.take_waiter() else {
            return Ok(None);
        };

        let mut st = kernel.state().borrow(cs);
        st.tcb_mut(id).flags_rdy = bits;
        st.make_ready(id, WakeStatus::Ok).map_err(|err| kernel.fault(err))?;
        crate::trace!("event set {=u32:#x}, woke thread {}", mask, id.index());

        Ok(kernel.sched_if_thread(&mut st))
    })?;

    kernel.resume(from);
    Ok(())
}

/// Clear bits
///
/// Never wakes a thread.
pub fn os_event_clear<P: Port>(_kernel: &Kernel<P>, event: Option<&OsEvent>, mask: OsFlags) -> OsResult<()> {
    let event = event.ok_or(OsError::InvalidArgument)?;
    event.inner.with(|ev| ev.flags &= !mask);
    Ok(())
}

/// Timeout of a blocked `os_event_wait`
fn event_timeout(cs: CriticalSection<'_>, st: &mut KernelState, data: TimerData) -> OsResult<()> {
    // SAFETY: `object` is the event borrowed by the owner's `os_event_wait`
    // call, which cannot return before this timer fires or is cancelled.
    let event = unsafe { &*(data.object as *const OsEvent) };
    let mut ev = event.inner.borrow(cs);
    if ev.waiter != Some(data.owner) {
        return Ok(());
    }
    ev.take_waiter();

    st.tcb_mut(data.owner).pending_timeout = None;
    crate::trace!("event wait of thread {} timed out", data.owner.index());
    st.make_ready(data.owner, WakeStatus::Timeout)
}
