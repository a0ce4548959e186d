//! Time management module
//!
//! Provides the one-shot timer list, the tick handler, thread delays and the
//! tick counter.
//!
//! Every timer carries a callback that runs from the tick interrupt with the
//! critical section held. Callbacks may make threads ready but never
//! schedule; the switch happens when the tick interrupt exits.

use critical_section::CriticalSection;

use crate::config::{CFG_SCHED_ROUND_ROBIN_EN, CFG_TICK_RATE_HZ, CFG_TIMERS_MAX};
use crate::critical::critical_section;
use crate::error::{OsError, OsResult};
use crate::kernel::{Kernel, KernelState};
use crate::port::Port;
use crate::types::{OsTaskState, OsTick, ThreadId, WakeStatus};

/// Timer callback, run from the tick interrupt with the critical section held
pub type TimerCallback = fn(CriticalSection<'_>, &mut KernelState, TimerData) -> OsResult<()>;

/// Context handed back to a timer callback
#[derive(Debug, Clone, Copy)]
pub struct TimerData {
    /// Thread whose suspension registered the timer
    pub owner: ThreadId,
    /// Object the owner is blocked on, or null
    pub object: *const (),
}

// SAFETY: `object` is only dereferenced by the callback that registered it,
// under the critical section, while the owner is blocked on that object.
unsafe impl Send for TimerData {}

/// Handle of a registered timer
///
/// Carries a sequence number so a handle outliving its timer (fired or
/// cancelled) can never cancel a later timer that reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerHandle {
    slot: u8,
    seq: u16,
}

#[derive(Clone, Copy)]
struct Timer {
    used: bool,
    seq: u16,
    expires: OsTick,
    callback: TimerCallback,
    data: TimerData,
    next: Option<u8>,
    prev: Option<u8>,
}

fn unused_timer(_: CriticalSection<'_>, _: &mut KernelState, _: TimerData) -> OsResult<()> {
    Ok(())
}

impl Timer {
    const EMPTY: Timer = Timer {
        used: false,
        seq: 0,
        expires: 0,
        callback: unused_timer,
        data: TimerData {
            owner: match ThreadId::new(0) {
                Ok(id) => id,
                Err(_) => panic!(),
            },
            object: core::ptr::null(),
        },
        next: None,
        prev: None,
    };
}

/// Pending one-shot timers, sorted by expiry
///
/// Timers with the same expiry fire in registration order.
#[derive(Clone, Copy)]
pub struct TimerList {
    slots: [Timer; CFG_TIMERS_MAX],
    head: Option<u8>,
    seq: u16,
    len: usize,
}

impl TimerList {
    pub const fn new() -> Self {
        TimerList {
            slots: [Timer::EMPTY; CFG_TIMERS_MAX],
            head: None,
            seq: 0,
            len: 0,
        }
    }

    /// Register `callback` to fire `ticks` ticks after `now`
    ///
    /// `ticks` must be in `1..=i32::MAX`; a full table or an out-of-range
    /// delay fails with `TimerError`.
    pub fn register(
        &mut self,
        now: OsTick,
        ticks: OsTick,
        callback: TimerCallback,
        data: TimerData,
    ) -> OsResult<TimerHandle> {
        if ticks == 0 || ticks > i32::MAX as OsTick {
            return Err(OsError::TimerError);
        }
        let slot = self
            .slots
            .iter()
            .position(|t| !t.used)
            .ok_or(OsError::TimerError)? as u8;

        // Walk past every timer due no later than this one
        let mut prev = None;
        let mut cur = self.head;
        while let Some(c) = cur {
            let t = &self.slots[c as usize];
            if t.expires.wrapping_sub(now) > ticks {
                break;
            }
            prev = cur;
            cur = t.next;
        }

        self.seq = self.seq.wrapping_add(1);
        self.slots[slot as usize] = Timer {
            used: true,
            seq: self.seq,
            expires: now.wrapping_add(ticks),
            callback,
            data,
            next: cur,
            prev,
        };
        match prev {
            Some(p) => self.slots[p as usize].next = Some(slot),
            None => self.head = Some(slot),
        }
        if let Some(c) = cur {
            self.slots[c as usize].prev = Some(slot);
        }
        self.len += 1;

        Ok(TimerHandle { slot, seq: self.seq })
    }

    /// Cancel a pending timer
    ///
    /// Fails with `TimerError` if the timer already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> OsResult<()> {
        match self.slots.get(handle.slot as usize) {
            Some(t) if t.used && t.seq == handle.seq => {
                self.unlink(handle.slot);
                Ok(())
            }
            _ => Err(OsError::TimerError),
        }
    }

    /// Remove the earliest timer if it is due at `now`
    pub fn pop_expired(&mut self, now: OsTick) -> Option<(TimerCallback, TimerData)> {
        let head = self.head?;
        let t = self.slots[head as usize];
        if (now.wrapping_sub(t.expires) as i32) < 0 {
            return None;
        }
        self.unlink(head);
        Some((t.callback, t.data))
    }

    /// Number of pending timers
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn unlink(&mut self, slot: u8) {
        let Timer { next, prev, .. } = self.slots[slot as usize];
        match prev {
            Some(p) => self.slots[p as usize].next = next,
            None => self.head = next,
        }
        if let Some(n) = next {
            self.slots[n as usize].prev = prev;
        }
        self.slots[slot as usize].used = false;
        self.slots[slot as usize].next = None;
        self.slots[slot as usize].prev = None;
        self.len -= 1;
    }
}

impl Default for TimerList {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest value the 24-bit SysTick reload register holds
const SYSTICK_RELOAD_MAX: u32 = 0x00FF_FFFF;

/// Timer reload value for a tick every `1 / CFG_TICK_RATE_HZ` seconds
///
/// Fails with `InvalidArgument` when the clock is too slow for the tick
/// rate or the reload exceeds 24 bits.
pub fn tick_reload(clock_hz: u32) -> OsResult<u32> {
    match (clock_hz / CFG_TICK_RATE_HZ).checked_sub(1) {
        Some(reload) if reload > 0 && reload <= SYSTICK_RELOAD_MAX => Ok(reload),
        _ => Err(OsError::InvalidArgument),
    }
}

/// Fires when a delayed thread's delay has elapsed
fn delay_expired(_cs: CriticalSection<'_>, st: &mut KernelState, data: TimerData) -> OsResult<()> {
    let tcb = st.tcb_mut(data.owner);
    if tcb.state != OsTaskState::Delayed {
        return Ok(());
    }
    tcb.pending_timeout = None;
    st.make_ready(data.owner, WakeStatus::Ok)
}

impl<P: Port> Kernel<P> {
    /// Get current tick count
    #[inline]
    pub fn os_time_get(&self) -> OsTick {
        self.flags().tick_get()
    }

    /// Time delay in ticks
    ///
    /// Suspends the calling thread for `ticks` system ticks. A zero delay
    /// returns immediately.
    ///
    /// # Returns
    /// * `Ok(())` - Delay completed
    /// * `Err(OsError::ContextError)` - Not called from a thread
    /// * `Err(OsError::TimerError)` - No timer available or delay out of range
    pub fn os_time_dly(&self, ticks: OsTick) -> OsResult<()> {
        if ticks == 0 {
            return Ok(());
        }

        let from = critical_section(|cs| {
            let mut st = self.state().borrow(cs);
            let id = self.context_locked(&st).thread().ok_or(OsError::ContextError)?;

            let data = TimerData { owner: id, object: core::ptr::null() };
            let handle = st.timers.register(self.os_time_get(), ticks, delay_expired, data)?;

            let tcb = st.tcb_mut(id);
            tcb.suspend(OsTaskState::Delayed);
            tcb.pending_timeout = Some(handle);
            crate::trace!("thread {} delayed {} ticks", id.index(), ticks);

            Ok(self.sched_locked(&mut st, false))
        })?;

        self.resume(from);
        Ok(())
    }

    /// Tick handler
    ///
    /// Call once per system tick from the tick interrupt. Fires every due
    /// timer, charges the running thread's time slice, then leaves the
    /// interrupt, which may switch threads.
    pub fn os_tick_handler(&self) {
        if !self.flags().is_running() {
            return;
        }

        self.os_int_enter();

        let rotate = critical_section(|cs| {
            let mut st = self.state().borrow(cs);
            let now = self.flags().tick_increment();

            while let Some((callback, data)) = st.timers.pop_expired(now) {
                match callback(cs, &mut *st, data) {
                    Err(err) if err.is_fatal() => {
                        self.fault(err);
                    }
                    Err(err) => crate::warn!("timer callback failed: {}", err.code()),
                    Ok(()) => {}
                }
            }

            CFG_SCHED_ROUND_ROBIN_EN && st.charge_time_slice()
        });

        self.int_exit(rotate);
    }

    /// Number of timers currently registered
    pub fn os_timer_pending(&self) -> usize {
        self.state().with(|st| st.timers.len())
    }
}
