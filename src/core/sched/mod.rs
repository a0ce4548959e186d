//! Scheduler module
//!
//! Priority-based preemptive scheduler with round-robin for same priority.
//!
//! The running thread is kept off the ready queue. A scheduling decision
//! either keeps it running, or hands the CPU to the head of the highest
//! ready priority. A preempted thread goes back to the tail of its level.

mod rdy_list;

pub use rdy_list::ReadyQueue;

use crate::critical::critical_section;
use crate::error::{OsError, OsResult};
use crate::kernel::{Kernel, KernelState};
use crate::port::Port;
use crate::types::{OsTaskState, ThreadId};

impl KernelState {
    /// Pick the thread that should own the CPU next
    ///
    /// Returns `(from, to)` when a switch is needed. With `rotate`, an
    /// equal-priority ready thread also displaces the running one.
    ///
    /// Fails with `QueueError` when the running thread has suspended and no
    /// thread is ready to replace it.
    pub(crate) fn pick_next(&mut self, rotate: bool) -> OsResult<Option<(ThreadId, ThreadId)>> {
        let Some(cur) = self.current else {
            return Ok(None);
        };
        let tcb = *self.tcb(cur);

        if tcb.state == OsTaskState::Running {
            let Some(high) = self.ready.highest_prio() else {
                return Ok(None);
            };
            if high > tcb.prio || (high == tcb.prio && !rotate) {
                return Ok(None);
            }
            self.tcb_mut(cur).state = OsTaskState::Ready;
            self.ready.enqueue(cur, tcb.prio)?;
        }

        let next = self.ready.dequeue().ok_or(OsError::QueueError)?;
        let next_tcb = self.tcb_mut(next);
        next_tcb.state = OsTaskState::Running;
        next_tcb.time_quanta_ctr = next_tcb.time_quanta;
        self.current = Some(next);

        Ok((next != cur).then_some((cur, next)))
    }
}

impl<P: Port> Kernel<P> {
    /// Run a scheduling decision with the critical section held
    ///
    /// Requests the switch from the port and returns the thread that was
    /// switched away from. The caller must pass it to [`Kernel::resume`]
    /// once the critical section is released.
    pub(crate) fn sched_locked(&self, st: &mut KernelState, rotate: bool) -> Option<ThreadId> {
        match st.pick_next(rotate) {
            Ok(Some((from, to))) => {
                crate::trace!("switch {} -> {}", from.index(), to.index());
                self.port().request_switch(Some(from), to);
                Some(from)
            }
            Ok(None) => None,
            Err(err) => {
                self.fault(err);
                None
            }
        }
    }

    /// Schedule only when called from a running thread
    ///
    /// Interrupt handlers defer to [`Kernel::os_int_exit`].
    pub(crate) fn sched_if_thread(&self, st: &mut KernelState) -> Option<ThreadId> {
        self.context_locked(st).thread()?;
        self.sched_locked(st, false)
    }

    /// Main scheduling point
    ///
    /// Switches to the highest priority ready thread if it outranks the
    /// caller. Does nothing from an ISR or before the kernel starts.
    pub fn os_sched(&self) {
        self.sched_with(false);
    }

    /// Yield the CPU to ready threads of the same priority
    pub fn os_yield(&self) {
        self.sched_with(true);
    }

    fn sched_with(&self, rotate: bool) {
        if !self.flags().is_running() {
            return;
        }

        let from = critical_section(|cs| {
            let mut st = self.state().borrow(cs);
            self.context_locked(&st).thread()?;
            self.sched_locked(&mut st, rotate)
        });

        self.resume(from);
    }
}
