//! Thread management module
//!
//! Provides thread creation, exit and inspection.

mod tcb;

pub use tcb::OsTcb;

use crate::config::{CFG_PRIO_IDLE, CFG_TIME_QUANTA_DEFAULT};
use crate::critical::critical_section;
use crate::error::{OsError, OsResult};
use crate::kernel::{Kernel, KernelState};
use crate::port::Port;
use crate::types::{OsPrio, OsTaskState, ThreadId};

impl KernelState {
    /// First free slot of the thread table
    fn free_slot(&self) -> OsResult<ThreadId> {
        let index = self
            .threads
            .iter()
            .position(|tcb| !tcb.is_live())
            .ok_or(OsError::TaskNoMoreTcb)?;
        ThreadId::new(index)
    }
}

impl<P: Port> Kernel<P> {
    /// Create a new thread
    ///
    /// The port prepares the thread's execution context from `entry`. The
    /// thread is made ready immediately; if it outranks a running caller it
    /// runs before this function returns.
    ///
    /// # Arguments
    /// * `name` - Thread name for debugging
    /// * `prio` - Thread priority (0 = highest, the idle priority is reserved)
    /// * `entry` - Port-specific entry point
    ///
    /// # Returns
    /// * `Ok(id)` - Id of the new thread
    /// * `Err(OsError::OsNotInit)` - Kernel not initialized
    /// * `Err(OsError::PrioInvalid)` - Priority out of range or reserved
    /// * `Err(OsError::TaskNoMoreTcb)` - Thread table is full
    pub fn os_thread_create(
        &self,
        name: &'static str,
        prio: OsPrio,
        entry: P::Entry,
    ) -> OsResult<ThreadId> {
        if !self.flags().is_initialized() {
            return Err(OsError::OsNotInit);
        }
        if prio >= CFG_PRIO_IDLE {
            return Err(OsError::PrioInvalid);
        }
        self.thread_create_inner(name, prio, entry)
    }

    pub(crate) fn thread_create_inner(
        &self,
        name: &'static str,
        prio: OsPrio,
        entry: P::Entry,
    ) -> OsResult<ThreadId> {
        let (id, from) = critical_section(|cs| {
            let mut st = self.state().borrow(cs);
            let id = st.free_slot()?;
            self.port().init_context(id, entry)?;

            *st.tcb_mut(id) = OsTcb {
                name,
                prio,
                state: OsTaskState::Ready,
                time_quanta: CFG_TIME_QUANTA_DEFAULT,
                time_quanta_ctr: CFG_TIME_QUANTA_DEFAULT,
                ..OsTcb::new()
            };
            st.ready.enqueue(id, prio)?;
            crate::debug!("thread {} created at prio {}", id.index(), prio);

            Ok((id, self.sched_if_thread(&mut st)))
        })?;

        self.resume(from);
        Ok(id)
    }

    /// Terminate the calling thread
    ///
    /// Frees the caller's slot and dispatches the next ready thread. On
    /// hardware the switch happens as soon as the critical section is
    /// released, so code after this call never runs.
    ///
    /// # Returns
    /// * `Err(OsError::ContextError)` - Not called from a thread
    /// * `Err(OsError::QueueError)` - No other thread is ready to run
    pub fn os_thread_exit(&self) -> OsResult<()> {
        critical_section(|cs| {
            let mut st = self.state().borrow(cs);
            let id = self.context_locked(&st).thread().ok_or(OsError::ContextError)?;
            let next = st.ready.dequeue().ok_or(OsError::QueueError)?;

            *st.tcb_mut(id) = OsTcb::new();
            let tcb = st.tcb_mut(next);
            tcb.state = OsTaskState::Running;
            tcb.time_quanta_ctr = tcb.time_quanta;
            st.current = Some(next);

            crate::debug!("thread {} exited, switch to {}", id.index(), next.index());
            self.port().request_switch(None, next);
            Ok(())
        })
    }

    /// Snapshot of a live thread's control block
    ///
    /// # Returns
    /// * `Err(OsError::TaskInvalid)` - The slot holds no thread
    pub fn os_tcb(&self, id: ThreadId) -> OsResult<OsTcb> {
        let tcb = self.state().with(|st| *st.tcb(id));
        if tcb.is_live() {
            Ok(tcb)
        } else {
            Err(OsError::TaskInvalid)
        }
    }

    /// Number of live threads, the idle thread included
    pub fn os_thread_count(&self) -> usize {
        self.state().with(|st| st.threads.iter().filter(|tcb| tcb.is_live()).count())
    }
}
