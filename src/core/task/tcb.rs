//! Thread Control Block (TCB) definition
//!
//! The TCB holds the scheduling state of one thread. TCBs live in the
//! kernel's fixed thread table and are referred to by [`ThreadId`].
//!
//! Ownership: while `Ready` the thread belongs to the ready queue, while
//! `Pend` to exactly one object's waiter slot, while `Delayed` to its timer.

use crate::time::TimerHandle;
use crate::types::{OsFlags, OsPrio, OsTaskState, OsTick, WakeStatus};

/// Thread Control Block
#[derive(Debug, Clone, Copy)]
pub struct OsTcb {
    /// Thread name for debugging
    pub(crate) name: &'static str,
    /// Current priority
    pub(crate) prio: OsPrio,
    /// Current thread state
    pub(crate) state: OsTaskState,
    /// Why the thread was last woken
    pub(crate) wake_status: WakeStatus,
    /// Timeout registered for the current suspension
    pub(crate) pending_timeout: Option<TimerHandle>,
    /// Event flags that made the thread ready
    pub(crate) flags_rdy: OsFlags,
    /// Time quanta for this thread
    pub(crate) time_quanta: OsTick,
    /// Remaining time quanta
    pub(crate) time_quanta_ctr: OsTick,
}

impl OsTcb {
    /// Create a free TCB
    pub const fn new() -> Self {
        OsTcb {
            name: "",
            prio: 0,
            state: OsTaskState::Dormant,
            wake_status: WakeStatus::Ok,
            pending_timeout: None,
            flags_rdy: 0,
            time_quanta: 0,
            time_quanta_ctr: 0,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn prio(&self) -> OsPrio {
        self.prio
    }

    #[inline]
    pub fn state(&self) -> OsTaskState {
        self.state
    }

    #[inline]
    pub fn wake_status(&self) -> WakeStatus {
        self.wake_status
    }

    #[inline]
    pub fn pending_timeout(&self) -> Option<TimerHandle> {
        self.pending_timeout
    }

    /// Check if the slot holds a live thread
    #[inline]
    pub fn is_live(&self) -> bool {
        self.state != OsTaskState::Dormant
    }

    /// Check if thread is blocked on an object or a delay
    #[inline]
    pub fn is_suspended(&self) -> bool {
        matches!(self.state, OsTaskState::Pend | OsTaskState::Delayed)
    }

    /// Mark the thread suspended for a new wait
    pub(crate) fn suspend(&mut self, state: OsTaskState) {
        debug_assert!(matches!(state, OsTaskState::Pend | OsTaskState::Delayed));
        self.state = state;
        self.wake_status = WakeStatus::Ok;
        self.flags_rdy = 0;
        self.pending_timeout = None;
    }
}

impl Default for OsTcb {
    fn default() -> Self {
        Self::new()
    }
}
