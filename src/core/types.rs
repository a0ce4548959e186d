//! Core type definitions
//!
//! These types provide strong typing for RTOS primitives.

use crate::config::CFG_THREADS_MAX;
use crate::error::{OsError, OsResult};

/// Thread priority (0 = highest priority)
pub type OsPrio = u8;

/// Tick counter type
pub type OsTick = u32;

/// Event flags type
pub type OsFlags = u32;

/// Nesting counter
pub type OsNestingCtr = u8;

/// Handle of a thread control block in the kernel's thread table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThreadId(u8);

impl ThreadId {
    /// Build a handle from a table index
    pub const fn new(index: usize) -> OsResult<Self> {
        if index < CFG_THREADS_MAX {
            Ok(ThreadId(index as u8))
        } else {
            Err(OsError::TaskInvalid)
        }
    }

    /// Index into the thread table
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OsTaskState {
    /// TCB slot is free
    Dormant = 0,
    /// Thread is on the ready queue
    Ready = 1,
    /// Thread owns the CPU
    Running = 2,
    /// Thread is blocked on a kernel object
    Pend = 3,
    /// Thread is delayed
    Delayed = 4,
}

/// Result code handed to a thread when it resumes from suspension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum WakeStatus {
    /// Woken by the object it was waiting on (or its delay elapsed)
    Ok = 0,
    /// Woken by the timeout
    Timeout = 1,
    /// Woken because the object was deleted
    Deleted = 2,
}

impl WakeStatus {
    /// Map the wake status onto the caller-visible result
    #[inline]
    pub fn into_result(self) -> OsResult<()> {
        match self {
            WakeStatus::Ok => Ok(()),
            WakeStatus::Timeout => Err(OsError::Timeout),
            WakeStatus::Deleted => Err(OsError::Deleted),
        }
    }
}

/// Event wait options
pub mod timeout {
    /// Return `WouldBlock` instead of blocking
    pub const NO_WAIT: i32 = -1;
    /// Block until woken, without a timeout
    pub const FOREVER: i32 = 0;
}
