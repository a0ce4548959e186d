//! Critical section handling
//!
//! Every mutable kernel structure is guarded by the single process-wide
//! critical section provided by the `critical-section` crate. On target the
//! implementation disables interrupts (see [`crate::port`]); host test builds
//! use the crate's `std` implementation.

pub use critical_section::CriticalSection;

use crate::types::ThreadId;

/// Execute a closure with interrupts disabled
///
/// The closure receives the critical section token, which can be used to
/// access [`CsCell`](crate::cs_cell::CsCell) protected data. Interrupt state
/// is restored on every exit path, including early returns and unwinding.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    ::critical_section::with(f)
}

/// Execution context of the caller of a kernel entry point
///
/// Kernel operations query this explicitly rather than inspecting CPU
/// registers, so the decision logic is the same on target and on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Context {
    /// The kernel has not dispatched any thread yet
    Init,
    /// Running on behalf of a kernel thread
    Thread(ThreadId),
    /// Running inside an interrupt handler (possibly nested)
    Isr,
}

impl Context {
    /// The thread running in this context, if any
    #[inline]
    pub fn thread(self) -> Option<ThreadId> {
        match self {
            Context::Thread(id) => Some(id),
            _ => None,
        }
    }
}
