//! Port layer - CPU-specific implementations
//!
//! The kernel never touches CPU registers itself. It decides which thread
//! should run and asks its [`Port`] to make the switch. The included
//! Cortex-M4 port switches with the PendSV exception; host test harnesses
//! can implement the same trait on top of OS threads.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

#[cfg(target_arch = "arm")]
pub use cortex_m4::CortexM4;

use crate::error::{OsError, OsResult};
use crate::types::ThreadId;

/// Context switching backend of a [`Kernel`](crate::Kernel)
///
/// `init_context`, `start_first` and `request_switch` are called with the
/// critical section held. `wait_dispatch` is called with it released.
pub trait Port: Sync {
    /// Everything needed to start a new thread
    type Entry;

    /// Prepare the execution context of a new thread
    ///
    /// The thread must not run until the kernel dispatches it.
    fn init_context(&self, thread: ThreadId, entry: Self::Entry) -> OsResult<()>;

    /// Dispatch the first thread
    ///
    /// Called once by [`os_start`](crate::Kernel::os_start), after the
    /// kernel has marked `thread` running.
    fn start_first(&self, thread: ThreadId);

    /// Request a switch from `from` to `to`
    ///
    /// `from` is `None` when the outgoing thread has exited and its context
    /// must not be saved. Requests made before the switch is taken collapse
    /// into one: the earliest `from` is saved, the latest `to` is restored.
    fn request_switch(&self, from: Option<ThreadId>, to: ThreadId);

    /// Block the caller until `thread` is dispatched again
    ///
    /// Ports that switch in hardware return immediately: by the time the
    /// outgoing thread executes again it has already been dispatched.
    fn wait_dispatch(&self, thread: ThreadId);

    /// Unrecoverable kernel inconsistency
    ///
    /// The default implementation panics.
    fn kernel_fault(&self, err: OsError) {
        panic!("kernel fault: {:?}", err);
    }
}
