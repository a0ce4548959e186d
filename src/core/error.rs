//! Error types for the kernel
//!
//! Uses Rust's Result pattern instead of C-style status bytes. Codes are
//! stable and grouped by subsystem so they can be logged or reported as a
//! plain integer.

/// RTOS error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum OsError {
    // ============ Parameter errors ============
    /// Missing object reference or invalid argument value
    InvalidArgument = 1001,

    // ============ Context errors ============
    /// Blocking attempted outside thread context
    ContextError = 2001,

    // ============ Pend errors ============
    /// Non-blocking wait found nothing to return
    WouldBlock = 3001,
    /// The wait timed out before being satisfied
    Timeout = 3002,
    /// The object was deleted while the caller was blocked on it
    Deleted = 3003,

    // ============ Queue errors ============
    /// A thread could not be placed on a queue or wait slot
    QueueError = 4001,

    // ============ Timer errors ============
    /// Timer registration or cancellation failed
    TimerError = 5001,

    // ============ OS state errors ============
    /// OS is already running
    OsRunning = 6002,
    /// OS not initialized
    OsNotInit = 6003,

    // ============ Thread errors ============
    /// Invalid priority
    PrioInvalid = 7001,
    /// No more TCBs available
    TaskNoMoreTcb = 7002,
    /// Thread id does not name a live thread
    TaskInvalid = 7003,
}

/// Result type alias for RTOS operations
pub type OsResult<T> = Result<T, OsError>;

impl OsError {
    /// Numeric status code
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Mid-operation failures that leave kernel objects inconsistent
    #[inline]
    pub fn is_fatal(self) -> bool {
        matches!(self, OsError::QueueError)
    }
}
