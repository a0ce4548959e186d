//! Compile-time configuration
//!
//! These constants size the fixed kernel tables and control scheduling.

/// Maximum number of priority levels
pub const CFG_PRIO_MAX: usize = 64;

/// Number of thread control blocks in the kernel's thread table
pub const CFG_THREADS_MAX: usize = 16;

/// Number of one-shot timers that can be pending at once
pub const CFG_TIMERS_MAX: usize = 16;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Default time quanta for round-robin scheduling
pub const CFG_TIME_QUANTA_DEFAULT: u32 = 10;

/// Enable round-robin scheduling for same-priority threads
pub const CFG_SCHED_ROUND_ROBIN_EN: bool = true;

/// Idle thread priority
pub const CFG_PRIO_IDLE: u8 = (CFG_PRIO_MAX - 1) as u8;

const _: () = assert!(CFG_THREADS_MAX <= u8::MAX as usize);
const _: () = assert!(CFG_TIMERS_MAX <= u8::MAX as usize);
