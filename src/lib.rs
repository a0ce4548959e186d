//! Kestrel RTOS core
//!
//! A small real-time kernel providing:
//! - Priority-based preemptive scheduling with round-robin for equal priorities
//! - Tick-based one-shot timers, delays and wait timeouts
//! - Interrupt-safe event flags with a single bounded wakeup path
//! - A port layer for context switching (ARM Cortex-M4 included)
//!
//! All kernel state lives in a caller-provided [`Kernel`] value; nothing is
//! heap-allocated by the kernel.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod sync;
pub mod port;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::config::*;
pub use crate::core::critical;
pub use crate::core::critical::Context;
pub use crate::core::cs_cell;
pub use crate::core::error;
pub use crate::core::error::{OsError, OsResult};
pub use crate::core::kernel;
pub use crate::core::kernel::Kernel;
pub use crate::core::prio;
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::task;
pub use crate::core::task::OsTcb;
pub use crate::core::sched;
pub use crate::core::time;
pub use crate::port::Port;

#[cfg(feature = "event")]
pub use sync::event;
#[cfg(feature = "event")]
pub use sync::event::OsEvent;
