//! Synchronization primitives
//!
//! Contains event flags.

#[cfg(feature = "event")]
pub mod event;
