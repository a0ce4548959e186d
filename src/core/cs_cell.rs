//! Critical section protected cell
//!
//! Wrapper for data that may only be touched with the critical section held.

use core::cell::{RefCell, RefMut};

use critical_section::{CriticalSection, Mutex};

/// A cell that can only be accessed within a critical section.
pub struct CsCell<T>(Mutex<RefCell<T>>);

impl<T> CsCell<T> {
    /// Create a new CsCell
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self(Mutex::new(RefCell::new(value)))
    }

    /// Borrow the inner value for the lifetime of the critical section
    ///
    /// Panics if the value is already borrowed, which would mean two kernel
    /// paths are mutating the same structure at once.
    #[inline(always)]
    pub fn borrow<'cs>(&'cs self, cs: CriticalSection<'cs>) -> RefMut<'cs, T> {
        self.0.borrow_ref_mut(cs)
    }

    /// Run `f` on the inner value inside a fresh critical section
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| f(&mut self.borrow(cs)))
    }
}

impl<T: Copy> CsCell<T> {
    /// Copy the inner value out
    #[inline]
    pub fn get(&self) -> T {
        self.with(|value| *value)
    }
}
