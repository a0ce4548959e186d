//! Priority bitmap for O(1) highest-ready lookup
//!
//! Bit `p % 32` of word `p / 32` is set while at least one thread of
//! priority `p` is ready. The highest priority is the lowest set bit, found
//! with a trailing-zero count per word.

use crate::config::CFG_PRIO_MAX;
use crate::types::OsPrio;

/// Number of words needed for the priority bitmap
const PRIO_TBL_SIZE: usize = (CFG_PRIO_MAX + 31) / 32;

/// Priority bitmap table
#[derive(Debug, Clone, Copy)]
pub struct PrioTable {
    bitmap: [u32; PRIO_TBL_SIZE],
}

impl PrioTable {
    pub const fn new() -> Self {
        PrioTable {
            bitmap: [0; PRIO_TBL_SIZE],
        }
    }

    #[inline(always)]
    fn locate(prio: OsPrio) -> (usize, u32) {
        debug_assert!((prio as usize) < CFG_PRIO_MAX);
        (prio as usize / 32, 1 << (prio % 32))
    }

    /// Mark a priority as having ready threads
    #[inline]
    pub fn insert(&mut self, prio: OsPrio) {
        let (word, bit) = Self::locate(prio);
        self.bitmap[word] |= bit;
    }

    /// Mark a priority as having no ready threads
    #[inline]
    pub fn remove(&mut self, prio: OsPrio) {
        let (word, bit) = Self::locate(prio);
        self.bitmap[word] &= !bit;
    }

    /// Highest (numerically lowest) priority marked ready
    #[inline]
    pub fn highest(&self) -> Option<OsPrio> {
        self.bitmap
            .iter()
            .enumerate()
            .find(|(_, &word)| word != 0)
            .map(|(i, &word)| (i * 32) as OsPrio + word.trailing_zeros() as OsPrio)
    }

    /// Check if a specific priority has any ready threads
    #[inline]
    pub fn is_set(&self, prio: OsPrio) -> bool {
        let (word, bit) = Self::locate(prio);
        self.bitmap[word] & bit != 0
    }

    /// Check if the priority table is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bitmap.iter().all(|&w| w == 0)
    }
}

impl Default for PrioTable {
    fn default() -> Self {
        Self::new()
    }
}
