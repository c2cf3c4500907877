//! # Aging Clock
//!
//! Approximate LRU by shift-register aging. Once per tick every resident,
//! mapped frame shifts its history right by one and feeds the translation
//! entry's accessed bit into the top bit; the accessed bit is then cleared.
//!
//! ```text
//! tick:      t0        t1        t2        t3
//! accessed:  1         0         1         1
//! history:   1000..    0100..    1010..    1101..
//! ```
//!
//! A frame touched on every tick converges to all ones; an untouched one
//! decays to zero. Comparing two histories as unsigned integers ranks them by
//! recency, which is all the victim scan needs.

use crate::frame_table::FrameTable;
use kernel_vmem::{PageEntryBits, PageTableWalker};

/// Fold one accessed-bit sample into a history value.
#[inline]
#[must_use]
pub const fn age_history(history: u64, accessed: bool) -> u64 {
    let top = if accessed { 1 << 63 } else { 0 };
    (history >> 1) | top
}

impl<const N: usize> FrameTable<N> {
    /// Run one aging sweep over all resident, mapped frames.
    ///
    /// Kernel frames are aged too when they carry a translation reference;
    /// whether they may be evicted is the victim scan's decision, not this one.
    /// A frame whose entry no longer resolves counts as not accessed.
    ///
    /// Lock order: frame table, then the walker's own serialization.
    pub fn age<W: PageTableWalker>(&self, walker: &W) {
        let mut frames = self.lock();
        for frame in frames.iter_mut() {
            if !frame.state().is_resident() {
                continue;
            }
            let Some(t) = frame.translation() else {
                continue;
            };
            let accessed = walker
                .with_leaf(t.table, t.page, false, PageEntryBits::take_accessed)
                .unwrap_or(false);
            frame.set_history(age_history(frame.history(), accessed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessed_every_tick_saturates() {
        let h = (0..64).fold(0, |h, _| age_history(h, true));
        assert_eq!(h, u64::MAX);
    }

    #[test]
    fn never_accessed_decays_to_zero() {
        let h = (0..64).fold(u64::MAX, |h, _| age_history(h, false));
        assert_eq!(h, 0);
    }

    #[test]
    fn recent_access_outranks_older_access() {
        // accessed on the last tick only vs. accessed two ticks ago only
        let recent = age_history(age_history(0, false), true);
        let older = age_history(age_history(0, true), false);
        assert!(recent > older);
    }
}
