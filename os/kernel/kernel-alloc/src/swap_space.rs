//! # Swap Space Allocator
//!
//! Occupancy bitmap over the fixed pool of page-sized swap slots. One bit per
//! slot, set while the slot holds an evicted page. The pool is sized at boot
//! and never grows.
//!
//! Lock order: this lock is a leaf. It is never held while taking the frame
//! table lock, and the swap path never holds the frame table lock while
//! taking this one.

use kernel_sync::SpinLock;
use kernel_vmem::SwapSlot;

struct Bitmap<const WORDS: usize> {
    words: [u64; WORDS],
    /// Next slot index to try.
    cursor: usize,
    occupied: usize,
}

impl<const WORDS: usize> Bitmap<WORDS> {
    #[inline]
    const fn locate(index: usize) -> (usize, u64) {
        (index / 64, 1 << (index % 64))
    }

    #[inline]
    const fn test(&self, index: usize) -> bool {
        let (word, mask) = Self::locate(index);
        self.words[word] & mask != 0
    }
}

/// Allocator for swap slots `0..capacity`.
pub struct SwapSpace<const WORDS: usize> {
    slots: usize,
    bitmap: SpinLock<Bitmap<WORDS>>,
}

impl<const WORDS: usize> SwapSpace<WORDS> {
    /// A pool of `slots` free slots.
    ///
    /// # Panics
    /// If the bitmap cannot hold `slots` bits, or slot indices would not fit
    /// the 32-bit slot encoding.
    #[must_use]
    pub const fn new(slots: usize) -> Self {
        assert!(slots <= WORDS * 64, "swap bitmap too small");
        assert!(slots <= u32::MAX as usize, "too many swap slots");
        Self {
            slots,
            bitmap: SpinLock::new(Bitmap {
                words: [0; WORDS],
                cursor: 0,
                occupied: 0,
            }),
        }
    }

    /// Mark every slot free.
    pub fn init(&self) {
        let mut bitmap = self.bitmap.lock();
        bitmap.words = [0; WORDS];
        bitmap.cursor = 0;
        bitmap.occupied = 0;
        log::debug!("swap space: {} slots free", self.slots);
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.slots
    }

    /// Number of slots currently holding a page.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.bitmap.lock().occupied
    }

    /// Whether `slot` is currently taken. Out-of-range slots are never taken.
    #[must_use]
    pub fn is_occupied(&self, slot: SwapSlot) -> bool {
        slot.index() < self.slots && self.bitmap.lock().test(slot.index())
    }

    /// Take a free slot, probing from where the previous search stopped.
    ///
    /// Returns `None` when the pool is exhausted; the caller decides what
    /// that means.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn acquire(&self) -> Option<SwapSlot> {
        let mut bitmap = self.bitmap.lock();
        if bitmap.occupied == self.slots {
            return None;
        }

        let start = bitmap.cursor;
        for step in 0..self.slots {
            let index = (start + step) % self.slots;
            if bitmap.test(index) {
                continue;
            }
            let (word, mask) = Bitmap::<WORDS>::locate(index);
            bitmap.words[word] |= mask;
            bitmap.occupied += 1;
            bitmap.cursor = (index + 1) % self.slots;
            // `new` bounds the slot count to u32.
            return Some(SwapSlot::new(index as u32));
        }
        None
    }

    /// Return `slot` to the pool.
    ///
    /// # Panics
    /// If `slot` is out of range or already free; either means the caller's
    /// bookkeeping is corrupt.
    #[track_caller]
    pub fn release(&self, slot: SwapSlot) {
        let index = slot.index();
        assert!(
            index < self.slots,
            "swap {slot} out of range (0..{})",
            self.slots
        );

        let mut bitmap = self.bitmap.lock();
        assert!(bitmap.test(index), "swap {slot} released while free");
        let (word, mask) = Bitmap::<WORDS>::locate(index);
        bitmap.words[word] &= !mask;
        bitmap.occupied -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_rotates_through_the_pool() {
        let swap = SwapSpace::<1>::new(4);
        let a = swap.acquire().unwrap();
        let b = swap.acquire().unwrap();
        assert_eq!((a.index(), b.index()), (0, 1));

        swap.release(a);
        // The cursor sits past `b`, so the freed slot 0 is found last.
        assert_eq!(swap.acquire().map(SwapSlot::index), Some(2));
        assert_eq!(swap.acquire().map(SwapSlot::index), Some(3));
        assert_eq!(swap.acquire().map(SwapSlot::index), Some(0));
        assert_eq!(swap.occupied(), 4);
    }

    #[test]
    fn exhaustion_is_not_fatal() {
        let swap = SwapSpace::<1>::new(2);
        assert!(swap.acquire().is_some());
        assert!(swap.acquire().is_some());
        assert!(swap.acquire().is_none());
        assert_eq!(swap.occupied(), swap.capacity());
    }

    #[test]
    fn slots_span_multiple_words() {
        let swap = SwapSpace::<2>::new(100);
        let taken: Vec<_> = core::iter::from_fn(|| swap.acquire()).collect();
        assert_eq!(taken.len(), 100);
        assert!(swap.is_occupied(SwapSlot::new(99)));
        assert!(!swap.is_occupied(SwapSlot::new(100)));

        swap.release(SwapSlot::new(70));
        assert!(!swap.is_occupied(SwapSlot::new(70)));
        assert_eq!(swap.acquire(), Some(SwapSlot::new(70)));
    }

    #[test]
    fn init_frees_everything() {
        let swap = SwapSpace::<1>::new(8);
        let _ = swap.acquire();
        let _ = swap.acquire();
        swap.init();
        assert_eq!(swap.occupied(), 0);
        assert_eq!(swap.acquire(), Some(SwapSlot::new(0)));
    }

    #[test]
    #[should_panic(expected = "released while free")]
    fn double_release_is_fatal() {
        let swap = SwapSpace::<1>::new(8);
        let slot = swap.acquire().unwrap();
        swap.release(slot);
        swap.release(slot);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn releasing_an_unknown_slot_is_fatal() {
        let swap = SwapSpace::<1>::new(8);
        swap.release(SwapSlot::new(8));
    }
}
