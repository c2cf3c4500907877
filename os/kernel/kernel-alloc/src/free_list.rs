use crate::phys_mapper::PhysMapper;
use kernel_memory_addresses::PhysicalAddress;

/// Header stored at the start of every page on the free list.
///
/// ```text
/// +----------------+----------------------------------+
/// | FreePage       |   rest of the page (zeroed)      |
/// +----------------+----------------------------------+
/// ^ frame base
/// ```
///
/// The list needs no memory of its own: the link lives inside the free page.
#[repr(C)]
struct FreePage {
    next: Option<PhysicalAddress>,
}

/// LIFO list of free frames, linked through the frames themselves.
///
/// # Invariants
/// - Every listed frame is `Empty` in the frame table and unmapped.
/// - `len` equals the number of nodes reachable from `head`.
pub(crate) struct FreeList {
    head: Option<PhysicalAddress>,
    len: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Link the frame at `pa` in as the new head.
    ///
    /// # Safety
    /// `pa` must be a page-aligned frame reachable through `mapper`, owned by
    /// nobody and not already on the list.
    pub(crate) unsafe fn push<M: PhysMapper>(&mut self, mapper: &M, pa: PhysicalAddress) {
        let node = mapper.phys_to_ptr::<FreePage>(pa);
        // SAFETY: Upheld by the caller. `write` does not read the old bytes.
        unsafe { node.write(FreePage { next: self.head }) };
        self.head = Some(pa);
        self.len += 1;
    }

    /// Unlink and return the head frame.
    ///
    /// # Safety
    /// Every listed frame must still be reachable through `mapper` and
    /// untouched since it was pushed.
    pub(crate) unsafe fn pop<M: PhysMapper>(&mut self, mapper: &M) -> Option<PhysicalAddress> {
        let pa = self.head?;
        // SAFETY: `pa` was written by `push`.
        let node = unsafe { mapper.phys_to_ptr::<FreePage>(pa).read() };
        self.head = node.next;
        self.len -= 1;
        Some(pa)
    }
}
