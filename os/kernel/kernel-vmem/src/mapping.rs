use core::fmt;
use kernel_memory_addresses::PhysicalAddress;

/// Index of one page-sized slot in the swap area.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SwapSlot(u32);

impl SwapSlot {
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwapSlot({})", self.0)
    }
}

impl fmt::Display for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// What a leaf translation entry currently says about its page.
///
/// This is the typed view over the dual-use address field of
/// [`PageEntryBits`](crate::PageEntryBits).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PageMapping {
    /// Neither resident nor swapped: any access is a genuine fault.
    Absent,
    /// Backed by the 4 KiB frame at this physical address.
    Resident(PhysicalAddress),
    /// Content lives in this swap slot; an access faults and must swap in.
    OnDisk(SwapSlot),
}

impl PageMapping {
    #[inline]
    #[must_use]
    pub const fn is_resident(self) -> bool {
        matches!(self, Self::Resident(_))
    }

    #[inline]
    #[must_use]
    pub const fn swap_slot(self) -> Option<SwapSlot> {
        match self {
            Self::OnDisk(slot) => Some(slot),
            _ => None,
        }
    }
}
