use crate::mapping::{PageMapping, SwapSlot};
use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// A single 64-bit x86-64 leaf page table entry (PTE) in its raw bitfield form.
///
/// The hardware-defined bits keep their architectural meaning. Bit 9, one of
/// the OS-available bits, is used as the **on-disk** marker, and the 40-bit
/// address field doubles as a swap slot index while the page is not present.
///
/// Prefer [`mapping`](Self::mapping) / [`set_mapping`](Self::set_mapping)
/// over poking the address field directly; they keep `present`, `on_disk`
/// and the field contents consistent.
#[bitfield(u64)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    ///
    /// Clear implies a not-present entry; any access faults.
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5).
    ///
    /// Set by the CPU on any access through this entry. The aging clock reads
    /// and clears it once per sweep.
    pub accessed: bool,

    /// Dirty (D, bit 6).
    pub dirty: bool,

    /// PAT at L1 (bit 7). Always clear for the entries this crate writes.
    pub pat: bool,

    /// Global (G, bit 8).
    pub global_translation: bool,

    /// On disk (OS-available bit 9).
    ///
    /// Only meaningful while `present` is clear: the address field then holds
    /// a swap slot index instead of a frame number.
    pub on_disk: bool,

    /// Remaining OS-available bits (10..=11).
    #[bits(2)]
    pub os_available_low: u8,

    /// Bits 12..=51: physical frame number when present, swap slot when on disk.
    #[bits(40)]
    frame_bits: u64,

    /// OS-available (bits 52..=58).
    #[bits(7)]
    pub os_available_high: u8,

    /// Protection Key (PKU, bits 59..=62) if supported; otherwise OS use.
    #[bits(4)]
    pub protection_key: u8,

    /// No-Execute (NX, bit 63).
    pub no_execute: bool,
}

impl PageEntryBits {
    /// Typed view of the dual-use address field.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn mapping(&self) -> PageMapping {
        if self.present() {
            PageMapping::Resident(PhysicalAddress::new(self.frame_bits() << 12))
        } else if self.on_disk() {
            PageMapping::OnDisk(SwapSlot::new(self.frame_bits() as u32))
        } else {
            PageMapping::Absent
        }
    }

    /// Rewrite the address field and the `present`/`on_disk` pair.
    ///
    /// Permission, cache and accessed/dirty bits are left untouched, so a page
    /// swapped out and back in keeps its protection.
    #[inline]
    pub fn set_mapping(&mut self, mapping: PageMapping) {
        match mapping {
            PageMapping::Absent => {
                self.set_present(false);
                self.set_on_disk(false);
                self.set_frame_bits(0);
            }
            PageMapping::Resident(pa) => {
                debug_assert!(pa.is_page_aligned(), "unaligned frame address {pa}");
                self.set_on_disk(false);
                self.set_frame_bits(pa.as_u64() >> 12);
                self.set_present(true);
            }
            PageMapping::OnDisk(slot) => {
                self.set_present(false);
                self.set_frame_bits(u64::from(slot.as_u32()));
                self.set_on_disk(true);
            }
        }
    }

    /// Read and clear the accessed bit in one step.
    #[inline]
    pub const fn take_accessed(&mut self) -> bool {
        let accessed = self.accessed();
        self.set_accessed(false);
        accessed
    }

    #[inline]
    #[must_use]
    pub const fn new_user_rw() -> Self {
        Self::new()
            .with_writable(true)
            .with_user_access(true)
            .with_no_execute(true)
    }

    #[inline]
    #[must_use]
    pub const fn new_kernel_rw() -> Self {
        Self::new().with_writable(true).with_no_execute(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_is_absent() {
        assert_eq!(PageEntryBits::new().mapping(), PageMapping::Absent);
    }

    #[test]
    fn resident_encoding_uses_frame_number() {
        let mut e = PageEntryBits::new_kernel_rw();
        e.set_mapping(PageMapping::Resident(PhysicalAddress::new(0x1234_5000)));
        assert!(e.present());
        assert!(!e.on_disk());
        assert_eq!(e.into_bits() & 0x000F_FFFF_FFFF_F000, 0x1234_5000);
    }

    #[test]
    fn on_disk_encoding_replaces_address() {
        let mut e = PageEntryBits::new_user_rw().with_accessed(true);
        e.set_mapping(PageMapping::Resident(PhysicalAddress::new(0x7000)));
        e.set_mapping(PageMapping::OnDisk(SwapSlot::new(9)));

        assert!(!e.present());
        assert!(e.on_disk());
        assert_eq!((e.into_bits() >> 12) & 0xFF_FFFF_FFFF, 9);
        assert_eq!(e.mapping(), PageMapping::OnDisk(SwapSlot::new(9)));
        assert!(e.user_access() && e.writable() && e.no_execute() && e.accessed());
    }

    #[test]
    fn swap_back_in_clears_on_disk() {
        let mut e = PageEntryBits::new_user_rw();
        e.set_mapping(PageMapping::OnDisk(SwapSlot::new(3)));
        e.set_mapping(PageMapping::Resident(PhysicalAddress::new(0x9000)));
        assert!(e.present());
        assert!(!e.on_disk());
        assert_eq!(e.mapping().swap_slot(), None);
    }

    #[test]
    fn take_accessed_clears() {
        let mut e = PageEntryBits::new().with_accessed(true);
        assert!(e.take_accessed());
        assert!(!e.take_accessed());
    }
}
