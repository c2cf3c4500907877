//! Software page tables.
//!
//! Leaf entries live in an ordered map keyed by `(table, page base)`. There is
//! no hardware behind them: an "access" is whatever calls [`SoftPageTables::touch`],
//! and invalidations are only counted.

use crate::mapping::PageMapping;
use crate::page_entry_bits::PageEntryBits;
use crate::walker::{PageTableWalker, TableId, TlbInvalidate};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_sync::SpinLock;

type Key = (TableId, u64);

/// Map-backed page tables implementing both collaborator traits.
pub struct SoftPageTables {
    entries: SpinLock<BTreeMap<Key, PageEntryBits>>,
    page_invalidations: AtomicUsize,
    full_flushes: AtomicUsize,
}

impl Default for SoftPageTables {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftPageTables {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: SpinLock::new(BTreeMap::new()),
            page_invalidations: AtomicUsize::new(0),
            full_flushes: AtomicUsize::new(0),
        }
    }

    #[inline]
    const fn key(table: TableId, va: VirtualAddress) -> Key {
        (table, va.page_base().as_u64())
    }

    /// Install a resident mapping `va → pa` with the given permission bits.
    pub fn map(&self, table: TableId, va: VirtualAddress, pa: PhysicalAddress, flags: PageEntryBits) {
        let mut entry = flags;
        entry.set_mapping(PageMapping::Resident(pa));
        self.entries.lock().insert(Self::key(table, va), entry);
    }

    /// Remove the leaf entry for `va`, returning what it held.
    pub fn unmap(&self, table: TableId, va: VirtualAddress) -> Option<PageEntryBits> {
        self.entries.lock().remove(&Self::key(table, va))
    }

    /// Snapshot of the leaf entry for `va`.
    #[must_use]
    pub fn entry(&self, table: TableId, va: VirtualAddress) -> Option<PageEntryBits> {
        self.entries.lock().get(&Self::key(table, va)).copied()
    }

    /// Simulate the MMU walking `va`: sets the accessed bit of a present entry.
    ///
    /// Returns `false` if the access would fault.
    pub fn touch(&self, table: TableId, va: VirtualAddress) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(&Self::key(table, va)) {
            Some(e) if e.present() => {
                e.set_accessed(true);
                true
            }
            _ => false,
        }
    }

    /// Every resident mapping as `(table, page, frame)`, in table and page order.
    #[must_use]
    pub fn resident_mappings(&self) -> Vec<(TableId, VirtualAddress, PhysicalAddress)> {
        self.entries
            .lock()
            .iter()
            .filter_map(|(&(table, page), entry)| match entry.mapping() {
                PageMapping::Resident(pa) => Some((table, VirtualAddress::new(page), pa)),
                _ => None,
            })
            .collect()
    }

    /// Number of leaf entries across all tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Single-page invalidations seen so far.
    #[must_use]
    pub fn page_invalidations(&self) -> usize {
        self.page_invalidations.load(Ordering::Relaxed)
    }

    /// Full flushes seen so far.
    #[must_use]
    pub fn full_flushes(&self) -> usize {
        self.full_flushes.load(Ordering::Relaxed)
    }
}

impl PageTableWalker for SoftPageTables {
    fn with_leaf<R>(
        &self,
        table: TableId,
        va: VirtualAddress,
        create: bool,
        f: impl FnOnce(&mut PageEntryBits) -> R,
    ) -> Option<R> {
        let mut entries = self.entries.lock();
        let key = Self::key(table, va);
        let entry = if create {
            entries.entry(key).or_insert_with(PageEntryBits::new)
        } else {
            entries.get_mut(&key)?
        };
        Some(f(entry))
    }
}

impl TlbInvalidate for SoftPageTables {
    fn invalidate(&self, va: Option<VirtualAddress>) {
        let counter = if va.is_some() {
            &self.page_invalidations
        } else {
            &self.full_flushes
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SwapSlot;

    const T: TableId = TableId::new(1);

    #[test]
    fn lookup_without_create_does_not_allocate() {
        let pt = SoftPageTables::new();
        assert!(pt.mapping(T, VirtualAddress::new(0x4000)).is_none());
        assert!(pt.is_empty());

        let created = pt.with_leaf(T, VirtualAddress::new(0x4000), true, |e| e.mapping());
        assert_eq!(created, Some(PageMapping::Absent));
        assert_eq!(pt.len(), 1);
    }

    #[test]
    fn entries_are_per_page_and_per_table() {
        let pt = SoftPageTables::new();
        let pa = PhysicalAddress::new(0x20_0000);
        pt.map(T, VirtualAddress::new(0x1000), pa, PageEntryBits::new_user_rw());

        assert_eq!(
            pt.mapping(T, VirtualAddress::new(0x1FFF)),
            Some(PageMapping::Resident(pa))
        );
        assert!(pt.mapping(TableId::new(2), VirtualAddress::new(0x1000)).is_none());
    }

    #[test]
    fn touch_sets_accessed_only_when_present() {
        let pt = SoftPageTables::new();
        let va = VirtualAddress::new(0x3000);
        pt.map(T, va, PhysicalAddress::new(0x5000), PageEntryBits::new_user_rw());
        assert!(pt.touch(T, va));
        assert!(pt.entry(T, va).unwrap().accessed());

        pt.with_leaf(T, va, false, |e| e.set_mapping(PageMapping::OnDisk(SwapSlot::new(1))));
        assert!(!pt.touch(T, va));
    }

    #[test]
    fn resident_mappings_skip_absent_and_on_disk_entries() {
        let pt = SoftPageTables::new();
        let pa = PhysicalAddress::new(0x9000);
        pt.map(T, VirtualAddress::new(0x2000), pa, PageEntryBits::new_user_rw());
        pt.with_leaf(T, VirtualAddress::new(0x3000), true, |e| {
            e.set_mapping(PageMapping::OnDisk(SwapSlot::new(4)));
        });
        pt.with_leaf(T, VirtualAddress::new(0x4000), true, |_| ());

        assert_eq!(
            pt.resident_mappings(),
            [(T, VirtualAddress::new(0x2000), pa)]
        );
    }

    #[test]
    fn invalidations_are_counted() {
        let pt = SoftPageTables::new();
        pt.invalidate(Some(VirtualAddress::new(0x1000)));
        pt.invalidate(None);
        pt.invalidate(Some(VirtualAddress::new(0x2000)));
        assert_eq!(pt.page_invalidations(), 2);
        assert_eq!(pt.full_flushes(), 1);
    }
}
