use crate::mapping::PageMapping;
use crate::page_entry_bits::PageEntryBits;
use core::fmt;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Identifies one page table hierarchy (one address space).
///
/// The kernel uses the physical address of the root table; anything unique
/// per address space works. A frame's back-reference to its translation entry
/// is a `(TableId, VirtualAddress)` pair that is re-resolved through a
/// [`PageTableWalker`] on every use, never a live pointer into the table.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableId(u64);

impl TableId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Identify a hierarchy by the physical address of its root table.
    #[inline]
    #[must_use]
    pub const fn from_root(root: PhysicalAddress) -> Self {
        Self(root.as_u64())
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({:#x})", self.0)
    }
}

/// Resolves leaf translation entries.
///
/// # Contract
/// - `va` may be any address inside the page; implementations resolve the
///   entry of the containing 4 KiB page.
/// - With `create == false` a missing entry yields `None` and nothing is
///   allocated. With `create == true` missing intermediate levels (and the
///   leaf slot) are created.
/// - `f` runs while the implementation holds whatever serializes access to the
///   entry. It must not call back into the walker.
pub trait PageTableWalker {
    fn with_leaf<R>(
        &self,
        table: TableId,
        va: VirtualAddress,
        create: bool,
        f: impl FnOnce(&mut PageEntryBits) -> R,
    ) -> Option<R>;

    /// Current typed mapping of `va`, or `None` if no leaf entry exists.
    fn mapping(&self, table: TableId, va: VirtualAddress) -> Option<PageMapping> {
        self.with_leaf(table, va, false, |e| e.mapping())
    }
}

/// Drops cached translations after an entry changed.
pub trait TlbInvalidate {
    /// Invalidate the translation for `va`, or every translation when `None`.
    fn invalidate(&self, va: Option<VirtualAddress>);
}

impl<W: PageTableWalker> PageTableWalker for &W {
    fn with_leaf<R>(
        &self,
        table: TableId,
        va: VirtualAddress,
        create: bool,
        f: impl FnOnce(&mut PageEntryBits) -> R,
    ) -> Option<R> {
        (**self).with_leaf(table, va, create, f)
    }
}

impl<T: TlbInvalidate> TlbInvalidate for &T {
    fn invalidate(&self, va: Option<VirtualAddress>) {
        (**self).invalidate(va);
    }
}
