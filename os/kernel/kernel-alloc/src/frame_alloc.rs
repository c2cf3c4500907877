//! # Page Frame Allocator
//!
//! Hands out zeroed 4 KiB frames. Free frames are served from an intrusive
//! free list; once it runs dry, a resident frame is evicted to swap and
//! reused. Evicted pages come back through [`FrameAllocator::swap_in`] when
//! their owner faults on them.
//!
//! ```text
//! allocate() ──► free list ──hit──► claim, zero ──► frame
//!                   │
//!                 empty
//!                   ▼
//!              swap_out() ──► victim scan ──► slot ──► disk
//! ```
//!
//! Each of the three shared structures (frame table, swap bitmap, free list)
//! has its own lock; no path holds two of them at once.

use crate::block::BlockDevice;
use crate::frame_table::{FrameState, FrameTable, TranslationRef};
use crate::free_list::FreeList;
use crate::phys_mapper::{PhysMapper, page_bytes, zero_page};
use crate::swap_io::{SwapIo, SwapOutError};
use crate::swap_space::SwapSpace;
use kernel_info::memory::{MANAGED_FRAMES, SWAP_BITMAP_WORDS, SWAP_FIRST_BLOCK, SWAP_SLOTS};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_sync::SpinLock;
use kernel_vmem::{PageEntryBits, PageMapping, PageTableWalker, TableId, TlbInvalidate};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AllocError {
    /// The free list is empty and no frame could be moved to swap.
    #[error("out of memory")]
    OutOfMemory,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error(transparent)]
    Alloc(#[from] AllocError),
    /// The page already has a translation; nothing was changed.
    #[error("page is already mapped as {0:?}")]
    AlreadyMapped(PageMapping),
    /// The walker could not provide a leaf entry.
    #[error("no translation entry for the page")]
    NoEntry,
}

/// Outcome of a swap-in attempt.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SwapIn {
    /// The page is back in the frame at this address.
    Restored(PhysicalAddress),
    /// The address has no on-disk mapping, or lost it while the slot was
    /// being read; the fault is something else.
    NotApplicable,
    /// Another context made the page resident while it was being read.
    AlreadyResident,
}

/// The physical memory core: frame registry, free list and swap path.
pub struct FrameAllocator<P, D, M, const N: usize, const WORDS: usize> {
    frames: FrameTable<N>,
    swap: SwapIo<P, D, WORDS>,
    free_list: SpinLock<FreeList>,
    mapper: M,
}

/// The allocator as the kernel sizes it at boot.
pub type KernelFrameAllocator<P, D, M> =
    FrameAllocator<P, D, M, MANAGED_FRAMES, SWAP_BITMAP_WORDS>;

impl<P, D, M> KernelFrameAllocator<P, D, M> {
    /// [`MANAGED_FRAMES`] frames from `base`, and [`SWAP_SLOTS`] slots on
    /// `disk` starting at block [`SWAP_FIRST_BLOCK`].
    ///
    /// # Safety
    /// As for [`new`](Self::new).
    #[must_use]
    pub const unsafe fn with_boot_layout(
        base: PhysicalAddress,
        paging: P,
        disk: D,
        mapper: M,
    ) -> Self {
        let swap = SwapIo::new(SwapSpace::new(SWAP_SLOTS), paging, disk, SWAP_FIRST_BLOCK);
        // SAFETY: Upheld by the caller.
        unsafe { Self::new(FrameTable::new(base), swap, mapper) }
    }
}

impl<P, D, M, const N: usize, const WORDS: usize> FrameAllocator<P, D, M, N, WORDS> {
    /// Assemble an allocator. Nothing is free until [`init`](Self::init) runs.
    ///
    /// # Safety
    /// Every frame described by `frames` must be reachable through `mapper`
    /// and belong to this allocator alone for as long as it exists.
    #[must_use]
    pub const unsafe fn new(frames: FrameTable<N>, swap: SwapIo<P, D, WORDS>, mapper: M) -> Self {
        Self {
            frames,
            swap,
            free_list: SpinLock::new(FreeList::new()),
            mapper,
        }
    }

    #[inline]
    #[must_use]
    pub const fn frames(&self) -> &FrameTable<N> {
        &self.frames
    }

    #[inline]
    #[must_use]
    pub const fn swap(&self) -> &SwapIo<P, D, WORDS> {
        &self.swap
    }

    /// Number of frames currently on the free list.
    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.free_list.lock().len()
    }
}

impl<P, D, M, const N: usize, const WORDS: usize> FrameAllocator<P, D, M, N, WORDS>
where
    P: PageTableWalker + TlbInvalidate,
    D: BlockDevice,
    M: PhysMapper,
{
    /// Reset all bookkeeping and put every managed frame on the free list.
    ///
    /// Frames are freed in address order, so the highest frame is handed out
    /// first.
    pub fn init(&self) {
        self.frames.init(FrameState::Kernel);
        self.swap.slots().init();
        *self.free_list.lock() = FreeList::new();
        for index in 0..N {
            self.free(self.frames.address_of(index));
        }
        log::debug!(
            "frame allocator: {} frames free in {}..{}, {} swap slots",
            N,
            self.frames.base(),
            self.frames.end(),
            self.swap.slots().capacity()
        );
    }

    /// Hand out one zeroed frame, owned by the kernel.
    ///
    /// # Errors
    /// [`AllocError::OutOfMemory`] if the free list is empty and swap is full.
    ///
    /// # Panics
    /// If the free list is empty and no frame is evictable at all.
    pub fn allocate(&self) -> Result<PhysicalAddress, AllocError> {
        // SAFETY: Listed frames belong to this allocator (see `new`).
        let popped = unsafe { self.free_list.lock().pop(&self.mapper) };

        let address = match popped {
            Some(address) => {
                log::trace!("allocate: {address} from the free list");
                address
            }
            None => match self.swap.swap_out(&self.frames, &self.mapper) {
                Ok(evicted) => evicted.address,
                Err(SwapOutError::NoVictim) => {
                    panic!("allocate: no idle, user or force-marked frame to reclaim")
                }
                Err(SwapOutError::SwapExhausted) => return Err(AllocError::OutOfMemory),
            },
        };

        let index = self.index_of(address);
        self.frames.claim(index);
        // SAFETY: Claimed above; nobody else holds this frame.
        unsafe { zero_page(&self.mapper, address) };
        Ok(address)
    }

    /// Return `address` to the free list.
    ///
    /// The frame is zeroed and its metadata reset. The caller must have
    /// removed every translation to it.
    ///
    /// A frame that an eviction reserved in the meantime is left to that
    /// eviction; it reaches the evicting caller instead of the free list.
    ///
    /// # Panics
    /// If `address` is not page-aligned, lies outside the managed range, or
    /// is already free.
    #[track_caller]
    pub fn free(&self, address: PhysicalAddress) {
        assert!(
            address.is_page_aligned(),
            "free: {address} is not page-aligned"
        );
        let index = self.index_of(address);
        if !self.frames.release_for_free(index) {
            log::debug!("free: {address} is being evicted, leaving it to the swap path");
            return;
        }

        // SAFETY: Empty and unlisted; no other context touches it until pushed.
        unsafe { zero_page(&self.mapper, address) };
        // SAFETY: As above.
        unsafe { self.free_list.lock().push(&self.mapper, address) };
    }

    /// Bring the page at `va` in `table` back from swap.
    ///
    /// May evict another frame to make room.
    ///
    /// # Errors
    /// [`AllocError::OutOfMemory`] if no frame could be found; the page stays
    /// on disk.
    pub fn swap_in(&self, table: TableId, va: VirtualAddress) -> Result<SwapIn, AllocError> {
        let paging = self.swap.paging();
        let Some(PageMapping::OnDisk(slot)) = paging.mapping(table, va) else {
            return Ok(SwapIn::NotApplicable);
        };

        let address = self.allocate()?;
        // SAFETY: Freshly allocated and not yet mapped anywhere.
        self.swap.read_slot(slot, unsafe { page_bytes(&self.mapper, address) });

        let superseded = paging
            .with_leaf(table, va, false, |entry| match entry.mapping() {
                PageMapping::OnDisk(current) if current == slot => {
                    entry.set_mapping(PageMapping::Resident(address));
                    None
                }
                current => Some(current),
            })
            .unwrap_or(Some(PageMapping::Absent));

        if let Some(current) = superseded {
            log::warn!(
                "swap-in: {table:?} {va} became {current:?} while reading {slot}, dropping {address}"
            );
            self.free(address);
            return Ok(if current.is_resident() {
                SwapIn::AlreadyResident
            } else {
                SwapIn::NotApplicable
            });
        }

        self.swap.slots().release(slot);
        self.frames
            .attach_user(self.index_of(address), TranslationRef::new(table, va));
        paging.invalidate(Some(va.page_base()));
        log::debug!("swap-in: {slot} -> {address} for {table:?} {va}");
        Ok(SwapIn::Restored(address))
    }

    /// Back the unmapped page at `va` in `table` with a fresh zeroed frame.
    ///
    /// `flags` supplies the permission bits of the new entry.
    ///
    /// # Errors
    /// [`MapError::AlreadyMapped`] if the entry is resident or on disk,
    /// [`MapError::NoEntry`] if the walker cannot create it,
    /// [`MapError::Alloc`] if no frame is available.
    pub fn map_user(
        &self,
        table: TableId,
        va: VirtualAddress,
        flags: PageEntryBits,
    ) -> Result<PhysicalAddress, MapError> {
        let address = self.allocate()?;

        let installed = self.swap.paging().with_leaf(table, va, true, |entry| {
            match entry.mapping() {
                PageMapping::Absent => {
                    *entry = flags;
                    entry.set_mapping(PageMapping::Resident(address));
                    Ok(())
                }
                existing => Err(MapError::AlreadyMapped(existing)),
            }
        });

        match installed {
            Some(Ok(())) => {
                self.frames
                    .attach_user(self.index_of(address), TranslationRef::new(table, va));
                log::trace!("map: {table:?} {va} -> {address}");
                Ok(address)
            }
            Some(Err(err)) => {
                self.free(address);
                Err(err)
            }
            None => {
                self.free(address);
                Err(MapError::NoEntry)
            }
        }
    }

    /// Forget the on-disk page at `va` in `table`: release its slot and clear
    /// the entry. Used when an address space is torn down.
    ///
    /// Returns `false` if the page was not on disk.
    pub fn discard(&self, table: TableId, va: VirtualAddress) -> bool {
        let slot = self
            .swap
            .paging()
            .with_leaf(table, va, false, |entry| {
                let slot = entry.mapping().swap_slot()?;
                entry.set_mapping(PageMapping::Absent);
                Some(slot)
            })
            .flatten();

        match slot {
            Some(slot) => {
                self.swap.slots().release(slot);
                log::trace!("discard: {table:?} {va} released {slot}");
                true
            }
            None => false,
        }
    }

    /// One tick of the aging clock over every resident frame.
    pub fn age(&self) {
        self.frames.age(self.swap.paging());
    }

    #[track_caller]
    fn index_of(&self, address: PhysicalAddress) -> usize {
        match self.frames.index_of(address) {
            Some(index) => index,
            None => panic!(
                "{address} is outside the managed range {}..{}",
                self.frames.base(),
                self.frames.end()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::RamDisk;
    use crate::phys_mapper::HhdmPhysMapper;
    use kernel_vmem::SoftPageTables;

    #[test]
    fn boot_layout_uses_the_configured_geometry() {
        // Constructing touches no frame memory.
        let m = unsafe {
            KernelFrameAllocator::with_boot_layout(
                PhysicalAddress::new(0x10_0000),
                SoftPageTables::new(),
                RamDisk::new(1024, 0),
                HhdmPhysMapper,
            )
        };
        assert_eq!(m.frames().capacity(), MANAGED_FRAMES);
        assert_eq!(m.swap().slots().capacity(), SWAP_SLOTS);
        assert_eq!(m.free_frames(), 0);
    }
}
