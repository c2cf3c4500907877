//! # Swap Transfers
//!
//! Moves page content between frames and swap slots and keeps the owning
//! translation entry in step.
//!
//! Swap-out, in lock-hold order:
//!
//! ```text
//! [frames]  select victim, reserve it (Kernel, reserved, force cleared)
//! [slots]   acquire a slot        ── none: [frames] restore, fail
//! [frames]  detach back-references, history = MAX
//!           write frame → slot blocks          (no lock held)
//! [walker]  Resident(frame) → OnDisk(slot), invalidate
//! [frames]  state = SwappedOut
//! ```
//!
//! No two of these locks are ever held at once. The reservation keeps every
//! other context away from the victim while the transfer runs unlocked.

use crate::block::BlockDevice;
use crate::frame_table::{FrameState, FrameTable};
use crate::phys_mapper::{PhysMapper, page_bytes};
use crate::swap_space::SwapSpace;
use kernel_info::memory::PAGE_BYTES;
use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::{PageMapping, PageTableWalker, SwapSlot, TlbInvalidate};

/// Why a swap-out did not produce a frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SwapOutError {
    /// No frame is idle, user-owned or force-marked.
    #[error("no frame can be evicted")]
    NoVictim,
    /// Every swap slot is taken. The victim was left as it was.
    #[error("swap space exhausted")]
    SwapExhausted,
}

/// A frame reclaimed by [`SwapIo::swap_out`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Evicted {
    pub index: usize,
    pub address: PhysicalAddress,
    /// Where the content went, or `None` if the victim was not mapped and
    /// nothing had to be saved.
    pub slot: Option<SwapSlot>,
}

/// Swap slots, the device holding them, and the page tables referring to them.
pub struct SwapIo<P, D, const WORDS: usize> {
    slots: SwapSpace<WORDS>,
    paging: P,
    disk: D,
    first_block: u64,
}

impl<P, D, const WORDS: usize> SwapIo<P, D, WORDS> {
    /// Slot `i` will occupy device blocks starting at `first_block + i · N`,
    /// where `N` blocks make up one page.
    #[must_use]
    pub const fn new(slots: SwapSpace<WORDS>, paging: P, disk: D, first_block: u64) -> Self {
        Self {
            slots,
            paging,
            disk,
            first_block,
        }
    }

    #[inline]
    #[must_use]
    pub const fn slots(&self) -> &SwapSpace<WORDS> {
        &self.slots
    }

    #[inline]
    #[must_use]
    pub const fn paging(&self) -> &P {
        &self.paging
    }

    #[inline]
    #[must_use]
    pub const fn disk(&self) -> &D {
        &self.disk
    }
}

impl<P, D, const WORDS: usize> SwapIo<P, D, WORDS>
where
    P: PageTableWalker + TlbInvalidate,
    D: BlockDevice,
{
    /// Device blocks per slot and the block size.
    fn geometry(&self) -> (usize, usize) {
        let block_size = self.disk.block_size();
        assert!(
            block_size > 0 && PAGE_BYTES % block_size == 0,
            "swap device block size {block_size} does not divide a page"
        );
        (PAGE_BYTES / block_size, block_size)
    }

    /// First device block of `slot`.
    fn first_block_of(&self, slot: SwapSlot, blocks_per_slot: usize) -> u64 {
        self.first_block + u64::from(slot.as_u32()) * blocks_per_slot as u64
    }

    /// Write one page to `slot`.
    ///
    /// # Panics
    /// On a device error. A transfer cannot be abandoned halfway.
    pub fn write_slot(&self, slot: SwapSlot, page: &[u8; PAGE_BYTES]) {
        let (blocks, block_size) = self.geometry();
        let first = self.first_block_of(slot, blocks);
        for (block, chunk) in (first..).zip(page.chunks_exact(block_size)) {
            if let Err(err) = self.disk.write_block(block, chunk) {
                panic!("swap write of {slot} failed at block {block}: {err}");
            }
        }
    }

    /// Read one page from `slot`.
    ///
    /// # Panics
    /// On a device error.
    pub fn read_slot(&self, slot: SwapSlot, page: &mut [u8; PAGE_BYTES]) {
        let (blocks, block_size) = self.geometry();
        let first = self.first_block_of(slot, blocks);
        for (block, chunk) in (first..).zip(page.chunks_exact_mut(block_size)) {
            if let Err(err) = self.disk.read_block(block, chunk) {
                panic!("swap read of {slot} failed at block {block}: {err}");
            }
        }
    }

    /// Evict one frame and hand it to the caller.
    ///
    /// On success the frame is `SwappedOut` and stays reserved until the
    /// caller claims it; a concurrent `free` leaves it alone. A
    /// mapped victim's content is in a swap slot and its entry reads
    /// `OnDisk(slot)`; an unmapped victim is taken as is.
    ///
    /// # Errors
    /// [`SwapOutError::NoVictim`] if nothing is evictable,
    /// [`SwapOutError::SwapExhausted`] if a mapped victim has nowhere to go.
    /// Either way nothing was changed.
    pub fn swap_out<M: PhysMapper, const N: usize>(
        &self,
        frames: &FrameTable<N>,
        mapper: &M,
    ) -> Result<Evicted, SwapOutError> {
        let (index, prior) = {
            let mut table = frames.lock();
            let index = table.select_victim().ok_or(SwapOutError::NoVictim)?;
            (index, table.reserve(index))
        };
        let address = frames.address_of(index);

        let Some(translation) = prior.translation else {
            frames.lock().detach(index);
            frames.set_state(index, FrameState::SwappedOut);
            log::trace!("swap-out: frame {index} ({address}) reclaimed without I/O");
            return Ok(Evicted {
                index,
                address,
                slot: None,
            });
        };

        let Some(slot) = self.slots.acquire() else {
            frames.lock().restore(index, prior);
            log::warn!("swap-out: no free slot for frame {index} ({address}), victim restored");
            return Err(SwapOutError::SwapExhausted);
        };

        frames.lock().detach(index);

        // SAFETY: The frame is reserved; no other context reads or writes it
        // until it leaves the swap path.
        self.write_slot(slot, unsafe { page_bytes(mapper, address) });

        let rewritten = self
            .paging
            .with_leaf(translation.table, translation.page, false, |entry| {
                let mapped_here = entry.mapping() == PageMapping::Resident(address);
                if mapped_here {
                    entry.set_mapping(PageMapping::OnDisk(slot));
                }
                mapped_here
            })
            .unwrap_or(false);

        let slot = if rewritten {
            self.paging.invalidate(Some(translation.page));
            log::debug!(
                "swap-out: frame {index} ({address}) -> {slot} for {:?} {}",
                translation.table,
                translation.page
            );
            Some(slot)
        } else {
            log::warn!(
                "swap-out: {:?} {} no longer maps frame {index}, dropping {slot}",
                translation.table,
                translation.page
            );
            self.slots.release(slot);
            None
        };

        frames.set_state(index, FrameState::SwappedOut);
        Ok(Evicted {
            index,
            address,
            slot,
        })
    }
}
