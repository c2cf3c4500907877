//! # Memory Layout and Swap Geometry

/// Size of one physical frame / virtual page in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// [`PAGE_SIZE`] as a byte count for buffers and slices.
pub const PAGE_BYTES: usize = 4096;

/// `log2(PAGE_SIZE)`.
pub const PAGE_SHIFT: u32 = 12;

/// Number of physical frames handed to the frame allocator at boot.
///
/// 4096 frames of 4 KiB each, i.e. 16 MiB of managed memory.
pub const MANAGED_FRAMES: usize = 4096;

/// Size of one block on the swap device, in bytes.
pub const SWAP_BLOCK_SIZE: usize = 1024;

/// Number of contiguous device blocks that make up one swap slot.
pub const SWAP_BLOCKS_PER_SLOT: usize = PAGE_BYTES / SWAP_BLOCK_SIZE;

/// Number of page-sized slots in the swap area.
///
/// The swap area is fixed at boot and never grows.
pub const SWAP_SLOTS: usize = (1 << 14) / SWAP_BLOCKS_PER_SLOT;

/// Number of 64-bit words in the swap-slot occupancy bitmap.
pub const SWAP_BITMAP_WORDS: usize = SWAP_SLOTS.div_ceil(64);

/// First device block of the swap area.
///
/// Slot `i` occupies blocks `[SWAP_FIRST_BLOCK + i·N, SWAP_FIRST_BLOCK + i·N + N)`
/// with `N = SWAP_BLOCKS_PER_SLOT`.
pub const SWAP_FIRST_BLOCK: u64 = 0;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

const _: () = {
    assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
    assert!(PAGE_BYTES as u64 == PAGE_SIZE);
    assert!(PAGE_BYTES % SWAP_BLOCK_SIZE == 0);
    assert!(SWAP_BLOCKS_PER_SLOT > 0);
    assert!(SWAP_BITMAP_WORDS * 64 >= SWAP_SLOTS);
    assert!(MANAGED_FRAMES > 0);
};
