//! A small hosted machine: leaked page-aligned memory as physical frames,
//! a RAM disk for swap and software page tables.

#![allow(dead_code)]

use kernel_alloc::{
    BlockDevice, FrameAllocator, FrameState, FrameTable, IdentityPhysMapper, PhysMapper, RamDisk,
    SwapIo, SwapSpace,
};
use kernel_info::memory::{PAGE_BYTES, SWAP_BLOCK_SIZE};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::{PageEntryBits, SoftPageTables, TableId};

pub type Machine<const N: usize> =
    FrameAllocator<SoftPageTables, RamDisk, IdentityPhysMapper, N, 1>;

pub const TABLE: TableId = TableId::new(0x8_0000);

#[repr(C, align(4096))]
#[derive(Clone)]
pub struct Page(pub [u8; PAGE_BYTES]);

/// `frames` pages of memory that live for the rest of the test binary.
pub fn physical_memory(frames: usize) -> PhysicalAddress {
    let pages: &'static mut [Page] = Vec::leak(vec![Page([0; PAGE_BYTES]); frames]);
    PhysicalAddress::new(pages.as_mut_ptr() as u64)
}

pub fn ram_disk(slots: usize) -> RamDisk {
    RamDisk::new(SWAP_BLOCK_SIZE, slots * PAGE_BYTES / SWAP_BLOCK_SIZE)
}

/// An initialized allocator over `N` frames with `slots` swap slots (at most 64).
pub fn machine<const N: usize>(slots: usize) -> Machine<N> {
    let swap = SwapIo::new(
        SwapSpace::new(slots),
        SoftPageTables::new(),
        ram_disk(slots),
        0,
    );
    // SAFETY: The memory is leaked and used by nothing else.
    let frames = FrameTable::new(physical_memory(N));
    let machine = unsafe { FrameAllocator::new(frames, swap, IdentityPhysMapper) };
    machine.init();
    machine
}

/// User page number `n` of the test address space.
pub const fn user_page(n: u64) -> VirtualAddress {
    VirtualAddress::new(0x40_0000 + n * 0x1000)
}

/// Content of the frame at `pa`.
pub fn frame(pa: PhysicalAddress) -> &'static mut [u8; PAGE_BYTES] {
    // SAFETY: Test frames are identity-mapped and outlive every test.
    unsafe { IdentityPhysMapper.phys_to_mut(pa) }
}

/// Map `count` user pages, filling page `n` with the byte `n + 1`.
pub fn map_pages<const N: usize>(machine: &Machine<N>, count: u64) -> Vec<PhysicalAddress> {
    (0..count)
        .map(|n| {
            let pa = machine
                .map_user(TABLE, user_page(n), PageEntryBits::new_user_rw())
                .expect("map user page");
            frame(pa).fill(fill_byte(n));
            pa
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
pub const fn fill_byte(n: u64) -> u8 {
    (n as u8).wrapping_add(1)
}

/// No live translation may point at a free frame, and no two translations at
/// the same frame.
pub fn assert_free_frames_unmapped<D: BlockDevice, const N: usize>(
    machine: &FrameAllocator<SoftPageTables, D, IdentityPhysMapper, N, 1>,
) {
    let mut seen = std::collections::HashSet::new();
    for (table, page, pa) in machine.swap().paging().resident_mappings() {
        let Some(index) = machine.frames().index_of(pa) else {
            continue;
        };
        assert_ne!(
            machine.frames().state(index),
            FrameState::Empty,
            "{table:?} {page} maps free frame {pa}"
        );
        assert!(seen.insert(pa), "{pa} is mapped twice");
    }
    let empty = machine.frames().census().empty;
    assert_eq!(machine.free_frames(), empty);
}
