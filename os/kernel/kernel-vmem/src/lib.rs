//! # Virtual Memory Collaborator Boundary
//!
//! The physical memory core never walks page tables or flushes TLBs itself. It
//! consumes both through the narrow interfaces defined here:
//!
//! - [`PageTableWalker`]: resolve the leaf translation entry for an address in
//!   a given table, optionally creating missing levels.
//! - [`TlbInvalidate`]: drop cached translations for one address, or all.
//!
//! ## Entry encoding
//!
//! A leaf entry ([`PageEntryBits`]) is one 64-bit word whose address field
//! carries two meanings, selected by the present bit and an OS-available
//! on-disk bit:
//!
//! ```text
//! | Bits   | Resident (P=1)        | On disk (P=0, on_disk=1) |
//! |--------|-----------------------|--------------------------|
//! | 0      | present = 1           | present = 0              |
//! | 1..=8  | RW, US, PWT, PCD, A, D, PS, G (kept as-is)       |
//! | 9      | on_disk = 0           | on_disk = 1              |
//! | 12..51 | physical frame number | swap slot index          |
//! | 63     | NX (kept as-is)                                  |
//! ```
//!
//! Callers never see that bit juggling. They read and write a tagged
//! [`PageMapping`] instead:
//!
//! ```rust
//! # use kernel_vmem::{PageEntryBits, PageMapping, SwapSlot};
//! # use kernel_memory_addresses::PhysicalAddress;
//! let mut e = PageEntryBits::new_user_rw();
//! e.set_mapping(PageMapping::Resident(PhysicalAddress::new(0x5000)));
//! assert!(e.present());
//!
//! e.set_mapping(PageMapping::OnDisk(SwapSlot::new(42)));
//! assert!(!e.present());
//! assert_eq!(e.mapping(), PageMapping::OnDisk(SwapSlot::new(42)));
//! // Permission bits survive the round trip.
//! assert!(e.user_access());
//! ```
//!
//! ## Hosted page tables
//!
//! [`SoftPageTables`] keeps leaf entries in a map instead of a hardware
//! radix tree. It implements both traits and lets the memory core run (and be
//! tested) without an MMU.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

extern crate alloc;

mod mapping;
mod page_entry_bits;
mod soft;
mod tlb;
mod walker;

pub use crate::mapping::{PageMapping, SwapSlot};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::soft::SoftPageTables;
#[cfg(target_arch = "x86_64")]
pub use crate::tlb::LocalTlb;
pub use crate::walker::{PageTableWalker, TableId, TlbInvalidate};
