//! # Kernel Physical Memory Core
//!
//! Page frame allocation with demand paging to a swap device.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  FrameAllocator                     │
//! │    • allocate / free (intrusive free list)          │
//! │    • swap_in on a fault, map_user, discard          │
//! └───────────┬──────────────────────────┬──────────────┘
//!             │ free list empty          │
//! ┌───────────▼──────────────┐  ┌────────▼──────────────┐
//! │        SwapIo            │  │     FrameTable        │
//! │  • swap_out              │──►  • state, back-refs    │
//! │  • slot ⇄ block transfer │  │  • aging history      │
//! └─────┬──────────┬─────────┘  │  • victim scan        │
//!       │          │            └───────────────────────┘
//! ┌─────▼─────┐ ┌──▼──────────────────────────────────┐
//! │ SwapSpace │ │ BlockDevice · PageTableWalker · TLB │
//! │ (bitmap)  │ │          (collaborators)            │
//! └───────────┘ └─────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! - [`frame_table`]: one [`Frame`] per managed physical frame. The only
//!   place frame states change.
//! - [`aging`]: the aging clock. Folds each entry's accessed bit into the
//!   frame's 64-bit history once per tick.
//! - Victim selection: [`FrameTable::select_victim`] prefers idle frames,
//!   then force-marked ones, then the user frame with the oldest history.
//! - [`swap_space`]: occupancy bitmap of page-sized swap slots.
//! - [`swap_io`]: swap-out of a victim and slot transfers.
//! - [`frame_alloc`]: the allocator the rest of the kernel talks to.
//! - [`phys_mapper`]: turns physical addresses into usable pointers.
//! - [`block`]: the block device boundary and a RAM disk.
//!
//! ## Concurrency
//!
//! Frame table, swap bitmap and free list each sit behind their own
//! [`SpinLock`](kernel_sync::SpinLock). No operation holds two of them at
//! once, and disk transfers run with none held. A victim is reserved under
//! the frame table lock before that lock is dropped, so two contexts never
//! evict the same frame, and a `free` racing the eviction does not list it.
//!
//! ## Fatal conditions
//!
//! Out-of-range frame indices, double release of a swap slot, an eviction
//! with no candidate at all, and `free` of a bad address indicate corrupted
//! bookkeeping and panic. Running out of swap is reported as
//! [`AllocError::OutOfMemory`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod aging;
pub mod block;
pub mod frame_alloc;
pub mod frame_table;
mod free_list;
pub mod phys_mapper;
pub mod swap_io;
pub mod swap_space;
mod victim;

pub use crate::block::{BlockDevice, BlockDeviceError, RamDisk};
pub use crate::frame_alloc::{AllocError, FrameAllocator, KernelFrameAllocator, MapError, SwapIn};
pub use crate::frame_table::{
    Frame, FrameCensus, FrameState, FrameTable, HISTORY_FRESH, TranslationRef,
};
pub use crate::phys_mapper::{HhdmPhysMapper, IdentityPhysMapper, PhysMapper};
pub use crate::swap_io::{Evicted, SwapIo, SwapOutError};
pub use crate::swap_space::SwapSpace;
