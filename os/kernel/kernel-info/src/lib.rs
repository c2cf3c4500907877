//! # Kernel Memory Configuration
//!
//! Authoritative source for the boot-time constants that size the physical
//! memory core: page geometry, the number of managed frames, and the layout
//! of the swap area on its block device.
//!
//! ## Overview
//!
//! The frame table, the swap-slot bitmap and the swap I/O path all size
//! themselves from these values. Keeping them in one crate prevents the
//! allocator and the swap path from disagreeing about how many blocks make up
//! a slot, or how many slots the bitmap has to cover.
//!
//! ```text
//! Physical memory                      Swap device
//! ┌──────────┐ FRAME_BASE              ┌─────────┬─────────┬─────────┬─────────┐
//! │ frame 0  │                         │ block 0 │ block 1 │ block 2 │ block 3 │ slot 0
//! ├──────────┤ + PAGE_SIZE             ├─────────┼─────────┼─────────┼─────────┤
//! │ frame 1  │                         │ block 4 │ block 5 │ block 6 │ block 7 │ slot 1
//! ├──────────┤                         ├─────────┴─────────┴─────────┴─────────┤
//! │   ...    │                         │                 ...                   │
//! └──────────┘ + MANAGED_FRAMES pages  └───────────────────────────────────────┘
//! ```
//!
//! All checks between the constants happen at compile time; a configuration
//! that cannot work fails the build instead of the boot.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod memory;
