//! # Kernel synchronization primitives
//!
//! The memory core serializes every shared table behind a [`SpinLock`]. Kernel
//! contexts (interrupt handlers, other cores) may not sleep while holding one,
//! so a context that cannot take the lock busy-waits instead of yielding.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
