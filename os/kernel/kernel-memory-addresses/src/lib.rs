//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw addresses used by the frame allocator and
//! the swap path.
//!
//! | Wrapper | Meaning |
//! |----------|----------|
//! | [`PhysicalAddress`] | A location in physical memory (a frame base, or a byte inside one). |
//! | [`VirtualAddress`] | A page-table translated address inside some address space. |
//!
//! Both are zero-cost `u64` newtypes sharing the page helpers of
//! [`MemoryAddress`]. They exist so that a frame address can never be passed
//! where a faulting virtual address is expected, and vice versa.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0010_2042);
//! assert!(!pa.is_page_aligned());
//! assert_eq!(pa.page_base().as_u64(), 0x0010_2000);
//! assert_eq!(pa.page_offset(), 0x42);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

use core::fmt;
use core::ops::{Add, AddAssign};
use kernel_info::memory::PAGE_SIZE;

/// Principal raw memory address ([virtual](VirtualAddress) or [physical](PhysicalAddress)).
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MemoryAddress(u64);

impl MemoryAddress {
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Align down to the containing page boundary.
    #[inline]
    #[must_use]
    pub const fn page_base(self) -> Self {
        Self(self.0 & !(PAGE_SIZE - 1))
    }

    /// Byte offset within the containing page.
    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u64 {
        self.0 & (PAGE_SIZE - 1)
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }

    /// Checked add of a byte count, returning `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, bytes: u64) -> Option<Self> {
        match self.0.checked_add(bytes) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryAddress(0x{:016X})", self.0)
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl Add<u64> for MemoryAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for MemoryAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

/// Generates the shared surface of the two address kinds.
macro_rules! address_kind {
    ($name:ident, $label:literal) => {
        impl $name {
            #[inline]
            #[must_use]
            pub const fn new(v: u64) -> Self {
                Self(MemoryAddress::new(v))
            }

            #[inline]
            #[must_use]
            pub const fn zero() -> Self {
                Self::new(0)
            }

            #[inline]
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0.as_u64()
            }

            #[inline]
            #[must_use]
            pub const fn as_memory_address(self) -> MemoryAddress {
                self.0
            }

            /// The base of the page containing this address.
            #[inline]
            #[must_use]
            pub const fn page_base(self) -> Self {
                Self(self.0.page_base())
            }

            #[inline]
            #[must_use]
            pub const fn page_offset(self) -> u64 {
                self.0.page_offset()
            }

            #[inline]
            #[must_use]
            pub const fn is_page_aligned(self) -> bool {
                self.0.is_page_aligned()
            }

            #[inline]
            #[must_use]
            pub const fn checked_add(self, bytes: u64) -> Option<Self> {
                match self.0.checked_add(bytes) {
                    Some(v) => Some(Self(v)),
                    None => None,
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "(0x{:016X})"), self.as_u64())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl Add<u64> for $name {
            type Output = Self;
            #[inline]
            fn add(self, rhs: u64) -> Self::Output {
                Self(self.0 + rhs)
            }
        }

        impl AddAssign<u64> for $name {
            #[inline]
            fn add_assign(&mut self, rhs: u64) {
                self.0 += rhs;
            }
        }

        impl From<$name> for MemoryAddress {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

/// Physical memory address.
///
/// Frame bases handed out by the frame allocator are always page-aligned
/// physical addresses. Dereferencing one requires a physical mapper.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(MemoryAddress);

/// Virtual memory address.
///
/// Carries the *kind* of address only; canonicality is not validated.
/// Faulting addresses handed to the swap-in path are virtual addresses
/// inside the faulting address space.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(MemoryAddress);

address_kind!(PhysicalAddress, "PhysicalAddress");
address_kind!(VirtualAddress, "VirtualAddress");

impl PhysicalAddress {
    /// Byte distance from `base` to `self`, or `None` if `self` lies below `base`.
    #[inline]
    #[must_use]
    pub const fn offset_from(self, base: Self) -> Option<u64> {
        self.as_u64().checked_sub(base.as_u64())
    }
}

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self::new(ptr as u64)
    }
}
