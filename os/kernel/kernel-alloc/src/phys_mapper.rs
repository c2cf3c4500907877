//! # Physical Memory Access
//!
//! Code can only dereference virtual addresses. A [`PhysMapper`] turns the
//! physical address of a managed frame into a pointer the current address
//! space can use.
//!
//! - [`HhdmPhysMapper`]: every physical address is visible at `HHDM_BASE + pa`.
//!   This is what the kernel uses once its higher-half direct map is live.
//! - [`IdentityPhysMapper`]: physical and virtual addresses coincide. Early
//!   boot code with identity paging and hosted tests use this one.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::{IdentityPhysMapper, PhysMapper};
//! use kernel_memory_addresses::PhysicalAddress;
//!
//! let mut word = 0u64;
//! let pa = PhysicalAddress::new(&raw mut word as u64);
//! unsafe {
//!     *IdentityPhysMapper.phys_to_mut::<u64>(pa) = 7;
//! }
//! assert_eq!(word, 7);
//! ```

use kernel_info::memory::{HHDM_BASE, PAGE_BYTES};
use kernel_memory_addresses::PhysicalAddress;

/// Converts physical addresses into usable pointers.
pub trait PhysMapper {
    /// Pointer through which `pa` is reachable. Computing it is always safe;
    /// using it is not.
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T;

    /// Borrow the `T` living at `pa`.
    ///
    /// # Safety
    /// `pa` must be mapped by this mapper, suitably aligned for `T`, hold a
    /// valid `T`, and not be aliased for `'a`.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        // SAFETY: Upheld by the caller.
        unsafe { &mut *self.phys_to_ptr::<T>(pa) }
    }
}

impl<M: PhysMapper> PhysMapper for &M {
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        (**self).phys_to_ptr(pa)
    }
}

/// Mapper for kernels with a higher-half direct map.
///
/// The HHDM must cover every physical address handed to it.
#[derive(Debug, Copy, Clone, Default)]
pub struct HhdmPhysMapper;

impl PhysMapper for HhdmPhysMapper {
    #[inline]
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        (HHDM_BASE + pa.as_u64()) as *mut T
    }
}

/// Mapper for identity-mapped memory.
#[derive(Debug, Copy, Clone, Default)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    #[inline]
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        pa.as_u64() as *mut T
    }
}

/// View the frame at `pa` as bytes.
///
/// # Safety
/// `pa` must be a page-aligned frame reachable through `mapper` that nobody
/// else reads or writes for `'a`.
pub(crate) unsafe fn page_bytes<'a, M: PhysMapper>(
    mapper: &M,
    pa: PhysicalAddress,
) -> &'a mut [u8; PAGE_BYTES] {
    // SAFETY: Upheld by the caller; every bit pattern is a valid byte array.
    unsafe { mapper.phys_to_mut(pa) }
}

/// Fill the frame at `pa` with zeros.
///
/// # Safety
/// Same as [`page_bytes`].
pub(crate) unsafe fn zero_page<M: PhysMapper>(mapper: &M, pa: PhysicalAddress) {
    // SAFETY: Upheld by the caller.
    unsafe { mapper.phys_to_ptr::<u8>(pa).write_bytes(0, PAGE_BYTES) };
}
