//! # HHDM-based PhysMapper for Kernel Virtual Memory
//!
//! The kernel reaches physical memory through a higher-half direct map
//! (HHDM): every physical address `pa` is mapped at `HHDM_BASE + pa`.
//! [`HhdmPhysMapper`] turns that rule into a [`PhysMapper`], which is how
//! the frame allocator writes its free-list links and junk bytes, and how
//! the fault path zeroes and copies frames.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::HhdmPhysMapper;
//! use kernel_info::memory::HHDM_BASE;
//! use kernel_memory_addresses::PhysicalAddress;
//! use kernel_vmem::PhysMapper;
//!
//! let ptr = HhdmPhysMapper.phys_to_ptr::<u8>(PhysicalAddress::new(0x1234_0000));
//! assert_eq!(ptr as u64, HHDM_BASE + 0x1234_0000);
//! ```

use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] for kernels with a higher-half direct map.
///
/// # Safety
/// Dereferencing the returned pointers requires the HHDM to be installed and
/// to cover the referenced physical range.
#[derive(Copy, Clone, Debug, Default)]
pub struct HhdmPhysMapper;

impl PhysMapper for HhdmPhysMapper {
    #[inline]
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        (HHDM_BASE + pa.as_u64()) as *mut T
    }
}
