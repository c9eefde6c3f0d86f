//! # Virtual Memory Support
//!
//! Minimal x86-64 paging helpers for the kernel's page-fault path.
//!
//! ## What you get
//! - [`PageEntryBits`]: a page-table entry as a bitfield, including the two
//!   OS-defined bits for copy-on-write and lazy zero-fill.
//! - [`PageEntryCell`]: an atomically accessed entry with compare-and-swap.
//! - A 4 KiB-aligned [`PageTable`] and the [`Level`] index helpers.
//! - An [`AddressSpace`] to walk, map and unmap 4 KiB pages.
//! - Whole-frame [`fill_frame`], [`zero_frame`] and [`copy_frame`].
//! - A tiny allocator/mapper interface ([`FrameAlloc`], [`PhysMapper`]).
//! - The TLB seam [`TranslationCache`] and its `invlpg` implementation.
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! The CPU uses these fields as **indices** into four levels of page tables,
//! each level containing 512 entries of 8 bytes each. Only 4 KiB leaves are
//! managed here; a large page found during a walk ends it.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "testing"))]
extern crate alloc;

pub mod address_space;
mod frame;
mod page_entry_bits;
pub mod page_table;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod tlb;

pub use crate::address_space::{AddressSpace, AddressSpaceError};
pub use crate::frame::{copy_frame, fill_frame, zero_frame};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::{Level, PageEntryCell, PageTable};
#[cfg(target_arch = "x86_64")]
pub use crate::tlb::Invlpg;
pub use crate::tlb::TranslationCache;

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Minimal frame allocator used to obtain **physical** 4 KiB frames
/// for page tables.
///
/// Returned frames are 4 KiB aligned; their contents are unspecified.
/// Returns `None` on out-of-memory.
pub trait FrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;
}

/// Converts physical addresses to pointers usable in the current virtual
/// address space (e.g., via identity map or a higher-half direct map, HHDM).
pub trait PhysMapper {
    /// Pointer through which physical address `pa` can be accessed.
    ///
    /// Computing the pointer is safe; dereferencing it is not.
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T;

    /// Shared reference to a `T` living at `pa`.
    ///
    /// # Safety
    /// - `pa` must be mapped for the lifetime `'a` and hold a valid `T`.
    /// - No `&mut` to the same memory may exist during `'a`.
    #[inline]
    unsafe fn phys_to_ref<'a, T>(&self, pa: PhysicalAddress) -> &'a T {
        unsafe { &*self.phys_to_ptr::<T>(pa) }
    }
}

impl<M: PhysMapper> PhysMapper for &M {
    #[inline]
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        (**self).phys_to_ptr(pa)
    }
}
