//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses and page bases used by the
//! frame allocator and the page-fault path.
//!
//! ## Overview
//!
//! | Wrapper | Meaning |
//! |----------|----------|
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Refer to virtual (page-table translated) memory. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Refer to physical memory frames. |
//!
//! The frame allocator indexes its share-count table by
//! [`PhysicalPage::index`], i.e. `address / frame size`.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0010_3042);
//! let frame = pa.page::<Size4K>();
//! assert_eq!(frame.base().as_u64(), 0x0010_3000);
//! assert_eq!(frame.index(), 0x103);
//!
//! let va = VirtualAddress::new(0x0000_7000_0000_0fff);
//! assert_eq!(va.page::<Size4K>().base().as_u64(), 0x0000_7000_0000_0000);
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` and implement `Copy`, `Eq`, `Ord`, and
//!   `Hash`, making them suitable as map keys.
//! - All alignment and offset calculations are `const fn`.
//! - The phantom marker `S` enforces the page size at the type level.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use page_size::{PageSize, Size4K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_is_address_divided_by_frame_size() {
        let frame = PhysicalAddress::new(0x00E0_0000).page::<Size4K>();
        assert_eq!(frame.index(), 0x00E0_0000 / 4096);
        assert_eq!(PhysicalPage::<Size4K>::from_index(frame.index()), frame);
    }

    #[test]
    fn alignment_helpers() {
        let a = PhysicalAddress::new(0x12345);
        assert_eq!(a.align_down::<Size4K>().as_u64(), 0x12000);
        assert_eq!(a.align_up::<Size4K>().as_u64(), 0x13000);
        assert_eq!(a.page::<Size4K>().base().as_u64(), 0x12000);
        assert_eq!(a.offset::<Size4K>(), 0x345);

        let b = PhysicalAddress::new(0x13000);
        assert!(b.is_aligned::<Size4K>());
        assert_eq!(b.align_up::<Size4K>(), b);
    }

    #[test]
    fn align_up_saturates_at_the_top() {
        let a = PhysicalAddress::new(u64::MAX - 10);
        assert_eq!(a.align_up::<Size4K>().as_u64(), u64::MAX & !0xFFF);
    }

    #[test]
    fn from_aligned_rejects_offsets() {
        assert!(PhysicalPage::<Size4K>::from_aligned(PhysicalAddress::new(0x2000)).is_some());
        assert!(PhysicalPage::<Size4K>::from_aligned(PhysicalAddress::new(0x2001)).is_none());
    }

    #[test]
    fn next_page_steps_one_frame() {
        let p = PhysicalAddress::new(0x4000).page::<Size4K>();
        assert_eq!(p.next().map(PhysicalPage::base), Some(PhysicalAddress::new(0x5000)));

        let last = PhysicalAddress::new(u64::MAX).page::<Size4K>();
        assert!(last.next().is_none());
    }

    #[test]
    fn virtual_pages_drop_the_offset() {
        let va = VirtualAddress::new(0xFFFF_FFFF_8000_1234);
        let page = va.page::<Size4K>();
        assert_eq!(page.base().as_u64(), 0xFFFF_FFFF_8000_1000);
        assert_eq!(va.offset::<Size4K>(), 0x234);
        assert_eq!(VirtualAddress::from(page), page.base());
    }

    #[test]
    fn formatting() {
        let pa = PhysicalAddress::new(0x1000);
        assert_eq!(format!("{pa:?}"), "PA(0x0000000000001000)");
        assert_eq!(format!("{pa}"), "0x0000000000001000");
        assert_eq!(format!("{}", pa.page::<Size4K>()), "0x0000000000001000/4K");
    }
}
