//! Host-side stand-ins for physical memory.
//!
//! [`TestPhys`] simulates a contiguous slab of RAM starting at an arbitrary
//! physical base, so code under test sees realistic frame addresses (above
//! the kernel image, below a top of memory) while every access lands in an
//! ordinary heap allocation.

use crate::{FrameAlloc, PhysMapper, TranslationCache};
use alloc::vec::Vec;
use core::cell::{RefCell, UnsafeCell};
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K, VirtualPage};

#[allow(clippy::cast_possible_truncation)]
const FRAME_BYTES: usize = Size4K::SIZE as usize;

/// A 4 KiB-aligned raw frame.
#[repr(C, align(4096))]
struct Frame(UnsafeCell<[u8; FRAME_BYTES]>);

/// In-memory "RAM" covering `[base, base + frames * 4096)`.
pub struct TestPhys {
    base: PhysicalAddress,
    frames: Vec<Frame>,
}

// SAFETY: all access goes through raw pointers handed out by `phys_to_ptr`;
// synchronizing those accesses is the job of the code under test.
unsafe impl Sync for TestPhys {}

impl TestPhys {
    /// RAM of `frames` zeroed frames starting at `base`.
    ///
    /// # Panics
    /// If `base` is not frame aligned.
    #[must_use]
    pub fn new(base: PhysicalAddress, frames: usize) -> Self {
        assert!(base.is_aligned::<Size4K>(), "unaligned RAM base {base}");
        let frames = (0..frames)
            .map(|_| Frame(UnsafeCell::new([0; FRAME_BYTES])))
            .collect();
        Self { base, frames }
    }

    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    /// First address past the simulated RAM.
    #[must_use]
    pub fn end(&self) -> PhysicalAddress {
        self.base + self.frames.len() as u64 * Size4K::SIZE
    }

    /// Snapshot of the contents of `frame`.
    #[must_use]
    pub fn read(&self, frame: PhysicalPage<Size4K>) -> [u8; FRAME_BYTES] {
        let src = self.phys_to_ptr::<[u8; FRAME_BYTES]>(frame.base());
        // SAFETY: in bounds per `phys_to_ptr`; tests read quiescent frames.
        unsafe { src.read() }
    }

    /// Overwrite `frame` with `bytes`.
    pub fn write(&self, frame: PhysicalPage<Size4K>, bytes: &[u8; FRAME_BYTES]) {
        let dst = self.phys_to_ptr::<[u8; FRAME_BYTES]>(frame.base());
        // SAFETY: in bounds per `phys_to_ptr`; tests write quiescent frames.
        unsafe { dst.write(*bytes) };
    }
}

impl PhysMapper for TestPhys {
    #[allow(clippy::cast_possible_truncation)]
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        let offset = pa
            .as_u64()
            .checked_sub(self.base.as_u64())
            .map(|o| o as usize)
            .filter(|o| *o < self.frames.len() * FRAME_BYTES);
        let Some(offset) = offset else {
            panic!("{pa} lies outside the simulated RAM");
        };
        let frame = self.frames[offset / FRAME_BYTES].0.get().cast::<u8>();
        frame.wrapping_add(offset % FRAME_BYTES).cast()
    }
}

/// A trivial **bump** allocator: always hands out the next 4 KiB frame.
///
/// Only keeps a cursor and "bumps" it by 4096 on each alloc; there is no
/// reuse.
pub struct BumpFrames {
    next: PhysicalAddress,
    end: PhysicalAddress,
    allocated: usize,
}

impl BumpFrames {
    #[must_use]
    pub const fn new(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        Self {
            next: start,
            end,
            allocated: 0,
        }
    }

    /// Frames handed out so far.
    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.allocated
    }
}

impl FrameAlloc for BumpFrames {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        let next = self.next.checked_add(Size4K::SIZE)?;
        if next > self.end {
            return None;
        }
        let frame = self.next.page();
        self.next = next;
        self.allocated += 1;
        Some(frame)
    }
}

/// Remembers every page it was asked to invalidate.
#[derive(Default)]
pub struct RecordingTlb {
    invalidated: RefCell<Vec<VirtualPage<Size4K>>>,
}

impl RecordingTlb {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages invalidated so far, oldest first.
    #[must_use]
    pub fn invalidated(&self) -> Vec<VirtualPage<Size4K>> {
        self.invalidated.borrow().clone()
    }

    pub fn clear(&self) {
        self.invalidated.borrow_mut().clear();
    }
}

impl TranslationCache for RecordingTlb {
    fn invalidate_page(&self, page: VirtualPage<Size4K>) {
        self.invalidated.borrow_mut().push(page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_map_into_the_right_frame() {
        let ram = TestPhys::new(PhysicalAddress::new(0x0010_0000), 4);
        let frame = PhysicalAddress::new(0x0010_2000).page::<Size4K>();

        let mut bytes = [0u8; FRAME_BYTES];
        bytes[17] = 0xAB;
        ram.write(frame, &bytes);

        let p = ram.phys_to_ptr::<u8>(PhysicalAddress::new(0x0010_2011));
        // SAFETY: in bounds, nobody else touches the RAM.
        assert_eq!(unsafe { p.read() }, 0xAB);
        assert_eq!(ram.read(frame)[17], 0xAB);
        assert_eq!(ram.end(), PhysicalAddress::new(0x0010_4000));
    }

    #[test]
    #[should_panic(expected = "outside the simulated RAM")]
    fn out_of_range_access_panics() {
        let ram = TestPhys::new(PhysicalAddress::new(0x0010_0000), 1);
        let _ = ram.phys_to_ptr::<u8>(PhysicalAddress::new(0x0010_1000));
    }

    #[test]
    fn recording_tlb_keeps_order() {
        use kernel_memory_addresses::VirtualAddress;

        let tlb = RecordingTlb::new();
        let a = VirtualAddress::new(0x4000).page();
        let b = VirtualAddress::new(0x2000).page();
        tlb.invalidate_page(a);
        (&tlb).invalidate_page(b);
        assert_eq!(tlb.invalidated(), [a, b]);
        tlb.clear();
        assert!(tlb.invalidated().is_empty());
    }

    #[test]
    fn bump_frames_stop_at_the_end() {
        let mut bump = BumpFrames::new(PhysicalAddress::new(0x1000), PhysicalAddress::new(0x3000));
        assert_eq!(bump.alloc_4k().map(PhysicalPage::base), Some(PhysicalAddress::new(0x1000)));
        assert_eq!(bump.alloc_4k().map(PhysicalPage::base), Some(PhysicalAddress::new(0x2000)));
        assert!(bump.alloc_4k().is_none());
        assert_eq!(bump.allocated(), 2);
    }
}
