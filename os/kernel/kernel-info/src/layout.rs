//! # Runtime Memory Layout
//!
//! The compile-time constants in [`memory`](crate::memory) describe the
//! machine the kernel is built for; the kernel image end is only known at
//! link time and handed over at boot. [`MemoryLayout`] combines both and is
//! validated once, before any frame is handed to the allocator.

use crate::memory::{BOOT_MAPPED_TOP, FRAME_SIZE, PHYS_LOAD, PHYS_TOP};
use kernel_memory_addresses::{PhysicalAddress, Size4K};

/// Validated boundaries of the physical range managed by the frame allocator.
///
/// A frame `f` is managed iff it is frame-aligned,
/// `f >= kernel_end` and `f < phys_top`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryLayout {
    kernel_end: PhysicalAddress,
    phys_top: PhysicalAddress,
}

#[derive(Debug, thiserror::Error, Copy, Clone, Eq, PartialEq)]
pub enum LayoutError {
    #[error("kernel image end {0} lies below the load address")]
    KernelEndBelowLoad(PhysicalAddress),
    #[error("top of physical memory {0} is not frame aligned")]
    UnalignedTop(PhysicalAddress),
    #[error("no frames between kernel end {kernel_end} and top of memory {phys_top}")]
    Empty {
        kernel_end: PhysicalAddress,
        phys_top: PhysicalAddress,
    },
}

impl MemoryLayout {
    /// Validate a layout.
    ///
    /// `kernel_end` is the first byte past the loaded kernel image and does
    /// not need to be aligned; `phys_top` must be.
    ///
    /// # Errors
    /// Returns a [`LayoutError`] if the kernel end lies at or below
    /// [`PHYS_LOAD`], if `phys_top` is unaligned, or if not a single whole
    /// frame fits between the two.
    pub fn new(kernel_end: PhysicalAddress, phys_top: PhysicalAddress) -> Result<Self, LayoutError> {
        if kernel_end.as_u64() <= PHYS_LOAD {
            return Err(LayoutError::KernelEndBelowLoad(kernel_end));
        }
        if !phys_top.is_aligned::<Size4K>() {
            return Err(LayoutError::UnalignedTop(phys_top));
        }
        if kernel_end.align_up::<Size4K>() >= phys_top {
            return Err(LayoutError::Empty {
                kernel_end,
                phys_top,
            });
        }
        Ok(Self {
            kernel_end,
            phys_top,
        })
    }

    /// Layout for a kernel image ending at `kernel_end` on a machine with
    /// [`PHYS_TOP`] bytes of installed memory.
    ///
    /// # Errors
    /// See [`MemoryLayout::new`].
    pub fn for_kernel_image(kernel_end: PhysicalAddress) -> Result<Self, LayoutError> {
        Self::new(kernel_end, PhysicalAddress::new(PHYS_TOP))
    }

    #[inline]
    #[must_use]
    pub const fn kernel_end(&self) -> PhysicalAddress {
        self.kernel_end
    }

    #[inline]
    #[must_use]
    pub const fn phys_top(&self) -> PhysicalAddress {
        self.phys_top
    }

    /// First managed frame.
    #[inline]
    #[must_use]
    pub const fn first_frame(&self) -> PhysicalAddress {
        self.kernel_end.align_up::<Size4K>()
    }

    /// Whether `frame` may be handed out and taken back by the allocator.
    #[inline]
    #[must_use]
    pub const fn manages(&self, frame: PhysicalAddress) -> bool {
        frame.is_aligned::<Size4K>()
            && frame.as_u64() >= self.kernel_end.as_u64()
            && frame.as_u64() < self.phys_top.as_u64()
    }

    /// Number of frame slots below [`phys_top`](Self::phys_top), i.e. the
    /// share-count capacity this layout requires.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn frame_slots(&self) -> usize {
        (self.phys_top.as_u64() / FRAME_SIZE) as usize
    }

    /// Range released during the first, single-core initialization phase:
    /// everything the boot page table maps above the kernel image.
    #[must_use]
    pub fn boot_range(&self) -> (PhysicalAddress, PhysicalAddress) {
        let end = self.phys_top.min(PhysicalAddress::new(BOOT_MAPPED_TOP));
        (self.kernel_end, end)
    }

    /// Range released when switching to multi-core operation.
    #[must_use]
    pub fn remaining_range(&self) -> (PhysicalAddress, PhysicalAddress) {
        let start = self.boot_range().1.max(self.kernel_end);
        (start, self.phys_top)
    }
}
