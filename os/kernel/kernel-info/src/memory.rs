//! # Memory Layout

use kernel_memory_addresses::{PageSize, Size4K};

/// Size of a physical frame in bytes.
pub const FRAME_SIZE: u64 = Size4K::SIZE;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Where the kernel image is placed in *physical* memory (LMA).
pub const PHYS_LOAD: u64 = 0x0010_0000; // 1 MiB

/// Upper bound of the physical range mapped by the boot page table.
///
/// Frames below this address can be handed to the allocator before the
/// full kernel page table is installed.
pub const BOOT_MAPPED_TOP: u64 = 0x0040_0000; // 4 MiB

/// Top of installed physical memory; frames at or above are never managed.
pub const PHYS_TOP: u64 = 0x0E00_0000; // 224 MiB

/// Number of frames below [`PHYS_TOP`], the capacity of the share-count table.
#[allow(clippy::cast_possible_truncation)]
pub const MAX_FRAMES: usize = (PHYS_TOP / FRAME_SIZE) as usize;

/// Byte pattern written over every released frame.
///
/// Stale readers of a dangling mapping see `0x01` bytes instead of the
/// previous owner's data.
pub const JUNK_BYTE: u8 = 0x01;

const _: () = {
    assert!(PHYS_LOAD.is_multiple_of(FRAME_SIZE));
    assert!(BOOT_MAPPED_TOP.is_multiple_of(FRAME_SIZE));
    assert!(PHYS_TOP.is_multiple_of(FRAME_SIZE));
    assert!(PHYS_LOAD < BOOT_MAPPED_TOP);
    assert!(BOOT_MAPPED_TOP <= PHYS_TOP);
    assert!(HHDM_BASE.checked_add(PHYS_TOP).is_some());
};
