//! # Kernel Physical Memory Allocation
//!
//! This crate owns every physical frame between the end of the kernel image
//! and the top of installed memory. It hands frames out to page tables,
//! kernel stacks and user pages, takes them back, and tracks how many
//! address spaces share a frame after a copy-on-write fork.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │         Page-fault path / fork / teardown           │
//! │    • generic over PhysicalFrames                    │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │           Physical Frame Allocator                  │
//! │    • LIFO free list inside the free frames          │
//! │    • Share count per frame                          │
//! │    • Two-phase boot, then the `kmem` spin lock      │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Physical Mapper                        │
//! │    • HHDM (Higher Half Direct Mapping)              │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Physical Frame Allocator ([`frame_alloc`])
//!
//! * **No-Heap Design**: the free list lives in the free frames; the share
//!   table is a fixed array sized for the machine.
//! * **Poisoning**: frames are filled with
//!   [`JUNK_BYTE`](kernel_info::memory::JUNK_BYTE) on release; allocation
//!   does not zero.
//! * **Share counts**: a count of `k` means `k` owners besides the first;
//!   releasing a shared frame only drops the count.
//!
//! ### Physical Mapper ([`phys_mapper`])
//!
//! Physical-to-virtual translation through the higher-half direct map.
//!
//! ### Global instance ([`global`])
//!
//! The allocator the running kernel installed after boot.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::{FrameAllocator, ReleaseOutcome};
//! use kernel_info::layout::MemoryLayout;
//! use kernel_memory_addresses::PhysicalAddress;
//! use kernel_vmem::testing::TestPhys;
//!
//! let ram = TestPhys::new(PhysicalAddress::new(0x0010_0000), 8);
//! let layout = MemoryLayout::new(PhysicalAddress::new(0x0010_0800), ram.end()).unwrap();
//! let mut allocator = FrameAllocator::<_, 512>::new(&ram, layout).unwrap();
//!
//! let mut boot = allocator.boot();
//! boot.release_range(layout.kernel_end(), PhysicalAddress::new(0x0010_4000));
//! let frames = boot.into_shared(PhysicalAddress::new(0x0010_4000), layout.phys_top());
//!
//! let frame = frames.allocate().unwrap();
//! frames.increment_share(frame.base());
//! assert_eq!(frames.release(frame.base()), ReleaseOutcome::Unshared { remaining: 0 });
//! assert_eq!(frames.release(frame.base()), ReleaseOutcome::Freed);
//! ```
//!
//! ## Integration Points
//!
//! * **kernel-vmem**: page-table types, [`PhysMapper`] and [`FrameAlloc`](kernel_vmem::FrameAlloc)
//! * **kernel-info**: memory layout constants and [`MemoryLayout`](kernel_info::layout::MemoryLayout)
//! * **kernel-sync**: the `kmem` spin lock and the once-cell behind [`global`]

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod frame_alloc;
mod free_list;
pub mod global;
pub mod phys_mapper;

pub use crate::frame_alloc::{BootFrameAllocator, FrameAllocError, FrameAllocator};

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::PhysMapper;

/// What [`PhysicalFrames::release`] did with the frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReleaseOutcome {
    /// The caller was the last owner; the frame is free again.
    Freed,
    /// Other owners remain; only the share count dropped.
    Unshared { remaining: u32 },
}

/// Shared-reference access to a physical frame pool with share counts.
///
/// Implemented by [`FrameAllocator`]; code that only needs frames (the
/// page-fault resolver, fork) is generic over this trait so it can run
/// against a simulated pool in tests.
///
/// All methods that take a frame panic if the frame is not managed by the
/// pool.
pub trait PhysicalFrames {
    type Mapper: PhysMapper;

    /// How the pool's frames are reached from the current address space.
    fn mapper(&self) -> &Self::Mapper;

    /// Take a free frame with unspecified contents.
    ///
    /// # Errors
    /// [`FrameAllocError::Exhausted`] if none is left.
    fn allocate(&self) -> Result<PhysicalPage<Size4K>, FrameAllocError>;

    /// Give up one ownership of `frame`.
    fn release(&self, frame: PhysicalAddress) -> ReleaseOutcome;

    fn increment_share(&self, frame: PhysicalAddress) -> u32;

    /// # Panics
    /// If the share count is already zero.
    fn decrement_share(&self, frame: PhysicalAddress) -> u32;

    fn share_count(&self, frame: PhysicalAddress) -> u32;
}
