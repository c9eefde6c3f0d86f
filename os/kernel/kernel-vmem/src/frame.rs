//! Whole-frame content operations through a [`PhysMapper`].

use crate::PhysMapper;
use kernel_memory_addresses::{PageSize, PhysicalPage, Size4K};

#[allow(clippy::cast_possible_truncation)]
const FRAME_BYTES: usize = Size4K::SIZE as usize;

/// Overwrite every byte of `frame` with `byte`.
///
/// # Safety
/// The caller must own `frame`: no other core or mapping may access it
/// concurrently.
pub unsafe fn fill_frame<M: PhysMapper>(mapper: &M, frame: PhysicalPage<Size4K>, byte: u8) {
    let dst = mapper.phys_to_ptr::<u8>(frame.base());
    // SAFETY: the mapper reaches all 4096 bytes; ownership per contract.
    unsafe { core::ptr::write_bytes(dst, byte, FRAME_BYTES) };
}

/// Zero every byte of `frame`.
///
/// # Safety
/// See [`fill_frame`].
pub unsafe fn zero_frame<M: PhysMapper>(mapper: &M, frame: PhysicalPage<Size4K>) {
    unsafe { fill_frame(mapper, frame, 0) };
}

/// Copy all 4096 bytes of `from` into `to`.
///
/// # Safety
/// The caller must own `to` exclusively and `from` must not be written
/// while the copy runs. The frames must differ.
pub unsafe fn copy_frame<M: PhysMapper>(
    mapper: &M,
    from: PhysicalPage<Size4K>,
    to: PhysicalPage<Size4K>,
) {
    debug_assert_ne!(from, to, "copy onto itself");
    let src = mapper.phys_to_ptr::<u8>(from.base()).cast_const();
    let dst = mapper.phys_to_ptr::<u8>(to.base());
    // SAFETY: distinct frames never overlap; ownership per contract.
    unsafe { core::ptr::copy_nonoverlapping(src, dst, FRAME_BYTES) };
}
