//! The kernel-wide frame allocator.
//!
//! Boot builds the allocator, runs both initialization phases and then
//! publishes the shared reference here exactly once. Everything after boot
//! (fork, the page-fault path, process teardown) reaches physical memory
//! through [`frames`].

use crate::frame_alloc::FrameAllocator;
use crate::phys_mapper::HhdmPhysMapper;
use kernel_sync::SyncOnceCell;
use log::info;

/// The allocator as configured for the running kernel.
pub type KernelFrames = FrameAllocator<HhdmPhysMapper>;

static FRAMES: SyncOnceCell<&'static KernelFrames> = SyncOnceCell::new();

#[derive(Debug, thiserror::Error, Copy, Clone, Eq, PartialEq)]
pub enum InstallError {
    #[error("the kernel frame allocator is already installed")]
    AlreadyInstalled,
}

/// Publish the shared allocator.
///
/// # Errors
/// [`InstallError::AlreadyInstalled`] on every call after the first.
pub fn install(frames: &'static KernelFrames) -> Result<(), InstallError> {
    FRAMES
        .set(frames)
        .map(|_| ())
        .map_err(|_| InstallError::AlreadyInstalled)?;
    info!("kernel frame allocator installed: {frames:?}");
    Ok(())
}

/// The installed allocator, if boot got that far.
#[inline]
#[must_use]
pub fn frames() -> Option<&'static KernelFrames> {
    FRAMES.get().copied()
}
