//! # Physical Frame Allocator with Share Counts
//!
//! All physical memory between the end of the kernel image and the top of
//! installed memory is handed out in 4 KiB frames. Free frames form a LIFO
//! list threaded through the frames themselves; every managed frame also has
//! a **share count** that copy-on-write uses to track additional owners.
//!
//! ```text
//!  release(f):  share[f] > 0 ?  ──yes──▶ share[f] -= 1         (Unshared)
//!                    │
//!                    no
//!                    ▼
//!               fill f with JUNK_BYTE, push f                  (Freed)
//! ```
//!
//! ## Two-phase initialization
//!
//! 1. [`FrameAllocator::boot`] hands out a [`BootFrameAllocator`] borrowing
//!    the allocator exclusively. Only one core runs, so nothing is locked;
//!    the frames mapped by the boot page table are released through it.
//! 2. [`BootFrameAllocator::into_shared`] releases the remaining range and
//!    turns the exclusive borrow into a shared one. From then on every
//!    operation takes the `kmem` spin lock.
//!
//! Exclusivity is enforced by the borrow checker: there is no way to reach
//! the allocator through a shared reference while the boot phase lasts.

use crate::{PhysicalFrames, ReleaseOutcome};
use crate::free_list::FreeList;
use kernel_info::layout::MemoryLayout;
use kernel_info::memory::{FRAME_SIZE, JUNK_BYTE, MAX_FRAMES};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_sync::SpinLock;
use kernel_vmem::{FrameAlloc, PhysMapper, fill_frame};
use log::{error, info, trace};

#[derive(Debug, thiserror::Error, Copy, Clone, Eq, PartialEq)]
pub enum FrameAllocError {
    #[error("no free physical frames left")]
    Exhausted,
    #[error("layout spans {frames} frames but the share table holds {capacity}")]
    CapacityExceeded { frames: usize, capacity: usize },
}

/// A frame that passed validation against the layout.
#[derive(Copy, Clone)]
struct ManagedFrame {
    page: PhysicalPage<Size4K>,
    index: usize,
}

impl ManagedFrame {
    /// Validate `frame` for `op`.
    ///
    /// # Panics
    /// If `frame` is misaligned, lies below the kernel end or at or above
    /// the top of managed memory.
    #[allow(clippy::cast_possible_truncation)]
    fn validate(layout: &MemoryLayout, frame: PhysicalAddress, op: &'static str) -> Self {
        if !layout.manages(frame) {
            error!(
                "{op}: {frame} is not a managed frame (kernel end {}, top {})",
                layout.kernel_end(),
                layout.phys_top()
            );
            panic!("{op}: invalid frame {frame}");
        }
        let page = frame.page::<Size4K>();
        Self {
            page,
            index: page.index() as usize,
        }
    }
}

/// Everything the `kmem` lock protects.
struct FrameState<const N: usize> {
    free: FreeList,
    shares: [u32; N],
}

impl<const N: usize> FrameState<N> {
    const fn new() -> Self {
        Self {
            free: FreeList::new(),
            shares: [0; N],
        }
    }

    fn allocate<M: PhysMapper>(&mut self, mapper: &M) -> Result<PhysicalPage<Size4K>, FrameAllocError> {
        // SAFETY: only managed frames reachable through `mapper` are pushed.
        unsafe { self.free.pop(mapper) }.ok_or(FrameAllocError::Exhausted)
    }

    fn release<M: PhysMapper>(&mut self, mapper: &M, frame: ManagedFrame) -> ReleaseOutcome {
        let share = &mut self.shares[frame.index];
        if *share > 0 {
            *share -= 1;
            return ReleaseOutcome::Unshared { remaining: *share };
        }

        // SAFETY: the last owner gave the frame back; it is ours now.
        unsafe {
            fill_frame(mapper, frame.page, JUNK_BYTE);
            self.free.push(mapper, frame.page);
        }
        ReleaseOutcome::Freed
    }

    fn increment_share(&mut self, frame: ManagedFrame) -> u32 {
        let share = &mut self.shares[frame.index];
        *share += 1;
        *share
    }

    fn decrement_share(&mut self, frame: ManagedFrame) -> u32 {
        let share = &mut self.shares[frame.index];
        let Some(remaining) = share.checked_sub(1) else {
            error!("decrement_share: {} has no additional sharers", frame.page);
            panic!("decrement_share: share count underflow on {}", frame.page);
        };
        *share = remaining;
        remaining
    }

    const fn share_count(&self, frame: ManagedFrame) -> u32 {
        self.shares[frame.index]
    }
}

/// The physical frame allocator.
///
/// `N` is the capacity of the share-count table in frames; it must cover
/// every frame below the layout's top of memory. Kernels use the default
/// [`MAX_FRAMES`]; tests pick something small.
///
/// The share table is stored inline, so kernels place the allocator in a
/// `static` or leak it from the boot stack rather than moving it around.
pub struct FrameAllocator<M: PhysMapper, const N: usize = MAX_FRAMES> {
    mapper: M,
    layout: MemoryLayout,
    state: SpinLock<FrameState<N>>,
}

impl<M: PhysMapper, const N: usize> FrameAllocator<M, N> {
    /// An allocator for `layout` with an empty free list and all share
    /// counts at zero. No frame is touched until it is released.
    ///
    /// # Errors
    /// [`FrameAllocError::CapacityExceeded`] if the share table cannot cover
    /// every frame below `layout.phys_top()`.
    pub fn new(mapper: M, layout: MemoryLayout) -> Result<Self, FrameAllocError> {
        let frames = layout.frame_slots();
        if frames > N {
            return Err(FrameAllocError::CapacityExceeded {
                frames,
                capacity: N,
            });
        }
        Ok(Self {
            mapper,
            layout,
            state: SpinLock::named("kmem", FrameState::new()),
        })
    }

    #[inline]
    #[must_use]
    pub const fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Enter the single-core boot phase.
    pub fn boot(&mut self) -> BootFrameAllocator<'_, M, N> {
        info!(
            "frame allocator: boot phase, managing {} .. {}",
            self.layout.first_frame(),
            self.layout.phys_top()
        );
        BootFrameAllocator { inner: self }
    }

    /// Take a free frame. Contents are unspecified (junk-filled or stale).
    ///
    /// # Errors
    /// [`FrameAllocError::Exhausted`] if no frame is free.
    pub fn allocate(&self) -> Result<PhysicalPage<Size4K>, FrameAllocError> {
        self.state.with_lock(|s| s.allocate(&self.mapper))
    }

    /// Give up one ownership of `frame`.
    ///
    /// If others still share the frame, only the share count drops;
    /// otherwise the frame is junk-filled and becomes free.
    ///
    /// # Panics
    /// If `frame` is misaligned, below the kernel end or at or above the top
    /// of managed memory.
    pub fn release(&self, frame: PhysicalAddress) -> ReleaseOutcome {
        let frame = ManagedFrame::validate(&self.layout, frame, "release");
        self.state.with_lock(|s| s.release(&self.mapper, frame))
    }

    /// Record one more sharer of `frame`; returns the new count.
    ///
    /// # Panics
    /// On an invalid frame, see [`release`](Self::release).
    pub fn increment_share(&self, frame: PhysicalAddress) -> u32 {
        let frame = ManagedFrame::validate(&self.layout, frame, "increment_share");
        self.state.with_lock(|s| s.increment_share(frame))
    }

    /// Drop one sharer of `frame` without freeing it; returns the new count.
    ///
    /// # Panics
    /// On an invalid frame or if the count is already zero.
    pub fn decrement_share(&self, frame: PhysicalAddress) -> u32 {
        let frame = ManagedFrame::validate(&self.layout, frame, "decrement_share");
        self.state.with_lock(|s| s.decrement_share(frame))
    }

    /// Number of additional sharers of `frame`.
    ///
    /// # Panics
    /// On an invalid frame, see [`release`](Self::release).
    pub fn share_count(&self, frame: PhysicalAddress) -> u32 {
        let frame = ManagedFrame::validate(&self.layout, frame, "share_count");
        self.state.with_lock(|s| s.share_count(frame))
    }

    /// Number of frames currently on the free list.
    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.state.with_lock(|s| s.free.len())
    }
}

impl<M: PhysMapper, const N: usize> core::fmt::Debug for FrameAllocator<M, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameAllocator")
            .field("layout", &self.layout)
            .field("lock", &self.state.name())
            .field("capacity", &N)
            .finish_non_exhaustive()
    }
}

impl<M: PhysMapper, const N: usize> PhysicalFrames for FrameAllocator<M, N> {
    type Mapper = M;

    #[inline]
    fn mapper(&self) -> &M {
        &self.mapper
    }

    #[inline]
    fn allocate(&self) -> Result<PhysicalPage<Size4K>, FrameAllocError> {
        Self::allocate(self)
    }

    #[inline]
    fn release(&self, frame: PhysicalAddress) -> ReleaseOutcome {
        Self::release(self, frame)
    }

    #[inline]
    fn increment_share(&self, frame: PhysicalAddress) -> u32 {
        Self::increment_share(self, frame)
    }

    #[inline]
    fn decrement_share(&self, frame: PhysicalAddress) -> u32 {
        Self::decrement_share(self, frame)
    }

    #[inline]
    fn share_count(&self, frame: PhysicalAddress) -> u32 {
        Self::share_count(self, frame)
    }
}

/// Lets the shared allocator feed page-table construction.
impl<M: PhysMapper, const N: usize> FrameAlloc for &FrameAllocator<M, N> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        FrameAllocator::allocate(*self).ok()
    }
}

/// Exclusive, lock-free access to the allocator during boot.
pub struct BootFrameAllocator<'a, M: PhysMapper, const N: usize = MAX_FRAMES> {
    inner: &'a mut FrameAllocator<M, N>,
}

impl<'a, M: PhysMapper, const N: usize> BootFrameAllocator<'a, M, N> {
    fn parts(&mut self) -> (&M, &MemoryLayout, &mut FrameState<N>) {
        let FrameAllocator {
            mapper,
            layout,
            state,
        } = &mut *self.inner;
        (&*mapper, &*layout, state.get_mut())
    }

    /// See [`FrameAllocator::allocate`].
    ///
    /// # Errors
    /// [`FrameAllocError::Exhausted`] if no frame is free.
    pub fn allocate(&mut self) -> Result<PhysicalPage<Size4K>, FrameAllocError> {
        let (mapper, _, state) = self.parts();
        state.allocate(mapper)
    }

    /// See [`FrameAllocator::release`].
    pub fn release(&mut self, frame: PhysicalAddress) -> ReleaseOutcome {
        let (mapper, layout, state) = self.parts();
        let frame = ManagedFrame::validate(layout, frame, "release");
        state.release(mapper, frame)
    }

    /// See [`FrameAllocator::increment_share`].
    pub fn increment_share(&mut self, frame: PhysicalAddress) -> u32 {
        let (_, layout, state) = self.parts();
        let frame = ManagedFrame::validate(layout, frame, "increment_share");
        state.increment_share(frame)
    }

    /// See [`FrameAllocator::decrement_share`].
    pub fn decrement_share(&mut self, frame: PhysicalAddress) -> u32 {
        let (_, layout, state) = self.parts();
        let frame = ManagedFrame::validate(layout, frame, "decrement_share");
        state.decrement_share(frame)
    }

    /// See [`FrameAllocator::share_count`].
    pub fn share_count(&mut self, frame: PhysicalAddress) -> u32 {
        let (_, layout, state) = self.parts();
        let frame = ManagedFrame::validate(layout, frame, "share_count");
        state.share_count(frame)
    }

    pub fn free_frames(&mut self) -> usize {
        self.parts().2.free.len()
    }

    /// Release every whole frame in `[align_up(start), end)`; returns how
    /// many went onto the free list. Shared frames only lose a share.
    ///
    /// # Panics
    /// If the range contains unmanaged frames.
    pub fn release_range(&mut self, start: PhysicalAddress, end: PhysicalAddress) -> usize {
        let mut frame = start.align_up::<Size4K>();
        let mut freed = 0;
        let mut unshared = 0;
        while let Some(next) = frame.checked_add(FRAME_SIZE)
            && next <= end
        {
            match self.release(frame) {
                ReleaseOutcome::Freed => freed += 1,
                ReleaseOutcome::Unshared { .. } => unshared += 1,
            }
            frame = next;
        }
        trace!("freed {freed} frames in {start} .. {end} ({unshared} only unshared)");
        freed
    }

    /// Release `[start, end)` and switch to locked, multi-core operation.
    pub fn into_shared(mut self, start: PhysicalAddress, end: PhysicalAddress) -> &'a FrameAllocator<M, N> {
        self.release_range(start, end);
        let free = self.free_frames();
        let Self { inner } = self;
        info!("frame allocator: shared phase, {free} frames free");
        inner
    }
}

impl<M: PhysMapper, const N: usize> FrameAlloc for BootFrameAllocator<'_, M, N> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.allocate().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_vmem::testing::TestPhys;

    const BASE: u64 = 0x0010_0000;

    fn layout(frames: u64) -> MemoryLayout {
        let top = PhysicalAddress::new(BASE + frames * FRAME_SIZE);
        MemoryLayout::new(PhysicalAddress::new(BASE + 1), top).unwrap()
    }

    fn pa(v: u64) -> PhysicalAddress {
        PhysicalAddress::new(BASE + v)
    }

    #[test]
    fn too_small_share_table_is_rejected() {
        let ram = TestPhys::new(PhysicalAddress::new(BASE), 4);
        let err = FrameAllocator::<_, 16>::new(&ram, layout(4)).unwrap_err();
        assert_eq!(
            err,
            FrameAllocError::CapacityExceeded {
                frames: 260,
                capacity: 16
            }
        );
    }

    #[test]
    fn boot_phase_works_without_the_lock() {
        let ram = TestPhys::new(PhysicalAddress::new(BASE), 4);
        let mut frames = FrameAllocator::<_, 512>::new(&ram, layout(4)).unwrap();
        let mut boot = frames.boot();

        // The first frame overlaps the kernel image end.
        assert_eq!(boot.release_range(pa(1), pa(0x4000)), 3);
        assert_eq!(boot.free_frames(), 3);

        let f = boot.allocate().unwrap();
        assert_eq!(boot.increment_share(f.base()), 1);
        assert_eq!(boot.share_count(f.base()), 1);
        assert_eq!(boot.release(f.base()), ReleaseOutcome::Unshared { remaining: 0 });
        assert_eq!(boot.release(f.base()), ReleaseOutcome::Freed);
        assert_eq!(boot.free_frames(), 3);
    }

    #[test]
    fn partial_trailing_frame_is_skipped() {
        let ram = TestPhys::new(PhysicalAddress::new(BASE), 4);
        let mut frames = FrameAllocator::<_, 512>::new(&ram, layout(4)).unwrap();
        let mut boot = frames.boot();
        assert_eq!(boot.release_range(pa(0x1000), pa(0x2fff)), 1);
    }

    #[test]
    fn release_range_counts_only_freed_frames() {
        let ram = TestPhys::new(PhysicalAddress::new(BASE), 4);
        let mut frames = FrameAllocator::<_, 512>::new(&ram, layout(4)).unwrap();
        let mut boot = frames.boot();
        assert_eq!(boot.release_range(pa(0x1000), pa(0x4000)), 3);

        // LIFO: the last frame released comes back first.
        let a = boot.allocate().unwrap();
        let b = boot.allocate().unwrap();
        assert_eq!((a.base(), b.base()), (pa(0x3000), pa(0x2000)));
        assert_eq!(boot.increment_share(b.base()), 1);

        // `a` goes back, `b` merely drops its extra sharer.
        assert_eq!(boot.release_range(pa(0x2000), pa(0x4000)), 1);
        assert_eq!(boot.share_count(b.base()), 0);
        assert_eq!(boot.free_frames(), 2);
    }
}
