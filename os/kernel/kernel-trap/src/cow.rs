//! Fork-side half of copy-on-write: sharing a parent page with a child.

use kernel_alloc::PhysicalFrames;
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::{AddressSpace, AddressSpaceError, FrameAlloc, PageEntryBits, TranslationCache};
use log::trace;

#[derive(Debug, thiserror::Error, Copy, Clone, Eq, PartialEq)]
pub enum ShareError {
    #[error("{0} is not mapped in the parent")]
    NotMapped(VirtualAddress),
    #[error("{0} is not a user page")]
    NotUser(VirtualAddress),
    #[error(transparent)]
    Child(#[from] AddressSpaceError),
}

/// Map the parent's page at `va` into the child without copying it.
///
/// Both address spaces end up with the same write-protected entry; pages
/// that were writable are marked copy-on-write. The frame gains one share,
/// except for lazy-zero pages whose placeholder frame is never owned.
///
/// The parent's entry is committed with a compare-and-swap against the
/// snapshot the child's entry was derived from. If it changed in between,
/// the child mapping and the extra share are undone and the page is shared
/// again from the new entry. The parent's stale writable translation is
/// invalidated through `tlb`.
///
/// The caller serializes this against other edits of both address spaces,
/// including page faults in the parent: a fault that commits after the
/// parent's entry was committed here would still break the sharing.
///
/// # Errors
/// - [`ShareError::NotMapped`] / [`ShareError::NotUser`] if the parent has
///   no present user page at `va`.
/// - [`ShareError::Child`] if the child cannot take the mapping; nothing
///   has been changed then.
pub fn share_copy_on_write<F, A, T>(
    frames: &F,
    alloc: &mut A,
    tlb: &T,
    parent: PhysicalPage<Size4K>,
    child: PhysicalPage<Size4K>,
    va: VirtualAddress,
) -> Result<PageEntryBits, ShareError>
where
    F: PhysicalFrames + ?Sized,
    A: FrameAlloc,
    T: TranslationCache + ?Sized,
{
    let page = va.page::<Size4K>();
    let parent_space = AddressSpace::from_root(frames.mapper(), parent);
    let child_space = AddressSpace::from_root(frames.mapper(), child);
    let cell = parent_space
        .walk(page.base())
        .ok_or(ShareError::NotMapped(va))?;

    loop {
        let entry = cell.load();
        if !entry.present() {
            return Err(ShareError::NotMapped(va));
        }
        if !entry.user_access() {
            return Err(ShareError::NotUser(va));
        }

        let shared = entry.write_protected_shared();
        child_space.map_4k(alloc, page.base(), shared)?;

        let owned = !entry.lazy_zero();
        if owned {
            let sharers = frames.increment_share(entry.physical_address());
            trace!("{page}: {} now has {sharers} extra owners", entry.physical_address());
        }

        match cell.compare_exchange(entry, shared) {
            Ok(_) => {
                if shared != entry {
                    tlb.invalidate_page(page);
                }
                return Ok(shared);
            }
            Err(now) => {
                trace!("{page}: parent entry changed to {now:?}, sharing again");
                child_space.unmap_4k(page.base())?;
                if owned {
                    frames.decrement_share(entry.physical_address());
                }
            }
        }
    }
}
