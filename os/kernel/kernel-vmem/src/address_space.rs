//! # Address Space (x86-64, PML4-rooted)
//!
//! Helpers to walk and edit a **single** virtual address space rooted at a
//! PML4 frame.
//!
//! - [`AddressSpace::walk`] finds the leaf entry of a 4 KiB page without
//!   creating anything; this is what the page-fault path uses.
//! - [`AddressSpace::walk_or_create`] allocates missing intermediate tables.
//! - [`AddressSpace::map_4k`] / [`AddressSpace::unmap_4k`] install and remove
//!   single leaves.
//! - [`AddressSpace::query`] translates a VA to a PA.
//!
//! ## Safety
//!
//! - Mutating active mappings requires **TLB maintenance** by the caller.
//! - The provided [`PhysMapper`] must reach every table frame of the space.

use crate::page_table::{Level, PageEntryCell, PageTable};
use crate::{FrameAlloc, PageEntryBits, PhysMapper};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use log::trace;

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalPage<Size4K>, // PML4 frame
    mapper: &'m M,
}

#[derive(Debug, thiserror::Error, Copy, Clone, Eq, PartialEq)]
pub enum AddressSpaceError {
    #[error("out of frames for page tables")]
    OutOfFrames,
    #[error("{0} is already mapped")]
    AlreadyMapped(VirtualAddress),
    #[error("{0} is not mapped")]
    NotMapped(VirtualAddress),
    #[error("{0} is covered by a large page")]
    LargePage(VirtualAddress),
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// View an existing address space rooted at `root`.
    #[inline]
    pub const fn from_root(mapper: &'m M, root: PhysicalPage<Size4K>) -> Self {
        Self { root, mapper }
    }

    /// Create an empty address space with a freshly allocated root table.
    ///
    /// # Errors
    /// [`AddressSpaceError::OutOfFrames`] if `alloc` has nothing left.
    pub fn create<A: FrameAlloc>(mapper: &'m M, alloc: &mut A) -> Result<Self, AddressSpaceError> {
        let root = alloc.alloc_4k().ok_or(AddressSpaceError::OutOfFrames)?;
        let space = Self::from_root(mapper, root);
        space.table(root.base()).clear();
        Ok(space)
    }

    /// Physical page of the PML4.
    #[inline]
    pub const fn root_page(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    #[inline]
    fn table(&self, frame: PhysicalAddress) -> &'m PageTable {
        // SAFETY: `frame` is the root or was linked into the tree by this
        // type; table frames stay owned by the space while it is walked.
        unsafe { self.mapper.phys_to_ref::<PageTable>(frame) }
    }

    /// Leaf (L1) entry for the 4 KiB page containing `va`.
    ///
    /// Returns `None` if an intermediate table is missing or a large page
    /// covers `va`. The returned entry itself may be not-present.
    #[must_use]
    pub fn walk(&self, va: VirtualAddress) -> Option<&'m PageEntryCell> {
        let mut table = self.table(self.root.base());
        for level in [Level::L4, Level::L3, Level::L2] {
            let e = table.entry_for(level, va).load();
            if !e.present() || e.large_page() {
                return None;
            }
            table = self.table(e.physical_address());
        }
        Some(table.entry_for(Level::L1, va))
    }

    /// Like [`walk`](Self::walk), but allocates and links missing tables.
    ///
    /// Table creation is not synchronized; the owner of the address space
    /// must serialize calls that may add tables.
    ///
    /// # Errors
    /// - [`AddressSpaceError::OutOfFrames`] if a table frame cannot be allocated.
    /// - [`AddressSpaceError::LargePage`] if a large page covers `va`.
    pub fn walk_or_create<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
    ) -> Result<&'m PageEntryCell, AddressSpaceError> {
        let mut table = self.table(self.root.base());
        for level in [Level::L4, Level::L3, Level::L2] {
            let cell = table.entry_for(level, va);
            let e = cell.load();
            if e.large_page() {
                return Err(AddressSpaceError::LargePage(va));
            }
            let next = if e.present() {
                e.physical_address()
            } else {
                let frame = alloc.alloc_4k().ok_or(AddressSpaceError::OutOfFrames)?;
                self.table(frame.base()).clear();
                cell.store(PageEntryBits::table_link(frame.base()));
                trace!("linked {level:?} entry for {va} to new table {frame}");
                frame.base()
            };
            table = self.table(next);
        }
        Ok(table.entry_for(Level::L1, va))
    }

    /// Map the 4 KiB page containing `va` with the leaf `entry`.
    ///
    /// # Errors
    /// [`AddressSpaceError::AlreadyMapped`] if a present leaf exists, plus
    /// everything [`walk_or_create`](Self::walk_or_create) reports.
    pub fn map_4k<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        entry: PageEntryBits,
    ) -> Result<(), AddressSpaceError> {
        debug_assert!(entry.is_consistent(), "inconsistent leaf {entry:?}");
        let cell = self.walk_or_create(alloc, va)?;
        if cell.load().present() {
            return Err(AddressSpaceError::AlreadyMapped(va));
        }
        cell.store(entry);
        Ok(())
    }

    /// Remove the leaf for `va` and return what it held.
    ///
    /// # Errors
    /// [`AddressSpaceError::NotMapped`] if there is no present leaf.
    pub fn unmap_4k(&self, va: VirtualAddress) -> Result<PageEntryBits, AddressSpaceError> {
        let cell = self.walk(va).ok_or(AddressSpaceError::NotMapped(va))?;
        let old = cell.load();
        if !old.present() {
            return Err(AddressSpaceError::NotMapped(va));
        }
        cell.store(PageEntryBits::new());
        Ok(old)
    }

    /// Translate a `VirtualAddress` to `PhysicalAddress` if mapped.
    #[must_use]
    pub fn query(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let e = self.walk(va)?.load();
        e.present()
            .then(|| e.physical_address() + va.offset::<Size4K>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BumpFrames, TestPhys};

    const BASE: PhysicalAddress = PhysicalAddress::new(0x0010_0000);
    const VA: VirtualAddress = VirtualAddress::new(0x0000_0040_0020_3000);

    fn setup() -> (TestPhys, BumpFrames) {
        let phys = TestPhys::new(BASE, 32);
        let alloc = BumpFrames::new(phys.base(), phys.end());
        (phys, alloc)
    }

    #[test]
    fn map_4k_creates_tables_and_leaf() {
        let (phys, mut alloc) = setup();
        let space = AddressSpace::create(&phys, &mut alloc).unwrap();
        let frame = PhysicalAddress::new(0x0030_0000);

        assert!(space.walk(VA).is_none(), "no tables yet");
        space
            .map_4k(&mut alloc, VA, PageEntryBits::user_page(frame, true))
            .unwrap();

        // root + PDPT + PD + PT
        assert_eq!(alloc.allocated(), 4);

        let leaf = space.walk(VA).unwrap().load();
        assert!(leaf.present() && leaf.writable() && leaf.user_access());
        assert_eq!(leaf.physical_address(), frame);
        assert_eq!(space.query(VA + 0x123), Some(frame + 0x123));
    }

    #[test]
    fn neighbouring_pages_share_tables() {
        let (phys, mut alloc) = setup();
        let space = AddressSpace::create(&phys, &mut alloc).unwrap();
        let frame = PhysicalAddress::new(0x0030_0000);

        space
            .map_4k(&mut alloc, VA, PageEntryBits::user_page(frame, false))
            .unwrap();
        space
            .map_4k(&mut alloc, VA + 0x1000, PageEntryBits::user_page(frame, false))
            .unwrap();
        assert_eq!(alloc.allocated(), 4);
    }

    #[test]
    fn map_twice_is_rejected() {
        let (phys, mut alloc) = setup();
        let space = AddressSpace::create(&phys, &mut alloc).unwrap();
        let entry = PageEntryBits::user_page(PhysicalAddress::new(0x0030_0000), true);

        space.map_4k(&mut alloc, VA, entry).unwrap();
        assert_eq!(
            space.map_4k(&mut alloc, VA, entry),
            Err(AddressSpaceError::AlreadyMapped(VA))
        );
    }

    #[test]
    fn unmap_returns_the_old_leaf() {
        let (phys, mut alloc) = setup();
        let space = AddressSpace::create(&phys, &mut alloc).unwrap();
        let entry = PageEntryBits::user_page(PhysicalAddress::new(0x0030_0000), true);

        assert_eq!(space.unmap_4k(VA), Err(AddressSpaceError::NotMapped(VA)));
        space.map_4k(&mut alloc, VA, entry).unwrap();
        assert_eq!(space.unmap_4k(VA), Ok(entry));
        assert_eq!(space.query(VA), None);
        assert!(space.walk(VA).is_some(), "tables stay in place");
    }

    #[test]
    fn large_pages_stop_the_walk() {
        let (phys, mut alloc) = setup();
        let space = AddressSpace::create(&phys, &mut alloc).unwrap();
        space
            .map_4k(
                &mut alloc,
                VA,
                PageEntryBits::user_page(PhysicalAddress::new(0x0030_0000), true),
            )
            .unwrap();

        // Turn the PD entry into a 2 MiB leaf.
        let root = space.table(space.root_page().base());
        let pdpt = space.table(root.entry_for(Level::L4, VA).load().physical_address());
        let pd = space.table(pdpt.entry_for(Level::L3, VA).load().physical_address());
        let pde = pd.entry_for(Level::L2, VA);
        pde.store(pde.load().with_large_page(true));

        assert!(space.walk(VA).is_none());
        assert_eq!(
            space.walk_or_create(&mut alloc, VA).err(),
            Some(AddressSpaceError::LargePage(VA))
        );
    }

    #[test]
    fn exhaustion_is_reported() {
        let phys = TestPhys::new(BASE, 2);
        let mut alloc = BumpFrames::new(phys.base(), phys.end());
        let space = AddressSpace::create(&phys, &mut alloc).unwrap();

        assert_eq!(
            space.walk_or_create(&mut alloc, VA).err(),
            Some(AddressSpaceError::OutOfFrames)
        );
    }
}
