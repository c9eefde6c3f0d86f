//! # Memory Page Table
//!
//! One 4 KiB table of 512 entries, shared by all four paging levels.
//!
//! Entries are stored in [`PageEntryCell`]s so that two cores resolving
//! faults in the same address space can read and rewrite a leaf without a
//! lock: a rewrite is committed with [`PageEntryCell::compare_exchange`]
//! against the snapshot the decision was based on.

use crate::PageEntryBits;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use kernel_memory_addresses::VirtualAddress;

/// Number of entries per table.
pub const ENTRIES_PER_TABLE: usize = 512;

/// Paging level, from the root (L4, PML4) down to the leaf table (L1, PT).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Level {
    L4,
    L3,
    L2,
    L1,
}

impl Level {
    /// Levels in walk order.
    pub const WALK: [Self; 4] = [Self::L4, Self::L3, Self::L2, Self::L1];

    /// Position of this level's index bits within a virtual address.
    #[inline]
    #[must_use]
    pub const fn shift(self) -> u32 {
        match self {
            Self::L4 => 39,
            Self::L3 => 30,
            Self::L2 => 21,
            Self::L1 => 12,
        }
    }

    /// Index of `va` within a table of this level.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index_of(self, va: VirtualAddress) -> usize {
        ((va.as_u64() >> self.shift()) & 0x1FF) as usize
    }
}

/// An atomically accessed page-table entry.
#[repr(transparent)]
pub struct PageEntryCell(AtomicU64);

impl PageEntryCell {
    #[inline]
    #[must_use]
    pub const fn new(bits: PageEntryBits) -> Self {
        Self(AtomicU64::new(bits.into_bits()))
    }

    #[inline]
    #[must_use]
    pub fn load(&self) -> PageEntryBits {
        PageEntryBits::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, bits: PageEntryBits) {
        self.0.store(bits.into_bits(), Ordering::Release);
    }

    /// Replace `current` with `new` if the entry still holds `current`.
    ///
    /// # Errors
    /// Returns the entry's actual value if it changed since `current` was read.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: PageEntryBits,
        new: PageEntryBits,
    ) -> Result<PageEntryBits, PageEntryBits> {
        debug_assert!(new.is_consistent(), "inconsistent entry {new:?}");
        self.0
            .compare_exchange(
                current.into_bits(),
                new.into_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(PageEntryBits::from_bits)
            .map_err(PageEntryBits::from_bits)
    }
}

impl fmt::Debug for PageEntryCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(), f)
    }
}

/// A page table of any level: 512 entries, 4 KiB-aligned.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntryCell; ENTRIES_PER_TABLE],
}

const _: () = assert!(size_of::<PageTable>() == 4096);

impl PageTable {
    #[inline]
    #[must_use]
    pub fn entry(&self, index: usize) -> &PageEntryCell {
        &self.entries[index]
    }

    /// Entry of `va` at `level`.
    #[inline]
    #[must_use]
    pub fn entry_for(&self, level: Level, va: VirtualAddress) -> &PageEntryCell {
        self.entry(level.index_of(va))
    }

    /// Mark every entry not-present.
    pub fn clear(&self) {
        for e in &self.entries {
            e.store(PageEntryBits::new());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageEntryCell> {
        self.entries.iter()
    }
}
