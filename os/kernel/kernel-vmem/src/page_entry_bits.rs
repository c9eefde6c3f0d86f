use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// A single 64-bit x86-64 page table entry in its raw bitfield form.
///
/// This structure models the **common superset** of fields found in all
/// four paging levels (PML4E, PDPTE, PDE, PTE). Two of the bits the hardware
/// leaves to the operating system carry the sharing state of a user page.
///
/// ### Bit layout
///
/// | Bits      | Name / Mnemonic   | Meaning |
/// |-----------|-------------------|----------|
/// | 0         | `P` (present)     | Valid entry if set |
/// | 1         | `RW`              | Writable if set |
/// | 2         | `US`              | User-mode accessible if set |
/// | 3         | `PWT`             | Write-through caching |
/// | 4         | `PCD`             | Disable caching |
/// | 5         | `A`               | Accessed |
/// | 6         | `D`               | Dirty (leaf only) |
/// | 7         | `PS`              | Large page flag |
/// | 8         | `G`               | Global (leaf only) |
/// | 9         | `COW`             | Copy-on-write (OS) |
/// | 10        | `ZERO`            | Lazy zero-fill (OS) |
/// | 11        | OS avail          | Reserved for OS use |
/// | 12–51     | `addr`            | Physical frame bits [51:12] |
/// | 52–58     | OS avail high     | Reserved for OS use |
/// | 59–62     | `PKU` / OS use    | Protection key or OS use |
/// | 63        | `NX`              | Execute disable |
///
/// ### Sharing invariants
/// - `copy_on_write` and `writable` are never both set.
/// - `lazy_zero` entries are read-only and point at a shared placeholder
///   frame rather than at memory of their own.
///
/// The constructors and transitions below ([`user_page`](Self::user_page),
/// [`lazy_zero_user`](Self::lazy_zero_user), [`write_protected_shared`](Self::write_protected_shared),
/// [`resolved_to`](Self::resolved_to), [`promoted`](Self::promoted)) keep these
/// invariants; [`is_consistent`](Self::is_consistent) checks them.
///
/// ### Example
/// ```rust
/// # use kernel_memory_addresses::PhysicalAddress;
/// # use kernel_vmem::PageEntryBits;
/// let shared = PageEntryBits::user_page(PhysicalAddress::new(0x20_0000), true)
///     .write_protected_shared();
/// assert!(shared.copy_on_write() && !shared.writable());
///
/// let private = shared.promoted();
/// assert!(private.writable() && !private.copy_on_write());
/// assert_eq!(private.physical_address(), PhysicalAddress::new(0x20_0000));
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    ///
    /// Set to allow user-mode access; clear restricts to supervisor only.
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU.
    pub accessed: bool,

    /// Dirty (D, bit 6), **leaf only**. Set by the CPU on first write.
    pub dirty: bool,

    /// Large Page / Page Size (PS, bit 7).
    ///
    /// For L3 (PDPTE) and L2 (PDE): when **set**, the entry is a **leaf**
    /// mapping to a 1 GiB (L3) or 2 MiB (L2) page.
    pub large_page: bool,

    /// Global (G, bit 8), **leaf only**.
    pub global_translation: bool,

    /// Copy-on-write (bit 9, OS-available).
    ///
    /// The frame is (or was) shared with another address space. A write
    /// fault breaks the sharing instead of killing the process.
    pub copy_on_write: bool,

    /// Lazy zero-fill (bit 10, OS-available).
    ///
    /// The page has no private frame yet; the first write materializes a
    /// zeroed one.
    pub lazy_zero: bool,

    /// OS-available (bit 11).
    #[bits(1)]
    pub os_available_low: u8,

    /// Physical address bits [51:12] (bits 12..=51).
    #[bits(40)]
    phys_addr_bits_51_12: u64,

    /// OS-available (bits 52..=58).
    #[bits(7)]
    pub os_available_high: u8,

    /// Protection Key (PKU, bits 59..=62) if supported; otherwise OS use.
    #[bits(4)]
    pub protection_key: u8,

    /// No-Execute (NX, bit 63).
    pub no_execute: bool,
}

impl PageEntryBits {
    #[inline]
    pub const fn set_physical_address(&mut self, phys: PhysicalAddress) {
        // store bits [51:12]
        self.set_phys_addr_bits_51_12(phys.as_u64() >> 12);
    }

    #[inline]
    #[must_use]
    pub const fn with_physical_address(mut self, phys: PhysicalAddress) -> Self {
        self.set_physical_address(phys);
        self
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.phys_addr_bits_51_12() << 12)
    }

    /// Link to a next-level table. Permissions are the intersection over the
    /// walk, so intermediate links grant everything and leaves restrict.
    #[inline]
    #[must_use]
    pub const fn table_link(table: PhysicalAddress) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(true)
            .with_physical_address(table)
    }

    /// Present user-mode leaf mapping `frame`.
    #[inline]
    #[must_use]
    pub const fn user_page(frame: PhysicalAddress, writable: bool) -> Self {
        Self::new()
            .with_present(true)
            .with_user_access(true)
            .with_writable(writable)
            .with_physical_address(frame)
    }

    /// Present, read-only user mapping that materializes on first write.
    ///
    /// `placeholder` is what reads observe until then, typically a shared
    /// all-zero frame.
    #[inline]
    #[must_use]
    pub const fn lazy_zero_user(placeholder: PhysicalAddress) -> Self {
        Self::user_page(placeholder, false).with_lazy_zero(true)
    }

    /// The entry as it must look in both address spaces once its frame is
    /// shared: write access revoked, copy-on-write recorded if the mapping
    /// was writable before (or already copy-on-write).
    #[inline]
    #[must_use]
    pub const fn write_protected_shared(self) -> Self {
        let cow = self.writable() || self.copy_on_write();
        self.with_writable(false).with_copy_on_write(cow)
    }

    /// The entry after a write fault moved it to a fresh private `frame`:
    /// writable, neither copy-on-write nor lazy-zero.
    #[inline]
    #[must_use]
    pub const fn resolved_to(self, frame: PhysicalAddress) -> Self {
        self.with_physical_address(frame)
            .with_writable(true)
            .with_copy_on_write(false)
            .with_lazy_zero(false)
    }

    /// The entry after a copy-on-write fault on a frame nobody else maps:
    /// same frame, writable, copy-on-write cleared.
    #[inline]
    #[must_use]
    pub const fn promoted(self) -> Self {
        self.with_writable(true).with_copy_on_write(false)
    }

    /// Whether the sharing invariants hold for this entry.
    #[inline]
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        let cow_ok = !(self.copy_on_write() && self.writable());
        let zero_ok = !(self.lazy_zero() && self.writable());
        cow_ok && zero_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: PhysicalAddress = PhysicalAddress::new(0x0012_3000);

    #[test]
    fn os_bits_sit_at_9_and_10() {
        let e = PageEntryBits::new().with_copy_on_write(true);
        assert_eq!(e.into_bits(), 1 << 9);
        let e = PageEntryBits::new().with_lazy_zero(true);
        assert_eq!(e.into_bits(), 1 << 10);
    }

    #[test]
    fn physical_address_roundtrips_without_touching_flags() {
        let e = PageEntryBits::user_page(FRAME, true).with_no_execute(true);
        assert_eq!(e.physical_address(), FRAME);
        assert_eq!(e.into_bits(), 0x0012_3000 | 0b111 | (1 << 63));
    }

    #[test]
    fn sharing_revokes_write_and_records_cow() {
        let writable = PageEntryBits::user_page(FRAME, true).write_protected_shared();
        assert!(writable.copy_on_write());
        assert!(!writable.writable());
        assert!(writable.is_consistent());

        let read_only = PageEntryBits::user_page(FRAME, false).write_protected_shared();
        assert!(!read_only.copy_on_write());
        assert!(!read_only.writable());
    }

    #[test]
    fn resolution_clears_both_os_flags() {
        let fresh = PhysicalAddress::new(0x0045_6000);
        let e = PageEntryBits::lazy_zero_user(FRAME).resolved_to(fresh);
        assert!(e.present() && e.user_access() && e.writable());
        assert!(!e.lazy_zero() && !e.copy_on_write());
        assert_eq!(e.physical_address(), fresh);
    }

    #[test]
    fn inconsistent_combinations_are_detected() {
        let e = PageEntryBits::user_page(FRAME, true).with_copy_on_write(true);
        assert!(!e.is_consistent());
        let e = PageEntryBits::lazy_zero_user(FRAME).with_writable(true);
        assert!(!e.is_consistent());
    }
}
