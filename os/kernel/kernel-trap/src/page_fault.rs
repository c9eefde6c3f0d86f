//! # Page-Fault Resolution
//!
//! Write faults on pages that are deliberately mapped read-only are how the
//! kernel defers work:
//!
//! - **lazy zero-fill**: the page gets its private frame on the first write;
//! - **copy-on-write**: after fork, parent and child share frames read-only
//!   until one of them writes.
//!
//! ```text
//!  leaf missing / not present / not user / already writable ──▶ Kill
//!  not (present && write) in the error code ─────────────────▶ Unhandled
//!  lazy-zero ──────────────▶ allocate, zero, remap             ZeroFilled
//!  COW, share count > 0 ───▶ allocate, copy, remap, release    Copied
//!  COW, share count == 0 ──▶ make writable in place            Promoted
//!  anything else ─────────────────────────────────────────────▶ Unhandled
//! ```
//!
//! Entries are rewritten with a compare-and-swap against the snapshot the
//! decision was based on. If another core rewrote the entry first, the fresh
//! frame goes back to the pool and the fault counts as resolved; the
//! faulting access simply retries against the new entry.

use bitfield_struct::bitfield;
use kernel_alloc::{PhysicalFrames, ReleaseOutcome};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress, VirtualPage};
use kernel_vmem::{AddressSpace, PageEntryBits, PageEntryCell, TranslationCache, copy_frame, zero_frame};
use log::{debug, trace};

/// Page-fault error code layout (x86-64).
///
/// Each bit describes the condition that caused the page fault.
/// Reference: Intel SDM Vol. 3A, §6.15.1 “Page-Fault Exception (#PF)”.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageFaultError {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub present: bool, // bit 0

    /// 0 = read or execute.
    /// 1 = write access.
    pub write: bool, // bit 1

    /// 0 = supervisor (CPL 0–2).
    /// 1 = user mode (CPL 3).
    pub user: bool, // bit 2

    /// 1 = caused by reserved bit set in a paging structure.
    pub reserved_bit: bool, // bit 3

    /// 1 = instruction fetch (execute access).
    pub instruction_fetch: bool, // bit 4

    /// 1 = protection-key violation (if CR4.PKE=1).
    pub protection_key: bool, // bit 5

    /// 1 = shadow stack access (if CET-SS enabled).
    pub shadow_stack: bool, // bit 6

    #[bits(57)]
    __: u64, // reserved / ignored bits
}

impl PageFaultError {
    #[must_use]
    pub const fn explain(&self) -> &'static str {
        if !self.present() {
            "Non-present page (page not mapped or swapped out)"
        } else if self.instruction_fetch() {
            if self.user() {
                "User-mode instruction fetch on protected page (likely NX or SMEP)"
            } else {
                "Kernel instruction fetch on protected page"
            }
        } else if self.write() {
            "Write access to protected page"
        } else {
            "Read access to protected page"
        }
    }

    /// A write hit a page that is mapped but not writable.
    #[inline]
    #[must_use]
    pub const fn is_write_protection_violation(&self) -> bool {
        self.present() && self.write()
    }
}

/// Why a fault terminates the faulting process.
#[derive(Debug, thiserror::Error, Copy, Clone, Eq, PartialEq)]
pub enum KillReason {
    #[error("no page table maps the address")]
    NotMapped,
    #[error("the page is not present")]
    NotPresent,
    #[error("the page is not user accessible")]
    NotUser,
    #[error("the page is already writable")]
    AlreadyWritable,
    #[error("out of physical frames")]
    OutOfMemory,
}

/// How a fault was resolved.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Resolution {
    /// A lazy-zero page received a fresh zeroed frame.
    ZeroFilled { frame: PhysicalPage<Size4K> },
    /// A shared copy-on-write page was copied into a private frame.
    Copied {
        from: PhysicalAddress,
        to: PhysicalPage<Size4K>,
    },
    /// The last owner of a copy-on-write frame got write access to it.
    Promoted { frame: PhysicalAddress },
    /// Another core rewrote the entry first; retry the access.
    Raced,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FaultOutcome {
    Resolved(Resolution),
    Kill(KillReason),
    /// Not a fault this module resolves; handle it like any unexpected trap.
    Unhandled,
}

/// Resolve a page fault at `fault_address` in the address space rooted at
/// `root`.
///
/// Never panics on behalf of the faulting process; problems it causes are
/// reported as [`FaultOutcome::Kill`].
pub fn resolve_page_fault<F, T>(
    frames: &F,
    tlb: &T,
    root: PhysicalPage<Size4K>,
    fault_address: VirtualAddress,
    error: PageFaultError,
) -> FaultOutcome
where
    F: PhysicalFrames + ?Sized,
    T: TranslationCache + ?Sized,
{
    let page = fault_address.page::<Size4K>();
    debug!(
        "page fault at {fault_address} (page {page}), err {:#x}: {}",
        error.into_bits(),
        error.explain()
    );

    let space = AddressSpace::from_root(frames.mapper(), root);
    let Some(cell) = space.walk(page.base()) else {
        return FaultOutcome::Kill(KillReason::NotMapped);
    };

    let entry = cell.load();
    if !entry.present() {
        return FaultOutcome::Kill(KillReason::NotPresent);
    }
    if !entry.user_access() {
        return FaultOutcome::Kill(KillReason::NotUser);
    }
    if entry.writable() {
        return FaultOutcome::Kill(KillReason::AlreadyWritable);
    }
    if !error.is_write_protection_violation() {
        return FaultOutcome::Unhandled;
    }

    let fault = Fault {
        frames,
        tlb,
        cell,
        entry,
        page,
    };
    if entry.lazy_zero() {
        fault.fill_with_zeros()
    } else if entry.copy_on_write() {
        if frames.share_count(entry.physical_address()) > 0 {
            fault.copy_shared()
        } else {
            fault.promote()
        }
    } else {
        FaultOutcome::Unhandled
    }
}

/// A qualifying write fault and the entry snapshot it was decided on.
struct Fault<'a, F: ?Sized, T: ?Sized> {
    frames: &'a F,
    tlb: &'a T,
    cell: &'a PageEntryCell,
    entry: PageEntryBits,
    page: VirtualPage<Size4K>,
}

impl<F, T> Fault<'_, F, T>
where
    F: PhysicalFrames + ?Sized,
    T: TranslationCache + ?Sized,
{
    fn fill_with_zeros(&self) -> FaultOutcome {
        let Ok(frame) = self.frames.allocate() else {
            return FaultOutcome::Kill(KillReason::OutOfMemory);
        };
        // SAFETY: freshly allocated, nobody else maps it yet.
        unsafe { zero_frame(self.frames.mapper(), frame) };

        if !self.commit(self.entry.resolved_to(frame.base()), Some(frame)) {
            return FaultOutcome::Resolved(Resolution::Raced);
        }
        trace!("{}: zero-filled into {frame}", self.page);
        FaultOutcome::Resolved(Resolution::ZeroFilled { frame })
    }

    fn copy_shared(&self) -> FaultOutcome {
        let from = self.entry.physical_address();
        let Ok(to) = self.frames.allocate() else {
            return FaultOutcome::Kill(KillReason::OutOfMemory);
        };
        // SAFETY: `to` is fresh; `from` is read-only in every address space.
        unsafe { copy_frame(self.frames.mapper(), from.page(), to) };

        if !self.commit(self.entry.resolved_to(to.base()), Some(to)) {
            return FaultOutcome::Resolved(Resolution::Raced);
        }

        // Give up this address space's share; frees the frame if the other
        // owners copied away concurrently.
        match self.frames.release(from) {
            ReleaseOutcome::Unshared { remaining } => {
                trace!("{}: copied {from} to {to}, {remaining} sharers left", self.page);
            }
            ReleaseOutcome::Freed => {
                trace!("{}: copied {from} to {to}, old frame freed", self.page);
            }
        }
        FaultOutcome::Resolved(Resolution::Copied { from, to })
    }

    fn promote(&self) -> FaultOutcome {
        let frame = self.entry.physical_address();
        if !self.commit(self.entry.promoted(), None) {
            return FaultOutcome::Resolved(Resolution::Raced);
        }
        trace!("{}: sole owner of {frame}, now writable", self.page);
        FaultOutcome::Resolved(Resolution::Promoted { frame })
    }

    /// Install `new` if the entry is unchanged; otherwise hand `fresh` back.
    fn commit(&self, new: PageEntryBits, fresh: Option<PhysicalPage<Size4K>>) -> bool {
        match self.cell.compare_exchange(self.entry, new) {
            Ok(_) => {
                self.tlb.invalidate_page(self.page);
                true
            }
            Err(now) => {
                trace!("{}: entry changed to {now:?} while resolving", self.page);
                if let Some(frame) = fresh {
                    let _ = self.frames.release(frame.base());
                }
                false
            }
        }
    }
}
