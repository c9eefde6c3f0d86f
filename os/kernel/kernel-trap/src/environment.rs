//! What the trap dispatcher needs from the rest of the kernel.
//!
//! Per-CPU state, the process table, device drivers and the system-call
//! table live elsewhere; [`trap`](crate::trap) reaches them only through
//! [`TrapEnvironment`].

use crate::ticks::TickCounter;
use crate::trap_frame::TrapFrame;
use crate::vectors::Device;
use kernel_alloc::PhysicalFrames;
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::TranslationCache;

/// The process running on the current CPU.
pub trait TrapProcess {
    fn pid(&self) -> u32;

    fn name(&self) -> &str;

    fn is_killed(&self) -> bool;

    /// Mark the process for termination. It exits the next time it leaves
    /// the kernel towards user mode.
    fn kill(&self);

    /// Root (PML4) of the process's address space.
    fn page_table_root(&self) -> PhysicalPage<Size4K>;
}

/// Kernel services used while handling a trap on the current CPU.
///
/// [`TranslationCache::invalidate_page`] must act on the current CPU's TLB.
pub trait TrapEnvironment: TranslationCache {
    type Process: TrapProcess + ?Sized;
    type Frames: PhysicalFrames + ?Sized;

    fn cpu_id(&self) -> usize;

    fn current_process(&self) -> Option<&Self::Process>;

    fn frames(&self) -> &Self::Frames;

    /// The faulting address of the last page fault (`CR2`).
    fn fault_address(&self) -> VirtualAddress;

    fn ticks(&self) -> &TickCounter;

    /// Wake everything sleeping on the tick counter.
    fn wakeup_ticks(&self, now: u64);

    /// Run the system call described by `tf`; results go back into `tf`.
    fn syscall(&self, tf: &mut TrapFrame);

    fn device_interrupt(&self, device: Device);

    /// End-of-interrupt to the local APIC.
    fn acknowledge_interrupt(&self);

    /// Terminate the current process.
    ///
    /// On the kernel this does not return; test environments record the
    /// call and return, and [`trap`](crate::trap) then returns as well.
    fn exit(&self);
}
