//! # Trap Dispatch and Page-Fault Resolution
//!
//! Every exception, interrupt and `int 0x80` system call ends up in
//! [`trap`], which routes it by vector:
//!
//! | Vector | Handling |
//! |--------|----------|
//! | `0x80` system call | kill check, dispatch, kill check |
//! | timer IRQ | CPU 0 advances the [`TickCounter`] and wakes sleepers; EOI |
//! | IDE / keyboard / COM1 IRQs | device handler; EOI |
//! | secondary IDE IRQ | ignored |
//! | IRQ 7, APIC spurious | logged; EOI |
//! | `#PF` | [`resolve_page_fault`] (copy-on-write, lazy zero-fill) |
//! | anything else | fatal in the kernel, kills a user process |
//!
//! The kernel plugs in through [`TrapEnvironment`]; the page-fault path also
//! runs standalone against any [`PhysicalFrames`](kernel_alloc::PhysicalFrames)
//! pool, and [`share_copy_on_write`] is the matching fork-side step.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod cow;
mod dispatch;
mod environment;
pub mod page_fault;
mod ring;
mod ticks;
mod trap_frame;
pub mod vectors;

pub use crate::cow::{ShareError, share_copy_on_write};
pub use crate::dispatch::trap;
pub use crate::environment::{TrapEnvironment, TrapProcess};
pub use crate::page_fault::{FaultOutcome, KillReason, PageFaultError, Resolution, resolve_page_fault};
pub use crate::ring::Ring;
pub use crate::ticks::TickCounter;
pub use crate::trap_frame::TrapFrame;
pub use crate::vectors::{Device, TrapCause};
