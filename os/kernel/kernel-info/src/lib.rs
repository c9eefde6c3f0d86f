//! # Kernel Memory Configuration
//!
//! This crate is the single source of truth for the physical memory layout the
//! frame allocator and the page-fault path operate on.
//!
//! ## Architecture
//!
//! ### Compile-Time Layout ([`memory`])
//! * **Frame geometry**: frame size and the capacity of the share-count table
//! * **Physical boundaries**: kernel load address, the boot-mapped limit and
//!   the top of installed memory
//! * **Direct map**: the HHDM base used to reach physical frames
//! * **Release poisoning**: the junk byte written over freed frames
//!
//! ### Runtime Layout ([`layout`])
//! [`MemoryLayout`](layout::MemoryLayout) pairs the link-time kernel image end
//! with the top of physical memory and validates the combination.
//!
//! ## Physical Memory Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │     Low Memory (< 1MiB)         │
//! PHYS_LOAD   ├─────────────────────────────────┤ 0x0010_0000 (1 MiB)
//!             │       Kernel Image              │
//! kernel_end  ├─────────────────────────────────┤
//!             │   Frames released in phase 1    │
//! BOOT_MAPPED ├─────────────────────────────────┤ 0x0040_0000 (4 MiB)
//!             │   Frames released in phase 2    │
//! PHYS_TOP    └─────────────────────────────────┘ 0x0E00_0000 (224 MiB)
//! ```
//!
//! All compile-time constants are checked by `const` assertions.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod layout;
pub mod memory;
