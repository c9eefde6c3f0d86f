//! # Kernel synchronization primitives
//!
//! - [`SpinLock`]: named busy-waiting lock guarding the frame allocator
//!   state and the tick counter.
//! - [`SyncOnceCell`]: write-once cell for publishing kernel singletons.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;
mod sync_once_cell;

pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
