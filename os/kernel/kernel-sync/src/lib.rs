//! # Kernel synchronization primitives
//!
//! Busy-waiting primitives for code that must never block or yield:
//!
//! * [`SpinLock`]: test-and-test-and-set mutual exclusion with an RAII guard.
//! * [`SyncOnceCell`]: a value that is written exactly once and then shared,
//!   with a fallible [`try_init`](SyncOnceCell::try_init) for single-initialization
//!   contracts.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;
mod sync_once_cell;

pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::{OnceInitError, SyncOnceCell};
