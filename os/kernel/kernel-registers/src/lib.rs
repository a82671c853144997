//! # Typed `X86_64` Registers
//!
//! Bit-level views of the control state the memory manager touches: [`Cr3`]
//! (the active translation root) and TLB maintenance in [`tlb`]. Privileged
//! instructions are only compiled with the `asm` feature.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod cr3;
#[cfg(feature = "asm")]
pub mod tlb;

pub use cr3::Cr3;

/// Write a value to a privileged register.
pub trait StoreRegisterUnsafe {
    /// # Safety
    /// Ring 0 only. Each register defines what a write may break; see the
    /// implementing type.
    unsafe fn store_unsafe(self);
}
