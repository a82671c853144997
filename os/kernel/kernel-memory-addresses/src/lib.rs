//! # Physical and Virtual Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses, page and frame bases, and
//! physical ranges used by the frame allocator and the page-table code.
//!
//! ## Overview
//!
//! The memory core only ever deals in one granularity: the 4 KiB page (virtual)
//! and the 4 KiB frame (physical). The types in this crate make the *kind* of an
//! address part of its type so that a virtual address can never be written into
//! a page-table entry by accident, and a frame base is aligned by construction.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A byte address in physical memory (RAM or MMIO). |
//! | [`VirtualAddress`] | A byte address in a (page-table translated) address space. |
//! | [`PhysicalPage`] | A 4 KiB-aligned physical frame base, convertible to a frame index. |
//! | [`VirtualPage`] | A 4 KiB-aligned virtual page base. |
//! | [`PhysicalRange`] | A `[base, base + size)` span of physical memory. |
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0000_0000_0030_0042);
//! let frame = pa.page();
//! assert_eq!(frame.base().as_u64(), 0x30_0000);
//! assert_eq!(frame.frame_index(), 0x300);
//! assert_eq!(frame.join(pa.page_offset()), pa);
//!
//! let va = VirtualAddress::new(0xFFFF_FFFF_8000_1234);
//! assert!(!va.is_page_aligned());
//! assert_eq!(va.page().base().as_u64(), 0xFFFF_FFFF_8000_1000);
//! ```
//!
//! ## Design Notes
//!
//! - Address and page types are `#[repr(transparent)]` over `u64`; all types are `Copy`.
//! - Page types align **down** when built from an arbitrary address; use the
//!   `try_from_addr` constructors to reject unaligned input instead.
//! - Arithmetic that can leave the 64-bit space is offered in `checked_*` form.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod physical_address;
mod physical_page;
mod physical_range;
mod virtual_address;
mod virtual_page;

pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use physical_range::PhysicalRange;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;

/// Size of one page / frame in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// `log2(PAGE_SIZE)`; the number of in-page offset bits.
pub const PAGE_SHIFT: u32 = 12;

/// Mask of the in-page offset bits.
pub const PAGE_OFFSET_MASK: u64 = PAGE_SIZE - 1;

/// Align `x` down to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two.
///
/// ```rust
/// # use kernel_memory_addresses::align_down;
/// assert_eq!(align_down(0, 4096), 0);
/// assert_eq!(align_down(4095, 4096), 0);
/// assert_eq!(align_down(8191, 4096), 4096);
/// ```
#[inline]
#[must_use]
pub const fn align_down(x: u64, a: u64) -> u64 {
    debug_assert!(a.is_power_of_two());
    x & !(a - 1)
}

/// Align `x` up to the nearest multiple of `a`, or `None` if that overflows.
///
/// `a` must be a non-zero power of two.
///
/// ```rust
/// # use kernel_memory_addresses::checked_align_up;
/// assert_eq!(checked_align_up(1, 4096), Some(4096));
/// assert_eq!(checked_align_up(4096, 4096), Some(4096));
/// assert_eq!(checked_align_up(u64::MAX, 4096), None);
/// ```
#[inline]
#[must_use]
pub const fn checked_align_up(x: u64, a: u64) -> Option<u64> {
    debug_assert!(a.is_power_of_two());
    match x.checked_add(a - 1) {
        Some(v) => Some(v & !(a - 1)),
        None => None,
    }
}
