//! # Virtual Memory Support
//!
//! x86-64 4-level paging for the kernel: packed entries, page tables, and an
//! [`AddressSpace`] that lazily builds and edits the table tree.
//!
//! ## What you get
//! - An [`address space`](address_space) rooted at a `PML4` frame, with
//!   single-page and all-or-nothing range `map`/`unmap`, `query` and `translate`.
//! - x86-64 page-table [`PageFlags`] as a `bitfield` over the entry layout.
//! - A 4 KiB-aligned [`PageTable`] of 512 [`PageTableEntry`] words.
//! - The seams to the rest of the kernel: [`FrameAlloc`] for table frames,
//!   [`PhysMapper`] for reaching physical memory, [`Mmu`] for TLB and CR3.
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! Each 48-bit virtual address is divided into five fields:
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! The CPU uses these fields as **indices** into four levels of page tables,
//! each level containing 512 (2⁹) entries of 8 bytes (64 bits) each.
//!
//! ```text
//!  PML4  →  PDPT  →  PD  →  PT  →  4 KiB frame
//! ```
//!
//! Only 4 KiB leaves are used. Every PML4E, PDPTE and PDE links to the next
//! table; a present link with `PS=1` is reported as
//! [`VmemError::CorruptEntry`].
//!
//! ## Table frames
//!
//! Tables are identified by their [`PhysicalPage`] and only ever dereferenced
//! through the [`PhysMapper`], which in the kernel is the higher-half direct
//! map and in hosted tests is a [`FrameArena`](arena::FrameArena).
//!
//! [`PhysicalPage`]: kernel_memory_addresses::PhysicalPage

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "arena"))]
extern crate alloc;

pub mod address_space;
#[cfg(any(test, feature = "arena"))]
pub mod arena;
mod error;
mod mmu;
mod page_flags;
mod page_table;

pub use crate::address_space::{AddressSpace, PageState};
pub use crate::error::VmemError;
#[cfg(feature = "asm")]
pub use crate::mmu::X86Mmu;
pub use crate::mmu::Mmu;
pub use crate::page_flags::{ADDRESS_MASK, PageFlags};
pub use crate::page_table::{ENTRIES, Level, PageTable, PageTableEntry, TableIndex};

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage};

/// Source of **physical** 4 KiB frames for page tables.
///
/// The implementation decides where frames come from (boot pool, bitmap, etc.).
/// Returned frames are 4 KiB aligned by type; their contents are unspecified.
pub trait FrameAlloc {
    /// Allocate one frame, or `None` on out-of-memory.
    fn alloc_4k(&mut self) -> Option<PhysicalPage>;

    /// Return a frame obtained from [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, page: PhysicalPage);
}

/// Converts physical addresses to usable pointers in the current virtual
/// address space (identity map, higher-half direct map, or a hosted arena).
///
/// # Safety
/// - `pa` must be covered (see [`covers`](Self::covers)) for the whole access.
/// - Lifetime `'a` is purely borrow-checked; the mapping must remain valid
///   for `'a`, and the caller must not create aliasing `&mut` references.
/// - Type `T` must match the bytes at `pa`.
pub trait PhysMapper {
    /// Pointer through which physical address `pa` can be accessed.
    ///
    /// # Safety
    /// `pa` must be covered by this mapper.
    unsafe fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8;

    /// `true` if every byte of `[pa, pa + len)` is reachable through this mapper.
    fn covers(&self, pa: PhysicalAddress, len: u64) -> bool;

    /// # Safety
    /// See the trait-level contract.
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { &mut *self.phys_to_ptr(pa).cast::<T>() }
    }

    /// # Safety
    /// See the trait-level contract; the access spans `len` values of `T`.
    #[inline]
    unsafe fn phys_to_slice_mut<'a, T>(&self, pa: PhysicalAddress, len: usize) -> &'a mut [T] {
        unsafe { core::slice::from_raw_parts_mut(self.phys_to_ptr(pa).cast::<T>(), len) }
    }
}
