//! # Kernel Memory Management
//!
//! Physical frame allocation and the kernel's virtual address space, built on
//! the page-table primitives of `kernel-vmem`.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Memory Manager                     │
//! │    • Single instance, installed once                │
//! │    • Lock order: address space, then frames         │
//! └──────────────┬──────────────────────┬───────────────┘
//!                │                      │
//! ┌──────────────▼──────────────┐ ┌─────▼───────────────┐
//! │  Virtual Memory Manager     │ │  Frame Allocator    │
//! │  • Initial kernel layout    │ │  • First fit        │
//! │  • map / unmap / query      │◄┤  • Checked frees    │
//! └──────────────┬──────────────┘ └─────┬───────────────┘
//!                │                      │
//! ┌──────────────▼──────────────┐ ┌─────▼───────────────┐
//! │  Physical Mapper (HHDM)     │ │  Bitmap             │
//! └─────────────────────────────┘ └─────────────────────┘
//! ```
//!
//! ## Components
//!
//! - [`bitmap`]: bounds-checked bit store over caller-provided words, with
//!   word-skipping searches for single bits and runs.
//! - [`frame_alloc`]: one bit per 4 KiB frame of physical memory, initialized
//!   from the boot memory map. Also the frame source for page tables.
//! - [`phys_mapper`]: reaches physical memory through the higher-half direct map.
//! - [`vmm`]: builds the identity map, the direct map, and the kernel image
//!   mappings, then activates them.
//! - [`manager`]: the locked pair of allocator and address space the rest of
//!   the kernel talks to.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::bitmap::Bitmap;
//!
//! let mut words = [0u64; 2];
//! let mut bitmap = Bitmap::new(&mut words, 100).unwrap();
//! bitmap.set_range(10, 5, true).unwrap();
//! assert_eq!(bitmap.find_first_range(0, 3, true), Ok(Some(10)));
//! assert_eq!(bitmap.find_first(15, true), Ok(None));
//! ```
//!
//! With the `asm` feature, `manager::init_kernel_memory` builds the global
//! instance on hardware.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod bitmap;
pub mod frame_alloc;
pub mod manager;
pub mod phys_mapper;
pub mod vmm;
