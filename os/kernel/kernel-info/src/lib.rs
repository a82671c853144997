//! # Kernel Memory Layout and Boot Interface
//!
//! This crate holds the compile-time layout constants and the boot-time memory
//! description consumed by the memory-management core. It is the single source
//! of truth for where physical memory is visible in the kernel's address space
//! and where the kernel image lives.
//!
//! ## Architecture
//!
//! ### Memory Layout ([`memory`])
//! * **Direct Map**: all physical memory below [`DIRECT_MAP_SPAN`](memory::DIRECT_MAP_SPAN)
//!   is visible at [`HHDM_BASE`](memory::HHDM_BASE) `+ pa`.
//! * **Higher Half Kernel**: the kernel executes at [`KERNEL_BASE`](memory::KERNEL_BASE)
//!   and is loaded at [`PHYS_LOAD`](memory::PHYS_LOAD).
//! * **Runtime Layout**: [`MemoryLayout`](memory::MemoryLayout) carries the same
//!   values as a value type so hosted builds can shrink the direct map.
//!
//! ### Boot Information ([`boot`])
//! * **Physical Regions**: `{base, size, usable}` records for the frame allocator.
//! * **Kernel Image Regions**: `{virtual_base, size, readable, writable, executable}`
//!   records for the initial kernel address space.
//! * **Lifetime**: both are read once during initialization and never retained.
//!
//! ## Virtual Memory Architecture
//!
//! ```text
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │  Identity map of low memory     │
//!                       │  (page 0 left unmapped)         │
//!                       ├─────────────────────────────────┤
//!                       │         User Space              │
//! HHDM_BASE             ├─────────────────────────────────┤ 0xffff_8880_0000_0000
//!                       │   Higher Half Direct Mapping    │
//!                       │   (DIRECT_MAP_SPAN bytes)       │
//! KERNEL_BASE           ├─────────────────────────────────┤ 0xffff_ffff_8000_0000
//!                       │       Kernel Text & Data        │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use kernel_info::memory::{KERNEL_BASE, PHYS_LOAD, MemoryLayout};
//! use kernel_memory_addresses::VirtualAddress;
//!
//! let layout = MemoryLayout::default();
//! let pa = layout.kernel_to_phys(VirtualAddress::new(KERNEL_BASE + 0x2000));
//! assert_eq!(pa.map(|p| p.as_u64()), Some(PHYS_LOAD + 0x2000));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
