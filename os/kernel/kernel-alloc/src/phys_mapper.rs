//! # Direct-Map Physical Mapper
//!
//! Once the kernel address space is active, physical address `pa` is readable
//! and writable at `direct_map_base + pa` for every `pa` below the direct-map
//! span. [`HhdmPhysMapper`] turns that arithmetic into a [`PhysMapper`] so the
//! page-table and allocator code can touch physical memory.
//!
//! ```rust
//! use kernel_alloc::phys_mapper::HhdmPhysMapper;
//! use kernel_info::memory::MemoryLayout;
//! use kernel_memory_addresses::PhysicalAddress;
//! use kernel_vmem::PhysMapper;
//!
//! let mapper = HhdmPhysMapper::new(&MemoryLayout::DEFAULT.with_direct_map_span(0x10_0000));
//! assert!(mapper.covers(PhysicalAddress::new(0xF_F000), 0x1000));
//! assert!(!mapper.covers(PhysicalAddress::new(0xF_F000), 0x1001));
//! ```

use kernel_info::memory::MemoryLayout;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] over the higher-half direct map.
///
/// # Safety
/// Pointers are only valid while an address space containing the direct map
/// described by the layout is active.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HhdmPhysMapper {
    base: VirtualAddress,
    span: u64,
}

impl HhdmPhysMapper {
    #[must_use]
    pub const fn new(layout: &MemoryLayout) -> Self {
        Self {
            base: layout.direct_map_base,
            span: layout.direct_map_span,
        }
    }
}

impl Default for HhdmPhysMapper {
    fn default() -> Self {
        Self::new(&MemoryLayout::DEFAULT)
    }
}

impl PhysMapper for HhdmPhysMapper {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let va = self.base.as_u64().wrapping_add(pa.as_u64());
        core::ptr::with_exposed_provenance_mut(va as usize)
    }

    fn covers(&self, pa: PhysicalAddress, len: u64) -> bool {
        pa.as_u64().checked_add(len).is_some_and(|end| end <= self.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::memory::HHDM_BASE;

    #[test]
    fn pointers_are_offset_by_the_direct_map_base() {
        let mapper = HhdmPhysMapper::default();
        let ptr = unsafe { mapper.phys_to_ptr(PhysicalAddress::new(0x1234_0000)) };
        assert_eq!(ptr as u64, HHDM_BASE + 0x1234_0000);
    }

    #[test]
    fn coverage_ends_at_the_span() {
        let mapper = HhdmPhysMapper::new(&MemoryLayout::DEFAULT.with_direct_map_span(0x4000));
        assert!(mapper.covers(PhysicalAddress::new(0), 0x4000));
        assert!(!mapper.covers(PhysicalAddress::new(0x3000), 0x1001));
        assert!(!mapper.covers(PhysicalAddress::new(u64::MAX), 1));
        assert!(!mapper.covers(PhysicalAddress::new(0x4000), 1));
    }
}
