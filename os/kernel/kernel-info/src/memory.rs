//! # Memory Layout

use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};

/// Higher Half Direct Map (HHDM) base.
/// Physical address `pa` is visible at [`HHDM_BASE`] + `pa`.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Bytes of physical memory covered by the direct map (and the low identity map).
pub const DIRECT_MAP_SPAN: u64 = 4 * 1024 * 1024 * 1024;

/// Where the kernel executes (VMA).
pub const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;

/// Where the kernel image is placed in *physical* memory (LMA).
pub const PHYS_LOAD: u64 = 0x0010_0000; // 1 MiB

const _: () = {
    assert!(DIRECT_MAP_SPAN.is_multiple_of(PAGE_SIZE));
    assert!(HHDM_BASE.is_multiple_of(PAGE_SIZE));
    assert!(KERNEL_BASE.is_multiple_of(PAGE_SIZE));
    assert!(PHYS_LOAD.is_multiple_of(PAGE_SIZE));
    assert!(HHDM_BASE + DIRECT_MAP_SPAN <= KERNEL_BASE);
};

/// The virtual layout the memory manager builds and relies on.
///
/// [`MemoryLayout::DEFAULT`] mirrors the constants of this module. Hosted
/// builds shrink [`direct_map_span`](Self::direct_map_span) so that building
/// the initial address space does not need gigabytes of page tables.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryLayout {
    /// Virtual base of the direct-map window.
    pub direct_map_base: VirtualAddress,
    /// Size in bytes of the direct-map window and of the low identity map.
    pub direct_map_span: u64,
    /// Virtual base of the kernel image.
    pub kernel_virt_base: VirtualAddress,
    /// Physical load address of the kernel image.
    pub kernel_phys_base: PhysicalAddress,
}

impl MemoryLayout {
    pub const DEFAULT: Self = Self {
        direct_map_base: VirtualAddress::new(HHDM_BASE),
        direct_map_span: DIRECT_MAP_SPAN,
        kernel_virt_base: VirtualAddress::new(KERNEL_BASE),
        kernel_phys_base: PhysicalAddress::new(PHYS_LOAD),
    };

    #[must_use]
    pub const fn with_direct_map_span(mut self, span: u64) -> Self {
        self.direct_map_span = span;
        self
    }

    /// Physical address backing a kernel-image virtual address.
    ///
    /// Returns `None` for addresses below [`kernel_virt_base`](Self::kernel_virt_base).
    #[must_use]
    pub const fn kernel_to_phys(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        match va.as_u64().checked_sub(self.kernel_virt_base.as_u64()) {
            Some(offset) => self.kernel_phys_base.checked_add(offset),
            None => None,
        }
    }
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_addresses_translate_to_load_address() {
        let layout = MemoryLayout::default();
        assert_eq!(
            layout.kernel_to_phys(VirtualAddress::new(KERNEL_BASE)),
            Some(PhysicalAddress::new(PHYS_LOAD))
        );
        assert_eq!(layout.kernel_to_phys(VirtualAddress::new(HHDM_BASE)), None);
    }
}
