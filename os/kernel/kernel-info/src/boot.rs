//! # Boot Memory Description
//!
//! Records handed over by the loader that describe physical memory and the
//! kernel image. They are read once while the memory manager initializes.

use crate::memory::MemoryLayout;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalRange, VirtualAddress, checked_align_up};

/// One entry of the physical memory map.
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PhysicalMemoryRegion {
    /// Physical base address in bytes.
    pub base: u64,
    /// Length in bytes.
    pub size: u64,
    /// `true` if the region is RAM the kernel may hand out.
    pub usable: bool,
}

impl PhysicalMemoryRegion {
    #[must_use]
    pub const fn usable(base: u64, size: u64) -> Self {
        Self { base, size, usable: true }
    }

    #[must_use]
    pub const fn reserved(base: u64, size: u64) -> Self {
        Self { base, size, usable: false }
    }

    #[must_use]
    pub const fn range(&self) -> PhysicalRange {
        PhysicalRange::new(PhysicalAddress::new(self.base), self.size)
    }
}

/// One loaded section of the kernel image, described by its virtual placement.
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct KernelImageRegion {
    /// Virtual base address; must not lie below the kernel base.
    pub virtual_base: u64,
    /// Length in bytes. Rounded up to whole pages when mapped.
    pub size: u64,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
}

impl KernelImageRegion {
    #[must_use]
    pub const fn virtual_base(&self) -> VirtualAddress {
        VirtualAddress::new(self.virtual_base)
    }

    /// `size` rounded up to a multiple of the page size.
    #[must_use]
    pub const fn mapped_size(&self) -> Option<u64> {
        checked_align_up(self.size, PAGE_SIZE)
    }

    /// Physical range occupied by this region under `layout`.
    #[must_use]
    pub const fn physical_range(&self, layout: &MemoryLayout) -> Option<PhysicalRange> {
        match layout.kernel_to_phys(self.virtual_base()) {
            Some(base) => Some(PhysicalRange::new(base, self.size)),
            None => None,
        }
    }
}

/// The complete boot-time memory description.
#[derive(Debug, Copy, Clone)]
pub struct BootMemoryMap<'a> {
    pub regions: &'a [PhysicalMemoryRegion],
    pub kernel_regions: &'a [KernelImageRegion],
}

impl<'a> BootMemoryMap<'a> {
    #[must_use]
    pub const fn new(regions: &'a [PhysicalMemoryRegion], kernel_regions: &'a [KernelImageRegion]) -> Self {
        Self {
            regions,
            kernel_regions,
        }
    }

    /// Exclusive end of the highest described physical byte.
    #[must_use]
    pub fn highest_address(&self) -> u64 {
        self.regions.iter().map(|r| r.range().end()).max().unwrap_or(0)
    }

    /// The smallest physical range enclosing every kernel image region.
    ///
    /// Regions below the kernel base are ignored; `None` if nothing remains.
    #[must_use]
    pub fn kernel_image_span(&self, layout: &MemoryLayout) -> Option<PhysicalRange> {
        let mut lo = u64::MAX;
        let mut hi = 0u64;
        for range in self.kernel_regions.iter().filter_map(|r| r.physical_range(layout)) {
            if range.is_empty() {
                continue;
            }
            lo = lo.min(range.base().as_u64());
            hi = hi.max(range.end());
        }
        (lo < hi).then(|| PhysicalRange::new(PhysicalAddress::new(lo), hi - lo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{KERNEL_BASE, PHYS_LOAD};

    #[test]
    fn kernel_span_encloses_all_sections() {
        let kernel = [
            KernelImageRegion {
                virtual_base: KERNEL_BASE,
                size: 0x1800,
                readable: true,
                writable: false,
                executable: true,
            },
            KernelImageRegion {
                virtual_base: KERNEL_BASE + 0x4000,
                size: 0x1000,
                readable: true,
                writable: true,
                executable: false,
            },
        ];
        let map = BootMemoryMap::new(&[], &kernel);
        let span = map.kernel_image_span(&MemoryLayout::DEFAULT);
        assert_eq!(span, Some(PhysicalRange::new(PhysicalAddress::new(PHYS_LOAD), 0x5000)));
    }

    #[test]
    fn highest_address_includes_reserved_regions() {
        let regions = [
            PhysicalMemoryRegion::usable(0, 0x10_0000),
            PhysicalMemoryRegion::reserved(0xF000_0000, 0x1000),
        ];
        let map = BootMemoryMap::new(&regions, &[]);
        assert_eq!(map.highest_address(), 0xF000_1000);
    }

    #[test]
    fn mapped_size_rounds_up() {
        let r = KernelImageRegion {
            virtual_base: KERNEL_BASE,
            size: 1,
            readable: true,
            writable: true,
            executable: false,
        };
        assert_eq!(r.mapped_size(), Some(PAGE_SIZE));
    }
}
