//! # Kernel Virtual Memory Manager
//!
//! Builds the kernel's initial address space and afterwards edits it.
//!
//! [`Vmm::init`] produces this layout and activates it:
//!
//! ```text
//! 0x0000_0000_0000_0000  identity map of [0, span), page 0 left unmapped
//! direct_map_base        direct map of [0, span), present + writable
//! kernel_virt_base       kernel image sections, permissions per section
//! ```
//!
//! The [`Vmm`] does not own a frame source. Every operation that may build
//! tables takes the allocator explicitly so the caller decides how frames and
//! the address space are locked.

use kernel_info::boot::KernelImageRegion;
use kernel_info::memory::MemoryLayout;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress, VirtualPage};
use kernel_vmem::{AddressSpace, FrameAlloc, Mmu, PageFlags, PageState, PhysMapper, VmemError};
use log::{debug, info};

/// Failures of kernel address-space construction and editing.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmmError {
    #[error(transparent)]
    Vmem(#[from] VmemError),
    #[error("kernel region at {0} lies below the kernel base")]
    RegionBelowKernelBase(VirtualAddress),
}

impl VmmError {
    /// `true` if the page tables are corrupt.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Vmem(e) => e.is_fatal(),
            Self::RegionBelowKernelBase(_) => false,
        }
    }
}

/// The kernel address space.
pub struct Vmm<'m, M: PhysMapper, T: Mmu> {
    space: AddressSpace<'m, M, T>,
}

impl<'m, M: PhysMapper, T: Mmu> Vmm<'m, M, T> {
    /// Build the kernel address space and make it active.
    ///
    /// # Safety
    /// - Runs once, at CPL0, while the loader's tables are active and map
    ///   every frame `alloc` hands out at the address `mapper` expects.
    /// - `kernel_regions` must describe the running kernel, including the
    ///   current stack; anything else is unreachable after activation.
    ///
    /// # Errors
    /// - [`VmmError::RegionBelowKernelBase`] for a region outside the kernel window.
    /// - Any [`VmemError`] from building the tables. Frames already used for
    ///   tables are not returned.
    pub unsafe fn init<A: FrameAlloc>(
        alloc: &mut A,
        mapper: &'m M,
        mmu: T,
        layout: &MemoryLayout,
        kernel_regions: &[KernelImageRegion],
    ) -> Result<Self, VmmError> {
        let mut space = AddressSpace::new(mapper, mmu, alloc)?;
        let span = layout.direct_map_span;
        let zero = PhysicalAddress::zero();

        space.map(alloc, VirtualAddress::zero(), zero, span, PageFlags::KERNEL_RW)?;
        space.map(alloc, layout.direct_map_base, zero, span, PageFlags::KERNEL_RW)?;
        // Null dereferences must fault.
        space.unmap_page(VirtualPage::containing_address(VirtualAddress::zero()))?;
        info!(
            "Mapped {span:#x} bytes of physical memory at 0 and at {}",
            layout.direct_map_base
        );

        for region in kernel_regions {
            Self::map_kernel_region(&mut space, alloc, layout, region)?;
        }

        let mut vmm = Self { space };
        // SAFETY: the caller guarantees the new tables map the running kernel.
        unsafe { vmm.space.activate() };
        info!("Kernel address space active, root {}", vmm.root_page());
        Ok(vmm)
    }

    fn map_kernel_region<A: FrameAlloc>(
        space: &mut AddressSpace<'m, M, T>,
        alloc: &mut A,
        layout: &MemoryLayout,
        region: &KernelImageRegion,
    ) -> Result<(), VmmError> {
        let va = region.virtual_base();
        let size = region.mapped_size().ok_or(VmemError::RangeOverflow {
            base: va.as_u64(),
            size: region.size,
        })?;
        if size == 0 {
            return Ok(());
        }
        let pa = layout
            .kernel_to_phys(va)
            .ok_or(VmmError::RegionBelowKernelBase(va))?;

        let flags = flags_for_region(region);
        debug!(
            "Kernel region {va}..+{size:#x} -> {pa} (w={}, x={})",
            region.writable, region.executable
        );
        space.map(alloc, va, pa, size, flags)?;
        Ok(())
    }

    #[inline]
    #[must_use]
    pub const fn address_space(&self) -> &AddressSpace<'m, M, T> {
        &self.space
    }

    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> PhysicalPage {
        self.space.root_page()
    }

    /// Map `size` bytes at `va` to `pa`. All-or-nothing.
    ///
    /// # Errors
    /// See [`AddressSpace::map`].
    pub fn map<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        size: u64,
        flags: PageFlags,
    ) -> Result<(), VmmError> {
        Ok(self.space.map(alloc, va, pa, size, flags)?)
    }

    /// Unmap `size` bytes at `va`. All-or-nothing.
    ///
    /// The frames are not freed; they may be reused once this returns.
    ///
    /// # Errors
    /// See [`AddressSpace::unmap`].
    pub fn unmap(&mut self, va: VirtualAddress, size: u64) -> Result<(), VmmError> {
        Ok(self.space.unmap(va, size)?)
    }

    /// # Errors
    /// Only for corrupt tables.
    pub fn query(&self, va: VirtualAddress) -> Result<PageState, VmmError> {
        Ok(self.space.query(va)?)
    }

    /// # Errors
    /// Only for corrupt tables.
    pub fn translate(&self, va: VirtualAddress) -> Result<Option<PhysicalAddress>, VmmError> {
        Ok(self.space.translate(va)?)
    }
}

/// Leaf flags for a kernel image section.
#[must_use]
pub const fn flags_for_region(region: &KernelImageRegion) -> PageFlags {
    PageFlags::for_permissions(region.writable, region.executable, false)
}
