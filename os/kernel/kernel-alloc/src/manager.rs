//! # Memory Manager
//!
//! Ties the frame allocator and the kernel address space together behind
//! spin locks. The kernel builds exactly one [`MemoryManager`] during boot and
//! installs it in a [`SyncOnceCell`]; a second installation is refused.
//!
//! ## Locking
//!
//! Operations that may create page tables take the address-space lock first
//! and the frame lock second. Nothing takes them in the opposite order, and
//! neither lock is held across a call that could block.

use crate::frame_alloc::{BitmapFrameAlloc, FrameAllocError};
use crate::vmm::{Vmm, VmmError};
use kernel_info::boot::BootMemoryMap;
use kernel_info::memory::MemoryLayout;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};
use kernel_sync::{OnceInitError, SpinLock, SyncOnceCell};
use kernel_vmem::{Mmu, PageFlags, PageState, PhysMapper};
use log::info;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MemoryInitError {
    #[error("the memory manager is already initialized")]
    AlreadyInitialized,
    #[error("frame allocator initialization failed: {0}")]
    FrameAlloc(#[from] FrameAllocError),
    #[error("kernel address space initialization failed: {0}")]
    Vmm(#[from] VmmError),
}

/// Physical frames and the kernel address space.
pub struct MemoryManager<'a, M: PhysMapper, T: Mmu> {
    kernel_space: SpinLock<Vmm<'a, M, T>>,
    frames: SpinLock<BitmapFrameAlloc<'a>>,
}

impl<'a, M: PhysMapper, T: Mmu> MemoryManager<'a, M, T> {
    /// Initialize the frame allocator from `boot`, then build and activate
    /// the kernel address space.
    ///
    /// The physical span of the kernel image is kept out of the allocator.
    ///
    /// # Safety
    /// As for [`BitmapFrameAlloc::init`] and [`Vmm::init`]. Call through
    /// [`install`](Self::install) to guarantee a single initialization.
    ///
    /// # Errors
    /// Any error of the two initialization steps.
    pub unsafe fn init(
        mapper: &'a M,
        mmu: T,
        layout: &MemoryLayout,
        boot: &BootMemoryMap<'_>,
    ) -> Result<Self, MemoryInitError> {
        let kernel = boot.kernel_image_span(layout);
        if let Some(span) = kernel {
            info!("Kernel image occupies {}..+{:#x}", span.base(), span.size());
        }

        // SAFETY: forwarded to the caller.
        let mut frames = unsafe { BitmapFrameAlloc::init(mapper, boot.regions, kernel.as_slice())? };
        // SAFETY: forwarded to the caller.
        let vmm = unsafe { Vmm::init(&mut frames, mapper, mmu, layout, boot.kernel_regions)? };

        info!(
            "Memory manager ready: {} of {} frames free",
            frames.free_frames(),
            frames.total_frames()
        );
        Ok(Self {
            kernel_space: SpinLock::new(vmm),
            frames: SpinLock::new(frames),
        })
    }

    /// Initialize into `cell`, at most once.
    ///
    /// A failed initialization leaves `cell` empty.
    ///
    /// # Safety
    /// As for [`init`](Self::init).
    ///
    /// # Errors
    /// - [`MemoryInitError::AlreadyInitialized`] if `cell` is or is being filled.
    /// - Any error of [`init`](Self::init).
    pub unsafe fn install<'c>(
        cell: &'c SyncOnceCell<Self>,
        mapper: &'a M,
        mmu: T,
        layout: &MemoryLayout,
        boot: &BootMemoryMap<'_>,
    ) -> Result<&'c Self, MemoryInitError> {
        // SAFETY: forwarded to the caller.
        cell.try_init(|| unsafe { Self::init(mapper, mmu, layout, boot) })
            .map_err(|e| match e {
                OnceInitError::AlreadyInitialized => MemoryInitError::AlreadyInitialized,
                OnceInitError::Failed(e) => e,
            })
    }

    /// Allocate `count` contiguous physical frames.
    ///
    /// # Errors
    /// See [`BitmapFrameAlloc::alloc`].
    pub fn alloc(&self, count: usize) -> Result<PhysicalPage, FrameAllocError> {
        self.frames.lock().alloc(count)
    }

    /// Return `count` frames starting at `base`.
    ///
    /// Frames that were mapped must be unmapped first.
    ///
    /// # Errors
    /// See [`BitmapFrameAlloc::free`].
    pub fn free(&self, base: PhysicalAddress, count: usize) -> Result<(), FrameAllocError> {
        self.frames.lock().free(base, count)
    }

    /// Map `size` bytes at `va` to `pa` in the kernel address space.
    ///
    /// # Errors
    /// See [`Vmm::map`].
    pub fn map(&self, va: VirtualAddress, pa: PhysicalAddress, size: u64, flags: PageFlags) -> Result<(), VmmError> {
        let mut space = self.kernel_space.lock();
        let mut frames = self.frames.lock();
        space.map(&mut *frames, va, pa, size, flags)
    }

    /// # Errors
    /// See [`Vmm::unmap`].
    pub fn unmap(&self, va: VirtualAddress, size: u64) -> Result<(), VmmError> {
        self.kernel_space.lock().unmap(va, size)
    }

    /// # Errors
    /// Only for corrupt tables.
    pub fn query(&self, va: VirtualAddress) -> Result<PageState, VmmError> {
        self.kernel_space.lock().query(va)
    }

    /// # Errors
    /// Only for corrupt tables.
    pub fn translate(&self, va: VirtualAddress) -> Result<Option<PhysicalAddress>, VmmError> {
        self.kernel_space.lock().translate(va)
    }

    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.frames.lock().free_frames()
    }

    /// Root table of the kernel address space.
    #[must_use]
    pub fn root_page(&self) -> PhysicalPage {
        self.kernel_space.lock().root_page()
    }

    /// Run `f` with the kernel address space locked.
    pub fn with_kernel_space<R>(&self, f: impl FnOnce(&mut Vmm<'a, M, T>) -> R) -> R {
        self.kernel_space.with_lock(f)
    }
}

#[cfg(feature = "asm")]
pub use global::{KernelMemory, init_kernel_memory, kernel_memory};

#[cfg(feature = "asm")]
mod global {
    use super::{MemoryInitError, MemoryManager};
    use crate::phys_mapper::HhdmPhysMapper;
    use kernel_info::boot::BootMemoryMap;
    use kernel_info::memory::MemoryLayout;
    use kernel_sync::SyncOnceCell;
    use kernel_vmem::X86Mmu;

    /// The memory manager of the running kernel.
    pub type KernelMemory = MemoryManager<'static, HhdmPhysMapper, X86Mmu>;

    static HHDM: HhdmPhysMapper = HhdmPhysMapper::new(&MemoryLayout::DEFAULT);
    static KERNEL_MEMORY: SyncOnceCell<KernelMemory> = SyncOnceCell::new();

    /// Build the kernel memory manager from the loader's memory map.
    ///
    /// # Safety
    /// Must run at CPL0 on the bootstrap processor while the loader's tables
    /// map the direct map described by [`MemoryLayout::DEFAULT`].
    ///
    /// # Errors
    /// See [`MemoryManager::install`].
    pub unsafe fn init_kernel_memory(boot: &BootMemoryMap<'_>) -> Result<&'static KernelMemory, MemoryInitError> {
        // SAFETY: forwarded to the caller.
        unsafe { MemoryManager::install(&KERNEL_MEMORY, &HHDM, X86Mmu, &MemoryLayout::DEFAULT, boot) }
    }

    /// The installed memory manager, if initialization has completed.
    #[must_use]
    pub fn kernel_memory() -> Option<&'static KernelMemory> {
        KERNEL_MEMORY.get()
    }
}
