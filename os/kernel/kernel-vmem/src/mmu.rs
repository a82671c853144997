//! # Processor Translation State
//!
//! The page-table code never touches CR3 or the TLB directly; it goes through
//! an [`Mmu`]. On hardware that is [`X86Mmu`] (feature `asm`); hosted tests
//! substitute a recorder.

use kernel_memory_addresses::{PhysicalPage, VirtualPage};

/// Translation-cache maintenance and address-space activation.
pub trait Mmu {
    /// Drop any cached translation of `page` on the current processor.
    fn invalidate_page(&mut self, page: VirtualPage);

    /// Drop any cached translation of `page` on every other processor.
    ///
    /// Must not return before each remote processor acknowledged the
    /// invalidation, so that a caller may reuse the old frame afterwards.
    fn shootdown(&mut self, page: VirtualPage);

    /// Make the table rooted at `root` the active translation context.
    ///
    /// # Safety
    /// The tables under `root` must map the currently executing code, its stack,
    /// and every structure referenced after the switch.
    unsafe fn activate(&mut self, root: PhysicalPage);
}

/// The bare-metal [`Mmu`]: `invlpg` and CR3 writes.
///
/// Remote invalidation is a no-op while only the bootstrap processor runs; an
/// SMP kernel replaces [`Mmu::shootdown`] with an IPI broadcast that waits for
/// every target to acknowledge.
#[cfg(feature = "asm")]
#[derive(Debug, Default, Copy, Clone)]
pub struct X86Mmu;

#[cfg(feature = "asm")]
impl Mmu for X86Mmu {
    #[inline]
    fn invalidate_page(&mut self, page: VirtualPage) {
        // SAFETY: the memory manager only runs in ring 0.
        unsafe { kernel_registers::tlb::invlpg(page) };
    }

    #[inline]
    fn shootdown(&mut self, _page: VirtualPage) {}

    unsafe fn activate(&mut self, root: PhysicalPage) {
        use kernel_registers::{Cr3, StoreRegisterUnsafe};
        unsafe { Cr3::from_root(root).store_unsafe() };
    }
}
