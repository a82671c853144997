//! # TLB Maintenance

use kernel_memory_addresses::VirtualPage;

/// Invalidate the translation of `page` on the current processor.
///
/// # Safety
/// Ring 0 only.
#[inline]
pub unsafe fn invlpg(page: VirtualPage) {
    let va = page.base().as_u64();
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) va, options(nostack, preserves_flags));
    }
}
