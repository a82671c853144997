#[cfg(feature = "asm")]
use crate::StoreRegisterUnsafe;
use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalPage;

/// CR3: Page-Map Level-4 Base Register (IA-32e, PCID disabled).
///
/// Holds the frame of the PML4 table and cache-control flags for PML4 walks.
/// Writing CR3 switches the active address space and flushes all non-global
/// TLB entries on the current processor.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Cr3 {
    /// Bits 0–2: reserved (must be 0).
    #[bits(3)]
    __: u8,

    /// Bit 3: PWT, page-level write-through for PML4 accesses.
    pub pwt: bool,

    /// Bit 4: PCD, page-level cache disable for PML4 accesses.
    pub pcd: bool,

    /// Bits 5–11: reserved (must be 0 when written).
    #[bits(7)]
    __: u8,

    /// Bits 12–51: PML4 physical base >> 12.
    #[bits(40)]
    pml4_base_4k: u64,

    /// Bits 52–63: reserved.
    #[bits(12)]
    __: u16,
}

impl Cr3 {
    /// Create a `Cr3` value that selects `root` as the PML4, with write-back caching.
    #[must_use]
    pub const fn from_root(root: PhysicalPage) -> Self {
        Self::new().with_pml4_base_4k(root.base().as_u64() >> 12)
    }
}

/// # Safety
/// The tables under the selected PML4 must map the executing code and stack.
#[cfg(feature = "asm")]
impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_frame_occupies_bits_12_to_51() {
        let root = PhysicalPage::from_frame_index(0x1_2345);
        let cr3 = Cr3::from_root(root);
        assert_eq!(cr3.into_bits(), 0x1_2345_000);
        assert_eq!(cr3.pml4_base_4k(), 0x1_2345);
        assert!(!cr3.pwt() && !cr3.pcd());
    }

    #[test]
    fn flags_do_not_disturb_root() {
        let root = PhysicalPage::from_frame_index(7);
        let cr3 = Cr3::from_root(root).with_pcd(true);
        assert_eq!(cr3.into_bits(), 0x7000 | (1 << 4));
        assert_eq!(cr3.pml4_base_4k(), 7);
    }
}
