use bitfield_struct::bitfield;

/// Bits 12–51 of an entry: the physical frame address.
pub const ADDRESS_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// Permission and status bits of a page-table entry, with the address bits masked out.
///
/// Shares the bit layout of a raw entry so that a `PageFlags` can be or-ed onto
/// a frame address directly. The address field is padding here; a flags word
/// that carries address bits is rejected by
/// [`PageTableEntry::set_flags`](crate::PageTableEntry::set_flags).
///
/// ### Bit layout
///
/// | Bits      | Name / Mnemonic   | Meaning |
/// |-----------|-------------------|----------|
/// | 0         | `P` (present)     | Valid entry if set |
/// | 1         | `RW`              | Writable if set |
/// | 2         | `US`              | User-mode accessible if set |
/// | 3         | `PWT`             | Write-through caching |
/// | 4         | `PCD`             | Disable caching |
/// | 5         | `A`               | Accessed |
/// | 6         | `D`               | Dirty (leaf only) |
/// | 7         | `PS`              | Large page; never set by this crate |
/// | 8         | `G`               | Global (leaf only) |
/// | 9–11      | OS avail low      | Reserved for OS use |
/// | 12–51     | (address)         | Not part of the flags |
/// | 52–58     | OS avail high     | Reserved for OS use |
/// | 59–62     | `PKU`             | Protection key |
/// | 63        | `NX`              | Execute disable |
///
/// ```rust
/// # use kernel_vmem::PageFlags;
/// let f = PageFlags::KERNEL_RW.with_no_execute(true);
/// assert!(f.present() && f.writable() && f.no_execute());
/// assert_eq!(f.into_bits(), (1 << 63) | 0b11);
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq, Hash)]
pub struct PageFlags {
    /// Present (P, bit 0).
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU.
    pub accessed: bool,

    /// Dirty (D, bit 6). Set by the CPU on first write to a leaf.
    pub dirty: bool,

    /// Page Size (PS, bit 7).
    ///
    /// Only 4 KiB pages are supported; a present intermediate entry with this
    /// bit set is treated as corruption.
    pub huge_page: bool,

    /// Global (G, bit 8).
    pub global: bool,

    /// OS-available low bits (9–11).
    #[bits(3)]
    pub os_low: u8,

    /// Address bits (12–51); zero in a valid flags word.
    #[bits(40)]
    __: u64,

    /// OS-available high bits (52–58).
    #[bits(7)]
    pub os_high: u8,

    /// Protection Key (bits 59–62).
    #[bits(4)]
    pub protection_key: u8,

    /// No-Execute (NX, bit 63).
    pub no_execute: bool,
}

impl PageFlags {
    /// Present, read-only, supervisor.
    pub const KERNEL_RO: Self = Self::new().with_present(true);

    /// Present, writable, supervisor.
    pub const KERNEL_RW: Self = Self::KERNEL_RO.with_writable(true);

    /// Flags for a leaf with the given permissions.
    ///
    /// Readability is implied by presence on x86-64.
    #[must_use]
    pub const fn for_permissions(writable: bool, executable: bool, user: bool) -> Self {
        Self::KERNEL_RO
            .with_writable(writable)
            .with_no_execute(!executable)
            .with_user_access(user)
    }

    /// `true` if any of bits 12–51 are set.
    #[inline]
    #[must_use]
    pub const fn has_address_bits(self) -> bool {
        self.into_bits() & ADDRESS_MASK != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_flags_map_to_hardware_bits() {
        let code = PageFlags::for_permissions(false, true, false);
        assert_eq!(code.into_bits(), 0b1);

        let data = PageFlags::for_permissions(true, false, false);
        assert_eq!(data.into_bits(), (1 << 63) | 0b11);

        let user = PageFlags::for_permissions(true, true, true);
        assert_eq!(user.into_bits(), 0b111);
    }

    #[test]
    fn address_bits_are_detected() {
        assert!(!PageFlags::KERNEL_RW.has_address_bits());
        assert!(PageFlags::from_bits(0x1000 | 1).has_address_bits());
        assert!(!PageFlags::new().with_os_high(0x7f).has_address_bits());
    }
}
