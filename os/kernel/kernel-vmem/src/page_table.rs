//! # x86-64 Page Tables
//!
//! One level of the translation hierarchy and the packed entries it holds.
//!
//! - [`PageTableEntry`]: a 64-bit word of frame address plus [`PageFlags`].
//! - [`PageTable`]: a 4 KiB-aligned array of 512 entries, one frame in size.
//! - [`Level`] / [`TableIndex`]: which 9-bit field of a virtual address selects
//!   the entry at each level.
//!
//! All four levels share the same entry format. Only 4 KiB leaves exist, so
//! `PS` is never set by this module.

use crate::page_flags::ADDRESS_MASK;
use crate::{PageFlags, VmemError};
use core::fmt;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};

/// Entries per table.
pub const ENTRIES: usize = 512;

/// A single page-table entry.
///
/// If `present` is clear, the address bits carry no meaning and are never
/// followed.
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Construct from a raw 64-bit value. No validation is performed.
    #[inline]
    #[must_use]
    pub const fn from_raw(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// A present leaf mapping `frame` with `flags`.
    ///
    /// # Errors
    /// [`VmemError::UnsupportedFlags`] if `flags` carries address or `PS` bits.
    pub fn leaf(frame: PhysicalPage, flags: PageFlags) -> Result<Self, VmemError> {
        let mut e = Self::zero();
        e.set_address(frame.base())?;
        e.set_flags(flags.with_present(true))?;
        Ok(e)
    }

    /// A present, writable, kernel-only link to the next-level table at `frame`.
    #[must_use]
    pub const fn table(frame: PhysicalPage) -> Self {
        Self((frame.base().as_u64() & ADDRESS_MASK) | PageFlags::KERNEL_RW.into_bits())
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.get_flags().present()
    }

    #[inline]
    #[must_use]
    pub const fn get_flags(self) -> PageFlags {
        PageFlags::from_bits(self.0 & !ADDRESS_MASK)
    }

    /// Replace all flag bits, keeping the address.
    ///
    /// # Errors
    /// [`VmemError::UnsupportedFlags`] if `flags` carries address bits or `PS`.
    pub fn set_flags(&mut self, flags: PageFlags) -> Result<(), VmemError> {
        if flags.has_address_bits() || flags.huge_page() {
            return Err(VmemError::UnsupportedFlags(flags.into_bits()));
        }
        self.0 = (self.0 & ADDRESS_MASK) | flags.into_bits();
        Ok(())
    }

    #[inline]
    #[must_use]
    pub const fn get_address(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 & ADDRESS_MASK)
    }

    /// Replace the address bits, keeping the flags.
    ///
    /// # Errors
    /// - [`VmemError::UnalignedAddress`] if the low 12 bits are set.
    /// - [`VmemError::AddressOutOfRange`] if any bit above 51 is set.
    pub fn set_address(&mut self, addr: PhysicalAddress) -> Result<(), VmemError> {
        let a = addr.as_u64();
        if !addr.is_page_aligned() {
            return Err(VmemError::UnalignedAddress(a));
        }
        if a & !ADDRESS_MASK != 0 {
            return Err(VmemError::AddressOutOfRange(a));
        }
        self.0 = (self.0 & !ADDRESS_MASK) | a;
        Ok(())
    }

    /// The referenced frame, if present.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> Option<PhysicalPage> {
        if self.is_present() {
            Some(PhysicalPage::containing(self.get_address()))
        } else {
            None
        }
    }

    #[inline]
    pub const fn clear(&mut self) {
        self.0 = 0;
    }
}

impl fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageTableEntry")
            .field("address", &self.get_address())
            .field("flags", &self.get_flags())
            .finish()
    }
}

/// Paging level, from the root down.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Level {
    /// Page Map Level 4 (VA bits 47–39).
    Pml4,
    /// Page Directory Pointer Table (VA bits 38–30).
    Pdpt,
    /// Page Directory (VA bits 29–21).
    Pd,
    /// Page Table (VA bits 20–12); holds the leaves.
    Pt,
}

impl Level {
    /// The levels whose entries link to another table.
    pub const INTERMEDIATE: [Self; 3] = [Self::Pml4, Self::Pdpt, Self::Pd];

    #[inline]
    #[must_use]
    pub const fn shift(self) -> u32 {
        match self {
            Self::Pml4 => 39,
            Self::Pdpt => 30,
            Self::Pd => 21,
            Self::Pt => 12,
        }
    }

    /// The entry index selected by `va` at this level.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index_of(self, va: VirtualAddress) -> TableIndex {
        TableIndex(((va.as_u64() >> self.shift()) & 0x1FF) as u16)
    }
}

/// Index into a [`PageTable`]; always in `0..512`.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    /// `None` if `v >= 512`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(v: usize) -> Option<Self> {
        if v < ENTRIES {
            Some(Self(v as u16))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// One page-table frame: 512 entries, 4 KiB-aligned.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; ENTRIES],
}

const _: () = assert!(size_of::<PageTable>() == 4096);

impl PageTable {
    /// A fully zeroed table (all entries non-present).
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [PageTableEntry::zero(); ENTRIES],
        }
    }

    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageTableEntry::zero());
    }

    /// # Errors
    /// [`VmemError::IndexOutOfBounds`] if `index >= 512`.
    #[inline]
    pub fn get(&self, index: usize) -> Result<PageTableEntry, VmemError> {
        self.entries
            .get(index)
            .copied()
            .ok_or(VmemError::IndexOutOfBounds(index))
    }

    /// # Errors
    /// [`VmemError::IndexOutOfBounds`] if `index >= 512`.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Result<&mut PageTableEntry, VmemError> {
        self.entries
            .get_mut(index)
            .ok_or(VmemError::IndexOutOfBounds(index))
    }

    #[inline]
    #[must_use]
    pub const fn entry(&self, index: TableIndex) -> PageTableEntry {
        self.entries[index.as_usize()]
    }

    #[inline]
    pub const fn entry_mut(&mut self, index: TableIndex) -> &mut PageTableEntry {
        &mut self.entries[index.as_usize()]
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_is_zero() {
        let t = PageTable::new();
        assert!((0..512).all(|i| t.get(i).is_ok_and(|e| e.raw() == 0)));
    }

    #[test]
    fn get_is_bounds_checked() {
        let mut t = PageTable::new();
        assert!(t.get(511).is_ok());
        assert_eq!(t.get(512), Err(VmemError::IndexOutOfBounds(512)));
        assert!(t.get_mut(4096).is_err());
        assert!(TableIndex::new(512).is_none());
    }

    #[test]
    fn address_and_flags_are_independent() {
        let mut e = PageTableEntry::zero();
        e.set_address(PhysicalAddress::new(0x0000_0001_2345_6000)).unwrap();
        e.set_flags(PageFlags::KERNEL_RW.with_no_execute(true)).unwrap();
        assert_eq!(e.get_address().as_u64(), 0x0000_0001_2345_6000);
        assert!(e.get_flags().writable());
        assert!(e.get_flags().no_execute());

        e.set_flags(PageFlags::KERNEL_RO).unwrap();
        assert_eq!(e.get_address().as_u64(), 0x0000_0001_2345_6000);
        assert!(!e.get_flags().writable());
    }

    #[test]
    fn set_address_rejects_instead_of_masking() {
        let mut e = PageTableEntry::zero();
        assert_eq!(
            e.set_address(PhysicalAddress::new(0x1001)),
            Err(VmemError::UnalignedAddress(0x1001))
        );
        assert_eq!(
            e.set_address(PhysicalAddress::new(1 << 52)),
            Err(VmemError::AddressOutOfRange(1 << 52))
        );
        assert_eq!(e.raw(), 0);
    }

    #[test]
    fn set_flags_rejects_address_and_large_page_bits() {
        let mut e = PageTableEntry::zero();
        assert!(matches!(
            e.set_flags(PageFlags::from_bits(0x3000 | 1)),
            Err(VmemError::UnsupportedFlags(_))
        ));
        assert!(matches!(
            e.set_flags(PageFlags::KERNEL_RW.with_huge_page(true)),
            Err(VmemError::UnsupportedFlags(_))
        ));
    }

    #[test]
    fn absent_entry_has_no_frame() {
        let mut e = PageTableEntry::table(PhysicalPage::from_frame_index(9));
        assert_eq!(e.frame(), Some(PhysicalPage::from_frame_index(9)));
        e.clear();
        assert_eq!(e.frame(), None);
    }

    #[test]
    fn level_indices_split_the_address() {
        let va = VirtualAddress::new(0xFFFF_FFFF_8020_3000);
        assert_eq!(Level::Pml4.index_of(va).as_usize(), 511);
        assert_eq!(Level::Pdpt.index_of(va).as_usize(), 510);
        assert_eq!(Level::Pd.index_of(va).as_usize(), 1);
        assert_eq!(Level::Pt.index_of(va).as_usize(), 3);
    }
}
