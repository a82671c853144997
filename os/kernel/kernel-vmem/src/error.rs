use crate::Level;
use kernel_memory_addresses::{PhysicalPage, VirtualPage};

/// Failures of page-table construction and manipulation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmemError {
    #[error("address {0:#x} is not 4 KiB aligned")]
    UnalignedAddress(u64),
    #[error("size {0:#x} is not a positive multiple of 4 KiB")]
    UnalignedSize(u64),
    #[error("physical address {0:#x} does not fit in 52 bits")]
    AddressOutOfRange(u64),
    #[error("range of {size:#x} bytes at {base:#x} wraps around the address space")]
    RangeOverflow { base: u64, size: u64 },
    #[error("flags {0:#018x} carry address or large-page bits")]
    UnsupportedFlags(u64),
    #[error("table index {0} is outside 0..512")]
    IndexOutOfBounds(usize),
    #[error("virtual page {0} is already mapped")]
    AlreadyMapped(VirtualPage),
    #[error("virtual page {0} is not mapped")]
    NotMapped(VirtualPage),
    #[error("no table present below this entry")]
    NotPresent,
    #[error("no physical frame left for a page table")]
    OutOfMemory,
    /// A present intermediate entry with `PS` set.
    #[error("corrupt {level:?} entry {raw:#018x}")]
    CorruptEntry { level: Level, raw: u64 },
    /// A table frame that cannot be reached through the physical mapper.
    #[error("table frame {0} lies outside the direct map")]
    OutsideDirectMap(PhysicalPage),
}

impl VmemError {
    /// `true` for structural corruption of the page tables.
    ///
    /// The tables can no longer be trusted; halting is the only safe reaction.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::CorruptEntry { .. } | Self::OutsideDirectMap(_))
    }
}
