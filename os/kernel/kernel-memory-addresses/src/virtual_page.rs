use crate::{PAGE_OFFSET_MASK, PAGE_SIZE, VirtualAddress};
use core::fmt;

/// Base of a 4 KiB virtual page.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage(u64);

impl VirtualPage {
    /// The page containing `addr` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: VirtualAddress) -> Self {
        Self(addr.as_u64() & !PAGE_OFFSET_MASK)
    }

    /// The page starting at `addr`, or `None` if `addr` is not 4 KiB-aligned.
    #[inline]
    #[must_use]
    pub const fn try_from_addr(addr: VirtualAddress) -> Option<Self> {
        if addr.is_page_aligned() {
            Some(Self(addr.as_u64()))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.0)
    }

    /// Combine with an in-page byte offset (`< 4096`).
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u64) -> VirtualAddress {
        debug_assert!(offset < PAGE_SIZE);
        VirtualAddress::new(self.0 | (offset & PAGE_OFFSET_MASK))
    }

    /// The page `count` pages above this one.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, count: u64) -> Option<Self> {
        match count.checked_mul(PAGE_SIZE) {
            Some(bytes) => match self.0.checked_add(bytes) {
                Some(v) => Some(Self(v)),
                None => None,
            },
            None => None,
        }
    }
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage(0x{:016X})", self.0)
    }
}

impl fmt::Display for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}
