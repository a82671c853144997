use crate::{PAGE_OFFSET_MASK, PAGE_SHIFT, PAGE_SIZE, PhysicalAddress};
use core::fmt;

/// Base of a 4 KiB physical frame.
///
/// The low 12 bits are always zero. A frame is also identified by its
/// **frame index**, `base / 4096`, which is what the frame bitmap is keyed by.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// let frame = PhysicalPage::from_frame_index(3);
/// assert_eq!(frame.base().as_u64(), 0x3000);
/// assert_eq!(frame.join(0x10).as_u64(), 0x3010);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage(u64);

impl PhysicalPage {
    /// The frame containing `addr` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing(addr: PhysicalAddress) -> Self {
        Self(addr.as_u64() & !PAGE_OFFSET_MASK)
    }

    /// The frame starting at `addr`, or `None` if `addr` is not 4 KiB-aligned.
    #[inline]
    #[must_use]
    pub const fn try_from_addr(addr: PhysicalAddress) -> Option<Self> {
        if addr.is_page_aligned() {
            Some(Self(addr.as_u64()))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn from_frame_index(index: usize) -> Self {
        Self((index as u64) << PAGE_SHIFT)
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn frame_index(self) -> usize {
        (self.0 >> PAGE_SHIFT) as usize
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0)
    }

    /// Combine with an in-frame byte offset (`< 4096`).
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u64) -> PhysicalAddress {
        debug_assert!(offset < PAGE_SIZE);
        PhysicalAddress::new(self.0 | (offset & PAGE_OFFSET_MASK))
    }

    /// The frame `count` frames above this one.
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

impl fmt::Debug for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}
