use crate::{PAGE_SIZE, PhysicalAddress, align_down, checked_align_up};
use core::fmt;
use core::ops::Range;

/// A span `[base, base + size)` of physical memory.
///
/// Ranges are not required to be frame-aligned. Two frame views exist:
///
/// - [`covering_frames`](Self::covering_frames): every frame the range touches,
///   used when **reserving** memory (kernel image, allocator metadata).
/// - [`contained_frames`](Self::contained_frames): only frames that lie fully
///   inside the range, used when **releasing** usable memory.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// let r = PhysicalRange::new(PhysicalAddress::new(0x1800), 0x2000);
/// assert_eq!(r.covering_frames(), 1..4);
/// assert_eq!(r.contained_frames(), 2..3);
/// ```
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct PhysicalRange {
    base: PhysicalAddress,
    size: u64,
}

impl PhysicalRange {
    #[inline]
    #[must_use]
    pub const fn new(base: PhysicalAddress, size: u64) -> Self {
        Self { base, size }
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Exclusive end, saturating at `u64::MAX`.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.as_u64().saturating_add(self.size)
    }

    /// Frame indices touched by any byte of the range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn covering_frames(&self) -> Range<usize> {
        if self.size == 0 {
            return 0..0;
        }
        let first = align_down(self.base.as_u64(), PAGE_SIZE) / PAGE_SIZE;
        let last = match checked_align_up(self.end(), PAGE_SIZE) {
            Some(end) => end / PAGE_SIZE,
            None => u64::MAX / PAGE_SIZE + 1,
        };
        (first as usize)..(last as usize)
    }

    /// Frame indices that lie entirely within the range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn contained_frames(&self) -> Range<usize> {
        let Some(first) = checked_align_up(self.base.as_u64(), PAGE_SIZE) else {
            return 0..0;
        };
        let last = align_down(self.end(), PAGE_SIZE);
        if last <= first {
            return 0..0;
        }
        ((first / PAGE_SIZE) as usize)..((last / PAGE_SIZE) as usize)
    }
}

impl fmt::Debug for PhysicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalRange({}..0x{:016X})", self.base, self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_frame_range_contains_nothing() {
        let r = PhysicalRange::new(PhysicalAddress::new(0x1100), 0x100);
        assert_eq!(r.covering_frames(), 1..2);
        assert!(r.contained_frames().is_empty());
    }

    #[test]
    fn empty_range_covers_nothing() {
        let r = PhysicalRange::new(PhysicalAddress::new(0x5000), 0);
        assert!(r.is_empty());
        assert!(r.covering_frames().is_empty());
        assert!(r.contained_frames().is_empty());
    }

    #[test]
    fn aligned_range_views_agree() {
        let r = PhysicalRange::new(PhysicalAddress::new(0x10_0000), 0x2000);
        assert_eq!(r.covering_frames(), 0x100..0x102);
        assert_eq!(r.contained_frames(), 0x100..0x102);
    }
}
