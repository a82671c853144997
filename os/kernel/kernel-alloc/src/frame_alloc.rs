//! # Bitmap Physical Frame Allocator
//!
//! One bit per 4 KiB frame of physical memory, from address 0 up to the highest
//! byte the boot memory map describes. A set bit means *used*.
//!
//! ## Initialization
//!
//! 1. Size the bitmap to the highest described physical byte.
//! 2. Mark every frame used.
//! 3. Mark frames lying entirely inside usable regions free.
//! 4. Mark the frames of reserved ranges (kernel image, the bitmap itself) used.
//!
//! [`BitmapFrameAlloc::init`] additionally finds room for the bitmap inside
//! usable memory reachable through the direct map; [`BitmapFrameAlloc::new`]
//! takes caller-provided storage.
//!
//! ## Allocation
//!
//! First fit over runs of contiguous free frames. Frees are checked: an
//! unaligned base, a run outside the bitmap, or a run containing a frame that
//! is not currently allocated is rejected without touching any state.

use crate::bitmap::{Bitmap, BitmapError};
use kernel_info::boot::{BootMemoryMap, PhysicalMemoryRegion};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, PhysicalRange, checked_align_up};
use kernel_vmem::{FrameAlloc, PhysMapper};
use log::{debug, error, info, warn};

const FREE: bool = false;
const USED: bool = true;

/// Failures of frame allocation and release, and of allocator setup.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FrameAllocError {
    #[error("a run of zero frames was requested")]
    ZeroFrames,
    #[error("no run of {0} contiguous free frames")]
    OutOfMemory(usize),
    #[error("frame base {0} is not 4 KiB aligned")]
    UnalignedAddress(PhysicalAddress),
    #[error("frames {index}..{index}+{count} lie outside the {total} managed frames")]
    OutOfRange { index: usize, count: usize, total: usize },
    #[error("frame {0} is not allocated")]
    NotAllocated(PhysicalPage),
    #[error("no usable region can hold the {0}-byte frame bitmap")]
    NoBitmapStorage(u64),
    #[error(transparent)]
    Bitmap(#[from] BitmapError),
}

/// Bitmap-backed allocator of 4 KiB physical frames.
pub struct BitmapFrameAlloc<'b> {
    bitmap: Bitmap<'b>,
    free: usize,
}

impl<'b> BitmapFrameAlloc<'b> {
    /// Number of frames needed to describe every byte in `regions`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn frames_for(regions: &[PhysicalMemoryRegion]) -> usize {
        BootMemoryMap::new(regions, &[]).highest_address().div_ceil(PAGE_SIZE) as usize
    }

    /// Build the allocator state in `storage`.
    ///
    /// # Errors
    /// [`FrameAllocError::Bitmap`] if `storage` is too small for
    /// [`frames_for(regions)`](Self::frames_for) bits.
    pub fn new(
        storage: &'b mut [u64],
        regions: &[PhysicalMemoryRegion],
        reserved: &[PhysicalRange],
    ) -> Result<Self, FrameAllocError> {
        let total = Self::frames_for(regions);
        let mut bitmap = Bitmap::new(storage, total)?;
        bitmap.fill(USED);

        for region in regions.iter().filter(|r| r.usable) {
            let frames = region.range().contained_frames();
            bitmap.set_range(frames.start, frames.len(), FREE)?;
        }

        for range in reserved {
            let frames = range.covering_frames();
            let end = frames.end.min(total);
            if frames.start < end {
                bitmap.set_range(frames.start, end - frames.start, USED)?;
            }
        }

        let free = bitmap.count(FREE);
        info!("Frame allocator manages {total} frames, {free} free");
        Ok(Self { bitmap, free })
    }

    /// Build the allocator with its bitmap placed in usable memory.
    ///
    /// The bitmap goes to the lowest frame-aligned spot of the first usable
    /// region that is large enough, avoids `reserved`, and is reachable
    /// through `mapper`. Its frames are then marked used.
    ///
    /// # Safety
    /// `mapper` must give exclusive access to the chosen frames for `'b`; no
    /// other code may use usable memory before the allocator hands it out.
    ///
    /// # Errors
    /// [`FrameAllocError::NoBitmapStorage`] if no spot qualifies.
    pub unsafe fn init<M: PhysMapper>(
        mapper: &M,
        regions: &[PhysicalMemoryRegion],
        reserved: &[PhysicalRange],
    ) -> Result<Self, FrameAllocError> {
        let total = Self::frames_for(regions);
        let words = Bitmap::words_for(total);
        let bytes = words as u64 * 8;
        let span = checked_align_up(bytes, PAGE_SIZE).ok_or(FrameAllocError::NoBitmapStorage(bytes))?;

        let base = Self::place(mapper, regions, reserved, span).ok_or_else(|| {
            error!("No usable region can hold the {bytes}-byte frame bitmap");
            FrameAllocError::NoBitmapStorage(bytes)
        })?;
        info!("Placing frame bitmap ({bytes} bytes) at {base}");

        // SAFETY: `place` verified coverage; exclusivity is the caller's contract.
        let storage = unsafe { mapper.phys_to_slice_mut::<u64>(base, words) };
        let mut alloc = Self::new(storage, regions, reserved)?;

        let own = PhysicalRange::new(base, span).covering_frames();
        alloc.bitmap.set_range(own.start, own.len(), USED)?;
        alloc.free = alloc.bitmap.count(FREE);
        Ok(alloc)
    }

    fn place<M: PhysMapper>(
        mapper: &M,
        regions: &[PhysicalMemoryRegion],
        reserved: &[PhysicalRange],
        span: u64,
    ) -> Option<PhysicalAddress> {
        let need = usize::try_from(span / PAGE_SIZE).ok()?;
        for region in regions.iter().filter(|r| r.usable) {
            let frames = region.range().contained_frames();
            let mut start = frames.start;
            while start.checked_add(need)? <= frames.end {
                let candidate = start..start + need;
                let blocker = reserved
                    .iter()
                    .map(PhysicalRange::covering_frames)
                    .find(|r| r.start < candidate.end && candidate.start < r.end);
                if let Some(blocker) = blocker {
                    start = blocker.end;
                    continue;
                }
                let base = PhysicalPage::from_frame_index(start).base();
                if mapper.covers(base, span) {
                    return Some(base);
                }
                // Higher addresses in this region are no more reachable.
                break;
            }
        }
        None
    }

    /// Allocate `count` contiguous frames, lowest fit first.
    ///
    /// # Errors
    /// - [`FrameAllocError::ZeroFrames`] for `count == 0`.
    /// - [`FrameAllocError::OutOfMemory`] if no run is large enough.
    pub fn alloc(&mut self, count: usize) -> Result<PhysicalPage, FrameAllocError> {
        if count == 0 {
            return Err(FrameAllocError::ZeroFrames);
        }
        let index = self
            .bitmap
            .find_first_range(0, count, FREE)?
            .ok_or(FrameAllocError::OutOfMemory(count))?;
        self.bitmap.set_range(index, count, USED)?;
        self.free -= count;

        let page = PhysicalPage::from_frame_index(index);
        debug!("Allocated {count} frame(s) at {page}");
        Ok(page)
    }

    /// Return `count` frames starting at `base`.
    ///
    /// # Errors
    /// - [`FrameAllocError::ZeroFrames`] for `count == 0`.
    /// - [`FrameAllocError::UnalignedAddress`] if `base` is not frame-aligned.
    /// - [`FrameAllocError::OutOfRange`] if the run extends past the bitmap.
    /// - [`FrameAllocError::NotAllocated`] naming the first free frame in the run.
    pub fn free(&mut self, base: PhysicalAddress, count: usize) -> Result<(), FrameAllocError> {
        if count == 0 {
            return Err(FrameAllocError::ZeroFrames);
        }
        let Some(page) = PhysicalPage::try_from_addr(base) else {
            warn!("Rejected free of unaligned frame base {base}");
            return Err(FrameAllocError::UnalignedAddress(base));
        };

        let index = page.frame_index();
        let total = self.bitmap.capacity();
        if index.checked_add(count).is_none_or(|end| end > total) {
            warn!("Rejected free of {count} frame(s) at {page} beyond {total} frames");
            return Err(FrameAllocError::OutOfRange { index, count, total });
        }

        if !self.bitmap.test_range(index, count, USED)? {
            let first_free = self.bitmap.find_first(index, FREE)?.unwrap_or(index);
            let frame = PhysicalPage::from_frame_index(first_free);
            warn!("Rejected free of {count} frame(s) at {page}: {frame} is not allocated");
            return Err(FrameAllocError::NotAllocated(frame));
        }

        self.bitmap.set_range(index, count, FREE)?;
        self.free += count;
        debug!("Freed {count} frame(s) at {page}");
        Ok(())
    }

    /// `true` if `page` is managed and currently free.
    #[must_use]
    pub fn is_free(&self, page: PhysicalPage) -> bool {
        self.bitmap.test(page.frame_index(), FREE).unwrap_or(false)
    }

    #[inline]
    #[must_use]
    pub const fn free_frames(&self) -> usize {
        self.free
    }

    #[inline]
    #[must_use]
    pub const fn total_frames(&self) -> usize {
        self.bitmap.capacity()
    }
}

impl FrameAlloc for BitmapFrameAlloc<'_> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage> {
        self.alloc(1).ok()
    }

    fn free_4k(&mut self, page: PhysicalPage) {
        if let Err(e) = self.free(page.base(), 1) {
            error!("Failed to return page-table frame {page}: {e}");
        }
    }
}
