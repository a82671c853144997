//! # Hosted Physical Memory
//!
//! Stand-ins for physical RAM and the processor so the page-table code can run
//! as an ordinary process: [`FrameArena`] simulates RAM as a heap block of
//! 4 KiB-aligned frames where physical address `pa` is byte `pa` of the block,
//! and [`RecordingMmu`] records every TLB and CR3 operation instead of
//! executing it.

use crate::{Mmu, PhysMapper};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, VirtualPage};

/// A 4 KiB-aligned raw frame.
#[repr(C, align(4096))]
struct Frame([u8; 4096]);

/// Simulated physical memory of a fixed number of frames, all initially zero.
pub struct FrameArena {
    frames: Box<[UnsafeCell<Frame>]>,
}

impl FrameArena {
    #[must_use]
    pub fn new(frame_count: usize) -> Self {
        let frames = (0..frame_count)
            .map(|_| UnsafeCell::new(Frame([0; 4096])))
            .collect();
        Self { frames }
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Size of the simulated memory in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.frames.len() as u64 * PAGE_SIZE
    }

    /// Copy of the 8-byte word at `pa`.
    ///
    /// # Panics
    /// If `pa` is outside the arena.
    #[must_use]
    pub fn read_u64(&self, pa: PhysicalAddress) -> u64 {
        assert!(self.covers(pa, 8), "{pa:?} outside the arena");
        // SAFETY: bounds checked above; reads never race in single-threaded tests.
        unsafe { self.phys_to_ptr(pa).cast::<u64>().read_unaligned() }
    }
}

impl PhysMapper for FrameArena {
    /// # Panics
    /// If `pa` is outside the arena.
    unsafe fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        assert!(self.covers(pa, 1), "{pa:?} outside the arena");
        let offset = usize::try_from(pa.as_u64()).unwrap_or(usize::MAX);
        // SAFETY: the pointer covers the whole boxed slice; offset checked above.
        unsafe { UnsafeCell::raw_get(self.frames.as_ptr()).cast::<u8>().add(offset) }
    }

    fn covers(&self, pa: PhysicalAddress, len: u64) -> bool {
        pa.as_u64()
            .checked_add(len)
            .is_some_and(|end| end <= self.size())
    }
}

/// One recorded processor operation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MmuOp {
    Invalidate(VirtualPage),
    Shootdown(VirtualPage),
    Activate(PhysicalPage),
}

/// An [`Mmu`] that only records what it was asked to do.
#[derive(Debug, Default, Clone)]
pub struct RecordingMmu {
    pub ops: Vec<MmuOp>,
}

impl RecordingMmu {
    #[must_use]
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// The most recently activated root, if any.
    #[must_use]
    pub fn active_root(&self) -> Option<PhysicalPage> {
        self.ops.iter().rev().find_map(|op| match op {
            MmuOp::Activate(root) => Some(*root),
            _ => None,
        })
    }

    /// `true` if `page` was invalidated locally and shot down remotely, in that order.
    #[must_use]
    pub fn flushed(&self, page: VirtualPage) -> bool {
        self.ops
            .windows(2)
            .any(|w| w == [MmuOp::Invalidate(page), MmuOp::Shootdown(page)])
    }
}

impl Mmu for RecordingMmu {
    fn invalidate_page(&mut self, page: VirtualPage) {
        self.ops.push(MmuOp::Invalidate(page));
    }

    fn shootdown(&mut self, page: VirtualPage) {
        self.ops.push(MmuOp::Shootdown(page));
    }

    unsafe fn activate(&mut self, root: PhysicalPage) {
        self.ops.push(MmuOp::Activate(root));
    }
}
