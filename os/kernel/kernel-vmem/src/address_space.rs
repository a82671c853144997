//! # Address Space (x86-64, PML4-rooted)
//!
//! Build and edit a **single** virtual address space: a table tree rooted at a
//! PML4 frame.
//!
//! ## Highlights
//!
//! - [`AddressSpace::get_or_create_subtable`] allocates and links a missing
//!   intermediate table; [`AddressSpace::subtable`] only follows existing links.
//! - [`AddressSpace::map_page`] / [`AddressSpace::unmap_page`] install or clear
//!   one 4 KiB leaf. Mapping a present leaf and unmapping an absent one fail.
//! - [`AddressSpace::map`] / [`AddressSpace::unmap`] act on aligned ranges and
//!   are all-or-nothing.
//! - [`AddressSpace::query`] / [`AddressSpace::translate`] are read-only
//!   lookups for fault handlers.
//! - [`AddressSpace::activate`] loads the root through the [`Mmu`].
//!
//! ## Design
//!
//! - Intermediate links are created present + writable. The user bit is added
//!   to the links above a user-accessible leaf only after every leaf of the
//!   call is installed, so a failed map leaves existing links untouched. Leaf
//!   permissions come solely from the caller.
//! - Every table frame is reached through the [`PhysMapper`] after a coverage
//!   check, so a link into unmapped physical memory surfaces as
//!   [`VmemError::OutsideDirectMap`] instead of a wild pointer.
//! - Clearing a leaf always invalidates the local TLB entry and performs a
//!   remote shootdown before returning.
//! - Intermediate tables are never reclaimed; once built they stay linked.

use crate::{FrameAlloc, Level, Mmu, PageFlags, PageTable, PageTableEntry, PhysMapper, TableIndex, VmemError};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, VirtualAddress, VirtualPage};
use log::{debug, error, trace};

/// Lookup result for one virtual page.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PageState {
    Unmapped,
    Mapped { frame: PhysicalPage, flags: PageFlags },
}

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper, T: Mmu> {
    root: PhysicalPage,
    mapper: &'m M,
    mmu: T,
}

impl<'m, M: PhysMapper, T: Mmu> AddressSpace<'m, M, T> {
    /// Allocate and zero a fresh root table.
    ///
    /// # Errors
    /// - [`VmemError::OutOfMemory`] if `alloc` has no frame.
    /// - [`VmemError::OutsideDirectMap`] if the frame is not reachable; it is
    ///   handed back to `alloc`.
    pub fn new<A: FrameAlloc>(mapper: &'m M, mmu: T, alloc: &mut A) -> Result<Self, VmemError> {
        let mut space = Self {
            root: PhysicalPage::from_frame_index(0),
            mapper,
            mmu,
        };
        space.root = space.alloc_table(alloc)?;
        debug!("Allocated address space root at {}", space.root);
        Ok(space)
    }

    /// Physical page of the PML4.
    #[inline]
    pub const fn root_page(&self) -> PhysicalPage {
        self.root
    }

    #[inline]
    pub const fn mmu(&self) -> &T {
        &self.mmu
    }

    /// Make this address space the active translation context.
    ///
    /// # Safety
    /// The space must map the running code, its stack, and everything the
    /// caller touches afterwards.
    pub unsafe fn activate(&mut self) {
        debug!("Activating address space root {}", self.root);
        unsafe { self.mmu.activate(self.root) };
    }

    /// Follow the link at `index` in `table` without creating anything.
    ///
    /// `level` is the level of `table` and only serves error reporting.
    ///
    /// # Errors
    /// - [`VmemError::NotPresent`] if the entry is absent.
    /// - [`VmemError::CorruptEntry`] if the entry is present with `PS` set.
    /// - [`VmemError::OutsideDirectMap`] if `table` is not reachable.
    pub fn subtable(&self, table: PhysicalPage, level: Level, index: TableIndex) -> Result<PhysicalPage, VmemError> {
        let entry = self.table(table)?.entry(index);
        Self::next_table(level, entry)
    }

    /// Follow the link at `index` in `table`, creating a zeroed table if absent.
    ///
    /// New links are kernel-only; an existing link is never modified.
    ///
    /// # Errors
    /// As [`subtable`](Self::subtable), except that an absent link is created;
    /// [`VmemError::OutOfMemory`] if no frame is available for it.
    pub fn get_or_create_subtable<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        table: PhysicalPage,
        level: Level,
        index: TableIndex,
    ) -> Result<PhysicalPage, VmemError> {
        let entry = self.table(table)?.entry(index);
        match Self::next_table(level, entry) {
            Err(VmemError::NotPresent) => {
                let next = self.alloc_table(alloc)?;
                *self.table_mut(table)?.entry_mut(index) = PageTableEntry::table(next);
                trace!("Created {level:?}[{}] -> {next}", index.as_usize());
                Ok(next)
            }
            other => other,
        }
    }

    /// Map one page `page → frame` with `flags`. `present` is implied.
    ///
    /// # Errors
    /// - [`VmemError::AlreadyMapped`] if the leaf is present; no entry changes.
    /// - [`VmemError::UnsupportedFlags`] for flags with address or `PS` bits.
    /// - Allocation and corruption errors from building the path.
    pub fn map_page<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        page: VirtualPage,
        frame: PhysicalPage,
        flags: PageFlags,
    ) -> Result<(), VmemError> {
        self.install_leaf(alloc, page, frame, flags)?;
        if flags.user_access() {
            self.grant_user(page)?;
        }
        Ok(())
    }

    /// Clear the leaf for `page` and flush its translation everywhere.
    ///
    /// Returns the frame that was mapped. The frame may be reused once this
    /// returns.
    ///
    /// # Errors
    /// - [`VmemError::NotMapped`] if any level of the path or the leaf is absent.
    /// - Corruption errors from walking the path.
    pub fn unmap_page(&mut self, page: VirtualPage) -> Result<PhysicalPage, VmemError> {
        let table = self.leaf_table(page).map_err(|e| match e {
            VmemError::NotPresent => VmemError::NotMapped(page),
            e => e,
        })?;

        let slot = self.table_mut(table)?.entry_mut(Level::Pt.index_of(page.base()));
        let Some(frame) = slot.frame() else {
            return Err(VmemError::NotMapped(page));
        };
        slot.clear();

        self.mmu.invalidate_page(page);
        self.mmu.shootdown(page);
        Ok(frame)
    }

    /// Map `size` bytes at `va` to `pa`, page by page.
    ///
    /// All-or-nothing: if any page fails, the pages installed by this call are
    /// unmapped again before the error is returned.
    ///
    /// # Errors
    /// - [`VmemError::UnalignedAddress`] / [`VmemError::UnalignedSize`] for
    ///   misaligned input, [`VmemError::RangeOverflow`] if a range wraps.
    /// - Any error of [`map_page`](Self::map_page); links keep their
    ///   permissions.
    pub fn map<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        size: u64,
        flags: PageFlags,
    ) -> Result<(), VmemError> {
        let (first_page, pages) = page_range(va, size)?;
        let first_frame = frame_range(pa, size)?;
        debug!("Mapping {va}..+{size:#x} -> {pa} ({flags:?})");

        for i in 0..pages {
            let page = nth_page(first_page, i)?;
            let frame = first_frame.checked_add(i).ok_or(VmemError::RangeOverflow {
                base: pa.as_u64(),
                size,
            })?;
            if let Err(e) = self.install_leaf(alloc, page, frame, flags) {
                self.rollback(first_page, i);
                return Err(e);
            }
        }

        if flags.user_access() {
            for i in 0..pages {
                self.grant_user(nth_page(first_page, i)?)?;
            }
        }
        Ok(())
    }

    /// Unmap `size` bytes at `va`, page by page.
    ///
    /// All-or-nothing: every page is verified to be mapped before any is
    /// cleared.
    ///
    /// # Errors
    /// - [`VmemError::NotMapped`] for the first unmapped page; nothing changes.
    /// - Alignment errors as for [`map`](Self::map).
    pub fn unmap(&mut self, va: VirtualAddress, size: u64) -> Result<(), VmemError> {
        let (first_page, pages) = page_range(va, size)?;

        for i in 0..pages {
            let page = nth_page(first_page, i)?;
            if self.query(page.base())? == PageState::Unmapped {
                return Err(VmemError::NotMapped(page));
            }
        }

        debug!("Unmapping {va}..+{size:#x}");
        for i in 0..pages {
            self.unmap_page(nth_page(first_page, i)?)?;
        }
        Ok(())
    }

    /// Look up the mapping state of the page containing `va`.
    ///
    /// # Errors
    /// Only corruption errors; absence at any level is [`PageState::Unmapped`].
    pub fn query(&self, va: VirtualAddress) -> Result<PageState, VmemError> {
        let table = match self.leaf_table(va.page()) {
            Ok(t) => t,
            Err(VmemError::NotPresent) => return Ok(PageState::Unmapped),
            Err(e) => return Err(e),
        };

        let entry = self.table(table)?.entry(Level::Pt.index_of(va));
        Ok(entry.frame().map_or(PageState::Unmapped, |frame| PageState::Mapped {
            frame,
            flags: entry.get_flags(),
        }))
    }

    /// Translate `va` to the physical address it maps to, if mapped.
    ///
    /// # Errors
    /// As [`query`](Self::query).
    pub fn translate(&self, va: VirtualAddress) -> Result<Option<PhysicalAddress>, VmemError> {
        Ok(match self.query(va)? {
            PageState::Mapped { frame, .. } => Some(frame.join(va.page_offset())),
            PageState::Unmapped => None,
        })
    }

    /// Walk to the PT of `page`, creating tables, and write the leaf if absent.
    fn install_leaf<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        page: VirtualPage,
        frame: PhysicalPage,
        flags: PageFlags,
    ) -> Result<(), VmemError> {
        let leaf = PageTableEntry::leaf(frame, flags)?;
        let va = page.base();

        let mut table = self.root;
        for level in Level::INTERMEDIATE {
            table = self.get_or_create_subtable(alloc, table, level, level.index_of(va))?;
        }

        let slot = self.table_mut(table)?.entry_mut(Level::Pt.index_of(va));
        if slot.is_present() {
            return Err(VmemError::AlreadyMapped(page));
        }
        *slot = leaf;
        Ok(())
    }

    /// Set the user bit on every link above the leaf of `page`.
    fn grant_user(&mut self, page: VirtualPage) -> Result<(), VmemError> {
        let va = page.base();
        let mut table = self.root;
        for level in Level::INTERMEDIATE {
            let index = level.index_of(va);
            let entry = self.table(table)?.entry(index);
            let next = Self::next_table(level, entry)?;
            if !entry.get_flags().user_access() {
                self.table_mut(table)?
                    .entry_mut(index)
                    .set_flags(entry.get_flags().with_user_access(true))?;
            }
            table = next;
        }
        Ok(())
    }

    /// The PT frame for `page`, without creating tables.
    fn leaf_table(&self, page: VirtualPage) -> Result<PhysicalPage, VmemError> {
        let va = page.base();
        let mut table = self.root;
        for level in Level::INTERMEDIATE {
            table = self.subtable(table, level, level.index_of(va))?;
        }
        Ok(table)
    }

    fn next_table(level: Level, entry: PageTableEntry) -> Result<PhysicalPage, VmemError> {
        let Some(frame) = entry.frame() else {
            return Err(VmemError::NotPresent);
        };
        if entry.get_flags().huge_page() {
            error!("Large-page bit in {level:?} entry {:#018x}", entry.raw());
            return Err(VmemError::CorruptEntry {
                level,
                raw: entry.raw(),
            });
        }
        Ok(frame)
    }

    fn alloc_table<A: FrameAlloc>(&mut self, alloc: &mut A) -> Result<PhysicalPage, VmemError> {
        let frame = alloc.alloc_4k().ok_or(VmemError::OutOfMemory)?;
        match self.table_mut(frame) {
            Ok(t) => {
                t.zero();
                Ok(frame)
            }
            Err(e) => {
                alloc.free_4k(frame);
                Err(e)
            }
        }
    }

    fn rollback(&mut self, first_page: VirtualPage, count: u64) {
        for i in 0..count {
            let Some(page) = first_page.checked_add(i) else {
                break;
            };
            if let Err(e) = self.unmap_page(page) {
                error!("Failed to roll back mapping of {page}: {e}");
            }
        }
    }

    fn table(&self, frame: PhysicalPage) -> Result<&PageTable, VmemError> {
        self.check_reachable(frame)?;
        // SAFETY: the frame is covered by the mapper and holds a page table.
        Ok(unsafe { self.mapper.phys_to_mut::<PageTable>(frame.base()) })
    }

    fn table_mut(&mut self, frame: PhysicalPage) -> Result<&mut PageTable, VmemError> {
        self.check_reachable(frame)?;
        // SAFETY: the frame is covered by the mapper and `&mut self` serializes access.
        Ok(unsafe { self.mapper.phys_to_mut::<PageTable>(frame.base()) })
    }

    fn check_reachable(&self, frame: PhysicalPage) -> Result<(), VmemError> {
        if self.mapper.covers(frame.base(), PAGE_SIZE) {
            Ok(())
        } else {
            error!("Page table frame {frame} is outside the direct map");
            Err(VmemError::OutsideDirectMap(frame))
        }
    }
}

/// First page and page count of an aligned, non-empty range.
fn page_range(va: VirtualAddress, size: u64) -> Result<(VirtualPage, u64), VmemError> {
    if size == 0 || !size.is_multiple_of(PAGE_SIZE) {
        return Err(VmemError::UnalignedSize(size));
    }
    let first = VirtualPage::try_from_addr(va).ok_or(VmemError::UnalignedAddress(va.as_u64()))?;
    if va.as_u64().checked_add(size - 1).is_none() {
        return Err(VmemError::RangeOverflow {
            base: va.as_u64(),
            size,
        });
    }
    Ok((first, size / PAGE_SIZE))
}

fn frame_range(pa: PhysicalAddress, size: u64) -> Result<PhysicalPage, VmemError> {
    let first = PhysicalPage::try_from_addr(pa).ok_or(VmemError::UnalignedAddress(pa.as_u64()))?;
    match pa.as_u64().checked_add(size - 1) {
        Some(last) if last & !crate::ADDRESS_MASK & !0xFFF == 0 => Ok(first),
        Some(last) => Err(VmemError::AddressOutOfRange(last)),
        None => Err(VmemError::RangeOverflow {
            base: pa.as_u64(),
            size,
        }),
    }
}

fn nth_page(first: VirtualPage, i: u64) -> Result<VirtualPage, VmemError> {
    first.checked_add(i).ok_or(VmemError::RangeOverflow {
        base: first.base().as_u64(),
        size: i * PAGE_SIZE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{FrameArena, RecordingMmu};
    use alloc::vec::Vec;

    /// A trivial **bump** allocator over a frame window that records frees.
    struct BumpAlloc {
        next: usize,
        end: usize,
        freed: Vec<PhysicalPage>,
    }

    impl BumpAlloc {
        fn new(start: usize, end: usize) -> Self {
            Self {
                next: start,
                end,
                freed: Vec::new(),
            }
        }

        fn used(&self) -> usize {
            self.next
        }
    }

    impl FrameAlloc for BumpAlloc {
        fn alloc_4k(&mut self) -> Option<PhysicalPage> {
            if self.next >= self.end {
                return None;
            }
            let p = PhysicalPage::from_frame_index(self.next);
            self.next += 1;
            Some(p)
        }

        fn free_4k(&mut self, page: PhysicalPage) {
            self.freed.push(page);
        }
    }

    fn setup(arena: &FrameArena) -> (AddressSpace<'_, FrameArena, RecordingMmu>, BumpAlloc) {
        let mut alloc = BumpAlloc::new(0, arena.frame_count());
        let space = AddressSpace::new(arena, RecordingMmu::new(), &mut alloc).unwrap();
        (space, alloc)
    }

    const VA: VirtualAddress = VirtualAddress::new(0xFFFF_8000_0000_0000);
    const PA: PhysicalAddress = PhysicalAddress::new(0x0030_0000);

    #[test]
    fn map_one_page_creates_tables_and_leaf() {
        let arena = FrameArena::new(16);
        let (mut space, mut alloc) = setup(&arena);
        let flags = PageFlags::KERNEL_RW.with_global(true).with_no_execute(true);

        space.map_page(&mut alloc, VA.page(), PA.page(), flags).unwrap();
        assert_eq!(alloc.used(), 4, "root plus three intermediate tables");

        // Walk the raw tables and verify the chain.
        let mut table = space.root_page();
        for level in Level::INTERMEDIATE {
            let e = PageTableEntry::from_raw(
                arena.read_u64(table.join(level.index_of(VA).as_usize() as u64 * 8)),
            );
            assert!(e.is_present() && e.get_flags().writable());
            assert!(!e.get_flags().huge_page());
            table = e.frame().unwrap();
        }
        let leaf = PageTableEntry::from_raw(arena.read_u64(table.join(Level::Pt.index_of(VA).as_usize() as u64 * 8)));
        assert_eq!(leaf.get_address(), PA);
        assert_eq!(leaf.get_flags(), flags.with_present(true));
    }

    #[test]
    fn mapping_a_present_page_fails_and_keeps_the_old_leaf() {
        let arena = FrameArena::new(16);
        let (mut space, mut alloc) = setup(&arena);
        space.map_page(&mut alloc, VA.page(), PA.page(), PageFlags::KERNEL_RW).unwrap();

        let other = PhysicalPage::from_frame_index(0x400);
        assert_eq!(
            space.map_page(&mut alloc, VA.page(), other, PageFlags::KERNEL_RO),
            Err(VmemError::AlreadyMapped(VA.page()))
        );
        assert_eq!(space.translate(VA).unwrap(), Some(PA));
    }

    #[test]
    fn subtable_does_not_create() {
        let arena = FrameArena::new(16);
        let (space, _alloc) = setup(&arena);
        let root = space.root_page();
        assert_eq!(
            space.subtable(root, Level::Pml4, Level::Pml4.index_of(VA)),
            Err(VmemError::NotPresent)
        );
    }

    #[test]
    fn get_or_create_subtable_reuses_existing_link() {
        let arena = FrameArena::new(16);
        let (mut space, mut alloc) = setup(&arena);
        let root = space.root_page();
        let idx = TableIndex::new(3).unwrap();

        let first = space.get_or_create_subtable(&mut alloc, root, Level::Pml4, idx).unwrap();
        let second = space.get_or_create_subtable(&mut alloc, root, Level::Pml4, idx).unwrap();
        assert_eq!(first, second);
        assert_eq!(space.subtable(root, Level::Pml4, idx), Ok(first));
        assert_eq!(alloc.used(), 2);
    }

    #[test]
    fn user_leaf_upgrades_intermediate_links() {
        let arena = FrameArena::new(16);
        let (mut space, mut alloc) = setup(&arena);
        let low = VirtualAddress::new(0x40_0000);

        space.map_page(&mut alloc, low.page(), PA.page(), PageFlags::KERNEL_RW).unwrap();
        let root_entry = PageTableEntry::from_raw(arena.read_u64(space.root_page().base()));
        assert!(!root_entry.get_flags().user_access());

        let user = PageFlags::for_permissions(true, false, true);
        space
            .map_page(&mut alloc, (low + PAGE_SIZE).page(), PA.page(), user)
            .unwrap();
        let root_entry = PageTableEntry::from_raw(arena.read_u64(space.root_page().base()));
        assert!(root_entry.get_flags().user_access());
    }

    #[test]
    fn remapping_as_user_leaves_kernel_links_alone() {
        let arena = FrameArena::new(16);
        let (mut space, mut alloc) = setup(&arena);
        let low = VirtualAddress::new(0x40_0000);
        space.map_page(&mut alloc, low.page(), PA.page(), PageFlags::KERNEL_RW).unwrap();
        let before = arena.read_u64(space.root_page().base());

        let user = PageFlags::for_permissions(true, false, true);
        assert_eq!(
            space.map_page(&mut alloc, low.page(), PA.page(), user),
            Err(VmemError::AlreadyMapped(low.page()))
        );
        assert_eq!(arena.read_u64(space.root_page().base()), before);
        assert_eq!(alloc.used(), 4);
    }

    #[test]
    fn failed_user_range_map_keeps_link_permissions() {
        let arena = FrameArena::new(16);
        let (mut space, mut alloc) = setup(&arena);
        let low = VirtualAddress::new(0x40_0000);
        space.map_page(&mut alloc, (low + PAGE_SIZE).page(), PA.page(), PageFlags::KERNEL_RW).unwrap();
        let before = arena.read_u64(space.root_page().base());
        assert!(!PageTableEntry::from_raw(before).get_flags().user_access());

        let user = PageFlags::for_permissions(true, false, true);
        assert_eq!(
            space.map(&mut alloc, low, PA, 2 * PAGE_SIZE, user),
            Err(VmemError::AlreadyMapped((low + PAGE_SIZE).page()))
        );
        assert_eq!(arena.read_u64(space.root_page().base()), before);
        assert_eq!(space.query(low), Ok(PageState::Unmapped));
    }

    #[test]
    fn out_of_frames_frees_nothing_it_did_not_take() {
        let arena = FrameArena::new(16);
        let mut alloc = BumpAlloc::new(0, 2);
        let mut space = AddressSpace::new(&arena, RecordingMmu::new(), &mut alloc).unwrap();
        assert_eq!(
            space.map_page(&mut alloc, VA.page(), PA.page(), PageFlags::KERNEL_RW),
            Err(VmemError::OutOfMemory)
        );
        assert!(alloc.freed.is_empty());
        assert_eq!(space.query(VA), Ok(PageState::Unmapped));
    }

    #[test]
    fn table_frame_outside_the_mapper_is_returned() {
        let arena = FrameArena::new(2);
        let mut alloc = BumpAlloc::new(0, 8);
        let mut space = AddressSpace::new(&arena, RecordingMmu::new(), &mut alloc).unwrap();

        // Root and PDPT land in frames 0 and 1; the PD frame 2 is unreachable.
        let err = space.map_page(&mut alloc, VA.page(), PA.page(), PageFlags::KERNEL_RW).unwrap_err();
        let pd = PhysicalPage::from_frame_index(2);
        assert_eq!(err, VmemError::OutsideDirectMap(pd));
        assert!(err.is_fatal());
        assert_eq!(alloc.freed, [pd]);
    }

    #[test]
    fn large_page_link_is_corruption() {
        let arena = FrameArena::new(16);
        let (mut space, mut alloc) = setup(&arena);
        space.map_page(&mut alloc, VA.page(), PA.page(), PageFlags::KERNEL_RW).unwrap();

        let pml4e = space.root_page().join(Level::Pml4.index_of(VA).as_usize() as u64 * 8);
        unsafe { *arena.phys_to_mut::<u64>(pml4e) |= 1 << 7 };

        let err = space.query(VA).unwrap_err();
        assert!(matches!(err, VmemError::CorruptEntry { level: Level::Pml4, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn unmap_page_flushes_and_returns_frame() {
        let arena = FrameArena::new(16);
        let (mut space, mut alloc) = setup(&arena);
        space.map_page(&mut alloc, VA.page(), PA.page(), PageFlags::KERNEL_RW).unwrap();

        assert_eq!(space.unmap_page(VA.page()), Ok(PA.page()));
        assert!(space.mmu().flushed(VA.page()));
        assert_eq!(space.query(VA), Ok(PageState::Unmapped));
        assert_eq!(space.unmap_page(VA.page()), Err(VmemError::NotMapped(VA.page())));
    }

    #[test]
    fn unmap_page_without_tables_is_not_mapped() {
        let arena = FrameArena::new(16);
        let (mut space, _alloc) = setup(&arena);
        assert_eq!(space.unmap_page(VA.page()), Err(VmemError::NotMapped(VA.page())));
        assert!(space.mmu().ops.is_empty());
    }

    #[test]
    fn range_map_and_lookup() {
        let arena = FrameArena::new(16);
        let (mut space, mut alloc) = setup(&arena);
        space.map(&mut alloc, VA, PA, 3 * PAGE_SIZE, PageFlags::KERNEL_RW).unwrap();

        for i in 0..3 {
            let va = VA + i * PAGE_SIZE + 0x10;
            assert_eq!(space.translate(va).unwrap(), Some(PA + i * PAGE_SIZE + 0x10));
        }
        assert_eq!(space.translate(VA + 3 * PAGE_SIZE).unwrap(), None);

        space.unmap(VA, 3 * PAGE_SIZE).unwrap();
        for i in 0..3 {
            assert_eq!(space.query(VA + i * PAGE_SIZE), Ok(PageState::Unmapped));
        }
    }

    #[test]
    fn range_arguments_are_validated() {
        let arena = FrameArena::new(16);
        let (mut space, mut alloc) = setup(&arena);
        let f = PageFlags::KERNEL_RW;

        assert_eq!(space.map(&mut alloc, VA, PA, 0, f), Err(VmemError::UnalignedSize(0)));
        assert_eq!(space.map(&mut alloc, VA, PA, 100, f), Err(VmemError::UnalignedSize(100)));
        assert_eq!(
            space.map(&mut alloc, VA + 1, PA, PAGE_SIZE, f),
            Err(VmemError::UnalignedAddress(VA.as_u64() + 1))
        );
        assert_eq!(
            space.map(&mut alloc, VA, PA + 8, PAGE_SIZE, f),
            Err(VmemError::UnalignedAddress(PA.as_u64() + 8))
        );
        assert!(matches!(
            space.map(&mut alloc, VirtualAddress::new(0xFFFF_FFFF_FFFF_F000), PA, 2 * PAGE_SIZE, f),
            Err(VmemError::RangeOverflow { .. })
        ));
        assert_eq!(space.unmap(VA, 0x800), Err(VmemError::UnalignedSize(0x800)));
        assert_eq!(alloc.used(), 1);
    }

    #[test]
    fn failed_range_map_unwinds() {
        let arena = FrameArena::new(16);
        let (mut space, mut alloc) = setup(&arena);
        space.map_page(&mut alloc, (VA + 2 * PAGE_SIZE).page(), PA.page(), PageFlags::KERNEL_RO).unwrap();

        assert_eq!(
            space.map(&mut alloc, VA, PA, 4 * PAGE_SIZE, PageFlags::KERNEL_RW),
            Err(VmemError::AlreadyMapped((VA + 2 * PAGE_SIZE).page()))
        );
        assert_eq!(space.query(VA), Ok(PageState::Unmapped));
        assert_eq!(space.query(VA + PAGE_SIZE), Ok(PageState::Unmapped));
        assert!(matches!(space.query(VA + 2 * PAGE_SIZE), Ok(PageState::Mapped { .. })));
        assert_eq!(space.query(VA + 3 * PAGE_SIZE), Ok(PageState::Unmapped));
    }

    #[test]
    fn partial_unmap_of_range_middle() {
        let arena = FrameArena::new(16);
        let (mut space, mut alloc) = setup(&arena);
        space.map(&mut alloc, VA, PA, 3 * PAGE_SIZE, PageFlags::KERNEL_RW).unwrap();

        space.unmap(VA + PAGE_SIZE, PAGE_SIZE).unwrap();
        assert_eq!(space.translate(VA).unwrap(), Some(PA));
        assert_eq!(space.translate(VA + PAGE_SIZE).unwrap(), None);
        assert_eq!(space.translate(VA + 2 * PAGE_SIZE).unwrap(), Some(PA + 2 * PAGE_SIZE));
    }

    #[test]
    fn failed_range_unmap_changes_nothing() {
        let arena = FrameArena::new(16);
        let (mut space, mut alloc) = setup(&arena);
        space.map(&mut alloc, VA, PA, 2 * PAGE_SIZE, PageFlags::KERNEL_RW).unwrap();

        assert_eq!(
            space.unmap(VA, 3 * PAGE_SIZE),
            Err(VmemError::NotMapped((VA + 2 * PAGE_SIZE).page()))
        );
        assert_eq!(space.translate(VA).unwrap(), Some(PA));
        assert_eq!(space.translate(VA + PAGE_SIZE).unwrap(), Some(PA + PAGE_SIZE));
        assert!(space.mmu().ops.is_empty());
    }

    #[test]
    fn activate_loads_root() {
        let arena = FrameArena::new(16);
        let (mut space, _alloc) = setup(&arena);
        unsafe { space.activate() };
        assert_eq!(space.mmu().active_root(), Some(space.root_page()));
    }
}
