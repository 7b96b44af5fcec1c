//! # Address Space (32-bit, page-directory rooted)
//!
//! Helpers to build and manipulate one linear address space.
//!
//! - [`AddressSpace::ensure_table`] allocates and links a missing page table.
//! - [`AddressSpace::map_page`] installs one 4 KiB mapping.
//! - [`AddressSpace::unmap_page`] clears one mapping.
//! - [`AddressSpace::query`] translates a linear address.
//! - [`AddressSpace::activate`] loads CR3 with this space's directory.
//! - [`AddressSpace::release`] frees the tables a space owns.
//!
//! Directory entries are created with caller-provided flags; leaf flags come
//! from the mapping call. Mutating active mappings requires TLB maintenance
//! (`invlpg` per page or a CR3 reload), which is the caller's job.

use crate::{FrameAlloc, MapError, PageEntryBits, PdEntry, PhysMapper, PtEntry, TranslationControl};
use core::ops::Range;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};

/// Where a page table entry lives: the table frame and the slot within it.
///
/// Physical page records keep one of these as a back-pointer so eviction can
/// rewrite the entry without walking from the directory again.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PteLocation {
    pub table: PhysicalPage,
    pub index: usize,
}

impl PteLocation {
    /// Borrow the entry through `mapper`.
    ///
    /// # Safety
    /// `self.table` must still be a live page table.
    #[inline]
    pub unsafe fn entry_mut<'a, M: PhysMapper>(self, mapper: &M) -> &'a mut PtEntry {
        unsafe { mapper.table_mut(self.table) }.entry_mut(self.index)
    }
}

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    directory: PhysicalPage,
    mapper: &'m M,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Allocate and clear a fresh page directory.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if no frame is available.
    pub fn new<A: FrameAlloc>(mapper: &'m M, alloc: &mut A) -> Result<Self, MapError> {
        let directory = alloc.alloc_frame().ok_or(MapError::OutOfMemory)?;
        // SAFETY: freshly allocated, not yet shared
        unsafe { mapper.directory_mut(directory) }.zero();
        Ok(Self { directory, mapper })
    }

    /// Wrap an existing directory.
    #[inline]
    pub const fn from_directory(mapper: &'m M, directory: PhysicalPage) -> Self {
        Self { directory, mapper }
    }

    /// Physical page of the page directory.
    #[inline]
    pub const fn directory_page(&self) -> PhysicalPage {
        self.directory
    }

    /// Load CR3 with this space's directory.
    #[inline]
    pub fn activate<T: TranslationControl + ?Sized>(&self, cpu: &T) {
        cpu.load_directory(self.directory);
    }

    /// Read the directory entry at `index`.
    #[inline]
    #[must_use]
    pub fn directory_entry(&self, index: usize) -> PdEntry {
        // SAFETY: the directory frame is owned by this space
        unsafe { self.mapper.directory_mut(self.directory) }.get(index)
    }

    /// Copy directory entries `range` from `other`, sharing its page tables.
    ///
    /// Shared tables stay owned by `other`; [`release`](Self::release) must
    /// not be given a range that overlaps them.
    pub fn share_directory_entries(&self, other: &AddressSpace<'_, M>, range: Range<usize>) {
        debug_assert_ne!(self.directory, other.directory);
        // SAFETY: two distinct directory frames
        let src = unsafe { other.mapper.directory_mut(other.directory) };
        let dst = unsafe { self.mapper.directory_mut(self.directory) };
        for i in range {
            dst.set(i, src.get(i));
        }
    }

    /// Ensure a page table covers `va`, allocating and linking one with
    /// `dir_flags` if needed. Returns the table frame and whether it is new.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if a table frame cannot be allocated.
    pub fn ensure_table<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        dir_flags: PageEntryBits,
    ) -> Result<(PhysicalPage, bool), MapError> {
        let directory = unsafe { self.mapper.directory_mut(self.directory) };
        let di = va.directory_index();
        if let Some(table) = directory.get(di).table() {
            return Ok((table, false));
        }

        let table = alloc.alloc_frame().ok_or(MapError::OutOfMemory)?;
        // SAFETY: freshly allocated
        unsafe { self.mapper.table_mut(table) }.zero();
        directory.set(di, PdEntry::make_table(table, dir_flags));
        Ok((table, true))
    }

    /// Map **one** 4 KiB page `va → frame` with `leaf_flags`, creating the
    /// page table with `dir_flags` if missing.
    ///
    /// Returns the location of the installed entry.
    ///
    /// # Errors
    /// - [`MapError::OutOfMemory`] if a table frame cannot be allocated.
    /// - [`MapError::AlreadyMapped`] if `va` already has a present entry.
    pub fn map_page<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        frame: PhysicalPage,
        dir_flags: PageEntryBits,
        leaf_flags: PageEntryBits,
    ) -> Result<PteLocation, MapError> {
        let (table_frame, _) = self.ensure_table(alloc, va, dir_flags)?;
        let table = unsafe { self.mapper.table_mut(table_frame) };
        let ti = va.table_index();
        if table.get(ti).is_present() {
            return Err(MapError::AlreadyMapped);
        }
        table.set(ti, PtEntry::make_4k(frame, leaf_flags));
        Ok(PteLocation {
            table: table_frame,
            index: ti,
        })
    }

    /// Locate the entry for `va`, if a page table covers it.
    #[must_use]
    pub fn locate(&self, va: VirtualAddress) -> Option<PteLocation> {
        let table = self.directory_entry(va.directory_index()).table()?;
        Some(PteLocation {
            table,
            index: va.table_index(),
        })
    }

    /// Read the page table entry for `va`.
    #[must_use]
    pub fn entry(&self, va: VirtualAddress) -> Option<PtEntry> {
        let loc = self.locate(va)?;
        Some(unsafe { self.mapper.table_mut(loc.table) }.get(loc.index))
    }

    /// Overwrite the entry for `va`. Returns `None` if no table covers it.
    pub fn set_entry(&self, va: VirtualAddress, entry: PtEntry) -> Option<PteLocation> {
        let loc = self.locate(va)?;
        unsafe { self.mapper.table_mut(loc.table) }.set(loc.index, entry);
        Some(loc)
    }

    /// Clear the mapping for `va` and return the frame it mapped.
    pub fn unmap_page(&self, va: VirtualAddress) -> Option<PhysicalPage> {
        let loc = self.locate(va)?;
        let table = unsafe { self.mapper.table_mut(loc.table) };
        let (frame, _) = table.get(loc.index).page_4k()?;
        table.set(loc.index, PtEntry::zero());
        Some(frame)
    }

    /// Translate `va` to its physical address if mapped and present.
    #[must_use]
    pub fn query(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let (frame, _) = self.entry(va)?.page_4k()?;
        Some(frame.join(va.page_offset()))
    }

    /// Tear down the space: for every used entry in the tables linked from
    /// directory slots `owned`, call `on_entry`, then free those tables and
    /// the directory itself.
    ///
    /// Tables outside `owned` are shared and left alone.
    pub fn release<A: FrameAlloc>(
        self,
        alloc: &mut A,
        owned: Range<usize>,
        mut on_entry: impl FnMut(&mut A, VirtualAddress, PtEntry),
    ) {
        let directory = unsafe { self.mapper.directory_mut(self.directory) };
        for di in owned {
            let Some(table_frame) = directory.get(di).table() else {
                continue;
            };
            let table = unsafe { self.mapper.table_mut(table_frame) };
            for (ti, e) in table.iter() {
                if e.is_used() {
                    on_entry(alloc, VirtualAddress::from_indices(di, ti), e);
                }
            }
            directory.set(di, PdEntry::zero());
            alloc.free_frame(table_frame);
        }
        alloc.free_frame(self.directory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BumpAlloc, TestPhys};

    fn space<'m>(phys: &'m TestPhys, alloc: &mut BumpAlloc) -> AddressSpace<'m, TestPhys> {
        AddressSpace::new(phys, alloc).unwrap()
    }

    #[test]
    fn map_one_creates_table_and_leaf() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(1, 16);
        let aspace = space(&phys, &mut alloc);

        let va = VirtualAddress::new(0x8040_3000);
        let frame = PhysicalPage::from_number(0x30);
        let loc = aspace
            .map_page(
                &mut alloc,
                va,
                frame,
                PageEntryBits::user_rw(),
                PageEntryBits::user_rw(),
            )
            .unwrap();

        assert_eq!(loc.index, 3);
        let pde = aspace.directory_entry(va.directory_index());
        assert_eq!(pde.table(), Some(loc.table));
        assert_eq!(
            aspace.query(VirtualAddress::new(0x8040_3abc)),
            Some(PhysicalAddress::new(0x0003_0abc))
        );
        assert_eq!(aspace.query(VirtualAddress::new(0x8040_4000)), None);
    }

    #[test]
    fn double_map_is_rejected() {
        let phys = TestPhys::with_frames(8);
        let mut alloc = BumpAlloc::new(1, 8);
        let aspace = space(&phys, &mut alloc);
        let va = VirtualAddress::new(0x1000);
        let f = PhysicalPage::from_number(7);
        let flags = PageEntryBits::kernel_rw();
        aspace.map_page(&mut alloc, va, f, flags, flags).unwrap();
        assert_eq!(
            aspace.map_page(&mut alloc, va, f, flags, flags),
            Err(MapError::AlreadyMapped)
        );
    }

    #[test]
    fn table_allocation_failure_is_reported() {
        let phys = TestPhys::with_frames(4);
        let mut alloc = BumpAlloc::new(1, 2);
        let aspace = space(&phys, &mut alloc);
        let flags = PageEntryBits::kernel_rw();
        assert_eq!(
            aspace.map_page(
                &mut alloc,
                VirtualAddress::new(0x40_0000),
                PhysicalPage::from_number(3),
                flags,
                flags
            ),
            Err(MapError::OutOfMemory)
        );
    }

    #[test]
    fn unmap_and_entry_rewrite() {
        let phys = TestPhys::with_frames(8);
        let mut alloc = BumpAlloc::new(1, 8);
        let aspace = space(&phys, &mut alloc);
        let va = VirtualAddress::new(0x2000);
        let f = PhysicalPage::from_number(6);
        let flags = PageEntryBits::user_rw();
        let loc = aspace.map_page(&mut alloc, va, f, flags, flags).unwrap();

        assert_eq!(aspace.unmap_page(va), Some(f));
        assert_eq!(aspace.unmap_page(va), None);

        assert_eq!(aspace.set_entry(va, PtEntry::on_disk(4)), Some(loc));
        assert_eq!(aspace.entry(va).and_then(PtEntry::disk_slot), Some(4));
        assert_eq!(unsafe { loc.entry_mut(&phys) }.disk_slot(), Some(4));
        assert_eq!(aspace.set_entry(VirtualAddress::new(0x40_0000), PtEntry::zero()), None);
    }

    #[test]
    fn release_frees_only_owned_tables() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(1, 16);
        let kernel = space(&phys, &mut alloc);
        let flags = PageEntryBits::user_rw();
        kernel
            .map_page(&mut alloc, VirtualAddress::new(0x1000), PhysicalPage::from_number(1), flags, flags)
            .unwrap();
        let kernel_table = kernel.directory_entry(0).table().unwrap();

        let user = space(&phys, &mut alloc);
        user.share_directory_entries(&kernel, 0..512);
        assert_eq!(user.directory_entry(0).table(), Some(kernel_table));

        let va = VirtualAddress::new(0x8000_0000);
        user.map_page(&mut alloc, va, PhysicalPage::from_number(15), flags, flags)
            .unwrap();
        let user_table = user.directory_entry(512).table().unwrap();
        let user_dir = user.directory_page();

        let mut seen = Vec::new();
        user.release(&mut alloc, 512..1024, |_, va, e| seen.push((va, e)));

        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, va);
        assert_eq!(alloc.freed, vec![user_table, user_dir]);
        assert!(kernel.query(VirtualAddress::new(0x1000)).is_some());
    }

    #[test]
    fn activate_loads_directory() {
        use core::cell::Cell;
        struct Recorder(Cell<Option<PhysicalPage>>);
        impl TranslationControl for Recorder {
            fn load_directory(&self, directory: PhysicalPage) {
                self.0.set(Some(directory));
            }
            fn enable_paging(&self) {}
            fn paging_enabled(&self) -> bool {
                false
            }
            fn invalidate_page(&self, _va: VirtualAddress) {}
        }

        let phys = TestPhys::with_frames(4);
        let mut alloc = BumpAlloc::new(2, 4);
        let aspace = space(&phys, &mut alloc);
        let cpu = Recorder(Cell::new(None));
        aspace.activate(&cpu);
        assert_eq!(cpu.0.get(), Some(PhysicalPage::from_number(2)));
    }
}
