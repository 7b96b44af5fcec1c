//! Page-table isolation.
//!
//! Each process gets a private page directory. Entries below
//! [`USER_VM_BASE`] are copied from the kernel directory, so the kernel
//! stays mapped while the process runs; the upper half maps the backing
//! store, one individually allocated pageable frame per page, at
//! `USER_VM_BASE + address`. Only those upper tables belong to the process.
//!
//! The process runs on a private LDT whose segments are based at
//! [`USER_VM_BASE`] with a limit of the image size, so user code can name
//! neither the shared kernel half nor anything past its own image.

use crate::isolation::{MemoryIsolation, Piece, UserLdt, checked_range, pieces};
use crate::{MemoryServices, ProcessError, ProcessorControl};
use core::ops::Range;
use kernel_alloc::{FramePool, PageFlags};
use kernel_info::memory::USER_VM_BASE;
use kernel_memory_addresses::{ENTRIES_PER_TABLE, PAGE_SIZE, PhysicalPage, VirtualAddress};
use kernel_vmem::{AddressSpace, PageEntryBits, PhysMapper, PtEntry};
use log::{debug, trace, warn};

/// Directory slots owned by a process; everything below is the kernel's.
pub const USER_DIRECTORY_ENTRIES: Range<usize> = (USER_VM_BASE >> 22) as usize..ENTRIES_PER_TABLE;

#[derive(Debug)]
pub struct PagedIsolation {
    directory: PhysicalPage,
    size: u32,
    ldt: UserLdt,
}

impl PagedIsolation {
    /// Linear address at which the process sees `user_addr`.
    #[must_use]
    pub const fn linear_address(user_addr: u32) -> VirtualAddress {
        VirtualAddress::new(USER_VM_BASE.wrapping_add(user_addr))
    }

    #[must_use]
    pub const fn ldt(&self) -> &UserLdt {
        &self.ldt
    }

    /// A walker over this process's page directory.
    #[must_use]
    pub const fn translation<'m, M: PhysMapper>(&self, mapper: &'m M) -> AddressSpace<'m, M> {
        AddressSpace::from_directory(mapper, self.directory)
    }

    fn map_all<M: PhysMapper>(
        space: &AddressSpace<'_, M>,
        mapper: &M,
        pool: &mut FramePool,
        pages: u32,
    ) -> Result<(), ProcessError> {
        for page in 0..pages {
            let va = Self::linear_address(page * PAGE_SIZE);
            let frame = pool
                .alloc_frame_with(PageFlags::user_pageable())
                .ok_or(ProcessError::OutOfMemory)?;
            // SAFETY: freshly allocated
            unsafe { mapper.zero_frame(frame) };
            match space.map_page(pool, va, frame, PageEntryBits::user_rw(), PageEntryBits::user_rw()) {
                Ok(loc) => pool.record_mapping(frame, va, loc),
                Err(e) => {
                    pool.free_frame(frame);
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Free every user frame, user table and the directory. Evicted pages
    /// give their paging-file slot back.
    fn tear_down<M: PhysMapper>(space: AddressSpace<'_, M>, services: &MemoryServices<'_, M>, pool: &mut FramePool) {
        space.release(pool, USER_DIRECTORY_ENTRIES, |pool, va, entry: PtEntry| {
            if let Some((frame, _)) = entry.page_4k() {
                pool.free_frame(frame);
            } else if let Some(slot) = entry.disk_slot() {
                match services.swap.map(|swap| swap.release_slot(slot)) {
                    Some(Ok(())) => {}
                    Some(Err(e)) => warn!("{va}: cannot free paging file slot {slot}: {e}"),
                    None => warn!("{va}: evicted to slot {slot} without a paging file"),
                }
            }
        });
    }

    /// Copy one piece, or report the page as evicted.
    fn with_resident<M: PhysMapper>(
        &self,
        services: &MemoryServices<'_, M>,
        piece: &Piece,
        f: impl FnOnce(&mut [u8]),
    ) -> Result<(), ProcessError> {
        let va = Self::linear_address(piece.page * PAGE_SIZE);
        let (frame, _) = self
            .translation(services.mapper)
            .entry(va)
            .and_then(PtEntry::page_4k)
            .ok_or(ProcessError::PageNotResident(piece.user_address()))?;
        // SAFETY: the caller holds the frame pool lock, so the frame cannot be
        // evicted or reused during the copy
        let bytes = unsafe { services.mapper.frame_bytes(frame) };
        f(&mut bytes[piece.in_page()]);
        Ok(())
    }
}

impl MemoryIsolation for PagedIsolation {
    const KIND: &'static str = "paged";

    fn allocate<M: PhysMapper>(services: &MemoryServices<'_, M>, size: u32) -> Result<Self, ProcessError> {
        if size > 0u32.wrapping_sub(USER_VM_BASE) {
            return Err(ProcessError::OutOfMemory);
        }
        let pages = size.div_ceil(PAGE_SIZE);
        let mapper = services.mapper;
        let directory = services.with_frames(|pool| {
            let space = AddressSpace::new(mapper, pool)?;
            let kernel = AddressSpace::from_directory(mapper, services.kernel_directory);
            space.share_directory_entries(&kernel, 0..USER_DIRECTORY_ENTRIES.start);
            if let Err(e) = Self::map_all(&space, mapper, pool, pages) {
                Self::tear_down(space, services, pool);
                return Err(e);
            }
            Ok::<_, ProcessError>(space.directory_page())
        })?;

        let ldt = UserLdt::install(services, USER_VM_BASE, size).inspect_err(|_| {
            let space = AddressSpace::from_directory(mapper, directory);
            services.with_frames(|pool| Self::tear_down(space, services, pool));
        })?;

        Ok(Self { directory, size, ldt })
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn copy_in<M: PhysMapper>(
        &self,
        services: &MemoryServices<'_, M>,
        dest: &mut [u8],
        user_src: u32,
    ) -> Result<(), ProcessError> {
        checked_range(self, user_src, dest.len())?;
        services.with_frames(|_| {
            pieces(user_src, dest.len()).try_for_each(|piece| {
                self.with_resident(services, &piece, |page| {
                    dest[piece.buffer.clone()].copy_from_slice(page);
                })
            })
        })
    }

    fn copy_out<M: PhysMapper>(
        &self,
        services: &MemoryServices<'_, M>,
        user_dest: u32,
        src: &[u8],
    ) -> Result<(), ProcessError> {
        checked_range(self, user_dest, src.len())?;
        services.with_frames(|_| {
            pieces(user_dest, src.len()).try_for_each(|piece| {
                self.with_resident(services, &piece, |page| {
                    page.copy_from_slice(&src[piece.buffer.clone()]);
                })
            })
        })
    }

    fn activate(&self, cpu: &dyn ProcessorControl) {
        trace!(
            "loading LDT selector {:#06x}, page directory {}",
            self.ldt.selector().into_bits(),
            self.directory
        );
        self.ldt.load(cpu);
        cpu.load_directory(self.directory);
    }

    fn release<M: PhysMapper>(self, services: &MemoryServices<'_, M>) {
        let space = self.translation(services.mapper);
        services.with_frames(|pool| Self::tear_down(space, services, pool));
        self.ldt.release(services);
        debug!(
            "released paged address space: directory {}, {:#x} bytes",
            self.directory, self.size
        );
    }

    fn page_directory(&self) -> Option<PhysicalPage> {
        Some(self.directory)
    }
}
