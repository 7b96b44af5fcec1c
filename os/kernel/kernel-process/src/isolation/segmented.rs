//! Segment-limit isolation.
//!
//! The backing store is one physically contiguous run of frames. A private
//! two-entry LDT describes it as user code and user data, both based at the
//! run's physical address with a page-granular limit equal to its size. The
//! CPU rejects any access past the limit; copies check the range explicitly.

use crate::isolation::{MemoryIsolation, UserLdt, checked_range, pieces};
use crate::{MemoryServices, ProcessError, ProcessorControl};
use kernel_alloc::PageFlags;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalPage};
use kernel_vmem::PhysMapper;
use log::{debug, trace};

#[derive(Debug)]
pub struct SegmentedIsolation {
    base: PhysicalPage,
    pages: u32,
    size: u32,
    ldt: UserLdt,
}

impl SegmentedIsolation {
    /// First frame of the backing store.
    #[must_use]
    pub const fn base(&self) -> PhysicalPage {
        self.base
    }

    #[must_use]
    pub const fn ldt(&self) -> &UserLdt {
        &self.ldt
    }

    fn frame_of(&self, page: u32) -> PhysicalPage {
        PhysicalPage::from_number(self.base.number() + page)
    }
}

impl MemoryIsolation for SegmentedIsolation {
    const KIND: &'static str = "segmented";

    fn allocate<M: PhysMapper>(services: &MemoryServices<'_, M>, size: u32) -> Result<Self, ProcessError> {
        let pages = size.div_ceil(PAGE_SIZE);
        let base = services
            .with_frames(|pool| pool.alloc_contiguous(pages, PageFlags::kernel_owned()))
            .ok_or(ProcessError::OutOfMemory)?;

        for n in 0..pages {
            // SAFETY: freshly allocated, not yet visible to anyone else
            unsafe { services.mapper.zero_frame(PhysicalPage::from_number(base.number() + n)) };
        }

        let ldt = UserLdt::install(services, base.base().as_u32(), size).inspect_err(|_| {
            services.with_frames(|pool| pool.free_contiguous(base, pages));
        })?;

        Ok(Self { base, pages, size, ldt })
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
        for piece in pieces(user_src, dest.len()) {
            // SAFETY: frame of this backing store; the range was validated
            let frame = unsafe { services.mapper.frame_bytes(self.frame_of(piece.page)) };
            dest[piece.buffer.clone()].copy_from_slice(&frame[piece.in_page()]);
        }
        Ok(())
    }

    fn copy_out<M: PhysMapper>(
        &self,
        services: &MemoryServices<'_, M>,
        user_dest: u32,
        src: &[u8],
    ) -> Result<(), ProcessError> {
        checked_range(self, user_dest, src.len())?;
        for piece in pieces(user_dest, src.len()) {
            // SAFETY: see `copy_in`
            let frame = unsafe { services.mapper.frame_bytes(self.frame_of(piece.page)) };
            frame[piece.in_page()].copy_from_slice(&src[piece.buffer.clone()]);
        }
        Ok(())
    }

    fn activate(&self, cpu: &dyn ProcessorControl) {
        trace!("loading LDT selector {:#06x}", self.ldt.selector().into_bits());
        self.ldt.load(cpu);
    }

    fn release<M: PhysMapper>(self, services: &MemoryServices<'_, M>) {
        self.ldt.release(services);
        services.with_frames(|pool| pool.free_contiguous(self.base, self.pages));
        debug!(
            "released segmented address space: {} frames at {}",
            self.pages, self.base
        );
    }
}
