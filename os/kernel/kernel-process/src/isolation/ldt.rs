//! The per-process local descriptor table.
//!
//! Two user segments, code at index 0 and data at index 1, both DPL 3 and
//! both covering `[base, base + size)` of the linear address space. The
//! table lives in its own kernel frame and is reachable through a GDT slot.

use crate::descriptor::{SegmentDescriptor, SegmentSelector, Table};
use crate::{MemoryServices, ProcessError, ProcessorControl};
use kernel_alloc::PageFlags;
use kernel_info::memory::{NUM_USER_LDT_ENTRIES, USER_PRIVILEGE};
use kernel_memory_addresses::PhysicalPage;
use kernel_vmem::PhysMapper;
use log::warn;

/// The LDT image stored in its own kernel frame.
pub type Ldt = [SegmentDescriptor; NUM_USER_LDT_ENTRIES];

#[derive(Debug)]
pub struct UserLdt {
    frame: PhysicalPage,
    selector: SegmentSelector,
}

impl UserLdt {
    /// Build an LDT whose segments start at linear `base` and span `size`
    /// bytes, and install it in the GDT.
    ///
    /// # Errors
    /// [`ProcessError::OutOfMemory`] without a frame for the table,
    /// [`ProcessError::DescriptorTableFull`] without a GDT slot. Nothing
    /// stays allocated on failure.
    pub fn install<M: PhysMapper>(services: &MemoryServices<'_, M>, base: u32, size: u32) -> Result<Self, ProcessError> {
        let frame = services
            .with_frames(|pool| pool.alloc_frame_with(PageFlags::kernel_owned()))
            .ok_or(ProcessError::OutOfMemory)?;
        // SAFETY: freshly allocated, not yet visible to anyone else
        unsafe {
            services.mapper.zero_frame(frame);
            *services.mapper.phys_to_mut::<Ldt>(frame.base()) = [
                SegmentDescriptor::code(base, size, USER_PRIVILEGE),
                SegmentDescriptor::data(base, size, USER_PRIVILEGE),
            ];
        }

        let Some(selector) = services.with_gdt(|gdt| gdt.allocate_ldt_slot(frame.base())) else {
            warn!("no GDT slot for a process LDT");
            services.with_frames(|pool| pool.free_frame(frame));
            return Err(ProcessError::DescriptorTableFull);
        };
        Ok(Self { frame, selector })
    }

    /// GDT selector of the table.
    #[must_use]
    pub const fn selector(&self) -> SegmentSelector {
        self.selector
    }

    /// User code selector (LDT entry 0, RPL 3).
    #[must_use]
    pub const fn code_selector(&self) -> SegmentSelector {
        SegmentSelector::new_with(0, Table::Ldt, USER_PRIVILEGE)
    }

    /// User data selector (LDT entry 1, RPL 3).
    #[must_use]
    pub const fn data_selector(&self) -> SegmentSelector {
        SegmentSelector::new_with(1, Table::Ldt, USER_PRIVILEGE)
    }

    /// The two descriptors as the processor will see them.
    #[must_use]
    pub fn descriptors<M: PhysMapper>(&self, mapper: &M) -> Ldt {
        // SAFETY: the frame belongs to this table and is only read here
        unsafe { *mapper.phys_to_mut::<Ldt>(self.frame.base()) }
    }

    pub fn load(&self, cpu: &dyn ProcessorControl) {
        cpu.load_ldt(self.selector);
    }

    /// Clear the GDT slot and free the table's frame.
    pub fn release<M: PhysMapper>(self, services: &MemoryServices<'_, M>) {
        let index = self.selector.index();
        if !services.with_gdt(|gdt| gdt.free_slot(index)) {
            warn!("GDT slot {index} was already free");
        }
        services.with_frames(|pool| pool.free_frame(self.frame));
    }
}
