//! # Memory isolation
//!
//! Both strategies present the same contract: a zeroed backing store of a
//! given size, bounds-checked copies between kernel buffers and process
//! addresses, a hardware switch on [`activate`](MemoryIsolation::activate),
//! and a [`release`](MemoryIsolation::release) that returns every frame and
//! descriptor slot. Process addresses are offsets into the backing store:
//! each process runs on a private [`UserLdt`] whose segments start where its
//! backing store is seen, so offset 0 is the first byte of the image.

mod ldt;
mod paged;
mod segmented;

use crate::{MemoryServices, ProcessError, ProcessorControl};
use core::ops::Range;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalPage};
use kernel_vmem::PhysMapper;
pub use ldt::{Ldt, UserLdt};
pub use paged::PagedIsolation;
pub use segmented::SegmentedIsolation;

pub trait MemoryIsolation: Sized {
    /// Human-readable name for logs.
    const KIND: &'static str;

    /// Allocate a zeroed backing store of `size` bytes.
    ///
    /// # Errors
    /// [`ProcessError::OutOfMemory`], or
    /// [`ProcessError::DescriptorTableFull`] for the segmented variant. No
    /// resources remain allocated on failure.
    fn allocate<M: PhysMapper>(services: &MemoryServices<'_, M>, size: u32) -> Result<Self, ProcessError>;

    /// Size of the backing store in bytes.
    fn size(&self) -> u32;

    /// Whether `[addr, addr + len)` lies within the backing store.
    fn validate_range(&self, addr: u32, len: u32) -> bool {
        addr < self.size() && len <= self.size() - addr
    }

    /// Copy `dest.len()` bytes from process address `user_src` into `dest`.
    ///
    /// # Errors
    /// [`ProcessError::InvalidUserPointer`] if the range is not valid, in
    /// which case nothing is copied. The paged variant may also report
    /// [`ProcessError::PageNotResident`].
    fn copy_in<M: PhysMapper>(
        &self,
        services: &MemoryServices<'_, M>,
        dest: &mut [u8],
        user_src: u32,
    ) -> Result<(), ProcessError>;

    /// Copy `src` to process address `user_dest`.
    ///
    /// # Errors
    /// As for [`copy_in`](Self::copy_in).
    fn copy_out<M: PhysMapper>(
        &self,
        services: &MemoryServices<'_, M>,
        user_dest: u32,
        src: &[u8],
    ) -> Result<(), ProcessError>;

    /// Make this the address space the processor checks accesses against.
    fn activate(&self, cpu: &dyn ProcessorControl);

    /// Free the backing store and any descriptor table slot.
    fn release<M: PhysMapper>(self, services: &MemoryServices<'_, M>);

    /// The private page directory, if this variant has one.
    fn page_directory(&self) -> Option<PhysicalPage> {
        None
    }
}

/// Check a copy of `len` bytes at `addr` against `isolation`.
pub(crate) fn checked_range<I: MemoryIsolation>(isolation: &I, addr: u32, len: usize) -> Result<(), ProcessError> {
    let len = u32::try_from(len).map_err(|_| ProcessError::InvalidUserPointer)?;
    if isolation.validate_range(addr, len) {
        Ok(())
    } else {
        Err(ProcessError::InvalidUserPointer)
    }
}

/// One page-sized piece of a copy.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct Piece {
    /// Page number within the backing store.
    pub page: u32,
    /// Offset of the piece within that page.
    pub offset: usize,
    /// Range within the kernel buffer.
    pub buffer: Range<usize>,
}

impl Piece {
    /// Process address of the first byte.
    pub const fn user_address(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let offset = self.offset as u32;
        self.page * PAGE_SIZE + offset
    }

    /// Range within the page.
    pub const fn in_page(&self) -> Range<usize> {
        self.offset..self.offset + (self.buffer.end - self.buffer.start)
    }
}

/// Split the already validated range `[addr, addr + len)` at page boundaries.
pub(crate) fn pieces(addr: u32, len: usize) -> impl Iterator<Item = Piece> {
    let page_size = PAGE_SIZE as usize;
    let mut done = 0;
    core::iter::from_fn(move || {
        if done >= len {
            return None;
        }
        let at = addr as usize + done;
        let offset = at % page_size;
        let n = (page_size - offset).min(len - done);
        #[allow(clippy::cast_possible_truncation)]
        let page = (at / page_size) as u32;
        let piece = Piece {
            page,
            offset,
            buffer: done..done + n,
        };
        done += n;
        Some(piece)
    })
}
