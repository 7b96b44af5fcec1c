//! Physical frame pool with per-frame records.
//!
//! Every 4 KiB frame of installed memory has a [`Page`] record. A frame is
//! free exactly when its `ALLOCATED` flag is clear. Allocation scans from a
//! rotating hint, so frames are handed out roughly in address order.

use alloc::vec::Vec;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalPage, VirtualAddress};
use kernel_vmem::{FrameAlloc, PteLocation};
use log::warn;

/// Ownership and eviction state of one physical frame.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct PageFlags {
    /// Owned by the kernel (identity map, page tables, descriptor tables).
    pub kernel: bool,
    /// Temporarily excluded from eviction, e.g. during paging-file I/O.
    pub locked: bool,
    /// Candidate for eviction to the paging file.
    pub pageable: bool,
    /// In use. A frame without this flag is free.
    pub allocated: bool,
    #[bits(4)]
    __: u8,
}

impl PageFlags {
    /// Flags for kernel-owned frames.
    #[must_use]
    pub const fn kernel_owned() -> Self {
        Self::new().with_kernel(true)
    }

    /// Flags for user frames that may be evicted.
    #[must_use]
    pub const fn user_pageable() -> Self {
        Self::new().with_pageable(true)
    }
}

/// The record kept for one physical frame.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Linear address the frame is mapped at, if any.
    pub vaddr: Option<VirtualAddress>,
    /// Back-pointer to the page table entry that maps the frame.
    pub entry: Option<PteLocation>,
    pub flags: PageFlags,
}

/// The pool of all physical frames.
pub struct FramePool {
    pages: Vec<Page>,
    free: usize,
    hint: usize,
}

impl FramePool {
    /// A pool of `frames` frames, all free.
    #[must_use]
    pub fn new(frames: u32) -> Self {
        Self {
            pages: alloc::vec![Page::default(); frames as usize],
            free: frames as usize,
            hint: 0,
        }
    }

    /// Number of frames the pool manages.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pages.len()
    }

    /// Number of free frames.
    #[must_use]
    pub const fn free_count(&self) -> usize {
        self.free
    }

    /// Mark `count` frames starting at `first` as in use by the kernel
    /// (frame 0, the kernel image, boot structures).
    ///
    /// Already allocated frames and frames beyond the pool are skipped.
    pub fn reserve(&mut self, first: PhysicalPage, count: u32) {
        let start = first.number() as usize;
        let end = start.saturating_add(count as usize).min(self.pages.len());
        for page in self.pages.get_mut(start..end).into_iter().flatten() {
            if !page.flags.allocated() {
                page.flags = PageFlags::kernel_owned().with_allocated(true);
                self.free -= 1;
            }
        }
    }

    /// Allocate one frame and tag it with `flags`.
    pub fn alloc_frame_with(&mut self, flags: PageFlags) -> Option<PhysicalPage> {
        let n = self.pages.len();
        let index = (0..n)
            .map(|i| (self.hint + i) % n)
            .find(|&i| !self.pages[i].flags.allocated())?;
        self.take(index, flags);
        self.hint = (index + 1) % n;
        Some(Self::frame_of(index))
    }

    /// Allocate `count` physically contiguous frames tagged with `flags`.
    /// Returns the first frame.
    pub fn alloc_contiguous(&mut self, count: u32, flags: PageFlags) -> Option<PhysicalPage> {
        let count = count as usize;
        if count == 0 || count > self.free {
            return None;
        }
        let mut run = 0;
        let mut start = 0;
        for (i, page) in self.pages.iter().enumerate() {
            if page.flags.allocated() {
                run = 0;
                continue;
            }
            if run == 0 {
                start = i;
            }
            run += 1;
            if run == count {
                for index in start..start + count {
                    self.take(index, flags);
                }
                return Some(Self::frame_of(start));
            }
        }
        None
    }

    /// Return a frame to the pool, clearing its record.
    ///
    /// Freeing a frame that is not allocated is logged and ignored.
    pub fn free_frame(&mut self, frame: PhysicalPage) {
        let Some(page) = self.pages.get_mut(frame.number() as usize) else {
            warn!("free of frame {frame} outside the pool");
            return;
        };
        if !page.flags.allocated() {
            warn!("double free of frame {frame}");
            return;
        }
        *page = Page::default();
        self.free += 1;
    }

    /// Free `count` contiguous frames starting at `first`.
    pub fn free_contiguous(&mut self, first: PhysicalPage, count: u32) {
        for n in first.number()..first.number().saturating_add(count) {
            self.free_frame(PhysicalPage::from_number(n));
        }
    }

    /// The record of `frame`.
    #[must_use]
    pub fn page(&self, frame: PhysicalPage) -> Option<&Page> {
        self.pages.get(frame.number() as usize)
    }

    /// Record where `frame` is mapped.
    pub fn record_mapping(&mut self, frame: PhysicalPage, vaddr: VirtualAddress, entry: PteLocation) {
        if let Some(page) = self.pages.get_mut(frame.number() as usize) {
            page.vaddr = Some(vaddr);
            page.entry = Some(entry);
        }
    }

    /// Record that the kernel's identity map covers `frame` and tag it
    /// `KERNEL`. The frame stays free or in use as it was; allocating it
    /// later replaces the record.
    pub fn record_kernel_mapping(&mut self, frame: PhysicalPage, vaddr: VirtualAddress, entry: PteLocation) {
        if let Some(page) = self.pages.get_mut(frame.number() as usize) {
            page.vaddr = Some(vaddr);
            page.entry = Some(entry);
            page.flags = page.flags.with_kernel(true);
        }
    }

    /// Exclude `frame` from eviction: sets `LOCKED`, clears `PAGEABLE`.
    ///
    /// Returns whether the frame was pageable before.
    pub fn pin(&mut self, frame: PhysicalPage) -> bool {
        self.pages
            .get_mut(frame.number() as usize)
            .is_some_and(|page| {
                let was = page.flags.pageable();
                page.flags = page.flags.with_locked(true).with_pageable(false);
                was
            })
    }

    /// Make `frame` evictable again: clears `LOCKED`, sets `PAGEABLE`.
    pub fn unpin(&mut self, frame: PhysicalPage) {
        if let Some(page) = self.pages.get_mut(frame.number() as usize) {
            page.flags = page.flags.with_locked(false).with_pageable(true);
        }
    }

    /// Whether `frame` is allocated and excluded from eviction.
    #[must_use]
    pub fn is_pinned(&self, frame: PhysicalPage) -> bool {
        self.page(frame)
            .is_some_and(|p| p.flags.allocated() && !p.flags.pageable())
    }

    fn take(&mut self, index: usize, flags: PageFlags) {
        self.pages[index] = Page {
            vaddr: None,
            entry: None,
            flags: flags.with_allocated(true),
        };
        self.free -= 1;
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn frame_of(index: usize) -> PhysicalPage {
        PhysicalPage::from_number(index as u32)
    }
}

/// Answers whether a frame is currently excluded from eviction.
///
/// Paging-file I/O refuses to touch frames that are not pinned.
pub trait PinState {
    fn is_pinned(&self, frame: PhysicalPage) -> bool;
}

impl PinState for FramePool {
    fn is_pinned(&self, frame: PhysicalPage) -> bool {
        Self::is_pinned(self, frame)
    }
}

impl FrameAlloc for FramePool {
    /// Page-table and directory frames belong to the kernel.
    fn alloc_frame(&mut self) -> Option<PhysicalPage> {
        self.alloc_frame_with(PageFlags::kernel_owned())
    }

    fn free_frame(&mut self, frame: PhysicalPage) {
        Self::free_frame(self, frame);
    }
}
