//! # Virtual Memory Support
//!
//! 32-bit x86 two-level paging for the kernel and its user processes.
//!
//! ## What you get
//! - [`PageEntryBits`]: the hardware entry format, plus the kernel's
//!   on-disk encoding for evicted pages.
//! - [`PageDirectory`] / [`PageTable`] with typed [`PdEntry`] / [`PtEntry`].
//! - An [`AddressSpace`] walker rooted at one page directory.
//! - The seams to the rest of the kernel: [`FrameAlloc`] for page-table
//!   frames, [`PhysMapper`] to touch physical memory, and
//!   [`TranslationControl`] for the privileged register writes.
//!
//! ## Linear Address → Physical Address Walk
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | Directory | Table | Offset |
//!
//!  CR3 → Page Directory → Page Table → 4 KiB frame
//!          (PDE, 4 MiB)     (PTE)
//! ```
//!
//! Each level holds 1024 entries of 4 bytes.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod address_space;
mod page_entry_bits;
mod page_table;

pub use crate::address_space::{AddressSpace, PteLocation};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::{PageDirectory, PageTable, PdEntry, PtEntry};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, VirtualAddress};

/// Errors when installing mappings.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("out of physical frames for page tables")]
    OutOfMemory,
    #[error("linear address is already mapped")]
    AlreadyMapped,
}

/// Source of **physical** 4 KiB frames for page tables and directories.
///
/// Frames need not be zeroed; the walker clears them before linking.
pub trait FrameAlloc {
    /// Allocate one frame, or `None` when memory is exhausted.
    fn alloc_frame(&mut self) -> Option<PhysicalPage>;

    /// Return a frame obtained from [`alloc_frame`](Self::alloc_frame).
    fn free_frame(&mut self, frame: PhysicalPage);
}

/// Converts physical addresses to usable references in the current address
/// space. With the kernel's identity map this is the address itself.
///
/// # Safety
/// - `pa` must be mapped writable in the current translation for `&mut T`.
/// - Lifetime `'a` is purely borrow-checked; the mapping must remain valid
///   for `'a`.
/// - Type `T` must match the bytes at `pa`, and no other live reference may
///   alias them.
pub trait PhysMapper {
    /// Convert a *physical* address to a mutable reference.
    ///
    /// # Safety
    /// See the trait-level requirements.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;

    /// View `frame` as a page directory.
    ///
    /// # Safety
    /// `frame` must hold a page directory that nothing else borrows.
    #[inline]
    unsafe fn directory_mut<'a>(&self, frame: PhysicalPage) -> &'a mut PageDirectory {
        unsafe { self.phys_to_mut(frame.base()) }
    }

    /// View `frame` as a page table.
    ///
    /// # Safety
    /// `frame` must hold a page table that nothing else borrows.
    #[inline]
    unsafe fn table_mut<'a>(&self, frame: PhysicalPage) -> &'a mut PageTable {
        unsafe { self.phys_to_mut(frame.base()) }
    }

    /// View `frame` as raw bytes.
    ///
    /// # Safety
    /// Nothing else may borrow `frame` for `'a`.
    #[inline]
    unsafe fn frame_bytes<'a>(&self, frame: PhysicalPage) -> &'a mut [u8; PAGE_SIZE as usize] {
        unsafe { self.phys_to_mut(frame.base()) }
    }

    /// Fill `frame` with zeros.
    ///
    /// # Safety
    /// Nothing else may borrow `frame` during the call.
    #[inline]
    unsafe fn zero_frame(&self, frame: PhysicalPage) {
        unsafe { self.frame_bytes(frame) }.fill(0);
    }
}

/// Privileged translation controls: CR3, CR0.PG and `invlpg`.
pub trait TranslationControl {
    /// Load the page directory base register.
    fn load_directory(&self, directory: PhysicalPage);

    /// Set CR0.PG. There is no inverse.
    fn enable_paging(&self);

    /// Whether CR0.PG is set.
    fn paging_enabled(&self) -> bool;

    /// Drop any cached translation for the page containing `va`.
    fn invalidate_page(&self, va: VirtualAddress);
}

/// The processor itself, through `mov crN` and `invlpg`.
#[cfg(all(feature = "asm", target_arch = "x86"))]
#[derive(Debug, Default, Copy, Clone)]
pub struct Cpu;

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl TranslationControl for Cpu {
    fn load_directory(&self, directory: PhysicalPage) {
        use kernel_registers::{Cr3, StoreRegisterUnsafe};
        // SAFETY: ring 0; the directory maps the running kernel.
        unsafe { Cr3::from_directory(directory).store_unsafe() }
    }

    fn enable_paging(&self) {
        use kernel_registers::{Cr0, LoadRegisterUnsafe, StoreRegisterUnsafe};
        // SAFETY: ring 0; CR3 holds a directory that identity-maps this code.
        unsafe {
            let cr0 = Cr0::load_unsafe();
            cr0.with_pg_paging(true).store_unsafe();
        }
    }

    fn paging_enabled(&self) -> bool {
        use kernel_registers::{Cr0, LoadRegisterUnsafe};
        // SAFETY: ring 0
        unsafe { Cr0::load_unsafe() }.pg_paging()
    }

    fn invalidate_page(&self, va: VirtualAddress) {
        // SAFETY: ring 0; invlpg only drops a TLB entry and touches no memory
        unsafe {
            core::arch::asm!("invlpg [{}]", in(reg) va.as_u32(), options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use core::cell::UnsafeCell;

    #[repr(C, align(4096))]
    struct Aligned4K([u8; 4096]);

    /// Host RAM standing in for physical memory: frame `n` is at `n * 4096`.
    pub struct TestPhys {
        frames: Vec<UnsafeCell<Aligned4K>>,
    }

    impl TestPhys {
        pub fn with_frames(n: usize) -> Self {
            Self {
                frames: (0..n).map(|_| UnsafeCell::new(Aligned4K([0; 4096]))).collect(),
            }
        }
    }

    impl PhysMapper for TestPhys {
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            let idx = (pa.as_u32() >> 12) as usize;
            let off = (pa.as_u32() & 0xfff) as usize;
            let base = self.frames[idx].get().cast::<u8>();
            unsafe { &mut *base.add(off).cast::<T>() }
        }
    }

    /// A trivial bump allocator that also remembers frees.
    pub struct BumpAlloc {
        pub next: u32,
        pub end: u32,
        pub freed: Vec<PhysicalPage>,
    }

    impl BumpAlloc {
        pub const fn new(start: u32, end: u32) -> Self {
            Self {
                next: start,
                end,
                freed: Vec::new(),
            }
        }
    }

    impl FrameAlloc for BumpAlloc {
        fn alloc_frame(&mut self) -> Option<PhysicalPage> {
            if self.next >= self.end {
                return None;
            }
            let p = PhysicalPage::from_number(self.next);
            self.next += 1;
            Some(p)
        }

        fn free_frame(&mut self, frame: PhysicalPage) {
            self.freed.push(frame);
        }
    }
}
