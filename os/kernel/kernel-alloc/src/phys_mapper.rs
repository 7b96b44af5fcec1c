//! # Physical Memory Access
//!
//! [`PhysMapper`] implementations.
//!
//! - [`IdentityPhysMapper`]: the kernel maps all physical memory 1:1 (except
//!   page 0), so a physical address is directly usable as a pointer once
//!   paging is on, and trivially before.
//! - [`EmulatedRam`]: a block of host memory standing in for physical RAM,
//!   with frame `n` at physical address `n * 4096`. Compiled for tests and
//!   with the `emulation` feature.

use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] for the kernel's identity map.
///
/// # Safety
/// - The identity map must cover the referenced physical range.
/// - Physical address 0 is never mapped; dereferencing it faults.
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = pa.as_usize() as *mut T;
        debug_assert!(ptr.is_aligned());
        unsafe { &mut *ptr }
    }
}

#[cfg(any(test, feature = "emulation"))]
pub use emulated::EmulatedRam;

#[cfg(any(test, feature = "emulation"))]
mod emulated {
    use alloc::vec::Vec;
    use core::cell::UnsafeCell;
    use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage};
    use kernel_vmem::PhysMapper;

    #[repr(C, align(4096))]
    struct Frame([u8; PAGE_SIZE as usize]);

    /// Host memory posing as physical RAM.
    pub struct EmulatedRam {
        frames: Vec<UnsafeCell<Frame>>,
    }

    impl EmulatedRam {
        /// `frames` zeroed 4 KiB frames.
        #[must_use]
        pub fn new(frames: u32) -> Self {
            Self {
                frames: (0..frames)
                    .map(|_| UnsafeCell::new(Frame([0; PAGE_SIZE as usize])))
                    .collect(),
            }
        }

        /// Number of emulated frames.
        #[must_use]
        pub fn frames(&self) -> u32 {
            #[allow(clippy::cast_possible_truncation)]
            let n = self.frames.len() as u32;
            n
        }

        /// Copy of the bytes of `frame`.
        ///
        /// # Panics
        /// If `frame` is outside the emulated range.
        #[must_use]
        pub fn read_frame(&self, frame: PhysicalPage) -> [u8; PAGE_SIZE as usize] {
            // SAFETY: shared read of a frame no one is mutating during the copy
            unsafe { (*self.frames[frame.number() as usize].get()).0 }
        }

        /// Overwrite the bytes of `frame`.
        ///
        /// # Panics
        /// If `frame` is outside the emulated range.
        pub fn write_frame(&self, frame: PhysicalPage, bytes: &[u8; PAGE_SIZE as usize]) {
            // SAFETY: see `read_frame`
            unsafe { (*self.frames[frame.number() as usize].get()).0 = *bytes }
        }
    }

    impl PhysMapper for EmulatedRam {
        /// # Panics
        /// If `pa` is outside the emulated range or the value would
        /// straddle a frame boundary.
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            let idx = pa.as_usize() >> 12;
            let off = pa.as_usize() & 0xfff;
            assert!(off + size_of::<T>() <= PAGE_SIZE as usize, "access straddles a frame");
            let base = self.frames[idx].get().cast::<u8>();
            // SAFETY: in bounds of one frame; aliasing is the caller's contract
            unsafe { &mut *base.add(off).cast::<T>() }
        }
    }

}
