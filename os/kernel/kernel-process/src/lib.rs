//! # User Processes
//!
//! Turns a parsed executable into an isolated process image.
//!
//! - [`build`] lays out segments, stack and [argument block](argblock) and
//!   copies them into fresh backing memory.
//! - [`MemoryIsolation`] is the contract both isolation strategies fulfil:
//!   [`SegmentedIsolation`] (private LDT, segment limits) and
//!   [`PagedIsolation`] (private page directory behind an LDT based at the
//!   user half). [`ConfiguredIsolation`]
//!   names the one selected by the `paging` feature.
//! - [`AddressSpace`] owns the backing memory and counts the execution
//!   contexts attached to it; the last [`ContextSlot::detach`] destroys it.
//!
//! ```text
//! 0                 segment_end  stack_base            total
//! ├── segments ─────┤ pad ├ stack ┤├─ argument block ─┤
//!                               ▲
//!                     initial stack pointer
//! ```
//!
//! Every shared structure sits behind a [`SpinLock`]; [`MemoryServices`]
//! masks interrupts while holding the frame pool or descriptor table, since
//! the page-fault handler touches both.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod address_space;
pub mod argblock;
pub mod descriptor;
mod error;
pub mod isolation;
mod recording;

pub use crate::address_space::{AddressSpace, ContextSlot, Layout, build};
pub use crate::descriptor::{DescriptorTable, SegmentDescriptor, SegmentSelector, Table};
pub use crate::error::ProcessError;
pub use crate::isolation::{MemoryIsolation, PagedIsolation, SegmentedIsolation};
pub use crate::recording::{CpuEvent, RecordingProcessor};
use kernel_alloc::{FramePool, PinState};
use kernel_memory_addresses::PhysicalPage;
use kernel_swap::SlotRelease;
use kernel_sync::{InterruptControl, SpinLock};
use kernel_vmem::{PhysMapper, TranslationControl};

/// The isolation strategy this kernel is built with.
#[cfg(feature = "paging")]
pub type ConfiguredIsolation = PagedIsolation;

/// The isolation strategy this kernel is built with.
#[cfg(not(feature = "paging"))]
pub type ConfiguredIsolation = SegmentedIsolation;

/// Processor state switches needed when entering a process.
pub trait ProcessorControl: TranslationControl {
    /// Load the local descriptor table register.
    fn load_ldt(&self, selector: SegmentSelector);
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl ProcessorControl for kernel_vmem::Cpu {
    fn load_ldt(&self, selector: SegmentSelector) {
        // SAFETY: ring 0; the selector names a present LDT descriptor
        unsafe {
            core::arch::asm!("lldt {0:x}", in(reg) selector.into_bits(), options(nostack, preserves_flags));
        }
    }
}

/// Kernel facilities an address space is built from.
pub struct MemoryServices<'k, M> {
    pub mapper: &'k M,
    pub frames: &'k SpinLock<FramePool>,
    pub gdt: &'k SpinLock<DescriptorTable>,
    /// Directory whose lower half every paged process shares.
    pub kernel_directory: PhysicalPage,
    /// Where evicted pages go; slots of a destroyed process are returned here.
    pub swap: Option<&'k dyn SlotRelease>,
    pub irq: &'k dyn InterruptControl,
}

impl<M: PhysMapper> MemoryServices<'_, M> {
    /// Run `f` on the frame pool with interrupts masked.
    pub fn with_frames<R>(&self, f: impl FnOnce(&mut FramePool) -> R) -> R {
        self.frames.with_lock_irq(self.irq, f)
    }

    /// Run `f` on the global descriptor table with interrupts masked.
    pub fn with_gdt<R>(&self, f: impl FnOnce(&mut DescriptorTable) -> R) -> R {
        self.gdt.with_lock_irq(self.irq, f)
    }
}

impl<M: PhysMapper> PinState for MemoryServices<'_, M> {
    fn is_pinned(&self, frame: PhysicalPage) -> bool {
        self.with_frames(|pool| pool.is_pinned(frame))
    }
}
