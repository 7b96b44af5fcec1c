//! # Virtual Memory and Process Loading
//!
//! The kernel side of user processes on a 32-bit machine:
//!
//! - [`init_vm`] identity-maps physical memory, registers the page-fault
//!   handler and turns paging on.
//! - [`spawn_process`] reads an executable, builds an isolated address space
//!   for it and hands it to the scheduler.
//! - [`PageFaultHandler`] decides what a fault means: a kernel defect, a
//!   process to terminate, or an evicted page to bring back.
//! - [`page_out`] and [`page_in`] move user pages between frames and the
//!   paging file.
//!
//! Everything hardware-facing is reached through traits ([`FileSystem`],
//! [`Scheduler`], [`InterruptTable`], [`Processor`] and
//! [`ProcessorControl`]), so the whole subsystem runs on the host against
//! emulated RAM.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod collaborators;
mod error;
pub mod interrupts;
mod pager;
mod spawn;
mod vm;

pub use crate::collaborators::{
    FileNotFound, FileSystem, InterruptTable, Pid, Processor, Scheduler, TrapFrame, TrapHandler,
};
pub use crate::error::{ENOTFOUND, EUNSPECIFIED, SpawnError, VmError};
pub use crate::interrupts::VectorTable;
pub use crate::interrupts::page_fault::{FaultCode, FaultReport, FaultState, PageFaultHandler};
pub use crate::pager::{page_in, page_out};
pub use crate::spawn::spawn_process;
pub use crate::vm::{KernelPaging, init_vm};
pub use kernel_process::{ConfiguredIsolation, MemoryServices, ProcessorControl};
use kernel_alloc::FramePool;
use kernel_process::DescriptorTable;
use kernel_swap::{BlockDevice, SlotRelease, SwapManager};
use kernel_sync::{InterruptControl, SpinLock};
use kernel_vmem::PhysMapper;
use log::{LevelFilter, SetLoggerError};

/// Install the QEMU debug-console logger.
///
/// # Errors
/// Fails if a logger is already installed.
pub fn init_logging(max_level: LevelFilter) -> Result<(), SetLoggerError> {
    kernel_qemu::QemuLogger::new(max_level).init()
}

/// The context of the running kernel: physical memory reached through the
/// identity map.
pub type KernelVm<'k, D> = VmContext<'k, kernel_alloc::IdentityPhysMapper, D>;

/// The kernel state the subsystem operates on.
pub struct VmContext<'k, M, D> {
    memory: MemoryServices<'k, M>,
    paging_file: Option<&'k SwapManager<D>>,
    cpu: &'k dyn ProcessorControl,
}

impl<'k, M: PhysMapper, D: BlockDevice> VmContext<'k, M, D> {
    /// Gather the kernel's memory state and allocate the (still empty)
    /// kernel page directory, which [`init_vm`] fills in.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if no frame is left for the directory.
    pub fn new(
        mapper: &'k M,
        frames: &'k SpinLock<FramePool>,
        gdt: &'k SpinLock<DescriptorTable>,
        irq: &'k dyn InterruptControl,
        cpu: &'k dyn ProcessorControl,
        paging_file: Option<&'k SwapManager<D>>,
    ) -> Result<Self, VmError> {
        let kernel_directory = frames.with_lock_irq(irq, |pool| {
            kernel_vmem::AddressSpace::new(mapper, pool).map(|space| space.directory_page())
        })?;
        Ok(Self {
            memory: MemoryServices {
                mapper,
                frames,
                gdt,
                kernel_directory,
                swap: paging_file.map(|swap| swap as &dyn SlotRelease),
                irq,
            },
            paging_file,
            cpu,
        })
    }

    #[must_use]
    pub const fn memory(&self) -> &MemoryServices<'k, M> {
        &self.memory
    }

    #[must_use]
    pub const fn paging_file(&self) -> Option<&'k SwapManager<D>> {
        self.paging_file
    }

    #[must_use]
    pub const fn cpu(&self) -> &'k dyn ProcessorControl {
        self.cpu
    }

    /// Free frames right now.
    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.memory.with_frames(|pool| pool.free_count())
    }
}
