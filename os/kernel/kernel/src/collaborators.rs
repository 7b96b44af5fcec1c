//! Kernel services this subsystem consumes but does not own: the file
//! system, the scheduler, the interrupt descriptor table and the processor.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use kernel_process::AddressSpace;

/// Process identifier handed out by the scheduler.
pub type Pid = u32;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("file not found")]
pub struct FileNotFound;

pub trait FileSystem {
    /// The complete contents of the file at `path`.
    ///
    /// # Errors
    /// [`FileNotFound`] if there is no such file.
    fn read_fully(&self, path: &str) -> Result<Vec<u8>, FileNotFound>;
}

/// Execution contexts running in user address spaces.
pub trait Scheduler<I> {
    /// Create a thread that starts in user mode in `space`.
    ///
    /// The scheduler attaches the new context to `space` and keeps its own
    /// reference. `None` if no context could be created.
    fn start_user_thread(&self, space: Arc<AddressSpace<I>>, detached: bool) -> Option<Pid>;

    /// The process the interrupted context belongs to; `None` for kernel
    /// threads.
    fn current_pid(&self) -> Option<Pid>;

    /// The address space of the interrupted context.
    fn current_space(&self) -> Option<Arc<AddressSpace<I>>>;

    /// Terminate the interrupted process with `exit_code`. Its context is
    /// detached, which destroys the address space once no one else holds it.
    fn exit_current(&self, exit_code: i32);
}

pub trait Processor {
    /// Stop the machine. Does not return on real hardware.
    fn halt(&self);
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl Processor for kernel_vmem::Cpu {
    fn halt(&self) {
        loop {
            // SAFETY: ring 0, interrupts are masked by the caller
            unsafe { core::arch::asm!("hlt", options(nomem, nostack)) };
        }
    }
}

/// What the low-level entry stub saved for a trap.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct TrapFrame {
    pub vector: u8,
    pub error_code: u32,
    /// CR2 at entry; only meaningful for page faults.
    pub fault_address: u32,
    pub eip: u32,
    pub cs: u16,
    pub eflags: u32,
    pub esp: u32,
}

impl TrapFrame {
    /// Fill in [`fault_address`](Self::fault_address) from CR2.
    #[cfg(all(feature = "asm", target_arch = "x86"))]
    #[must_use]
    pub fn with_latched_fault_address(mut self) -> Self {
        use kernel_registers::{Cr2, LoadRegisterUnsafe};
        // SAFETY: reading CR2 is side-effect free in ring 0
        let cr2 = unsafe { Cr2::load_unsafe() };
        self.fault_address = cr2.fault_address().as_u32();
        self
    }
}

impl fmt::Display for TrapFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vector={} err={:#x} cr2={:#010x} eip={:#010x} cs={:#06x} eflags={:#010x} esp={:#010x}",
            self.vector, self.error_code, self.fault_address, self.eip, self.cs, self.eflags, self.esp
        )
    }
}

/// A handler the interrupt table dispatches to.
pub trait TrapHandler {
    fn handle(&self, frame: &TrapFrame);
}

pub trait InterruptTable<'k> {
    fn install_handler(&mut self, vector: u8, handler: &'k dyn TrapHandler);
}
