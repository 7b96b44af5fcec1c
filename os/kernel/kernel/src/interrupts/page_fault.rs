use crate::collaborators::{Pid, Processor, Scheduler, TrapFrame, TrapHandler};
use crate::pager::page_in;
use crate::VmContext;
use bitfield_struct::bitfield;
use core::fmt;
use kernel_memory_addresses::VirtualAddress;
use kernel_process::MemoryIsolation;
use kernel_swap::BlockDevice;
use kernel_sync::SpinLock;
use kernel_vmem::PhysMapper;
use log::{debug, error, warn};

/// Exit code of a process terminated by an unresolvable fault.
pub const FAULT_EXIT_CODE: i32 = -1;

/// Page-fault error code pushed by the processor.
///
/// Reference: Intel SDM Vol. 3A, §6.15 "Page-Fault Exception (#PF)".
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct FaultCode {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub protection_violation: bool, // bit 0

    /// 0 = read or execute.
    /// 1 = write access.
    pub write: bool, // bit 1

    /// 0 = supervisor (CPL 0–2).
    /// 1 = user mode (CPL 3).
    pub user: bool, // bit 2

    /// 1 = caused by reserved bit set in a paging structure.
    pub reserved_bit: bool, // bit 3

    /// 1 = instruction fetch.
    pub instruction_fetch: bool, // bit 4

    #[bits(27)]
    __: u32,
}

impl FaultCode {
    #[must_use]
    pub const fn explain(self) -> &'static str {
        if self.reserved_bit() {
            "Reserved bit set in a paging structure"
        } else if !self.protection_violation() {
            "Non-present page (page not mapped or swapped out)"
        } else if self.instruction_fetch() {
            "Instruction fetch on protected page"
        } else if self.write() {
            "Write access to protected page"
        } else {
            "Read access to protected page"
        }
    }

    #[must_use]
    pub const fn access(self) -> &'static str {
        if self.instruction_fetch() {
            "execute"
        } else if self.write() {
            "write"
        } else {
            "read"
        }
    }

    #[must_use]
    pub const fn mode(self) -> &'static str {
        if self.user() { "user" } else { "supervisor" }
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.mode(), self.access(), self.explain())
    }
}

/// Diagnostics reported for every fault, whatever the outcome.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FaultReport {
    /// `None` for kernel threads.
    pub pid: Option<Pid>,
    pub address: VirtualAddress,
    /// `None` if the frame pool was locked when the fault hit.
    pub free_frames: Option<usize>,
    pub code: FaultCode,
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page fault at {} ", self.address)?;
        match self.pid {
            Some(pid) => write!(f, "in pid {pid}")?,
            None => f.write_str("in kernel thread")?,
        }
        write!(f, ", code {:#x} ({})", self.code.into_bits(), self.code)?;
        match self.free_frames {
            Some(n) => write!(f, ", {n} free frames"),
            None => f.write_str(", free frames unknown"),
        }
    }
}

/// Where the handler is in resolving a fault.
///
/// ```text
/// Idle ──► FaultDispatched ──┬──► SupervisorFatal
///                            ├──► UserTerminated
///                            └──► DemandPaged
/// ```
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum FaultState {
    #[default]
    Idle,
    FaultDispatched,
    /// Kernel defect; the machine is halted.
    SupervisorFatal,
    /// The faulting process was terminated.
    UserTerminated,
    /// The page was brought back from the paging file; the faulting
    /// instruction is restarted.
    DemandPaged,
}

/// Handler for the page-fault vector.
///
/// Runs with interrupts masked and never unmasks them.
pub struct PageFaultHandler<'k, M, D, I> {
    vm: &'k VmContext<'k, M, D>,
    scheduler: &'k dyn Scheduler<I>,
    processor: &'k dyn Processor,
    state: SpinLock<FaultState>,
    last_report: SpinLock<Option<FaultReport>>,
}

impl<'k, M, D, I> PageFaultHandler<'k, M, D, I>
where
    M: PhysMapper,
    D: BlockDevice,
    I: MemoryIsolation,
{
    #[must_use]
    pub const fn new(
        vm: &'k VmContext<'k, M, D>,
        scheduler: &'k dyn Scheduler<I>,
        processor: &'k dyn Processor,
    ) -> Self {
        Self {
            vm,
            scheduler,
            processor,
            state: SpinLock::new(FaultState::Idle),
            last_report: SpinLock::new(None),
        }
    }

    /// Outcome of the most recent fault, or [`FaultState::Idle`].
    #[must_use]
    pub fn state(&self) -> FaultState {
        *self.state.lock()
    }

    #[must_use]
    pub fn last_report(&self) -> Option<FaultReport> {
        *self.last_report.lock()
    }

    /// Resolve the fault described by `frame`.
    ///
    /// The outcome is recorded before the processor is halted or the
    /// faulting process is switched away from, since neither returns on
    /// hardware.
    pub fn dispatch(&self, frame: &TrapFrame) -> FaultState {
        let nested = {
            let mut state = self.state.lock();
            let nested = *state == FaultState::FaultDispatched;
            *state = FaultState::FaultDispatched;
            nested
        };

        let report = FaultReport {
            pid: self.scheduler.current_pid(),
            address: VirtualAddress::new(frame.fault_address),
            free_frames: self.vm.memory().frames.try_lock().map(|pool| pool.free_count()),
            code: FaultCode::from_bits(frame.error_code),
        };
        error!("{report}");
        *self.last_report.lock() = Some(report);

        let outcome = self.resolve(&report, nested);
        *self.state.lock() = outcome;
        match outcome {
            FaultState::SupervisorFatal => self.halt(frame),
            FaultState::UserTerminated => self.scheduler.exit_current(FAULT_EXIT_CODE),
            _ => {}
        }
        outcome
    }

    fn resolve(&self, report: &FaultReport, nested: bool) -> FaultState {
        if nested {
            error!("page fault while resolving a page fault");
            return FaultState::SupervisorFatal;
        }
        if self.vm.memory().irq.are_enabled() {
            error!("page fault handler entered with interrupts enabled");
            return FaultState::SupervisorFatal;
        }
        if !report.code.user() {
            error!("supervisor page fault: {}", report.code.explain());
            return FaultState::SupervisorFatal;
        }

        if !report.code.protection_violation()
            && let Some(space) = self.scheduler.current_space()
        {
            match page_in(self.vm, &space, report.address) {
                Ok(true) => {
                    debug!("demand paged {} back in", report.address);
                    return FaultState::DemandPaged;
                }
                Ok(false) => {}
                Err(e) => warn!("page-in of {} failed: {e}", report.address),
            }
        }

        match report.pid {
            Some(pid) => warn!("terminating pid {pid}: {}", report.code),
            None => warn!("terminating current thread: {}", report.code),
        }
        FaultState::UserTerminated
    }

    fn halt(&self, frame: &TrapFrame) {
        error!("registers: {frame}");
        error!("halting");
        self.processor.halt();
    }
}

impl<M, D, I> TrapHandler for PageFaultHandler<'_, M, D, I>
where
    M: PhysMapper,
    D: BlockDevice,
    I: MemoryIsolation,
{
    fn handle(&self, frame: &TrapFrame) {
        // the entry stub does not save CR2; read it before anything can fault
        #[cfg(all(feature = "asm", target_arch = "x86"))]
        let frame = &frame.with_latched_fault_address();
        self.dispatch(frame);
    }
}
