#![allow(dead_code)]

use kernel::{FileNotFound, FileSystem, Pid, Processor, Scheduler, TrapFrame, VmContext};
use kernel_alloc::{EmulatedRam, FramePool};
use kernel_memory_addresses::PhysicalPage;
use kernel_process::{AddressSpace, ContextSlot, DescriptorTable, MemoryIsolation, RecordingProcessor};
use kernel_swap::{MemoryBlockDevice, SwapManager};
use kernel_sync::{SoftInterrupts, SpinLock};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

pub type Vm<'a> = VmContext<'a, EmulatedRam, MemoryBlockDevice>;

/// Emulated hardware: RAM, frame pool, GDT, interrupt flag, processor and an
/// optional paging file.
pub struct Machine {
    pub ram: EmulatedRam,
    pub frames: SpinLock<FramePool>,
    pub gdt: SpinLock<DescriptorTable>,
    /// Masked, as inside a trap handler.
    pub irq: SoftInterrupts,
    pub cpu: RecordingProcessor,
    pub swap: Option<SwapManager<MemoryBlockDevice>>,
}

impl Machine {
    pub fn new(frames: u32, swap_slots: Option<u32>) -> Self {
        let mut pool = FramePool::new(frames);
        pool.reserve(PhysicalPage::from_number(0), 1);
        let swap = swap_slots.map(|slots| {
            SwapManager::new(MemoryBlockDevice::new(slots * 8), 0, slots * 8).unwrap()
        });
        Self {
            ram: EmulatedRam::new(frames),
            frames: SpinLock::new(pool),
            gdt: SpinLock::new(DescriptorTable::new()),
            irq: SoftInterrupts::new(false),
            cpu: RecordingProcessor::new(),
            swap,
        }
    }

    pub fn vm(&self) -> Vm<'_> {
        VmContext::new(&self.ram, &self.frames, &self.gdt, &self.irq, &self.cpu, self.swap.as_ref()).unwrap()
    }

    pub fn free_frames(&self) -> usize {
        self.frames.lock().free_count()
    }
}

#[derive(Default)]
pub struct Files(pub HashMap<String, Vec<u8>>);

impl Files {
    pub fn with(path: &str, bytes: Vec<u8>) -> Self {
        let mut files = Self::default();
        files.0.insert(path.to_owned(), bytes);
        files
    }
}

impl FileSystem for Files {
    fn read_fully(&self, path: &str) -> Result<Vec<u8>, FileNotFound> {
        self.0.get(path).cloned().ok_or(FileNotFound)
    }
}

pub struct Thread<I> {
    pub pid: Pid,
    pub slot: ContextSlot<I>,
    pub exit_code: Option<i32>,
}

/// Keeps threads in a list; "current" is whatever the test says.
pub struct Threads<'a, I> {
    vm: &'a Vm<'a>,
    pub threads: RefCell<Vec<Thread<I>>>,
    pub current: Cell<Option<Pid>>,
    pub refuse: Cell<bool>,
}

impl<'a, I: MemoryIsolation> Threads<'a, I> {
    pub fn new(vm: &'a Vm<'a>) -> Self {
        Self {
            vm,
            threads: RefCell::new(Vec::new()),
            current: Cell::new(None),
            refuse: Cell::new(false),
        }
    }

    pub fn space(&self, pid: Pid) -> Option<Arc<AddressSpace<I>>> {
        let threads = self.threads.borrow();
        threads.iter().find(|t| t.pid == pid)?.slot.space().cloned()
    }

    pub fn exit_code(&self, pid: Pid) -> Option<i32> {
        self.threads.borrow().iter().find(|t| t.pid == pid)?.exit_code
    }
}

impl<I: MemoryIsolation> Scheduler<I> for Threads<'_, I> {
    fn start_user_thread(&self, space: Arc<AddressSpace<I>>, _detached: bool) -> Option<Pid> {
        if self.refuse.get() {
            return None;
        }
        let mut slot = ContextSlot::default();
        slot.attach(space, self.vm.memory()).ok()?;
        let mut threads = self.threads.borrow_mut();
        #[allow(clippy::cast_possible_truncation)]
        let pid = threads.len() as Pid + 1;
        threads.push(Thread {
            pid,
            slot,
            exit_code: None,
        });
        Some(pid)
    }

    fn current_pid(&self) -> Option<Pid> {
        self.current.get()
    }

    fn current_space(&self) -> Option<Arc<AddressSpace<I>>> {
        self.space(self.current.get()?)
    }

    fn exit_current(&self, exit_code: i32) {
        let Some(pid) = self.current.take() else {
            return;
        };
        let mut threads = self.threads.borrow_mut();
        if let Some(thread) = threads.iter_mut().find(|t| t.pid == pid) {
            thread.slot.detach(self.vm.memory());
            thread.exit_code = Some(exit_code);
        }
    }
}

#[derive(Default)]
pub struct Halt(pub Cell<bool>);

impl Processor for Halt {
    fn halt(&self) {
        self.0.set(true);
    }
}

/// A page-fault trap frame.
pub fn fault(address: u32, error_code: u32) -> TrapFrame {
    TrapFrame {
        vector: 14,
        error_code,
        fault_address: address,
        eip: 0x1000,
        cs: 0x1b,
        eflags: 0x2,
        esp: 0x8000_2ff0,
    }
}

/// A minimal i386 executable: one program header per `(vaddr, bytes,
/// memsz)`, file data packed after the headers.
pub fn executable(entry: u32, segments: &[(u32, &[u8], u32)]) -> Vec<u8> {
    #[allow(clippy::cast_possible_truncation)]
    let count = segments.len() as u16;
    let mut b = Vec::new();
    b.extend_from_slice(b"\x7FELF");
    b.extend_from_slice(&[1, 1, 1]);
    b.resize(16, 0);
    b.extend_from_slice(&2u16.to_le_bytes());
    b.extend_from_slice(&3u16.to_le_bytes());
    b.extend_from_slice(&1u32.to_le_bytes());
    b.extend_from_slice(&entry.to_le_bytes());
    b.extend_from_slice(&52u32.to_le_bytes());
    b.extend_from_slice(&[0; 8]);
    b.extend_from_slice(&52u16.to_le_bytes());
    b.extend_from_slice(&32u16.to_le_bytes());
    b.extend_from_slice(&count.to_le_bytes());
    b.extend_from_slice(&[0; 6]);

    let mut offset = 52 + 32 * u32::from(count);
    for &(vaddr, bytes, memsz) in segments {
        #[allow(clippy::cast_possible_truncation)]
        let filesz = bytes.len() as u32;
        for word in [1, offset, vaddr, vaddr, filesz, memsz, 0b111, 0x1000] {
            b.extend_from_slice(&word.to_le_bytes());
        }
        offset += filesz;
    }
    for &(_, bytes, _) in segments {
        b.extend_from_slice(bytes);
    }
    b
}

pub const CODE: [u8; 8] = [0x55, 0x89, 0xE5, 0x31, 0xC0, 0x5D, 0xC3, 0x90];

/// Code at 0, 0x1000 bytes of memory.
pub fn program() -> Vec<u8> {
    executable(0x10, &[(0, &CODE[..], 0x1000)])
}
