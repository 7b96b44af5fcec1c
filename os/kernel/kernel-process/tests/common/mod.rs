#![allow(dead_code)]

use kernel_alloc::{EmulatedRam, FramePool};
use kernel_memory_addresses::{PhysicalPage, VirtualAddress};
use kernel_process::{DescriptorTable, MemoryServices};
use kernel_swap::SlotRelease;
use kernel_sync::{SoftInterrupts, SpinLock};
use kernel_vmem::{AddressSpace, FrameAlloc, PageEntryBits};

/// Emulated RAM, a frame pool over it and a kernel directory with one
/// table, mapping linear 0x0040_0000 to frame 0.
pub struct Machine {
    pub ram: EmulatedRam,
    pub frames: SpinLock<FramePool>,
    pub gdt: SpinLock<DescriptorTable>,
    pub irq: SoftInterrupts,
    pub kernel_directory: PhysicalPage,
}

impl Machine {
    pub fn new(frames: u32) -> Self {
        let ram = EmulatedRam::new(frames);
        let mut pool = FramePool::new(frames);
        pool.reserve(PhysicalPage::from_number(0), 1);
        let kernel_directory = FrameAlloc::alloc_frame(&mut pool).unwrap();
        AddressSpace::from_directory(&ram, kernel_directory)
            .map_page(
                &mut pool,
                VirtualAddress::new(0x0040_0000),
                PhysicalPage::from_number(0),
                PageEntryBits::user_rw(),
                PageEntryBits::user_rw(),
            )
            .unwrap();
        Self {
            ram,
            frames: SpinLock::new(pool),
            gdt: SpinLock::new(DescriptorTable::new()),
            irq: SoftInterrupts::new(true),
            kernel_directory,
        }
    }

    pub fn services(&self) -> MemoryServices<'_, EmulatedRam> {
        self.services_with_swap(None)
    }

    pub fn services_with_swap<'a>(&'a self, swap: Option<&'a dyn SlotRelease>) -> MemoryServices<'a, EmulatedRam> {
        MemoryServices {
            mapper: &self.ram,
            frames: &self.frames,
            gdt: &self.gdt,
            kernel_directory: self.kernel_directory,
            swap,
            irq: &self.irq,
        }
    }

    pub fn free_frames(&self) -> usize {
        self.frames.lock().free_count()
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

pub fn u32_at(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(b[at..at + 4].try_into().unwrap())
}
