//! Kernel page tables.
//!
//! Physical memory is identity mapped from frame 1 upward, one page table per
//! 4 MiB, so with paging on a physical address is still a valid pointer.
//! Frame 0 stays unmapped: a null dereference faults.
//!
//! All entries are user accessible; system calls run on the same mapping.

use crate::collaborators::{InterruptTable, TrapHandler};
use crate::{VmContext, VmError};
use kernel_info::BootInfo;
use kernel_info::memory::PAGE_FAULT_VECTOR;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalPage, VirtualAddress};
use kernel_swap::BlockDevice;
use kernel_vmem::{AddressSpace, PageEntryBits, PhysMapper};
use log::{debug, info};

/// Frames a 32-bit linear address space can reach.
const ADDRESSABLE_FRAMES: u32 = 1 << 20;

/// What [`init_vm`] built.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct KernelPaging {
    pub directory: PhysicalPage,
    pub pages_mapped: u32,
    pub tables: u32,
}

/// Build the kernel's identity map into the directory of `vm`, install
/// `fault_handler` for the page-fault vector and enable paging.
///
/// Paging stays on for the lifetime of the kernel.
///
/// # Errors
/// [`VmError::OutOfMemory`] if the page tables do not fit; paging is left
/// off in that case.
pub fn init_vm<'k, M: PhysMapper, D: BlockDevice>(
    vm: &VmContext<'_, M, D>,
    boot: &BootInfo,
    idt: &mut dyn InterruptTable<'k>,
    fault_handler: &'k dyn TrapHandler,
) -> Result<KernelPaging, VmError> {
    let memory = vm.memory();
    let space = AddressSpace::from_directory(memory.mapper, memory.kernel_directory);
    let flags = PageEntryBits::user_rw();

    let (pages_mapped, tables) = memory.with_frames(|pool| {
        let mut tables = 0;
        let mut mapped = 0;
        for number in 1..boot.pages().min(ADDRESSABLE_FRAMES) {
            let frame = PhysicalPage::from_number(number);
            let va = VirtualAddress::new(number * PAGE_SIZE);
            if space.ensure_table(pool, va, flags)?.1 {
                tables += 1;
            }
            let entry = space.map_page(pool, va, frame, flags, flags)?;
            pool.record_kernel_mapping(frame, va, entry);
            mapped += 1;
        }
        Ok::<_, VmError>((mapped, tables))
    })?;
    info!("kernel map: {pages_mapped} pages in {tables} page tables");

    idt.install_handler(PAGE_FAULT_VECTOR, fault_handler);
    debug!("page-fault handler installed at vector {PAGE_FAULT_VECTOR}");

    let cpu = vm.cpu();
    space.activate(cpu);
    cpu.enable_paging();
    info!("paging enabled, directory {}", space.directory_page());

    Ok(KernelPaging {
        directory: space.directory_page(),
        pages_mapped,
        tables,
    })
}
