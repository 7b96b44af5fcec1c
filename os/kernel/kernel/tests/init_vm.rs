mod common;

use common::{Halt, Machine, Threads};
use kernel::{KernelPaging, PageFaultHandler, VectorTable, VmError, init_vm};
use kernel_info::BootInfo;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};
use kernel_process::{CpuEvent, PagedIsolation};
use kernel_vmem::AddressSpace;

#[test]
fn maps_every_frame_but_the_first() {
    let machine = Machine::new(64, None);
    let vm = machine.vm();
    let threads = Threads::<PagedIsolation>::new(&vm);
    let halt = Halt::default();
    let handler = PageFaultHandler::new(&vm, &threads, &halt);
    let mut idt = VectorTable::new();

    let paging = init_vm(&vm, &BootInfo::new(64 * 4), &mut idt, &handler).unwrap();
    assert_eq!(
        paging,
        KernelPaging {
            directory: vm.memory().kernel_directory,
            pages_mapped: 63,
            tables: 1,
        }
    );

    let kernel = AddressSpace::from_directory(&machine.ram, paging.directory);
    assert!(!kernel.entry(VirtualAddress::new(0)).unwrap().is_present());
    assert_eq!(kernel.query(VirtualAddress::new(0x0FFF)), None);
    assert_eq!(
        kernel.query(VirtualAddress::new(0x1234)),
        Some(PhysicalAddress::new(0x1234))
    );
    assert_eq!(
        kernel.query(VirtualAddress::new(63 * 4096 + 8)),
        Some(PhysicalAddress::new(63 * 4096 + 8))
    );
    assert_eq!(kernel.query(VirtualAddress::new(64 * 4096)), None);

    let flags = kernel.entry(VirtualAddress::new(0x5000)).unwrap().flags();
    assert!(flags.present() && flags.writable() && flags.user_access());
}

#[test]
fn paging_is_enabled_last_with_the_handler_in_place() {
    let machine = Machine::new(16, None);
    let vm = machine.vm();
    let threads = Threads::<PagedIsolation>::new(&vm);
    let halt = Halt::default();
    let handler = PageFaultHandler::new(&vm, &threads, &halt);
    let mut idt = VectorTable::new();

    let paging = init_vm(&vm, &BootInfo::new(16 * 4), &mut idt, &handler).unwrap();
    assert_eq!(idt.installed(), 1);
    assert!(idt.is_installed(14));
    assert_eq!(
        machine.cpu.events(),
        vec![CpuEvent::LoadDirectory(paging.directory), CpuEvent::EnablePaging]
    );
}

#[test]
fn one_table_per_four_megabytes() {
    let machine = Machine::new(1025, None);
    let vm = machine.vm();
    let threads = Threads::<PagedIsolation>::new(&vm);
    let halt = Halt::default();
    let handler = PageFaultHandler::new(&vm, &threads, &halt);
    let mut idt = VectorTable::new();

    let paging = init_vm(&vm, &BootInfo::new(1025 * 4), &mut idt, &handler).unwrap();
    assert_eq!(paging.pages_mapped, 1024);
    assert_eq!(paging.tables, 2);

    let kernel = AddressSpace::from_directory(&machine.ram, paging.directory);
    assert!(kernel.directory_entry(0).is_present());
    assert!(kernel.directory_entry(1).is_present());
    assert!(!kernel.directory_entry(2).is_present());
    assert!(!kernel.entry(VirtualAddress::new(0)).unwrap().is_present());
    assert!(kernel.entry(VirtualAddress::new(0x0040_0000)).unwrap().is_present());
}

#[test]
fn frames_record_their_identity_mapping() {
    let machine = Machine::new(32, None);
    let vm = machine.vm();
    let threads = Threads::<PagedIsolation>::new(&vm);
    let halt = Halt::default();
    let handler = PageFaultHandler::new(&vm, &threads, &halt);
    let mut idt = VectorTable::new();
    let free_before = machine.free_frames();

    init_vm(&vm, &BootInfo::new(32 * 4), &mut idt, &handler).unwrap();

    let pool = machine.frames.lock();
    let page = pool.page(PhysicalPage::from_number(20)).unwrap();
    assert_eq!(page.vaddr, Some(VirtualAddress::new(20 * 4096)));
    assert!(page.flags.kernel());
    assert!(!page.flags.allocated());
    assert_eq!(pool.page(PhysicalPage::from_number(0)).unwrap().vaddr, None);
    // the one page table is the only frame taken
    assert_eq!(pool.free_count(), free_before - 1);
}

#[test]
fn running_out_of_frames_leaves_paging_off() {
    let machine = Machine::new(16, None);
    let vm = machine.vm();
    machine.frames.lock().reserve(PhysicalPage::from_number(0), 16);
    let threads = Threads::<PagedIsolation>::new(&vm);
    let halt = Halt::default();
    let handler = PageFaultHandler::new(&vm, &threads, &halt);
    let mut idt = VectorTable::new();

    assert_eq!(
        init_vm(&vm, &BootInfo::new(16 * 4), &mut idt, &handler),
        Err(VmError::OutOfMemory)
    );
    assert_eq!(idt.installed(), 0);
    assert!(machine.cpu.events().is_empty());
}
