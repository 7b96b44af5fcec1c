//! # Memory Layout

use kernel_memory_addresses::PAGE_SIZE;

/// Size of the stack region appended to every process image.
pub const DEFAULT_USER_STACK_SIZE: u32 = 8192;

/// Maximum number of program headers an executable may carry.
pub const MAX_EXE_SEGMENTS: usize = 3;

/// Linear address at which paged processes see offset 0 of their image.
/// Everything below is shared with the kernel's identity map.
pub const USER_VM_BASE: u32 = 0x8000_0000;

/// Interrupt vector of the page-fault exception.
pub const PAGE_FAULT_VECTOR: u8 = 14;

/// Bytes per disk sector.
pub const SECTOR_SIZE: u32 = 512;

/// Disk sectors per paging-file slot.
pub const SECTORS_PER_PAGE: u32 = PAGE_SIZE / SECTOR_SIZE;

/// Descriptor privilege level of kernel segments.
pub const KERNEL_PRIVILEGE: u8 = 0;

/// Descriptor privilege level of user segments.
pub const USER_PRIVILEGE: u8 = 3;

/// Entries in a per-process local descriptor table (code, data).
pub const NUM_USER_LDT_ENTRIES: usize = 2;

/// Slots in the global descriptor table.
pub const NUM_GDT_ENTRIES: usize = 16;

const _: () = {
    assert!(DEFAULT_USER_STACK_SIZE.is_multiple_of(PAGE_SIZE));
    assert!(USER_VM_BASE.is_multiple_of(PAGE_SIZE * 1024));
    assert!(SECTORS_PER_PAGE * SECTOR_SIZE == PAGE_SIZE);
};
