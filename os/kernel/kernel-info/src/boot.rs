//! # Kernel Boot Information

use kernel_memory_addresses::PAGE_SIZE;

/// Information the loader hands the kernel at startup.
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootInfo {
    /// Installed physical memory in KiB.
    pub mem_size_kb: u32,
}

impl BootInfo {
    #[must_use]
    pub const fn new(mem_size_kb: u32) -> Self {
        Self { mem_size_kb }
    }

    /// Number of whole 4 KiB frames of installed memory.
    #[must_use]
    pub const fn pages(&self) -> u32 {
        self.mem_size_kb / (PAGE_SIZE / 1024)
    }
}
