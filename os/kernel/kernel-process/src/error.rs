use kernel_vmem::MapError;

/// Failures while building, using or tearing down a process image.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ProcessError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("user buffer is outside the address space")]
    InvalidUserPointer,
    #[error("user page at {0:#x} is not resident")]
    PageNotResident(u32),
    #[error("segment does not fit the executable file")]
    MalformedExecutable,
    #[error("address space already has an execution context")]
    AlreadyAttached,
    #[error("address space has been destroyed")]
    Destroyed,
    #[error("no free descriptor table slot")]
    DescriptorTableFull,
}

impl From<MapError> for ProcessError {
    /// Process directories are fresh, so only frame exhaustion can occur.
    fn from(_: MapError) -> Self {
        Self::OutOfMemory
    }
}
