use crate::collaborators::FileNotFound;
use kernel_elf::ElfError;
use kernel_process::ProcessError;
use kernel_swap::SwapError;
use kernel_vmem::MapError;

/// Error code reported to user space when the program does not exist.
pub const ENOTFOUND: i32 = -2;

/// Error code reported to user space for every other spawn failure.
pub const EUNSPECIFIED: i32 = -1;

/// Failures of the virtual-memory and process-loading subsystem.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error("malformed executable")]
    MalformedExecutable,
    #[error("unsupported executable format")]
    UnsupportedFormat,
    #[error("executable has too many segments")]
    TooManySegments,
    #[error("file not found")]
    FileNotFound,
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid user pointer")]
    InvalidUserPointer,
    #[error("paging file is full")]
    PagingFileFull,
    /// A kernel invariant does not hold. Never recovered from.
    #[error("kernel fault")]
    KernelFault,
}

impl From<ElfError> for VmError {
    fn from(e: ElfError) -> Self {
        match e {
            ElfError::Malformed(_) => Self::MalformedExecutable,
            ElfError::Unsupported(_) => Self::UnsupportedFormat,
            ElfError::TooManySegments(_) => Self::TooManySegments,
        }
    }
}

impl From<ProcessError> for VmError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::OutOfMemory | ProcessError::DescriptorTableFull => Self::OutOfMemory,
            ProcessError::InvalidUserPointer | ProcessError::PageNotResident(_) => {
                Self::InvalidUserPointer
            }
            ProcessError::MalformedExecutable => Self::MalformedExecutable,
            ProcessError::AlreadyAttached | ProcessError::Destroyed => Self::KernelFault,
        }
    }
}

impl From<SwapError> for VmError {
    fn from(e: SwapError) -> Self {
        match e {
            SwapError::PagingFileFull => Self::PagingFileFull,
            SwapError::SlotOutOfRange(_)
            | SwapError::SlotNotAllocated(_)
            | SwapError::FrameNotPinned(_)
            | SwapError::Device(_)
            | SwapError::NotInitialized => Self::KernelFault,
        }
    }
}

impl From<MapError> for VmError {
    fn from(e: MapError) -> Self {
        match e {
            MapError::OutOfMemory => Self::OutOfMemory,
            MapError::AlreadyMapped => Self::KernelFault,
        }
    }
}

impl From<FileNotFound> for VmError {
    fn from(_: FileNotFound) -> Self {
        Self::FileNotFound
    }
}

/// A failed [`spawn_process`](crate::spawn_process).
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("spawn failed: {0}")]
pub struct SpawnError(pub VmError);

impl SpawnError {
    /// The code handed back to the user program that asked for the spawn.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self.0 {
            VmError::FileNotFound => ENOTFOUND,
            _ => EUNSPECIFIED,
        }
    }
}

macro_rules! spawn_error_from {
    ($($source:ty),*) => {
        $(
            impl From<$source> for SpawnError {
                fn from(e: $source) -> Self {
                    Self(e.into())
                }
            }
        )*
    };
}

spawn_error_from!(VmError, ElfError, ProcessError, SwapError, MapError, FileNotFound);

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_elf::{Malformation, Unsupported};

    #[test]
    fn parser_errors_keep_their_category() {
        assert_eq!(
            VmError::from(ElfError::Malformed(Malformation::BadMagic)),
            VmError::MalformedExecutable
        );
        assert_eq!(
            VmError::from(ElfError::Unsupported(Unsupported::Machine(62))),
            VmError::UnsupportedFormat
        );
        assert_eq!(VmError::from(ElfError::TooManySegments(4)), VmError::TooManySegments);
    }

    #[test]
    fn only_a_missing_file_has_its_own_code() {
        assert_eq!(SpawnError::from(FileNotFound).code(), ENOTFOUND);
        assert_eq!(SpawnError(VmError::OutOfMemory).code(), EUNSPECIFIED);
        assert_eq!(SpawnError::from(ProcessError::MalformedExecutable).code(), EUNSPECIFIED);
        assert_eq!(SpawnError::from(SwapError::PagingFileFull).code(), EUNSPECIFIED);
    }

    #[test]
    fn eviction_failures() {
        assert_eq!(VmError::from(SwapError::PagingFileFull), VmError::PagingFileFull);
        assert_eq!(VmError::from(SwapError::NotInitialized), VmError::KernelFault);
        assert_eq!(VmError::from(ProcessError::PageNotResident(0x1000)), VmError::InvalidUserPointer);
    }
}
