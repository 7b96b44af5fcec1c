/// Why an executable image was rejected.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ElfError {
    /// A structural field is inconsistent with the buffer or itself.
    #[error("malformed executable: {0}")]
    Malformed(#[from] Malformation),

    /// Well-formed, but not something this kernel can run.
    #[error("unsupported executable: {0}")]
    Unsupported(#[from] Unsupported),

    /// More program headers than the kernel can load.
    #[error("executable has {0} segments, at most 3 are supported")]
    TooManySegments(u16),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Malformation {
    #[error("buffer shorter than the file header")]
    TooShort,
    #[error("bad magic")]
    BadMagic,
    #[error("unknown format version")]
    BadVersion,
    #[error("no program header table")]
    NoProgramHeaders,
    #[error("no segments")]
    NoSegments,
    #[error("program header entries too small")]
    BadProgramHeaderSize,
    #[error("program header table outside the file")]
    ProgramHeadersOutOfBounds,
    #[error("segment data outside the file")]
    SegmentOutOfBounds,
    #[error("segment file size exceeds its memory size")]
    FileSizeExceedsMemorySize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Unsupported {
    #[error("file class {0} (expected 32-bit)")]
    Class(u8),
    #[error("byte order {0} (expected little-endian)")]
    ByteOrder(u8),
    #[error("file type {0} (expected executable)")]
    FileType(u16),
    #[error("machine {0} (expected i386)")]
    Machine(u16),
}
