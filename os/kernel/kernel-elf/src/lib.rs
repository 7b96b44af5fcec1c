//! # Executable Image Parser
//!
//! Validates a 32-bit little-endian i386 ELF executable held in memory and
//! describes how its segments must be laid out in a process image.
//!
//! Header fields are decoded one by one with explicit byte order, never by
//! overlaying a struct on the buffer:
//!
//! ```text
//! File header (52 bytes)                 Program header (32 bytes each)
//! 0x00 e_ident[16]                       0x00 p_type
//! 0x10 e_type      0x12 e_machine        0x04 p_offset
//! 0x14 e_version   0x18 e_entry          0x08 p_vaddr
//! 0x1C e_phoff     0x20 e_shoff          0x0C p_paddr
//! 0x24 e_flags     0x28 e_ehsize         0x10 p_filesz
//! 0x2A e_phentsize 0x2C e_phnum          0x14 p_memsz
//! 0x2E e_shentsize 0x30 e_shnum          0x18 p_flags
//! 0x32 e_shstrndx                        0x1C p_align
//! ```
//!
//! The kernel loads at most [`MAX_EXE_SEGMENTS`] program headers, whatever
//! their type.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod error;

pub use error::{ElfError, Malformation, Unsupported};
use bitfield_struct::bitfield;
pub use kernel_info::memory::MAX_EXE_SEGMENTS;
use log::{debug, warn};

/// Size of the ELF32 file header.
pub const FILE_HEADER_SIZE: usize = 52;

/// Size of one ELF32 program header.
pub const PROGRAM_HEADER_SIZE: usize = 32;

const MAGIC: &[u8; 4] = b"\x7FELF";
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const EV_CURRENT: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_386: u16 = 3;

/// `Elf32_Phdr.p_flags`: bit0=X, bit1=W, bit2=R.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PFlags {
    pub execute: bool, // PF_X = 1
    pub write: bool,   // PF_W = 2
    pub read: bool,    // PF_R = 4
    #[bits(29)]
    __: u32,
}

/// Where one segment comes from and where it goes.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Segment {
    pub offset_in_file: u32,
    pub length_in_file: u32,
    /// Offset of the segment within the process image.
    pub start_address: u32,
    /// Bytes the segment occupies in memory; the tail past
    /// `length_in_file` is zero-filled.
    pub size_in_memory: u32,
    pub prot: PFlags,
}

impl Segment {
    /// First byte past the segment in the process image.
    #[must_use]
    pub const fn end_address(&self) -> Option<u32> {
        self.start_address.checked_add(self.size_in_memory)
    }

    /// The bytes of the segment within the executable file.
    ///
    /// `None` if the range does not fit `file`; [`parse`] has already
    /// checked this for the buffer it was given.
    #[must_use]
    pub fn file_bytes<'a>(&self, file: &'a [u8]) -> Option<&'a [u8]> {
        let start = self.offset_in_file as usize;
        let end = start.checked_add(self.length_in_file as usize)?;
        file.get(start..end)
    }
}

/// The decoded executable: entry point and up to three segments.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ExecutableImage {
    pub entry: u32,
    segments: [Segment; MAX_EXE_SEGMENTS],
    count: usize,
}

impl ExecutableImage {
    /// The segments, in program-header order.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments[..self.count]
    }

    /// Highest `start_address + size_in_memory` over all segments.
    #[must_use]
    pub fn max_segment_end(&self) -> Option<u32> {
        self.segments()
            .iter()
            .try_fold(0u32, |max, s| Some(max.max(s.end_address()?)))
    }
}

#[inline]
fn le16(x: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([x[at], x[at + 1]])
}

#[inline]
fn le32(x: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([x[at], x[at + 1], x[at + 2], x[at + 3]])
}

/// Parse and validate `bytes` as an executable.
///
/// Checks run in order: magic, class, byte order, version, file type,
/// machine, program header offset and count, the segment limit, then the
/// bounds of the program header table and of every segment.
///
/// # Errors
/// The first check that fails, as an [`ElfError`].
pub fn parse(bytes: &[u8]) -> Result<ExecutableImage, ElfError> {
    parse_inner(bytes).inspect_err(|e| warn!("rejecting executable: {e}"))
}

fn parse_inner(bytes: &[u8]) -> Result<ExecutableImage, ElfError> {
    if bytes.len() < FILE_HEADER_SIZE {
        return Err(Malformation::TooShort.into());
    }
    if &bytes[0..4] != MAGIC {
        return Err(Malformation::BadMagic.into());
    }
    if bytes[4] != ELFCLASS32 {
        return Err(Unsupported::Class(bytes[4]).into());
    }
    if bytes[5] != ELFDATA2LSB {
        return Err(Unsupported::ByteOrder(bytes[5]).into());
    }
    if bytes[6] != EV_CURRENT {
        return Err(Malformation::BadVersion.into());
    }

    let e_type = le16(bytes, 0x10);
    let e_machine = le16(bytes, 0x12);
    let e_version = le32(bytes, 0x14);
    let e_entry = le32(bytes, 0x18);
    let e_phoff = le32(bytes, 0x1C);
    let e_phentsize = le16(bytes, 0x2A);
    let e_phnum = le16(bytes, 0x2C);

    if e_type != ET_EXEC {
        return Err(Unsupported::FileType(e_type).into());
    }
    if e_machine != EM_386 {
        return Err(Unsupported::Machine(e_machine).into());
    }
    if e_version != u32::from(EV_CURRENT) {
        return Err(Malformation::BadVersion.into());
    }
    if e_phoff == 0 {
        return Err(Malformation::NoProgramHeaders.into());
    }
    if e_phnum == 0 {
        return Err(Malformation::NoSegments.into());
    }
    if usize::from(e_phnum) > MAX_EXE_SEGMENTS {
        return Err(ElfError::TooManySegments(e_phnum));
    }
    if usize::from(e_phentsize) < PROGRAM_HEADER_SIZE {
        return Err(Malformation::BadProgramHeaderSize.into());
    }

    let table_start = e_phoff as usize;
    let table_end = usize::from(e_phnum)
        .checked_mul(usize::from(e_phentsize))
        .and_then(|len| table_start.checked_add(len))
        .ok_or(Malformation::ProgramHeadersOutOfBounds)?;
    if table_end > bytes.len() {
        return Err(Malformation::ProgramHeadersOutOfBounds.into());
    }

    let mut image = ExecutableImage {
        entry: e_entry,
        segments: [Segment::default(); MAX_EXE_SEGMENTS],
        count: usize::from(e_phnum),
    };
    for (i, slot) in image.segments.iter_mut().take(image.count).enumerate() {
        let ph = &bytes[table_start + i * usize::from(e_phentsize)..];
        let segment = Segment {
            offset_in_file: le32(ph, 0x04),
            start_address: le32(ph, 0x08),
            length_in_file: le32(ph, 0x10),
            size_in_memory: le32(ph, 0x14),
            prot: PFlags::from_bits(le32(ph, 0x18)),
        };
        if segment.file_bytes(bytes).is_none() {
            return Err(Malformation::SegmentOutOfBounds.into());
        }
        if segment.length_in_file > segment.size_in_memory {
            return Err(Malformation::FileSizeExceedsMemorySize.into());
        }
        debug!(
            "segment {i}: file {:#x}+{:#x} -> {:#010x}+{:#x} prot {:#x}",
            segment.offset_in_file,
            segment.length_in_file,
            segment.start_address,
            segment.size_in_memory,
            segment.prot.into_bits()
        );
        *slot = segment;
    }

    Ok(image)
}
