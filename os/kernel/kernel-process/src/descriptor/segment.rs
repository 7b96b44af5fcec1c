//! # 32-bit segment descriptor encoding
//!
//! ```text
//!  63      56 55 54 53 52 51   48 47 46 45 44 43  40 39            16 15        0
//! +----------+--+--+--+--+-------+--+-----+--+------+----------------+-----------+
//! | base_hi  |G |DB|L |AVL|lim_hi|P | DPL |S | type |    base_lo     |  limit_lo |
//! +----------+--+--+--+--+-------+--+-----+--+------+----------------+-----------+
//! ```
//!
//! With `G = 1` the 20-bit limit counts 4 KiB units, so a segment of `n`
//! pages has limit `n - 1`.

use bitfield_struct::bitfield;
use kernel_memory_addresses::PAGE_SIZE;

#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub limit_lo: u16, // [15:0]
    #[bits(24)]
    pub base_lo: u32, // [39:16]
    #[bits(4)]
    pub typ: u8, // [43:40]
    pub s: bool, // [44] 1 = code/data, 0 = system
    #[bits(2)]
    pub dpl: u8, // [46:45]
    pub p: bool, // [47]
    #[bits(4)]
    pub limit_hi: u8, // [51:48]
    pub avl: bool, // [52]
    pub l: bool,   // [53] 64-bit code, always 0 here
    pub db: bool,  // [54] 32-bit default operand size
    pub g: bool,   // [55] limit in 4 KiB units
    pub base_hi: u8, // [63:56]
}

impl SegmentDescriptor {
    const TYPE_CODE_EXEC_READ: u8 = 0b1010;
    const TYPE_DATA_READ_WRITE: u8 = 0b0010;
    const TYPE_SYSTEM_LDT: u8 = 0b0010;
    const MAX_LIMIT: u32 = 0xF_FFFF;

    /// Execute/read code segment covering `size` bytes from `base`,
    /// rounded up to whole pages.
    #[must_use]
    pub const fn code(base: u32, size: u32, dpl: u8) -> Self {
        Self::paged_segment(base, Self::limit_for(size), dpl).with_typ(Self::TYPE_CODE_EXEC_READ)
    }

    /// Read/write data segment covering `size` bytes from `base`.
    #[must_use]
    pub const fn data(base: u32, size: u32, dpl: u8) -> Self {
        Self::paged_segment(base, Self::limit_for(size), dpl).with_typ(Self::TYPE_DATA_READ_WRITE)
    }

    /// Code segment spanning the whole 4 GiB.
    #[must_use]
    pub const fn flat_code(dpl: u8) -> Self {
        Self::paged_segment(0, Self::MAX_LIMIT, dpl).with_typ(Self::TYPE_CODE_EXEC_READ)
    }

    /// Data segment spanning the whole 4 GiB.
    #[must_use]
    pub const fn flat_data(dpl: u8) -> Self {
        Self::paged_segment(0, Self::MAX_LIMIT, dpl).with_typ(Self::TYPE_DATA_READ_WRITE)
    }

    /// System descriptor for a local descriptor table of `entries` slots.
    #[must_use]
    pub const fn ldt(base: u32, entries: u32) -> Self {
        Self::new()
            .with_base(base)
            .with_limit(entries * 8 - 1)
            .with_typ(Self::TYPE_SYSTEM_LDT)
            .with_s(false)
            .with_dpl(0)
            .with_p(true)
    }

    #[must_use]
    pub const fn base(self) -> u32 {
        self.base_lo() | (self.base_hi() as u32) << 24
    }

    /// The raw 20-bit limit field.
    #[must_use]
    pub const fn limit(self) -> u32 {
        self.limit_lo() as u32 | (self.limit_hi() as u32) << 16
    }

    /// Number of addressable bytes.
    #[must_use]
    pub const fn size_in_bytes(self) -> u64 {
        let units = self.limit() as u64 + 1;
        if self.g() { units * PAGE_SIZE as u64 } else { units }
    }

    const fn paged_segment(base: u32, limit: u32, dpl: u8) -> Self {
        Self::new()
            .with_base(base)
            .with_limit(limit)
            .with_s(true)
            .with_dpl(dpl & 0b11)
            .with_p(true)
            .with_db(true)
            .with_g(true)
    }

    const fn limit_for(size: u32) -> u32 {
        size.div_ceil(PAGE_SIZE).saturating_sub(1)
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn with_base(self, base: u32) -> Self {
        self.with_base_lo(base & 0xFF_FFFF).with_base_hi((base >> 24) as u8)
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn with_limit(self, limit: u32) -> Self {
        self.with_limit_lo(limit as u16)
            .with_limit_hi(((limit >> 16) & 0xF) as u8)
    }
}

const _: () = assert!(size_of::<SegmentDescriptor>() == 8);
