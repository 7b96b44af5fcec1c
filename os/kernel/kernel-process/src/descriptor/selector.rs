//! # Segment selectors
//!
//! ```text
//!  15            3 2  1  0
//! +----------------+--+----+
//! |   Index[12:0]  |TI| RPL|
//! +----------------+--+----+  (TI=0 → GDT, TI=1 → LDT; RPL=0..3)
//! ```

use bitfield_struct::bitfield;

/// Which descriptor table a selector addresses.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum Table {
    /// Global Descriptor Table
    Gdt = 0,
    /// Local Descriptor Table
    Ldt = 1,
}

impl Table {
    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        if bits == 0 { Self::Gdt } else { Self::Ldt }
    }

    #[inline]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }
}

#[bitfield(u16)]
#[derive(Eq, PartialEq)]
pub struct SegmentSelector {
    /// Requested Privilege Level (bits 0..1).
    #[bits(2)]
    pub rpl: u8,
    /// Table Indicator (bit 2).
    #[bits(1)]
    pub table: Table,
    /// Descriptor index (bits 3..15).
    #[bits(13)]
    pub index: u16,
}

impl SegmentSelector {
    #[inline]
    #[must_use]
    pub const fn new_with(index: u16, table: Table, rpl: u8) -> Self {
        Self::new()
            .with_index(index)
            .with_table(table)
            .with_rpl(rpl & 0b11)
    }
}
