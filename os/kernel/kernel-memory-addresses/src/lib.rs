//! # 32-bit Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw addresses on a 32-bit, two-level paging
//! x86 machine. The types prevent mixing virtual and physical addresses at
//! compile time while remaining zero-cost wrappers around `u32`.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`VirtualAddress`] | A linear address as seen by code running with paging enabled. |
//! | [`PhysicalAddress`] | A physical memory (or MMIO) address. |
//! | [`PhysicalPage`] | A 4 KiB-aligned physical frame. |
//!
//! A linear address splits into three fields:
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | Directory | Table | Offset |
//! ```
//!
//! One page directory entry therefore covers 4 MiB, one page table entry 4 KiB.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x8040_3123);
//! assert_eq!(va.directory_index(), 0x201);
//! assert_eq!(va.table_index(), 0x003);
//! assert_eq!(va.page_offset(), 0x123);
//! assert_eq!(round_up_to_page(4097), Some(8192));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

use core::fmt;

/// Size of a page/frame in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// log2([`PAGE_SIZE`]).
pub const PAGE_SHIFT: u32 = 12;

/// Number of entries in a page directory or page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Bytes covered by a single page directory entry (4 MiB).
pub const BYTES_PER_TABLE: u32 = PAGE_SIZE * ENTRIES_PER_TABLE as u32;

/// Round `x` up to the next page boundary.
///
/// Returns `None` if the result does not fit into 32 bits.
#[inline]
#[must_use]
pub const fn round_up_to_page(x: u32) -> Option<u32> {
    match x.checked_add(PAGE_SIZE - 1) {
        Some(v) => Some(v & !(PAGE_SIZE - 1)),
        None => None,
    }
}

/// Round `x` down to the containing page boundary.
#[inline]
#[must_use]
pub const fn round_down_to_page(x: u32) -> u32 {
    x & !(PAGE_SIZE - 1)
}

/// Whether `x` lies on a page boundary.
#[inline]
#[must_use]
pub const fn is_page_aligned(x: u32) -> bool {
    x & (PAGE_SIZE - 1) == 0
}

macro_rules! impl_address_common {
    ($name:ident) => {
        impl $name {
            /// Wrap a raw address.
            #[inline]
            #[must_use]
            pub const fn new(addr: u32) -> Self {
                Self(addr)
            }

            /// The raw address value.
            #[inline]
            #[must_use]
            pub const fn as_u32(self) -> u32 {
                self.0
            }

            /// The raw address value, widened for indexing.
            #[inline]
            #[must_use]
            pub const fn as_usize(self) -> usize {
                self.0 as usize
            }

            /// Offset of this address within its 4 KiB page.
            #[inline]
            #[must_use]
            pub const fn page_offset(self) -> u32 {
                self.0 & (PAGE_SIZE - 1)
            }

            /// Checked addition of a byte offset.
            #[inline]
            #[must_use]
            pub const fn checked_add(self, rhs: u32) -> Option<Self> {
                match self.0.checked_add(rhs) {
                    Some(v) => Some(Self(v)),
                    None => None,
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#010x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#010x}", self.0)
            }
        }

        impl From<u32> for $name {
            #[inline]
            fn from(addr: u32) -> Self {
                Self(addr)
            }
        }

        impl From<$name> for u32 {
            #[inline]
            fn from(addr: $name) -> Self {
                addr.0
            }
        }
    };
}

/// A linear (virtual) address.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u32);

/// A physical memory address.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u32);

impl_address_common!(VirtualAddress);
impl_address_common!(PhysicalAddress);

impl VirtualAddress {
    /// Page directory index (bits `[31:22]`).
    #[inline]
    #[must_use]
    pub const fn directory_index(self) -> usize {
        (self.0 >> 22) as usize
    }

    /// Page table index (bits `[21:12]`).
    #[inline]
    #[must_use]
    pub const fn table_index(self) -> usize {
        ((self.0 >> PAGE_SHIFT) & 0x3FF) as usize
    }

    /// The page-aligned base of the containing page.
    #[inline]
    #[must_use]
    pub const fn page_base(self) -> Self {
        Self(round_down_to_page(self.0))
    }

    /// Rebuild a linear address from its directory and table indices.
    #[inline]
    #[must_use]
    pub const fn from_indices(directory: usize, table: usize) -> Self {
        debug_assert!(directory < ENTRIES_PER_TABLE && table < ENTRIES_PER_TABLE);
        Self(((directory as u32) << 22) | ((table as u32) << PAGE_SHIFT))
    }
}

impl PhysicalAddress {
    /// The frame containing this address.
    #[inline]
    #[must_use]
    pub const fn page(self) -> PhysicalPage {
        PhysicalPage::containing_address(self)
    }
}

/// A 4 KiB-aligned physical frame.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage(u32);

impl PhysicalPage {
    /// Build from a page-aligned physical address.
    ///
    /// ### Debug assertions
    /// - Asserts the address is 4 KiB-aligned.
    #[inline]
    #[must_use]
    pub const fn from_addr(addr: PhysicalAddress) -> Self {
        debug_assert!(is_page_aligned(addr.as_u32()));
        Self(addr.as_u32())
    }

    /// The frame that contains `addr`.
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: PhysicalAddress) -> Self {
        Self(round_down_to_page(addr.as_u32()))
    }

    /// Build from a frame number.
    #[inline]
    #[must_use]
    pub const fn from_number(number: u32) -> Self {
        Self(number << PAGE_SHIFT)
    }

    /// Frame number (physical address / 4096).
    #[inline]
    #[must_use]
    pub const fn number(self) -> u32 {
        self.0 >> PAGE_SHIFT
    }

    /// Physical address of the first byte of the frame.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress(self.0)
    }

    /// Address `offset` bytes into the frame.
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u32) -> PhysicalAddress {
        debug_assert!(offset < PAGE_SIZE);
        PhysicalAddress(self.0 | offset)
    }
}

impl fmt::Debug for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage({:#010x})", self.0)
    }
}

impl fmt::Display for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
