//! # 32-bit Page Directory and Page Table
//!
//! - [`PdEntry`]: a page directory entry (PDE). Points at a [`PageTable`]
//!   covering 4 MiB; large pages are not used.
//! - [`PtEntry`]: a page table entry (PTE). Maps one 4 KiB frame, or records
//!   a paging-file slot for an evicted page.
//! - [`PageDirectory`] / [`PageTable`]: 4 KiB-aligned arrays of 1024 entries.
//!
//! After modifying active mappings, the caller must perform TLB maintenance.

use crate::PageEntryBits;
use kernel_memory_addresses::{ENTRIES_PER_TABLE, PhysicalPage};

/// A single page directory entry (PDE).
#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PdEntry(PageEntryBits);

/// A single page table entry (PTE).
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PtEntry(PageEntryBits);

/// The page directory: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PD")]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PdEntry; ENTRIES_PER_TABLE],
}

/// A page table: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PtEntry; ENTRIES_PER_TABLE],
}

const _: () = {
    assert!(size_of::<PageDirectory>() == 4096);
    assert!(size_of::<PageTable>() == 4096);
};

impl PdEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// Link the page table in `table` with `flags`.
    #[inline]
    #[must_use]
    pub const fn make_table(table: PhysicalPage, flags: PageEntryBits) -> Self {
        Self(
            flags
                .with_present(true)
                .with_large_page(false)
                .with_frame_page(table),
        )
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    /// The linked page table, if present.
    #[inline]
    #[must_use]
    pub const fn table(self) -> Option<PhysicalPage> {
        if self.0.present() {
            Some(self.0.frame_page())
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }

    #[inline]
    #[must_use]
    pub const fn from_raw(v: u32) -> Self {
        Self(PageEntryBits::from_bits(v))
    }
}

impl PtEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// Map the 4 KiB frame `page` with `flags`; forces `present=1`.
    #[inline]
    #[must_use]
    pub const fn make_4k(page: PhysicalPage, flags: PageEntryBits) -> Self {
        Self(flags.with_present(true).with_os_available(0).with_frame_page(page))
    }

    /// Record that the page now lives in paging-file `slot`.
    #[inline]
    #[must_use]
    pub const fn on_disk(slot: u32) -> Self {
        Self(PageEntryBits::on_disk(slot))
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    /// Whether the entry was ever populated (mapped or evicted).
    #[inline]
    #[must_use]
    pub const fn is_used(self) -> bool {
        !self.0.is_empty()
    }

    /// If present, the mapped frame and the entry's flags.
    #[inline]
    #[must_use]
    pub const fn page_4k(self) -> Option<(PhysicalPage, PageEntryBits)> {
        if self.0.present() {
            Some((self.0.frame_page(), self.0))
        } else {
            None
        }
    }

    /// The paging-file slot of an evicted page.
    #[inline]
    #[must_use]
    pub const fn disk_slot(self) -> Option<u32> {
        self.0.disk_slot()
    }

    /// Expose the underlying bitfield.
    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }

    #[inline]
    #[must_use]
    pub const fn from_raw(v: u32) -> Self {
        Self(PageEntryBits::from_bits(v))
    }
}

macro_rules! impl_table {
    ($table:ident, $entry:ident) => {
        impl $table {
            /// An all-zero table.
            #[inline]
            #[must_use]
            pub const fn zeroed() -> Self {
                Self {
                    entries: [$entry::zero(); ENTRIES_PER_TABLE],
                }
            }

            /// Clear every entry.
            #[inline]
            pub fn zero(&mut self) {
                self.entries.fill($entry::zero());
            }

            /// Read the entry at `index`.
            ///
            /// # Panics
            /// If `index >= 1024`.
            #[inline]
            #[must_use]
            pub const fn get(&self, index: usize) -> $entry {
                self.entries[index]
            }

            /// Overwrite the entry at `index`.
            ///
            /// # Panics
            /// If `index >= 1024`.
            #[inline]
            pub const fn set(&mut self, index: usize, entry: $entry) {
                self.entries[index] = entry;
            }

            /// Borrow the entry at `index`.
            ///
            /// # Panics
            /// If `index >= 1024`.
            #[inline]
            pub const fn entry_mut(&mut self, index: usize) -> &mut $entry {
                &mut self.entries[index]
            }

            /// Iterate over `(index, entry)` pairs.
            pub fn iter(&self) -> impl Iterator<Item = (usize, $entry)> + '_ {
                self.entries.iter().copied().enumerate()
            }
        }
    };
}

impl_table!(PageDirectory, PdEntry);
impl_table!(PageTable, PtEntry);
