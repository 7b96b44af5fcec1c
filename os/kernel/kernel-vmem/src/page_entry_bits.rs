use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalPage;

/// A single 32-bit x86 page directory or page table entry in raw bitfield form.
///
/// Both levels of the 32-bit two-level walk share this layout. A directory
/// entry points at a page table; a table entry maps one 4 KiB frame.
///
/// ### Bit layout
///
/// | Bits   | Name / Mnemonic | Meaning |
/// |--------|-----------------|---------|
/// | 0      | `P` (present)   | Valid entry if set |
/// | 1      | `RW`            | Writable if set |
/// | 2      | `US`            | User-mode accessible if set |
/// | 3      | `PWT`           | Write-through caching |
/// | 4      | `PCD`           | Disable caching |
/// | 5      | `A`             | Accessed |
/// | 6      | `D`             | Dirty (table entries only) |
/// | 7      | `PS` / `PAT`    | 4 MiB page in a directory entry; must stay 0 here |
/// | 8      | `G`             | Global |
/// | 9–11   | OS available    | Ignored by hardware |
/// | 12–31  | `frame`         | Physical frame number |
///
/// ### Entries that are not present
///
/// When `P` is clear the processor ignores every other bit, so the kernel
/// reuses them: an entry whose OS bits equal [`PageEntryBits::ON_DISK`] stores
/// the paging-file slot holding the evicted page in its frame field.
///
/// ```rust
/// # use kernel_vmem::PageEntryBits;
/// # use kernel_memory_addresses::PhysicalPage;
/// let e = PageEntryBits::user_rw().with_frame_page(PhysicalPage::from_number(0x42));
/// assert!(e.present() && e.writable() && e.user_access());
/// assert_eq!(e.into_bits(), 0x0004_2007);
///
/// let evicted = PageEntryBits::on_disk(17);
/// assert!(!evicted.present());
/// assert_eq!(evicted.disk_slot(), Some(17));
/// ```
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    ///
    /// Set to allow ring 3 access; clear restricts to supervisor only.
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU on first access.
    pub accessed: bool,

    /// Dirty (D, bit 6). Set by the CPU on first write through a table entry.
    pub dirty: bool,

    /// Page Size (PS, bit 7) in a directory entry. The kernel only uses
    /// 4 KiB pages, so this stays clear.
    pub large_page: bool,

    /// Global (G, bit 8).
    pub global: bool,

    /// OS-available (bits 9..=11).
    #[bits(3)]
    pub os_available: u8,

    /// Physical frame number (bits 12..=31), or a paging-file slot when
    /// the entry is [`ON_DISK`](Self::ON_DISK).
    #[bits(20)]
    pub frame: u32,
}

impl PageEntryBits {
    /// OS-bits marker for a non-present entry whose page lives in the paging file.
    pub const ON_DISK: u8 = 0b001;

    /// Largest slot index an on-disk entry can carry.
    pub const MAX_DISK_SLOT: u32 = (1 << 20) - 1;

    /// Present, writable, user-accessible.
    ///
    /// Used for the kernel's identity map as well as user pages: system calls
    /// run in the same mapping as the process that made them.
    #[inline]
    #[must_use]
    pub const fn user_rw() -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(true)
    }

    /// Present, writable, supervisor-only.
    #[inline]
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// A non-present entry recording that the page was evicted to `slot`.
    ///
    /// ### Debug assertions
    /// - Asserts `slot` fits the 20-bit frame field.
    #[inline]
    #[must_use]
    pub const fn on_disk(slot: u32) -> Self {
        debug_assert!(slot <= Self::MAX_DISK_SLOT);
        Self::new().with_os_available(Self::ON_DISK).with_frame(slot)
    }

    /// The paging-file slot, if this entry describes an evicted page.
    #[inline]
    #[must_use]
    pub const fn disk_slot(self) -> Option<u32> {
        if !self.present() && self.os_available() == Self::ON_DISK {
            Some(self.frame())
        } else {
            None
        }
    }

    /// The frame this entry points at.
    #[inline]
    #[must_use]
    pub const fn frame_page(self) -> PhysicalPage {
        PhysicalPage::from_number(self.frame())
    }

    /// Copy of these flags pointing at `page`.
    #[inline]
    #[must_use]
    pub const fn with_frame_page(self, page: PhysicalPage) -> Self {
        self.with_frame(page.number())
    }

    /// Just the permission and cache bits, frame and OS bits cleared.
    #[inline]
    #[must_use]
    pub const fn permissions(self) -> Self {
        Self::new()
            .with_present(self.present())
            .with_writable(self.writable())
            .with_user_access(self.user_access())
            .with_write_through(self.write_through())
            .with_cache_disabled(self.cache_disabled())
            .with_global(self.global())
    }

    /// Whether the entry is all zero (never used).
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.into_bits() == 0
    }
}
