//! # Descriptor tables for segment-isolated processes
//!
//! GDT layout:
//!
//! Index | Meaning
//! ------|--------
//! 0     | Null
//! 1     | Kernel code (flat, DPL 0)
//! 2     | Kernel data (flat, DPL 0)
//! 3..   | Per-process LDT descriptors, handed out by [`DescriptorTable::allocate_ldt_slot`]
//!
//! Each segmented process owns an LDT of [`NUM_USER_LDT_ENTRIES`] entries:
//! user code at index 0 and user data at index 1.

mod segment;
mod selector;

pub use segment::SegmentDescriptor;
pub use selector::{SegmentSelector, Table};
use kernel_info::memory::{KERNEL_PRIVILEGE, NUM_GDT_ENTRIES, NUM_USER_LDT_ENTRIES};
use kernel_memory_addresses::PhysicalAddress;

/// First GDT index available for LDT descriptors.
pub const FIRST_FREE_GDT_INDEX: usize = 3;

/// The global descriptor table image. A slot is in use iff its descriptor is
/// present.
#[repr(C, align(8))]
pub struct DescriptorTable {
    entries: [SegmentDescriptor; NUM_GDT_ENTRIES],
}

impl DescriptorTable {
    /// Null descriptor plus flat kernel code and data.
    #[must_use]
    pub const fn new() -> Self {
        let mut entries = [SegmentDescriptor::new(); NUM_GDT_ENTRIES];
        entries[1] = SegmentDescriptor::flat_code(KERNEL_PRIVILEGE);
        entries[2] = SegmentDescriptor::flat_data(KERNEL_PRIVILEGE);
        Self { entries }
    }

    /// Install an LDT descriptor for a table at `ldt_base` and return the
    /// selector to load it with, or `None` when the table is full.
    #[allow(clippy::cast_possible_truncation)]
    pub fn allocate_ldt_slot(&mut self, ldt_base: PhysicalAddress) -> Option<SegmentSelector> {
        let index = (FIRST_FREE_GDT_INDEX..NUM_GDT_ENTRIES).find(|&i| !self.entries[i].p())?;
        self.entries[index] = SegmentDescriptor::ldt(ldt_base.as_u32(), NUM_USER_LDT_ENTRIES as u32);
        Some(SegmentSelector::new_with(index as u16, Table::Gdt, KERNEL_PRIVILEGE))
    }

    /// Clear the descriptor at `index`. Returns `false` if the slot was free
    /// or is reserved for the kernel.
    pub fn free_slot(&mut self, index: u16) -> bool {
        let index = usize::from(index);
        match self.entries.get_mut(index) {
            Some(entry) if index >= FIRST_FREE_GDT_INDEX && entry.p() => {
                *entry = SegmentDescriptor::new();
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn get(&self, index: u16) -> Option<SegmentDescriptor> {
        self.entries.get(usize::from(index)).copied()
    }

    /// Number of free LDT slots.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.entries[FIRST_FREE_GDT_INDEX..]
            .iter()
            .filter(|e| !e.p())
            .count()
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_handed_out_and_returned() {
        let mut gdt = DescriptorTable::new();
        let total = gdt.free_slots();
        assert_eq!(total, NUM_GDT_ENTRIES - FIRST_FREE_GDT_INDEX);

        let sel = gdt.allocate_ldt_slot(PhysicalAddress::new(0x5000)).unwrap();
        assert_eq!(sel.index(), 3);
        assert_eq!(sel.table(), Table::Gdt);
        assert_eq!(gdt.get(3).unwrap().base(), 0x5000);
        assert_eq!(gdt.free_slots(), total - 1);

        assert!(gdt.free_slot(3));
        assert!(!gdt.free_slot(3));
        assert_eq!(gdt.free_slots(), total);
    }

    #[test]
    fn kernel_slots_are_not_freed() {
        let mut gdt = DescriptorTable::new();
        assert!(!gdt.free_slot(1));
        assert!(!gdt.free_slot(0));
        assert!(gdt.get(1).unwrap().p());
    }

    #[test]
    fn exhaustion() {
        let mut gdt = DescriptorTable::new();
        for _ in FIRST_FREE_GDT_INDEX..NUM_GDT_ENTRIES {
            assert!(gdt.allocate_ldt_slot(PhysicalAddress::new(0)).is_some());
        }
        assert!(gdt.allocate_ldt_slot(PhysicalAddress::new(0)).is_none());
    }
}
