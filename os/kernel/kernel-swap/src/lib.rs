//! # Paging File
//!
//! Page-sized slots on a [`BlockDevice`] region, for frames evicted from
//! physical memory.
//!
//! ```text
//!   start_sector
//!   │
//!   ▼
//!   ┌──── slot 0 ────┬──── slot 1 ────┬─ ─ ─
//!   │ 8 × 512 bytes  │ 8 × 512 bytes  │
//!   └────────────────┴────────────────┴─ ─ ─
//! ```
//!
//! Slot `i` starts at sector `start_sector + i * SECTORS_PER_PAGE`. A slot is
//! either free or holds exactly one evicted page; indices are reused only
//! after [`SwapManager::free_slot`].
//!
//! The slot bitmap and the device each sit behind their own [`SpinLock`].
//! Callers outside the fault handler mask interrupts around these calls.
//! Page I/O insists that the frame is pinned so that a second eviction
//! cannot race the transfer.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod device;
mod slots;

pub use device::{BlockDevice, DeviceError, MemoryBlockDevice, Sector};
use kernel_alloc::PinState;
use kernel_info::memory::{SECTOR_SIZE, SECTORS_PER_PAGE};
use kernel_memory_addresses::PhysicalPage;
use kernel_sync::SpinLock;
use kernel_vmem::PhysMapper;
use log::{debug, warn};
pub use slots::SlotBitmap;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SwapError {
    #[error("paging file is full")]
    PagingFileFull,
    #[error("slot {0} is outside the paging file")]
    SlotOutOfRange(u32),
    #[error("slot {0} is not allocated")]
    SlotNotAllocated(u32),
    #[error("frame {0} is not pinned")]
    FrameNotPinned(PhysicalPage),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("no paging file configured")]
    NotInitialized,
}

/// Slot bookkeeping without the device type, for owners of evicted pages
/// that only ever give slots back.
pub trait SlotRelease {
    /// Return `slot` to the free set.
    ///
    /// # Errors
    /// As for [`SwapManager::free_slot`].
    fn release_slot(&self, slot: u32) -> Result<(), SwapError>;
}

/// The paging file.
pub struct SwapManager<D> {
    slots: SpinLock<SlotBitmap>,
    device: SpinLock<D>,
    start_sector: u32,
}

impl<D: BlockDevice> SwapManager<D> {
    /// Use `sector_count` sectors of `device` from `start_sector` on as the
    /// paging file. A trailing partial page is ignored.
    ///
    /// # Errors
    /// [`DeviceError::OutOfRange`] if the region does not fit the device.
    pub fn new(device: D, start_sector: u32, sector_count: u32) -> Result<Self, SwapError> {
        let end = start_sector
            .checked_add(sector_count)
            .filter(|&end| end <= device.sector_count())
            .ok_or(DeviceError::OutOfRange(start_sector.saturating_add(sector_count)))?;
        let slots = sector_count / SECTORS_PER_PAGE;
        debug!("paging file: sectors {start_sector}..{end}, {slots} slots");
        Ok(Self {
            slots: SpinLock::new(SlotBitmap::new(slots)),
            device: SpinLock::new(device),
            start_sector,
        })
    }

    /// Total number of slots.
    pub fn slot_count(&self) -> u32 {
        self.slots.lock().len()
    }

    /// Number of free slots.
    pub fn free_slots(&self) -> u32 {
        let slots = self.slots.lock();
        slots.len() - slots.used()
    }

    /// Whether `slot` currently holds a page.
    pub fn is_allocated(&self, slot: u32) -> bool {
        self.slots.lock().is_set(slot)
    }

    /// Claim the lowest free slot.
    ///
    /// # Errors
    /// [`SwapError::PagingFileFull`] when every slot is in use.
    pub fn allocate_slot(&self) -> Result<u32, SwapError> {
        let Some(slot) = self.slots.lock().claim_lowest() else {
            warn!("paging file is full");
            return Err(SwapError::PagingFileFull);
        };
        debug!("allocated paging file slot {slot}");
        Ok(slot)
    }

    /// Return `slot` to the free set.
    ///
    /// # Errors
    /// [`SwapError::SlotOutOfRange`] or [`SwapError::SlotNotAllocated`].
    pub fn free_slot(&self, slot: u32) -> Result<(), SwapError> {
        let mut slots = self.slots.lock();
        if slot >= slots.len() {
            return Err(SwapError::SlotOutOfRange(slot));
        }
        if !slots.release(slot) {
            return Err(SwapError::SlotNotAllocated(slot));
        }
        debug!("freed paging file slot {slot}");
        Ok(())
    }

    /// Copy the whole of `frame` into `slot`.
    ///
    /// # Errors
    /// The slot must be allocated and `frame` pinned according to `pins`;
    /// device failures are passed through.
    pub fn write_page<P, M>(&self, pins: &P, mapper: &M, frame: PhysicalPage, slot: u32) -> Result<(), SwapError>
    where
        P: PinState + ?Sized,
        M: PhysMapper,
    {
        let first = self.check(pins, frame, slot)?;
        // SAFETY: the frame is pinned, so nothing evicts or reuses it meanwhile
        let bytes = unsafe { mapper.frame_bytes(frame) };
        let (sectors, _) = bytes.as_chunks::<{ SECTOR_SIZE as usize }>();
        let mut device = self.device.lock();
        for (lba, sector) in (first..).zip(sectors) {
            device.write_sector(lba, sector)?;
        }
        debug!("wrote frame {frame} to slot {slot}");
        Ok(())
    }

    /// Fill `frame` with the contents of `slot`.
    ///
    /// `frame` stays pinned until the caller unpins it after this returns.
    ///
    /// # Errors
    /// As for [`write_page`](Self::write_page).
    pub fn read_page<P, M>(&self, pins: &P, mapper: &M, frame: PhysicalPage, slot: u32) -> Result<(), SwapError>
    where
        P: PinState + ?Sized,
        M: PhysMapper,
    {
        let first = self.check(pins, frame, slot)?;
        // SAFETY: see `write_page`
        let bytes = unsafe { mapper.frame_bytes(frame) };
        let (sectors, _) = bytes.as_chunks_mut::<{ SECTOR_SIZE as usize }>();
        let mut device = self.device.lock();
        for (lba, sector) in (first..).zip(sectors) {
            device.read_sector(lba, sector)?;
        }
        debug!("read slot {slot} into frame {frame}");
        Ok(())
    }

    /// Validate a transfer and return the first sector of `slot`.
    fn check<P: PinState + ?Sized>(&self, pins: &P, frame: PhysicalPage, slot: u32) -> Result<u32, SwapError> {
        {
            let slots = self.slots.lock();
            if slot >= slots.len() {
                return Err(SwapError::SlotOutOfRange(slot));
            }
            if !slots.is_set(slot) {
                return Err(SwapError::SlotNotAllocated(slot));
            }
        }
        if !pins.is_pinned(frame) {
            return Err(SwapError::FrameNotPinned(frame));
        }
        Ok(self.start_sector + slot * SECTORS_PER_PAGE)
    }

    /// The underlying device.
    pub fn into_device(self) -> D {
        self.device.into_inner()
    }
}

impl<D: BlockDevice> SlotRelease for SwapManager<D> {
    fn release_slot(&self, slot: u32) -> Result<(), SwapError> {
        self.free_slot(slot)
    }
}
