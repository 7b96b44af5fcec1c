//! Moving user pages between frames and the paging file.
//!
//! An evicted page keeps its page table entry, rewritten to not-present with
//! the paging-file slot in the frame field. The frame is pinned for the
//! whole transfer. Both directions hold the address space's state lock, so
//! the space cannot be torn down underneath.

use crate::{VmContext, VmError};
use kernel_alloc::PageFlags;
use kernel_memory_addresses::{VirtualAddress, round_down_to_page};
use kernel_process::{AddressSpace, MemoryIsolation, PagedIsolation, ProcessError};
use kernel_swap::{BlockDevice, SwapError};
use kernel_vmem::{PageEntryBits, PhysMapper, PtEntry};
use log::{debug, warn};

/// Evict the page holding `user_addr` to a fresh paging-file slot and free
/// its frame. Returns the slot.
///
/// # Errors
/// - [`VmError::PagingFileFull`] if no slot is free; the page stays mapped.
/// - [`VmError::InvalidUserPointer`] if `user_addr` is outside the space,
///   not resident, or the space is not paged.
/// - [`VmError::KernelFault`] without a paging file, or if the frame is
///   not evictable.
pub fn page_out<M, D, I>(vm: &VmContext<'_, M, D>, space: &AddressSpace<I>, user_addr: u32) -> Result<u32, VmError>
where
    M: PhysMapper,
    D: BlockDevice,
    I: MemoryIsolation,
{
    let memory = vm.memory();
    let swap = vm.paging_file().ok_or(SwapError::NotInitialized)?;
    if !space.validate_range(memory, user_addr, 1) {
        return Err(VmError::InvalidUserPointer);
    }
    let va = PagedIsolation::linear_address(round_down_to_page(user_addr));

    space.with_memory(memory, |isolation| -> Result<u32, VmError> {
        let directory = isolation.page_directory().ok_or(VmError::InvalidUserPointer)?;
        let translation = kernel_vmem::AddressSpace::from_directory(memory.mapper, directory);
        let (frame, _) = translation
            .entry(va)
            .and_then(PtEntry::page_4k)
            .ok_or(ProcessError::PageNotResident(user_addr))?;

        let pinned = memory.with_frames(|pool| {
            pool.page(frame).is_some_and(|page| page.flags.pageable()) && pool.pin(frame)
        });
        if !pinned {
            warn!("frame {frame} at {va} is not evictable");
            return Err(VmError::KernelFault);
        }

        let written = swap.allocate_slot().and_then(|slot| {
            swap.write_page(memory, memory.mapper, frame, slot)
                .map(|()| slot)
                .inspect_err(|_| {
                    if let Err(e) = swap.free_slot(slot) {
                        warn!("slot {slot} of {va}: {e}");
                    }
                })
        });
        let slot = match written {
            Ok(slot) => slot,
            Err(e) => {
                memory.with_frames(|pool| pool.unpin(frame));
                return Err(e.into());
            }
        };

        translation.set_entry(va, PtEntry::on_disk(slot));
        vm.cpu().invalidate_page(va);
        memory.with_frames(|pool| pool.free_frame(frame));
        debug!("paged out {va} from frame {frame} to slot {slot}");
        Ok(slot)
    })?
}

/// Bring the evicted page at linear address `va` back into a fresh frame.
///
/// Returns `false` if `va` is not backed by a paging-file slot; nothing is
/// changed then.
///
/// # Errors
/// - [`VmError::OutOfMemory`] if no frame is free.
/// - [`VmError::KernelFault`] without a paging file or on device failure.
pub fn page_in<M, D, I>(vm: &VmContext<'_, M, D>, space: &AddressSpace<I>, va: VirtualAddress) -> Result<bool, VmError>
where
    M: PhysMapper,
    D: BlockDevice,
    I: MemoryIsolation,
{
    let memory = vm.memory();
    let va = va.page_base();

    space.with_memory(memory, |isolation| -> Result<bool, VmError> {
        let Some(directory) = isolation.page_directory() else {
            return Ok(false);
        };
        let translation = kernel_vmem::AddressSpace::from_directory(memory.mapper, directory);
        let Some(slot) = translation.entry(va).and_then(PtEntry::disk_slot) else {
            return Ok(false);
        };
        let swap = vm.paging_file().ok_or(SwapError::NotInitialized)?;

        let frame = memory
            .with_frames(|pool| {
                let frame = pool.alloc_frame_with(PageFlags::user_pageable())?;
                pool.pin(frame);
                Some(frame)
            })
            .ok_or(VmError::OutOfMemory)?;

        if let Err(e) = swap.read_page(memory, memory.mapper, frame, slot) {
            memory.with_frames(|pool| pool.free_frame(frame));
            return Err(e.into());
        }
        if let Err(e) = swap.free_slot(slot) {
            warn!("slot {slot} of {va}: {e}");
        }

        memory.with_frames(|pool| {
            let entry = PtEntry::make_4k(frame, PageEntryBits::user_rw());
            if let Some(location) = translation.set_entry(va, entry) {
                pool.record_mapping(frame, va, location);
            }
            pool.unpin(frame);
        });
        vm.cpu().invalidate_page(va);
        debug!("paged in {va} from slot {slot} to frame {frame}");
        Ok(true)
    })?
}
