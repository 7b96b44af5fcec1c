use kernel_alloc::{EmulatedRam, FramePool, PageFlags};
use kernel_memory_addresses::PhysicalPage;
use kernel_swap::{BlockDevice, DeviceError, MemoryBlockDevice, SwapError, SwapManager};

fn setup(slots: u32) -> (SwapManager<MemoryBlockDevice>, EmulatedRam, FramePool) {
    // two spare sectors in front of the paging file, three after
    let disk = MemoryBlockDevice::new(2 + slots * 8 + 3);
    let swap = SwapManager::new(disk, 2, slots * 8 + 3).unwrap();
    (swap, EmulatedRam::new(8), FramePool::new(8))
}

fn pinned_frame(pool: &mut FramePool) -> PhysicalPage {
    let frame = pool.alloc_frame_with(PageFlags::user_pageable()).unwrap();
    pool.pin(frame);
    frame
}

#[test]
fn write_then_read_is_identical() {
    let (swap, ram, mut pool) = setup(4);
    let src = pinned_frame(&mut pool);
    let dst = pinned_frame(&mut pool);

    let mut content = [0u8; 4096];
    for (i, b) in content.iter_mut().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        {
            *b = (i * 7 + 3) as u8;
        }
    }
    ram.write_frame(src, &content);

    let slot = swap.allocate_slot().unwrap();
    swap.write_page(&pool, &ram, src, slot).unwrap();
    swap.read_page(&pool, &ram, dst, slot).unwrap();
    assert_eq!(ram.read_frame(dst), content);

    let disk = swap.into_device();
    assert_eq!(disk.sector(2).unwrap()[..], content[..512]);
    assert_eq!(disk.sector(9).unwrap()[..], content[3584..]);
    assert_eq!(disk.sector(1), Some(&[0u8; 512]));
}

#[test]
fn slots_are_placed_by_index() {
    let (swap, ram, mut pool) = setup(3);
    let frame = pinned_frame(&mut pool);
    ram.write_frame(frame, &[0x5A; 4096]);
    for _ in 0..3 {
        swap.allocate_slot().unwrap();
    }
    swap.write_page(&pool, &ram, frame, 2).unwrap();
    let disk = swap.into_device();
    assert_eq!(disk.sector(2 + 16), Some(&[0x5A; 512]));
    assert_eq!(disk.sector(2 + 15), Some(&[0; 512]));
}

#[test]
fn exhaustion_and_reuse() {
    let (swap, _, _) = setup(3);
    assert_eq!(swap.slot_count(), 3);
    assert_eq!(swap.allocate_slot(), Ok(0));
    assert_eq!(swap.allocate_slot(), Ok(1));
    assert_eq!(swap.allocate_slot(), Ok(2));
    assert_eq!(swap.allocate_slot(), Err(SwapError::PagingFileFull));
    assert_eq!(swap.free_slots(), 0);

    swap.free_slot(1).unwrap();
    assert_eq!(swap.allocate_slot(), Ok(1));
    assert_eq!(swap.allocate_slot(), Err(SwapError::PagingFileFull));
}

#[test]
fn freeing_is_checked() {
    let (swap, _, _) = setup(2);
    assert_eq!(swap.free_slot(0), Err(SwapError::SlotNotAllocated(0)));
    assert_eq!(swap.free_slot(2), Err(SwapError::SlotOutOfRange(2)));
    let slot = swap.allocate_slot().unwrap();
    swap.free_slot(slot).unwrap();
    assert_eq!(swap.free_slot(slot), Err(SwapError::SlotNotAllocated(slot)));
    assert!(!swap.is_allocated(slot));
}

#[test]
fn io_requires_a_pinned_frame_and_a_live_slot() {
    let (swap, ram, mut pool) = setup(2);
    let frame = pool.alloc_frame_with(PageFlags::user_pageable()).unwrap();
    let slot = swap.allocate_slot().unwrap();
    assert_eq!(
        swap.write_page(&pool, &ram, frame, slot),
        Err(SwapError::FrameNotPinned(frame))
    );
    pool.pin(frame);
    assert_eq!(
        swap.read_page(&pool, &ram, frame, 1),
        Err(SwapError::SlotNotAllocated(1))
    );
    assert_eq!(
        swap.read_page(&pool, &ram, frame, 7),
        Err(SwapError::SlotOutOfRange(7))
    );
    assert_eq!(swap.write_page(&pool, &ram, frame, slot), Ok(()));
}

#[test]
fn region_must_fit_the_device() {
    let disk = MemoryBlockDevice::new(16);
    assert_eq!(disk.sector_count(), 16);
    assert!(matches!(
        SwapManager::new(disk, 4, 16),
        Err(SwapError::Device(DeviceError::OutOfRange(20)))
    ));
}
