mod common;

use common::{Machine, executable, u32_at};
use kernel_process::{AddressSpace, MemoryIsolation, PagedIsolation, ProcessError, SegmentedIsolation, build};

const CODE: [u8; 0x20] = [0x90; 0x20];

fn sample() -> Vec<u8> {
    executable(0x10, &[(0, &CODE[..], 0x20), (0x1000, &b"data"[..], 0x1800)])
}

fn build_sample<I: MemoryIsolation>(m: &Machine, command: &str) -> Result<AddressSpace<I>, ProcessError> {
    let file = sample();
    let image = kernel_elf::parse(&file).unwrap();
    build::<I, _>(&m.services(), &file, &image, command)
}

fn lays_out_the_image<I: MemoryIsolation>() {
    let m = Machine::new(64);
    let services = m.services();
    let space = build_sample::<I>(&m, "prog.exe a b").unwrap();

    // segments end at 0x2800 → 0x3000, plus 0x2000 of stack
    assert_eq!(space.stack_pointer(), 0x5000);
    assert_eq!(space.arg_block(), 0x5000);
    // argument block of 37 bytes rounds to one page
    assert_eq!(space.size(), 0x6000);
    assert_eq!(space.entry(), 0x10);
    assert_eq!(space.ref_count(&services), 0);

    let mut code = [0u8; 0x20];
    space.copy_in(&services, &mut code, 0).unwrap();
    assert_eq!(code, CODE);

    let mut data = [0xFFu8; 0x10];
    space.copy_in(&services, &mut data, 0x1000).unwrap();
    assert_eq!(&data[..4], b"data");
    assert_eq!(&data[4..], &[0; 12]);

    let mut bss = vec![0xFFu8; 0x7FC];
    space.copy_in(&services, &mut bss, 0x1004).unwrap();
    assert!(bss.iter().all(|&b| b == 0));

    let mut block = [0u8; 37];
    space.copy_in(&services, &mut block, 0x5000).unwrap();
    assert_eq!(u32_at(&block, 0), 3);
    assert_eq!(u32_at(&block, 4), 0x5008);
    assert_eq!(u32_at(&block, 8), 0x5018);
    assert_eq!(u32_at(&block, 20), 0);
    assert_eq!(&block[24..], b"prog.exe\0a\0b\0");
}

fn discard_returns_every_frame<I: MemoryIsolation>() {
    let m = Machine::new(64);
    let before = m.free_frames();
    let space = build_sample::<I>(&m, "prog.exe").unwrap();
    assert!(m.free_frames() < before);
    space.discard(&m.services());
    assert_eq!(m.free_frames(), before);
}

fn out_of_memory_leaks_nothing<I: MemoryIsolation>() {
    // 6 pages of image, but only 5 free frames
    let m = Machine::new(8);
    let before = m.free_frames();
    assert!(matches!(build_sample::<I>(&m, "prog.exe"), Err(ProcessError::OutOfMemory)));
    assert_eq!(m.free_frames(), before);
}

#[test]
fn paged_lays_out_the_image() {
    lays_out_the_image::<PagedIsolation>();
}

#[test]
fn segmented_lays_out_the_image() {
    lays_out_the_image::<SegmentedIsolation>();
}

#[test]
fn paged_discard_returns_every_frame() {
    discard_returns_every_frame::<PagedIsolation>();
}

#[test]
fn segmented_discard_returns_every_frame() {
    discard_returns_every_frame::<SegmentedIsolation>();
}

#[test]
fn paged_out_of_memory_leaks_nothing() {
    out_of_memory_leaks_nothing::<PagedIsolation>();
}

#[test]
fn segmented_out_of_memory_leaks_nothing() {
    out_of_memory_leaks_nothing::<SegmentedIsolation>();
}

#[test]
fn segment_outside_the_file_is_rejected() {
    let m = Machine::new(64);
    let file = sample();
    let image = kernel_elf::parse(&file).unwrap();
    let before = m.free_frames();
    let truncated = &file[..file.len() - 2];
    let result = build::<PagedIsolation, _>(&m.services(), truncated, &image, "prog.exe");
    assert!(matches!(result, Err(ProcessError::MalformedExecutable)));
    assert_eq!(m.free_frames(), before);
}
