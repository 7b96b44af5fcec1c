use kernel_elf::{ElfError, Malformation, PFlags, Unsupported, parse};

/// One program header as (offset, vaddr, filesz, memsz, flags).
type Ph = (u32, u32, u32, u32, u32);

fn image(entry: u32, phs: &[Ph], payload: &[u8]) -> Vec<u8> {
    let phoff = 52u32;
    let mut b = Vec::new();
    b.extend_from_slice(b"\x7FELF");
    b.extend_from_slice(&[1, 1, 1]);
    b.resize(16, 0);
    b.extend_from_slice(&2u16.to_le_bytes()); // e_type
    b.extend_from_slice(&3u16.to_le_bytes()); // e_machine
    b.extend_from_slice(&1u32.to_le_bytes()); // e_version
    b.extend_from_slice(&entry.to_le_bytes());
    b.extend_from_slice(&phoff.to_le_bytes());
    b.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
    b.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    b.extend_from_slice(&52u16.to_le_bytes());
    b.extend_from_slice(&32u16.to_le_bytes());
    #[allow(clippy::cast_possible_truncation)]
    b.extend_from_slice(&(phs.len() as u16).to_le_bytes());
    b.extend_from_slice(&[0; 6]);
    assert_eq!(b.len(), 52);
    for &(offset, vaddr, filesz, memsz, flags) in phs {
        for word in [1, offset, vaddr, vaddr, filesz, memsz, flags, 0x1000] {
            b.extend_from_slice(&word.to_le_bytes());
        }
    }
    b.extend_from_slice(payload);
    b
}

fn one_segment() -> Vec<u8> {
    image(0x1010, &[(84, 0x1000, 16, 0x2000, 0b101)], &[0xCC; 16])
}

#[test]
fn single_segment_round_trips_fields() {
    let exe = parse(&one_segment()).unwrap();
    assert_eq!(exe.entry, 0x1010);
    assert_eq!(exe.segments().len(), 1);
    let s = exe.segments()[0];
    assert_eq!(s.offset_in_file, 84);
    assert_eq!(s.length_in_file, 16);
    assert_eq!(s.start_address, 0x1000);
    assert_eq!(s.size_in_memory, 0x2000);
    assert_eq!(s.prot, PFlags::new().with_read(true).with_execute(true));
    assert_eq!(exe.max_segment_end(), Some(0x3000));
}

#[test]
fn three_segments_are_accepted() {
    let phs = [(148, 0, 4, 4, 5), (152, 0x1000, 4, 8, 6), (0, 0x3000, 0, 0x100, 6)];
    let exe = parse(&image(0, &phs, &[1, 2, 3, 4, 5, 6, 7, 8])).unwrap();
    assert_eq!(exe.segments().len(), 3);
    assert_eq!(exe.segments()[2].size_in_memory, 0x100);
    assert_eq!(exe.max_segment_end(), Some(0x3100));
}

#[test]
fn each_rejection_has_its_own_kind() {
    let base = one_segment();

    let mut b = base.clone();
    b[1] = b'X';
    assert_eq!(parse(&b), Err(ElfError::Malformed(Malformation::BadMagic)));

    let mut b = base.clone();
    b[4] = 2;
    assert_eq!(parse(&b), Err(ElfError::Unsupported(Unsupported::Class(2))));

    let mut b = base.clone();
    b[5] = 2;
    assert_eq!(parse(&b), Err(ElfError::Unsupported(Unsupported::ByteOrder(2))));

    let mut b = base.clone();
    b[6] = 0;
    assert_eq!(parse(&b), Err(ElfError::Malformed(Malformation::BadVersion)));

    let mut b = base.clone();
    b[0x10] = 1;
    assert_eq!(parse(&b), Err(ElfError::Unsupported(Unsupported::FileType(1))));

    let mut b = base.clone();
    b[0x12] = 62;
    assert_eq!(parse(&b), Err(ElfError::Unsupported(Unsupported::Machine(62))));

    let mut b = base.clone();
    b[0x1C..0x20].fill(0);
    assert_eq!(parse(&b), Err(ElfError::Malformed(Malformation::NoProgramHeaders)));

    let mut b = base.clone();
    b[0x2C..0x2E].fill(0);
    assert_eq!(parse(&b), Err(ElfError::Malformed(Malformation::NoSegments)));

    let mut b = base;
    b[0x2C] = 4;
    assert_eq!(parse(&b), Err(ElfError::TooManySegments(4)));
}

#[test]
fn out_of_bounds_ranges() {
    let mut b = one_segment();
    b[0x2A] = 16;
    assert_eq!(parse(&b), Err(ElfError::Malformed(Malformation::BadProgramHeaderSize)));

    let mut b = one_segment();
    b[0x1C..0x20].copy_from_slice(&90u32.to_le_bytes());
    assert_eq!(
        parse(&b),
        Err(ElfError::Malformed(Malformation::ProgramHeadersOutOfBounds))
    );

    let b = image(0, &[(84, 0, 17, 17, 4)], &[0; 16]);
    assert_eq!(parse(&b), Err(ElfError::Malformed(Malformation::SegmentOutOfBounds)));

    let b = image(0, &[(84, 0, 16, 8, 4)], &[0; 16]);
    assert_eq!(
        parse(&b),
        Err(ElfError::Malformed(Malformation::FileSizeExceedsMemorySize))
    );
}

#[test]
fn segment_bytes_come_from_the_file() {
    let file = one_segment();
    let exe = parse(&file).unwrap();
    assert_eq!(exe.segments()[0].file_bytes(&file), Some(&[0xCC; 16][..]));
}
