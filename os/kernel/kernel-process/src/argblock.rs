//! # Argument block
//!
//! The startup arguments a process finds at its initial stack pointer:
//!
//! ```text
//! B + 0   argc
//! B + 4   argv = B + 8
//! B + 8   argv[0] .. argv[argc - 1], 0      (argc + 1 little-endian u32)
//!         "arg0\0" "arg1\0" ...
//! ```
//!
//! `B` is the block's address in the process. The command line is split on
//! spaces and tabs; empty words are dropped.

use alloc::vec::Vec;

/// Words of `command`, in order.
pub fn words(command: &str) -> impl Iterator<Item = &str> {
    command.split([' ', '\t']).filter(|w| !w.is_empty())
}

/// Argument count and encoded size of the block for `command`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BlockSize {
    pub argc: u32,
    pub bytes: u32,
}

/// Measure the block for `command`: `8 + 4 * (argc + 1) + Σ(len + 1)`.
///
/// `None` if the block would not fit a 32-bit address space.
#[must_use]
pub fn measure(command: &str) -> Option<BlockSize> {
    let (argc, strings) = words(command).try_fold((0u32, 0u32), |(n, bytes), w| {
        let len = u32::try_from(w.len()).ok()?;
        Some((n.checked_add(1)?, bytes.checked_add(len)?.checked_add(1)?))
    })?;
    let bytes = argc
        .checked_add(1)?
        .checked_mul(4)?
        .checked_add(8)?
        .checked_add(strings)?;
    Some(BlockSize { argc, bytes })
}

/// Encode the block for `command` as it must appear at process address
/// `base`.
///
/// Returns `None` under the same conditions as [`measure`].
#[must_use]
pub fn format(command: &str, base: u32) -> Option<Vec<u8>> {
    let size = measure(command)?;
    let mut block = Vec::with_capacity(size.bytes as usize);
    let argv = base.checked_add(8)?;
    block.extend_from_slice(&size.argc.to_le_bytes());
    block.extend_from_slice(&argv.to_le_bytes());

    let mut string_at = argv.checked_add((size.argc + 1) * 4)?;
    for w in words(command) {
        block.extend_from_slice(&string_at.to_le_bytes());
        #[allow(clippy::cast_possible_truncation)]
        let len = w.len() as u32;
        string_at = string_at.checked_add(len + 1)?;
    }
    block.extend_from_slice(&0u32.to_le_bytes());

    for w in words(command) {
        block.extend_from_slice(w.as_bytes());
        block.push(0);
    }
    debug_assert_eq!(block.len(), size.bytes as usize);
    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(b: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(b[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn splits_on_spaces_and_tabs() {
        let w: Vec<_> = words("  /c/shell.exe\t-v  x ").collect();
        assert_eq!(w, ["/c/shell.exe", "-v", "x"]);
    }

    #[test]
    fn size_formula() {
        // 8 + 4 * 3 + ("a.exe\0" + "xy\0")
        assert_eq!(measure("a.exe xy"), Some(BlockSize { argc: 2, bytes: 8 + 12 + 6 + 3 }));
        assert_eq!(measure(""), Some(BlockSize { argc: 0, bytes: 12 }));
    }

    #[test]
    fn layout_relative_to_base() {
        let base = 0x3000;
        let b = format("a.exe xy", base).unwrap();
        assert_eq!(b.len(), 29);
        assert_eq!(u32_at(&b, 0), 2);
        assert_eq!(u32_at(&b, 4), base + 8);
        assert_eq!(u32_at(&b, 8), base + 20);
        assert_eq!(u32_at(&b, 12), base + 26);
        assert_eq!(u32_at(&b, 16), 0);
        assert_eq!(&b[20..26], b"a.exe\0");
        assert_eq!(&b[26..29], b"xy\0");
    }

    #[test]
    fn empty_command_has_only_terminator() {
        let b = format("   ", 0x100).unwrap();
        assert_eq!(b, [0, 0, 0, 0, 0x08, 0x01, 0, 0, 0, 0, 0, 0]);
    }
}
