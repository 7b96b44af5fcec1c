use alloc::vec::Vec;

/// One bit per paging-file slot; set means in use.
#[derive(Debug, Clone)]
pub struct SlotBitmap {
    words: Vec<u64>,
    len: u32,
    used: u32,
}

impl SlotBitmap {
    /// `len` free slots.
    #[must_use]
    pub fn new(len: u32) -> Self {
        Self {
            words: alloc::vec![0; len.div_ceil(64) as usize],
            len,
            used: 0,
        }
    }

    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn used(&self) -> u32 {
        self.used
    }

    /// Whether `slot` is in use. Slots past the end are never in use.
    #[must_use]
    pub fn is_set(&self, slot: u32) -> bool {
        slot < self.len && self.words[(slot / 64) as usize] & (1 << (slot % 64)) != 0
    }

    /// Claim the lowest free slot.
    pub fn claim_lowest(&mut self) -> Option<u32> {
        let (w, word) = self
            .words
            .iter_mut()
            .enumerate()
            .find(|(_, word)| **word != u64::MAX)?;
        let bit = word.trailing_ones();
        #[allow(clippy::cast_possible_truncation)]
        let slot = w as u32 * 64 + bit;
        if slot >= self.len {
            return None;
        }
        *word |= 1 << bit;
        self.used += 1;
        Some(slot)
    }

    /// Release `slot`. Returns `false` if it was not in use.
    pub fn release(&mut self, slot: u32) -> bool {
        if !self.is_set(slot) {
            return false;
        }
        self.words[(slot / 64) as usize] &= !(1 << (slot % 64));
        self.used -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_first_and_reuse() {
        let mut bits = SlotBitmap::new(70);
        for expected in 0..70 {
            assert_eq!(bits.claim_lowest(), Some(expected));
        }
        assert_eq!(bits.claim_lowest(), None);
        assert!(bits.release(65));
        assert!(bits.release(3));
        assert_eq!(bits.claim_lowest(), Some(3));
        assert_eq!(bits.claim_lowest(), Some(65));
        assert_eq!(bits.used(), 70);
    }

    #[test]
    fn release_of_free_slot() {
        let mut bits = SlotBitmap::new(8);
        assert!(!bits.release(2));
        assert!(!bits.release(100));
        assert!(!bits.is_set(100));
    }

    #[test]
    fn empty_bitmap() {
        let mut bits = SlotBitmap::new(0);
        assert!(bits.is_empty());
        assert_eq!(bits.claim_lowest(), None);
    }
}
