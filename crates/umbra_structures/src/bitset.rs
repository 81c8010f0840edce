//! BitSet - Word-packed occupancy bits
//!
//! Used as the occupancy map behind [`SlotPool`](crate::SlotPool) and as the
//! tile grid of the shadow atlas. Searches skip whole words at a time, so a
//! first-fit scan over 65k slots touches about a thousand words.

use alloc::vec;
use alloc::vec::Vec;

/// Fixed-size bitset
pub struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    /// Bits per word
    const BITS_PER_WORD: usize = 64;

    /// Create a new bitset with `len` cleared bits
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(Self::BITS_PER_WORD)],
            len,
        }
    }

    #[inline]
    fn locate(index: usize) -> (usize, u64) {
        (index / Self::BITS_PER_WORD, 1u64 << (index % Self::BITS_PER_WORD))
    }

    /// Set a bit
    #[inline]
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.len);
        let (word, mask) = Self::locate(index);
        self.words[word] |= mask;
    }

    /// Clear a bit
    #[inline]
    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < self.len);
        let (word, mask) = Self::locate(index);
        self.words[word] &= !mask;
    }

    /// Get a bit
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len);
        let (word, mask) = Self::locate(index);
        self.words[word] & mask != 0
    }

    /// Set `count` bits starting at `start`
    pub fn set_range(&mut self, start: usize, count: usize) {
        for index in start..start + count {
            self.set(index);
        }
    }

    /// Clear `count` bits starting at `start`
    pub fn clear_range(&mut self, start: usize, count: usize) {
        for index in start..start + count {
            self.clear(index);
        }
    }

    /// Check that `count` bits starting at `start` are all clear
    pub fn is_range_clear(&self, start: usize, count: usize) -> bool {
        match start.checked_add(count) {
            Some(end) if end <= self.len => (start..end).all(|index| !self.get(index)),
            _ => false,
        }
    }

    /// Check that `count` bits starting at `start` are all set
    pub fn is_range_set(&self, start: usize, count: usize) -> bool {
        match start.checked_add(count) {
            Some(end) if end <= self.len => (start..end).all(|index| self.get(index)),
            _ => false,
        }
    }

    /// Lowest clear bit, if any
    pub fn first_clear(&self) -> Option<usize> {
        self.next_clear(0)
    }

    /// Lowest clear bit at or after `from`
    pub fn next_clear(&self, from: usize) -> Option<usize> {
        if from >= self.len {
            return None;
        }
        let mut word_idx = from / Self::BITS_PER_WORD;
        // Treat bits below `from` in the first word as occupied
        let mut word = self.words[word_idx] | ((1u64 << (from % Self::BITS_PER_WORD)) - 1);
        loop {
            if word != u64::MAX {
                let index = word_idx * Self::BITS_PER_WORD + (!word).trailing_zeros() as usize;
                return (index < self.len).then_some(index);
            }
            word_idx += 1;
            if word_idx >= self.words.len() {
                return None;
            }
            word = self.words[word_idx];
        }
    }

    /// Lowest set bit at or after `from`
    pub fn next_set(&self, from: usize) -> Option<usize> {
        if from >= self.len {
            return None;
        }
        let mut word_idx = from / Self::BITS_PER_WORD;
        let mut word = self.words[word_idx] & !((1u64 << (from % Self::BITS_PER_WORD)) - 1);
        loop {
            if word != 0 {
                let index = word_idx * Self::BITS_PER_WORD + word.trailing_zeros() as usize;
                return (index < self.len).then_some(index);
            }
            word_idx += 1;
            if word_idx >= self.words.len() {
                return None;
            }
            word = self.words[word_idx];
        }
    }

    /// Lowest `start` such that `[start, start + count)` is entirely clear
    pub fn first_clear_run(&self, count: usize) -> Option<usize> {
        if count == 0 || count > self.len {
            return None;
        }
        let mut start = self.first_clear()?;
        loop {
            if start + count > self.len {
                return None;
            }
            match self.next_set(start) {
                // The run is interrupted, restart after the blocker
                Some(blocker) if blocker < start + count => {
                    start = self.next_clear(blocker + 1)?;
                }
                _ => return Some(start),
            }
        }
    }

    /// Highest set bit at or below `from`
    pub fn prev_set(&self, from: usize) -> Option<usize> {
        let from = from.min(self.len.checked_sub(1)?);
        let mut word_idx = from / Self::BITS_PER_WORD;
        let shift = from % Self::BITS_PER_WORD;
        let keep = if shift == Self::BITS_PER_WORD - 1 { u64::MAX } else { (1u64 << (shift + 1)) - 1 };
        let mut word = self.words[word_idx] & keep;
        loop {
            if word != 0 {
                let bit = Self::BITS_PER_WORD - 1 - word.leading_zeros() as usize;
                return Some(word_idx * Self::BITS_PER_WORD + bit);
            }
            if word_idx == 0 {
                return None;
            }
            word_idx -= 1;
            word = self.words[word_idx];
        }
    }

    /// Clear all bits
    pub fn clear_all(&mut self) {
        self.words.fill(0);
    }

    /// Count set bits
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Get the number of bits
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty (no capacity)
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over set bit indices
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        let mut cursor = 0;
        core::iter::from_fn(move || {
            let index = self.next_set(cursor)?;
            cursor = index + 1;
            Some(index)
        })
    }
}

impl Clone for BitSet {
    fn clone(&self) -> Self {
        Self {
            words: self.words.clone(),
            len: self.len,
        }
    }
}

impl core::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "BitSet(len={}, ones={})", self.len, self.count_ones())
    }
}
