//! # Bit-addressable State Store
//!
//! A [`Bitmap`] views caller-provided `u64` words as a flat sequence of
//! `capacity` bits. Bit `i` lives in word `i / 64` at bit position `i % 64`.
//! Bits in the last word beyond `capacity` are never read or written.
//!
//! Every operation is bounds-checked and reports violations as
//! [`BitmapError::OutOfBounds`]. Searches skip whole words that cannot contain
//! the searched value.

/// Bits per storage word.
const WORD_BITS: usize = u64::BITS as usize;

/// Bounds and sizing failures of [`Bitmap`] operations.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BitmapError {
    #[error("bits {index}..{index}+{size} exceed the capacity of {capacity} bits")]
    OutOfBounds { index: usize, size: usize, capacity: usize },
    #[error("{words} words of storage cannot hold {capacity} bits")]
    StorageTooSmall { words: usize, capacity: usize },
}

/// A fixed-capacity bit sequence over borrowed words.
pub struct Bitmap<'a> {
    words: &'a mut [u64],
    capacity: usize,
}

impl<'a> Bitmap<'a> {
    /// Number of `u64` words needed to hold `bits` bits.
    #[must_use]
    pub const fn words_for(bits: usize) -> usize {
        bits.div_ceil(WORD_BITS)
    }

    /// View `words` as a bitmap of `capacity` bits. The contents are kept.
    ///
    /// # Errors
    /// [`BitmapError::StorageTooSmall`] if `words` holds fewer than `capacity` bits.
    pub fn new(words: &'a mut [u64], capacity: usize) -> Result<Self, BitmapError> {
        if words.len() < Self::words_for(capacity) {
            return Err(BitmapError::StorageTooSmall {
                words: words.len(),
                capacity,
            });
        }
        Ok(Self { words, capacity })
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// `true` if bit `index` equals `value`.
    ///
    /// # Errors
    /// [`BitmapError::OutOfBounds`] if `index >= capacity`.
    pub fn test(&self, index: usize, value: bool) -> Result<bool, BitmapError> {
        self.check(index, 1)?;
        Ok(self.bit(index) == value)
    }

    /// `true` if all `size` bits from `index` equal `value`; vacuously `true` for `size == 0`.
    ///
    /// # Errors
    /// [`BitmapError::OutOfBounds`] unless `index + size <= capacity`.
    pub fn test_range(&self, index: usize, size: usize, value: bool) -> Result<bool, BitmapError> {
        let end = self.check(index, size)?;
        Ok(self.scan(index, end, !value).is_none())
    }

    /// # Errors
    /// [`BitmapError::OutOfBounds`] if `index >= capacity`.
    pub fn set(&mut self, index: usize, value: bool) -> Result<(), BitmapError> {
        self.check(index, 1)?;
        let mask = 1u64 << (index % WORD_BITS);
        let word = &mut self.words[index / WORD_BITS];
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
        Ok(())
    }

    /// Overwrite `size` bits from `index` with `value`.
    ///
    /// # Errors
    /// [`BitmapError::OutOfBounds`] unless `index + size <= capacity`; nothing
    /// is written then.
    pub fn set_range(&mut self, index: usize, size: usize, value: bool) -> Result<(), BitmapError> {
        let end = self.check(index, size)?;
        let mut i = index;
        while i < end {
            let shift = i % WORD_BITS;
            let n = (WORD_BITS - shift).min(end - i);
            let mask = if n == WORD_BITS {
                u64::MAX
            } else {
                ((1u64 << n) - 1) << shift
            };
            let word = &mut self.words[i / WORD_BITS];
            if value {
                *word |= mask;
            } else {
                *word &= !mask;
            }
            i += n;
        }
        Ok(())
    }

    /// Overwrite every bit with `value`.
    pub fn fill(&mut self, value: bool) {
        let full = self.capacity / WORD_BITS;
        let tail = self.capacity % WORD_BITS;
        self.words[..full].fill(if value { u64::MAX } else { 0 });
        if tail != 0 {
            let mask = (1u64 << tail) - 1;
            let word = &mut self.words[full];
            if value {
                *word |= mask;
            } else {
                *word &= !mask;
            }
        }
    }

    /// The smallest position `>= index` whose bit equals `value`.
    ///
    /// `index == capacity` is an empty search and yields `None`.
    ///
    /// # Errors
    /// [`BitmapError::OutOfBounds`] if `index > capacity`.
    pub fn find_first(&self, index: usize, value: bool) -> Result<Option<usize>, BitmapError> {
        self.check(index, 0)?;
        Ok(self.scan(index, self.capacity, value))
    }

    /// The smallest position `p >= index` such that the `size` bits from `p`
    /// all equal `value`.
    ///
    /// # Errors
    /// [`BitmapError::OutOfBounds`] if `index > capacity`.
    pub fn find_first_range(&self, index: usize, size: usize, value: bool) -> Result<Option<usize>, BitmapError> {
        self.check(index, 0)?;
        if size == 0 {
            return Ok(Some(index));
        }

        let mut from = index;
        while let Some(start) = self.scan(from, self.capacity, value) {
            let Some(end) = start.checked_add(size).filter(|&e| e <= self.capacity) else {
                return Ok(None);
            };
            match self.scan(start, end, !value) {
                None => return Ok(Some(start)),
                // No run starting at or before the mismatch can succeed.
                Some(mismatch) => from = mismatch + 1,
            }
        }
        Ok(None)
    }

    /// Number of bits equal to `value`.
    #[must_use]
    pub fn count(&self, value: bool) -> usize {
        let full = self.capacity / WORD_BITS;
        let tail = self.capacity % WORD_BITS;
        let mut ones: usize = self.words[..full].iter().map(|w| w.count_ones() as usize).sum();
        if tail != 0 {
            ones += (self.words[full] & ((1u64 << tail) - 1)).count_ones() as usize;
        }
        if value { ones } else { self.capacity - ones }
    }

    #[inline]
    fn bit(&self, index: usize) -> bool {
        (self.words[index / WORD_BITS] >> (index % WORD_BITS)) & 1 == 1
    }

    /// Validate `[index, index + size)` and return its end.
    fn check(&self, index: usize, size: usize) -> Result<usize, BitmapError> {
        index
            .checked_add(size)
            .filter(|&end| end <= self.capacity)
            .ok_or(BitmapError::OutOfBounds {
                index,
                size,
                capacity: self.capacity,
            })
    }

    /// First position in `[from, end)` whose bit equals `value`.
    fn scan(&self, from: usize, end: usize, value: bool) -> Option<usize> {
        if from >= end {
            return None;
        }
        // After the xor, bits equal to `value` read as 1.
        let flip = if value { 0 } else { u64::MAX };
        let mut wi = from / WORD_BITS;
        let mut word = (self.words[wi] ^ flip) & (u64::MAX << (from % WORD_BITS));
        loop {
            if word != 0 {
                let pos = wi * WORD_BITS + word.trailing_zeros() as usize;
                return (pos < end).then_some(pos);
            }
            wi += 1;
            if wi * WORD_BITS >= end {
                return None;
            }
            word = self.words[wi] ^ flip;
        }
    }
}
