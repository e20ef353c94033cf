use arrow::array::BooleanBufferBuilder;

/// A growable validity bitmap backed by arrow's [`BooleanBufferBuilder`].
///
/// Bits are packed LSB-first, the layout arrow uses for null buffers. The number of set bits is
/// tracked as bits are appended so all-null / all-present checks are O(1).
#[derive(Debug)]
pub struct BitVec {
    bits: BooleanBufferBuilder,
    ones: usize,
}

impl BitVec {
    pub fn new() -> Self {
        Self::with_capacity_bits(0)
    }

    pub fn with_capacity_bits(bits: usize) -> Self {
        Self {
            bits: BooleanBufferBuilder::new(bits),
            ones: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn count_ones(&self) -> usize {
        self.ones
    }

    pub fn push(&mut self, value: bool) {
        self.bits.append(value);
        self.ones += usize::from(value);
    }

    /// Returns the bit at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<bool> {
        (index < self.bits.len()).then(|| self.bits.get_bit(index))
    }

    /// Copies the bits of `[start, end)` into a new vector.
    pub fn slice(&self, start: usize, end: usize) -> BitVec {
        let end = end.min(self.len());
        let start = start.min(end);
        let mut bits = BooleanBufferBuilder::new(end - start);
        bits.append_packed_range(start..end, self.bits.as_slice());
        let ones = count_set_bits(bits.as_slice());
        BitVec { bits, ones }
    }

    /// Serializes the bits as little-endian bytes (`len.div_ceil(8)` bytes).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits.as_slice()[..self.len().div_ceil(8)].to_vec()
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len()).map(move |i| self.bits.get_bit(i))
    }
}

// Bits past `len` in the last byte are always zero.
fn count_set_bits(bytes: &[u8]) -> usize {
    bytes.iter().map(|b| b.count_ones() as usize).sum()
}

impl Default for BitVec {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for BitVec {
    fn clone(&self) -> Self {
        self.slice(0, self.len())
    }
}

impl PartialEq for BitVec {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BitVec {}

impl FromIterator<bool> for BitVec {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut out = BitVec::with_capacity_bits(iter.size_hint().0);
        for bit in iter {
            out.push(bit);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_get_and_counts() {
        let bits: BitVec = (0..130).map(|i| i % 3 != 0).collect();
        assert_eq!(bits.len(), 130);
        assert_eq!(bits.count_ones(), 130 - 44);
        assert_eq!(bits.get(0), Some(false));
        assert_eq!(bits.get(64), Some(true));
        assert_eq!(bits.get(129), Some(false));
        assert_eq!(bits.get(130), None);
    }

    #[test]
    fn test_slice_crosses_word_boundary() {
        let bits: BitVec = (0..200).map(|i| i % 2 == 0).collect();
        let sliced = bits.slice(63, 70);
        assert_eq!(sliced.len(), 7);
        assert_eq!(
            sliced.iter().collect::<Vec<_>>(),
            vec![false, true, false, true, false, true, false]
        );
        assert_eq!(sliced.count_ones(), 3);
    }

    #[test]
    fn test_to_bytes_truncates_to_bit_length() {
        let bits: BitVec = [true, false, true].into_iter().collect();
        assert_eq!(bits.to_bytes(), vec![0b101]);
    }

    #[test]
    fn test_clone_and_equality_ignore_capacity() {
        let mut grown = BitVec::with_capacity_bits(1_024);
        for i in 0..13 {
            grown.push(i % 3 == 0);
        }
        let collected: BitVec = (0..13).map(|i| i % 3 == 0).collect();
        assert_eq!(grown, collected);
        assert_eq!(grown.clone(), collected);
        assert_eq!(grown.clone().count_ones(), 5);

        let mut longer = collected.clone();
        longer.push(false);
        assert_ne!(longer, collected);
        assert_eq!(longer.slice(0, 13), collected);
        assert_eq!(BitVec::default(), BitVec::new());
    }

    #[test]
    fn test_unaligned_slice_keeps_padding_clear() {
        let bits: BitVec = std::iter::repeat(true).take(20).collect();
        let sliced = bits.slice(3, 12);
        assert_eq!(sliced.len(), 9);
        assert_eq!(sliced.count_ones(), 9);
        assert_eq!(sliced.to_bytes(), vec![0xFF, 0x01]);
        assert_eq!(bits.slice(15, 99).len(), 5);
        assert!(bits.slice(30, 40).is_empty());
    }
}
