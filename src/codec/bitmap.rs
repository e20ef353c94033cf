//! Per-chunk validity bitmap.
//!
//! A chunk whose rows are all null or all present stores only a tag; anything else stores the
//! explicit bitset. The compact form is chosen automatically when the bitmap is built.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

use crate::errors::{ChunkpackError, Result};
use crate::utils::bit_vec::BitVec;

/// Storage kind of a [`ValidityBitmap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapKind {
    AllZeros,
    AllOnes,
    Bitset,
}

/// Validity of the rows of one chunk (bit set = value present).
///
/// # Examples
///
/// ```
/// use chunkpack::codec::bitmap::{BitmapKind, ValidityBitmap};
/// use chunkpack::utils::bit_vec::BitVec;
///
/// let bits: BitVec = [true, false, true].into_iter().collect();
/// let bitmap = ValidityBitmap::from_bits(&bits);
/// assert_eq!(bitmap.kind(), BitmapKind::Bitset);
/// assert!(bitmap.is_null(1));
/// assert!(!bitmap.is_null(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
pub enum ValidityBitmap {
    /// Every row is null.
    AllZeros,
    /// Every row is present.
    AllOnes,
    /// Explicit bits, little-endian within each byte.
    Bitset {
        bits: Vec<u8>,
        len: u32,
    },
}

impl ValidityBitmap {
    pub fn from_bits(bits: &BitVec) -> ValidityBitmap {
        if bits.count_ones() == 0 {
            ValidityBitmap::AllZeros
        } else if bits.count_ones() == bits.len() {
            ValidityBitmap::AllOnes
        } else {
            ValidityBitmap::Bitset {
                bits: bits.to_bytes(),
                len: bits.len() as u32,
            }
        }
    }

    pub fn kind(&self) -> BitmapKind {
        match self {
            ValidityBitmap::AllZeros => BitmapKind::AllZeros,
            ValidityBitmap::AllOnes => BitmapKind::AllOnes,
            ValidityBitmap::Bitset { .. } => BitmapKind::Bitset,
        }
    }

    /// Null status of the row at `row` (local to the chunk).
    ///
    /// Rows outside an explicit bitset read as null; [`ValidityBitmap::check_len`] rejects such
    /// bitmaps when a chunk is opened.
    pub fn is_null(&self, row: usize) -> bool {
        match self {
            ValidityBitmap::AllZeros => true,
            ValidityBitmap::AllOnes => false,
            ValidityBitmap::Bitset { bits, .. } => bits
                .get(row / 8)
                .is_none_or(|byte| (byte >> (row % 8)) & 1 == 0),
        }
    }

    /// Ensures an explicit bitset covers exactly `tuple_count` rows.
    pub fn check_len(&self, tuple_count: u32) -> Result<()> {
        if let ValidityBitmap::Bitset { bits, len } = self {
            if *len != tuple_count || bits.len() < tuple_count.div_ceil(8) as usize {
                return Err(ChunkpackError::CorruptChunk(format!(
                    "bitmap covers {} rows ({} bytes) but chunk has {} tuples",
                    len,
                    bits.len(),
                    tuple_count
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn from_archived(archived: &rkyv::Archived<ValidityBitmap>) -> ValidityBitmap {
        match archived {
            rkyv::Archived::<ValidityBitmap>::AllZeros => ValidityBitmap::AllZeros,
            rkyv::Archived::<ValidityBitmap>::AllOnes => ValidityBitmap::AllOnes,
            rkyv::Archived::<ValidityBitmap>::Bitset { bits, len } => ValidityBitmap::Bitset {
                bits: bits.as_slice().to_vec(),
                len: len.to_native(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_null_chunk_is_all_zeros() {
        let bits: BitVec = std::iter::repeat_n(false, 17).collect();
        let bitmap = ValidityBitmap::from_bits(&bits);
        assert_eq!(bitmap.kind(), BitmapKind::AllZeros);
        assert!((0..17).all(|row| bitmap.is_null(row)));
    }

    #[test]
    fn test_all_present_chunk_is_all_ones() {
        let bits: BitVec = std::iter::repeat_n(true, 17).collect();
        let bitmap = ValidityBitmap::from_bits(&bits);
        assert_eq!(bitmap.kind(), BitmapKind::AllOnes);
        assert!((0..17).all(|row| !bitmap.is_null(row)));
    }

    #[test]
    fn test_mixed_chunk_matches_input_bits() {
        let input: Vec<bool> = (0..41).map(|i| i % 5 != 2).collect();
        let bits: BitVec = input.iter().copied().collect();
        let bitmap = ValidityBitmap::from_bits(&bits);
        assert_eq!(bitmap.kind(), BitmapKind::Bitset);
        for (row, present) in input.iter().enumerate() {
            assert_eq!(bitmap.is_null(row), !present, "row {}", row);
        }
        assert!(bitmap.check_len(41).is_ok());
        assert!(bitmap.check_len(42).is_err());
    }
}
