//! Chunk compression.
//!
//! The packer and the materializer only talk to a [`ChunkCodec`]. A compressed chunk is a
//! self-describing rkyv archive: it records its column type, tuple count and validity bitmap next
//! to the encoded values, so a part file never needs out-of-band type information to decode.
//!
//! [`CascadeCodec`] tries every applicable [`schemes::Scheme`] and keeps the smallest encoding,
//! optionally followed by an LZ4 stage (see [`crate::config::CodecConfig`]).

pub mod bitmap;
pub mod schemes;
pub mod viewers;

use std::fmt::Debug;

use rkyv::rancor::Error as RkyvError;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use tracing::debug;

use crate::config::CodecConfig;
use crate::errors::{ChunkpackError, Result};
use crate::relation::{type_tag_name, ColumnType, InputChunk, InputValues};
use bitmap::ValidityBitmap;
use schemes::Scheme;
use viewers::{read_f64_slot, read_i32_slot, StringViewer};

/// Everything about a compressed chunk except its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Raw type tag, kept raw so unknown tags can be reported by name.
    pub column_type_tag: u32,
    pub tuple_count: u32,
    pub bitmap: ValidityBitmap,
}

impl ChunkHeader {
    pub fn column_type(&self) -> Option<ColumnType> {
        ColumnType::from_tag(self.column_type_tag)
    }
}

/// Compression collaborator used by packing and materialization.
///
/// `decompress` must be the inverse of `compress` for every chunk this codec produced.
pub trait ChunkCodec: Send + Sync + Debug {
    fn compress(&self, chunk: &InputChunk<'_>) -> Result<Vec<u8>>;

    /// Reads the header of a compressed chunk without decoding its values.
    fn inspect(&self, bytes: &[u8]) -> Result<ChunkHeader>;

    /// Decodes the values of a compressed chunk into `out` using the layouts of [`viewers`].
    ///
    /// Returns `requires_copy`: whether decoded strings use the pointer layout.
    fn decompress(&self, bytes: &[u8], out: &mut Vec<u8>) -> Result<bool>;
}

#[derive(Debug, Archive, RkyvSerialize, RkyvDeserialize)]
pub struct CompressedChunk {
    pub column_type: u32,
    pub tuple_count: u32,
    pub bitmap: ValidityBitmap,
    pub scheme: u8,
    /// The payload went through LZ4 after the scheme.
    pub lz4: bool,
    pub payload: Vec<u8>,
}

/// Copies `bytes` into an aligned buffer so rkyv can validate and access it.
pub(crate) fn aligned_copy(bytes: &[u8]) -> AlignedVec<16> {
    let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
    aligned.extend_from_slice(bytes);
    aligned
}

#[derive(Debug, Clone, Default)]
pub struct CascadeCodec {
    config: CodecConfig,
}

impl CascadeCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    fn choose_payload(&self, values: &InputValues<'_>, column_type: ColumnType) -> Result<(Scheme, Vec<u8>)> {
        let candidates: &[Scheme] = if self.config.max_cascade_depth == 0 {
            &[Scheme::Uncompressed]
        } else {
            Scheme::candidates(column_type)
        };

        let mut best: Option<(Scheme, Vec<u8>)> = None;
        for &scheme in candidates {
            if let Some(payload) = schemes::encode(scheme, values)? {
                if best.as_ref().is_none_or(|(_, b)| payload.len() < b.len()) {
                    best = Some((scheme, payload));
                }
            }
        }
        best.ok_or_else(|| ChunkpackError::UnsupportedType {
            type_name: column_type.name().to_string(),
        })
    }
}

impl ChunkCodec for CascadeCodec {
    fn compress(&self, chunk: &InputChunk<'_>) -> Result<Vec<u8>> {
        let column_type = chunk.column_type();
        let tuple_count = chunk.tuple_count();
        if chunk.validity.len() != tuple_count {
            return Err(ChunkpackError::CorruptChunk(format!(
                "input chunk has {} values but {} validity bits",
                tuple_count,
                chunk.validity.len()
            )));
        }

        let (scheme, mut payload) = self.choose_payload(&chunk.values, column_type)?;
        let mut lz4 = false;
        if self.config.max_cascade_depth >= 2 {
            let packed = lz4_flex::compress_prepend_size(&payload);
            if packed.len() < payload.len() {
                payload = packed;
                lz4 = true;
            }
        }
        debug!(
            "compressed {} chunk of {} rows with {:?} (lz4: {}) into {} bytes",
            column_type,
            tuple_count,
            scheme,
            lz4,
            payload.len()
        );

        let compressed = CompressedChunk {
            column_type: column_type.tag(),
            tuple_count: schemes::checked_u32(tuple_count, "chunk tuple count")?,
            bitmap: ValidityBitmap::from_bits(&chunk.validity),
            scheme: scheme.tag(),
            lz4,
            payload,
        };
        Ok(rkyv::to_bytes::<RkyvError>(&compressed)?.to_vec())
    }

    fn inspect(&self, bytes: &[u8]) -> Result<ChunkHeader> {
        let aligned = aligned_copy(bytes);
        let archived = rkyv::access::<ArchivedCompressedChunk, RkyvError>(&aligned)?;
        let header = ChunkHeader {
            column_type_tag: archived.column_type.to_native(),
            tuple_count: archived.tuple_count.to_native(),
            bitmap: ValidityBitmap::from_archived(&archived.bitmap),
        };
        header.bitmap.check_len(header.tuple_count)?;
        Ok(header)
    }

    fn decompress(&self, bytes: &[u8], out: &mut Vec<u8>) -> Result<bool> {
        let aligned = aligned_copy(bytes);
        let archived = rkyv::access::<ArchivedCompressedChunk, RkyvError>(&aligned)?;

        let type_tag = archived.column_type.to_native();
        let column_type = ColumnType::from_tag(type_tag)
            .filter(|t| *t != ColumnType::Skip)
            .ok_or_else(|| ChunkpackError::UnsupportedType {
                type_name: type_tag_name(type_tag),
            })?;
        let scheme = Scheme::from_tag(archived.scheme).ok_or_else(|| {
            ChunkpackError::CorruptChunk(format!("unknown scheme tag {}", archived.scheme))
        })?;
        let tuple_count = archived.tuple_count.to_native() as usize;

        if archived.lz4 {
            let payload = lz4_flex::decompress_size_prepended(archived.payload.as_slice())
                .map_err(|e| ChunkpackError::CorruptChunk(format!("lz4 stage: {}", e)))?;
            schemes::decode(scheme, column_type, &payload, tuple_count, out)
        } else {
            schemes::decode(scheme, column_type, archived.payload.as_slice(), tuple_count, out)
        }
    }
}

/// Decompresses `bytes` and compares every row against `chunk`.
///
/// Values of null rows are not compared, only their validity.
pub fn verify_chunk(codec: &dyn ChunkCodec, chunk: &InputChunk<'_>, bytes: &[u8]) -> std::result::Result<(), String> {
    let header = codec.inspect(bytes).map_err(|e| e.to_string())?;
    if header.tuple_count as usize != chunk.tuple_count() {
        return Err(format!(
            "tuple count {} does not match input {}",
            header.tuple_count,
            chunk.tuple_count()
        ));
    }
    if header.column_type_tag != chunk.column_type().tag() {
        return Err(format!(
            "type {} does not match input {}",
            type_tag_name(header.column_type_tag),
            chunk.column_type()
        ));
    }

    let mut out = Vec::new();
    let requires_copy = codec.decompress(bytes, &mut out).map_err(|e| e.to_string())?;
    let strings = match chunk.values {
        InputValues::String(_) => {
            Some(StringViewer::new(&out, chunk.tuple_count(), requires_copy).map_err(|e| e.to_string())?)
        }
        _ => None,
    };

    for (row, present) in chunk.validity.iter().enumerate() {
        if header.bitmap.is_null(row) == present {
            return Err(format!("row {}: validity differs (expected present = {})", row, present));
        }
        if !present {
            continue;
        }
        let matches = match (&chunk.values, &strings) {
            (InputValues::Integer(v), _) => read_i32_slot(&out, row).map(|x| x == v[row]),
            (InputValues::Double(v), _) => read_f64_slot(&out, row).map(|x| x.to_bits() == v[row].to_bits()),
            (InputValues::String(v), Some(viewer)) => viewer.get(row).map(|s| s == v[row]),
            (InputValues::String(_), None) => Ok(false),
        }
        .map_err(|e| e.to_string())?;
        if !matches {
            return Err(format!("row {}: value differs after decompression", row));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::bitmap::BitmapKind;
    use crate::utils::bit_vec::BitVec;

    fn chunk<'a>(values: InputValues<'a>, validity: &[bool]) -> InputChunk<'a> {
        InputChunk {
            values,
            validity: validity.iter().copied().collect::<BitVec>(),
        }
    }

    #[test]
    fn test_integer_chunk_round_trip_at_every_depth() {
        let values: Vec<i32> = (0..500).map(|i| i / 50).collect();
        let validity = vec![true; values.len()];
        let input = chunk(InputValues::Integer(&values), &validity);
        for depth in 0..=3 {
            let codec = CascadeCodec::new(CodecConfig { max_cascade_depth: depth });
            let bytes = codec.compress(&input).unwrap();
            verify_chunk(&codec, &input, &bytes).unwrap();
        }
    }

    #[test]
    fn test_depth_zero_stays_uncompressed() {
        let values = vec![5i32; 1000];
        let validity = vec![true; values.len()];
        let input = chunk(InputValues::Integer(&values), &validity);
        let flat = CascadeCodec::new(CodecConfig { max_cascade_depth: 0 }).compress(&input).unwrap();
        let packed = CascadeCodec::default().compress(&input).unwrap();
        assert!(flat.len() > 4000);
        assert!(packed.len() < 200);
    }

    #[test]
    fn test_header_carries_type_and_bitmap() {
        let values = vec!["x".to_string(), String::new(), "y".to_string()];
        let input = chunk(InputValues::String(&values), &[true, false, true]);
        let codec = CascadeCodec::default();
        let bytes = codec.compress(&input).unwrap();
        let header = codec.inspect(&bytes).unwrap();
        assert_eq!(header.column_type(), Some(ColumnType::String));
        assert_eq!(header.tuple_count, 3);
        assert_eq!(header.bitmap.kind(), BitmapKind::Bitset);
        assert!(header.bitmap.is_null(1));
    }

    #[test]
    fn test_all_null_double_chunk() {
        let values = vec![crate::relation::DOUBLE_NULL_CODE; 64];
        let input = chunk(InputValues::Double(&values), &[false; 64]);
        let codec = CascadeCodec::default();
        let bytes = codec.compress(&input).unwrap();
        assert_eq!(codec.inspect(&bytes).unwrap().bitmap.kind(), BitmapKind::AllZeros);
        verify_chunk(&codec, &input, &bytes).unwrap();
    }

    #[test]
    fn test_verify_detects_mismatch() {
        let codec = CascadeCodec::default();
        let written = vec![1, 2, 3];
        let other = vec![1, 2, 4];
        let validity = [true, true, true];
        let bytes = codec.compress(&chunk(InputValues::Integer(&written), &validity)).unwrap();
        let err = verify_chunk(&codec, &chunk(InputValues::Integer(&other), &validity), &bytes).unwrap_err();
        assert!(err.contains("row 2"), "{}", err);
    }

    #[test]
    fn test_garbage_bytes_are_rejected() {
        let codec = CascadeCodec::default();
        let mut out = Vec::new();
        assert!(codec.inspect(&[1, 2, 3]).is_err());
        assert!(codec.decompress(&[0u8; 7], &mut out).is_err());
    }
}
