//! The `metadata` file of a packed relation.
//!
//! Fixed little-endian layout, read fully into memory:
//!
//! ```text
//! u32 num_columns
//! u32 num_chunks
//! num_columns × (u32 type_tag, u32 num_parts)
//! ```
//!
//! `num_chunks` is shared by every data column because all columns are chunked over the same
//! row ranges.

use bytes::{Buf, BufMut};

use crate::errors::{ChunkpackError, Result};
use crate::relation::{type_tag_name, ColumnType};

const HEADER_BYTES: usize = 8;
const COLUMN_ENTRY_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnPartInfo {
    /// Raw type tag; unknown tags survive decoding and are reported when the column is read.
    pub type_tag: u32,
    pub num_parts: u32,
}

impl ColumnPartInfo {
    pub fn new(column_type: ColumnType, num_parts: u32) -> Self {
        Self {
            type_tag: column_type.tag(),
            num_parts,
        }
    }

    pub fn column_type(&self) -> Result<ColumnType> {
        ColumnType::from_tag(self.type_tag).ok_or_else(|| ChunkpackError::UnsupportedType {
            type_name: type_tag_name(self.type_tag),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub num_chunks: u32,
    pub parts: Vec<ColumnPartInfo>,
}

impl FileMetadata {
    pub fn num_columns(&self) -> usize {
        self.parts.len()
    }

    /// Serializes the catalog.
    ///
    /// # Examples
    ///
    /// ```
    /// # use chunkpack::relation::ColumnType;
    /// # use chunkpack::storage_layout::metadata_catalog::{ColumnPartInfo, FileMetadata};
    /// let catalog = FileMetadata {
    ///     num_chunks: 1,
    ///     parts: vec![
    ///         ColumnPartInfo::new(ColumnType::Integer, 1),
    ///         ColumnPartInfo::new(ColumnType::Double, 1),
    ///     ],
    /// };
    /// let bytes = catalog.encode();
    /// assert_eq!(bytes.len(), 24);
    /// assert_eq!(FileMetadata::decode(&bytes, "metadata").unwrap(), catalog);
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_BYTES + self.parts.len() * COLUMN_ENTRY_BYTES);
        out.put_u32_le(self.parts.len() as u32);
        out.put_u32_le(self.num_chunks);
        for info in &self.parts {
            out.put_u32_le(info.type_tag);
            out.put_u32_le(info.num_parts);
        }
        out
    }

    /// Parses a catalog read from `path` (used in error messages only).
    ///
    /// The buffer must hold exactly the header plus `num_columns` entries.
    pub fn decode(bytes: &[u8], path: &str) -> Result<FileMetadata> {
        let malformed = |reason: String| ChunkpackError::MalformedMetadata {
            path: path.to_string(),
            reason,
        };

        let mut buf = bytes;
        if buf.remaining() < HEADER_BYTES {
            return Err(malformed(format!(
                "{} bytes is shorter than the {} byte header",
                buf.remaining(),
                HEADER_BYTES
            )));
        }
        let num_columns = buf.get_u32_le() as usize;
        let num_chunks = buf.get_u32_le();

        let expected = num_columns
            .checked_mul(COLUMN_ENTRY_BYTES)
            .ok_or_else(|| malformed(format!("column count {} overflows", num_columns)))?;
        if buf.remaining() != expected {
            return Err(malformed(format!(
                "{} columns need {} entry bytes, found {}",
                num_columns,
                expected,
                buf.remaining()
            )));
        }

        let parts = (0..num_columns)
            .map(|_| ColumnPartInfo {
                type_tag: buf.get_u32_le(),
                num_parts: buf.get_u32_le(),
            })
            .collect();
        Ok(FileMetadata { num_chunks, parts })
    }

    /// Returns the entry of `column_index`, or [`ChunkpackError::ColumnOutOfRange`].
    pub fn part(&self, column_index: usize) -> Result<&ColumnPartInfo> {
        self.parts
            .get(column_index)
            .ok_or(ChunkpackError::ColumnOutOfRange {
                column_index,
                num_columns: self.parts.len(),
            })
    }

    /// Flat view `[num_columns, num_chunks, type_0, parts_0, type_1, parts_1, ...]`.
    pub fn to_flat(&self) -> Vec<u32> {
        let mut flat = Vec::with_capacity(2 + self.parts.len() * 2);
        flat.push(self.parts.len() as u32);
        flat.push(self.num_chunks);
        for info in &self.parts {
            flat.push(info.type_tag);
            flat.push(info.num_parts);
        }
        flat
    }
}
