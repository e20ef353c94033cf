//! Read access to a single part file.

use std::sync::Arc;

use object_store::{path::Path as ObjectPath, ObjectStore};
use rkyv::rancor::Error as RkyvError;

use crate::codec::bitmap::ValidityBitmap;
use crate::codec::{aligned_copy, ChunkCodec, ChunkHeader};
use crate::errors::{ChunkpackError, Result};
use crate::part_packing::{ArchivedPartFile, PART_FORMAT_VERSION};
use crate::relation::{type_tag_name, ColumnType};
use crate::utils::file_interaction_local_and_cloud::read_object;

/// One opened part file of a column.
///
/// The file is read and validated once; chunk headers are decoded up front so tuple counts and
/// bitmaps are available without touching the values.
#[derive(Debug)]
pub struct PartReader {
    column_index: usize,
    path: String,
    column_type: ColumnType,
    chunks: Vec<Vec<u8>>,
    headers: Vec<ChunkHeader>,
    codec: Arc<dyn ChunkCodec>,
}

impl PartReader {
    pub async fn open(
        store: &dyn ObjectStore,
        location: &ObjectPath,
        column_index: usize,
        codec: Arc<dyn ChunkCodec>,
    ) -> Result<PartReader> {
        let bytes = read_object(store, location).await.map_err(|e| ChunkpackError::BadPart {
            column_index,
            path: location.to_string(),
            reason: e.to_string(),
        })?;
        PartReader::from_bytes(&bytes, &location.to_string(), column_index, codec)
    }

    /// Parses a part file image; `path` is only used in error messages.
    pub fn from_bytes(bytes: &[u8], path: &str, column_index: usize, codec: Arc<dyn ChunkCodec>) -> Result<PartReader> {
        let bad_part = |reason: String| ChunkpackError::BadPart {
            column_index,
            path: path.to_string(),
            reason,
        };

        let aligned = aligned_copy(bytes);
        let archived = rkyv::access::<ArchivedPartFile, RkyvError>(&aligned).map_err(|e| bad_part(e.to_string()))?;
        let version = archived.version.to_native();
        if version != PART_FORMAT_VERSION {
            return Err(bad_part(format!("unsupported part version {}", version)));
        }
        let type_tag = archived.column_type.to_native();
        let column_type = ColumnType::from_tag(type_tag)
            .ok_or_else(|| bad_part(format!("unknown column type {}", type_tag_name(type_tag))))?;

        let mut chunks = Vec::with_capacity(archived.chunks.len());
        let mut headers = Vec::with_capacity(archived.chunks.len());
        for (chunk_index, chunk) in archived.chunks.iter().enumerate() {
            let header = codec
                .inspect(chunk.as_slice())
                .map_err(|e| bad_part(format!("chunk {}: {}", chunk_index, e)))?;
            if header.column_type_tag != type_tag {
                return Err(bad_part(format!(
                    "chunk {} holds {} values in a {} part",
                    chunk_index,
                    type_tag_name(header.column_type_tag),
                    column_type
                )));
            }
            headers.push(header);
            chunks.push(chunk.as_slice().to_vec());
        }

        Ok(PartReader {
            column_index,
            path: path.to_string(),
            column_type,
            chunks,
            headers,
            codec,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunks.len() as u32
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    fn header(&self, chunk_index: u32) -> Result<&ChunkHeader> {
        self.headers
            .get(chunk_index as usize)
            .ok_or_else(|| ChunkpackError::BadPart {
                column_index: self.column_index,
                path: self.path.clone(),
                reason: format!("chunk {} requested, part holds {}", chunk_index, self.headers.len()),
            })
    }

    pub fn tuple_count(&self, chunk_index: u32) -> Result<u32> {
        Ok(self.header(chunk_index)?.tuple_count)
    }

    pub fn bitmap(&self, chunk_index: u32) -> Result<&ValidityBitmap> {
        Ok(&self.header(chunk_index)?.bitmap)
    }

    /// Total tuples across all chunks of this part.
    pub fn total_tuples(&self) -> u64 {
        self.headers.iter().map(|h| h.tuple_count as u64).sum()
    }

    /// Raw compressed bytes of a chunk.
    pub fn chunk_bytes(&self, chunk_index: u32) -> Result<&[u8]> {
        self.header(chunk_index)?;
        Ok(&self.chunks[chunk_index as usize])
    }

    /// Decodes the values of `chunk_index` into `out`, returning `requires_copy`.
    pub fn read_column(&self, out: &mut Vec<u8>, chunk_index: u32) -> Result<bool> {
        let bytes = self.chunk_bytes(chunk_index)?;
        self.codec.decompress(bytes, out)
    }
}
