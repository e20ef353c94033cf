//! Reconstructs a stored column chunk by chunk.
//!
//! The catalog gives the global chunk count; the part readers give the chunk count of every
//! part. A [`ChunkCursor`] walks the chunks in order, stepping into the next part whenever the
//! current one is exhausted. Each row's null status is taken from the bitmap of the chunk whose
//! values are being decoded.

use std::sync::Arc;

use futures::future::try_join_all;
use object_store::{path::Path as ObjectPath, ObjectStore};
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::codec::viewers::{read_f64_slot, read_i32_slot, StringViewer};
use crate::codec::ChunkCodec;
use crate::errors::{ChunkpackError, Result};
use crate::reading::part_reader::PartReader;
use crate::reading::sinks::ValueSink;
use crate::relation::ColumnType;
use crate::storage_layout::metadata_catalog::FileMetadata;
use crate::storage_layout::part_files::{part_file_name, StoreFile};
use crate::utils::file_interaction_local_and_cloud::{get_object_store, read_object};

/// Position of the next chunk to read: `(part_index, chunk_in_part)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkCursor {
    pub part_index: usize,
    pub chunk_in_part: u32,
}

impl ChunkCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the position of the next chunk and moves past it.
    ///
    /// Exhausted parts are skipped first. Running past the last part is an error.
    ///
    /// # Examples
    ///
    /// ```
    /// # use chunkpack::reading::materializer::ChunkCursor;
    /// let counts = [2, 1];
    /// let mut cursor = ChunkCursor::new();
    /// assert_eq!(cursor.advance(&counts, 0, 0).unwrap(), (0, 0));
    /// assert_eq!(cursor.advance(&counts, 0, 1).unwrap(), (0, 1));
    /// assert_eq!(cursor.advance(&counts, 0, 2).unwrap(), (1, 0));
    /// assert!(cursor.advance(&counts, 0, 3).is_err());
    /// ```
    pub fn advance(&mut self, part_chunk_counts: &[u32], column_index: usize, chunk_index: u32) -> Result<(usize, u32)> {
        while self.part_index < part_chunk_counts.len() && self.chunk_in_part >= part_chunk_counts[self.part_index] {
            self.part_index += 1;
            self.chunk_in_part = 0;
        }
        if self.part_index >= part_chunk_counts.len() {
            return Err(ChunkpackError::CursorOutOfBounds {
                column_index,
                chunk_index,
                num_parts: part_chunk_counts.len(),
            });
        }
        let position = (self.part_index, self.chunk_in_part);
        self.chunk_in_part += 1;
        Ok(position)
    }
}

/// Reads and validates the `metadata` file under `dir`.
pub async fn load_catalog(store: &dyn ObjectStore, dir: &ObjectPath) -> Result<FileMetadata> {
    let location = dir.child(StoreFile::Metadata.file_name().as_str());
    let bytes = read_object(store, &location).await?;
    FileMetadata::decode(&bytes, location.as_ref())
}

/// All part readers of one column, ready to stream its values.
#[derive(Debug)]
pub struct ColumnMaterializer {
    column_index: usize,
    column_type: ColumnType,
    num_chunks: u32,
    readers: Vec<PartReader>,
    part_chunk_counts: SmallVec<[u32; 8]>,
}

impl ColumnMaterializer {
    /// Opens column `column_index` of the relation stored in `dir`.
    pub async fn open(dir: &str, column_index: usize, codec: Arc<dyn ChunkCodec>) -> Result<Self> {
        let (store, dir) = get_object_store(dir).await?;
        let catalog = load_catalog(store.as_ref(), &dir).await?;
        Self::open_with_catalog(store.as_ref(), &dir, &catalog, column_index, codec).await
    }

    /// Opens a column using an already loaded catalog; its part files are fetched concurrently.
    ///
    /// # Errors
    ///
    /// * [`ChunkpackError::ColumnOutOfRange`] when the catalog has no such column
    /// * [`ChunkpackError::UnsupportedType`] for SKIP or unknown column types
    /// * [`ChunkpackError::BadPart`] when a part is missing, unreadable, of the wrong type,
    ///   or the parts do not hold exactly `num_chunks` chunks
    pub async fn open_with_catalog(
        store: &dyn ObjectStore,
        dir: &ObjectPath,
        catalog: &FileMetadata,
        column_index: usize,
        codec: Arc<dyn ChunkCodec>,
    ) -> Result<Self> {
        let info = catalog.part(column_index)?;
        let column_type = info.column_type()?;
        if column_type == ColumnType::Skip {
            return Err(ChunkpackError::UnsupportedType {
                type_name: column_type.name().to_string(),
            });
        }

        let readers = try_join_all((0..info.num_parts).map(|part_index| {
            let location = dir.child(part_file_name(column_index, part_index).as_str());
            let codec = Arc::clone(&codec);
            async move { PartReader::open(store, &location, column_index, codec).await }
        }))
        .await?;

        let mut part_chunk_counts: SmallVec<[u32; 8]> = SmallVec::new();
        for reader in &readers {
            if reader.column_type() != column_type {
                return Err(ChunkpackError::BadPart {
                    column_index,
                    path: reader.path().to_string(),
                    reason: format!("part holds {} values, catalog says {}", reader.column_type(), column_type),
                });
            }
            part_chunk_counts.push(reader.chunk_count());
        }
        let stored_chunks: u32 = part_chunk_counts.iter().sum();
        if stored_chunks != catalog.num_chunks {
            return Err(ChunkpackError::BadPart {
                column_index,
                path: dir.to_string(),
                reason: format!(
                    "{} parts hold {} chunks, catalog says {}",
                    readers.len(),
                    stored_chunks,
                    catalog.num_chunks
                ),
            });
        }
        debug!(
            "opened column {} ({}): {} parts, chunks per part {:?}",
            column_index, column_type, readers.len(), part_chunk_counts
        );

        Ok(Self {
            column_index,
            column_type,
            num_chunks: catalog.num_chunks,
            readers,
            part_chunk_counts,
        })
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn tuple_count(&self) -> u64 {
        self.readers.iter().map(PartReader::total_tuples).sum()
    }

    pub fn part_chunk_counts(&self) -> &[u32] {
        &self.part_chunk_counts
    }

    /// Streams every row of the column into `sink`, returning the number of rows written.
    pub fn materialize(&self, sink: &mut dyn ValueSink) -> Result<u64> {
        sink.begin_column(self.column_type, self.tuple_count())?;

        let mut cursor = ChunkCursor::new();
        let mut buffer = Vec::new();
        let mut rows = 0u64;
        for chunk_index in 0..self.num_chunks {
            let (part_index, chunk_in_part) = cursor.advance(&self.part_chunk_counts, self.column_index, chunk_index)?;
            let reader = &self.readers[part_index];
            let requires_copy = reader.read_column(&mut buffer, chunk_in_part)?;
            let bitmap = reader.bitmap(chunk_in_part)?;
            let tuple_count = reader.tuple_count(chunk_in_part)? as usize;

            match self.column_type {
                ColumnType::Integer => {
                    for row in 0..tuple_count {
                        if bitmap.is_null(row) {
                            sink.push_null()?;
                        } else {
                            sink.push_integer(read_i32_slot(&buffer, row)?)?;
                        }
                    }
                }
                ColumnType::Double => {
                    for row in 0..tuple_count {
                        if bitmap.is_null(row) {
                            sink.push_null()?;
                        } else {
                            sink.push_double(read_f64_slot(&buffer, row)?)?;
                        }
                    }
                }
                ColumnType::String => {
                    let viewer = StringViewer::new(&buffer, tuple_count, requires_copy)?;
                    for row in 0..tuple_count {
                        if bitmap.is_null(row) {
                            sink.push_null()?;
                        } else {
                            sink.push_string(viewer.get(row)?)?;
                        }
                    }
                }
                ColumnType::Skip => {
                    return Err(ChunkpackError::UnsupportedType {
                        type_name: self.column_type.name().to_string(),
                    });
                }
            }
            rows += tuple_count as u64;
        }
        sink.finish()?;
        info!(
            "materialized column {} ({}): {} rows from {} chunks",
            self.column_index, self.column_type, rows, self.num_chunks
        );
        Ok(rows)
    }
}
