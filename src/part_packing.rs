//! Packs the compressed chunks of a relation into size-bounded part files.
//!
//! Every column is packed by its own tokio task. Within a column, chunks are compressed and
//! appended strictly in range order; a part is flushed as `column<i>_part<j>` as soon as the next
//! chunk would push it past its byte budget. The catalog is written only after every column task
//! has finished.

use std::sync::Arc;

use hashbrown::HashMap;
use object_store::{path::Path as ObjectPath, ObjectStore};
use rkyv::rancor::Error as RkyvError;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::chunking::{self, SplitStrategy};
use crate::codec::{verify_chunk, ChunkCodec};
use crate::config::PackOptions;
use crate::errors::{ChunkpackError, ColumnFailure, Result};
use crate::relation::{ColumnType, Range, Relation};
use crate::storage_layout::metadata_catalog::{ColumnPartInfo, FileMetadata};
use crate::storage_layout::part_files::{part_file_name, StoreFile};
use crate::utils::file_interaction_local_and_cloud::{get_object_store, write_object};

/// Version written into every part file.
pub const PART_FORMAT_VERSION: u32 = 1;

/// Archived content of one part file.
#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug)]
pub struct PartFile {
    pub version: u32,
    pub column_type: u32,
    /// Compressed chunks in row order; each one is a self-describing chunk archive.
    pub chunks: Vec<Vec<u8>>,
}

/// Compressed chunks of one column waiting to be written as a single part.
#[derive(Debug)]
pub struct ColumnPart {
    column_type: ColumnType,
    chunks: Vec<Vec<u8>>,
    total_bytes: usize,
    max_bytes: usize,
}

impl ColumnPart {
    pub fn new(column_type: ColumnType, max_bytes: usize) -> Self {
        Self {
            column_type,
            chunks: Vec::new(),
            total_bytes: 0,
            max_bytes,
        }
    }

    /// Whether a chunk of `size` bytes fits the budget.
    ///
    /// An empty part accepts any chunk, so an oversized chunk ends up alone in its own part.
    pub fn can_add(&self, size: usize) -> bool {
        self.chunks.is_empty() || self.total_bytes + size <= self.max_bytes
    }

    pub fn add_compressed_chunk(&mut self, chunk: Vec<u8>) {
        self.total_bytes += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Writes the part to `location` and clears it, returning the bytes written.
    pub async fn write_to_store(&mut self, store: &dyn ObjectStore, location: &ObjectPath) -> Result<u64> {
        let part = PartFile {
            version: PART_FORMAT_VERSION,
            column_type: self.column_type.tag(),
            chunks: std::mem::take(&mut self.chunks),
        };
        self.total_bytes = 0;
        let bytes = rkyv::to_bytes::<RkyvError>(&part)?;
        write_object(store, location, bytes.to_vec()).await
    }
}

/// Packing statistics of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPackStats {
    pub column_index: usize,
    pub column_name: String,
    pub column_type: ColumnType,
    pub num_parts: u32,
    pub num_chunks: u32,
    /// Size of the raw values before compression.
    pub uncompressed_bytes: u64,
    /// Sum of the compressed chunk sizes.
    pub compressed_bytes: u64,
    /// Bytes of the part files, archive overhead included.
    pub written_bytes: u64,
}

impl ColumnPackStats {
    pub fn compression_ratio(&self) -> f64 {
        if self.compressed_bytes == 0 {
            0.0
        } else {
            self.uncompressed_bytes as f64 / self.compressed_bytes as f64
        }
    }
}

/// Outcome of packing a relation.
#[derive(Debug, Clone)]
pub struct PackReport {
    pub metadata: FileMetadata,
    pub columns: Vec<ColumnPackStats>,
}

impl PackReport {
    pub fn uncompressed_bytes(&self) -> u64 {
        self.columns.iter().map(|c| c.uncompressed_bytes).sum()
    }

    pub fn compressed_bytes(&self) -> u64 {
        self.columns.iter().map(|c| c.compressed_bytes).sum()
    }

    pub fn compression_ratio(&self) -> f64 {
        let compressed = self.compressed_bytes();
        if compressed == 0 {
            0.0
        } else {
            self.uncompressed_bytes() as f64 / compressed as f64
        }
    }
}

/// Compresses and writes every chunk of one column, in range order.
async fn pack_column(
    relation: Arc<Relation>,
    column_index: usize,
    ranges: Arc<Vec<Range>>,
    codec: Arc<dyn ChunkCodec>,
    options: Arc<PackOptions>,
    store: Arc<dyn ObjectStore>,
    dir: ObjectPath,
) -> Result<ColumnPackStats> {
    let column = &relation.columns[column_index];
    let column_type = column.column_type();
    let mut stats = ColumnPackStats {
        column_index,
        column_name: column.name.clone(),
        column_type,
        num_parts: 0,
        num_chunks: 0,
        uncompressed_bytes: 0,
        compressed_bytes: 0,
        written_bytes: 0,
    };
    if column_type == ColumnType::Skip {
        warn!("column {} ('{}') is SKIP, no parts written", column_index, column.name);
        return Ok(stats);
    }

    let mut part = ColumnPart::new(column_type, options.part_max_bytes);
    for (chunk_index, range) in ranges.iter().enumerate() {
        let compressed = {
            let Some(chunk) = relation.input_chunk(*range, column_index) else {
                return Err(ChunkpackError::UnsupportedType {
                    type_name: column_type.name().to_string(),
                });
            };
            let compressed = codec.compress(&chunk)?;
            if options.verify_chunks {
                verify_chunk(codec.as_ref(), &chunk, &compressed).map_err(|reason| {
                    ChunkpackError::VerificationFailed {
                        column_index,
                        chunk_index,
                        reason,
                    }
                })?;
            }
            compressed
        };
        stats.uncompressed_bytes += column.size_bytes(*range) as u64;
        stats.compressed_bytes += compressed.len() as u64;
        stats.num_chunks += 1;

        if !part.can_add(compressed.len()) {
            stats.written_bytes += flush_part(&mut part, store.as_ref(), &dir, column_index, stats.num_parts).await?;
            stats.num_parts += 1;
        }
        part.add_compressed_chunk(compressed);
    }
    if !part.is_empty() {
        stats.written_bytes += flush_part(&mut part, store.as_ref(), &dir, column_index, stats.num_parts).await?;
        stats.num_parts += 1;
    }

    info!(
        "column {} ('{}', {}): {} chunks in {} parts, {} -> {} bytes (ratio {:.2})",
        column_index,
        stats.column_name,
        column_type,
        stats.num_chunks,
        stats.num_parts,
        stats.uncompressed_bytes,
        stats.compressed_bytes,
        stats.compression_ratio()
    );
    Ok(stats)
}

async fn flush_part(
    part: &mut ColumnPart,
    store: &dyn ObjectStore,
    dir: &ObjectPath,
    column_index: usize,
    part_index: u32,
) -> Result<u64> {
    let name = part_file_name(column_index, part_index);
    let chunk_count = part.chunk_count();
    let written = part.write_to_store(store, &dir.child(name.as_str())).await?;
    debug!("wrote {} ({} chunks, {} bytes)", name, chunk_count, written);
    Ok(written)
}

/// Packs `relation` into `out_dir`: part files per column, then the catalog.
///
/// Columns are packed concurrently. If any column fails, the other columns still run to
/// completion, no catalog is written and every failure is returned in
/// [`ChunkpackError::ColumnTasks`].
///
/// # Errors
///
/// * [`ChunkpackError::InvalidConfig`] for a zero chunk size or part budget
/// * [`ChunkpackError::EmptyRelation`] when the relation has no rows
/// * [`ChunkpackError::ColumnTasks`] when one or more columns fail
///
/// # Examples
///
/// ```
/// # use std::sync::Arc;
/// # use chunkpack::codec::CascadeCodec;
/// # use chunkpack::config::PackOptions;
/// # use chunkpack::part_packing::pack_relation;
/// # use chunkpack::relation::{Column, Relation};
/// # tokio_test::block_on(async {
/// let mut relation = Relation::new();
/// relation.add_column(Column::from_integers("id", (0..100).collect())).unwrap();
///
/// let options = PackOptions::default().with_chunk_rows(30);
/// let codec = Arc::new(CascadeCodec::new(options.codec));
/// let report = pack_relation(Arc::new(relation), "memory://docs/pack", &options, codec).await.unwrap();
/// assert_eq!(report.metadata.num_chunks, 4);
/// assert_eq!(report.metadata.parts[0].num_parts, 1);
/// # });
/// ```
pub async fn pack_relation(
    relation: Arc<Relation>,
    out_dir: &str,
    options: &PackOptions,
    codec: Arc<dyn ChunkCodec>,
) -> Result<PackReport> {
    options.validate()?;
    let ranges = Arc::new(chunking::ranges(&relation, SplitStrategy::Sequential, options.chunk_rows)?);
    let num_chunks = u32::try_from(ranges.len()).map_err(|_| {
        ChunkpackError::InvalidConfig(format!(
            "{} chunks per column exceed the catalog's u32 chunk count; raise chunk_rows",
            ranges.len()
        ))
    })?;
    let (store, dir) = get_object_store(out_dir).await?;
    let options = Arc::new(options.clone());
    info!(
        "packing {} columns x {} tuples into {} chunks at {}",
        relation.columns.len(),
        relation.tuple_count,
        ranges.len(),
        out_dir
    );

    let mut tasks = JoinSet::new();
    let mut task_columns = HashMap::new();
    for column_index in 0..relation.columns.len() {
        let handle = tasks.spawn(pack_column(
            Arc::clone(&relation),
            column_index,
            Arc::clone(&ranges),
            Arc::clone(&codec),
            Arc::clone(&options),
            Arc::clone(&store),
            dir.clone(),
        ));
        task_columns.insert(handle.id(), column_index);
    }

    let mut columns: Vec<Option<ColumnPackStats>> = vec![None; relation.columns.len()];
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((id, Ok(stats))) => {
                if let Some(&column_index) = task_columns.get(&id) {
                    columns[column_index] = Some(stats);
                }
            }
            Ok((id, Err(error))) => failures.push(ColumnFailure {
                column_index: task_columns.get(&id).copied().unwrap_or_default(),
                error,
            }),
            Err(join_error) => failures.push(ColumnFailure {
                column_index: task_columns.get(&join_error.id()).copied().unwrap_or_default(),
                error: join_error.into(),
            }),
        }
    }
    if !failures.is_empty() {
        failures.sort_by_key(|f| f.column_index);
        return Err(ChunkpackError::ColumnTasks(failures));
    }
    let columns: Vec<ColumnPackStats> = columns.into_iter().flatten().collect();

    let metadata = FileMetadata {
        num_chunks,
        parts: columns
            .iter()
            .map(|c| ColumnPartInfo::new(c.column_type, c.num_parts))
            .collect(),
    };
    let metadata_location = dir.child(StoreFile::Metadata.file_name().as_str());
    write_object(store.as_ref(), &metadata_location, metadata.encode()).await?;

    let report = PackReport { metadata, columns };
    info!(
        "packed {} -> {} bytes (ratio {:.2}), catalog written to {}",
        report.uncompressed_bytes(),
        report.compressed_bytes(),
        report.compression_ratio(),
        metadata_location
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CascadeCodec;
    use crate::config::CodecConfig;
    use crate::relation::Column;

    #[test]
    fn test_empty_part_accepts_oversized_chunk() {
        let mut part = ColumnPart::new(ColumnType::Integer, 10);
        assert!(part.can_add(100));
        part.add_compressed_chunk(vec![0; 100]);
        assert!(!part.can_add(1));
        assert_eq!(part.total_bytes(), 100);
    }

    #[test]
    fn test_budget_is_inclusive() {
        let mut part = ColumnPart::new(ColumnType::Integer, 10);
        part.add_compressed_chunk(vec![0; 4]);
        assert!(part.can_add(6));
        assert!(!part.can_add(7));
    }

    #[tokio::test]
    async fn test_write_clears_the_part() {
        let (store, dir) = get_object_store("memory://part_packing/clear").await.unwrap();
        let mut part = ColumnPart::new(ColumnType::Double, 1024);
        part.add_compressed_chunk(vec![1, 2, 3]);
        part.add_compressed_chunk(vec![4]);
        let written = part.write_to_store(store.as_ref(), &dir.child("column0_part0")).await.unwrap();
        assert!(written > 4);
        assert!(part.is_empty());
        assert_eq!(part.total_bytes(), 0);
    }

    #[tokio::test]
    async fn test_small_budget_splits_column_into_parts() {
        let mut relation = Relation::new();
        relation
            .add_column(Column::from_integers("v", (0..1000).map(|i| i * 7919 % 1000).collect()))
            .unwrap();
        relation.add_column(Column::skip("gap")).unwrap();

        let options = PackOptions::default()
            .with_chunk_rows(100)
            .with_part_max_bytes(500)
            .with_max_cascade_depth(0)
            .with_verify_chunks(true);
        let codec = Arc::new(CascadeCodec::new(CodecConfig { max_cascade_depth: 0 }));
        let report = pack_relation(Arc::new(relation), "memory://part_packing/split", &options, codec)
            .await
            .unwrap();

        assert_eq!(report.metadata.num_chunks, 10);
        assert_eq!(report.metadata.parts[0].num_parts, 10);
        assert_eq!(report.metadata.parts[1], ColumnPartInfo::new(ColumnType::Skip, 0));
        assert_eq!(report.columns[0].num_chunks, 10);
        assert_eq!(report.columns[0].uncompressed_bytes, 4000);
    }
}
