//! Chunkpack - Chunked, Compressed Columnar Storage for CSV Data
//!
//! Ingests CSV into typed, null-tracked columns, splits every column into fixed-size row
//! chunks, compresses each chunk independently and packs the chunks into size-bounded part
//! files next to a small binary catalog. The read path walks the catalog and the parts to
//! reconstruct any column, nulls included. Works with local paths, S3 (`s3://`) and an
//! in-process store (`memory://`).
//!
//! # Quick Start
//!
//! ```no_run
//! use chunkpack::column_ingest::ColumnSpec;
//! use chunkpack::config::PackOptions;
//! use chunkpack::{csv_to_parts, decompress_column_i32};
//!
//! #[tokio::main]
//! async fn main() -> chunkpack::errors::Result<()> {
//!     let columns = vec![ColumnSpec::new("id", "integer"), ColumnSpec::new("name", "string")];
//!     let report = csv_to_parts("people.csv", "people.packed", &columns, &PackOptions::default()).await?;
//!     println!("{} chunks, ratio {:.2}", report.metadata.num_chunks, report.compression_ratio());
//!
//!     let ids = decompress_column_i32("people.packed", 0).await?;
//!     println!("{} ids", ids.len());
//!     Ok(())
//! }
//! ```
//!
//! # Layout
//!
//! ```text
//! people.packed/
//! ├── metadata          (column types, part counts, chunk count)
//! ├── column0_part0     (compressed chunks of column 0)
//! └── column1_part0
//! ```

pub mod chunking;
pub mod codec;
pub mod column_ingest;
pub mod config;
pub mod errors;
pub mod part_packing;
pub mod reading;
pub mod relation;
pub mod storage_layout;
#[cfg(test)]
pub mod unit_tests;
pub mod utils;

use std::fmt;
use std::sync::Arc;

use arrow::array::ArrayRef;
use hashbrown::HashMap;
use tokio::task::JoinSet;
use tracing::info;

use crate::codec::{CascadeCodec, ChunkCodec};
use crate::column_ingest::{ingest_csv, ColumnSpec};
use crate::config::PackOptions;
use crate::errors::{ChunkpackError, ColumnFailure, Result};
use crate::part_packing::{pack_relation, PackReport};
use crate::reading::materializer::{load_catalog, ColumnMaterializer};
use crate::reading::sinks::{ArrowSink, TextSink, ValueSink, VecSink};
use crate::relation::{type_tag_name, ColumnType};
use crate::storage_layout::metadata_catalog::FileMetadata;
use crate::utils::file_interaction_local_and_cloud::{get_object_store, write_path};

fn read_codec() -> Arc<dyn ChunkCodec> {
    Arc::new(CascadeCodec::default())
}

/// Ingests the CSV at `csv_path` and packs it into `out_dir`.
///
/// Columns are given in file order; a `skip`-typed (or unknown) declaration keeps the column's
/// position without storing it.
///
/// # Errors
///
/// Fails on malformed input (with row and column context), on an empty relation and on any
/// storage error. Nothing is written unless every column packs successfully, except part files
/// of columns that finished before another column failed.
///
/// # Examples
///
/// ```
/// # use chunkpack::column_ingest::ColumnSpec;
/// # use chunkpack::config::PackOptions;
/// # use chunkpack::utils::file_interaction_local_and_cloud::register_memory_file;
/// # use chunkpack::{csv_to_parts, get_file_metadata};
/// # tokio_test::block_on(async {
/// let csv = register_memory_file("docs/quick.csv", b"1,2.5\n,3.5\n3,null\n".to_vec()).await.unwrap();
/// let columns = vec![ColumnSpec::new("a", "integer"), ColumnSpec::new("b", "double")];
/// csv_to_parts(&csv, "memory://docs/quick", &columns, &PackOptions::default()).await.unwrap();
///
/// // [num_columns, num_chunks, type_0, parts_0, type_1, parts_1]
/// assert_eq!(get_file_metadata("memory://docs/quick").await.unwrap(), vec![2, 1, 0, 1, 1, 1]);
/// # });
/// ```
pub async fn csv_to_parts(
    csv_path: &str,
    out_dir: &str,
    columns: &[ColumnSpec],
    options: &PackOptions,
) -> Result<PackReport> {
    options.validate()?;
    let relation = ingest_csv(csv_path, columns, &options.csv).await?;
    let codec: Arc<dyn ChunkCodec> = Arc::new(CascadeCodec::new(options.codec));
    pack_relation(Arc::new(relation), out_dir, options, codec).await
}

/// Loads the catalog of the relation stored in `dir`.
pub async fn load_metadata(dir: &str) -> Result<FileMetadata> {
    let (store, root) = get_object_store(dir).await?;
    load_catalog(store.as_ref(), &root).await
}

/// Flat catalog view: `[num_columns, num_chunks, type_0, parts_0, type_1, parts_1, ...]`.
pub async fn get_file_metadata(dir: &str) -> Result<Vec<u32>> {
    Ok(load_metadata(dir).await?.to_flat())
}

/// Materializes column `column_index` of `dir` into `sink`, returning the row count.
pub async fn materialize_column(
    dir: &str,
    column_index: usize,
    sink: &mut (dyn ValueSink + Send),
) -> Result<u64> {
    let materializer = ColumnMaterializer::open(dir, column_index, read_codec()).await?;
    materializer.materialize(sink)
}

/// Decompresses an INTEGER column; nulls read as `0`.
///
/// Fails with [`ChunkpackError::TypeMismatch`] if the column holds another type.
pub async fn decompress_column_i32(dir: &str, column_index: usize) -> Result<Vec<i32>> {
    let mut sink = VecSink::<i32>::new();
    materialize_column(dir, column_index, &mut sink).await?;
    Ok(sink.into_values())
}

/// Decompresses a DOUBLE column; nulls read as `0.0`.
pub async fn decompress_column_f64(dir: &str, column_index: usize) -> Result<Vec<f64>> {
    let mut sink = VecSink::<f64>::new();
    materialize_column(dir, column_index, &mut sink).await?;
    Ok(sink.into_values())
}

/// Decompresses a STRING column; nulls read as `"null"`.
pub async fn decompress_column_string(dir: &str, column_index: usize) -> Result<Vec<String>> {
    let mut sink = VecSink::<String>::new();
    materialize_column(dir, column_index, &mut sink).await?;
    Ok(sink.into_values())
}

/// Decompresses a column into an Arrow array whose null buffer mirrors the stored bitmaps.
pub async fn decompress_column_to_arrow(dir: &str, column_index: usize) -> Result<ArrayRef> {
    let mut sink = ArrowSink::new();
    materialize_column(dir, column_index, &mut sink).await?;
    sink.into_array()
}

/// Writes column `column_index` to `output_path`, one value (or `null`) per line.
///
/// Returns the number of rows written.
pub async fn decompress_column_into_file(dir: &str, column_index: usize, output_path: &str) -> Result<u64> {
    let mut sink = TextSink::new(Vec::new());
    let rows = materialize_column(dir, column_index, &mut sink).await?;
    let bytes = write_path(output_path, sink.into_inner()).await?;
    info!("wrote column {} to {} ({} rows, {} bytes)", column_index, output_path, rows, bytes);
    Ok(rows)
}

/// Writes several columns concurrently to `output_dir/column<i>.txt`.
///
/// Every column runs to completion; failures are collected per column into
/// [`ChunkpackError::ColumnTasks`]. On success returns `(column_index, rows)` in request order.
pub async fn materialize_columns_into_files(
    dir: &str,
    column_indices: &[usize],
    output_dir: &str,
) -> Result<Vec<(usize, u64)>> {
    let mut tasks = JoinSet::new();
    let mut task_columns = HashMap::new();
    for &column_index in column_indices {
        let dir = dir.to_string();
        let output = format!("{}/column{}.txt", output_dir.trim_end_matches('/'), column_index);
        let handle = tasks.spawn(async move { decompress_column_into_file(&dir, column_index, &output).await });
        task_columns.insert(handle.id(), column_index);
    }

    let mut rows_by_column = HashMap::new();
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((id, Ok(rows))) => {
                if let Some(&column_index) = task_columns.get(&id) {
                    rows_by_column.insert(column_index, rows);
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
    Ok(column_indices
        .iter()
        .map(|i| (*i, rows_by_column.get(i).copied().unwrap_or_default()))
        .collect())
}

/// Summary of one stored column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub column_index: usize,
    pub type_name: String,
    pub num_parts: u32,
    /// Chunks held by each part, empty for columns that are not stored.
    pub part_chunk_counts: Vec<u32>,
    pub tuple_count: u64,
}

/// Catalog plus per-part detail of a stored relation.
#[derive(Debug, Clone)]
pub struct StoreDescription {
    pub metadata: FileMetadata,
    pub columns: Vec<ColumnDescription>,
}

impl fmt::Display for StoreDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} columns, {} chunks per column",
            self.metadata.num_columns(),
            self.metadata.num_chunks
        )?;
        for column in &self.columns {
            writeln!(
                f,
                "  column {:>3}  {:<8} parts={:<4} tuples={:<10} chunks/part={:?}",
                column.column_index, column.type_name, column.num_parts, column.tuple_count, column.part_chunk_counts
            )?;
        }
        Ok(())
    }
}

/// Opens the catalog and every part of `dir` and summarizes them.
///
/// Columns whose type cannot be read (SKIP or unknown tags) are listed without part detail.
pub async fn describe_store(dir: &str) -> Result<StoreDescription> {
    let (store, root) = get_object_store(dir).await?;
    let metadata = load_catalog(store.as_ref(), &root).await?;
    let codec = read_codec();

    let mut columns = Vec::with_capacity(metadata.num_columns());
    for (column_index, info) in metadata.parts.iter().enumerate() {
        let mut description = ColumnDescription {
            column_index,
            type_name: type_tag_name(info.type_tag),
            num_parts: info.num_parts,
            part_chunk_counts: Vec::new(),
            tuple_count: 0,
        };
        if matches!(info.column_type(), Ok(t) if t != ColumnType::Skip) {
            let materializer =
                ColumnMaterializer::open_with_catalog(store.as_ref(), &root, &metadata, column_index, Arc::clone(&codec))
                    .await?;
            description.part_chunk_counts = materializer.part_chunk_counts().to_vec();
            description.tuple_count = materializer.tuple_count();
        }
        columns.push(description);
    }
    Ok(StoreDescription { metadata, columns })
}
