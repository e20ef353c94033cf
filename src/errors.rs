//! Error type shared by the ingestion, packing and materialization pipelines.
//!
//! Every fatal condition carries enough context (row, column, part or path) to pinpoint the
//! cause. Nothing is retried or swallowed internally.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChunkpackError>;

/// Failure of a single column task when several columns run concurrently.
#[derive(Debug)]
pub struct ColumnFailure {
    pub column_index: usize,
    pub error: ChunkpackError,
}

#[derive(Debug, Error)]
pub enum ChunkpackError {
    #[error(
        "failed to parse row {row}, column {column} (name = '{column_name}', type = {column_type}) with field '{field}': {reason}"
    )]
    MalformedField {
        row: u64,
        column: usize,
        column_name: String,
        column_type: String,
        field: String,
        reason: String,
    },

    #[error("row {row} has {actual} fields but {expected} columns were declared")]
    FieldCountMismatch { row: u64, expected: usize, actual: usize },

    #[error("relation produced no chunk ranges (tuple_count = {tuple_count}, chunk_rows = {chunk_rows})")]
    EmptyRelation { tuple_count: u64, chunk_rows: u64 },

    #[error("column '{column_name}' has {actual} values but the relation has {expected} tuples")]
    ColumnLengthMismatch {
        column_name: String,
        expected: u64,
        actual: u64,
    },

    #[error("column index: {column_index} does not exist (catalog has {num_columns} columns)")]
    ColumnOutOfRange { column_index: usize, num_columns: usize },

    #[error("metadata at '{path}' is malformed: {reason}")]
    MalformedMetadata { path: String, reason: String },

    #[error("part file '{path}' for column {column_index} is unreadable: {reason}")]
    BadPart {
        column_index: usize,
        path: String,
        reason: String,
    },

    #[error(
        "column {column_index}: chunk {chunk_index} lies past the last part (parts = {num_parts})"
    )]
    CursorOutOfBounds {
        column_index: usize,
        chunk_index: u32,
        num_parts: usize,
    },

    #[error("Type {type_name} not supported")]
    UnsupportedType { type_name: String },

    #[error("Requested column type '{requested}' does not match stored type '{stored}'")]
    TypeMismatch { requested: String, stored: String },

    #[error("corrupt chunk: {0}")]
    CorruptChunk(String),

    #[error("chunk verification failed for column {column_index}, chunk {chunk_index}: {reason}")]
    VerificationFailed {
        column_index: usize,
        chunk_index: usize,
        reason: String,
    },

    #[error("{} column task(s) failed: {}", .0.len(), describe_failures(.0))]
    ColumnTasks(Vec<ColumnFailure>),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid store path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Rkyv(#[from] rkyv::rancor::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("column task panicked or was cancelled: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn describe_failures(failures: &[ColumnFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[column {}] {}", f.column_index, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}
