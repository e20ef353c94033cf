//! Row-range partitioning shared by every column of a relation.
//!
//! Chunk `i` covers the same rows in all columns, which is what allows the catalog to store a
//! single `num_chunks` for the whole relation.

use crate::errors::{ChunkpackError, Result};
use crate::relation::{Range, Relation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStrategy {
    /// Consecutive ranges of at most `chunk_rows` rows, in row order.
    Sequential,
}

/// Computes the ordered ranges covering `[0, tuple_count)`.
///
/// Returns [`ChunkpackError::EmptyRelation`] when no range would be produced.
pub fn ranges(relation: &Relation, strategy: SplitStrategy, chunk_rows: usize) -> Result<Vec<Range>> {
    let tuple_count = relation.tuple_count as usize;
    if tuple_count == 0 || chunk_rows == 0 {
        return Err(ChunkpackError::EmptyRelation {
            tuple_count: relation.tuple_count,
            chunk_rows: chunk_rows as u64,
        });
    }

    match strategy {
        SplitStrategy::Sequential => Ok((0..tuple_count)
            .step_by(chunk_rows)
            .map(|start| Range::new(start, (start + chunk_rows).min(tuple_count)))
            .collect()),
    }
}
