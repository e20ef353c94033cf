//! In-memory relation model: typed columns with validity bitmaps.
//!
//! A [`Relation`] is what the CSV ingestor produces and what the part packer consumes.
//! Every column holds exactly `tuple_count` slots; null slots hold a type sentinel and a
//! cleared validity bit. Callers must consult the validity bit, never the sentinel.

use std::fmt;

use crate::errors::{ChunkpackError, Result};
use crate::utils::bit_vec::BitVec;

/// Sentinel stored in INTEGER value slots whose validity bit is 0.
pub const INTEGER_NULL_CODE: i32 = i32::MIN;

/// Sentinel stored in DOUBLE value slots whose validity bit is 0.
pub const DOUBLE_NULL_CODE: f64 = INTEGER_NULL_CODE as f64;

/// Storage type of a column.
///
/// The numeric tag is what the metadata catalog and the chunk headers persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    Double,
    String,
    /// Column present in the input but not stored; keeps ordinal positions stable.
    Skip,
}

impl ColumnType {
    pub fn tag(self) -> u32 {
        match self {
            ColumnType::Integer => 0,
            ColumnType::Double => 1,
            ColumnType::String => 2,
            ColumnType::Skip => 3,
        }
    }

    pub fn from_tag(tag: u32) -> Option<ColumnType> {
        match tag {
            0 => Some(ColumnType::Integer),
            1 => Some(ColumnType::Double),
            2 => Some(ColumnType::String),
            3 => Some(ColumnType::Skip),
            _ => None,
        }
    }

    /// Normalizes a declared CSV column type.
    ///
    /// `smallint` is stored as INTEGER and `float` as DOUBLE. Unknown declarations are SKIP.
    pub fn from_declared(declared: &str) -> ColumnType {
        match declared.trim().to_ascii_lowercase().as_str() {
            "integer" | "smallint" => ColumnType::Integer,
            "double" | "float" => ColumnType::Double,
            "string" => ColumnType::String,
            _ => ColumnType::Skip,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Double => "DOUBLE",
            ColumnType::String => "STRING",
            ColumnType::Skip => "SKIP",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Human readable name for a raw type tag, including tags this build does not know.
pub fn type_tag_name(tag: u32) -> String {
    match ColumnType::from_tag(tag) {
        Some(t) => t.name().to_string(),
        None => format!("UNKNOWN({})", tag),
    }
}

/// Diagnostic counters gathered during ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnStats {
    /// Fields that were unset (`null`, or empty for numeric columns).
    pub null_count: u64,
    /// Present fields whose parsed value is empty: zero for numbers, `""` for strings.
    pub empty_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Integer(Vec<i32>),
    Double(Vec<f64>),
    String(Vec<String>),
    Skip,
}

impl ColumnData {
    fn len(&self) -> Option<usize> {
        match self {
            ColumnData::Integer(v) => Some(v.len()),
            ColumnData::Double(v) => Some(v.len()),
            ColumnData::String(v) => Some(v.len()),
            ColumnData::Skip => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
    pub validity: BitVec,
    pub stats: ColumnStats,
}

impl Column {
    pub fn column_type(&self) -> ColumnType {
        match self.data {
            ColumnData::Integer(_) => ColumnType::Integer,
            ColumnData::Double(_) => ColumnType::Double,
            ColumnData::String(_) => ColumnType::String,
            ColumnData::Skip => ColumnType::Skip,
        }
    }

    /// Builds a fully present integer column.
    pub fn from_integers(name: &str, values: Vec<i32>) -> Column {
        let validity = values.iter().map(|_| true).collect();
        Column::with_validity(name, ColumnData::Integer(values), validity)
    }

    /// Builds a fully present double column.
    pub fn from_doubles(name: &str, values: Vec<f64>) -> Column {
        let validity = values.iter().map(|_| true).collect();
        Column::with_validity(name, ColumnData::Double(values), validity)
    }

    /// Builds a string column where `None` marks a null row.
    pub fn from_optional_strings(name: &str, values: Vec<Option<String>>) -> Column {
        let validity = values.iter().map(Option::is_some).collect();
        let data = values.into_iter().map(|v| v.unwrap_or_default()).collect();
        Column::with_validity(name, ColumnData::String(data), validity)
    }

    pub fn skip(name: &str) -> Column {
        Column::with_validity(name, ColumnData::Skip, BitVec::new())
    }

    /// Builds a column from values plus an explicit validity bitmap, recomputing stats.
    pub fn with_validity(name: &str, data: ColumnData, validity: BitVec) -> Column {
        let null_count = (validity.len() - validity.count_ones()) as u64;
        let empty_count = match &data {
            ColumnData::Integer(v) => v
                .iter()
                .zip(validity.iter())
                .filter(|(x, valid)| *valid && **x == 0)
                .count(),
            ColumnData::Double(v) => v
                .iter()
                .zip(validity.iter())
                .filter(|(x, valid)| *valid && **x == 0.0)
                .count(),
            ColumnData::String(v) => v
                .iter()
                .zip(validity.iter())
                .filter(|(x, valid)| *valid && x.is_empty())
                .count(),
            ColumnData::Skip => 0,
        } as u64;
        Column {
            name: name.to_string(),
            data,
            validity,
            stats: ColumnStats {
                null_count,
                empty_count,
            },
        }
    }

    /// Uncompressed size of the rows in `range`, used for compression statistics.
    pub fn size_bytes(&self, range: Range) -> usize {
        let rows = range.len();
        match &self.data {
            ColumnData::Integer(_) => rows * std::mem::size_of::<i32>(),
            ColumnData::Double(_) => rows * std::mem::size_of::<f64>(),
            ColumnData::String(v) => v[range.start..range.end]
                .iter()
                .map(|s| s.len() + std::mem::size_of::<u32>())
                .sum(),
            ColumnData::Skip => 0,
        }
    }
}

/// Half-open row interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: usize,
    pub end: usize,
}

impl Range {
    pub fn new(start: usize, end: usize) -> Range {
        Range { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Borrowed view of one column's values over one [`Range`]; the unit handed to the codec.
#[derive(Debug, Clone)]
pub struct InputChunk<'a> {
    pub values: InputValues<'a>,
    pub validity: BitVec,
}

#[derive(Debug, Clone, Copy)]
pub enum InputValues<'a> {
    Integer(&'a [i32]),
    Double(&'a [f64]),
    String(&'a [String]),
}

impl InputChunk<'_> {
    pub fn column_type(&self) -> ColumnType {
        match self.values {
            InputValues::Integer(_) => ColumnType::Integer,
            InputValues::Double(_) => ColumnType::Double,
            InputValues::String(_) => ColumnType::String,
        }
    }

    pub fn tuple_count(&self) -> usize {
        match self.values {
            InputValues::Integer(v) => v.len(),
            InputValues::Double(v) => v.len(),
            InputValues::String(v) => v.len(),
        }
    }
}

/// Ordered columns sharing one tuple count.
#[derive(Debug, Clone, Default)]
pub struct Relation {
    pub columns: Vec<Column>,
    pub tuple_count: u64,
}

impl Relation {
    pub fn new() -> Relation {
        Relation::default()
    }

    /// Appends a column. The first data column fixes `tuple_count`; later ones must match it.
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        if let Some(len) = column.data.len() {
            let has_data_column = self
                .columns
                .iter()
                .any(|c| c.column_type() != ColumnType::Skip);
            if !has_data_column {
                self.tuple_count = len as u64;
            } else if len as u64 != self.tuple_count {
                return Err(ChunkpackError::ColumnLengthMismatch {
                    column_name: column.name,
                    expected: self.tuple_count,
                    actual: len as u64,
                });
            }
            if column.validity.len() != len {
                return Err(ChunkpackError::ColumnLengthMismatch {
                    column_name: format!("{} (validity)", column.name),
                    expected: len as u64,
                    actual: column.validity.len() as u64,
                });
            }
        }
        self.columns.push(column);
        Ok(())
    }

    /// Cuts the input chunk for `column_index` over `range`.
    ///
    /// Returns `None` for SKIP columns, which have no data to chunk.
    pub fn input_chunk(&self, range: Range, column_index: usize) -> Option<InputChunk<'_>> {
        let column = self.columns.get(column_index)?;
        let values = match &column.data {
            ColumnData::Integer(v) => InputValues::Integer(&v[range.start..range.end]),
            ColumnData::Double(v) => InputValues::Double(&v[range.start..range.end]),
            ColumnData::String(v) => InputValues::String(&v[range.start..range.end]),
            ColumnData::Skip => return None,
        };
        Some(InputChunk {
            values,
            validity: column.validity.slice(range.start, range.end),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_types_are_normalized() {
        assert_eq!(ColumnType::from_declared("smallint"), ColumnType::Integer);
        assert_eq!(ColumnType::from_declared("float"), ColumnType::Double);
        assert_eq!(ColumnType::from_declared("string"), ColumnType::String);
        assert_eq!(ColumnType::from_declared("date"), ColumnType::Skip);
    }

    #[test]
    fn test_add_column_rejects_length_mismatch() {
        let mut relation = Relation::new();
        relation.add_column(Column::from_integers("a", vec![1, 2, 3])).unwrap();
        relation.add_column(Column::skip("ignored")).unwrap();
        let err = relation
            .add_column(Column::from_doubles("b", vec![1.0]))
            .unwrap_err();
        assert!(matches!(err, ChunkpackError::ColumnLengthMismatch { expected: 3, actual: 1, .. }));
        assert_eq!(relation.tuple_count, 3);
        assert_eq!(relation.columns.len(), 2);
    }

    #[test]
    fn test_input_chunk_slices_values_and_validity() {
        let mut relation = Relation::new();
        relation
            .add_column(Column::from_optional_strings(
                "s",
                vec![Some("x".into()), None, Some("".into()), Some("z".into())],
            ))
            .unwrap();
        relation.add_column(Column::skip("gap")).unwrap();

        let chunk = relation.input_chunk(Range::new(1, 3), 0).unwrap();
        assert_eq!(chunk.tuple_count(), 2);
        assert_eq!(chunk.validity.iter().collect::<Vec<_>>(), vec![false, true]);
        assert!(relation.input_chunk(Range::new(0, 1), 1).is_none());

        let stats = relation.columns[0].stats;
        assert_eq!(stats.null_count, 1);
        assert_eq!(stats.empty_count, 1);
    }
}
