//! CSV ingestion into a typed [`Relation`].
//!
//! Field rules:
//!
//! * INTEGER / DOUBLE fields are whitespace-trimmed; an empty field or `null` is unset.
//! * STRING fields are taken verbatim; only the exact text `null` is unset, so an empty
//!   string stays a present, empty value.
//! * SKIP fields are read and discarded.
//!
//! Unset fields clear the row's validity bit and store the type's null sentinel.

use tracing::{debug, info};

use crate::config::CsvOptions;
use crate::errors::{ChunkpackError, Result};
use crate::relation::{Column, ColumnData, ColumnType, Relation, DOUBLE_NULL_CODE, INTEGER_NULL_CODE};
use crate::utils::bit_vec::BitVec;
use crate::utils::file_interaction_local_and_cloud::read_path;

/// Literal marking an unset field.
pub const NULL_LITERAL: &str = "null";

/// Name and storage type of one CSV column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSpec {
    /// Builds a spec from a declared type such as `integer`, `smallint`, `float` or `string`.
    pub fn new(name: &str, declared_type: &str) -> Self {
        Self {
            name: name.to_string(),
            column_type: ColumnType::from_declared(declared_type),
        }
    }

    /// Parses `name:type`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use chunkpack::column_ingest::ColumnSpec;
    /// # use chunkpack::relation::ColumnType;
    /// let spec = ColumnSpec::parse("price:float").unwrap();
    /// assert_eq!(spec.name, "price");
    /// assert_eq!(spec.column_type, ColumnType::Double);
    /// assert!(ColumnSpec::parse("no_type").is_err());
    /// ```
    pub fn parse(spec: &str) -> Result<Self> {
        let (name, declared) = spec.rsplit_once(':').ok_or_else(|| {
            ChunkpackError::InvalidConfig(format!("column '{}' is not of the form name:type", spec))
        })?;
        Ok(Self::new(name, declared))
    }
}

enum ColumnBuilder {
    Integer(Vec<i32>, BitVec),
    Double(Vec<f64>, BitVec),
    String(Vec<String>, BitVec),
    Skip,
}

impl ColumnBuilder {
    fn new(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Integer => ColumnBuilder::Integer(Vec::new(), BitVec::new()),
            ColumnType::Double => ColumnBuilder::Double(Vec::new(), BitVec::new()),
            ColumnType::String => ColumnBuilder::String(Vec::new(), BitVec::new()),
            ColumnType::Skip => ColumnBuilder::Skip,
        }
    }

    /// Appends one field; `Err` carries the parse failure reason.
    fn push(&mut self, field: &str, row: u64, column: usize) -> std::result::Result<(), String> {
        match self {
            ColumnBuilder::Integer(values, validity) => match numeric_field(field, row, column) {
                None => {
                    values.push(INTEGER_NULL_CODE);
                    validity.push(false);
                }
                Some(text) => {
                    values.push(text.parse::<i32>().map_err(|e| e.to_string())?);
                    validity.push(true);
                }
            },
            ColumnBuilder::Double(values, validity) => match numeric_field(field, row, column) {
                None => {
                    values.push(DOUBLE_NULL_CODE);
                    validity.push(false);
                }
                Some(text) => {
                    values.push(text.parse::<f64>().map_err(|e| e.to_string())?);
                    validity.push(true);
                }
            },
            ColumnBuilder::String(values, validity) => {
                if field == NULL_LITERAL {
                    values.push(String::new());
                    validity.push(false);
                } else {
                    values.push(field.to_string());
                    validity.push(true);
                }
            }
            ColumnBuilder::Skip => {}
        }
        Ok(())
    }

    fn finish(self, name: &str) -> Column {
        match self {
            ColumnBuilder::Integer(values, validity) => {
                Column::with_validity(name, ColumnData::Integer(values), validity)
            }
            ColumnBuilder::Double(values, validity) => {
                Column::with_validity(name, ColumnData::Double(values), validity)
            }
            ColumnBuilder::String(values, validity) => {
                Column::with_validity(name, ColumnData::String(values), validity)
            }
            ColumnBuilder::Skip => Column::skip(name),
        }
    }
}

/// Trims a numeric field, returning `None` when it is unset.
fn numeric_field(field: &str, row: u64, column: usize) -> Option<&str> {
    let trimmed = field.trim();
    if trimmed.len() != field.len() {
        debug!("trimmed whitespace from row {}, column {}: '{}'", row, column, field);
    }
    if trimmed.is_empty() || trimmed == NULL_LITERAL {
        None
    } else {
        Some(trimmed)
    }
}

/// Appends one record to the column builders.
fn push_record(
    builders: &mut [ColumnBuilder],
    columns: &[ColumnSpec],
    record: &csv::StringRecord,
    row: u64,
) -> Result<()> {
    if record.len() != columns.len() {
        return Err(ChunkpackError::FieldCountMismatch {
            row,
            expected: columns.len(),
            actual: record.len(),
        });
    }
    for (column, (field, builder)) in record.iter().zip(builders.iter_mut()).enumerate() {
        builder.push(field, row, column).map_err(|reason| ChunkpackError::MalformedField {
            row,
            column,
            column_name: columns[column].name.clone(),
            column_type: columns[column].column_type.name().to_string(),
            field: field.to_string(),
            reason,
        })?;
    }
    Ok(())
}

/// Counts the empty lines at the start of `gap`, the bytes the reader consumed before a record.
///
/// `\r\n`, `\r` and `\n` each end one line. When the previous record ended on `\r`, a leading
/// `\n` completes that terminator rather than an empty line.
fn blank_lines(gap: &[u8], after_cr: bool) -> usize {
    let mut i = usize::from(after_cr && gap.first() == Some(&b'\n'));
    let mut lines = 0;
    while i < gap.len() {
        match gap[i] {
            b'\r' => {
                if gap.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            }
            b'\n' => {}
            _ => break,
        }
        lines += 1;
        i += 1;
    }
    lines
}

/// Parses CSV text into a relation with one column per spec.
///
/// # Errors
///
/// * [`ChunkpackError::MalformedField`] when a numeric field does not parse (row, column,
///   column name and the raw field are reported)
/// * [`ChunkpackError::FieldCountMismatch`] when a record has the wrong number of fields; an
///   empty line counts as a record with one empty field
/// * [`ChunkpackError::Csv`] for tokenizer errors such as invalid UTF-8
///
/// # Examples
///
/// ```
/// # use chunkpack::column_ingest::{ingest_csv_bytes, ColumnSpec};
/// # use chunkpack::config::CsvOptions;
/// let specs = vec![ColumnSpec::new("a", "integer"), ColumnSpec::new("b", "double")];
/// let relation = ingest_csv_bytes(b"1,2.5\n,3.5\n3,null\n", &specs, &CsvOptions::default()).unwrap();
/// assert_eq!(relation.tuple_count, 3);
/// assert_eq!(relation.columns[0].stats.null_count, 1);
/// assert_eq!(relation.columns[1].stats.null_count, 1);
/// ```
pub fn ingest_csv_bytes(bytes: &[u8], columns: &[ColumnSpec], options: &CsvOptions) -> Result<Relation> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(options.has_header)
        .flexible(true)
        .from_reader(bytes);

    let mut builders: Vec<ColumnBuilder> = columns.iter().map(|c| ColumnBuilder::new(c.column_type)).collect();
    let mut consumed = if options.has_header {
        reader.byte_headers()?;
        reader.position().byte() as usize
    } else {
        0
    };

    // The tokenizer drops empty lines; each one is still a row holding a single empty field.
    let blank = csv::StringRecord::from(vec![""]);
    let mut row: u64 = 0;
    let mut record = csv::StringRecord::new();
    loop {
        let more = reader.read_record(&mut record)?;
        let end = (reader.position().byte() as usize).min(bytes.len());
        let after_cr = consumed > 0 && bytes.get(consumed - 1) == Some(&b'\r');
        for _ in 0..blank_lines(&bytes[consumed.min(end)..end], after_cr) {
            push_record(&mut builders, columns, &blank, row)?;
            row += 1;
        }
        if !more {
            break;
        }
        push_record(&mut builders, columns, &record, row)?;
        row += 1;
        consumed = end;
    }

    let mut relation = Relation::new();
    for (builder, spec) in builders.into_iter().zip(columns) {
        relation.add_column(builder.finish(&spec.name))?;
    }
    if columns.iter().all(|c| c.column_type == ColumnType::Skip) {
        relation.tuple_count = row;
    }
    for column in &relation.columns {
        debug!(
            "column '{}' ({}): {} nulls, {} empty",
            column.name,
            column.column_type(),
            column.stats.null_count,
            column.stats.empty_count
        );
    }
    Ok(relation)
}

/// Reads the CSV at `path` (local, `s3://` or `memory://`) and ingests it.
///
/// Parsing runs on a blocking thread.
pub async fn ingest_csv(path: &str, columns: &[ColumnSpec], options: &CsvOptions) -> Result<Relation> {
    let bytes = read_path(path).await?;
    info!("ingesting {} bytes of CSV from {}", bytes.len(), path);

    let columns = columns.to_vec();
    let options = options.clone();
    let relation = tokio::task::spawn_blocking(move || ingest_csv_bytes(&bytes, &columns, &options)).await??;
    info!(
        "ingested {} tuples across {} columns",
        relation.tuple_count,
        relation.columns.len()
    );
    Ok(relation)
}
