//! Destinations for materialized column values.
//!
//! Null conventions differ per sink:
//!
//! | sink           | INTEGER null | DOUBLE null | STRING null |
//! |----------------|--------------|-------------|-------------|
//! | [`TextSink`]   | `null`       | `null`      | `null`      |
//! | [`VecSink`]    | `0`          | `0.0`       | `"null"`    |
//! | [`ArrowSink`]  | null slot    | null slot   | null slot   |

use std::io::Write;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Builder, Int32Builder, StringBuilder};

use crate::errors::{ChunkpackError, Result};
use crate::relation::ColumnType;

/// Receives the values of one column in row order.
pub trait ValueSink {
    /// Called once before the first value. Typed sinks reject columns of another type here.
    fn begin_column(&mut self, column_type: ColumnType, tuple_count: u64) -> Result<()>;

    fn push_integer(&mut self, value: i32) -> Result<()>;

    fn push_double(&mut self, value: f64) -> Result<()>;

    fn push_string(&mut self, value: &str) -> Result<()>;

    fn push_null(&mut self) -> Result<()>;

    /// Called once after the last value.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes one value per line; nulls are written as `null`.
pub struct TextSink<W: Write> {
    writer: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ValueSink for TextSink<W> {
    fn begin_column(&mut self, _column_type: ColumnType, _tuple_count: u64) -> Result<()> {
        Ok(())
    }

    fn push_integer(&mut self, value: i32) -> Result<()> {
        writeln!(self.writer, "{}", value)?;
        Ok(())
    }

    fn push_double(&mut self, value: f64) -> Result<()> {
        writeln!(self.writer, "{}", value)?;
        Ok(())
    }

    fn push_string(&mut self, value: &str) -> Result<()> {
        writeln!(self.writer, "{}", value)?;
        Ok(())
    }

    fn push_null(&mut self) -> Result<()> {
        writeln!(self.writer, "null")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects values of a single type into a vector.
#[derive(Debug, Default)]
pub struct VecSink<T> {
    pub values: Vec<T>,
}

impl<T> VecSink<T> {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    pub fn into_values(self) -> Vec<T> {
        self.values
    }
}

fn mismatch(requested: ColumnType, stored: ColumnType) -> ChunkpackError {
    ChunkpackError::TypeMismatch {
        requested: requested.name().to_string(),
        stored: stored.name().to_string(),
    }
}

fn check_type(requested: ColumnType, stored: ColumnType) -> Result<()> {
    if requested == stored {
        Ok(())
    } else {
        Err(mismatch(requested, stored))
    }
}

impl ValueSink for VecSink<i32> {
    fn begin_column(&mut self, column_type: ColumnType, tuple_count: u64) -> Result<()> {
        check_type(ColumnType::Integer, column_type)?;
        self.values.reserve(tuple_count as usize);
        Ok(())
    }

    fn push_integer(&mut self, value: i32) -> Result<()> {
        self.values.push(value);
        Ok(())
    }

    fn push_double(&mut self, _value: f64) -> Result<()> {
        Err(mismatch(ColumnType::Integer, ColumnType::Double))
    }

    fn push_string(&mut self, _value: &str) -> Result<()> {
        Err(mismatch(ColumnType::Integer, ColumnType::String))
    }

    fn push_null(&mut self) -> Result<()> {
        self.values.push(0);
        Ok(())
    }
}

impl ValueSink for VecSink<f64> {
    fn begin_column(&mut self, column_type: ColumnType, tuple_count: u64) -> Result<()> {
        check_type(ColumnType::Double, column_type)?;
        self.values.reserve(tuple_count as usize);
        Ok(())
    }

    fn push_integer(&mut self, _value: i32) -> Result<()> {
        Err(mismatch(ColumnType::Double, ColumnType::Integer))
    }

    fn push_double(&mut self, value: f64) -> Result<()> {
        self.values.push(value);
        Ok(())
    }

    fn push_string(&mut self, _value: &str) -> Result<()> {
        Err(mismatch(ColumnType::Double, ColumnType::String))
    }

    fn push_null(&mut self) -> Result<()> {
        self.values.push(0.0);
        Ok(())
    }
}

impl ValueSink for VecSink<String> {
    fn begin_column(&mut self, column_type: ColumnType, tuple_count: u64) -> Result<()> {
        check_type(ColumnType::String, column_type)?;
        self.values.reserve(tuple_count as usize);
        Ok(())
    }

    fn push_integer(&mut self, _value: i32) -> Result<()> {
        Err(mismatch(ColumnType::String, ColumnType::Integer))
    }

    fn push_double(&mut self, _value: f64) -> Result<()> {
        Err(mismatch(ColumnType::String, ColumnType::Double))
    }

    fn push_string(&mut self, value: &str) -> Result<()> {
        self.values.push(value.to_string());
        Ok(())
    }

    fn push_null(&mut self) -> Result<()> {
        self.values.push("null".to_string());
        Ok(())
    }
}

enum ArrowBuilder {
    Integer(Int32Builder),
    Double(Float64Builder),
    String(StringBuilder),
}

impl ArrowBuilder {
    fn column_type(&self) -> ColumnType {
        match self {
            ArrowBuilder::Integer(_) => ColumnType::Integer,
            ArrowBuilder::Double(_) => ColumnType::Double,
            ArrowBuilder::String(_) => ColumnType::String,
        }
    }
}

/// Builds an Arrow array with a real null buffer.
#[derive(Default)]
pub struct ArrowSink {
    builder: Option<ArrowBuilder>,
}

impl ArrowSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn builder(&mut self) -> Result<&mut ArrowBuilder> {
        self.builder
            .as_mut()
            .ok_or_else(|| ChunkpackError::InvalidConfig("ArrowSink used before begin_column".to_string()))
    }

    /// Finishes the array. Fails if no column was materialized into this sink.
    pub fn into_array(self) -> Result<ArrayRef> {
        let array: ArrayRef = match self.builder {
            Some(ArrowBuilder::Integer(mut b)) => Arc::new(b.finish()),
            Some(ArrowBuilder::Double(mut b)) => Arc::new(b.finish()),
            Some(ArrowBuilder::String(mut b)) => Arc::new(b.finish()),
            None => {
                return Err(ChunkpackError::InvalidConfig(
                    "ArrowSink finished before begin_column".to_string(),
                ));
            }
        };
        Ok(array)
    }
}

impl ValueSink for ArrowSink {
    fn begin_column(&mut self, column_type: ColumnType, tuple_count: u64) -> Result<()> {
        let capacity = tuple_count as usize;
        self.builder = Some(match column_type {
            ColumnType::Integer => ArrowBuilder::Integer(Int32Builder::with_capacity(capacity)),
            ColumnType::Double => ArrowBuilder::Double(Float64Builder::with_capacity(capacity)),
            ColumnType::String => ArrowBuilder::String(StringBuilder::with_capacity(capacity, capacity * 8)),
            ColumnType::Skip => {
                return Err(ChunkpackError::UnsupportedType {
                    type_name: column_type.name().to_string(),
                });
            }
        });
        Ok(())
    }

    fn push_integer(&mut self, value: i32) -> Result<()> {
        match self.builder()? {
            ArrowBuilder::Integer(b) => b.append_value(value),
            other => return Err(mismatch(ColumnType::Integer, other.column_type())),
        }
        Ok(())
    }

    fn push_double(&mut self, value: f64) -> Result<()> {
        match self.builder()? {
            ArrowBuilder::Double(b) => b.append_value(value),
            other => return Err(mismatch(ColumnType::Double, other.column_type())),
        }
        Ok(())
    }

    fn push_string(&mut self, value: &str) -> Result<()> {
        match self.builder()? {
            ArrowBuilder::String(b) => b.append_value(value),
            other => return Err(mismatch(ColumnType::String, other.column_type())),
        }
        Ok(())
    }

    fn push_null(&mut self) -> Result<()> {
        match self.builder()? {
            ArrowBuilder::Integer(b) => b.append_null(),
            ArrowBuilder::Double(b) => b.append_null(),
            ArrowBuilder::String(b) => b.append_null(),
        }
        Ok(())
    }
}
