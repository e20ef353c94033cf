//! Read-only views over decompressed chunk buffers.
//!
//! Decoded buffers use one of these layouts (all integers little-endian):
//!
//! ```text
//! INTEGER                     [i32; n]
//! DOUBLE                      [f64; n]
//! STRING, requires_copy=false [u32 offset; n + 1][utf-8 bytes]        (StringArrayViewer)
//! STRING, requires_copy=true  [(u32 offset, u32 len); n][utf-8 bytes] (StringPointerArrayViewer)
//! ```
//!
//! Pointer arrays come out of dictionary-style schemes where many rows share one string, so
//! the row's bytes have to be located through its slot before being copied out.

use crate::errors::{ChunkpackError, Result};

fn read_u32(buf: &[u8], at: usize) -> Result<u32> {
    buf.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| ChunkpackError::CorruptChunk(format!("u32 read at byte {} out of bounds", at)))
}

pub fn read_i32_slot(buf: &[u8], row: usize) -> Result<i32> {
    buf.get(row * 4..row * 4 + 4)
        .and_then(|b| b.try_into().ok())
        .map(i32::from_le_bytes)
        .ok_or_else(|| ChunkpackError::CorruptChunk(format!("integer slot {} out of bounds", row)))
}

pub fn read_f64_slot(buf: &[u8], row: usize) -> Result<f64> {
    buf.get(row * 8..row * 8 + 8)
        .and_then(|b| b.try_into().ok())
        .map(f64::from_le_bytes)
        .ok_or_else(|| ChunkpackError::CorruptChunk(format!("double slot {} out of bounds", row)))
}

fn utf8_at(data: &[u8], start: usize, end: usize, row: usize) -> Result<&str> {
    let bytes = data.get(start..end).ok_or_else(|| {
        ChunkpackError::CorruptChunk(format!("string {} spans {}..{} past the data section", row, start, end))
    })?;
    std::str::from_utf8(bytes)
        .map_err(|e| ChunkpackError::CorruptChunk(format!("string {} is not utf-8: {}", row, e)))
}

/// Offset-indexed string array: row `i` is `data[offsets[i]..offsets[i + 1]]`.
pub struct StringArrayViewer<'a> {
    buf: &'a [u8],
    count: usize,
    data_start: usize,
}

impl<'a> StringArrayViewer<'a> {
    pub fn new(buf: &'a [u8], count: usize) -> Result<Self> {
        let data_start = (count + 1) * 4;
        if buf.len() < data_start {
            return Err(ChunkpackError::CorruptChunk(format!(
                "string array of {} rows needs {} offset bytes, buffer has {}",
                count,
                data_start,
                buf.len()
            )));
        }
        Ok(Self { buf, count, data_start })
    }

    pub fn get(&self, row: usize) -> Result<&'a str> {
        if row >= self.count {
            return Err(ChunkpackError::CorruptChunk(format!("string row {} out of {}", row, self.count)));
        }
        let start = read_u32(self.buf, row * 4)? as usize;
        let end = read_u32(self.buf, (row + 1) * 4)? as usize;
        if end < start {
            return Err(ChunkpackError::CorruptChunk(format!("string {} has decreasing offsets", row)));
        }
        utf8_at(&self.buf[self.data_start..], start, end, row)
    }
}

/// Slot-indexed string array: row `i` is `data[offset_i..offset_i + len_i]`.
pub struct StringPointerArrayViewer<'a> {
    buf: &'a [u8],
    count: usize,
    data_start: usize,
}

impl<'a> StringPointerArrayViewer<'a> {
    pub fn new(buf: &'a [u8], count: usize) -> Result<Self> {
        let data_start = count * 8;
        if buf.len() < data_start {
            return Err(ChunkpackError::CorruptChunk(format!(
                "string pointer array of {} rows needs {} slot bytes, buffer has {}",
                count,
                data_start,
                buf.len()
            )));
        }
        Ok(Self { buf, count, data_start })
    }

    pub fn get(&self, row: usize) -> Result<&'a str> {
        if row >= self.count {
            return Err(ChunkpackError::CorruptChunk(format!("string row {} out of {}", row, self.count)));
        }
        let offset = read_u32(self.buf, row * 8)? as usize;
        let len = read_u32(self.buf, row * 8 + 4)? as usize;
        utf8_at(&self.buf[self.data_start..], offset, offset + len, row)
    }
}

/// Either string layout, selected by the `requires_copy` flag returned from decompression.
pub enum StringViewer<'a> {
    Array(StringArrayViewer<'a>),
    Pointers(StringPointerArrayViewer<'a>),
}

impl<'a> StringViewer<'a> {
    pub fn new(buf: &'a [u8], count: usize, requires_copy: bool) -> Result<Self> {
        if requires_copy {
            Ok(StringViewer::Pointers(StringPointerArrayViewer::new(buf, count)?))
        } else {
            Ok(StringViewer::Array(StringArrayViewer::new(buf, count)?))
        }
    }

    pub fn get(&self, row: usize) -> Result<&'a str> {
        match self {
            StringViewer::Array(v) => v.get(row),
            StringViewer::Pointers(v) => v.get(row),
        }
    }
}
