//! Explicit configuration threaded into the packing entry points.

use crate::errors::{ChunkpackError, Result};

/// Rows per chunk used by the sequential split strategy unless configured otherwise.
pub const DEFAULT_CHUNK_ROWS: usize = 9999;

/// Byte budget of a single part file (16 MiB).
pub const DEFAULT_PART_MAX_BYTES: usize = 16 * 1024 * 1024;

/// Maximum number of scheme layers the codec may stack on a chunk.
pub const DEFAULT_MAX_CASCADE_DEPTH: u32 = 3;

#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: u8,
    /// Skip the first record instead of ingesting it.
    pub has_header: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// 0 stores chunks uncompressed, 1 allows one scheme, 2+ lets a scheme be followed by LZ4.
    pub max_cascade_depth: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PackOptions {
    pub chunk_rows: usize,
    pub part_max_bytes: usize,
    pub csv: CsvOptions,
    pub codec: CodecConfig,
    /// Decompress every chunk right after compressing it and compare with the input.
    pub verify_chunks: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            chunk_rows: DEFAULT_CHUNK_ROWS,
            part_max_bytes: DEFAULT_PART_MAX_BYTES,
            csv: CsvOptions::default(),
            codec: CodecConfig::default(),
            verify_chunks: false,
        }
    }
}

impl PackOptions {
    pub fn with_chunk_rows(mut self, chunk_rows: usize) -> Self {
        self.chunk_rows = chunk_rows;
        self
    }

    pub fn with_part_max_bytes(mut self, part_max_bytes: usize) -> Self {
        self.part_max_bytes = part_max_bytes;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.csv.delimiter = delimiter;
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.csv.has_header = has_header;
        self
    }

    pub fn with_max_cascade_depth(mut self, depth: u32) -> Self {
        self.codec.max_cascade_depth = depth;
        self
    }

    pub fn with_verify_chunks(mut self, verify: bool) -> Self {
        self.verify_chunks = verify;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_rows == 0 {
            return Err(ChunkpackError::InvalidConfig(
                "chunk_rows must be at least 1".to_string(),
            ));
        }
        if u32::try_from(self.chunk_rows).is_err() {
            return Err(ChunkpackError::InvalidConfig(format!(
                "chunk_rows must be at most {}, got {}",
                u32::MAX,
                self.chunk_rows
            )));
        }
        if self.part_max_bytes == 0 {
            return Err(ChunkpackError::InvalidConfig(
                "part_max_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = PackOptions::default();
        assert_eq!(options.chunk_rows, DEFAULT_CHUNK_ROWS);
        assert_eq!(options.csv.delimiter, b',');
        options.validate().unwrap();
    }

    #[test]
    fn test_chunk_rows_bounds() {
        assert!(matches!(
            PackOptions::default().with_chunk_rows(0).validate(),
            Err(ChunkpackError::InvalidConfig(_))
        ));
        PackOptions::default().with_chunk_rows(u32::MAX as usize).validate().unwrap();
        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            PackOptions::default().with_chunk_rows(u32::MAX as usize + 1).validate(),
            Err(ChunkpackError::InvalidConfig(_))
        ));
        assert!(PackOptions::default().with_part_max_bytes(0).validate().is_err());
    }
}
