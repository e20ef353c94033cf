//! Names of the files inside a packed relation directory.

/// Types of files in a packed relation directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFile {
    /// The catalog describing every column.
    Metadata,

    /// Part `part_index` of column `column_index`.
    ///
    /// Parts of a column are numbered from 0 without gaps; chunk order follows part order.
    Part { column_index: usize, part_index: u32 },
}

impl StoreFile {
    /// Returns the file name inside the relation directory.
    ///
    /// # Examples
    ///
    /// ```
    /// # use chunkpack::storage_layout::part_files::StoreFile;
    /// assert_eq!(StoreFile::Metadata.file_name(), "metadata");
    /// assert_eq!(StoreFile::Part { column_index: 3, part_index: 12 }.file_name(), "column3_part12");
    /// ```
    pub fn file_name(&self) -> String {
        match self {
            StoreFile::Metadata => "metadata".to_string(),
            StoreFile::Part {
                column_index,
                part_index,
            } => part_file_name(*column_index, *part_index),
        }
    }
}

pub fn part_file_name(column_index: usize, part_index: u32) -> String {
    format!("column{}_part{}", column_index, part_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_names_are_positional() {
        let names: Vec<String> = (0..3).map(|p| part_file_name(0, p)).collect();
        assert_eq!(names, vec!["column0_part0", "column0_part1", "column0_part2"]);
        assert_ne!(part_file_name(1, 10), part_file_name(11, 0));
    }
}
