//! On-disk layout of a packed relation.
//!
//! ```text
//! out_dir/
//! ├── metadata          # catalog: column types, part counts, chunk count
//! ├── column0_part0     # compressed chunks of column 0, in row order
//! ├── column0_part1
//! ├── column1_part0
//! └── ...
//! ```

pub mod metadata_catalog;
pub mod part_files;
