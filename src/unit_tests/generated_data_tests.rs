#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use tokio::sync::OnceCell;

    use crate::column_ingest::ColumnSpec;
    use crate::config::PackOptions;
    use crate::utils::file_interaction_local_and_cloud::{read_path, register_memory_file};
    use crate::{csv_to_parts, decompress_column_into_file, describe_store};

    const TOTAL_ROWS: usize = 1_000;

    /// CSV text plus the expected text output of every stored column.
    struct Generated {
        csv_path: String,
        expected: Vec<Option<String>>,
    }

    static GENERATED: OnceCell<Generated> = OnceCell::const_new();

    fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("id", "integer"),
            ColumnSpec::new("price", "double"),
            ColumnSpec::new("label", "string"),
            ColumnSpec::new("notes", "text"),
            ColumnSpec::new("bucket", "integer"),
        ]
    }

    /// Mixed columns with roughly 10% nulls; `bucket` repeats a handful of values so the
    /// dictionary and run-length schemes get picked.
    async fn generated() -> &'static Generated {
        GENERATED
            .get_or_init(|| async {
                let mut rng = rand::rngs::StdRng::seed_from_u64(12345);
                let labels = ["north", "south", "", "east west", "null"];

                let mut csv = String::new();
                let mut expected = vec![String::new(), String::new(), String::new(), String::new(), String::new()];
                for row in 0..TOTAL_ROWS {
                    let id = if rng.random_range(0..10) == 0 { None } else { Some(row as i32 - 500) };
                    let price = if rng.random_range(0..10) == 0 {
                        None
                    } else {
                        Some(rng.random_range(0..40_000) as f64 / 16.0)
                    };
                    let label = labels[rng.random_range(0..labels.len())];
                    let bucket = if row % 97 == 0 { None } else { Some((row / 50) as i32 % 4) };

                    let id_field = id.map(|v| v.to_string()).unwrap_or_default();
                    let price_field = price.map(|v| v.to_string()).unwrap_or_else(|| "null".to_string());
                    let bucket_field = bucket.map(|v| format!(" {} ", v)).unwrap_or_default();
                    csv.push_str(&format!("{},{},{},note{},{}\n", id_field, price_field, label, row, bucket_field));

                    expected[0].push_str(&format!("{}\n", id.map(|v| v.to_string()).unwrap_or_else(|| "null".into())));
                    expected[1].push_str(&format!("{}\n", price.map(|v| v.to_string()).unwrap_or_else(|| "null".into())));
                    expected[2].push_str(&format!("{}\n", label));
                    expected[4].push_str(&format!("{}\n", bucket.map(|v| v.to_string()).unwrap_or_else(|| "null".into())));
                }

                let csv_path = register_memory_file("generated/input.csv", csv.into_bytes()).await.unwrap();
                let expected = expected
                    .into_iter()
                    .enumerate()
                    .map(|(i, text)| if i == 3 { None } else { Some(text) })
                    .collect();
                Generated { csv_path, expected }
            })
            .await
    }

    async fn check_configuration(chunk_rows: usize, part_max_bytes: usize, cascade_depth: u32) -> u64 {
        let data = generated().await;
        let dir = format!("memory://generated/c{}_p{}_d{}", chunk_rows, part_max_bytes, cascade_depth);
        let options = PackOptions::default()
            .with_chunk_rows(chunk_rows)
            .with_part_max_bytes(part_max_bytes)
            .with_max_cascade_depth(cascade_depth)
            .with_verify_chunks(true);
        let report = csv_to_parts(&data.csv_path, &dir, &columns(), &options).await.unwrap();

        let expected_chunks = TOTAL_ROWS.div_ceil(chunk_rows) as u32;
        assert_eq!(report.metadata.num_chunks, expected_chunks, "{}", dir);

        let description = describe_store(&dir).await.unwrap();
        for (column_index, expected) in data.expected.iter().enumerate() {
            let column = &description.columns[column_index];
            let Some(expected) = expected else {
                assert_eq!(column.num_parts, 0);
                continue;
            };
            let total: u32 = column.part_chunk_counts.iter().sum();
            assert_eq!(total, expected_chunks, "{} column {}", dir, column_index);
            assert_eq!(column.part_chunk_counts.len() as u32, column.num_parts);
            assert!(column.part_chunk_counts.iter().all(|c| *c > 0));

            let output = format!("{}_out/column{}.txt", dir, column_index);
            let rows = decompress_column_into_file(&dir, column_index, &output).await.unwrap();
            assert_eq!(rows, TOTAL_ROWS as u64);
            let text = String::from_utf8(read_path(&output).await.unwrap().to_vec()).unwrap();
            assert!(text == *expected, "{} column {} differs", dir, column_index);
        }
        report.compressed_bytes()
    }

    #[tokio::test]
    async fn test_chunk_count_invariant_across_configurations() {
        for (chunk_rows, part_max_bytes) in [(7, 256), (10, 1), (100, 4_096), (333, 1 << 20), (1_000, 512), (9_999, 1 << 24)] {
            check_configuration(chunk_rows, part_max_bytes, 3).await;
        }
    }

    #[tokio::test]
    async fn test_small_budget_yields_many_parts() {
        check_configuration(50, 600, 3).await;
        let description = describe_store("memory://generated/c50_p600_d3").await.unwrap();
        assert!(description.columns[0].num_parts >= 3);
        assert!(description.columns[2].num_parts >= 3);
    }

    #[tokio::test]
    async fn test_cascade_depth_only_changes_size() {
        let uncompressed = check_configuration(250, 1 << 20, 0).await;
        let single = check_configuration(250, 1 << 20, 1).await;
        let cascaded = check_configuration(250, 1 << 20, 3).await;
        assert!(single <= uncompressed);
        assert!(cascaded <= single);
    }
}
