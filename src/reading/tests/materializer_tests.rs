#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::{Rng, SeedableRng};
    use tokio::sync::OnceCell;

    use crate::codec::bitmap::BitmapKind;
    use crate::codec::{CascadeCodec, ChunkCodec};
    use crate::config::PackOptions;
    use crate::errors::ChunkpackError;
    use crate::part_packing::{pack_relation, PackReport};
    use crate::reading::materializer::{load_catalog, ChunkCursor, ColumnMaterializer};
    use crate::reading::sinks::{TextSink, VecSink};
    use crate::relation::{Column, ColumnData, ColumnType, Relation};
    use crate::utils::bit_vec::BitVec;
    use crate::utils::file_interaction_local_and_cloud::{get_object_store, write_path};

    const STORE_DIR: &str = "memory://materializer_tests/shared";
    const ROWS: usize = 2_500;
    const CHUNK_ROWS: usize = 100;

    static PACKED: OnceCell<(Relation, PackReport)> = OnceCell::const_new();

    fn codec() -> Arc<dyn ChunkCodec> {
        Arc::new(CascadeCodec::default())
    }

    /// Integer, double and string columns with seeded nulls, plus a SKIP column.
    ///
    /// Rows 200..300 are null in every data column and rows 300..400 are fully present, so
    /// chunks 2 and 3 exercise the ALL-ZEROS and ALL-ONES bitmaps.
    fn build_relation() -> Relation {
        let mut rng = rand::rngs::StdRng::seed_from_u64(12345);
        let present: BitVec = (0..ROWS)
            .map(|row| match row {
                200..300 => false,
                300..400 => true,
                _ => rng.random_range(0..10) != 0,
            })
            .collect();

        let ints: Vec<i32> = (0..ROWS)
            .map(|row| if present.get(row) == Some(true) { rng.random_range(-50..50) } else { i32::MIN })
            .collect();
        let doubles: Vec<f64> = (0..ROWS)
            .map(|row| if present.get(row) == Some(true) { rng.random_range(0..1000) as f64 / 8.0 } else { i32::MIN as f64 })
            .collect();
        let labels = ["alpha", "beta", "", "gamma delta", "null-ish"];
        let strings: Vec<String> = (0..ROWS)
            .map(|row| {
                if present.get(row) == Some(true) {
                    labels[rng.random_range(0..labels.len())].to_string()
                } else {
                    String::new()
                }
            })
            .collect();

        let mut relation = Relation::new();
        relation
            .add_column(Column::with_validity("i", ColumnData::Integer(ints), present.clone()))
            .unwrap();
        relation.add_column(Column::skip("ignored")).unwrap();
        relation
            .add_column(Column::with_validity("d", ColumnData::Double(doubles), present.clone()))
            .unwrap();
        relation
            .add_column(Column::with_validity("s", ColumnData::String(strings), present))
            .unwrap();
        relation
    }

    async fn packed() -> &'static (Relation, PackReport) {
        PACKED
            .get_or_init(|| async {
                let relation = build_relation();
                let options = PackOptions::default()
                    .with_chunk_rows(CHUNK_ROWS)
                    .with_part_max_bytes(1_500)
                    .with_verify_chunks(true);
                let report = pack_relation(Arc::new(relation.clone()), STORE_DIR, &options, codec())
                    .await
                    .unwrap();
                (relation, report)
            })
            .await
    }

    fn expected_text(column: &Column) -> String {
        let mut text = String::new();
        for row in 0..column.validity.len() {
            if column.validity.get(row) != Some(true) {
                text.push_str("null\n");
                continue;
            }
            match &column.data {
                ColumnData::Integer(v) => text.push_str(&format!("{}\n", v[row])),
                ColumnData::Double(v) => text.push_str(&format!("{}\n", v[row])),
                ColumnData::String(v) => text.push_str(&format!("{}\n", v[row])),
                ColumnData::Skip => {}
            }
        }
        text
    }

    #[tokio::test]
    async fn test_every_column_spans_several_parts() {
        let (_, report) = packed().await;
        assert_eq!(report.metadata.num_chunks, (ROWS / CHUNK_ROWS) as u32);
        for column_index in [0, 2, 3] {
            assert!(
                report.metadata.parts[column_index].num_parts >= 3,
                "column {} has {} parts",
                column_index,
                report.metadata.parts[column_index].num_parts
            );
        }
        assert_eq!(report.metadata.parts[1].num_parts, 0);
    }

    #[tokio::test]
    async fn test_text_round_trip_matches_input() {
        let (relation, _) = packed().await;
        for column_index in [0, 2, 3] {
            let materializer = ColumnMaterializer::open(STORE_DIR, column_index, codec()).await.unwrap();
            let mut sink = TextSink::new(Vec::new());
            let rows = materializer.materialize(&mut sink).unwrap();
            assert_eq!(rows, ROWS as u64);
            let text = String::from_utf8(sink.into_inner()).unwrap();
            assert_eq!(text, expected_text(&relation.columns[column_index]), "column {}", column_index);
        }
    }

    #[tokio::test]
    async fn test_chunk_sums_match_catalog() {
        let (_, report) = packed().await;
        let materializer = ColumnMaterializer::open(STORE_DIR, 3, codec()).await.unwrap();
        let total: u32 = materializer.part_chunk_counts().iter().sum();
        assert_eq!(total, report.metadata.num_chunks);
        assert_eq!(materializer.part_chunk_counts().len() as u32, report.metadata.parts[3].num_parts);
        assert_eq!(materializer.tuple_count(), ROWS as u64);
    }

    #[tokio::test]
    async fn test_bitmap_kinds_follow_chunk_content() {
        packed().await;
        let (store, dir) = get_object_store(STORE_DIR).await.unwrap();
        let catalog = load_catalog(store.as_ref(), &dir).await.unwrap();
        let materializer = ColumnMaterializer::open_with_catalog(store.as_ref(), &dir, &catalog, 0, codec())
            .await
            .unwrap();

        let mut ints = VecSink::<i32>::new();
        materializer.materialize(&mut ints).unwrap();
        let values = ints.into_values();
        assert!(values[200..300].iter().all(|v| *v == 0));

        let part = crate::reading::part_reader::PartReader::open(
            store.as_ref(),
            &dir.child("column0_part0"),
            0,
            codec(),
        )
        .await
        .unwrap();
        let mut seen = Vec::new();
        for chunk in 0..part.chunk_count() {
            seen.push(part.bitmap(chunk).unwrap().kind());
        }
        assert!(seen.contains(&BitmapKind::Bitset));
    }

    #[tokio::test]
    async fn test_materialization_is_idempotent() {
        packed().await;
        let materializer = ColumnMaterializer::open(STORE_DIR, 3, codec()).await.unwrap();
        let mut first = TextSink::new(Vec::new());
        let mut second = TextSink::new(Vec::new());
        materializer.materialize(&mut first).unwrap();
        materializer.materialize(&mut second).unwrap();
        let first = first.into_inner();
        assert!(!first.is_empty());
        assert_eq!(first, second.into_inner());

        let reopened = ColumnMaterializer::open(STORE_DIR, 3, codec()).await.unwrap();
        let mut third = TextSink::new(Vec::new());
        reopened.materialize(&mut third).unwrap();
        assert_eq!(first, third.into_inner());
    }

    #[tokio::test]
    async fn test_skip_and_out_of_range_columns() {
        packed().await;
        let err = ColumnMaterializer::open(STORE_DIR, 1, codec()).await.unwrap_err();
        assert_eq!(err.to_string(), "Type SKIP not supported");

        let err = ColumnMaterializer::open(STORE_DIR, 4, codec()).await.unwrap_err();
        assert!(matches!(err, ChunkpackError::ColumnOutOfRange { column_index: 4, num_columns: 4 }));
    }

    #[tokio::test]
    async fn test_typed_sink_mismatch() {
        packed().await;
        let materializer = ColumnMaterializer::open(STORE_DIR, 3, codec()).await.unwrap();
        let mut sink = VecSink::<i32>::new();
        let err = materializer.materialize(&mut sink).unwrap_err();
        assert!(matches!(err, ChunkpackError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_missing_part_is_reported() {
        let mut relation = Relation::new();
        relation.add_column(Column::from_integers("a", (0..50).collect())).unwrap();
        let options = PackOptions::default().with_chunk_rows(10).with_part_max_bytes(1);
        let dir = "memory://materializer_tests/missing_part";
        let report = pack_relation(Arc::new(relation), dir, &options, codec()).await.unwrap();
        assert_eq!(report.metadata.parts[0].num_parts, 5);

        let (store, root) = get_object_store(dir).await.unwrap();
        store.delete(&root.child("column0_part3")).await.unwrap();
        let err = ColumnMaterializer::open(dir, 0, codec()).await.unwrap_err();
        match err {
            ChunkpackError::BadPart { column_index, path, .. } => {
                assert_eq!(column_index, 0);
                assert!(path.ends_with("column0_part3"), "{}", path);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_truncated_catalog_is_reported() {
        let dir = "memory://materializer_tests/bad_catalog";
        write_path(&format!("{}/metadata", dir), vec![2u8, 0, 0, 0, 1, 0, 0, 0, 0, 0]).await.unwrap();
        let err = ColumnMaterializer::open(dir, 0, codec()).await.unwrap_err();
        assert!(matches!(err, ChunkpackError::MalformedMetadata { .. }));
    }

    #[test]
    fn test_cursor_crosses_every_part_boundary() {
        let counts = [3, 1, 2];
        let mut cursor = ChunkCursor::new();
        let visited: Vec<(usize, u32)> = (0..6).map(|i| cursor.advance(&counts, 7, i).unwrap()).collect();
        assert_eq!(visited, vec![(0, 0), (0, 1), (0, 2), (1, 0), (2, 0), (2, 1)]);
        let err = cursor.advance(&counts, 7, 6).unwrap_err();
        assert!(matches!(
            err,
            ChunkpackError::CursorOutOfBounds { column_index: 7, chunk_index: 6, num_parts: 3 }
        ));
    }

    #[test]
    fn test_packed_column_types_are_preserved() {
        let relation = build_relation();
        let types: Vec<ColumnType> = relation.columns.iter().map(Column::column_type).collect();
        assert_eq!(
            types,
            vec![ColumnType::Integer, ColumnType::Skip, ColumnType::Double, ColumnType::String]
        );
    }
}
