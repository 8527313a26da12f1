use std::fs::File;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use geo_types::{polygon, MultiPolygon};
use gpq::{GeoMetadata, GpqError, PolygonRecord, PolygonTable, TableLayout, GEO_METADATA_KEY};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

fn unit_square(x: f64, y: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon![
        (x: x, y: y),
        (x: x + 1.0, y: y),
        (x: x + 1.0, y: y + 1.0),
        (x: x, y: y + 1.0),
    ]])
}

fn geo_document(path: &std::path::Path) -> GeoMetadata {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap()).unwrap();
    let value = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kv| kv.iter().find(|e| e.key == GEO_METADATA_KEY))
        .and_then(|e| e.value.clone())
        .expect("geo metadata present");
    serde_json::from_str(&value).unwrap()
}

#[test]
fn written_table_reads_back_with_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("merged.parquet");
    let layout = TableLayout::default();

    let two_parts = MultiPolygon::new(
        unit_square(0.0, 0.0)
            .0
            .into_iter()
            .chain(unit_square(5.0, 5.0).0)
            .collect(),
    );

    let table = PolygonTable {
        crs: Some("EPSG:4326".to_owned()),
        records: vec![
            PolygonRecord {
                category: 12,
                count: 3,
                geometry: Some(unit_square(0.0, 0.0)),
            },
            PolygonRecord {
                category: 60,
                count: 2,
                geometry: Some(two_parts.clone()),
            },
        ],
    };

    gpq::write_file(&path, &table, &layout).unwrap();
    assert!(!dir.path().join("merged.parquet.tmp").exists());

    let meta = geo_document(&path);
    assert_eq!(meta.primary_column, "geometry");
    assert_eq!(meta.columns["geometry"].encoding, "WKB");
    assert_eq!(meta.primary_crs().as_deref(), Some("EPSG:4326"));
    assert_eq!(
        meta.columns["geometry"].bbox.as_deref(),
        Some(&[0.0, 0.0, 6.0, 6.0][..])
    );

    let back = gpq::read_file(&path, &layout).unwrap();
    assert_eq!(back, table);
}

#[test]
fn empty_table_still_has_schema_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.parquet");
    let layout = TableLayout::default();

    let table = PolygonTable {
        crs: Some("EPSG:4326".to_owned()),
        records: vec![],
    };
    gpq::write_file(&path, &table, &layout).unwrap();

    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap()).unwrap();
    let names: Vec<_> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    assert_eq!(names, ["gridcode", "merged_count", "geometry"]);

    let meta = geo_document(&path);
    assert!(meta.columns["geometry"].bbox.is_none());

    let back = gpq::read_file(&path, &layout).unwrap();
    assert!(back.records.is_empty());
    assert_eq!(back.crs.as_deref(), Some("EPSG:4326"));
}

#[test]
fn missing_geometry_column_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.parquet");

    let schema = Arc::new(Schema::new(vec![Field::new("gridcode", DataType::Int32, false)]));
    let codes: ArrayRef = Arc::new(Int32Array::from(vec![12, 60]));
    let batch = RecordBatch::try_new(schema.clone(), vec![codes]).unwrap();

    let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    let err = gpq::read_file(&path, &TableLayout::default()).unwrap_err();
    assert!(matches!(err, GpqError::MissingColumn(c) if c == "geometry"));
}

#[test]
fn failed_write_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no_such_dir").join("out.parquet");

    let err = gpq::write_file(&path, &PolygonTable::default(), &TableLayout::default());
    assert!(matches!(err, Err(GpqError::Io(_))));
    assert!(!path.exists());
}
