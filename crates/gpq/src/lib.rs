//! GPQ: GeoParquet reader/writer for categorized polygon tables.
//!
//! - One geometry column, ISO WKB (`Binary`), polygons and multipolygons only.
//! - One integer category column (`Int64` on write; any integer type on read).
//! - One count column (`Int64`): how many source polygons a row stands for.
//!   Optional on read (missing => 1 per row).
//! - File key/value metadata `geo` carrying the GeoParquet document
//!   (primary column, encoding, geometry types, CRS, bbox).
//!
//! Writes are atomic: the file is produced under a sibling `.tmp` name and
//! renamed into place, so a failed write never leaves a partial file.

mod error;
pub mod metadata;
pub mod wkb;

pub use error::{GpqError, Result};
pub use metadata::{GeoColumn, GeoMetadata, GEO_METADATA_KEY};

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BinaryArray, BinaryBuilder, Int64Array, LargeBinaryArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use geo_types::MultiPolygon;
use log::debug;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

/// Column names of a polygon table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub geometry_column: String,
    pub category_column: String,
    pub count_column: String,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            geometry_column: "geometry".to_owned(),
            category_column: "gridcode".to_owned(),
            count_column: "merged_count".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolygonRecord {
    pub category: i64,
    pub count: u64,
    /// `None` for a null cell.
    pub geometry: Option<MultiPolygon<f64>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolygonTable {
    /// CRS tag of the geometry column as declared in the `geo` metadata.
    pub crs: Option<String>,
    pub records: Vec<PolygonRecord>,
}

/// Read a GeoParquet polygon table.
///
/// Fails with [`GpqError::MissingColumn`] when neither the layout's geometry
/// column nor the `geo` document's primary column exists. Geometry cells that
/// are not decodable WKB polygons come back as `None` rather than failing the
/// whole read.
pub fn read_file<P: AsRef<Path>>(path: P, layout: &TableLayout) -> Result<PolygonTable> {
    let file = File::open(path.as_ref())?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let geo = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kv| kv.iter().find(|entry| entry.key == GEO_METADATA_KEY))
        .and_then(|entry| entry.value.as_deref())
        .map(serde_json::from_str::<GeoMetadata>)
        .transpose()?;

    let schema = builder.schema().clone();

    let geometry_column = if schema.column_with_name(&layout.geometry_column).is_some() {
        layout.geometry_column.clone()
    } else {
        match geo.as_ref() {
            Some(meta) if schema.column_with_name(&meta.primary_column).is_some() => {
                meta.primary_column.clone()
            }
            _ => return Err(GpqError::MissingColumn(layout.geometry_column.clone())),
        }
    };

    if schema.column_with_name(&layout.category_column).is_none() {
        return Err(GpqError::MissingColumn(layout.category_column.clone()));
    }

    let crs = geo.as_ref().and_then(GeoMetadata::primary_crs);
    let mut records = Vec::new();
    let mut undecodable = 0usize;

    for batch in builder.build()? {
        let batch = batch?;

        let categories = int64_column(&batch, &layout.category_column)?;
        let counts = match batch.column_by_name(&layout.count_column) {
            Some(_) => Some(int64_column(&batch, &layout.count_column)?),
            None => None,
        };
        let blobs = binary_column(&batch, &geometry_column)?;

        for row in 0..batch.num_rows() {
            // A row without a category cannot join any merge group.
            if categories.is_null(row) {
                continue;
            }
            let category = categories.value(row);

            let count = counts
                .as_ref()
                .filter(|c| !c.is_null(row))
                .map(|c| c.value(row).max(1) as u64)
                .unwrap_or(1);

            let geometry = match blobs.get(row) {
                Some(bytes) => match wkb::decode(bytes) {
                    Ok(mp) => Some(mp),
                    Err(err) => {
                        undecodable += 1;
                        debug!("row {row}: {err}");
                        None
                    }
                },
                None => None,
            };

            records.push(PolygonRecord {
                category,
                count,
                geometry,
            });
        }
    }

    if undecodable > 0 {
        log::warn!("{undecodable} geometry cells were not decodable polygon WKB");
    }

    Ok(PolygonTable { crs, records })
}

/// Write a polygon table atomically.
pub fn write_file<P: AsRef<Path>>(path: P, table: &PolygonTable, layout: &TableLayout) -> Result<()> {
    let path = path.as_ref();
    let tmp = temp_path(path);

    let written = write_to(&tmp, table, layout).and_then(|()| Ok(fs::rename(&tmp, path)?));

    if written.is_err() {
        // Best effort; the original error is what matters.
        let _ = fs::remove_file(&tmp);
    }

    written
}

fn write_to(path: &Path, table: &PolygonTable, layout: &TableLayout) -> Result<()> {
    let geo = GeoMetadata::for_polygons(
        &layout.geometry_column,
        table.crs.as_deref(),
        table.records.iter().filter_map(|r| r.geometry.as_ref()),
    );
    let geo_json = serde_json::to_string(&geo)?;

    let schema = Arc::new(Schema::new(vec![
        Field::new(&layout.category_column, DataType::Int64, false),
        Field::new(&layout.count_column, DataType::Int64, false),
        Field::new(&layout.geometry_column, DataType::Binary, true),
    ]));

    let categories: ArrayRef = Arc::new(Int64Array::from_iter_values(
        table.records.iter().map(|r| r.category),
    ));
    let counts: ArrayRef = Arc::new(Int64Array::from_iter_values(
        table.records.iter().map(|r| r.count as i64),
    ));

    let mut blobs = BinaryBuilder::new();
    for record in &table.records {
        match record.geometry.as_ref() {
            Some(geometry) => blobs.append_value(wkb::encode(geometry)),
            None => blobs.append_null(),
        }
    }
    let blobs: ArrayRef = Arc::new(blobs.finish());

    let batch = RecordBatch::try_new(schema.clone(), vec![categories, counts, blobs])?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![KeyValue::new(
            GEO_METADATA_KEY.to_owned(),
            geo_json,
        )]))
        .build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;

    // An empty table still gets a footer with the full schema and metadata.
    if batch.num_rows() > 0 {
        writer.write(&batch)?;
    }
    writer.close()?;

    debug!(
        "wrote {} rows to {}",
        table.records.len(),
        path.display()
    );

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn int64_column(batch: &RecordBatch, name: &str) -> Result<Int64Array> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| GpqError::MissingColumn(name.to_owned()))?;

    if !column.data_type().is_integer() {
        return Err(GpqError::ColumnType {
            column: name.to_owned(),
            found: column.data_type().to_string(),
        });
    }

    let as_i64 = cast(column, &DataType::Int64)?;

    as_i64
        .as_any()
        .downcast_ref::<Int64Array>()
        .cloned()
        .ok_or_else(|| GpqError::ColumnType {
            column: name.to_owned(),
            found: column.data_type().to_string(),
        })
}

/// Uniform view over `Binary` and `LargeBinary` geometry columns.
#[derive(Clone, Copy)]
enum BinaryCells<'a> {
    Small(&'a BinaryArray),
    Large(&'a LargeBinaryArray),
}

impl<'a> BinaryCells<'a> {
    fn get(&self, row: usize) -> Option<&'a [u8]> {
        match *self {
            BinaryCells::Small(a) => (!a.is_null(row)).then(|| a.value(row)),
            BinaryCells::Large(a) => (!a.is_null(row)).then(|| a.value(row)),
        }
    }
}

fn binary_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<BinaryCells<'a>> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| GpqError::MissingColumn(name.to_owned()))?;

    let type_error = || GpqError::ColumnType {
        column: name.to_owned(),
        found: column.data_type().to_string(),
    };

    match column.data_type() {
        DataType::Binary => column
            .as_any()
            .downcast_ref::<BinaryArray>()
            .map(BinaryCells::Small)
            .ok_or_else(type_error),
        DataType::LargeBinary => column
            .as_any()
            .downcast_ref::<LargeBinaryArray>()
            .map(BinaryCells::Large)
            .ok_or_else(type_error),
        _ => Err(type_error()),
    }
}
