use std::path::Path;

use gpq::{PolygonRecord, PolygonTable, TableLayout};
use log::info;

use crate::engine::MergeOutput;
use crate::error::Result;

pub fn to_table(output: &MergeOutput) -> PolygonTable {
    PolygonTable {
        crs: Some(output.crs.as_str().to_owned()),
        records: output
            .features
            .iter()
            .map(|f| PolygonRecord {
                category: f.category,
                count: f.merged_count,
                geometry: Some(f.geometry.clone()),
            })
            .collect(),
    }
}

/// Write merged features as GeoParquet. An empty result still produces a
/// file with the full schema and `geo` metadata.
pub fn write_geoparquet<P: AsRef<Path>>(path: P, output: &MergeOutput, layout: &TableLayout) -> Result<()> {
    let path = path.as_ref();
    gpq::write_file(path, &to_table(output), layout)?;

    info!("wrote {} merged features to {}", output.features.len(), path.display());
    Ok(())
}
