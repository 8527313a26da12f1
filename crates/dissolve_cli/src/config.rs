use clap::Parser;
use std::path::PathBuf;

/// `dissolve` - merge touching same-category polygons.
///
/// Reads a GeoParquet or GeoJSON polygon layer, merges every group of
/// touching features that share a category code and writes the result as
/// GeoParquet with a `merged_count` column.
#[derive(Parser, Debug)]
#[command(name = "dissolve", version, about, long_about = None)]
pub struct Args {
    /// Input layer. `.parquet`/`.geoparquet` is read as GeoParquet, anything
    /// else as a GeoJSON FeatureCollection.
    #[arg(long, env = "DISSOLVE_INPUT")]
    pub input: PathBuf,

    /// Output GeoParquet file.
    #[arg(long, env = "DISSOLVE_OUTPUT")]
    pub output: PathBuf,

    /// Target partition count; the grid has `ceil(sqrt(n))` cells per side.
    #[arg(long, env = "DISSOLVE_PARTITIONS", default_value_t = 4)]
    pub partitions: usize,

    /// Category codes to merge, comma separated (e.g. `12,60`). All codes
    /// present in the input when omitted.
    #[arg(long, env = "DISSOLVE_CATEGORIES", value_delimiter = ',')]
    pub categories: Vec<i64>,

    /// CRS every feature must be in. Untagged features are assigned it.
    #[arg(long, env = "DISSOLVE_CRS", default_value = "EPSG:4326")]
    pub crs: String,

    #[arg(long, env = "DISSOLVE_CATEGORY_COLUMN", default_value = "gridcode")]
    pub category_column: String,

    #[arg(long, env = "DISSOLVE_GEOMETRY_COLUMN", default_value = "geometry")]
    pub geometry_column: String,

    /// Weight column on input (optional there) and count column on output.
    #[arg(long, env = "DISSOLVE_COUNT_COLUMN", default_value = "merged_count")]
    pub count_column: String,

    /// Where to write the run statistics as JSON.
    #[arg(long, env = "DISSOLVE_STATS")]
    pub stats: Option<PathBuf>,

    /// Replace an existing output file.
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Worker threads for per-partition merging (0 = one per core).
    #[arg(long, env = "DISSOLVE_THREADS", default_value_t = 0)]
    pub threads: usize,

    /// Merge partitions one after another on the calling thread.
    #[arg(long, default_value_t = false)]
    pub sequential: bool,

    /// Rings with fewer points (closing point included) are discarded.
    #[arg(long, env = "DISSOLVE_MIN_RING_POINTS", default_value_t = 4)]
    pub min_ring_points: usize,
}

impl Args {
    pub fn layout(&self) -> gpq::TableLayout {
        gpq::TableLayout {
            geometry_column: self.geometry_column.clone(),
            category_column: self.category_column.clone(),
            count_column: self.count_column.clone(),
        }
    }
}
