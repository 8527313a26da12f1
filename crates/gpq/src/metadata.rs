//! The GeoParquet `geo` file metadata document.

use std::collections::BTreeMap;

use geo_types::MultiPolygon;
use serde::{Deserialize, Serialize};

/// Key under which the document is stored in the Parquet key/value metadata.
pub const GEO_METADATA_KEY: &str = "geo";
pub const GEOPARQUET_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoMetadata {
    pub version: String,
    pub primary_column: String,
    pub columns: BTreeMap<String, GeoColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoColumn {
    pub encoding: String,

    #[serde(default)]
    pub geometry_types: Vec<String>,

    /// Either a CRS identifier string or a PROJJSON object; other writers
    /// use both forms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
}

impl GeoMetadata {
    /// Describe a single WKB polygon column.
    pub fn for_polygons<'a, I>(column: &str, crs: Option<&str>, geometries: I) -> Self
    where
        I: IntoIterator<Item = &'a MultiPolygon<f64>>,
    {
        let mut has_single = false;
        let mut has_multi = false;
        let mut extent = Extent::default();

        for geometry in geometries {
            if geometry.0.len() == 1 {
                has_single = true;
            } else {
                has_multi = true;
            }
            extent.include(geometry);
        }

        let mut geometry_types = Vec::new();
        if has_single {
            geometry_types.push("Polygon".to_owned());
        }
        if has_multi {
            geometry_types.push("MultiPolygon".to_owned());
        }

        let column_meta = GeoColumn {
            encoding: "WKB".to_owned(),
            geometry_types,
            crs: crs.map(|c| serde_json::Value::String(c.to_owned())),
            bbox: extent.to_bbox(),
        };

        Self {
            version: GEOPARQUET_VERSION.to_owned(),
            primary_column: column.to_owned(),
            columns: BTreeMap::from([(column.to_owned(), column_meta)]),
        }
    }

    /// CRS tag of the primary column as `AUTHORITY:CODE`, if one is declared.
    pub fn primary_crs(&self) -> Option<String> {
        let column = self.columns.get(&self.primary_column)?;

        match column.crs.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(projjson) => {
                let id = projjson.get("id")?;
                let authority = id.get("authority")?.as_str()?;
                let code = id.get("code")?;
                let code = match code {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some(format!("{authority}:{code}"))
            }
            _ => None,
        }
    }
}

/// Running XY extent over every vertex seen.
#[derive(Debug, Clone, Copy)]
struct Extent {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Default for Extent {
    fn default() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }
}

impl Extent {
    fn include(&mut self, geometry: &MultiPolygon<f64>) {
        // Holes lie inside their exterior, so exteriors bound everything.
        for polygon in &geometry.0 {
            for c in &polygon.exterior().0 {
                if c.x.is_finite() && c.y.is_finite() {
                    self.min_x = self.min_x.min(c.x);
                    self.min_y = self.min_y.min(c.y);
                    self.max_x = self.max_x.max(c.x);
                    self.max_y = self.max_y.max(c.y);
                }
            }
        }
    }

    fn to_bbox(self) -> Option<Vec<f64>> {
        (self.min_x <= self.max_x && self.min_y <= self.max_y)
            .then(|| vec![self.min_x, self.min_y, self.max_x, self.max_y])
    }
}
