use std::fmt;
use std::str::FromStr;

use geo::{Area, MultiPolygon};
use serde::Serialize;

use crate::error::MergeError;

/// Integer category code (the `gridcode` of the wetland layers).
pub type Category = i64;

/// Opaque handle of an input feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FeatureId(pub u64);

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Normalized CRS tag, `AUTHORITY:CODE` in upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Crs(String);

impl Crs {
    pub fn epsg(code: u32) -> Self {
        Self(format!("EPSG:{code}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::epsg(4326)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Crs {
    type Err = MergeError;

    /// Accepts `EPSG:4326`, `epsg:4326`, a bare `4326`, OGC URNs such as
    /// `urn:ogc:def:crs:EPSG::4326` and `CRS84`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || MergeError::InvalidCrs(s.to_owned());

        if trimmed.is_empty() {
            return Err(invalid());
        }

        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return trimmed.parse::<u32>().map(Crs::epsg).map_err(|_| invalid());
        }

        if trimmed.eq_ignore_ascii_case("crs84") {
            return Ok(Self("OGC:CRS84".to_owned()));
        }

        let lower = trimmed.to_ascii_lowercase();
        let (authority, code) = if lower.starts_with("urn:ogc:def:crs:") {
            // urn:ogc:def:crs:{authority}:{version}:{code}, version may be empty.
            let parts: Vec<&str> = trimmed.split(':').collect();
            match parts.as_slice() {
                [_, _, _, _, authority, _, code] => (*authority, *code),
                [_, _, _, _, authority, code] => (*authority, *code),
                _ => return Err(invalid()),
            }
        } else {
            trimmed.split_once(':').ok_or_else(invalid)?
        };

        let (authority, code) = (authority.trim(), code.trim());
        if authority.is_empty() || code.is_empty() || code.contains(':') {
            return Err(invalid());
        }

        Ok(Self(format!(
            "{}:{}",
            authority.to_ascii_uppercase(),
            code.to_ascii_uppercase()
        )))
    }
}

/// A feature as handed over by the upstream formatting stage.
#[derive(Debug, Clone, PartialEq)]
pub struct InputFeature {
    pub id: FeatureId,
    pub category: Category,
    /// `None` for a null geometry cell.
    pub geometry: Option<MultiPolygon<f64>>,
    pub crs: Option<Crs>,
    /// Number of original polygons this feature stands for; 1 for raw input.
    pub weight: u64,
}

impl InputFeature {
    pub fn new(id: u64, category: Category, geometry: impl Into<MultiPolygon<f64>>) -> Self {
        Self {
            id: FeatureId(id),
            category,
            geometry: Some(geometry.into()),
            crs: None,
            weight: 1,
        }
    }

    pub fn null(id: u64, category: Category) -> Self {
        Self {
            id: FeatureId(id),
            category,
            geometry: None,
            crs: None,
            weight: 1,
        }
    }

    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    pub fn with_weight(mut self, weight: u64) -> Self {
        self.weight = weight.max(1);
        self
    }
}

/// A repaired input feature. Geometry is valid and non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub category: Category,
    pub geometry: MultiPolygon<f64>,
    pub weight: u64,
}

/// One original feature absorbed into a merged feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Source {
    pub id: FeatureId,
    pub weight: u64,
}

/// The dissolved geometry of one connected component.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedFeature {
    pub category: Category,
    pub geometry: MultiPolygon<f64>,
    /// Sum of the weights of the distinct sources.
    pub merged_count: u64,
    sources: Vec<Source>,
}

impl MergedFeature {
    /// Build from a (possibly duplicated) source list. Sources are sorted and
    /// de-duplicated by id, so a feature seen in two partitions counts once.
    pub(crate) fn from_parts(
        category: Category,
        geometry: MultiPolygon<f64>,
        mut sources: Vec<Source>,
    ) -> Self {
        sources.sort_unstable();
        sources.dedup_by_key(|s| s.id);

        let merged_count = sources.iter().map(|s| s.weight).sum();

        Self {
            category,
            geometry,
            merged_count,
            sources,
        }
    }

    /// Original features absorbed, ascending by id.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }

    /// Feed a merged result back in as input, weighted by its count.
    pub fn into_input(self, id: u64, crs: Crs) -> InputFeature {
        InputFeature {
            id: FeatureId(id),
            category: self.category,
            geometry: Some(self.geometry),
            crs: Some(crs),
            weight: self.merged_count,
        }
    }
}

/// Anything the graph builder and component merger can work on.
pub trait Polygonal {
    fn category(&self) -> Category;

    fn geometry(&self) -> &MultiPolygon<f64>;

    /// Append the original features this item stands for.
    fn extend_sources(&self, out: &mut Vec<Source>);
}

impl Polygonal for Feature {
    fn category(&self) -> Category {
        self.category
    }

    fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    fn extend_sources(&self, out: &mut Vec<Source>) {
        out.push(Source {
            id: self.id,
            weight: self.weight,
        });
    }
}

impl Polygonal for MergedFeature {
    fn category(&self) -> Category {
        self.category
    }

    fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    fn extend_sources(&self, out: &mut Vec<Source>) {
        out.extend_from_slice(&self.sources);
    }
}

impl<T: Polygonal + ?Sized> Polygonal for &T {
    fn category(&self) -> Category {
        (**self).category()
    }

    fn geometry(&self) -> &MultiPolygon<f64> {
        (**self).geometry()
    }

    fn extend_sources(&self, out: &mut Vec<Source>) {
        (**self).extend_sources(out)
    }
}
