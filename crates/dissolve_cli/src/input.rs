//! Loading the input layer into engine features.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use dissolve::{Crs, InputFeature};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use gpq::TableLayout;
use log::{info, warn};
use serde::Deserialize;
use serde_json::{Map, Value};

pub fn load(path: &Path, layout: &TableLayout) -> Result<Vec<InputFeature>> {
    let is_parquet = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("parquet") || e.eq_ignore_ascii_case("geoparquet"));

    let features = if is_parquet {
        load_geoparquet(path, layout)?
    } else {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let collection: FeatureCollection = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing {} as GeoJSON", path.display()))?;
        from_geojson(collection, layout)?
    };

    info!("Loaded {} features from {}", features.len(), path.display());
    Ok(features)
}

fn load_geoparquet(path: &Path, layout: &TableLayout) -> Result<Vec<InputFeature>> {
    let table =
        gpq::read_file(path, layout).with_context(|| format!("reading {}", path.display()))?;

    let crs = table
        .crs
        .as_deref()
        .map(str::parse::<Crs>)
        .transpose()
        .context("CRS in the geo metadata")?;

    Ok(table
        .records
        .into_iter()
        .enumerate()
        .map(|(i, record)| InputFeature {
            id: dissolve::FeatureId(i as u64),
            category: record.category,
            geometry: record.geometry,
            crs: crs.clone(),
            weight: record.count.max(1),
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<JsonFeature>,
    /// Legacy (2008) named CRS member.
    #[serde(default)]
    crs: Option<NamedCrs>,
}

#[derive(Debug, Deserialize)]
struct JsonFeature {
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    crs: Option<NamedCrs>,
}

#[derive(Debug, Deserialize)]
struct NamedCrs {
    properties: NamedCrsProperties,
}

#[derive(Debug, Deserialize)]
struct NamedCrsProperties {
    name: String,
}

type Ring = Vec<Vec<f64>>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
    #[serde(other)]
    Unsupported,
}

fn from_geojson(collection: FeatureCollection, layout: &TableLayout) -> Result<Vec<InputFeature>> {
    let default_crs = collection
        .crs
        .map(|c| c.properties.name.parse::<Crs>())
        .transpose()
        .context("collection crs member")?;

    let mut features = Vec::with_capacity(collection.features.len());
    let (mut uncategorized, mut unsupported) = (0usize, 0usize);

    for (i, feature) in collection.features.into_iter().enumerate() {
        let properties = feature.properties.unwrap_or_default();

        let Some(category) = properties.get(&layout.category_column).and_then(as_integer) else {
            uncategorized += 1;
            continue;
        };
        let weight = properties
            .get(&layout.count_column)
            .and_then(as_integer)
            .map_or(1, |w| w.max(1) as u64);

        let crs = match feature.crs {
            Some(named) => Some(
                named
                    .properties
                    .name
                    .parse::<Crs>()
                    .with_context(|| format!("crs member of feature {i}"))?,
            ),
            None => default_crs.clone(),
        };

        let geometry = match feature.geometry {
            Some(Geometry::Polygon { coordinates }) => Some(MultiPolygon::new(vec![polygon(coordinates)?])),
            Some(Geometry::MultiPolygon { coordinates }) => Some(MultiPolygon::new(
                coordinates.into_iter().map(polygon).collect::<Result<_>>()?,
            )),
            Some(Geometry::Unsupported) => {
                unsupported += 1;
                None
            }
            None => None,
        };

        features.push(InputFeature {
            id: dissolve::FeatureId(i as u64),
            category,
            geometry,
            crs,
            weight,
        });
    }

    if uncategorized > 0 {
        warn!("{uncategorized} features without an integer `{}` skipped", layout.category_column);
    }
    if unsupported > 0 {
        warn!("{unsupported} non-polygon geometries treated as null");
    }

    Ok(features)
}

/// `12`, `12.0` and `"12"` all name category 12.
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn polygon(rings: Vec<Ring>) -> Result<Polygon<f64>> {
    let mut rings = rings.into_iter().map(ring);
    let exterior = match rings.next() {
        Some(r) => r?,
        None => LineString::new(vec![]),
    };
    let interiors = rings.collect::<Result<Vec<_>>>()?;

    Ok(Polygon::new(exterior, interiors))
}

fn ring(positions: Ring) -> Result<LineString<f64>> {
    let coords = positions
        .into_iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => bail!("position with fewer than two ordinates"),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(LineString::new(coords))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Vec<InputFeature>> {
        from_geojson(serde_json::from_str(json)?, &TableLayout::default())
    }

    #[test]
    fn reads_polygons_and_crs_members() {
        let features = parse(
            r#"{
              "type": "FeatureCollection",
              "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::4326"}},
              "features": [
                {"type": "Feature", "properties": {"gridcode": 12},
                 "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
                {"type": "Feature", "properties": {"gridcode": "60", "merged_count": 3},
                 "crs": {"type": "name", "properties": {"name": "EPSG:3857"}},
                 "geometry": {"type": "MultiPolygon", "coordinates": [[[[0,0,5],[1,0,5],[1,1,5],[0,0,5]]]]}}
              ]
            }"#,
        )
        .unwrap();

        assert_eq!(features.len(), 2);
        assert_eq!(features[0].category, 12);
        assert_eq!(features[0].crs, Some(Crs::epsg(4326)));
        assert_eq!(features[0].geometry.as_ref().unwrap().0[0].exterior().0.len(), 5);
        assert_eq!(features[1].category, 60);
        assert_eq!(features[1].weight, 3);
        assert_eq!(features[1].crs, Some(Crs::epsg(3857)));
    }

    #[test]
    fn other_geometry_types_become_null() {
        let features = parse(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"gridcode": 12},
                 "geometry": {"type": "Point", "coordinates": [0, 0]}},
                {"type": "Feature", "properties": {"gridcode": 12}, "geometry": null},
                {"type": "Feature", "properties": {"other": 1},
                 "geometry": {"type": "Point", "coordinates": [0, 0]}}
            ]}"#,
        )
        .unwrap();

        assert_eq!(features.len(), 2);
        assert!(features.iter().all(|f| f.geometry.is_none() && f.crs.is_none()));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("absent.geojson"), &TableLayout::default()).unwrap_err();
        assert!(format!("{err:#}").contains("opening"));
    }
}
