//! Whole-run invariants: one CRS in, only valid polygons out.

use geo::{MultiPolygon, Validation};
use log::{debug, warn};
use serde::Serialize;

use crate::error::{MergeError, Result};
use crate::feature::{Crs, InputFeature, MergedFeature};
use crate::repair::make_valid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrsReport {
    pub checked: usize,
    /// Untagged features that were given the expected CRS.
    pub assigned: usize,
}

/// Check every feature against `expected`.
///
/// A feature tagged with another CRS fails the whole run before anything is
/// touched. Untagged features are then tagged with `expected`.
pub fn enforce_crs(features: &mut [InputFeature], expected: &Crs) -> Result<CrsReport> {
    if let Some(bad) = features
        .iter()
        .find(|f| f.crs.as_ref().is_some_and(|crs| crs != expected))
    {
        return Err(MergeError::CrsMismatch {
            expected: expected.clone(),
            found: bad.crs.clone().unwrap_or_default(),
            feature: bad.id,
        });
    }

    let mut report = CrsReport {
        checked: features.len(),
        assigned: 0,
    };

    for feature in features.iter_mut().filter(|f| f.crs.is_none()) {
        feature.crs = Some(expected.clone());
        report.assigned += 1;
    }

    if report.assigned > 0 {
        warn!("{} features had no CRS, assigned {expected}", report.assigned);
    }

    Ok(report)
}

/// Check merged geometries once more. An invalid union is re-noded; one that
/// is empty or still invalid afterwards is dropped. Returns the survivors and
/// how many were dropped.
pub fn retain_valid(features: Vec<MergedFeature>) -> (Vec<MergedFeature>, usize) {
    retain_valid_with(features, make_valid)
}

pub(crate) fn retain_valid_with<F>(features: Vec<MergedFeature>, renode: F) -> (Vec<MergedFeature>, usize)
where
    F: Fn(&MultiPolygon<f64>) -> Option<MultiPolygon<f64>>,
{
    let before = features.len();

    let kept: Vec<MergedFeature> = features
        .into_iter()
        .filter_map(|mut f| {
            if !f.geometry.0.is_empty() && f.geometry.is_valid() {
                return Some(f);
            }

            match renode(&f.geometry) {
                Some(fixed) if !fixed.0.is_empty() && fixed.is_valid() => {
                    debug!("re-noded merged feature of category {}", f.category);
                    f.geometry = fixed;
                    Some(f)
                }
                _ => {
                    warn!(
                        "dropping merged feature of category {} ({} sources): invalid union",
                        f.category,
                        f.sources().len()
                    );
                    None
                }
            }
        })
        .collect();

    let dropped = before - kept.len();
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{FeatureId, Source};
    use geo::polygon;

    fn bow_tie() -> MultiPolygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 2.0), (x: 2.0, y: 0.0), (x: 0.0, y: 2.0)].into()
    }

    fn square() -> MultiPolygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)].into()
    }

    #[test]
    fn untagged_features_get_the_expected_crs() {
        let mut features = vec![
            InputFeature::new(1, 12, square()).with_crs(Crs::epsg(4326)),
            InputFeature::new(2, 12, square()),
        ];

        let report = enforce_crs(&mut features, &Crs::epsg(4326)).unwrap();

        assert_eq!(report, CrsReport { checked: 2, assigned: 1 });
        assert!(features.iter().all(|f| f.crs == Some(Crs::epsg(4326))));
    }

    #[test]
    fn mismatch_aborts_without_assigning() {
        let mut features = vec![
            InputFeature::new(1, 12, square()),
            InputFeature::new(2, 12, square()).with_crs(Crs::epsg(3857)),
        ];

        let err = enforce_crs(&mut features, &Crs::epsg(4326)).unwrap_err();

        match err {
            MergeError::CrsMismatch { found, feature, .. } => {
                assert_eq!(found, Crs::epsg(3857));
                assert_eq!(feature, FeatureId(2));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(features[0].crs, None);
    }

    #[test]
    fn empty_unions_are_dropped_and_invalid_ones_renoded() {
        let source = |id| vec![Source { id: FeatureId(id), weight: 1 }];
        let features = vec![
            MergedFeature::from_parts(12, square(), source(1)),
            MergedFeature::from_parts(12, MultiPolygon::new(vec![]), source(2)),
            MergedFeature::from_parts(12, bow_tie(), source(3)),
        ];

        let (kept, dropped) = retain_valid(features);

        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|f| f.geometry.is_valid()));
        assert!((kept[1].area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn unions_still_invalid_after_renoding_are_dropped() {
        let source = vec![Source { id: FeatureId(1), weight: 1 }];
        let features = vec![MergedFeature::from_parts(12, bow_tie(), source)];

        let (kept, dropped) = retain_valid_with(features, |g| Some(g.clone()));

        assert!(kept.is_empty());
        assert_eq!(dropped, 1);
    }
}
