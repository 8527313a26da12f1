//! Per-feature validation and make-valid.
//!
//! A bad geometry never fails the run: it is either repaired or dropped, and
//! the outcome is tallied in [`RepairStats`].

use std::panic::{self, AssertUnwindSafe};

use geo::{Area, BooleanOps, MultiPolygon, Polygon, RemoveRepeatedPoints, Validation};
use serde::Serialize;

/// Smallest closed ring: three distinct vertices plus the closing one.
const MIN_CLOSED_RING: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairRules {
    /// Rings with fewer coordinates (closing vertex included) are discarded.
    pub min_ring_points: usize,
}

impl Default for RepairRules {
    fn default() -> Self {
        Self {
            min_ring_points: MIN_CLOSED_RING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    Null,
    NonFinite,
    /// Nothing with area left once degenerate rings are removed.
    Empty,
    /// Still invalid after make-valid.
    Unrepairable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Repaired {
    Valid(MultiPolygon<f64>),
    Fixed(MultiPolygon<f64>),
    Dropped(DropReason),
}

impl Repaired {
    pub fn into_geometry(self) -> Option<MultiPolygon<f64>> {
        match self {
            Repaired::Valid(g) | Repaired::Fixed(g) => Some(g),
            Repaired::Dropped(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairStats {
    pub inspected: usize,
    pub valid: usize,
    pub repaired: usize,
    pub dropped_null: usize,
    pub dropped_non_finite: usize,
    pub dropped_empty: usize,
    pub dropped_unrepairable: usize,
}

impl RepairStats {
    pub fn record(&mut self, outcome: &Repaired) {
        self.inspected += 1;
        match outcome {
            Repaired::Valid(_) => self.valid += 1,
            Repaired::Fixed(_) => self.repaired += 1,
            Repaired::Dropped(DropReason::Null) => self.dropped_null += 1,
            Repaired::Dropped(DropReason::NonFinite) => self.dropped_non_finite += 1,
            Repaired::Dropped(DropReason::Empty) => self.dropped_empty += 1,
            Repaired::Dropped(DropReason::Unrepairable) => self.dropped_unrepairable += 1,
        }
    }

    pub fn dropped(&self) -> usize {
        self.dropped_null + self.dropped_non_finite + self.dropped_empty + self.dropped_unrepairable
    }
}

/// Validate one geometry, repairing it when possible.
pub fn repair(geometry: Option<MultiPolygon<f64>>, rules: &RepairRules) -> Repaired {
    let Some(geometry) = geometry else {
        return Repaired::Dropped(DropReason::Null);
    };

    let finite = geometry
        .0
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
        .flat_map(|ring| ring.0.iter())
        .all(|c| c.x.is_finite() && c.y.is_finite());
    if !finite {
        return Repaired::Dropped(DropReason::NonFinite);
    }

    let cleaned = strip_degenerate(geometry.remove_repeated_points(), rules.min_ring_points);
    if cleaned.0.is_empty() {
        return Repaired::Dropped(DropReason::Empty);
    }

    if cleaned.is_valid() {
        return Repaired::Valid(cleaned);
    }

    match make_valid(&cleaned) {
        Some(fixed) if fixed.0.is_empty() => Repaired::Dropped(DropReason::Empty),
        Some(fixed) if fixed.is_valid() => Repaired::Fixed(fixed),
        _ => Repaired::Dropped(DropReason::Unrepairable),
    }
}

/// Node the geometry against itself (a union with the empty set), which
/// splits self-intersections into valid parts. `None` if the boolean kernel
/// gave up on the input.
pub fn make_valid(geometry: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
    let empty = MultiPolygon::<f64>::new(vec![]);
    let noded = panic::catch_unwind(AssertUnwindSafe(|| geometry.union(&empty))).ok()?;

    let noded = strip_degenerate(noded.remove_repeated_points(), MIN_CLOSED_RING);
    let parts = noded
        .0
        .into_iter()
        .filter(|p| p.unsigned_area() > 0.0)
        .collect();

    Some(MultiPolygon::new(parts))
}

/// Drop rings too short to enclose area; a polygon whose exterior goes takes
/// its holes with it.
fn strip_degenerate(geometry: MultiPolygon<f64>, min_ring_points: usize) -> MultiPolygon<f64> {
    let min = min_ring_points.max(MIN_CLOSED_RING);

    let polygons = geometry
        .0
        .into_iter()
        .filter_map(|polygon| {
            let (exterior, interiors) = polygon.into_inner();
            if exterior.0.len() < min {
                return None;
            }

            let interiors = interiors.into_iter().filter(|r| r.0.len() >= min).collect();
            Some(Polygon::new(exterior, interiors))
        })
        .collect();

    MultiPolygon::new(polygons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, LineString};

    fn unit_square() -> MultiPolygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)].into()
    }

    #[test]
    fn valid_geometry_passes_through() {
        let outcome = repair(Some(unit_square()), &RepairRules::default());
        assert_eq!(outcome, Repaired::Valid(unit_square()));
    }

    #[test]
    fn repeated_vertices_are_removed() {
        let noisy: MultiPolygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ]
        .into();

        let geometry = repair(Some(noisy), &RepairRules::default())
            .into_geometry()
            .unwrap();
        assert_eq!(geometry.0[0].exterior().0.len(), 5);
        assert_eq!(geometry.unsigned_area(), 1.0);
    }

    #[test]
    fn bow_tie_is_split_into_valid_parts() {
        // Self-intersecting at (1, 1); each lobe has area 1.
        let bow_tie: MultiPolygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 0.0),
            (x: 0.0, y: 2.0),
        ]
        .into();
        assert!(!bow_tie.is_valid());

        match repair(Some(bow_tie), &RepairRules::default()) {
            Repaired::Fixed(fixed) => {
                assert!(fixed.is_valid());
                assert!((fixed.unsigned_area() - 2.0).abs() < 1e-9);
            }
            other => panic!("expected a repaired geometry, got {other:?}"),
        }
    }

    #[test]
    fn defects_are_dropped_and_counted() {
        let rules = RepairRules::default();
        let mut stats = RepairStats::default();

        let sliver: MultiPolygon<f64> =
            Polygon::new(LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (0.0, 0.0)]), vec![]).into();
        let nan: MultiPolygon<f64> =
            polygon![(x: 0.0, y: 0.0), (x: f64::NAN, y: 0.0), (x: 1.0, y: 1.0)].into();

        for (input, reason) in [
            (None, DropReason::Null),
            (Some(MultiPolygon::new(vec![])), DropReason::Empty),
            (Some(sliver), DropReason::Empty),
            (Some(nan), DropReason::NonFinite),
        ] {
            let outcome = repair(input, &rules);
            stats.record(&outcome);
            assert_eq!(outcome, Repaired::Dropped(reason));
        }

        stats.record(&repair(Some(unit_square()), &rules));

        assert_eq!(stats.inspected, 5);
        assert_eq!(stats.valid, 1);
        assert_eq!(stats.dropped(), 4);
        assert_eq!(stats.dropped_empty, 2);
    }

    #[test]
    fn raised_ring_minimum_discards_small_holes() {
        let with_triangle_hole: MultiPolygon<f64> = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)],
            interiors: [[(x: 1.0, y: 1.0), (x: 2.0, y: 1.0), (x: 1.0, y: 2.0)]],
        )
        .into();

        let rules = RepairRules { min_ring_points: 5 };
        let geometry = repair(Some(with_triangle_hole), &rules)
            .into_geometry()
            .unwrap();

        assert!(geometry.0[0].interiors().is_empty());
        assert_eq!(geometry.unsigned_area(), 100.0);
    }
}
