use geo::{BoundingRect, MultiPolygon, Rect};
use rstar::{RTree, RTreeObject, AABB};

use crate::feature::Polygonal;

/// Bounding box of one item, keyed by its position in the slice it came from.
#[derive(Clone, Debug)]
pub(crate) struct Footprint {
    pub idx: usize,
    pub env: AABB<[f64; 2]>,
}

impl RTreeObject for Footprint {
    type Envelope = AABB<[f64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

#[inline]
pub(crate) fn rect_envelope(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

#[inline]
pub(crate) fn envelope_of(geometry: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    geometry.bounding_rect().map(rect_envelope)
}

/// Per-item envelopes (`None` for empty geometries) and an R-tree over the
/// non-empty ones.
pub(crate) fn build<T: Polygonal>(items: &[T]) -> (Vec<Option<AABB<[f64; 2]>>>, RTree<Footprint>) {
    let envelopes: Vec<_> = items.iter().map(|item| envelope_of(item.geometry())).collect();

    let footprints = envelopes
        .iter()
        .enumerate()
        .filter_map(|(idx, env)| env.map(|env| Footprint { idx, env }))
        .collect();

    (envelopes, RTree::bulk_load(footprints))
}
