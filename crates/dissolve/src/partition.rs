//! Grid partitioning of the feature set.
//!
//! Membership is by intersection, not ownership: a feature touching several
//! cells is a member of each of them. Cross-cell merge groups are closed
//! later by the stitch pass, so this duplication must stay.

use geo::{coord, Intersects, Rect};
use log::debug;

use crate::feature::Feature;
use crate::index::{self, rect_envelope};

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub bounds: Rect<f64>,
    /// Indices into the feature slice, ascending.
    pub members: Vec<usize>,
}

/// Cells per side for a target partition count: `ceil(sqrt(k))`.
pub fn grid_side(target: usize) -> usize {
    ((target.max(1) as f64).sqrt().ceil() as usize).max(1)
}

/// Split `features` over a `side × side` grid covering their union bbox.
/// Cells nothing intersects are left out; no features means no partitions.
pub fn partition(features: &[Feature], target: usize) -> Vec<Partition> {
    let (envelopes, tree) = index::build(features);

    let Some(extent) = union_extent(envelopes.iter().flatten()) else {
        return Vec::new();
    };

    let side = grid_side(target);
    let cell_w = extent.width() / side as f64;
    let cell_h = extent.height() / side as f64;

    // The last row and column end exactly on the extent so rounding never
    // leaves a sliver uncovered.
    let edge = |origin: f64, step: f64, end: f64, i: usize| {
        if i >= side {
            end
        } else {
            origin + i as f64 * step
        }
    };

    let mut partitions = Vec::new();

    for i in 0..side {
        for j in 0..side {
            let bounds = Rect::new(
                coord! {
                    x: edge(extent.min().x, cell_w, extent.max().x, i),
                    y: edge(extent.min().y, cell_h, extent.max().y, j),
                },
                coord! {
                    x: edge(extent.min().x, cell_w, extent.max().x, i + 1),
                    y: edge(extent.min().y, cell_h, extent.max().y, j + 1),
                },
            );

            let cell = bounds.to_polygon();
            let mut members: Vec<usize> = tree
                .locate_in_envelope_intersecting(&rect_envelope(bounds))
                .filter(|fp| features[fp.idx].geometry.intersects(&cell))
                .map(|fp| fp.idx)
                .collect();

            if members.is_empty() {
                continue;
            }

            members.sort_unstable();
            debug!("cell ({i}, {j}): {} features", members.len());

            partitions.push(Partition { bounds, members });
        }
    }

    partitions
}

fn union_extent<'a, I>(envelopes: I) -> Option<Rect<f64>>
where
    I: IntoIterator<Item = &'a rstar::AABB<[f64; 2]>>,
{
    let mut it = envelopes.into_iter();
    let first = it.next()?;
    let (mut lo, mut hi) = (first.lower(), first.upper());

    for env in it {
        let (l, u) = (env.lower(), env.upper());
        lo = [lo[0].min(l[0]), lo[1].min(l[1])];
        hi = [hi[0].max(u[0]), hi[1].max(u[1])];
    }

    Some(Rect::new(coord! { x: lo[0], y: lo[1] }, coord! { x: hi[0], y: hi[1] }))
}
