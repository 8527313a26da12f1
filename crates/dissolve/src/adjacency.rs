//! Queen-contiguity graph over same-category polygons.
//!
//! Two items are adjacent when their geometries share at least one point,
//! so polygons meeting only at a corner are joined. Candidate pairs come
//! from an R-tree over bounding boxes; only those get the exact test.

use geo::Intersects;

use crate::feature::Polygonal;
use crate::index;

/// Undirected graph over item indices `0..node_count`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdjacencyGraph {
    node_count: usize,
    /// `(i, j)` with `i < j`, sorted.
    edges: Vec<(u32, u32)>,
}

impl AdjacencyGraph {
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn edges(&self) -> &[(u32, u32)] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_edge(&self, a: usize, b: usize) -> bool {
        let key = if a < b { (a as u32, b as u32) } else { (b as u32, a as u32) };
        self.edges.binary_search(&key).is_ok()
    }
}

pub fn build_graph<T: Polygonal>(items: &[T]) -> AdjacencyGraph {
    debug_assert!(
        items.windows(2).all(|w| w[0].category() == w[1].category()),
        "adjacency is built per category"
    );

    let (envelopes, tree) = index::build(items);
    let mut edges = Vec::new();

    for (i, env) in envelopes.iter().enumerate() {
        let Some(env) = env else { continue };

        for candidate in tree.locate_in_envelope_intersecting(env) {
            let j = candidate.idx;
            if j <= i {
                continue;
            }

            if items[i].geometry().intersects(items[j].geometry()) {
                edges.push((i as u32, j as u32));
            }
        }
    }

    edges.sort_unstable();

    AdjacencyGraph {
        node_count: items.len(),
        edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Feature, FeatureId};
    use geo::polygon;

    fn square(id: u64, x: f64, y: f64) -> Feature {
        Feature {
            id: FeatureId(id),
            category: 7,
            geometry: polygon![
                (x: x, y: y),
                (x: x + 1.0, y: y),
                (x: x + 1.0, y: y + 1.0),
                (x: x, y: y + 1.0),
            ]
            .into(),
            weight: 1,
        }
    }

    #[test]
    fn edge_and_corner_contact_both_count() {
        let items = [
            square(0, 0.0, 0.0),
            square(1, 1.0, 0.0), // shares an edge with 0
            square(2, 2.0, 1.0), // meets 1 only at (2, 1)
            square(3, 5.0, 5.0), // isolated
        ];

        let graph = build_graph(&items);

        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edges(), &[(0, 1), (1, 2)]);
        assert!(graph.contains_edge(2, 1));
        assert!(!graph.contains_edge(0, 2));
    }

    #[test]
    fn bbox_overlap_without_contact_is_not_an_edge() {
        // An L-shape whose bbox covers the small square, which sits in the
        // notch without touching.
        let l_shape = Feature {
            id: FeatureId(0),
            category: 7,
            geometry: polygon![
                (x: 0.0, y: 0.0),
                (x: 3.0, y: 0.0),
                (x: 3.0, y: 1.0),
                (x: 1.0, y: 1.0),
                (x: 1.0, y: 3.0),
                (x: 0.0, y: 3.0),
            ]
            .into(),
            weight: 1,
        };
        let notch = Feature {
            id: FeatureId(1),
            category: 7,
            geometry: polygon![
                (x: 2.0, y: 2.0),
                (x: 2.5, y: 2.0),
                (x: 2.5, y: 2.5),
                (x: 2.0, y: 2.5),
            ]
            .into(),
            weight: 1,
        };

        let graph = build_graph(&[l_shape, notch]);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn empty_input_gives_empty_graph() {
        let graph = build_graph::<Feature>(&[]);
        assert_eq!(graph, AdjacencyGraph::default());
    }
}
