//! Connected components and dissolve.

use geo::{BooleanOps, MultiPolygon};

use crate::adjacency::{build_graph, AdjacencyGraph};
use crate::feature::{MergedFeature, Polygonal};

/// Union-find over a flat index arena (path halving + union by rank).
#[derive(Debug, Clone)]
pub struct DisjointSets {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl DisjointSets {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size as u32).collect(),
            rank: vec![0; size],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] as usize != x {
            let grandparent = self.parent[self.parent[x] as usize];
            self.parent[x] = grandparent;
            x = grandparent as usize;
        }
        x
    }

    /// Returns `false` when both were already in one set.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }

        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb as u32,
            std::cmp::Ordering::Greater => self.parent[rb] = ra as u32,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra as u32;
                self.rank[ra] += 1;
            }
        }

        true
    }
}

/// Connected components, each ascending, ordered by smallest member.
pub fn components(graph: &AdjacencyGraph) -> Vec<Vec<usize>> {
    let n = graph.node_count();
    let mut sets = DisjointSets::new(n);

    for &(a, b) in graph.edges() {
        sets.union(a as usize, b as usize);
    }

    // Walking nodes in ascending order opens each component at its smallest
    // member, which fixes the output order.
    let mut slot_of_root: Vec<Option<usize>> = vec![None; n];
    let mut out: Vec<Vec<usize>> = Vec::new();

    for node in 0..n {
        let root = sets.find(node);
        let slot = *slot_of_root[root].get_or_insert_with(|| {
            out.push(Vec::new());
            out.len() - 1
        });
        out[slot].push(node);
    }

    out
}

/// Dissolve every component of `graph` into one merged feature.
pub fn merge_components<T: Polygonal>(items: &[T], graph: &AdjacencyGraph) -> Vec<MergedFeature> {
    debug_assert_eq!(items.len(), graph.node_count());

    components(graph)
        .into_iter()
        .map(|members| {
            let category = items[members[0]].category();

            let mut sources = Vec::with_capacity(members.len());
            for &m in &members {
                items[m].extend_sources(&mut sources);
            }

            let geometry = if let [single] = members.as_slice() {
                items[*single].geometry().clone()
            } else {
                union_all(members.iter().map(|&m| items[m].geometry().clone()).collect())
            };

            MergedFeature::from_parts(category, geometry, sources)
        })
        .collect()
}

/// Build the contiguity graph of `items` and dissolve its components.
pub fn dissolve<T: Polygonal>(items: &[T]) -> Vec<MergedFeature> {
    merge_components(items, &build_graph(items))
}

/// Cascaded union: pairwise rounds keep the operands of each boolean op
/// similar in size.
pub fn union_all(mut parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    while parts.len() > 1 {
        let mut next = Vec::with_capacity(parts.len().div_ceil(2));
        let mut it = parts.into_iter();

        while let Some(a) = it.next() {
            match it.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }

        parts = next;
    }

    parts.pop().unwrap_or_else(|| MultiPolygon::new(vec![]))
}
