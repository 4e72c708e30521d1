//! # Conflict Graph
//!
//! Undirected graph over one technology's cells. An edge means "must not
//! share a PCI class". Nodes are numbered in ascending identity-key order and
//! edges are kept sorted, so every traversal is deterministic.

pub mod builder;
pub mod geo;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::model::{IdentityKey, Technology};

pub use builder::{ConflictGraphBuilder, GraphBuild};
pub use geo::{distance_km, haversine_km, planar_km, EARTH_RADIUS_KM};

/// Dense node index into a [`ConflictGraph`].
pub type NodeIdx = u32;

/// Why two cells conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Same site id, or co-located within the colocation tolerance.
    SameSite,
    /// Closer than the proximity threshold.
    Neighbor,
}

/// An undirected edge with `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub a: NodeIdx,
    pub b: NodeIdx,
    pub kind: EdgeKind,
    /// Distance between the two cells when both have positions.
    pub distance_km: Option<f64>,
}

impl Edge {
    pub fn new(a: NodeIdx, b: NodeIdx, kind: EdgeKind, distance_km: Option<f64>) -> Self {
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        Self { a, b, kind, distance_km }
    }
}

/// Conflict graph for one technology.
#[derive(Debug, Clone)]
pub struct ConflictGraph {
    technology: Technology,
    keys: Vec<IdentityKey>,
    /// node → index of the record it was built from
    sources: Vec<usize>,
    index: HashMap<IdentityKey, NodeIdx>,
    /// node → (neighbour, kind), sorted by neighbour
    adjacency: Vec<SmallVec<[(NodeIdx, EdgeKind); 8]>>,
    edges: Vec<Edge>,
}

impl ConflictGraph {
    /// Assemble a graph from nodes and a raw edge list.
    ///
    /// `nodes` must already be in ascending key order. Duplicate edges are
    /// merged; when both kinds are present `SameSite` wins. Self-loops are
    /// dropped.
    pub fn from_edges(
        technology: Technology,
        nodes: Vec<(IdentityKey, usize)>,
        mut raw: Vec<Edge>,
    ) -> Self {
        debug_assert!(nodes.windows(2).all(|w| w[0].0 < w[1].0), "nodes must be key-sorted");

        raw.retain(|e| e.a != e.b);
        raw.sort_by(|x, y| (x.a, x.b, x.kind).cmp(&(y.a, y.b, y.kind)));
        raw.dedup_by(|later, earlier| {
            if later.a == earlier.a && later.b == earlier.b {
                if earlier.distance_km.is_none() {
                    earlier.distance_km = later.distance_km;
                }
                true
            } else {
                false
            }
        });

        let mut adjacency = vec![SmallVec::new(); nodes.len()];
        for e in &raw {
            adjacency[e.a as usize].push((e.b, e.kind));
            adjacency[e.b as usize].push((e.a, e.kind));
        }
        for list in &mut adjacency {
            list.sort_unstable_by_key(|(n, _)| *n);
        }

        let (keys, sources): (Vec<_>, Vec<_>) = nodes.into_iter().unzip();
        let index = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i as NodeIdx))
            .collect();

        Self { technology, keys, sources, index, adjacency, edges: raw }
    }

    pub fn technology(&self) -> Technology {
        self.technology
    }

    pub fn node_count(&self) -> usize {
        self.keys.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[IdentityKey] {
        &self.keys
    }

    pub fn key(&self, node: NodeIdx) -> &IdentityKey {
        &self.keys[node as usize]
    }

    /// Index of the record this node was built from.
    pub fn source(&self, node: NodeIdx) -> usize {
        self.sources[node as usize]
    }

    pub fn index_of(&self, key: &IdentityKey) -> Option<NodeIdx> {
        self.index.get(key).copied()
    }

    pub fn neighbors(&self, node: NodeIdx) -> &[(NodeIdx, EdgeKind)] {
        &self.adjacency[node as usize]
    }

    pub fn degree(&self, node: NodeIdx) -> usize {
        self.adjacency[node as usize].len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Kind of the edge between two nodes, if any.
    pub fn edge_kind(&self, a: NodeIdx, b: NodeIdx) -> Option<EdgeKind> {
        let list = &self.adjacency[a as usize];
        list.binary_search_by_key(&b, |(n, _)| *n).ok().map(|i| list[i].1)
    }

    /// Nodes in colouring priority: descending degree, then ascending key.
    pub fn priority_order(&self) -> Vec<NodeIdx> {
        let mut order: Vec<NodeIdx> = (0..self.keys.len() as NodeIdx).collect();
        // Node indices already follow key order, so a stable sort on degree
        // leaves key order as the tie-break.
        order.sort_by(|a, b| self.degree(*b).cmp(&self.degree(*a)));
        order
    }
}
