//! Conflict graph construction.
//!
//! Same-site edges come from grouping by site id. Proximity edges come from
//! a uniform lat/lon grid whose cells are at least one threshold wide, so a
//! conflicting pair always lies in the same or an adjacent grid cell. Only
//! those pairs are measured, which keeps sparse deployments near-linear.

use std::collections::BTreeMap;

use hashbrown::HashMap;
use tracing::{debug, warn};

use super::geo::{distance_km, km_per_degree};
use super::{ConflictGraph, Edge, EdgeKind, NodeIdx};
use crate::config::{PlannerConfig, ProximityConfig};
use crate::model::{CellRecord, IdentityKey, Position, Technology};

/// Beyond this latitude the grid stops splitting by longitude.
const MAX_GRID_LAT_DEG: f64 = 89.0;

/// Forward neighbour offsets. Scanning these from every bucket visits each
/// adjacent bucket pair exactly once.
const FORWARD: [(i64, i64); 4] = [(0, 1), (1, -1), (1, 0), (1, 1)];

type BucketKey = (i64, i64);

/// Output of a build: the graph plus cells that could not be placed.
#[derive(Debug, Clone)]
pub struct GraphBuild {
    pub graph: ConflictGraph,
    /// Cells with neither a site id nor a position.
    pub excluded: Vec<IdentityKey>,
}

/// Builds conflict graphs for one technology at a time.
#[derive(Debug, Clone, Copy)]
pub struct ConflictGraphBuilder {
    proximity: ProximityConfig,
    colocation_tolerance_deg: f64,
}

/// Per-node placement data borrowed from the records.
struct Placed<'a> {
    site: Option<&'a str>,
    position: Option<Position>,
}

impl ConflictGraphBuilder {
    pub fn new(proximity: ProximityConfig, colocation_tolerance_deg: f64) -> Self {
        Self { proximity, colocation_tolerance_deg }
    }

    pub fn from_config(config: &PlannerConfig) -> Self {
        Self::new(config.proximity, config.colocation_tolerance_deg)
    }

    /// Build the graph over `records` of `technology`.
    ///
    /// Records of the other technology are ignored. Graph nodes refer back to
    /// positions in `records` through [`ConflictGraph::source`].
    pub fn build(&self, technology: Technology, records: &[CellRecord]) -> GraphBuild {
        let mut excluded = Vec::new();
        let mut nodes: Vec<(IdentityKey, usize)> = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            if record.technology() != technology {
                continue;
            }
            let place = record.conflict_position();
            if place.site.is_none() && place.position.is_none() {
                warn!(cell = %record.key, "cell has neither site id nor position; excluded from conflict graph");
                excluded.push(record.key.clone());
                continue;
            }
            nodes.push((record.key.clone(), idx));
        }
        nodes.sort_by(|a, b| a.0.cmp(&b.0));
        excluded.sort();

        let placed: Vec<Placed<'_>> = nodes
            .iter()
            .map(|(_, idx)| {
                let place = records[*idx].conflict_position();
                Placed { site: place.site, position: place.position }
            })
            .collect();

        let mut raw = self.same_site_edges(&placed);
        raw.extend(self.proximity_edges(&placed));

        let graph = ConflictGraph::from_edges(technology, nodes, raw);
        debug!(
            technology = %technology,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            excluded = excluded.len(),
            "conflict graph built"
        );
        GraphBuild { graph, excluded }
    }

    /// Every pair sharing a site id is a clique edge.
    fn same_site_edges(&self, placed: &[Placed<'_>]) -> Vec<Edge> {
        let mut by_site: BTreeMap<&str, Vec<NodeIdx>> = BTreeMap::new();
        for (i, p) in placed.iter().enumerate() {
            if let Some(site) = p.site {
                by_site.entry(site).or_default().push(i as NodeIdx);
            }
        }
        let mut edges = Vec::new();
        for members in by_site.values() {
            for (i, &a) in members.iter().enumerate() {
                for &b in &members[i + 1..] {
                    let distance = match (placed[a as usize].position, placed[b as usize].position) {
                        (Some(pa), Some(pb)) => Some(distance_km(self.proximity.metric, pa, pb)),
                        _ => None,
                    };
                    edges.push(Edge::new(a, b, EdgeKind::SameSite, distance));
                }
            }
        }
        edges
    }

    fn proximity_edges(&self, placed: &[Placed<'_>]) -> Vec<Edge> {
        let positioned: Vec<(NodeIdx, Position)> = placed
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.position.map(|pos| (i as NodeIdx, pos)))
            .collect();
        if positioned.len() < 2 {
            return Vec::new();
        }

        let (lat_step, lon_step) = self.grid_steps(&positioned);
        let mut buckets: BTreeMap<BucketKey, Vec<(NodeIdx, Position)>> = BTreeMap::new();
        for &(node, pos) in &positioned {
            let key = ((pos.lat / lat_step).floor() as i64, (pos.lon / lon_step).floor() as i64);
            buckets.entry(key).or_default().push((node, pos));
        }
        let bucket_list: Vec<(BucketKey, Vec<(NodeIdx, Position)>)> = buckets.into_iter().collect();
        let lookup: HashMap<BucketKey, usize> =
            bucket_list.iter().enumerate().map(|(i, (k, _))| (*k, i)).collect();

        let scan = |(key, members): &(BucketKey, Vec<(NodeIdx, Position)>)| -> Vec<Edge> {
            let mut out = Vec::new();
            for (i, a) in members.iter().enumerate() {
                for b in &members[i + 1..] {
                    self.test_pair(placed, *a, *b, &mut out);
                }
            }
            for (dy, dx) in FORWARD {
                if let Some(&other) = lookup.get(&(key.0 + dy, key.1 + dx)) {
                    for a in members {
                        for b in &bucket_list[other].1 {
                            self.test_pair(placed, *a, *b, &mut out);
                        }
                    }
                }
            }
            out
        };

        #[cfg(feature = "parallel")]
        let chunks: Vec<Vec<Edge>> = {
            use rayon::prelude::*;
            bucket_list.par_iter().map(scan).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let chunks: Vec<Vec<Edge>> = bucket_list.iter().map(scan).collect();

        chunks.into_iter().flatten().collect()
    }

    /// Grid steps in degrees. Both are at least one search radius wide at the
    /// highest latitude present, so neighbours never skip a bucket.
    ///
    /// Near a pole a degree of longitude shrinks towards nothing; there the
    /// grid falls back to whole latitude bands.
    fn grid_steps(&self, positioned: &[(NodeIdx, Position)]) -> (f64, f64) {
        let tolerance_km = self.colocation_tolerance_deg * km_per_degree();
        let radius_km = self.proximity.threshold_km.max(tolerance_km);
        let lat_step = radius_km / km_per_degree();

        let max_abs_lat = positioned.iter().map(|(_, p)| p.lat.abs()).fold(0.0_f64, f64::max);
        let scale_lat = max_abs_lat + lat_step;
        if scale_lat >= MAX_GRID_LAT_DEG {
            return (lat_step, 360.0);
        }
        let lon_step = (lat_step / scale_lat.to_radians().cos()).min(360.0);
        (lat_step, lon_step)
    }

    fn test_pair(
        &self,
        placed: &[Placed<'_>],
        (a, pa): (NodeIdx, Position),
        (b, pb): (NodeIdx, Position),
        out: &mut Vec<Edge>,
    ) {
        let (sa, sb) = (placed[a as usize].site, placed[b as usize].site);
        let distance = distance_km(self.proximity.metric, pa, pb);

        // Site ids decide co-siting when both cells carry one; otherwise
        // coordinates within the tolerance do.
        let colocated = (sa.is_none() || sb.is_none())
            && (pa.lat - pb.lat).abs() < self.colocation_tolerance_deg
            && (pa.lon - pb.lon).abs() < self.colocation_tolerance_deg;

        if colocated {
            out.push(Edge::new(a, b, EdgeKind::SameSite, Some(distance)));
        } else if distance < self.proximity.threshold_km {
            out.push(Edge::new(a, b, EdgeKind::Neighbor, Some(distance)));
        }
    }
}
