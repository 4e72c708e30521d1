//! # Conflict Validator
//!
//! Re-checks a finished table from scratch: parse, rebuild the conflict
//! graph, and list every pair that still collides. Read-only; the caller
//! decides what to do with the result.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::assign::{channel_of, Channel, ReuseRule};
use crate::config::{PlannerConfig, TechnologyConfig};
use crate::graph::{distance_km, ConflictGraph, ConflictGraphBuilder, EdgeKind, NodeIdx};
use crate::ingest::{IngestOptions, SourceTable};
use crate::model::{BitLengthPolicy, CellRecord, Table, Technology};
use crate::report::{CellRef, Violation, ViolationKind};
use crate::Result;

/// Parse `table` as an existing-network table and report its conflicts.
pub fn validate_table(
    table: &Table,
    technology: Technology,
    config: &PlannerConfig,
    policy: &dyn BitLengthPolicy,
) -> Result<Vec<Violation>> {
    let tech = config.technology(technology);
    let options = IngestOptions { protected_rows: config.protected_rows, mcc_len: config.mcc_len, policy };
    let source = SourceTable::parse("reconciled", table, technology, &tech.existing_columns, options)?;
    let graph = ConflictGraphBuilder::from_config(config).build(technology, &source.records).graph;
    Ok(find_violations(&graph, &source.records, tech, ReuseRule::from_config(config)))
}

/// Every class collision across a graph edge, then every same-channel PCI
/// reuse closer than the reuse distance.
///
/// A pair that is both an edge and a reuse pair is reported once, under its
/// edge kind.
pub fn find_violations(
    graph: &ConflictGraph,
    records: &[CellRecord],
    config: &TechnologyConfig,
    reuse: Option<ReuseRule>,
) -> Vec<Violation> {
    let record = |node: NodeIdx| &records[graph.source(node)];
    let mut violations = Vec::new();

    for edge in graph.edges() {
        let (a, b) = (record(edge.a), record(edge.b));
        let (Some(pa), Some(pb)) = (a.pci, b.pci) else { continue };
        if config.class_of(pa) != config.class_of(pb) {
            continue;
        }
        let kind = match edge.kind {
            EdgeKind::SameSite => ViolationKind::SameSite,
            EdgeKind::Neighbor => ViolationKind::Neighbor,
        };
        violations.push(violation(kind, a, b, edge.distance_km));
    }

    if let Some(rule) = reuse {
        let mut channels: BTreeMap<(Channel, u16), Vec<NodeIdx>> = BTreeMap::new();
        for node in 0..graph.node_count() as NodeIdx {
            let r = record(node);
            if let (Some(frequency), Some(pci), Some(_)) = (r.frequency, r.pci, r.position) {
                channels.entry((channel_of(frequency), pci)).or_default().push(node);
            }
        }
        for members in channels.values() {
            for (i, &x) in members.iter().enumerate() {
                for &y in &members[i + 1..] {
                    if graph.edge_kind(x, y).is_some() {
                        continue;
                    }
                    let (a, b) = (record(x), record(y));
                    let (Some(pa), Some(pb)) = (a.position, b.position) else { continue };
                    let d = distance_km(rule.metric, pa, pb);
                    if d < rule.distance_km {
                        violations.push(violation(ViolationKind::Reuse, a, b, Some(d)));
                    }
                }
            }
        }
    }

    for v in &violations {
        warn!(kind = ?v.kind, a = %v.a.key, b = %v.b.key, pci_a = v.a.pci, pci_b = v.b.pci, "residual conflict");
    }
    info!(technology = %graph.technology(), violations = violations.len(), "validation complete");
    violations
}

fn violation(kind: ViolationKind, a: &CellRecord, b: &CellRecord, distance_km: Option<f64>) -> Violation {
    Violation { kind, a: cell_ref(a), b: cell_ref(b), distance_km }
}

fn cell_ref(record: &CellRecord) -> CellRef {
    CellRef { key: record.key.clone(), position: record.position, pci: record.pci.unwrap_or_default() }
}
