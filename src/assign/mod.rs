//! # PCI Assignment
//!
//! Greedy modulo-class colouring over a [`ConflictGraph`].
//!
//! Two passes, both in priority order (descending degree, ascending key):
//!
//! 1. **Stability**: a planned cell keeps its current in-range PCI when no
//!    pinned or already-kept neighbour shares its class and the reuse rule
//!    holds. Kept cells are final.
//! 2. **Colouring**: every remaining planned cell takes a class unused by its
//!    resolved neighbours, then the lowest value of that class that honours
//!    the reuse distance.
//!
//! Pinned cells (existing network, not being planned) are never changed.
//! Resolved cells are never revisited.

use std::collections::BTreeMap;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::config::{DistanceMetric, PlannerConfig, TechnologyConfig};
use crate::graph::{distance_km, ConflictGraph, EdgeKind, NodeIdx};
use crate::ingest::SourceTable;
use crate::model::{CellRecord, IdentityKey, Technology};
use crate::report::UnresolvedConflict;
use crate::Error;

// ============================================================================
// Inputs
// ============================================================================

/// Whether the engine may change a cell's PCI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Existing-network cell outside this run's plan.
    Pinned,
    Planned,
}

/// The cells one technology run colours: pinned existing cells plus planned
/// cells, with `roles[i]` describing `records[i]`.
#[derive(Debug, Clone, Default)]
pub struct PlanningSet {
    pub records: Vec<CellRecord>,
    pub roles: Vec<Role>,
}

impl PlanningSet {
    /// Existing cells not named in the plan become pinned. Planned cells take
    /// any field they leave blank from the matching existing cell, including
    /// the current PCI, so re-running a plan against its own output keeps
    /// every valid PCI.
    pub fn merge(existing: &SourceTable<'_>, planned: &SourceTable<'_>) -> Self {
        let mut set = Self::default();
        for record in &existing.records {
            if !planned.contains(&record.key) {
                set.push(record.clone(), Role::Pinned);
            }
        }
        for record in &planned.records {
            let mut merged = record.clone();
            if let Some(current) = existing.get(&record.key) {
                fill_from(&mut merged, current);
            }
            set.push(merged, Role::Planned);
        }
        set
    }

    pub fn push(&mut self, record: CellRecord, role: Role) {
        self.records.push(record);
        self.roles.push(role);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn planned(&self) -> impl Iterator<Item = &CellRecord> {
        self.records
            .iter()
            .zip(&self.roles)
            .filter(|(_, role)| **role == Role::Planned)
            .map(|(record, _)| record)
    }
}

fn fill_from(target: &mut CellRecord, source: &CellRecord) {
    if target.site.is_none() {
        target.site = source.site.clone();
    }
    if target.position.is_none() {
        target.position = source.position;
    }
    if target.azimuth.is_none() {
        target.azimuth = source.azimuth;
    }
    if target.frequency.is_none() {
        target.frequency = source.frequency;
    }
    if target.gnodeb_bits.is_none() {
        target.gnodeb_bits = source.gnodeb_bits;
    }
    if target.pci.is_none() {
        target.pci = source.pci;
    }
    if target.name.is_none() {
        target.name = source.name.clone();
    }
}

/// Minimum distance between same-frequency cells sharing an exact PCI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReuseRule {
    pub distance_km: f64,
    pub metric: DistanceMetric,
}

impl ReuseRule {
    pub fn from_config(config: &PlannerConfig) -> Option<Self> {
        config
            .reuse_distance_km
            .map(|distance_km| Self { distance_km, metric: config.proximity.metric })
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// The current PCI was valid and kept.
    Kept,
    /// A new PCI was chosen.
    Assigned,
    /// A new PCI in the class of the previous one.
    PreservedClass,
    /// No value of the chosen class met the reuse distance; the one with the
    /// largest reuse distance was taken.
    ReuseRelaxed,
}

/// Outcome for one planned cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub pci: u16,
    pub previous: Option<u16>,
    pub reason: DecisionReason,
    /// Distance to the nearest resolved same-frequency cell with the same PCI.
    pub min_reuse_km: Option<f64>,
}

/// PCI decisions for one technology.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub technology: Technology,
    decisions: BTreeMap<IdentityKey, Decision>,
    unresolved: Vec<UnresolvedConflict>,
}

impl Assignment {
    pub fn new(technology: Technology) -> Self {
        Self { technology, decisions: BTreeMap::new(), unresolved: Vec::new() }
    }

    pub fn pci(&self, key: &IdentityKey) -> Option<u16> {
        self.decisions.get(key).map(|d| d.pci)
    }

    pub fn decision(&self, key: &IdentityKey) -> Option<&Decision> {
        self.decisions.get(key)
    }

    /// Decisions in ascending key order.
    pub fn decisions(&self) -> impl Iterator<Item = (&IdentityKey, &Decision)> {
        self.decisions.iter()
    }

    pub fn unresolved(&self) -> &[UnresolvedConflict] {
        &self.unresolved
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn kept_count(&self) -> usize {
        self.decisions.values().filter(|d| d.reason == DecisionReason::Kept).count()
    }

    pub fn assigned_count(&self) -> usize {
        self.decisions.len() - self.kept_count()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Colour the planned cells of `set`.
///
/// `graph` must have been built from `set.records`.
pub fn assign(
    graph: &ConflictGraph,
    set: &PlanningSet,
    config: &TechnologyConfig,
    reuse: Option<ReuseRule>,
) -> Assignment {
    let mut engine = Engine::new(graph, set, config, reuse);
    let order = graph.priority_order();
    engine.seed_pinned();
    engine.stability_pass(&order);
    engine.colouring_pass(&order);

    let assignment = engine.out;
    info!(
        technology = %graph.technology(),
        kept = assignment.kept_count(),
        assigned = assignment.assigned_count(),
        unresolved = assignment.unresolved.len(),
        "assignment complete"
    );
    assignment
}

/// Frequency bucket: 0.01 resolution so `1850` and `1850.0` agree.
pub(crate) type Channel = i64;

pub(crate) fn channel_of(frequency: f64) -> Channel {
    (frequency * 100.0).round() as Channel
}

struct Engine<'a> {
    graph: &'a ConflictGraph,
    set: &'a PlanningSet,
    config: &'a TechnologyConfig,
    reuse: Option<ReuseRule>,
    metric: DistanceMetric,
    /// node → resolved PCI
    pci: Vec<Option<u16>>,
    /// (channel, pci) → resolved nodes with a position on that channel
    reusers: HashMap<(Channel, u16), SmallVec<[NodeIdx; 4]>>,
    /// Same index over the PCIs every cell arrived with.
    inputs: HashMap<(Channel, u16), SmallVec<[NodeIdx; 4]>>,
    /// Classes with at least one PCI inside the configured range.
    available: Vec<bool>,
    out: Assignment,
}

impl<'a> Engine<'a> {
    fn new(
        graph: &'a ConflictGraph,
        set: &'a PlanningSet,
        config: &'a TechnologyConfig,
        reuse: Option<ReuseRule>,
    ) -> Self {
        let available = (0..config.modulus)
            .map(|class| first_value(config, class).is_some())
            .collect();
        let mut inputs: HashMap<(Channel, u16), SmallVec<[NodeIdx; 4]>> = HashMap::new();
        for node in 0..graph.node_count() as NodeIdx {
            let record = &set.records[graph.source(node)];
            if let (Some(frequency), Some(pci), Some(_)) = (record.frequency, record.pci, record.position) {
                inputs.entry((channel_of(frequency), pci)).or_default().push(node);
            }
        }
        Self {
            graph,
            set,
            config,
            reuse,
            metric: reuse.map(|r| r.metric).unwrap_or_default(),
            pci: vec![None; graph.node_count()],
            reusers: HashMap::new(),
            inputs,
            available,
            out: Assignment::new(graph.technology()),
        }
    }

    fn record(&self, node: NodeIdx) -> &'a CellRecord {
        &self.set.records[self.graph.source(node)]
    }

    fn role(&self, node: NodeIdx) -> Role {
        self.set.roles[self.graph.source(node)]
    }

    fn resolve(&mut self, node: NodeIdx, pci: u16) {
        self.pci[node as usize] = Some(pci);
        let record = self.record(node);
        if let (Some(frequency), Some(_)) = (record.frequency, record.position) {
            self.reusers.entry((channel_of(frequency), pci)).or_default().push(node);
        }
    }

    fn decide(&mut self, node: NodeIdx, pci: u16, reason: DecisionReason) {
        let min_reuse_km = self.min_reuse_km(node, pci);
        let record = self.record(node);
        debug!(cell = %record.key, pci, previous = ?record.pci, ?reason, "pci decided");
        self.out.decisions.insert(
            record.key.clone(),
            Decision { pci, previous: record.pci, reason, min_reuse_km },
        );
        self.resolve(node, pci);
    }

    fn seed_pinned(&mut self) {
        for node in 0..self.graph.node_count() as NodeIdx {
            if self.role(node) == Role::Pinned {
                if let Some(pci) = self.record(node).pci {
                    self.resolve(node, pci);
                }
            }
        }
    }

    fn stability_pass(&mut self, order: &[NodeIdx]) {
        for &node in order {
            if self.role(node) != Role::Planned {
                continue;
            }
            let Some(pci) = self.record(node).pci else { continue };
            if !self.config.in_range(pci) {
                continue;
            }
            let class = self.config.class_of(pci);
            let clashes = self.graph.neighbors(node).iter().any(|&(other, _)| {
                self.pci[other as usize].is_some_and(|p| self.config.class_of(p) == class)
            });
            if clashes || !self.reuse_tolerable(node, pci) {
                continue;
            }
            self.decide(node, pci, DecisionReason::Kept);
        }
    }

    fn colouring_pass(&mut self, order: &[NodeIdx]) {
        let modulus = self.config.modulus as usize;
        for &node in order {
            if self.role(node) != Role::Planned || self.pci[node as usize].is_some() {
                continue;
            }

            let mut used = vec![false; modulus];
            for &(other, _) in self.graph.neighbors(node) {
                if let Some(p) = self.pci[other as usize] {
                    used[self.config.class_of(p) as usize] = true;
                }
            }
            let free: Vec<u16> = (0..self.config.modulus)
                .filter(|&c| self.available[c as usize] && !used[c as usize])
                .collect();

            if free.is_empty() {
                self.record_unresolved(node);
                continue;
            }

            let (class, preserved) = self.pick_class(node, &free);
            let (pci, relaxed) = self.pick_value(node, class);
            let reason = if relaxed {
                DecisionReason::ReuseRelaxed
            } else if preserved {
                DecisionReason::PreservedClass
            } else {
                DecisionReason::Assigned
            };
            self.decide(node, pci, reason);
        }
    }

    /// Returns the class and whether it is the previous PCI's class.
    fn pick_class(&self, node: NodeIdx, free: &[u16]) -> (u16, bool) {
        if self.config.preserve_class {
            if let Some(previous) = self.record(node).pci {
                let class = self.config.class_of(previous);
                if free.contains(&class) {
                    return (class, true);
                }
            }
        }

        if let Some(secondary) = self.config.secondary_modulus {
            let site_residues: SmallVec<[u16; 8]> = self
                .graph
                .neighbors(node)
                .iter()
                .filter(|(_, kind)| *kind == EdgeKind::SameSite)
                .filter_map(|&(other, _)| self.pci[other as usize])
                .map(|p| p % secondary)
                .collect();
            if let Some(&class) = free.iter().find(|&&c| !site_residues.contains(&(c % secondary))) {
                return (class, false);
            }
        }

        (free[0], false)
    }

    /// Lowest value of `class` that honours the reuse distance. Same-site
    /// uniqueness needs no check here: co-sited cells are neighbours, so the
    /// class is already unused at the site.
    ///
    /// Returns the value and whether the reuse rule had to be relaxed.
    fn pick_value(&self, node: NodeIdx, class: u16) -> (u16, bool) {
        let mut values = class_values(self.config, class);
        let Some(rule) = self.reuse else {
            return (values.next().unwrap_or(class), false);
        };

        let mut best: Option<(u16, f64)> = None;
        for value in values {
            let nearest = match self.min_reuse_km(node, value) {
                None => return (value, false),
                Some(d) if d >= rule.distance_km => return (value, false),
                Some(d) => d,
            };
            if best.is_none_or(|(_, d)| nearest > d) {
                best = Some((value, nearest));
            }
        }
        match best {
            Some((value, _)) => (value, true),
            None => (class, true),
        }
    }

    /// A current PCI too close to a resolved reuser survives only when no
    /// value of its class is clear of every PCI the cells arrived with.
    fn reuse_tolerable(&self, node: NodeIdx, pci: u16) -> bool {
        let Some(rule) = self.reuse else { return true };
        if self.min_reuse_km(node, pci).is_none_or(|d| d >= rule.distance_km) {
            return true;
        }
        !class_values(self.config, self.config.class_of(pci))
            .any(|value| self.nearest_in(&self.inputs, node, value).is_none_or(|d| d >= rule.distance_km))
    }

    /// Nearest resolved cell on the same channel with the same PCI.
    fn min_reuse_km(&self, node: NodeIdx, pci: u16) -> Option<f64> {
        self.nearest_in(&self.reusers, node, pci)
    }

    fn nearest_in(
        &self,
        index: &HashMap<(Channel, u16), SmallVec<[NodeIdx; 4]>>,
        node: NodeIdx,
        pci: u16,
    ) -> Option<f64> {
        let record = self.record(node);
        let (frequency, position) = (record.frequency?, record.position?);
        let others = index.get(&(channel_of(frequency), pci))?;
        others
            .iter()
            .filter(|&&other| other != node)
            .filter_map(|&other| self.record(other).position)
            .map(|p| distance_km(self.metric, position, p))
            .min_by(f64::total_cmp)
    }

    fn record_unresolved(&mut self, node: NodeIdx) {
        let key = self.record(node).key.clone();
        let neighbours: Vec<IdentityKey> = self
            .graph
            .neighbors(node)
            .iter()
            .filter(|(other, _)| self.pci[*other as usize].is_some())
            .map(|(other, _)| self.graph.key(*other).clone())
            .collect();
        let err = Error::UnresolvableConflict { key: key.clone(), neighbours: neighbours.len() };
        warn!(cell = %key, error = %err, "leaving cell without a PCI");
        self.out.unresolved.push(UnresolvedConflict { key, neighbours });
    }
}

/// Lowest in-range PCI of `class`.
fn first_value(config: &TechnologyConfig, class: u16) -> Option<u16> {
    let (modulus, min) = (u32::from(config.modulus), u32::from(config.pci_min));
    let mut first = min - min % modulus + u32::from(class);
    if first < min {
        first += modulus;
    }
    u16::try_from(first).ok().filter(|v| *v <= config.pci_max)
}

/// In-range PCIs of `class`, ascending.
fn class_values(config: &TechnologyConfig, class: u16) -> impl Iterator<Item = u16> + use<> {
    let step = usize::from(config.modulus);
    let max = config.pci_max;
    first_value(config, class)
        .into_iter()
        .flat_map(move |first| (first..=max).step_by(step))
}
