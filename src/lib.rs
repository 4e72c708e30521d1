//! # pci-planner: Conflict-aware PCI planning for LTE and NR
//!
//! Assigns Physical Cell Identities so that cells which can interfere never
//! share a colliding class, then merges the result into an existing network
//! parameter table.
//!
//! ## Design Principles
//!
//! 1. **Tables in, tables out**: the caller reads and writes spreadsheets;
//!    this crate only sees [`Table`]s of [`Value`]s.
//! 2. **One ingestion boundary**: template header rows are cut off once and
//!    never reach the cell model.
//! 3. **Policy is injected**: thresholds and the gNodeB bit-length mapping
//!    come from [`PlannerConfig`] and a [`BitLengthPolicy`], never from
//!    constants.
//! 4. **Deterministic**: the same input always yields the same table.
//!
//! ## Quick Start
//!
//! ```rust
//! use pci_planner::{Planner, PlannerConfig, PlanningInput, Table, TechnologyInput, Value};
//!
//! # fn main() -> pci_planner::Result<()> {
//! let header = ["eNodeB ID", "Cell ID", "Site ID", "PCI"];
//! let template = || {
//!     Table::new(header)
//!         .with_row(header)
//!         .with_row(["mandatory", "mandatory", "optional", "optional"])
//!         .with_row(["long", "long", "string", "long"])
//! };
//! let existing = template().with_row([Value::from(1001), Value::from(1), Value::from("S1"), Value::from(5)]);
//! let planned = template().with_row([Value::from(1001), Value::from(2), Value::from("S1"), Value::Null]);
//!
//! let planner = Planner::new(PlannerConfig::new(1.5))?;
//! let output = planner.plan(&PlanningInput::default().with_lte(TechnologyInput { planned, existing }))?;
//!
//! let lte = output.lte.expect("LTE input was given");
//! assert_eq!(lte.report.inserted_count, 1);
//! println!("{}", lte.report.to_json()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! | Phase | Module |
//! |-------|--------|
//! | Parse rows into keyed cells | [`ingest`] |
//! | Build the conflict graph | [`graph`] |
//! | Colour planned cells | [`assign`] |
//! | Merge into the existing table | [`reconcile`] |
//! | Re-check the result | [`validate`] |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod config;
pub mod graph;
pub mod ingest;
pub mod assign;
pub mod reconcile;
pub mod validate;
pub mod report;

use tracing::info;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    BitLengthPolicy, BitLengthTable, CellRecord, FrequencyBand, IdentityKey,
    Position, Row, Table, Technology, Value,
};

// ============================================================================
// Re-exports: Configuration, engine and report
// ============================================================================

pub use config::{ColumnDefault, ColumnMap, DistanceMetric, PlannerConfig, ProximityConfig, TechnologyConfig};
pub use graph::{ConflictGraph, ConflictGraphBuilder, EdgeKind};
pub use assign::{Assignment, Decision, DecisionReason};
pub use report::{Issue, IssueKind, RunReport, UnresolvedConflict, Violation, ViolationKind};

use assign::{PlanningSet, ReuseRule};
use ingest::{IngestOptions, SourceTable};

// ============================================================================
// Inputs and outputs
// ============================================================================

/// The two tables of one technology.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TechnologyInput {
    /// Cells to plan. Rows may leave the PCI empty.
    pub planned: Table,
    /// The current network inventory.
    pub existing: Table,
}

/// What to plan. Either technology may be absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlanningInput {
    pub lte: Option<TechnologyInput>,
    pub nr: Option<TechnologyInput>,
}

impl PlanningInput {
    pub fn with_lte(mut self, input: TechnologyInput) -> Self {
        self.lte = Some(input);
        self
    }

    pub fn with_nr(mut self, input: TechnologyInput) -> Self {
        self.nr = Some(input);
        self
    }
}

/// Result of one technology's run.
#[derive(Debug, Clone, PartialEq)]
pub struct TechnologyOutput {
    /// The reconciled existing-network table.
    pub table: Table,
    pub assignment: Assignment,
    pub report: RunReport,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlanningOutput {
    pub lte: Option<TechnologyOutput>,
    pub nr: Option<TechnologyOutput>,
}

// ============================================================================
// Top-level Planner handle
// ============================================================================

/// The primary entry point. A `Planner` owns its configuration and the
/// gNodeB bit-length policy; every run is an explicit call on it.
pub struct Planner<P: BitLengthPolicy = BitLengthTable> {
    config: PlannerConfig,
    policy: P,
    builder: ConflictGraphBuilder,
}

impl Planner<BitLengthTable> {
    /// Planner using the bit-length bands from `config`.
    pub fn new(config: PlannerConfig) -> Result<Self> {
        let policy = config.bit_length_table();
        Self::with_policy(config, policy)
    }
}

impl<P: BitLengthPolicy> Planner<P> {
    /// Planner with a caller-supplied bit-length policy.
    pub fn with_policy(config: PlannerConfig, policy: P) -> Result<Self> {
        config.validate()?;
        let builder = ConflictGraphBuilder::from_config(&config);
        Ok(Self { config, policy, builder })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Plan every technology present in `input`. LTE and NR share nothing,
    /// so with the `parallel` feature they run concurrently.
    pub fn plan(&self, input: &PlanningInput) -> Result<PlanningOutput> {
        let run = |technology: Technology, input: &Option<TechnologyInput>| {
            input.as_ref().map(|i| self.plan_technology(technology, i)).transpose()
        };

        #[cfg(feature = "parallel")]
        let (lte, nr) = rayon::join(|| run(Technology::Lte, &input.lte), || run(Technology::Nr, &input.nr));
        #[cfg(not(feature = "parallel"))]
        let (lte, nr) = (run(Technology::Lte, &input.lte), run(Technology::Nr, &input.nr));

        Ok(PlanningOutput { lte: lte?, nr: nr? })
    }

    /// Run the full pipeline for one technology.
    pub fn plan_technology(&self, technology: Technology, input: &TechnologyInput) -> Result<TechnologyOutput> {
        let tech = self.config.technology(technology);
        let options = IngestOptions {
            protected_rows: self.config.protected_rows,
            mcc_len: self.config.mcc_len,
            policy: &self.policy,
        };

        // Phase 1: Ingest
        let existing = SourceTable::parse("existing", &input.existing, technology, &tech.existing_columns, options)?;
        let planned = SourceTable::parse("planned", &input.planned, technology, &tech.planned_columns, options)?;
        let set = PlanningSet::merge(&existing, &planned);
        info!(
            technology = %technology,
            existing = existing.records.len(),
            planned = planned.records.len(),
            pinned = set.len() - planned.records.len(),
            "tables ingested"
        );

        // Phase 2: Conflict graph
        let build = self.builder.build(technology, &set.records);
        info!(
            technology = %technology,
            nodes = build.graph.node_count(),
            edges = build.graph.edge_count(),
            excluded = build.excluded.len(),
            "conflict graph ready"
        );

        // Phase 3: Assign
        let assignment = assign::assign(&build.graph, &set, tech, ReuseRule::from_config(&self.config));

        // Phase 4: Reconcile
        let reconciled = reconcile::reconcile(&existing, &planned, &set, &assignment, tech)?;

        // Phase 5: Validate
        let violations = validate::validate_table(&reconciled.table, technology, &self.config, &self.policy)?;

        let mut report = RunReport::new(technology);
        report.updated_count = reconciled.updated;
        report.inserted_count = reconciled.inserted;
        report.unchanged_count = reconciled.unchanged;
        report.skipped_protected_count = reconciled.skipped_protected;
        report.unmatched_count = reconciled.unmatched;
        report.kept_count = assignment.kept_count();
        report.assigned_count = assignment.assigned_count();
        report.unresolved_conflicts = assignment.unresolved().to_vec();
        report.residual_violations = violations;
        report.issues.extend(existing.issues.iter().cloned());
        report.issues.extend(planned.issues.iter().cloned());
        report.issues.extend(
            build
                .excluded
                .iter()
                .map(|key| Issue::from_error(&Error::InvalidPosition { key: key.clone() })),
        );
        report.issues.extend(reconciled.issues);

        info!(
            technology = %technology,
            updated = report.updated_count,
            inserted = report.inserted_count,
            unresolved = report.unresolved_conflicts.len(),
            violations = report.residual_violations.len(),
            issues = report.issues.len(),
            "run complete"
        );
        Ok(TechnologyOutput { table: reconciled.table, assignment, report })
    }

    /// Check a finished existing-network table for residual conflicts.
    pub fn validate(&self, technology: Technology, table: &Table) -> Result<Vec<Violation>> {
        validate::validate_table(table, technology, &self.config, &self.policy)
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed record at row {ordinal}: {message}")]
    MalformedRecord { ordinal: usize, message: String },

    #[error("Cannot derive {field}: {message}")]
    FieldDerivation { field: String, message: String },

    #[error("Cell {key} has neither a site id nor a valid position")]
    InvalidPosition { key: IdentityKey },

    #[error("Cell {key}: every PCI class is taken by its {neighbours} resolved neighbours")]
    UnresolvableConflict { key: IdentityKey, neighbours: usize },

    #[error("Cell {key} appears twice in the {table} table (rows {first} and {second})")]
    IdentityCollision { table: String, key: IdentityKey, first: usize, second: usize },

    #[error("Column '{column}' not found in the {table} table")]
    MissingColumn { table: String, column: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
