//! # Run Report
//!
//! Everything a planner needs to review after a run, as serialisable DTOs.
//! Recoverable problems never abort the pipeline; they land here instead.

use serde::{Deserialize, Serialize};

use crate::model::{IdentityKey, Position, Technology};
use crate::Error;

// ============================================================================
// Issues
// ============================================================================

/// Category of a recovered problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MalformedRecord,
    FieldDerivation,
    InvalidPosition,
    UnresolvableConflict,
    /// Anything else that was logged and skipped, e.g. a planned field
    /// missing from one of the tables.
    Other,
}

/// A recovered problem, located by table row and/or cell identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<IdentityKey>,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self { kind, table: None, ordinal: None, key: None, message: message.into() }
    }

    /// Build an issue from a recoverable error, carrying over any row
    /// ordinal or identity key the error holds.
    pub fn from_error(err: &Error) -> Self {
        let (kind, ordinal, key) = match err {
            Error::MalformedRecord { ordinal, .. } => (IssueKind::MalformedRecord, Some(*ordinal), None),
            Error::FieldDerivation { .. } => (IssueKind::FieldDerivation, None, None),
            Error::InvalidPosition { key } => (IssueKind::InvalidPosition, None, Some(key.clone())),
            Error::UnresolvableConflict { key, .. } => (IssueKind::UnresolvableConflict, None, Some(key.clone())),
            _ => (IssueKind::Other, None, None),
        };
        Self { kind, table: None, ordinal, key, message: err.to_string() }
    }

    pub fn in_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn at_row(mut self, ordinal: usize) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    pub fn for_cell(mut self, key: IdentityKey) -> Self {
        self.key = Some(key);
        self
    }
}

// ============================================================================
// Conflicts and violations
// ============================================================================

/// A planned cell whose resolved neighbours already use every class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedConflict {
    pub key: IdentityKey,
    /// Resolved neighbours, ascending key order.
    pub neighbours: Vec<IdentityKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Co-sited cells share a class.
    SameSite,
    /// Neighbouring cells share a class.
    Neighbor,
    /// Same-frequency cells share a PCI inside the reuse distance.
    Reuse,
}

/// One side of a violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRef {
    pub key: IdentityKey,
    pub position: Option<Position>,
    pub pci: u16,
}

/// A residual conflict in the reconciled table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub a: CellRef,
    pub b: CellRef,
    pub distance_km: Option<f64>,
}

// ============================================================================
// RunReport
// ============================================================================

/// Outcome of one technology's run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub technology: Technology,
    pub updated_count: usize,
    pub inserted_count: usize,
    pub unchanged_count: usize,
    pub skipped_protected_count: usize,
    pub unmatched_count: usize,
    pub kept_count: usize,
    pub assigned_count: usize,
    pub unresolved_conflicts: Vec<UnresolvedConflict>,
    pub residual_violations: Vec<Violation>,
    pub issues: Vec<Issue>,
}

impl RunReport {
    pub fn new(technology: Technology) -> Self {
        Self {
            technology,
            updated_count: 0,
            inserted_count: 0,
            unchanged_count: 0,
            skipped_protected_count: 0,
            unmatched_count: 0,
            kept_count: 0,
            assigned_count: 0,
            unresolved_conflicts: Vec::new(),
            residual_violations: Vec::new(),
            issues: Vec::new(),
        }
    }

    /// True when the run left nothing for a planner to look at.
    pub fn is_clean(&self) -> bool {
        self.unresolved_conflicts.is_empty() && self.residual_violations.is_empty() && self.issues.is_empty()
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(e: u32, c: u32) -> IdentityKey {
        IdentityKey::Lte { enodeb_id: e, cell_id: c }
    }

    #[test]
    fn test_issue_from_error_keeps_location() {
        let issue = Issue::from_error(&Error::MalformedRecord { ordinal: 7, message: "cell ID is missing".into() })
            .in_table("planned");
        assert_eq!(issue.kind, IssueKind::MalformedRecord);
        assert_eq!(issue.ordinal, Some(7));
        assert_eq!(issue.table.as_deref(), Some("planned"));
        assert!(issue.message.contains("cell ID is missing"));

        let issue = Issue::from_error(&Error::InvalidPosition { key: key(1, 1) });
        assert_eq!(issue.key, Some(key(1, 1)));
    }

    #[test]
    fn test_report_json_field_names() {
        let mut report = RunReport::new(Technology::Nr);
        report.updated_count = 2;
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        for field in [
            "updated_count",
            "inserted_count",
            "unchanged_count",
            "skipped_protected_count",
            "unmatched_count",
            "kept_count",
            "assigned_count",
            "unresolved_conflicts",
            "residual_violations",
            "issues",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["technology"], "NR");
        assert_eq!(json["updated_count"], 2);
        assert!(report.is_clean());
    }
}
