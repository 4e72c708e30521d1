//! # Reconciliation
//!
//! Merges an [`Assignment`] into the existing network table.
//!
//! The existing table is copied and edited in place: column order and row
//! order are preserved, protected rows are never touched, and cells that are
//! not being planned keep every value they had. New cells are appended after
//! the existing rows in planned order.

use tracing::{debug, info, warn};

use crate::assign::{Assignment, PlanningSet};
use crate::config::{ColumnDefault, TechnologyConfig};
use crate::ingest::SourceTable;
use crate::model::{CellRecord, IdentityKey, ResolvedColumns, Row, Table, Technology, Value};
use crate::report::{Issue, IssueKind};
use crate::{Error, Result};

/// The reconciled table and what happened to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub table: Table,
    pub updated: usize,
    pub inserted: usize,
    pub unchanged: usize,
    pub skipped_protected: usize,
    pub unmatched: usize,
    pub issues: Vec<Issue>,
}

/// A planned field present in both tables.
#[derive(Debug, Clone, Copy)]
struct FieldPair {
    planned: usize,
    existing: usize,
}

/// Write `assignment` and the planned fields into a copy of `existing`.
///
/// `set` supplies the merged planned records (planned values with blanks
/// filled from the existing inventory); matching is by exact identity key.
/// Inserted rows take `config.defaults` in any cell still blank.
pub fn reconcile(
    existing: &SourceTable<'_>,
    planned: &SourceTable<'_>,
    set: &PlanningSet,
    assignment: &Assignment,
    config: &TechnologyConfig,
) -> Result<Reconciliation> {
    let pci_col = existing.columns.pci.ok_or_else(|| Error::MissingColumn {
        table: existing.name.to_string(),
        column: "PCI".into(),
    })?;

    let mut issues = Vec::new();
    let fields = resolve_fields(existing, planned, pci_col, &config.planned_fields, &mut issues);
    let defaults = resolve_defaults(existing, pci_col, &config.defaults, &mut issues);

    let mut out = Reconciliation {
        table: existing.table.clone(),
        updated: 0,
        inserted: 0,
        unchanged: 0,
        skipped_protected: existing.protected_count(),
        unmatched: 0,
        issues,
    };
    let mut appended: Vec<Row> = Vec::new();

    for record in set.planned() {
        let Some(source) = planned.get(&record.key) else { continue };
        let planned_row = &planned.table.rows[source.ordinal];
        let pci = assignment.pci(&record.key);

        if let Some(current) = existing.get(&record.key) {
            let row = &mut out.table.rows[current.ordinal];
            let mut changed = false;
            if let Some(pci) = pci {
                changed |= set_if_different(row, pci_col, Value::from(pci));
            }
            for pair in &fields {
                let value = planned_row.get(pair.planned);
                if !value.is_blank() {
                    changed |= set_if_different(row, pair.existing, value.clone());
                }
            }
            changed |= fill_gnodeb_length(row, &existing.columns, record);

            if changed {
                debug!(cell = %record.key, ordinal = current.ordinal, "row updated");
                out.updated += 1;
            } else {
                out.unchanged += 1;
            }
        } else if let Some(pci) = pci {
            let mut row = new_row(existing.table.columns.len(), &existing.columns, record);
            row.set(pci_col, Value::from(pci));
            for pair in &fields {
                let value = planned_row.get(pair.planned);
                if !value.is_blank() {
                    row.set(pair.existing, value.clone());
                }
            }
            if let Some(plmn) = existing.columns.plmn {
                if let Some(col) = planned.columns.plmn {
                    if row.get(plmn).is_blank() {
                        row.set(plmn, planned_row.get(col).clone());
                    }
                }
            }
            for (col, value) in &defaults {
                if row.get(*col).is_blank() {
                    row.set(*col, value.clone());
                }
            }
            debug!(cell = %record.key, pci, "row inserted");
            appended.push(row);
            out.inserted += 1;
        } else {
            debug!(cell = %record.key, "no existing row and no PCI");
            out.unmatched += 1;
        }
    }

    out.table.rows.extend(appended);
    info!(
        technology = %existing.technology,
        updated = out.updated,
        inserted = out.inserted,
        unchanged = out.unchanged,
        unmatched = out.unmatched,
        skipped_protected = out.skipped_protected,
        "reconciliation complete"
    );
    Ok(out)
}

fn resolve_fields(
    existing: &SourceTable<'_>,
    planned: &SourceTable<'_>,
    pci_col: usize,
    names: &[String],
    issues: &mut Vec<Issue>,
) -> Vec<FieldPair> {
    let identity = identity_columns(&existing.columns);
    let mut pairs = Vec::with_capacity(names.len());
    for name in names {
        match (planned.table.find_column(name), existing.table.find_column(name)) {
            (Some(_), Some(e)) if e == pci_col || identity.contains(&e) => {
                warn!(field = %name, "planned field maps onto an identity or PCI column; ignored");
            }
            (Some(p), Some(e)) => pairs.push(FieldPair { planned: p, existing: e }),
            (p, _) => {
                let table = if p.is_none() { planned.name } else { existing.name };
                warn!(field = %name, table, "planned field not found; ignored");
                issues.push(
                    Issue::new(IssueKind::Other, format!("planned field '{name}' has no column"))
                        .in_table(table),
                );
            }
        }
    }
    pairs
}

/// Template defaults that land on an ordinary column of the existing table.
fn resolve_defaults(
    existing: &SourceTable<'_>,
    pci_col: usize,
    defaults: &[ColumnDefault],
    issues: &mut Vec<Issue>,
) -> Vec<(usize, Value)> {
    let identity = identity_columns(&existing.columns);
    let mut resolved = Vec::with_capacity(defaults.len());
    for default in defaults {
        match existing.table.find_column(&default.column) {
            Some(col) if col == pci_col || identity.contains(&col) => {
                warn!(column = %default.column, "default maps onto an identity or PCI column; ignored");
            }
            Some(col) => resolved.push((col, default.value.clone())),
            None => {
                warn!(column = %default.column, table = existing.name, "default column not found; ignored");
                issues.push(
                    Issue::new(IssueKind::Other, format!("default column '{}' not found", default.column))
                        .in_table(existing.name),
                );
            }
        }
    }
    resolved
}

fn identity_columns(cols: &ResolvedColumns) -> Vec<usize> {
    [Some(cols.node_id), Some(cols.cell_id), cols.mcc, cols.mnc, cols.plmn]
        .into_iter()
        .flatten()
        .collect()
}

fn set_if_different(row: &mut Row, col: usize, value: Value) -> bool {
    if row.get(col).same_as(&value) {
        return false;
    }
    row.set(col, value);
    true
}

fn fill_gnodeb_length(row: &mut Row, cols: &ResolvedColumns, record: &CellRecord) -> bool {
    match (record.technology(), cols.gnodeb_length, record.gnodeb_bits) {
        (Technology::Nr, Some(col), Some(bits)) if row.get(col).is_blank() => {
            row.set(col, Value::from(bits));
            true
        }
        _ => false,
    }
}

/// A fresh row in the existing schema carrying the record's typed fields.
fn new_row(width: usize, cols: &ResolvedColumns, record: &CellRecord) -> Row {
    let mut row = Row { values: vec![Value::Null; width] };
    row.set(cols.node_id, Value::from(record.key.node_id()));
    row.set(cols.cell_id, Value::from(record.key.cell_id()));
    if let IdentityKey::Nr { mcc, mnc, .. } = &record.key {
        if let Some(col) = cols.mcc {
            row.set(col, Value::from(mcc.as_str()));
        }
        if let Some(col) = cols.mnc {
            row.set(col, Value::from(mnc.as_str()));
        }
    }

    let mut put = |col: Option<usize>, value: Value| {
        if let Some(col) = col {
            if !value.is_blank() {
                row.set(col, value);
            }
        }
    };
    put(cols.site, Value::from(record.site.clone()));
    put(cols.latitude, Value::from(record.position.map(|p| p.lat)));
    put(cols.longitude, Value::from(record.position.map(|p| p.lon)));
    put(cols.azimuth, Value::from(record.azimuth));
    put(cols.frequency, Value::from(record.frequency));
    put(cols.cell_name, Value::from(record.name.clone()));
    fill_gnodeb_length(&mut row, cols, record);
    row
}
