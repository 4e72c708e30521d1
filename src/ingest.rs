//! Ingestion: one source table → keyed `CellRecord`s.
//!
//! This is the only place rows are read as cells. Protected template rows are
//! cut off here, malformed rows become issues, and duplicate identities stop
//! the run for that table.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::ColumnMap;
use crate::model::{BitLengthPolicy, CellRecord, IdentityKey, ResolvedColumns, Table, Technology};
use crate::report::Issue;
use crate::{Error, Result};

/// A parsed source table. Borrows the table it came from so reconciliation
/// can read raw cells back by ordinal.
#[derive(Debug)]
pub struct SourceTable<'a> {
    pub name: &'static str,
    pub table: &'a Table,
    pub technology: Technology,
    pub columns: ResolvedColumns,
    /// Records in row order.
    pub records: Vec<CellRecord>,
    pub issues: Vec<Issue>,
    /// key → index into `records`
    index: BTreeMap<IdentityKey, usize>,
    protected: usize,
}

/// Parameters shared by every table of a run.
#[derive(Clone, Copy)]
pub struct IngestOptions<'p> {
    pub protected_rows: usize,
    pub mcc_len: usize,
    pub policy: &'p dyn BitLengthPolicy,
}

impl<'a> SourceTable<'a> {
    /// Parse every data row of `table`.
    ///
    /// Fails with `MissingColumn` if an identity column cannot be resolved and
    /// with `IdentityCollision` if two data rows carry the same key.
    pub fn parse(
        name: &'static str,
        table: &'a Table,
        technology: Technology,
        map: &ColumnMap,
        options: IngestOptions<'_>,
    ) -> Result<Self> {
        let columns = ResolvedColumns::resolve(table, map, technology, name)?;
        let split = table.split_protected(options.protected_rows);
        let protected = split.protected.len();

        let mut records: Vec<CellRecord> = Vec::with_capacity(split.data.len());
        let mut issues = Vec::new();
        let mut index: BTreeMap<IdentityKey, usize> = BTreeMap::new();

        for data in split.data {
            let parsed = match CellRecord::from_row(data, technology, &columns, options.mcc_len, options.policy) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(table = name, ordinal = data.ordinal, error = %err, "skipping row");
                    issues.push(Issue::from_error(&err).in_table(name));
                    continue;
                }
            };
            let record = parsed.record;
            for err in parsed.issues {
                warn!(table = name, ordinal = data.ordinal, cell = %record.key, error = %err, "row issue");
                issues.push(
                    Issue::from_error(&err)
                        .in_table(name)
                        .at_row(data.ordinal)
                        .for_cell(record.key.clone()),
                );
            }
            if let Some(&first) = index.get(&record.key) {
                return Err(Error::IdentityCollision {
                    table: name.to_string(),
                    key: record.key,
                    first: records[first].ordinal,
                    second: data.ordinal,
                });
            }
            index.insert(record.key.clone(), records.len());
            records.push(record);
        }

        debug!(
            table = name,
            technology = %technology,
            records = records.len(),
            issues = issues.len(),
            protected,
            "table ingested"
        );
        Ok(Self { name, table, technology, columns, records, issues, index, protected })
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&CellRecord> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.index.contains_key(key)
    }

    /// Number of leading rows held back as template rows.
    pub fn protected_count(&self) -> usize {
        self.protected
    }
}
