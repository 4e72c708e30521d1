//! Table: the ordered row set handed in by the I/O layer and returned to it.

use serde::{Deserialize, Serialize};

use super::Value;
use crate::{Error, Result};

static NULL: Value = Value::Null;

/// One row of a parameter table. Values are positional, matching
/// `Table::columns`; a short row reads as `Null` past its end.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self { values: values.into_iter().map(Into::into).collect() }
    }

    pub fn get(&self, idx: usize) -> &Value {
        self.values.get(idx).unwrap_or(&NULL)
    }

    /// Set a value, padding the row with `Null` when it is short.
    pub fn set(&mut self, idx: usize, value: Value) {
        if self.values.len() <= idx {
            self.values.resize(idx + 1, Value::Null);
        }
        self.values[idx] = value;
    }
}

/// A parameter table: header names plus ordered rows.
///
/// Rows at ordinal `< protected_rows` are template/metadata rows (field
/// descriptions, "mandatory" markers). They are split off by
/// [`Table::split_protected`] and never reach the cell model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// A data row together with its ordinal in the source table.
#[derive(Debug, Clone, Copy)]
pub struct DataRow<'a> {
    pub ordinal: usize,
    pub row: &'a Row,
}

/// Result of splitting a table at the protected-row boundary.
#[derive(Debug, Clone)]
pub struct SplitTable<'a> {
    pub protected: &'a [Row],
    pub data: Vec<DataRow<'a>>,
}

/// The single ingestion boundary: only rows at or past `protected_rows`
/// are data rows.
pub fn is_data_row(ordinal: usize, protected_rows: usize) -> bool {
    ordinal >= protected_rows
}

impl Table {
    pub fn new(columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        self.rows.push(Row::new(values));
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Locate a column by name.
    ///
    /// Template headers are often multi-line (`"PCI\nphysCellId\nlong:[0..503]"`),
    /// so lookup tries, in order: exact match, case-insensitive match on the
    /// first header line, case-insensitive substring match. The first column
    /// matching at the earliest stage wins.
    pub fn find_column(&self, name: &str) -> Option<usize> {
        if let Some(idx) = self.columns.iter().position(|c| c == name) {
            return Some(idx);
        }
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        if let Some(idx) = self.columns.iter().position(|c| {
            c.lines().next().is_some_and(|first| first.trim().to_lowercase() == needle)
        }) {
            return Some(idx);
        }
        self.columns.iter().position(|c| c.to_lowercase().contains(&needle))
    }

    /// Like [`Table::find_column`], failing with `MissingColumn`.
    pub fn require_column(&self, table: &str, name: &str) -> Result<usize> {
        self.find_column(name).ok_or_else(|| Error::MissingColumn {
            table: table.to_string(),
            column: name.to_string(),
        })
    }

    /// Split at the protected-row boundary.
    pub fn split_protected(&self, protected_rows: usize) -> SplitTable<'_> {
        let boundary = protected_rows.min(self.rows.len());
        let data = self
            .rows
            .iter()
            .enumerate()
            .filter(|(ordinal, _)| is_data_row(*ordinal, protected_rows))
            .map(|(ordinal, row)| DataRow { ordinal, row })
            .collect();
        SplitTable { protected: &self.rows[..boundary], data }
    }
}
