//! # Cell Model
//!
//! Typed DTOs that cross every boundary: ingestion ↔ graph ↔ assignment ↔
//! reconciliation ↔ validation.
//!
//! Design rule: no I/O and no state here. Rows come in as [`Table`]s built by
//! the caller; everything else is a pure transformation of them.

pub mod value;
pub mod table;
pub mod cell;
pub mod derive;

pub use value::Value;
pub use table::{is_data_row, DataRow, Row, SplitTable, Table};
pub use cell::{
    CellRecord, ConflictPosition, IdentityKey, ParsedRecord, Position,
    ResolvedColumns, Technology,
};
pub use derive::{normalize_mnc, split_plmn, BitLengthPolicy, BitLengthTable, FrequencyBand};
