//! CellRecord: one radio cell as the engine sees it.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::derive::{normalize_mnc, split_plmn, BitLengthPolicy};
use super::table::{DataRow, Table};
use super::Value;
use crate::config::ColumnMap;
use crate::{Error, Result};

/// Radio access technology. LTE and NR never share PCI space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Technology {
    #[serde(rename = "LTE")]
    Lte,
    #[serde(rename = "NR")]
    Nr,
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Technology::Lte => write!(f, "LTE"),
            Technology::Nr => write!(f, "NR"),
        }
    }
}

/// Globally unique cell identity within a technology.
///
/// Ordering is the tuple order of the fields and is the engine's final
/// tie-break everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "technology")]
pub enum IdentityKey {
    #[serde(rename = "LTE")]
    Lte { enodeb_id: u32, cell_id: u32 },
    #[serde(rename = "NR")]
    Nr { mcc: String, mnc: String, gnodeb_id: u32, cell_id: u32 },
}

impl IdentityKey {
    pub fn technology(&self) -> Technology {
        match self {
            IdentityKey::Lte { .. } => Technology::Lte,
            IdentityKey::Nr { .. } => Technology::Nr,
        }
    }

    /// eNodeB or gNodeB ID.
    pub fn node_id(&self) -> u32 {
        match self {
            IdentityKey::Lte { enodeb_id, .. } => *enodeb_id,
            IdentityKey::Nr { gnodeb_id, .. } => *gnodeb_id,
        }
    }

    pub fn cell_id(&self) -> u32 {
        match self {
            IdentityKey::Lte { cell_id, .. } | IdentityKey::Nr { cell_id, .. } => *cell_id,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::Lte { enodeb_id, cell_id } => write!(f, "{enodeb_id}-{cell_id}"),
            IdentityKey::Nr { mcc, mnc, gnodeb_id, cell_id } => {
                write!(f, "{mcc}-{mnc}-{gnodeb_id}-{cell_id}")
            }
        }
    }
}

/// WGS84 coordinates in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        valid.then_some(Self { lat, lon })
    }
}

/// What the graph builder needs to place a cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConflictPosition<'a> {
    pub site: Option<&'a str>,
    pub position: Option<Position>,
}

/// A typed cell, built once at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub key: IdentityKey,
    pub site: Option<String>,
    pub position: Option<Position>,
    pub azimuth: Option<f64>,
    /// LTE downlink EARFCN/centre frequency or NR SSB frequency.
    pub frequency: Option<f64>,
    /// NR only: derived from `frequency` through the bit-length policy.
    pub gnodeb_bits: Option<u8>,
    pub pci: Option<u16>,
    pub name: Option<String>,
    /// Row position in the source table.
    pub ordinal: usize,
}

/// A parsed record plus the non-fatal derivation problems met on the way.
#[derive(Debug)]
pub struct ParsedRecord {
    pub record: CellRecord,
    pub issues: Vec<Error>,
}

impl CellRecord {
    pub fn new(key: IdentityKey) -> Self {
        Self {
            key,
            site: None,
            position: None,
            azimuth: None,
            frequency: None,
            gnodeb_bits: None,
            pci: None,
            name: None,
            ordinal: 0,
        }
    }

    pub fn lte(enodeb_id: u32, cell_id: u32) -> Self {
        Self::new(IdentityKey::Lte { enodeb_id, cell_id })
    }

    pub fn nr(mcc: &str, mnc: &str, gnodeb_id: u32, cell_id: u32) -> Self {
        Self::new(IdentityKey::Nr {
            mcc: mcc.to_string(),
            mnc: mnc.to_string(),
            gnodeb_id,
            cell_id,
        })
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn at(mut self, lat: f64, lon: f64) -> Self {
        self.position = Position::new(lat, lon);
        self
    }

    pub fn with_pci(mut self, pci: u16) -> Self {
        self.pci = Some(pci);
        self
    }

    pub fn with_frequency(mut self, mhz: f64) -> Self {
        self.frequency = Some(mhz);
        self
    }

    pub fn technology(&self) -> Technology {
        self.key.technology()
    }

    pub fn identity_key(&self) -> &IdentityKey {
        &self.key
    }

    pub fn conflict_position(&self) -> ConflictPosition<'_> {
        ConflictPosition { site: self.site.as_deref(), position: self.position }
    }

    /// Parse a data row.
    ///
    /// Fails with `MalformedRecord` when an identity field is missing or not
    /// numeric. Derivation failures do not fail the row; they come back in
    /// [`ParsedRecord::issues`] with the derived field left unset.
    pub fn from_row(
        data: DataRow<'_>,
        technology: Technology,
        cols: &ResolvedColumns,
        mcc_len: usize,
        policy: &dyn BitLengthPolicy,
    ) -> Result<ParsedRecord> {
        let DataRow { ordinal, row } = data;
        let mut issues = Vec::new();

        let node_id = parse_id(row.get(cols.node_id), ordinal, "node ID")?;
        let cell_id = parse_id(row.get(cols.cell_id), ordinal, "cell ID")?;
        let frequency = cols.frequency.and_then(|c| row.get(c).as_float());

        let key = match technology {
            Technology::Lte => IdentityKey::Lte { enodeb_id: node_id, cell_id },
            Technology::Nr => {
                let plmn = cols.plmn.and_then(|c| row.get(c).as_text());
                let mut mcc = cols
                    .mcc
                    .and_then(|c| row.get(c).as_text())
                    .filter(|s| s.chars().all(|c| c.is_ascii_digit()));
                let mut mnc = cols.mnc.and_then(|c| row.get(c).as_text()).and_then(|s| normalize_mnc(&s));

                if mcc.is_none() || mnc.is_none() {
                    if let Some(plmn) = plmn.as_deref() {
                        match split_plmn(plmn, mcc_len) {
                            Ok((plmn_mcc, plmn_mnc)) => {
                                mcc.get_or_insert(plmn_mcc);
                                mnc.get_or_insert(plmn_mnc);
                            }
                            Err(e) => issues.push(e),
                        }
                    }
                }

                match (mcc, mnc) {
                    (Some(mcc), Some(mnc)) => IdentityKey::Nr { mcc, mnc, gnodeb_id: node_id, cell_id },
                    (None, _) => return Err(malformed(ordinal, "MCC is missing or not numeric")),
                    (_, None) => return Err(malformed(ordinal, "MNC is missing and not derivable from PLMN")),
                }
            }
        };

        let gnodeb_bits = if technology == Technology::Nr && policy.is_enabled() {
            match frequency {
                Some(mhz) => {
                    let bits = policy.bit_length(mhz);
                    if bits.is_none() {
                        issues.push(Error::FieldDerivation {
                            field: "gNodeBLength".into(),
                            message: format!("SSB frequency {mhz} MHz is outside every configured band"),
                        });
                    }
                    bits
                }
                None => {
                    issues.push(Error::FieldDerivation {
                        field: "gNodeBLength".into(),
                        message: "no SSB frequency".into(),
                    });
                    None
                }
            }
        } else {
            None
        };

        let position = match (
            cols.latitude.and_then(|c| row.get(c).as_float()),
            cols.longitude.and_then(|c| row.get(c).as_float()),
        ) {
            (Some(lat), Some(lon)) => Position::new(lat, lon),
            _ => None,
        };

        let pci = match cols.pci.map(|c| row.get(c)) {
            Some(value) if !value.is_blank() => {
                let pci = value.as_int().and_then(|p| u16::try_from(p).ok());
                if pci.is_none() {
                    let message = format!("PCI '{value}' is not a valid identity, cell treated as unassigned");
                    issues.push(malformed(ordinal, &message));
                }
                pci
            }
            _ => None,
        };

        let record = CellRecord {
            key,
            site: cols.site.and_then(|c| row.get(c).as_text()),
            position,
            azimuth: cols.azimuth.and_then(|c| row.get(c).as_float()),
            frequency,
            gnodeb_bits,
            pci,
            name: cols.cell_name.and_then(|c| row.get(c).as_text()),
            ordinal,
        };
        Ok(ParsedRecord { record, issues })
    }
}

fn parse_id(value: &Value, ordinal: usize, field: &str) -> Result<u32> {
    if value.is_blank() {
        return Err(malformed(ordinal, &format!("{field} is missing")));
    }
    value
        .as_int()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| malformed(ordinal, &format!("{field} '{value}' is not a non-negative integer")))
}

fn malformed(ordinal: usize, message: &str) -> Error {
    Error::MalformedRecord { ordinal, message: message.to_string() }
}

// ============================================================================
// Column resolution
// ============================================================================

/// Column indices for one table, resolved once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub node_id: usize,
    pub cell_id: usize,
    pub mcc: Option<usize>,
    pub mnc: Option<usize>,
    pub plmn: Option<usize>,
    pub site: Option<usize>,
    pub latitude: Option<usize>,
    pub longitude: Option<usize>,
    pub azimuth: Option<usize>,
    pub frequency: Option<usize>,
    pub pci: Option<usize>,
    pub gnodeb_length: Option<usize>,
    pub cell_name: Option<usize>,
}

impl ResolvedColumns {
    /// Resolve the column map against a table. Node and cell ID columns are
    /// required, and NR tables need an MNC or PLMN column.
    pub fn resolve(table: &Table, map: &ColumnMap, technology: Technology, table_name: &str) -> Result<Self> {
        let find = |name: &str| table.find_column(name);
        let cols = Self {
            node_id: table.require_column(table_name, &map.node_id)?,
            cell_id: table.require_column(table_name, &map.cell_id)?,
            mcc: find(&map.mcc),
            mnc: find(&map.mnc),
            plmn: find(&map.plmn),
            site: find(&map.site),
            latitude: find(&map.latitude),
            longitude: find(&map.longitude),
            azimuth: find(&map.azimuth),
            frequency: find(&map.frequency),
            pci: find(&map.pci),
            gnodeb_length: find(&map.gnodeb_length),
            cell_name: find(&map.cell_name),
        };
        if technology == Technology::Nr && cols.mnc.is_none() && cols.plmn.is_none() {
            return Err(Error::MissingColumn {
                table: table_name.to_string(),
                column: format!("{} or {}", map.mnc, map.plmn),
            });
        }
        Ok(cols)
    }
}
