//! # Planner Configuration
//!
//! Everything the engine needs to know about a deployment is carried here as
//! plain values: distances, PCI ranges, moduli, column names. There is no
//! process-wide state; a [`crate::Planner`] owns one `PlannerConfig`.
//!
//! Only values the planning templates themselves fix have defaults. The
//! proximity threshold is deployment-specific and must always be supplied.
//!
//! ```json
//! {
//!   "proximity": { "threshold_km": 1.5, "metric": "haversine" },
//!   "reuse_distance_km": 3.0,
//!   "bit_length_bands": [
//!     { "from_mhz": 2110.0, "to_mhz": 2170.0, "bit_length": 24 }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{BitLengthTable, FrequencyBand, Technology, Value};
use crate::{Error, Result};

// ============================================================================
// Distance
// ============================================================================

/// How the distance between two cell positions is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Great-circle distance on a 6371 km sphere.
    #[default]
    Haversine,
    /// Equirectangular projection; cheaper, accurate at planning scales.
    Planar,
}

/// Neighbour-conflict radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityConfig {
    /// Cells closer than this conflict.
    pub threshold_km: f64,
    #[serde(default)]
    pub metric: DistanceMetric,
}

// ============================================================================
// Column maps
// ============================================================================

/// Header names for one source table. Lookup goes through
/// [`crate::model::Table::find_column`], so a name may be the first line of
/// a multi-line template header or any unique substring of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    /// eNodeB ID (LTE) or gNodeB ID (NR).
    pub node_id: String,
    pub cell_id: String,
    pub mcc: String,
    pub mnc: String,
    pub plmn: String,
    pub site: String,
    pub latitude: String,
    pub longitude: String,
    pub azimuth: String,
    /// Downlink EARFCN/centre frequency (LTE) or SSB frequency (NR).
    pub frequency: String,
    pub pci: String,
    pub gnodeb_length: String,
    pub cell_name: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            node_id: "NodeB ID".into(),
            cell_id: "Cell ID".into(),
            mcc: "MCC".into(),
            mnc: "MNC".into(),
            plmn: "PLMN".into(),
            site: "Site ID".into(),
            latitude: "Latitude".into(),
            longitude: "Longitude".into(),
            azimuth: "Azimuth".into(),
            frequency: "Frequency".into(),
            pci: "PCI".into(),
            gnodeb_length: "gNodeBLength".into(),
            cell_name: "Cell Name".into(),
        }
    }
}

// ============================================================================
// Per-technology settings
// ============================================================================

/// Settings for one technology's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyConfig {
    /// Class modulus: 3 for LTE, 30 for NR.
    pub modulus: u16,
    #[serde(default)]
    pub pci_min: u16,
    pub pci_max: u16,
    /// Extra same-site spreading rule (NR spreads mod 3 as well as mod 30).
    #[serde(default)]
    pub secondary_modulus: Option<u16>,
    /// Re-planned cells try to keep the class of their previous PCI.
    #[serde(default)]
    pub preserve_class: bool,
    #[serde(default)]
    pub planned_columns: ColumnMap,
    #[serde(default)]
    pub existing_columns: ColumnMap,
    /// Existing-table columns overwritten from the planned row on a match.
    /// Names are looked up in both tables.
    #[serde(default)]
    pub planned_fields: Vec<String>,
    /// Template values for inserted rows, written only into cells the
    /// planned cell left blank.
    #[serde(default)]
    pub defaults: Vec<ColumnDefault>,
}

/// One template value: `{"column": "MNC", "value": {"type": "String", "value": "01"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefault {
    pub column: String,
    pub value: Value,
}

impl ColumnDefault {
    pub fn new(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { column: column.into(), value: value.into() }
    }
}

impl TechnologyConfig {
    pub fn lte() -> Self {
        Self {
            modulus: 3,
            pci_min: 0,
            pci_max: 503,
            secondary_modulus: None,
            preserve_class: false,
            planned_columns: ColumnMap::default(),
            existing_columns: ColumnMap::default(),
            planned_fields: Vec::new(),
            defaults: Vec::new(),
        }
    }

    pub fn nr() -> Self {
        Self {
            modulus: 30,
            pci_min: 0,
            pci_max: 1007,
            secondary_modulus: Some(3),
            ..Self::lte()
        }
    }

    /// PCI values inside the configured range.
    pub fn in_range(&self, pci: u16) -> bool {
        (self.pci_min..=self.pci_max).contains(&pci)
    }

    pub fn class_of(&self, pci: u16) -> u16 {
        pci % self.modulus
    }

    fn validate(&self, tech: Technology) -> Result<()> {
        if self.modulus == 0 {
            return Err(Error::Config(format!("{tech}: modulus must be positive")));
        }
        if self.pci_min > self.pci_max {
            return Err(Error::Config(format!(
                "{tech}: PCI range {}..={} is empty",
                self.pci_min, self.pci_max
            )));
        }
        match self.secondary_modulus {
            Some(0) => Err(Error::Config(format!("{tech}: secondary modulus must be positive"))),
            // Every PCI of a class must share one secondary residue.
            Some(s) if self.modulus % s != 0 => Err(Error::Config(format!(
                "{tech}: secondary modulus {s} does not divide modulus {}",
                self.modulus
            ))),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// PlannerConfig
// ============================================================================

/// Complete configuration for one planning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub proximity: ProximityConfig,
    /// Cells without a site id are co-sited when both coordinates agree
    /// within this many degrees.
    #[serde(default = "default_colocation_tolerance")]
    pub colocation_tolerance_deg: f64,
    /// Same-frequency cells sharing an exact PCI should be at least this far
    /// apart. `None` disables the rule.
    #[serde(default)]
    pub reuse_distance_km: Option<f64>,
    /// Leading template rows that are never data.
    #[serde(default = "default_protected_rows")]
    pub protected_rows: usize,
    /// Digits of the MCC prefix inside a concatenated PLMN.
    #[serde(default = "default_mcc_len")]
    pub mcc_len: usize,
    /// SSB frequency → gNodeB-ID bit length. Empty disables the derivation.
    #[serde(default)]
    pub bit_length_bands: Vec<FrequencyBand>,
    #[serde(default = "TechnologyConfig::lte")]
    pub lte: TechnologyConfig,
    #[serde(default = "TechnologyConfig::nr")]
    pub nr: TechnologyConfig,
}

fn default_colocation_tolerance() -> f64 { 0.0001 }
fn default_protected_rows() -> usize { 3 }
fn default_mcc_len() -> usize { 3 }

impl PlannerConfig {
    /// Configuration with the given proximity threshold and template defaults.
    pub fn new(threshold_km: f64) -> Self {
        Self {
            proximity: ProximityConfig { threshold_km, metric: DistanceMetric::default() },
            colocation_tolerance_deg: default_colocation_tolerance(),
            reuse_distance_km: None,
            protected_rows: default_protected_rows(),
            mcc_len: default_mcc_len(),
            bit_length_bands: Vec::new(),
            lte: TechnologyConfig::lte(),
            nr: TechnologyConfig::nr(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn technology(&self, tech: Technology) -> &TechnologyConfig {
        match tech {
            Technology::Lte => &self.lte,
            Technology::Nr => &self.nr,
        }
    }

    pub fn bit_length_table(&self) -> BitLengthTable {
        BitLengthTable::new(self.bit_length_bands.clone())
    }

    /// Reject values that would make the engine misbehave silently.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.proximity.threshold_km;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(Error::Config(format!("proximity threshold must be positive, got {threshold}")));
        }
        if !self.colocation_tolerance_deg.is_finite() || self.colocation_tolerance_deg < 0.0 {
            return Err(Error::Config("colocation tolerance must be non-negative".into()));
        }
        if let Some(reuse) = self.reuse_distance_km {
            if !reuse.is_finite() || reuse <= 0.0 {
                return Err(Error::Config(format!("reuse distance must be positive, got {reuse}")));
            }
        }
        if self.mcc_len == 0 {
            return Err(Error::Config("MCC length must be positive".into()));
        }
        self.bit_length_table().validate()?;
        self.lte.validate(Technology::Lte)?;
        self.nr.validate(Technology::Nr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_json_gets_template_defaults() {
        let config = PlannerConfig::from_json_str(r#"{"proximity": {"threshold_km": 2.0}}"#).unwrap();
        assert_eq!(config.proximity.metric, DistanceMetric::Haversine);
        assert_eq!(config.protected_rows, 3);
        assert_eq!(config.lte.modulus, 3);
        assert_eq!(config.lte.pci_max, 503);
        assert_eq!(config.nr.modulus, 30);
        assert_eq!(config.nr.pci_max, 1007);
        assert_eq!(config.nr.secondary_modulus, Some(3));
        assert!(config.reuse_distance_km.is_none());
    }

    #[test]
    fn test_threshold_is_required() {
        assert!(matches!(PlannerConfig::from_json_str("{}"), Err(Error::Json(_))));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = PlannerConfig::new(0.0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config = PlannerConfig::new(1.0);
        config.lte.modulus = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config = PlannerConfig::new(1.0);
        config.nr.pci_min = 10;
        config.nr.pci_max = 5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config = PlannerConfig::new(1.0);
        config.reuse_distance_km = Some(-1.0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config = PlannerConfig::new(1.0);
        config.nr.secondary_modulus = Some(7);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_partial_technology_override() {
        let json = r#"{
            "proximity": {"threshold_km": 1.0, "metric": "planar"},
            "lte": {"modulus": 3, "pci_max": 167, "preserve_class": true}
        }"#;
        let config = PlannerConfig::from_json_str(json).unwrap();
        assert_eq!(config.proximity.metric, DistanceMetric::Planar);
        assert_eq!(config.lte.pci_max, 167);
        assert!(config.lte.preserve_class);
        assert_eq!(config.lte.existing_columns.pci, "PCI");
        assert_eq!(config.nr.pci_max, 1007);
    }
}
