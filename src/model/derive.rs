//! Derived fields: MNC from PLMN, gNodeB-ID bit length from SSB frequency.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ============================================================================
// PLMN / MNC
// ============================================================================

/// Split a PLMN into (MCC, MNC).
///
/// Accepts `"460-11"` (split on the dash) and `"46011"` (first `mcc_len`
/// digits are the MCC). The MNC is zero-padded to two digits, so `"460-1"`
/// yields `("460", "01")`.
pub fn split_plmn(plmn: &str, mcc_len: usize) -> Result<(String, String)> {
    let s = plmn.trim();
    let (mcc, mnc) = match s.split_once('-') {
        Some((left, right)) => (left.trim(), right.trim()),
        None => {
            if s.chars().count() < mcc_len {
                return Err(derivation(
                    "MNC",
                    format!("PLMN '{s}' is shorter than the {mcc_len}-digit MCC"),
                ));
            }
            if !s.is_ascii() {
                return Err(derivation("MNC", format!("PLMN '{s}' is not numeric")));
            }
            s.split_at(mcc_len)
        }
    };
    if mcc.is_empty() || !mcc.chars().all(|c| c.is_ascii_digit()) {
        return Err(derivation("MCC", format!("PLMN '{s}' has no numeric MCC")));
    }
    let mnc = normalize_mnc(mnc)
        .ok_or_else(|| derivation("MNC", format!("PLMN '{s}' has no numeric MNC after the MCC")))?;
    Ok((mcc.to_string(), mnc))
}

/// Normalise an MNC cell: drop an `MCC-` prefix, require digits, pad to two.
pub fn normalize_mnc(raw: &str) -> Option<String> {
    let s = raw.trim();
    let s = s.split_once('-').map_or(s, |(_, right)| right.trim());
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{s:0>2}"))
}

fn derivation(field: &str, message: String) -> Error {
    Error::FieldDerivation { field: field.to_string(), message }
}

// ============================================================================
// gNodeB-ID bit length
// ============================================================================

/// Maps an SSB frequency to the gNodeB-ID bit length used by the operator.
///
/// The mapping is deployment policy, not engine logic, so it is injected.
pub trait BitLengthPolicy: Send + Sync {
    /// Bit length for the given SSB frequency, `None` if no rule covers it.
    fn bit_length(&self, ssb_mhz: f64) -> Option<u8>;

    /// False when the policy has no rules; derivation is skipped entirely.
    fn is_enabled(&self) -> bool;
}

/// One band of the lookup table: `[from_mhz, to_mhz)` → `bit_length`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub from_mhz: f64,
    pub to_mhz: f64,
    pub bit_length: u8,
}

/// Table-driven [`BitLengthPolicy`].
///
/// Bands are half-open: a frequency exactly on a boundary belongs to the
/// band that starts there.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BitLengthTable {
    bands: Vec<FrequencyBand>,
}

impl BitLengthTable {
    pub fn new(mut bands: Vec<FrequencyBand>) -> Self {
        bands.sort_by(|a, b| a.from_mhz.total_cmp(&b.from_mhz));
        Self { bands }
    }

    pub fn bands(&self) -> &[FrequencyBand] {
        &self.bands
    }

    pub fn validate(&self) -> Result<()> {
        for band in &self.bands {
            if !band.from_mhz.is_finite() || !band.to_mhz.is_finite() || band.from_mhz >= band.to_mhz {
                return Err(Error::Config(format!(
                    "bit-length band [{}, {}) is empty or not finite",
                    band.from_mhz, band.to_mhz
                )));
            }
        }
        for pair in self.bands.windows(2) {
            if pair[0].to_mhz > pair[1].from_mhz {
                return Err(Error::Config(format!(
                    "bit-length bands [{}, {}) and [{}, {}) overlap",
                    pair[0].from_mhz, pair[0].to_mhz, pair[1].from_mhz, pair[1].to_mhz
                )));
            }
        }
        Ok(())
    }
}

impl BitLengthPolicy for BitLengthTable {
    fn bit_length(&self, ssb_mhz: f64) -> Option<u8> {
        self.bands
            .iter()
            .find(|b| b.from_mhz <= ssb_mhz && ssb_mhz < b.to_mhz)
            .map(|b| b.bit_length)
    }

    fn is_enabled(&self) -> bool {
        !self.bands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_dashed_plmn() {
        assert_eq!(split_plmn("460-11", 3).unwrap(), ("460".into(), "11".into()));
        assert_eq!(split_plmn(" 460-1 ", 3).unwrap(), ("460".into(), "01".into()));
    }

    #[test]
    fn test_split_concatenated_plmn() {
        assert_eq!(split_plmn("46011", 3).unwrap(), ("460".into(), "11".into()));
        assert_eq!(split_plmn("310410", 3).unwrap(), ("310".into(), "410".into()));
    }

    #[test]
    fn test_plmn_shorter_than_mcc() {
        let err = split_plmn("46", 3).unwrap_err();
        assert!(matches!(err, Error::FieldDerivation { ref field, .. } if field == "MNC"));
        assert!(split_plmn("460", 3).is_err());
        assert!(split_plmn("460-", 3).is_err());
        assert!(split_plmn("46a11", 3).is_err());
    }

    #[test]
    fn test_normalize_mnc() {
        assert_eq!(normalize_mnc("1").as_deref(), Some("01"));
        assert_eq!(normalize_mnc("460-11").as_deref(), Some("11"));
        assert_eq!(normalize_mnc("410").as_deref(), Some("410"));
        assert_eq!(normalize_mnc("x1"), None);
    }

    #[test]
    fn test_band_boundary_goes_to_upper_band() {
        let table = BitLengthTable::new(vec![
            FrequencyBand { from_mhz: 3000.0, to_mhz: 4000.0, bit_length: 24 },
            FrequencyBand { from_mhz: 2000.0, to_mhz: 3000.0, bit_length: 22 },
        ]);
        assert!(table.validate().is_ok());
        assert_eq!(table.bit_length(2999.99), Some(22));
        assert_eq!(table.bit_length(3000.0), Some(24));
        assert_eq!(table.bit_length(4000.0), None);
        assert_eq!(table.bit_length(1999.0), None);
    }

    #[test]
    fn test_overlapping_bands_rejected() {
        let table = BitLengthTable::new(vec![
            FrequencyBand { from_mhz: 2000.0, to_mhz: 3100.0, bit_length: 22 },
            FrequencyBand { from_mhz: 3000.0, to_mhz: 4000.0, bit_length: 24 },
        ]);
        assert!(matches!(table.validate(), Err(Error::Config(_))));
        assert!(!BitLengthTable::default().is_enabled());
    }
}
