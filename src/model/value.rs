//! Universal cell value for parameter tables.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single table cell.
///
/// Parameter sheets mix typed and text cells freely: an eNodeB ID may arrive
/// as `Int(12345)`, `Float(12345.0)` or `String("12,345 ")`. The accessors
/// below normalise those forms once so the rest of the crate works on typed
/// fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Text placeholders that count as an empty cell.
const NULL_TOKENS: &[&str] = &["", "nan", "none", "null"];

// ============================================================================
// Accessors
// ============================================================================

impl Value {
    /// True for `Null`, NaN floats and placeholder strings.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            Value::String(s) => {
                let t = s.trim();
                NULL_TOKENS.iter().any(|tok| t.eq_ignore_ascii_case(tok))
            }
            _ => false,
        }
    }

    /// Attempt to extract as i64.
    ///
    /// Text is cleaned of spaces and thousands separators first; a float is
    /// accepted only when it has no fractional part.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            Value::String(_) if self.is_blank() => None,
            Value::String(s) => {
                let cleaned = clean_numeric(s);
                cleaned.parse::<i64>().ok().or_else(|| {
                    cleaned
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && f.fract() == 0.0)
                        .map(|f| f as i64)
                })
            }
            _ => None,
        }
    }

    /// Attempt to extract as f64.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) if f.is_finite() => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::String(_) if self.is_blank() => None,
            Value::String(s) => clean_numeric(s).parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    /// Render as trimmed text; `None` for blank cells.
    ///
    /// Integral floats render without a trailing `.0`, so `Float(460.0)`
    /// reads back as `"460"`.
    pub fn as_text(&self) -> Option<String> {
        if self.is_blank() {
            return None;
        }
        match self {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Float(f) if f.fract() == 0.0 => Some(format!("{}", *f as i64)),
            other => Some(other.to_string()),
        }
    }

    /// Equality as a planner reads the sheet: blanks are equal, numbers
    /// compare by value whatever their cell type, text compares trimmed.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self.is_blank(), other.is_blank()) {
            (true, true) => return true,
            (true, false) | (false, true) => return false,
            _ => {}
        }
        match (self.as_float(), other.as_float()) {
            (Some(a), Some(b)) => a == b,
            _ => self.as_text() == other.as_text(),
        }
    }
}

fn clean_numeric(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace() && *c != ',').collect()
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(v as i64) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<u16> for Value { fn from(v: u16) -> Self { Value::Int(v as i64) } }
impl From<u32> for Value { fn from(v: u32) -> Self { Value::Int(v as i64) } }
impl From<u8> for Value { fn from(v: u8) -> Self { Value::Int(v as i64) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Float(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::String(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::String(v.to_owned()) } }
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
        }
    }
}
