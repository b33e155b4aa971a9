//! Cell values and rows.
//!
//! A row is an open mapping from column attr to value; nothing about its
//! shape is fixed here, the column registry decides what is looked at.
//!
//! Records coming from a data service are loosely typed (a numeric column may
//! hold `"25"`), so comparisons follow loose coercion rules: two strings
//! compare as text, anything else compares numerically.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// A single record, keyed by column attr.
pub type Row = HashMap<String, CellValue>;

/// Cell value enum covering everything a record set may carry.
///
/// Deserialization is untagged: JSON `null`, booleans, integers, floats and
/// strings map onto the matching variant. `Date` holds milliseconds since
/// the Unix epoch and is only produced programmatically (services send dates
/// as plain numbers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(i64),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(v) | CellValue::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value of a number-typed cell, no string coercion.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(v) | CellValue::Date(v) => Some(*v as f64),
            CellValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Loose numeric coercion.
    ///
    /// `Null` is `0`, booleans are `0`/`1`, strings are parsed after trimming
    /// (blank is `0`) and anything unparsable is `NaN`.
    pub fn to_number(&self) -> f64 {
        match self {
            CellValue::Null => 0.0,
            CellValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            CellValue::Int(v) | CellValue::Date(v) => *v as f64,
            CellValue::Float(v) => *v,
            CellValue::Text(s) => parse_number(s).unwrap_or(f64::NAN),
        }
    }

    /// Text used for searching and for display when no renderer is set.
    /// `Null` renders as the empty string.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int(v) | CellValue::Date(v) => v.to_string(),
            CellValue::Float(v) => format_number(*v),
            CellValue::Text(s) => s.clone(),
        }
    }

    /// Build a value from an `f64`, folding whole numbers back into `Int`.
    pub fn from_number(n: f64) -> Self {
        if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
            CellValue::Int(n as i64)
        } else {
            CellValue::Float(n)
        }
    }

    /// Loose equality: numbers compare by value across `Int`/`Float`/`Date`,
    /// everything else must match exactly.
    pub fn same_value(&self, other: &CellValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// Loose relational comparison. Returns `None` when the values are not
    /// comparable (a numeric coercion produced `NaN`).
    pub fn loose_cmp(&self, other: &CellValue) -> Option<Ordering> {
        if let (CellValue::Text(a), CellValue::Text(b)) = (self, other) {
            return Some(a.cmp(b));
        }
        let a = self.to_number();
        let b = other.to_number();
        a.partial_cmp(&b)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        CellValue::Int(v as i64)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

/// Parse a numeric-looking string. Blank strings parse as `0`; words such as
/// `inf` or `nan` that `f64::from_str` accepts are rejected, `Infinity` is not.
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    match trimmed {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }
    let body = trimmed.trim_start_matches(['+', '-']);
    if body.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Format a float the way a script runtime prints it: whole numbers without a
/// fractional part, `NaN` and `Infinity` spelled out.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{}", n)
    }
}

/// Build a row from `(attr, value)` pairs.
pub fn row<I, K, V>(cells: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<CellValue>,
{
    cells
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
