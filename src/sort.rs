//! Single-key sort engine.
//!
//! Cells are coerced before comparing: missing and null values become the
//! empty string, numeric-looking values become numbers and everything else is
//! compared as trimmed, lower-cased text. Empty values order first, then
//! numbers, then text, so the comparator is a total order and `sort_by` is
//! stable.

use crate::column::ColumnRegistry;
use crate::value::{parse_number, CellValue, Row};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sort specification as exchanged with the data service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    #[serde(rename = "columnName")]
    pub column_name: String,
    #[serde(rename = "ascendent", alias = "ascending")]
    pub ascending: bool,
}

impl SortSpec {
    pub fn ascending(column: impl Into<String>) -> Self {
        SortSpec { column_name: column.into(), ascending: true }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        SortSpec { column_name: column.into(), ascending: false }
    }

    /// Same column, opposite direction.
    pub fn reversed(&self) -> Self {
        SortSpec { column_name: self.column_name.clone(), ascending: !self.ascending }
    }

    /// `column` or `column:DESC`, as stored in persisted state.
    pub fn to_sort_string(&self) -> String {
        if self.ascending {
            format!("{}:ASC", self.column_name)
        } else {
            format!("{}:DESC", self.column_name)
        }
    }
}

/// Parse `"a;b:DESC"` style sort columns. Direction defaults to ascending
/// and is matched case-insensitively; empty entries are skipped.
pub fn parse_sort_columns(s: &str) -> Vec<SortSpec> {
    s.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let mut parts = entry.splitn(2, ':');
            let column = parts.next()?.trim();
            if column.is_empty() {
                return None;
            }
            let ascending = !parts
                .next()
                .map(|dir| dir.trim().eq_ignore_ascii_case("desc"))
                .unwrap_or(false);
            Some(SortSpec { column_name: column.to_string(), ascending })
        })
        .collect()
}

/// First spec naming an existing orderable column. Others are dropped.
pub fn normalize_sort(specs: Vec<SortSpec>, columns: &ColumnRegistry) -> Option<SortSpec> {
    specs.into_iter().find(|spec| {
        let known = columns.is_orderable(&spec.column_name);
        if !known {
            log::debug!("dropping sort on unknown or unorderable column '{}'", spec.column_name);
        }
        known
    })
}

/// Coerced sort key of a cell
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Empty,
    Number(f64),
    Text(String),
}

impl SortKey {
    fn of(value: Option<&CellValue>) -> Self {
        match value {
            None | Some(CellValue::Null) => SortKey::Empty,
            Some(CellValue::Text(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return SortKey::Empty;
                }
                match parse_number(trimmed) {
                    Some(n) => SortKey::Number(n),
                    None => SortKey::Text(trimmed.to_lowercase()),
                }
            }
            Some(CellValue::Bool(b)) => SortKey::Number(if *b { 1.0 } else { 0.0 }),
            Some(other) => SortKey::Number(other.to_number()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Empty => 0,
            SortKey::Number(_) => 1,
            SortKey::Text(_) => 2,
        }
    }

    fn compare(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

/// Ascending comparison of two cells under the coercion rules.
pub fn compare_cells(a: Option<&CellValue>, b: Option<&CellValue>) -> Ordering {
    SortKey::of(a).compare(&SortKey::of(b))
}

/// Sorts rows in place by `spec`.
pub fn sort_rows(rows: &mut [Row], spec: &SortSpec) {
    let column = spec.column_name.as_str();
    // precompute keys, rows can be wide
    let mut keyed: Vec<(SortKey, usize)> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| (SortKey::of(r.get(column)), i))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| {
        let cmp = a.compare(b);
        if spec.ascending {
            cmp
        } else {
            cmp.reverse()
        }
    });

    let order: Vec<usize> = keyed.into_iter().map(|(_, i)| i).collect();
    let mut taken: Vec<Option<Row>> = rows.iter_mut().map(|r| Some(std::mem::take(r))).collect();
    for (slot, idx) in rows.iter_mut().zip(order) {
        if let Some(r) = taken[idx].take() {
            *slot = r;
        }
    }
}
