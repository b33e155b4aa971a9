//! Totals row.
//!
//! Totals are computed over the filtered, unpaginated rows so they only move
//! when filters, sort or data move, never when the page does.

use crate::column::{AggregateOp, ColumnRegistry};
use crate::value::{CellValue, Row};
use std::collections::HashMap;

/// One synthetic row keyed by column attr.
pub type TotalsRow = HashMap<String, CellValue>;

/// Computes a total for every visible column that carries an aggregate.
pub fn compute_totals(columns: &ColumnRegistry, rows: &[Row]) -> TotalsRow {
    columns
        .iter()
        .filter(|c| c.visible)
        .filter_map(|c| {
            let op = c.aggregate.as_ref()?;
            Some((c.attr.clone(), aggregate(op, &c.attr, rows)))
        })
        .collect()
}

/// Applies one operator to the projection of `attr` over `rows`.
pub fn aggregate(op: &AggregateOp, attr: &str, rows: &[Row]) -> CellValue {
    match op {
        AggregateOp::Sum => CellValue::from_number(sum(attr, rows)),
        AggregateOp::Count => CellValue::Int(rows.len() as i64),
        AggregateOp::Avg => {
            if rows.is_empty() {
                CellValue::Null
            } else {
                CellValue::from_number(sum(attr, rows) / rows.len() as f64)
            }
        }
        AggregateOp::Min => extreme(attr, rows, f64::min),
        AggregateOp::Max => extreme(attr, rows, f64::max),
        AggregateOp::Custom(f) => {
            let projected: Vec<CellValue> = rows
                .iter()
                .map(|r| r.get(attr).cloned().unwrap_or_default())
                .collect();
            f(&projected)
        }
    }
}

/// Sum with non-numeric cells counted as zero.
fn sum(attr: &str, rows: &[Row]) -> f64 {
    rows.iter()
        .map(|r| r.get(attr).map(CellValue::to_number).unwrap_or(0.0))
        .filter(|n| !n.is_nan())
        .sum()
}

fn extreme(attr: &str, rows: &[Row], pick: fn(f64, f64) -> f64) -> CellValue {
    rows.iter()
        .filter_map(|r| r.get(attr))
        .filter(|v| !v.is_null())
        .map(CellValue::to_number)
        .filter(|n| !n.is_nan())
        .reduce(pick)
        .map(CellValue::from_number)
        .unwrap_or(CellValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnDescriptor;
    use crate::value::row;

    fn rows() -> Vec<Row> {
        vec![
            row([("v", CellValue::Int(4)), ("w", CellValue::from("x"))]),
            row([("v", CellValue::from("6")), ("w", CellValue::Float(1.5))]),
            row([("v", CellValue::from("oops")), ("w", CellValue::Null)]),
        ]
    }

    #[test]
    fn test_builtin_operators() {
        let r = rows();
        assert_eq!(aggregate(&AggregateOp::Sum, "v", &r), CellValue::Int(10));
        assert_eq!(aggregate(&AggregateOp::Count, "v", &r), CellValue::Int(3));
        assert_eq!(aggregate(&AggregateOp::Min, "v", &r), CellValue::Int(4));
        assert_eq!(aggregate(&AggregateOp::Max, "v", &r), CellValue::Int(6));
        assert_eq!(aggregate(&AggregateOp::Min, "w", &r), CellValue::Float(1.5));
        assert_eq!(aggregate(&AggregateOp::Avg, "w", &r), CellValue::Float(0.5));
    }

    #[test]
    fn test_empty_rows() {
        assert_eq!(aggregate(&AggregateOp::Sum, "v", &[]), CellValue::Int(0));
        assert_eq!(aggregate(&AggregateOp::Avg, "v", &[]), CellValue::Null);
        assert_eq!(aggregate(&AggregateOp::Max, "v", &[]), CellValue::Null);
    }

    #[test]
    fn test_custom_receives_projection() {
        let op = AggregateOp::custom(|values| CellValue::Int(values.iter().filter(|v| v.is_null()).count() as i64));
        assert_eq!(aggregate(&op, "w", &rows()), CellValue::Int(1));
        assert_eq!(aggregate(&op, "missing", &rows()), CellValue::Int(3));
    }

    #[test]
    fn test_only_visible_aggregated_columns() {
        let columns = ColumnRegistry::new(vec![
            ColumnDescriptor::new("v").aggregate(AggregateOp::Sum),
            ColumnDescriptor::new("w").aggregate(AggregateOp::Count).visible(false),
            ColumnDescriptor::new("x"),
        ])
        .unwrap();
        let totals = compute_totals(&columns, &rows());
        assert_eq!(totals.len(), 1);
        assert_eq!(totals["v"], CellValue::Int(10));
    }
}
