//! Calculated column evaluation.
//!
//! Runs before any filtering or sorting, since both may reference calculated
//! columns. Columns are evaluated in registration order, so a formula can use
//! a calculated column registered before it.

use crate::column::{Calculation, ColumnRegistry};
use crate::error::FormulaError;
use crate::expr::eval_formula;
use crate::value::{CellValue, Row};

/// Fills every visible calculated column of `rows` in place.
///
/// Formula failures and `NaN` results become `0` and are logged; they never
/// abort the pipeline. Function calculations are stored as returned.
pub fn apply_calculated_columns(columns: &ColumnRegistry, rows: &mut [Row]) {
    let calculated: Vec<_> = columns
        .iter()
        .filter(|c| c.visible)
        .filter_map(|c| c.calculate.as_ref().map(|calc| (c.attr.as_str(), calc)))
        .collect();

    if calculated.is_empty() {
        return;
    }

    for row in rows.iter_mut() {
        for (attr, calculation) in &calculated {
            let value = evaluate(attr, calculation, row);
            row.insert((*attr).to_string(), value);
        }
    }
}

/// Evaluate one calculation against one row.
pub fn evaluate(attr: &str, calculation: &Calculation, row: &Row) -> CellValue {
    match calculation {
        Calculation::Function(f) => f(row),
        Calculation::Formula { source, parsed } => {
            let result = parsed
                .as_ref()
                .map_err(|e| e.clone())
                .and_then(|expr| eval_formula(expr, &|name: &str| row.get(name).cloned()))
                .and_then(|n| if n.is_nan() { Err(FormulaError::NotANumber) } else { Ok(n) });

            match result {
                Ok(n) => CellValue::from_number(n),
                Err(e) => {
                    log::debug!("calculated column '{}' ('{}') fell back to 0: {}", attr, source, e);
                    CellValue::Int(0)
                }
            }
        }
    }
}
