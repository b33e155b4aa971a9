//! Column descriptors and the column registry.
//!
//! The registry is the only schema the engine knows about: rows are open maps,
//! and everything that decides what is searched, sorted, queried, calculated
//! or totalled lives on the [`ColumnDescriptor`]s registered here.

use crate::error::{EngineError, FormulaError};
use crate::expr::{extract_columns, parse_formula, Expr};
use crate::value::{CellValue, Row};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Display type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    String,
    Integer,
    Real,
    Currency,
    Percentage,
    Boolean,
    Date,
}

/// Function computing a calculated column from the whole row.
pub type RowFunction = Rc<dyn Fn(&Row) -> CellValue>;

/// Function folding a projected column into a total.
pub type AggregateFunction = Rc<dyn Fn(&[CellValue]) -> CellValue>;

/// How a calculated column derives its value.
#[derive(Clone)]
pub enum Calculation {
    /// Arithmetic formula over other column attrs.
    Formula { source: String, parsed: Result<Expr, FormulaError> },
    /// Caller-supplied function of the row, used as is.
    Function(RowFunction),
}

impl Calculation {
    pub fn formula(source: impl Into<String>) -> Self {
        let source = source.into();
        let parsed = parse_formula(&source);
        Calculation::Formula { source, parsed }
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&Row) -> CellValue + 'static,
    {
        Calculation::Function(Rc::new(f))
    }
}

impl fmt::Debug for Calculation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Calculation::Formula { source, .. } => write!(f, "Formula({:?})", source),
            Calculation::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Aggregate operator for the totals row.
#[derive(Clone)]
pub enum AggregateOp {
    Sum,
    Count,
    Min,
    Max,
    Avg,
    Custom(AggregateFunction),
}

impl AggregateOp {
    /// Parse an operator name. Unknown names fall back to `Sum`.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "count" => AggregateOp::Count,
            "min" => AggregateOp::Min,
            "max" => AggregateOp::Max,
            "avg" => AggregateOp::Avg,
            _ => AggregateOp::Sum,
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[CellValue]) -> CellValue + 'static,
    {
        AggregateOp::Custom(Rc::new(f))
    }
}

impl fmt::Debug for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateOp::Sum => f.write_str("Sum"),
            AggregateOp::Count => f.write_str("Count"),
            AggregateOp::Min => f.write_str("Min"),
            AggregateOp::Max => f.write_str("Max"),
            AggregateOp::Avg => f.write_str("Avg"),
            AggregateOp::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Cell renderer hook supplied by the rendering layer.
pub trait CellRenderer {
    /// Rendered text of a cell, used for rendered exports.
    fn cell_data(&self, value: &CellValue, row: &Row) -> String;

    /// Text the quick filter matches against. Renderer-backed columns take
    /// part in quick filtering only when this returns `Some`.
    fn filter_text(&self, _value: &CellValue, _row: &Row) -> Option<String> {
        None
    }
}

/// Column descriptor
#[derive(Clone)]
pub struct ColumnDescriptor {
    pub attr: String,
    pub title: String,
    pub column_type: ColumnType,
    pub searchable: bool,
    /// Current quick-filter toggle for this column
    pub searching: bool,
    pub orderable: bool,
    pub visible: bool,
    pub width: Option<String>,
    pub calculate: Option<Calculation>,
    pub aggregate: Option<AggregateOp>,
    pub sql_type: Option<i32>,
    pub renderer: Option<Rc<dyn CellRenderer>>,
}

impl ColumnDescriptor {
    pub fn new(attr: impl Into<String>) -> Self {
        let attr = attr.into();
        ColumnDescriptor {
            title: attr.clone(),
            attr,
            column_type: ColumnType::default(),
            searchable: true,
            searching: true,
            orderable: true,
            visible: true,
            width: None,
            calculate: None,
            aggregate: None,
            sql_type: None,
            renderer: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn column_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = column_type;
        self
    }

    pub fn searchable(mut self, searchable: bool) -> Self {
        self.searchable = searchable;
        self.searching = searchable;
        self
    }

    pub fn orderable(mut self, orderable: bool) -> Self {
        self.orderable = orderable;
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn width(mut self, width: impl Into<String>) -> Self {
        self.width = Some(width.into());
        self
    }

    pub fn calculate(mut self, calculation: Calculation) -> Self {
        self.calculate = Some(calculation);
        self
    }

    pub fn formula(self, source: impl Into<String>) -> Self {
        self.calculate(Calculation::formula(source))
    }

    pub fn aggregate(mut self, op: AggregateOp) -> Self {
        self.aggregate = Some(op);
        self
    }

    pub fn sql_type(mut self, sql_type: i32) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    pub fn renderer(mut self, renderer: Rc<dyn CellRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn is_calculated(&self) -> bool {
        self.calculate.is_some()
    }

    /// Whether the local quick filter looks at this column at all.
    pub fn takes_part_in_quick_filter(&self) -> bool {
        self.searchable && self.visible && self.searching
    }
}

impl fmt::Debug for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("attr", &self.attr)
            .field("column_type", &self.column_type)
            .field("searchable", &self.searchable)
            .field("searching", &self.searching)
            .field("orderable", &self.orderable)
            .field("visible", &self.visible)
            .field("calculate", &self.calculate)
            .field("aggregate", &self.aggregate)
            .field("sql_type", &self.sql_type)
            .field("renderer", &self.renderer.is_some())
            .finish()
    }
}

/// Ordered set of column descriptors with unique attrs.
///
/// # Examples
///
/// ```
/// use livegrid::{ColumnDescriptor, ColumnRegistry};
///
/// let registry = ColumnRegistry::new(vec![
///     ColumnDescriptor::new("price"),
///     ColumnDescriptor::new("qty"),
///     ColumnDescriptor::new("total").formula("price * qty"),
/// ]).unwrap();
///
/// assert_eq!(registry.len(), 3);
/// assert_eq!(registry.query_columns(), vec!["price", "qty"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ColumnRegistry {
    columns: Vec<ColumnDescriptor>,
}

impl ColumnRegistry {
    /// Creates a registry, rejecting duplicated attrs.
    ///
    /// Formulas naming attrs that no column declares are kept (rows may
    /// still carry those attrs) but logged.
    pub fn new(columns: Vec<ColumnDescriptor>) -> Result<Self, EngineError> {
        let mut registry = ColumnRegistry { columns: Vec::with_capacity(columns.len()) };
        for column in columns {
            registry.register(column)?;
        }
        for (attr, unknown) in registry.unknown_formula_attrs() {
            log::warn!("formula of column '{}' refers to '{}', which is not a column", attr, unknown);
        }
        Ok(registry)
    }

    /// `(column, attr)` pairs for formula references to undeclared attrs.
    pub fn unknown_formula_attrs(&self) -> Vec<(&str, String)> {
        let mut unknown = Vec::new();
        for column in &self.columns {
            if let Some(Calculation::Formula { parsed: Ok(expr), .. }) = &column.calculate {
                for name in extract_columns(expr) {
                    if !self.contains(&name) {
                        unknown.push((column.attr.as_str(), name));
                    }
                }
            }
        }
        unknown
    }

    /// Adds a column at the end of the registry.
    pub fn register(&mut self, column: ColumnDescriptor) -> Result<(), EngineError> {
        if self.get(&column.attr).is_some() {
            return Err(EngineError::DuplicateColumn(column.attr));
        }
        if let Some(Calculation::Formula { source, parsed: Err(e) }) = &column.calculate {
            log::warn!("calculated column '{}' has an invalid formula '{}': {}", column.attr, source, e);
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter()
    }

    pub fn get(&self, attr: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.attr == attr)
    }

    pub fn get_mut(&mut self, attr: &str) -> Option<&mut ColumnDescriptor> {
        self.columns.iter_mut().find(|c| c.attr == attr)
    }

    pub fn contains(&self, attr: &str) -> bool {
        self.get(attr).is_some()
    }

    /// All attrs in registration order.
    pub fn attrs(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.attr.as_str()).collect()
    }

    pub fn visible_attrs(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.visible)
            .map(|c| c.attr.as_str())
            .collect()
    }

    pub fn set_visible(&mut self, attr: &str, visible: bool) -> bool {
        match self.get_mut(attr) {
            Some(col) => {
                col.visible = visible;
                true
            }
            None => false,
        }
    }

    /// Toggles whether the quick filter searches this column.
    pub fn set_searching(&mut self, attr: &str, searching: bool) -> bool {
        match self.get_mut(attr) {
            Some(col) => {
                col.searching = searching;
                true
            }
            None => false,
        }
    }

    /// Attrs fetched from the data service: calculated columns are derived,
    /// never fetched.
    pub fn query_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| !c.is_calculated())
            .map(|c| c.attr.as_str())
            .collect()
    }

    /// Columns the remote quick filter builds LIKE predicates for. Rendered
    /// and calculated columns only exist on this side.
    pub fn remote_quick_filter_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.takes_part_in_quick_filter() && c.renderer.is_none() && !c.is_calculated())
            .map(|c| c.attr.as_str())
            .collect()
    }

    pub fn has_calculated_columns(&self) -> bool {
        self.columns.iter().any(|c| c.is_calculated())
    }

    pub fn has_aggregates(&self) -> bool {
        self.columns.iter().any(|c| c.aggregate.is_some())
    }

    /// Declared sql types, keyed by attr.
    pub fn sql_types(&self) -> HashMap<String, i32> {
        self.columns
            .iter()
            .filter_map(|c| c.sql_type.map(|t| (c.attr.clone(), t)))
            .collect()
    }

    /// Whether `attr` names a column that can be sorted on.
    pub fn is_orderable(&self, attr: &str) -> bool {
        self.get(attr).map(|c| c.orderable).unwrap_or(false)
    }
}
