//! Filter-expression DSL shared with the data service.
//!
//! Basic predicates (`=`, `<=`, `>=`, `LIKE`) combine with `AND`/`OR` into a
//! binary tree. On the wire every node is `{ "lop": .., "op": .., "rop": .. }`;
//! a predicate's `lop` is the column attr and its `rop` the literal, a
//! composite's operands are nested nodes.
//!
//! The same tree can be evaluated locally, so a filter built for the service
//! and a filter applied in memory mean the same thing.
//!
//! # Examples
//!
//! ```
//! use livegrid::criteria::FilterExpression;
//! use livegrid::CellValue;
//!
//! let expr = FilterExpression::equals("status", "open")
//!     .and(FilterExpression::more_equal("amount", CellValue::Int(100)));
//!
//! let json = serde_json::to_value(&expr).unwrap();
//! assert_eq!(json["op"], "AND");
//! assert_eq!(json["lop"]["lop"], "status");
//! assert_eq!(json["rop"]["op"], ">=");
//! ```

use crate::value::{parse_number, CellValue, Row};
use regex::Regex;
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Key under which a query filter carries its filter expression.
pub const FILTER_EXPRESSION_KEY: &str = "@filter_expression";
/// Key under which a query filter carries an externally built expression.
pub const BASIC_EXPRESSION_KEY: &str = "@basic_expression";

/// Predicate operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateOp {
    Equal,
    LessEqual,
    MoreEqual,
    Like,
}

impl PredicateOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            PredicateOp::Equal => "=",
            PredicateOp::LessEqual => "<=",
            PredicateOp::MoreEqual => ">=",
            PredicateOp::Like => "LIKE",
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.to_uppercase().as_str() {
            "=" => Some(PredicateOp::Equal),
            "<=" => Some(PredicateOp::LessEqual),
            ">=" => Some(PredicateOp::MoreEqual),
            "LIKE" => Some(PredicateOp::Like),
            _ => None,
        }
    }
}

/// Filter-expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpression {
    Predicate {
        column: String,
        op: PredicateOp,
        value: CellValue,
    },
    And(Box<FilterExpression>, Box<FilterExpression>),
    Or(Box<FilterExpression>, Box<FilterExpression>),
}

impl FilterExpression {
    pub fn equals(column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        FilterExpression::Predicate { column: column.into(), op: PredicateOp::Equal, value: value.into() }
    }

    pub fn less_equal(column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        FilterExpression::Predicate { column: column.into(), op: PredicateOp::LessEqual, value: value.into() }
    }

    pub fn more_equal(column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        FilterExpression::Predicate { column: column.into(), op: PredicateOp::MoreEqual, value: value.into() }
    }

    /// `LIKE` predicate with the value wrapped in `%` wildcards.
    pub fn like(column: impl Into<String>, value: &str) -> Self {
        FilterExpression::Predicate {
            column: column.into(),
            op: PredicateOp::Like,
            value: CellValue::Text(format!("%{}%", value)),
        }
    }

    /// `LIKE` predicate with the pattern used verbatim.
    pub fn like_pattern(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        FilterExpression::Predicate {
            column: column.into(),
            op: PredicateOp::Like,
            value: CellValue::Text(pattern.into()),
        }
    }

    pub fn and(self, other: FilterExpression) -> Self {
        FilterExpression::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: FilterExpression) -> Self {
        FilterExpression::Or(Box::new(self), Box::new(other))
    }

    /// OR of `LIKE` predicates over every column. `None` without columns.
    pub fn like_any(columns: &[&str], value: &str) -> Option<Self> {
        columns
            .iter()
            .map(|c| FilterExpression::like(*c, value))
            .reduce(FilterExpression::or)
    }

    /// AND of equality predicates, one per entry. `None` for an empty map.
    pub fn from_values(values: &BTreeMap<String, CellValue>) -> Option<Self> {
        values
            .iter()
            .map(|(k, v)| FilterExpression::equals(k.clone(), v.clone()))
            .reduce(FilterExpression::and)
    }

    /// AND-merge two optional expressions.
    pub fn merge_and(left: Option<Self>, right: Option<Self>) -> Option<Self> {
        match (left, right) {
            (Some(l), Some(r)) => Some(l.and(r)),
            (l, r) => l.or(r),
        }
    }

    /// Column attrs referenced anywhere in the tree.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FilterExpression::Predicate { column, .. } => out.push(column),
            FilterExpression::And(l, r) | FilterExpression::Or(l, r) => {
                l.collect_columns(out);
                r.collect_columns(out);
            }
        }
    }

    /// Evaluate the expression against a row in memory.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            FilterExpression::Predicate { column, op, value } => {
                let cell = row.get(column).unwrap_or(&CellValue::Null);
                match op {
                    PredicateOp::Equal => loose_equals(cell, value),
                    PredicateOp::LessEqual => {
                        matches!(cell.loose_cmp(value), Some(Ordering::Less | Ordering::Equal))
                    }
                    PredicateOp::MoreEqual => {
                        matches!(cell.loose_cmp(value), Some(Ordering::Greater | Ordering::Equal))
                    }
                    PredicateOp::Like => like_matches(&value.to_text(), &cell.to_text()),
                }
            }
            FilterExpression::And(l, r) => l.matches(row) && r.matches(row),
            FilterExpression::Or(l, r) => l.matches(row) || r.matches(row),
        }
    }

    /// Parse a wire-format node.
    pub fn from_json(node: &JsonValue) -> Result<Self, String> {
        let obj = node.as_object().ok_or("expression node must be an object")?;
        let op = obj
            .get("op")
            .and_then(JsonValue::as_str)
            .ok_or("expression node has no 'op'")?;
        let lop = obj.get("lop").ok_or("expression node has no 'lop'")?;
        let rop = obj.get("rop").unwrap_or(&JsonValue::Null);

        match op.to_uppercase().as_str() {
            "AND" => Ok(Self::from_json(lop)?.and(Self::from_json(rop)?)),
            "OR" => Ok(Self::from_json(lop)?.or(Self::from_json(rop)?)),
            symbol => {
                let op = PredicateOp::from_symbol(symbol)
                    .ok_or_else(|| format!("unsupported operator '{}'", symbol))?;
                let column = lop.as_str().ok_or("predicate 'lop' must be a column name")?;
                let value: CellValue = serde_json::from_value(rop.clone()).map_err(|e| e.to_string())?;
                Ok(FilterExpression::Predicate { column: column.to_string(), op, value })
            }
        }
    }
}

impl Serialize for FilterExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FilterExpression::Predicate { column, op, value } => {
                let mut node = serializer.serialize_struct("FilterExpression", 3)?;
                node.serialize_field("lop", column)?;
                node.serialize_field("op", op.symbol())?;
                node.serialize_field("rop", value)?;
                node.end()
            }
            FilterExpression::And(l, r) | FilterExpression::Or(l, r) => {
                let op = if matches!(self, FilterExpression::And(..)) { "AND" } else { "OR" };
                let mut node = serializer.serialize_struct("FilterExpression", 3)?;
                node.serialize_field("lop", l)?;
                node.serialize_field("op", op)?;
                node.serialize_field("rop", r)?;
                node.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for FilterExpression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let node = JsonValue::deserialize(deserializer)?;
        FilterExpression::from_json(&node).map_err(D::Error::custom)
    }
}

/// The filter argument of a query: plain key/value equalities plus optional
/// expressions under [`FILTER_EXPRESSION_KEY`] and [`BASIC_EXPRESSION_KEY`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    pub values: BTreeMap<String, CellValue>,
    pub filter_expression: Option<FilterExpression>,
    pub basic_expression: Option<FilterExpression>,
}

impl QueryFilter {
    pub fn new() -> Self {
        QueryFilter::default()
    }

    pub fn from_values(values: BTreeMap<String, CellValue>) -> Self {
        QueryFilter { values, ..QueryFilter::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.filter_expression.is_none() && self.basic_expression.is_none()
    }

    /// Column attrs referenced by values and expressions.
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut out: Vec<String> = self.values.keys().cloned().collect();
        for expr in [&self.filter_expression, &self.basic_expression].into_iter().flatten() {
            out.extend(expr.columns().into_iter().map(str::to_string));
        }
        out.sort();
        out.dedup();
        out
    }

    /// Whether a row satisfies every part of the filter.
    pub fn matches(&self, row: &Row) -> bool {
        self.values
            .iter()
            .all(|(k, v)| loose_equals(row.get(k).unwrap_or(&CellValue::Null), v))
            && self.filter_expression.as_ref().map_or(true, |e| e.matches(row))
            && self.basic_expression.as_ref().map_or(true, |e| e.matches(row))
    }

    pub fn to_json(&self) -> JsonValue {
        let mut obj = Map::new();
        for (k, v) in &self.values {
            obj.insert(k.clone(), serde_json::to_value(v).unwrap_or(JsonValue::Null));
        }
        if let Some(expr) = &self.filter_expression {
            obj.insert(FILTER_EXPRESSION_KEY.to_string(), serde_json::to_value(expr).unwrap_or(JsonValue::Null));
        }
        if let Some(expr) = &self.basic_expression {
            obj.insert(BASIC_EXPRESSION_KEY.to_string(), serde_json::to_value(expr).unwrap_or(JsonValue::Null));
        }
        JsonValue::Object(obj)
    }
}

impl Serialize for QueryFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for QueryFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let obj = Map::<String, JsonValue>::deserialize(deserializer)?;
        let mut filter = QueryFilter::new();
        for (k, v) in obj {
            match k.as_str() {
                FILTER_EXPRESSION_KEY => {
                    filter.filter_expression = Some(FilterExpression::from_json(&v).map_err(D::Error::custom)?)
                }
                BASIC_EXPRESSION_KEY => {
                    filter.basic_expression = Some(FilterExpression::from_json(&v).map_err(D::Error::custom)?)
                }
                _ => {
                    let value = serde_json::from_value(v).map_err(D::Error::custom)?;
                    filter.values.insert(k, value);
                }
            }
        }
        Ok(filter)
    }
}

/// Result of a caller-supplied quick-filter callback, used instead of the
/// built-in quick filter.
#[derive(Debug, Clone, PartialEq)]
pub enum QuickFilterOverride {
    /// Plain key/value equalities
    Values(BTreeMap<String, CellValue>),
    /// A pre-built expression, used verbatim
    Expression(FilterExpression),
}

impl QuickFilterOverride {
    pub fn to_expression(&self) -> Option<FilterExpression> {
        match self {
            QuickFilterOverride::Values(values) => FilterExpression::from_values(values),
            QuickFilterOverride::Expression(expr) => Some(expr.clone()),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.to_expression().map_or(true, |e| e.matches(row))
    }
}

/// Equality as the service applies it: numbers by value, a numeric string
/// equals the number it spells.
fn loose_equals(cell: &CellValue, value: &CellValue) -> bool {
    if cell.same_value(value) {
        return true;
    }
    match (cell, value) {
        (CellValue::Text(s), n) | (n, CellValue::Text(s)) => match n.as_f64() {
            Some(n) if !s.trim().is_empty() => parse_number(s) == Some(n),
            _ => false,
        },
        _ => false,
    }
}

/// Case-insensitive `LIKE` with `%` (any run) and `_` (any single char).
fn like_matches(pattern: &str, text: &str) -> bool {
    let mut re = String::from("(?is)^");
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            _ => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re).map(|r| r.is_match(text)).unwrap_or(false)
}
