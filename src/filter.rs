//! Local filter engine: column value filters and the quick filter.
//!
//! Both layers are optional and AND-composed. Column value filters run
//! first, then the quick filter. The same column filters can be turned into
//! a remote filter-expression tree with [`ColumnFilters::to_expression`].

use crate::column::ColumnRegistry;
use crate::criteria::FilterExpression;
use crate::value::{CellValue, Row};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Column value filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    In,
    Equal,
    Between,
    LessEqual,
    MoreEqual,
}

/// Values carried by a column filter: a scalar or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValues {
    List(Vec<CellValue>),
    Scalar(CellValue),
}

impl FilterValues {
    pub fn as_list(&self) -> Option<&[CellValue]> {
        match self {
            FilterValues::List(v) => Some(v),
            FilterValues::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&CellValue> {
        match self {
            FilterValues::Scalar(v) => Some(v),
            FilterValues::List(_) => None,
        }
    }
}

/// A structured constraint on one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnValueFilter {
    pub attr: String,
    pub operator: FilterOperator,
    pub values: FilterValues,
}

impl ColumnValueFilter {
    pub fn is_in<I, V>(attr: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<CellValue>,
    {
        ColumnValueFilter {
            attr: attr.into(),
            operator: FilterOperator::In,
            values: FilterValues::List(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn equal(attr: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::scalar(attr, FilterOperator::Equal, value)
    }

    pub fn between(attr: impl Into<String>, from: impl Into<CellValue>, to: impl Into<CellValue>) -> Self {
        ColumnValueFilter {
            attr: attr.into(),
            operator: FilterOperator::Between,
            values: FilterValues::List(vec![from.into(), to.into()]),
        }
    }

    pub fn less_equal(attr: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::scalar(attr, FilterOperator::LessEqual, value)
    }

    pub fn more_equal(attr: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::scalar(attr, FilterOperator::MoreEqual, value)
    }

    fn scalar(attr: impl Into<String>, operator: FilterOperator, value: impl Into<CellValue>) -> Self {
        ColumnValueFilter { attr: attr.into(), operator, values: FilterValues::Scalar(value.into()) }
    }

    /// `IN` needs a non-empty list, `BETWEEN` exactly two values, the rest a
    /// non-null scalar.
    pub fn is_well_formed(&self) -> bool {
        match (self.operator, &self.values) {
            (FilterOperator::In, FilterValues::List(v)) => !v.is_empty(),
            (FilterOperator::Between, FilterValues::List(v)) => v.len() == 2,
            (FilterOperator::Equal | FilterOperator::LessEqual | FilterOperator::MoreEqual, FilterValues::Scalar(v)) => {
                !v.is_null()
            }
            _ => false,
        }
    }

    /// Whether a row passes this filter.
    pub fn matches(&self, row: &Row) -> bool {
        let cell = row.get(&self.attr).unwrap_or(&CellValue::Null);
        match (self.operator, &self.values) {
            (FilterOperator::In, FilterValues::List(values)) => values.iter().any(|v| v.same_value(cell)),
            (FilterOperator::Equal, FilterValues::Scalar(value)) => equal_matches(&value.to_text(), cell),
            (FilterOperator::Between, FilterValues::List(bounds)) if bounds.len() == 2 => {
                at_least(cell, &bounds[0]) && at_most(cell, &bounds[1])
            }
            (FilterOperator::LessEqual, FilterValues::Scalar(value)) => at_most(cell, value),
            (FilterOperator::MoreEqual, FilterValues::Scalar(value)) => at_least(cell, value),
            _ => false,
        }
    }

    /// Remote predicate for this filter.
    pub fn to_expression(&self) -> Option<FilterExpression> {
        match (self.operator, &self.values) {
            (FilterOperator::In, FilterValues::List(values)) => values
                .iter()
                .map(|v| FilterExpression::equals(self.attr.clone(), v.clone()))
                .reduce(FilterExpression::or),
            (FilterOperator::Between, FilterValues::List(bounds)) if bounds.len() == 2 => Some(
                FilterExpression::more_equal(self.attr.clone(), bounds[0].clone())
                    .and(FilterExpression::less_equal(self.attr.clone(), bounds[1].clone())),
            ),
            (FilterOperator::Equal, FilterValues::Scalar(value)) => {
                let text = value.to_text();
                if text.contains('*') {
                    Some(FilterExpression::like_pattern(self.attr.clone(), text.replace('*', "%")))
                } else {
                    Some(FilterExpression::like(self.attr.clone(), &text))
                }
            }
            (FilterOperator::LessEqual, FilterValues::Scalar(value)) => {
                Some(FilterExpression::less_equal(self.attr.clone(), value.clone()))
            }
            (FilterOperator::MoreEqual, FilterValues::Scalar(value)) => {
                Some(FilterExpression::more_equal(self.attr.clone(), value.clone()))
            }
            _ => None,
        }
    }
}

fn at_least(cell: &CellValue, bound: &CellValue) -> bool {
    matches!(cell.loose_cmp(bound), Some(Ordering::Greater | Ordering::Equal))
}

fn at_most(cell: &CellValue, bound: &CellValue) -> bool {
    matches!(cell.loose_cmp(bound), Some(Ordering::Less | Ordering::Equal))
}

/// `EQUAL`: a value with `*` is an anchored glob, anything else a substring
/// test. Both sides are normalized first.
fn equal_matches(pattern: &str, cell: &CellValue) -> bool {
    let text = normalize_text(&cell.to_text());
    let pattern = normalize_text(pattern);

    if !pattern.contains('*') {
        return text.contains(&pattern);
    }

    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    match RegexBuilder::new(&format!("^{}$", body)).dot_matches_new_line(true).build() {
        Ok(re) => re.is_match(&text),
        Err(e) => {
            log::debug!("glob '{}' did not compile: {}", pattern, e);
            false
        }
    }
}

/// Lower-case and fold accented vowels and `ñ` onto their base letter.
pub fn normalize_text(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Active column filters, at most one per attr.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnFilters {
    filters: Vec<ColumnValueFilter>,
}

impl ColumnFilters {
    pub fn new() -> Self {
        ColumnFilters::default()
    }

    /// Adds a filter, replacing any filter already set on the same attr.
    ///
    /// A malformed filter is not added, but it still clears the previous one
    /// for that attr. Returns whether the filter was added.
    pub fn add(&mut self, filter: ColumnValueFilter) -> bool {
        self.filters.retain(|f| f.attr != filter.attr);
        if filter.is_well_formed() {
            self.filters.push(filter);
            true
        } else {
            log::debug!("dropping malformed {:?} filter on '{}'", filter.operator, filter.attr);
            false
        }
    }

    pub fn remove(&mut self, attr: &str) -> Option<ColumnValueFilter> {
        let pos = self.filters.iter().position(|f| f.attr == attr)?;
        Some(self.filters.remove(pos))
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn get(&self, attr: &str) -> Option<&ColumnValueFilter> {
        self.filters.iter().find(|f| f.attr == attr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnValueFilter> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Drops filters on attrs the registry does not know.
    pub fn retain_known(&mut self, columns: &ColumnRegistry) {
        self.filters.retain(|f| {
            let known = columns.contains(&f.attr);
            if !known {
                log::debug!("dropping filter on unknown column '{}'", f.attr);
            }
            known
        });
    }

    /// AND of every filter.
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    pub fn apply(&self, rows: Vec<Row>) -> Vec<Row> {
        if self.filters.is_empty() {
            return rows;
        }
        rows.into_iter().filter(|r| self.matches(r)).collect()
    }

    /// AND of every filter's remote predicate.
    pub fn to_expression(&self) -> Option<FilterExpression> {
        self.filters
            .iter()
            .filter_map(ColumnValueFilter::to_expression)
            .reduce(FilterExpression::and)
    }
}

/// Free-text filter across the searchable columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuickFilter {
    pub text: String,
    pub case_sensitive: bool,
}

impl QuickFilter {
    pub fn new(text: impl Into<String>, case_sensitive: bool) -> Self {
        QuickFilter { text: text.into(), case_sensitive }
    }

    pub fn is_active(&self) -> bool {
        !self.text.is_empty()
    }

    /// Concatenation of the searched cells of a row, space separated.
    ///
    /// Renderer-backed columns contribute only through their `filter_text`
    /// hook.
    pub fn searchable_text(columns: &ColumnRegistry, row: &Row) -> String {
        let null = CellValue::Null;
        columns
            .iter()
            .filter(|c| c.takes_part_in_quick_filter())
            .filter_map(|c| {
                let value = row.get(&c.attr).unwrap_or(&null);
                match &c.renderer {
                    Some(renderer) => renderer.filter_text(value, row),
                    None => Some(value.to_text()),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn matches(&self, columns: &ColumnRegistry, row: &Row) -> bool {
        if !self.is_active() {
            return true;
        }
        let haystack = Self::searchable_text(columns, row);
        if self.case_sensitive {
            haystack.contains(&self.text)
        } else {
            haystack.to_lowercase().contains(&self.text.to_lowercase())
        }
    }

    pub fn apply(&self, columns: &ColumnRegistry, rows: Vec<Row>) -> Vec<Row> {
        if !self.is_active() {
            return rows;
        }
        rows.into_iter().filter(|r| self.matches(columns, r)).collect()
    }

    /// OR of `LIKE` predicates over the remotely searchable columns.
    pub fn to_expression(&self, columns: &ColumnRegistry) -> Option<FilterExpression> {
        if !self.is_active() {
            return None;
        }
        FilterExpression::like_any(&columns.remote_quick_filter_columns(), &self.text)
    }
}
