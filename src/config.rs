//! Engine and grid configuration.
//!
//! Both structs deserialize from JSON with defaults for every field, so a
//! config only needs to name what differs.
//!
//! # Examples
//!
//! ```
//! use livegrid::config::{EngineConfig, ExecutionMode};
//!
//! let config: EngineConfig = serde_json::from_str(r#"{"mode": "remote", "entity": "customers"}"#).unwrap();
//! assert_eq!(config.mode, ExecutionMode::Remote);
//! assert_eq!(config.query_rows, 10);
//! assert_eq!(config.paginated_query_method, "advancedQuery");
//! ```

use crate::column::{AggregateOp, Calculation, ColumnDescriptor, ColumnRegistry, ColumnType};
use crate::error::EngineError;
use crate::filter::ColumnValueFilter;
use crate::pagination::DEFAULT_PAGE_SIZE_OPTIONS;
use crate::value::Row;
use serde::{Deserialize, Serialize};

/// Where filtering, sorting and paging run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Over the full row set held in memory
    #[default]
    Local,
    /// Delegated to the data service; only one page is held
    Remote,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub mode: ExecutionMode,
    /// Entity queried on the data service
    pub entity: String,
    /// Key columns, always part of the queried columns
    pub keys: Vec<String>,
    /// Columns never sent to the service
    pub avoid_query_columns: Vec<String>,
    pub query_method: String,
    pub paginated_query_method: String,
    /// Rows per page
    pub query_rows: usize,
    pub page_size_options: Vec<usize>,
    pub filter_case_sensitive: bool,
    /// Whether the quick filter is offered at all
    pub quick_filter: bool,
    /// Append pages instead of replacing them (list behaviour)
    pub accumulate_pages: bool,
    /// Initial sort, `column[:ASC|DESC]` entries separated by `;`
    pub sort_columns: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            mode: ExecutionMode::Local,
            entity: String::new(),
            keys: Vec::new(),
            avoid_query_columns: Vec::new(),
            query_method: "query".to_string(),
            paginated_query_method: "advancedQuery".to_string(),
            query_rows: DEFAULT_PAGE_SIZE_OPTIONS[0],
            page_size_options: DEFAULT_PAGE_SIZE_OPTIONS.to_vec(),
            filter_case_sensitive: false,
            quick_filter: true,
            accumulate_pages: false,
            sort_columns: None,
        }
    }
}

impl EngineConfig {
    pub fn local() -> Self {
        EngineConfig::default()
    }

    pub fn remote(entity: impl Into<String>) -> Self {
        EngineConfig {
            mode: ExecutionMode::Remote,
            entity: entity.into(),
            ..EngineConfig::default()
        }
    }

    pub fn is_remote(&self) -> bool {
        self.mode == ExecutionMode::Remote
    }

    /// Method used for a query: paginated queries go through the advanced one.
    pub fn method_for(&self, paginated: bool) -> &str {
        if paginated {
            &self.paginated_query_method
        } else {
            &self.query_method
        }
    }
}

/// Serializable column description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnConfig {
    pub attr: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "type")]
    pub column_type: ColumnType,
    #[serde(default = "default_true")]
    pub searchable: bool,
    #[serde(default = "default_true")]
    pub orderable: bool,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub width: Option<String>,
    /// Arithmetic formula over other attrs
    #[serde(default)]
    pub calculate: Option<String>,
    /// `sum`, `count`, `min`, `max` or `avg`
    #[serde(default)]
    pub aggregate: Option<String>,
    #[serde(default)]
    pub sql_type: Option<i32>,
}

fn default_true() -> bool {
    true
}

impl ColumnConfig {
    pub fn to_descriptor(&self) -> ColumnDescriptor {
        let mut column = ColumnDescriptor::new(self.attr.clone())
            .column_type(self.column_type)
            .searchable(self.searchable)
            .orderable(self.orderable)
            .visible(self.visible);
        if let Some(title) = &self.title {
            column = column.title(title.clone());
        }
        if let Some(width) = &self.width {
            column = column.width(width.clone());
        }
        if let Some(formula) = &self.calculate {
            column = column.calculate(Calculation::formula(formula.clone()));
        }
        if let Some(op) = &self.aggregate {
            column = column.aggregate(AggregateOp::from_name(op));
        }
        if let Some(sql_type) = self.sql_type {
            column = column.sql_type(sql_type);
        }
        column
    }
}

/// View directives applied on load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Directives {
    pub quick_filter: Option<String>,
    pub column_filters: Vec<ColumnValueFilter>,
    pub sort_columns: Option<String>,
    pub page_index: usize,
    pub page_size: Option<usize>,
}

/// A complete grid: engine settings, columns and optional static rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GridConfig {
    pub engine: EngineConfig,
    pub columns: Vec<ColumnConfig>,
    pub data: Vec<Row>,
    pub directives: Directives,
}

impl GridConfig {
    pub fn from_json(s: &str) -> Result<Self, EngineError> {
        serde_json::from_str(s).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn column_registry(&self) -> Result<ColumnRegistry, EngineError> {
        if self.columns.is_empty() {
            return Err(EngineError::MissingColumns);
        }
        ColumnRegistry::new(self.columns.iter().map(ColumnConfig::to_descriptor).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.query_rows, 10);
        assert_eq!(config.page_size_options, vec![10, 25, 50, 100]);
        assert!(config.quick_filter);
        assert_eq!(config.method_for(false), "query");
        assert_eq!(config.method_for(true), "advancedQuery");
    }

    #[test]
    fn test_grid_config() {
        let grid = GridConfig::from_json(
            r#"{
                "engine": {"queryRows": 25, "sortColumns": "total:DESC"},
                "columns": [
                    {"attr": "price", "type": "currency", "sqlType": 8},
                    {"attr": "qty", "type": "integer", "searchable": false},
                    {"attr": "total", "calculate": "price * qty", "aggregate": "sum"}
                ],
                "data": [{"price": 2, "qty": 3}],
                "directives": {"quickFilter": "2"}
            }"#,
        )
        .unwrap();
        assert_eq!(grid.engine.query_rows, 25);
        assert_eq!(grid.data.len(), 1);

        let registry = grid.column_registry().unwrap();
        assert_eq!(registry.query_columns(), vec!["price", "qty"]);
        assert!(!registry.get("qty").unwrap().searchable);
        assert_eq!(registry.get("price").unwrap().column_type, ColumnType::Currency);
        assert_eq!(registry.sql_types()["price"], 8);
        assert!(registry.has_aggregates());
    }

    #[test]
    fn test_errors() {
        assert!(matches!(GridConfig::from_json("{"), Err(EngineError::Config(_))));
        assert_eq!(GridConfig::default().column_registry().unwrap_err(), EngineError::MissingColumns);
    }
}
