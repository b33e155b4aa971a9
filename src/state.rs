//! View state, its persisted form and the capability traits.
//!
//! [`ViewState`] holds every directive that shapes the materialized view. The
//! persisted form is what an external storage collaborator saves and hands
//! back on initialization.

use crate::column::ColumnRegistry;
use crate::filter::{ColumnFilters, ColumnValueFilter, QuickFilter};
use crate::pagination::{PageSize, Paginator};
use crate::sort::{normalize_sort, parse_sort_columns, SortSpec};
use serde::{Deserialize, Serialize};

/// Directives currently applied to a view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub quick_filter: QuickFilter,
    pub column_filters: ColumnFilters,
    pub sort: Option<SortSpec>,
    pub paginator: Paginator,
    pub selected: Vec<usize>,
}

/// Saved view state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedViewState {
    /// `column[:ASC|DESC]` entries separated by `;`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_columns: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_case_sensitive: Option<bool>,
    pub column_value_filters: Vec<ColumnValueFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<PageSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_record_offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_query_records_number: Option<usize>,
    pub selected_indexes: Vec<usize>,
}

impl ViewState {
    pub fn new(paginator: Paginator) -> Self {
        ViewState { paginator, ..ViewState::default() }
    }

    pub fn to_persisted(&self) -> PersistedViewState {
        PersistedViewState {
            sort_columns: self.sort.as_ref().map(SortSpec::to_sort_string),
            filter_value: self.quick_filter.is_active().then(|| self.quick_filter.text.clone()),
            filter_case_sensitive: Some(self.quick_filter.case_sensitive),
            column_value_filters: self.column_filters.iter().cloned().collect(),
            page_size: Some(self.paginator.page_size()),
            current_page: Some(self.paginator.page_index()),
            query_record_offset: Some(self.paginator.query_record_offset()),
            total_query_records_number: Some(self.paginator.total_records()),
            selected_indexes: self.selected.clone(),
        }
    }

    /// Resumes from a saved state.
    ///
    /// Sort and filters naming unknown columns are dropped. In remote mode
    /// the query offset steps back one page so the restored page is fetched
    /// again.
    pub fn restore(&mut self, saved: &PersistedViewState, columns: &ColumnRegistry, remote: bool) {
        if let Some(sort) = &saved.sort_columns {
            self.sort = normalize_sort(parse_sort_columns(sort), columns);
        }
        if let Some(text) = &saved.filter_value {
            self.quick_filter.text = text.clone();
        }
        if let Some(case_sensitive) = saved.filter_case_sensitive {
            self.quick_filter.case_sensitive = case_sensitive;
        }

        self.column_filters.clear();
        for filter in &saved.column_value_filters {
            self.column_filters.add(filter.clone());
        }
        self.column_filters.retain_known(columns);

        if let Some(size) = saved.page_size {
            self.paginator.set_page_size(size);
        }
        if let Some(total) = saved.total_query_records_number {
            self.paginator.set_total_records(total);
        }
        let page = saved.current_page.unwrap_or(0);
        if remote {
            self.paginator.restore_offset(page, saved.query_record_offset.unwrap_or(0));
        } else {
            self.paginator.set_page_index(page);
        }
        self.selected = saved.selected_indexes.clone();
    }
}

/// Quick filter and column value filters of a view.
pub trait HasFilterState {
    fn quick_filter(&self) -> &str;

    fn set_quick_filter(&mut self, text: &str);

    fn column_filters(&self) -> &ColumnFilters;

    /// Replaces any filter on the same attr. Malformed filters are not added.
    fn add_column_filter(&mut self, filter: ColumnValueFilter);

    fn clear_column_filters(&mut self);

    fn column_filter(&self, attr: &str) -> Option<&ColumnValueFilter> {
        self.column_filters().get(attr)
    }

    fn is_column_filter_active(&self) -> bool {
        !self.column_filters().is_empty()
    }
}

/// The single active sort key of a view.
pub trait HasSortState {
    fn sort(&self) -> Option<&SortSpec>;

    /// Replaces the active key; `None` clears it. Unknown columns are dropped.
    fn set_sort(&mut self, spec: Option<SortSpec>);
}

/// Page position and size of a view.
pub trait HasPagination {
    fn paginator(&self) -> &Paginator;

    fn set_page(&mut self, index: usize, size: PageSize);

    fn total_records(&self) -> usize {
        self.paginator().total_records()
    }
}
