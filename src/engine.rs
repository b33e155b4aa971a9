//! Change coordinator.
//!
//! [`ViewEngine`] owns the view state and turns every change (data, sort,
//! filters, page, recalculation, reload) into one consistent recomputation.
//! Changes are posted to a single [`RecomputeQueue`] and drained once per
//! cycle; outside a [`ViewEngine::batch`] each change flushes immediately.
//!
//! In local mode a cycle runs calculated columns, column value filters, the
//! quick filter, the sort and the page window over the record store. In
//! remote mode it builds query arguments instead and keeps exactly one query
//! in flight: a newer query cancels the older one, and a response for any
//! ticket but the latest is ignored.
//!
//! # Examples
//!
//! ```
//! use livegrid::{row, ColumnDescriptor, ColumnRegistry, HasFilterState, RecordStore, ViewEngine};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let store = Rc::new(RefCell::new(RecordStore::with_rows(vec![
//!     row([("name", "Ana")]),
//!     row([("name", "Bob")]),
//!     row([("name", "ana")]),
//! ])));
//! let columns = ColumnRegistry::new(vec![ColumnDescriptor::new("name")]).unwrap();
//!
//! let mut engine = ViewEngine::builder().store(store).columns(columns).build().unwrap();
//! engine.reload();
//! assert_eq!(engine.view().rows.len(), 3);
//!
//! engine.set_quick_filter("ana");
//! assert_eq!(engine.view().rows.len(), 2);
//! assert_eq!(engine.view().total_records, 2);
//! ```

use crate::aggregate::{compute_totals, TotalsRow};
use crate::calculate::apply_calculated_columns;
use crate::column::ColumnRegistry;
use crate::config::EngineConfig;
use crate::criteria::{FilterExpression, QueryFilter, QuickFilterOverride};
use crate::error::{EngineError, ServiceError};
use crate::filter::{ColumnFilters, ColumnValueFilter};
use crate::lookup::{LookupRegistry, LookupRequest};
use crate::pagination::{PageSize, Paginator, QueryWindow};
use crate::queue::{RecomputeQueue, RecomputeRequest, ViewEvent};
use crate::service::{DataService, QueryArguments, QueryOutcome, QueryResult, QueryTicket, ServiceResponse};
use crate::sort::{normalize_sort, parse_sort_columns, sort_rows, SortSpec};
use crate::state::{HasFilterState, HasPagination, HasSortState, PersistedViewState, ViewState};
use crate::store::{RecordStore, StoreChange};
use crate::value::{CellValue, Row};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

/// Rows currently eligible for rendering
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializedView {
    pub rows: Vec<Row>,
    /// Records across every page
    pub total_records: usize,
    pub page_index: usize,
    /// Bumped on every emission
    pub revision: u64,
}

/// Something a listener is told about
#[derive(Debug)]
pub enum ViewNotification<'a> {
    View(&'a MaterializedView),
    Totals(&'a TotalsRow),
    Loading(bool),
    Error(&'a ServiceError),
    LookupResolved {
        row_index: usize,
        column: &'a str,
        value: &'a CellValue,
    },
}

/// Handle returned by [`ViewEngine::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&ViewNotification<'_>)>;

/// Caller-supplied quick filter: gets the quick-filter text, may return a
/// replacement filter.
pub type QuickFilterCallback = Box<dyn Fn(&str) -> Option<QuickFilterOverride>>;

#[derive(Debug, Clone, Copy)]
struct InFlight {
    ticket: QueryTicket,
    /// Append the rows instead of replacing the store
    append: bool,
}

/// Builder for [`ViewEngine`]
#[derive(Default)]
pub struct ViewEngineBuilder {
    store: Option<Rc<RefCell<RecordStore>>>,
    columns: Option<ColumnRegistry>,
    service: Option<Box<dyn DataService>>,
    config: EngineConfig,
    saved_state: Option<PersistedViewState>,
}

impl ViewEngineBuilder {
    pub fn store(mut self, store: Rc<RefCell<RecordStore>>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn columns(mut self, columns: ColumnRegistry) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn service(mut self, service: impl DataService + 'static) -> Self {
        self.service = Some(Box::new(service));
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// State to resume from.
    pub fn saved_state(mut self, state: PersistedViewState) -> Self {
        self.saved_state = Some(state);
        self
    }

    /// Builds the engine. A missing store or an empty column registry is fatal.
    pub fn build(self) -> Result<ViewEngine, EngineError> {
        let store = self.store.ok_or(EngineError::MissingStore)?;
        let columns = self.columns.ok_or(EngineError::MissingColumns)?;
        if columns.is_empty() {
            return Err(EngineError::MissingColumns);
        }
        let config = self.config;

        let paginator = Paginator::new(config.page_size_options.clone(), PageSize::Rows(config.query_rows));
        let mut state = ViewState::new(paginator);
        state.quick_filter.case_sensitive = config.filter_case_sensitive;
        if let Some(sort) = &config.sort_columns {
            state.sort = normalize_sort(parse_sort_columns(sort), &columns);
        }
        if let Some(saved) = &self.saved_state {
            state.restore(saved, &columns, config.is_remote());
        }

        // local rows already in the store count as unseen; remote rows only
        // arrive with responses
        let last_synced_generation = if config.is_remote() {
            Some(store.borrow().generation())
        } else {
            None
        };
        Ok(ViewEngine {
            store,
            columns,
            service: self.service,
            config,
            state,
            queue: RecomputeQueue::new(),
            batch_depth: 0,
            last_synced_generation,
            filtered: Vec::new(),
            view: MaterializedView::default(),
            totals: TotalsRow::new(),
            listeners: Vec::new(),
            next_subscription: 0,
            next_ticket: 0,
            in_flight: None,
            lookups: LookupRegistry::new(),
            parent_values: BTreeMap::new(),
            external_expression: None,
            quick_filter_callback: None,
            destroyed: false,
        })
    }
}

/// The reactive view engine
pub struct ViewEngine {
    store: Rc<RefCell<RecordStore>>,
    columns: ColumnRegistry,
    service: Option<Box<dyn DataService>>,
    config: EngineConfig,
    state: ViewState,
    queue: RecomputeQueue,
    batch_depth: usize,
    /// Last store generation this engine has seen
    last_synced_generation: Option<u64>,
    /// Filtered and sorted rows before paging (local mode), held rows (remote)
    filtered: Vec<Row>,
    view: MaterializedView,
    totals: TotalsRow,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    next_ticket: u64,
    in_flight: Option<InFlight>,
    lookups: LookupRegistry,
    parent_values: BTreeMap<String, CellValue>,
    external_expression: Option<FilterExpression>,
    quick_filter_callback: Option<QuickFilterCallback>,
    destroyed: bool,
}

impl ViewEngine {
    pub fn builder() -> ViewEngineBuilder {
        ViewEngineBuilder::default()
    }

    pub fn view(&self) -> &MaterializedView {
        &self.view
    }

    pub fn totals(&self) -> &TotalsRow {
        &self.totals
    }

    pub fn columns(&self) -> &ColumnRegistry {
        &self.columns
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn store(&self) -> Rc<RefCell<RecordStore>> {
        Rc::clone(&self.store)
    }

    /// Whether a query is outstanding.
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    // ---- listeners ----

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&ViewNotification<'_>) + 'static,
    {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(l, _)| *l != id);
        self.listeners.len() != before
    }

    fn notify(listeners: &mut [(SubscriptionId, Listener)], notification: &ViewNotification<'_>) {
        for (_, listener) in listeners.iter_mut() {
            listener(notification);
        }
    }

    // ---- change sources ----

    fn post(&mut self, event: ViewEvent) {
        if self.destroyed {
            return;
        }
        self.queue.post(event);
        self.flush();
    }

    /// Runs `f` with flushing suspended; every change it makes is applied in
    /// one cycle afterwards.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.batch_depth += 1;
        let result = f(self);
        self.batch_depth -= 1;
        self.flush();
        result
    }

    /// Picks up changes made to the shared record store from outside.
    pub fn refresh(&mut self) {
        self.flush();
    }

    /// Queries again (remote: the current page) or recomputes from the store.
    pub fn reload(&mut self) {
        self.post(ViewEvent::Reload { from_start: false });
    }

    /// Like [`reload`](Self::reload), from the first page.
    pub fn reload_from_start(&mut self) {
        self.post(ViewEvent::Reload { from_start: true });
    }

    pub fn set_rows(&mut self, rows: Vec<Row>) {
        self.store.borrow_mut().set_rows(rows);
        self.flush();
    }

    pub fn append_rows(&mut self, rows: Vec<Row>) {
        self.store.borrow_mut().append_rows(rows);
        self.flush();
    }

    pub fn recalculate_columns(&mut self) {
        self.post(ViewEvent::RecalculateColumns);
    }

    pub fn set_column_visible(&mut self, attr: &str, visible: bool) {
        if self.columns.set_visible(attr, visible) {
            self.post(ViewEvent::RecalculateColumns);
        }
    }

    pub fn set_column_searching(&mut self, attr: &str, searching: bool) {
        if self.columns.set_searching(attr, searching) {
            self.post(ViewEvent::QuickFilterChanged);
        }
    }

    pub fn set_filter_case_sensitive(&mut self, case_sensitive: bool) {
        self.state.quick_filter.case_sensitive = case_sensitive;
        self.post(ViewEvent::QuickFilterChanged);
    }

    pub fn set_quick_filter_callback(&mut self, callback: Option<QuickFilterCallback>) {
        self.quick_filter_callback = callback;
        self.post(ViewEvent::QuickFilterChanged);
    }

    pub fn remove_column_filter(&mut self, attr: &str) -> Option<ColumnValueFilter> {
        let removed = self.state.column_filters.remove(attr);
        if removed.is_some() {
            self.post(ViewEvent::ColumnFiltersChanged);
        }
        removed
    }

    /// Sort from a `column[:ASC|DESC]` list; only the first usable entry counts.
    pub fn set_sort_columns(&mut self, sort_columns: &str) {
        let spec = parse_sort_columns(sort_columns).into_iter().next();
        self.set_sort(spec);
    }

    /// Key/value filter of a parent record, sent with every query.
    pub fn set_parent_values(&mut self, values: BTreeMap<String, CellValue>) {
        self.parent_values = values;
        self.post(ViewEvent::ParentFilterChanged);
    }

    /// Externally built expression, AND-ed into every query.
    pub fn set_external_expression(&mut self, expression: Option<FilterExpression>) {
        self.external_expression = expression;
        self.post(ViewEvent::ParentFilterChanged);
    }

    pub fn selected(&self) -> &[usize] {
        &self.state.selected
    }

    pub fn set_selected(&mut self, indexes: Vec<usize>) {
        self.state.selected = indexes;
    }

    /// Resumes from a saved state.
    pub fn restore(&mut self, saved: &PersistedViewState) {
        self.state.restore(saved, &self.columns, self.config.is_remote());
        self.post(ViewEvent::StateRestored);
    }

    /// Current state, for the storage collaborator to persist.
    pub fn snapshot(&self) -> PersistedViewState {
        self.state.to_persisted()
    }

    /// Fetches the next chunk and appends it (accumulating lists). Returns
    /// whether a query went out.
    pub fn load_more(&mut self) -> bool {
        if !self.config.is_remote() || !self.config.accumulate_pages {
            log::warn!("load_more needs remote mode with accumulating pages");
            return false;
        }
        if self.in_flight.is_some() {
            return false;
        }
        let held = self.store.borrow().len();
        let issued = match self.state.paginator.next_chunk_window(held) {
            Some(window) => self.issue_query(Some(window), true),
            None => false,
        };
        self.poll();
        issued
    }

    // ---- recompute cycle ----

    fn flush(&mut self) {
        if self.batch_depth > 0 || self.destroyed {
            return;
        }
        let generation = self.store.borrow().generation();
        if self.last_synced_generation != Some(generation) {
            self.queue.post(ViewEvent::DataChanged);
        }
        if let Some(request) = self.queue.drain() {
            let changes = if request.data { self.sync_generation() } else { Vec::new() };
            if self.config.is_remote() {
                self.recompute_remote(request, &changes);
            } else {
                self.recompute_local(request);
            }
        }
        self.poll();
    }

    /// Marks the store as seen and returns what changed since last time.
    fn sync_generation(&mut self) -> Vec<StoreChange> {
        let mut store = self.store.borrow_mut();
        self.last_synced_generation = Some(store.generation());
        store.drain_changes()
    }

    fn recompute_local(&mut self, request: RecomputeRequest) {
        if let Some(from_start) = request.reload {
            self.state.selected.clear();
            if from_start {
                self.state.paginator.set_page_index(0);
            }
        }
        let wants_data = request.reload.is_some() || request.parent;
        if wants_data && self.has_service() && self.issue_query(None, false) {
            // the response replaces the store and comes back as a data change
            return;
        }

        let rebuilt = request.needs_pipeline();
        if rebuilt {
            self.filtered = self.run_pipeline();
            self.totals = compute_totals(&self.columns, &self.filtered);
        }
        let page = self.state.paginator.local_window(&self.filtered);
        let total = self.filtered.len();
        self.publish(page, total, rebuilt);
    }

    /// Calculated columns, column value filters, quick filter, sort.
    fn run_pipeline(&self) -> Vec<Row> {
        let mut rows = self.store.borrow().current().to_vec();
        if self.columns.has_calculated_columns() {
            apply_calculated_columns(&self.columns, &mut rows);
        }
        let rows = self.state.column_filters.apply(rows);
        let mut rows = self.apply_quick_filter(rows);
        if let Some(spec) = &self.state.sort {
            sort_rows(&mut rows, spec);
        }
        rows
    }

    fn apply_quick_filter(&self, rows: Vec<Row>) -> Vec<Row> {
        let quick = &self.state.quick_filter;
        if !self.config.quick_filter || !quick.is_active() {
            return rows;
        }
        match self.quick_filter_override() {
            Some(replacement) => rows.into_iter().filter(|r| replacement.matches(r)).collect(),
            None => quick.apply(&self.columns, rows),
        }
    }

    fn quick_filter_override(&self) -> Option<QuickFilterOverride> {
        let callback = self.quick_filter_callback.as_ref()?;
        callback(&self.state.quick_filter.text)
    }

    fn recompute_remote(&mut self, request: RecomputeRequest, changes: &[StoreChange]) {
        if request.recalculate {
            self.materialize_held_rows(&[]);
        } else if request.data {
            self.materialize_held_rows(changes);
        }
        if request.reload.is_some() || request.filters {
            self.state.selected.clear();
        }

        let window = if request.filters || request.reload == Some(true) {
            Some(self.state.paginator.first_page_window())
        } else if request.restored {
            Some(QueryWindow {
                offset: self.state.paginator.query_record_offset(),
                length: self.state.paginator.rows(),
            })
        } else if request.sort || request.reload.is_some() {
            Some(self.state.paginator.current_window())
        } else {
            request.window
        };

        if let Some(window) = window {
            self.issue_query(Some(window), false);
        }
    }

    /// Remote mode: the held rows are the view.
    ///
    /// When `changes` only appends after the rows already materialized, just
    /// the new rows get their calculated columns; anything else rebuilds.
    fn materialize_held_rows(&mut self, changes: &[StoreChange]) {
        let held = self.filtered.len();
        let start = match appended_from(changes) {
            Some(start) if start == held => start,
            _ => 0,
        };
        let mut fresh = self.store.borrow().current().get(start..).unwrap_or_default().to_vec();
        if self.columns.has_calculated_columns() {
            apply_calculated_columns(&self.columns, &mut fresh);
        }
        if start == 0 {
            self.filtered = fresh;
        } else {
            log::trace!("materializing {} appended rows after {}", fresh.len(), start);
            self.filtered.extend(fresh);
        }

        self.totals = compute_totals(&self.columns, &self.filtered);
        let total = match self.state.paginator.total_records() {
            0 => self.filtered.len(),
            n => n,
        };
        self.publish(self.filtered.clone(), total, true);
    }

    fn publish(&mut self, rows: Vec<Row>, total_records: usize, totals_changed: bool) {
        self.view = MaterializedView {
            rows,
            total_records,
            page_index: self.state.paginator.page_index(),
            revision: self.view.revision + 1,
        };
        Self::notify(&mut self.listeners, &ViewNotification::View(&self.view));
        if totals_changed && self.columns.has_aggregates() {
            Self::notify(&mut self.listeners, &ViewNotification::Totals(&self.totals));
        }
    }

    // ---- data service ----

    fn has_service(&self) -> bool {
        self.service.is_some()
    }

    /// Submits a query for `window` (`None` for an unpaginated query),
    /// superseding the one in flight. Misconfiguration is logged and skipped.
    fn issue_query(&mut self, window: Option<QueryWindow>, append: bool) -> bool {
        if self.config.entity.is_empty() {
            log::warn!("no entity configured, query skipped");
            return false;
        }
        let method = self.config.method_for(window.is_some()).to_string();
        let args = self.query_arguments(window);

        let Some(service) = self.service.as_mut() else {
            log::warn!("no data service configured, query on '{}' skipped", args.entity);
            return false;
        };
        if !service.supports(&method) {
            log::warn!("data service does not expose '{}', query on '{}' skipped", method, args.entity);
            return false;
        }
        if let Some(previous) = self.in_flight.take() {
            log::debug!("query {} superseded", previous.ticket);
            service.cancel(previous.ticket);
        }

        self.next_ticket += 1;
        let ticket = QueryTicket(self.next_ticket);
        self.in_flight = Some(InFlight { ticket, append });
        log::debug!("query {} via '{}' on '{}' ({:?})", ticket, method, args.entity, window);

        Self::notify(&mut self.listeners, &ViewNotification::Loading(true));
        service.submit(ticket, &method, args);
        true
    }

    /// Arguments for a query over `window`.
    pub fn query_arguments(&self, window: Option<QueryWindow>) -> QueryArguments {
        let filter = self.query_filter();
        let sql_types = self.filter_sql_types(&filter);
        let mut args = QueryArguments {
            filter,
            columns: self.query_columns(),
            entity: self.config.entity.clone(),
            sql_types,
            ..QueryArguments::default()
        };
        if let Some(window) = window {
            args.offset = Some(window.offset);
            args.length = Some(window.length);
            args.order_by = Some(self.state.sort.iter().cloned().collect());
        }
        args
    }

    /// Filter sent to the service.
    ///
    /// Parent values always go out. In remote mode the quick filter is AND-ed
    /// with them into the filter expression, followed by the column filters.
    /// The external expression travels separately.
    pub fn query_filter(&self) -> QueryFilter {
        let mut filter = QueryFilter::from_values(self.parent_values.clone());
        if self.config.is_remote() {
            if let Some(quick) = self.quick_filter_expression() {
                let parent = FilterExpression::from_values(&filter.values);
                filter.values.clear();
                filter.filter_expression = FilterExpression::merge_and(parent, Some(quick));
            }
            let columns = self.state.column_filters.to_expression();
            filter.filter_expression = FilterExpression::merge_and(filter.filter_expression.take(), columns);
        }
        filter.basic_expression = self.external_expression.clone();
        filter
    }

    fn quick_filter_expression(&self) -> Option<FilterExpression> {
        if !self.config.quick_filter || !self.state.quick_filter.is_active() {
            return None;
        }
        match self.quick_filter_override() {
            Some(replacement) => replacement.to_expression(),
            None => self.state.quick_filter.to_expression(&self.columns),
        }
    }

    /// Sql types of the attrs the filter references; store types win over
    /// declared ones.
    fn filter_sql_types(&self, filter: &QueryFilter) -> BTreeMap<String, i32> {
        let store = self.store.borrow();
        filter
            .referenced_columns()
            .into_iter()
            .filter_map(|attr| {
                let sql_type = store
                    .sql_types()
                    .get(&attr)
                    .copied()
                    .or_else(|| self.columns.get(&attr).and_then(|c| c.sql_type))?;
                Some((attr, sql_type))
            })
            .collect()
    }

    /// Fetched columns: non-calculated registry columns plus keys, minus the
    /// avoided ones.
    pub fn query_columns(&self) -> Vec<String> {
        let avoid: HashSet<&str> = self.config.avoid_query_columns.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        self.columns
            .query_columns()
            .into_iter()
            .chain(self.config.keys.iter().map(String::as_str))
            .filter(|attr| !avoid.contains(attr) && seen.insert(*attr))
            .map(str::to_string)
            .collect()
    }

    /// Applies every outcome the service has ready. Returns how many there were.
    pub fn poll(&mut self) -> usize {
        let outcomes = match self.service.as_mut() {
            Some(service) => service.poll(),
            None => return 0,
        };
        let count = outcomes.len();
        for (ticket, outcome) in outcomes {
            self.complete(ticket, outcome);
        }
        count
    }

    /// Delivers the outcome of a query. Outcomes for superseded tickets are
    /// ignored.
    pub fn complete(&mut self, ticket: QueryTicket, outcome: QueryOutcome) {
        if self.destroyed {
            return;
        }
        if self.lookups.is_pending(ticket) {
            self.complete_lookup(ticket, outcome);
            return;
        }
        let in_flight = match self.in_flight {
            Some(f) if f.ticket == ticket => f,
            _ => {
                log::debug!("ignoring stale response for query {}", ticket);
                return;
            }
        };
        self.in_flight = None;
        Self::notify(&mut self.listeners, &ViewNotification::Loading(false));

        match outcome.and_then(ServiceResponse::into_result) {
            Ok(result) => self.apply_result(result, in_flight.append),
            Err(error) => self.apply_failure(error),
        }
    }

    fn apply_result(&mut self, result: QueryResult, append: bool) {
        if self.config.is_remote() {
            self.state
                .paginator
                .update_from_response(result.start_record_index, result.rows.len(), result.total_records);
        }
        if !append {
            self.release_lookups();
        }
        {
            let mut store = self.store.borrow_mut();
            if !result.sql_types.is_empty() {
                store.set_sql_types(result.sql_types);
            }
            if append {
                store.append_rows(result.rows);
            } else {
                store.set_rows(result.rows);
            }
        }

        if self.config.is_remote() {
            let changes = self.sync_generation();
            self.materialize_held_rows(&changes);
        } else {
            self.flush();
        }
    }

    fn apply_failure(&mut self, error: ServiceError) {
        log::error!("query on '{}' failed: {}", self.config.entity, error);
        self.store.borrow_mut().set_rows(Vec::new());
        self.sync_generation();
        self.filtered.clear();
        self.totals = compute_totals(&self.columns, &[]);
        self.publish(Vec::new(), 0, true);
        Self::notify(&mut self.listeners, &ViewNotification::Error(&error));
    }

    // ---- lookups ----

    /// Asks for the description of one cell. Cached values are returned
    /// directly; otherwise the result arrives as
    /// [`ViewNotification::LookupResolved`]. A newer request for the same
    /// row replaces (and cancels) the older one.
    pub fn request_lookup(&mut self, row_index: usize, request: LookupRequest) -> Option<CellValue> {
        if let Some(value) = self.lookups.cached(&request) {
            return Some(value.clone());
        }
        if request.entity.is_empty() {
            log::warn!("lookup for column '{}' has no entity", request.column);
            return None;
        }
        let method = self.config.query_method.clone();
        let Some(service) = self.service.as_mut() else {
            log::warn!("no data service configured, lookup for column '{}' skipped", request.column);
            return None;
        };
        if !service.supports(&method) {
            log::warn!("data service does not expose '{}', lookup skipped", method);
            return None;
        }

        self.next_ticket += 1;
        let ticket = QueryTicket(self.next_ticket);
        let args = QueryArguments {
            filter: QueryFilter::from_values(BTreeMap::from([(request.key_column.clone(), request.key.clone())])),
            columns: vec![request.key_column.clone(), request.value_column.clone()],
            entity: request.entity.clone(),
            ..QueryArguments::default()
        };
        if let Some(replaced) = self.lookups.begin(row_index, ticket, request) {
            log::debug!("lookup {} for row {} replaced", replaced, row_index);
            service.cancel(replaced);
        }
        service.submit(ticket, &method, args);
        None
    }

    fn complete_lookup(&mut self, ticket: QueryTicket, outcome: QueryOutcome) {
        let Some((row_index, request)) = self.lookups.resolve(ticket) else {
            return;
        };
        let value = match outcome.and_then(ServiceResponse::into_result) {
            Ok(result) => result
                .rows
                .first()
                .and_then(|r| r.get(&request.value_column).cloned())
                .unwrap_or_default(),
            Err(error) => {
                log::warn!("lookup for column '{}' failed: {}", request.column, error);
                return;
            }
        };
        self.lookups.store(&request, value.clone());
        Self::notify(
            &mut self.listeners,
            &ViewNotification::LookupResolved { row_index, column: &request.column, value: &value },
        );
    }

    fn release_lookups(&mut self) {
        let tickets = self.lookups.release_all();
        if let Some(service) = self.service.as_mut() {
            for ticket in tickets {
                service.cancel(ticket);
            }
        }
    }

    // ---- data access ----

    /// Raw store rows.
    pub fn table_data(&self) -> Vec<Row> {
        self.store.borrow().current().to_vec()
    }

    /// Current page projected onto the visible columns. With `rendered`,
    /// renderer-backed cells hold their rendered text.
    pub fn current_data(&self, rendered: bool) -> Vec<Row> {
        let visible: Vec<_> = self.columns.iter().filter(|c| c.visible).collect();
        self.view
            .rows
            .iter()
            .map(|row| {
                visible
                    .iter()
                    .map(|c| {
                        let value = row.get(&c.attr).cloned().unwrap_or_default();
                        let value = match (&c.renderer, rendered) {
                            (Some(renderer), true) => CellValue::Text(renderer.cell_data(&value, row)),
                            _ => value,
                        };
                        (c.attr.clone(), value)
                    })
                    .collect()
            })
            .collect()
    }

    /// Every filtered row across pages (remote mode: the held rows).
    pub fn all_data(&self) -> &[Row] {
        &self.filtered
    }

    /// One column of the current page.
    pub fn column_data(&self, attr: &str) -> Vec<CellValue> {
        self.view
            .rows
            .iter()
            .map(|r| r.get(attr).cloned().unwrap_or_default())
            .collect()
    }

    // ---- teardown ----

    /// Releases listeners, the query in flight and pending lookups. The
    /// engine ignores every change afterwards.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.listeners.clear();
        self.queue.clear();
        let in_flight = self.in_flight.take();
        let lookups = self.lookups.release_all();
        if let Some(service) = self.service.as_mut() {
            for ticket in in_flight.map(|f| f.ticket).into_iter().chain(lookups) {
                service.cancel(ticket);
            }
        }
        log::debug!("view on '{}' destroyed", self.config.entity);
    }
}

impl Drop for ViewEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Where the rows appended by `changes` start, when `changes` are nothing
/// but back-to-back appends.
fn appended_from(changes: &[StoreChange]) -> Option<usize> {
    let (first, rest) = changes.split_first()?;
    let StoreChange::Appended { start, count } = *first else {
        return None;
    };
    let mut end = start + count;
    for change in rest {
        match *change {
            StoreChange::Appended { start, count } if start == end => end += count,
            _ => return None,
        }
    }
    Some(start)
}

impl HasFilterState for ViewEngine {
    fn quick_filter(&self) -> &str {
        &self.state.quick_filter.text
    }

    fn set_quick_filter(&mut self, text: &str) {
        self.state.quick_filter.text = text.to_string();
        self.post(ViewEvent::QuickFilterChanged);
    }

    fn column_filters(&self) -> &ColumnFilters {
        &self.state.column_filters
    }

    fn add_column_filter(&mut self, filter: ColumnValueFilter) {
        if !self.columns.contains(&filter.attr) {
            log::debug!("dropping filter on unknown column '{}'", filter.attr);
            return;
        }
        self.state.column_filters.add(filter);
        self.post(ViewEvent::ColumnFiltersChanged);
    }

    fn clear_column_filters(&mut self) {
        self.state.column_filters.clear();
        self.post(ViewEvent::ColumnFiltersChanged);
    }
}

impl HasSortState for ViewEngine {
    fn sort(&self) -> Option<&SortSpec> {
        self.state.sort.as_ref()
    }

    fn set_sort(&mut self, spec: Option<SortSpec>) {
        self.state.sort = normalize_sort(spec.into_iter().collect(), &self.columns);
        self.post(ViewEvent::SortChanged);
    }
}

impl HasPagination for ViewEngine {
    fn paginator(&self) -> &Paginator {
        &self.state.paginator
    }

    fn set_page(&mut self, index: usize, size: PageSize) {
        let window = if self.config.is_remote() {
            Some(self.state.paginator.change_page(index, size))
        } else {
            self.state.paginator.set_page_index(index);
            self.state.paginator.set_page_size(size);
            None
        };
        self.post(ViewEvent::PageChanged { window });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{AggregateOp, ColumnDescriptor};
    use crate::service::MemoryService;
    use crate::value::row;

    fn people() -> Vec<Row> {
        vec![
            row([("name", CellValue::from("Ana")), ("age", CellValue::Int(30))]),
            row([("name", CellValue::from("ana")), ("age", CellValue::from("25"))]),
        ]
    }

    fn numbered(n: i64) -> Vec<Row> {
        (1..=n)
            .map(|i| row([("id", CellValue::Int(i)), ("amount", CellValue::Int(i * 10))]))
            .collect()
    }

    fn local_engine(rows: Vec<Row>, columns: Vec<ColumnDescriptor>) -> ViewEngine {
        let store = Rc::new(RefCell::new(RecordStore::with_rows(rows)));
        let mut engine = ViewEngine::builder()
            .store(store)
            .columns(ColumnRegistry::new(columns).unwrap())
            .build()
            .unwrap();
        engine.reload();
        engine
    }

    fn remote_engine(service: &MemoryService) -> ViewEngine {
        let columns = ColumnRegistry::new(vec![
            ColumnDescriptor::new("id").sql_type(4),
            ColumnDescriptor::new("amount").aggregate(AggregateOp::Sum),
            ColumnDescriptor::new("double").formula("amount * 2"),
        ])
        .unwrap();
        ViewEngine::builder()
            .store(Rc::new(RefCell::new(RecordStore::new())))
            .columns(columns)
            .service(service.clone())
            .config(EngineConfig::remote("items"))
            .build()
            .unwrap()
    }

    fn ids(engine: &ViewEngine) -> Vec<i64> {
        engine.view().rows.iter().filter_map(|r| r["id"].as_i64()).collect()
    }

    #[test]
    fn test_builder_requires_store_and_columns() {
        let columns = ColumnRegistry::new(vec![ColumnDescriptor::new("a")]).unwrap();
        let err = ViewEngine::builder().columns(columns).build().err();
        assert_eq!(err, Some(EngineError::MissingStore));

        let store = Rc::new(RefCell::new(RecordStore::new()));
        let err = ViewEngine::builder().store(store.clone()).build().err();
        assert_eq!(err, Some(EngineError::MissingColumns));

        let err = ViewEngine::builder()
            .store(store)
            .columns(ColumnRegistry::default())
            .build()
            .err();
        assert_eq!(err, Some(EngineError::MissingColumns));
    }

    #[test]
    fn test_local_quick_and_column_filters() {
        let mut engine = local_engine(people(), vec![ColumnDescriptor::new("name"), ColumnDescriptor::new("age")]);
        engine.set_quick_filter("ana");
        assert_eq!(engine.view().rows.len(), 2);

        engine.add_column_filter(ColumnValueFilter::between("age", 20, 28));
        assert_eq!(engine.view().rows.len(), 1);
        assert_eq!(engine.view().rows[0]["name"], CellValue::from("ana"));

        // unknown columns never become filters
        engine.add_column_filter(ColumnValueFilter::equal("ghost", "x"));
        assert!(engine.column_filter("ghost").is_none());

        engine.clear_column_filters();
        assert_eq!(engine.view().rows.len(), 2);
    }

    #[test]
    fn test_external_store_changes_are_picked_up() {
        let mut engine = local_engine(people(), vec![ColumnDescriptor::new("name")]);
        engine.store().borrow_mut().append_rows(vec![row([("name", "Carla")])]);
        engine.refresh();
        assert_eq!(engine.view().rows.len(), 3);
        assert_eq!(engine.table_data().len(), 3);
    }

    #[test]
    fn test_page_change_right_after_build() {
        let store = Rc::new(RefCell::new(RecordStore::with_rows(numbered(25))));
        let mut engine = ViewEngine::builder()
            .store(store)
            .columns(ColumnRegistry::new(vec![ColumnDescriptor::new("id"), ColumnDescriptor::new("amount")]).unwrap())
            .build()
            .unwrap();

        engine.set_page(1, PageSize::Rows(5));
        assert_eq!(ids(&engine), vec![6, 7, 8, 9, 10]);
        assert_eq!(engine.view().total_records, 25);
    }

    #[test]
    fn test_huge_page_index_goes_back_to_first_page() {
        let mut engine = local_engine(numbered(25), vec![ColumnDescriptor::new("id")]);
        engine.set_page(usize::MAX / 2, PageSize::Rows(10));
        assert_eq!(ids(&engine), (1..=10).collect::<Vec<_>>());
        assert_eq!(engine.paginator().page_index(), 0);

        let service = MemoryService::new("items", numbered(25));
        let mut engine = remote_engine(&service);
        engine.reload();
        engine.set_page(usize::MAX / 2, PageSize::Rows(10));
        let query = service.last_submitted().unwrap();
        assert_eq!((query.args.offset, query.args.length), (Some(0), Some(10)));
        assert_eq!(ids(&engine), (1..=10).collect::<Vec<_>>());
        assert_eq!(engine.paginator().page_index(), 0);
    }

    #[test]
    fn test_batch_runs_one_cycle() {
        let mut engine = local_engine(numbered(30), vec![ColumnDescriptor::new("id"), ColumnDescriptor::new("amount")]);
        let emitted = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&emitted);
        engine.subscribe(move |n| {
            if let ViewNotification::View(_) = n {
                *counter.borrow_mut() += 1;
            }
        });

        engine.batch(|e| {
            e.set_sort(Some(SortSpec::descending("id")));
            e.add_column_filter(ColumnValueFilter::less_equal("id", 20));
            e.set_page(1, PageSize::Rows(5));
        });
        assert_eq!(*emitted.borrow(), 1);
        assert_eq!(ids(&engine), vec![15, 14, 13, 12, 11]);
        assert_eq!(engine.view().total_records, 20);
    }

    #[test]
    fn test_totals_do_not_move_with_pages() {
        let mut engine = local_engine(
            numbered(25),
            vec![ColumnDescriptor::new("id"), ColumnDescriptor::new("amount").aggregate(AggregateOp::Sum)],
        );
        assert_eq!(engine.totals()["amount"], CellValue::Int(3250));

        let totals_seen = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&totals_seen);
        engine.subscribe(move |n| {
            if let ViewNotification::Totals(_) = n {
                *counter.borrow_mut() += 1;
            }
        });

        engine.set_page(2, PageSize::Rows(10));
        assert_eq!(ids(&engine), vec![21, 22, 23, 24, 25]);
        assert_eq!(engine.totals()["amount"], CellValue::Int(3250));
        assert_eq!(*totals_seen.borrow(), 0);

        engine.add_column_filter(ColumnValueFilter::less_equal("id", 2));
        assert_eq!(engine.totals()["amount"], CellValue::Int(30));
        assert_eq!(*totals_seen.borrow(), 1);
        // the page was past the end of the filtered rows
        assert_eq!(engine.paginator().page_index(), 0);
    }

    #[test]
    fn test_unknown_sort_is_dropped() {
        let mut engine = local_engine(people(), vec![ColumnDescriptor::new("name")]);
        engine.set_sort(Some(SortSpec::ascending("nope")));
        assert!(engine.sort().is_none());
        engine.set_sort_columns("name:DESC");
        assert_eq!(engine.sort(), Some(&SortSpec::descending("name")));
    }

    #[test]
    fn test_local_reload_queries_service() {
        let service = MemoryService::new("people", people());
        let mut engine = ViewEngine::builder()
            .store(Rc::new(RefCell::new(RecordStore::new())))
            .columns(ColumnRegistry::new(vec![ColumnDescriptor::new("name"), ColumnDescriptor::new("age")]).unwrap())
            .service(service.clone())
            .config(EngineConfig { entity: "people".into(), ..EngineConfig::local() })
            .build()
            .unwrap();
        engine.set_selected(vec![1]);
        engine.reload();

        let query = service.last_submitted().unwrap();
        assert_eq!(query.method, "query");
        assert!(!query.args.is_paginated());
        assert_eq!(query.args.to_positional().len(), 4);
        assert_eq!(engine.view().rows.len(), 2);
        assert!(engine.selected().is_empty());

        // local filtering does not go back to the service
        engine.set_quick_filter("zzz");
        assert_eq!(service.submitted().len(), 1);
        assert!(engine.view().rows.is_empty());
    }

    #[test]
    fn test_remote_paging_windows() {
        let service = MemoryService::new("items", numbered(25));
        let mut engine = remote_engine(&service);
        engine.reload();

        let query = service.last_submitted().unwrap();
        assert_eq!(query.method, "advancedQuery");
        assert_eq!((query.args.offset, query.args.length), (Some(0), Some(10)));
        assert_eq!(query.args.columns, vec!["id".to_string(), "amount".to_string()]);
        assert_eq!(engine.view().total_records, 25);
        assert_eq!(ids(&engine), (1..=10).collect::<Vec<_>>());
        // calculated columns are filled in on arrival
        assert_eq!(engine.view().rows[0]["double"], CellValue::Int(20));

        engine.set_page(1, PageSize::Rows(10));
        assert_eq!(service.last_submitted().unwrap().args.offset, Some(10));

        engine.set_page(2, PageSize::Rows(10));
        let query = service.last_submitted().unwrap();
        assert_eq!((query.args.offset, query.args.length), (Some(20), Some(5)));
        assert_eq!(ids(&engine), vec![21, 22, 23, 24, 25]);

        engine.set_page(0, PageSize::Rows(10));
        assert_eq!(service.last_submitted().unwrap().args.offset, Some(0));
    }

    #[test]
    fn test_remote_show_all_asks_for_every_record() {
        let service = MemoryService::new("items", numbered(25));
        let mut engine = remote_engine(&service);
        engine.reload();
        assert_eq!(engine.total_records(), 25);

        engine.set_page(0, PageSize::ShowAll);
        let query = service.last_submitted().unwrap();
        assert_eq!((query.args.offset, query.args.length), (Some(0), Some(25)));
        assert_eq!(engine.view().rows.len(), 25);
        assert_eq!(engine.view().total_records, 25);
    }

    #[test]
    fn test_remote_filters_reload_from_start() {
        let service = MemoryService::new("items", numbered(25));
        let mut engine = remote_engine(&service);
        engine.reload();
        engine.set_page(1, PageSize::Rows(10));

        engine.add_column_filter(ColumnValueFilter::between("id", 5, 16));
        let query = service.last_submitted().unwrap();
        assert_eq!(query.args.offset, Some(0));
        assert_eq!(engine.paginator().page_index(), 0);
        assert_eq!(
            query.args.filter.filter_expression,
            Some(FilterExpression::more_equal("id", 5).and(FilterExpression::less_equal("id", 16)))
        );
        assert_eq!(query.args.sql_types, BTreeMap::from([("id".to_string(), 4)]));
        assert_eq!(engine.view().total_records, 12);

        // sort keeps the page
        engine.set_page(1, PageSize::Rows(10));
        engine.set_sort(Some(SortSpec::descending("id")));
        let query = service.last_submitted().unwrap();
        assert_eq!(query.args.offset, Some(10));
        assert_eq!(query.args.order_by, Some(vec![SortSpec::descending("id")]));
        assert_eq!(ids(&engine), vec![6, 5]);
    }

    #[test]
    fn test_remote_quick_filter_and_parent_values() {
        let service = MemoryService::new("items", numbered(25));
        let mut engine = remote_engine(&service);
        engine.batch(|e| {
            e.set_parent_values(BTreeMap::from([("amount".to_string(), CellValue::Int(110))]));
            e.set_quick_filter("11");
        });

        let filter = service.last_submitted().unwrap().args.filter;
        assert!(filter.values.is_empty());
        let expected = FilterExpression::equals("amount", 110)
            .and(FilterExpression::like("id", "11").or(FilterExpression::like("amount", "11")));
        assert_eq!(filter.filter_expression, Some(expected));
        assert_eq!(ids(&engine), vec![11]);

        engine.set_quick_filter("");
        let filter = service.last_submitted().unwrap().args.filter;
        assert_eq!(filter.values.get("amount"), Some(&CellValue::Int(110)));
        assert!(filter.filter_expression.is_none());
    }

    #[test]
    fn test_quick_filter_callback() {
        let mut engine = local_engine(numbered(5), vec![ColumnDescriptor::new("id"), ColumnDescriptor::new("amount")]);
        engine.set_quick_filter_callback(Some(Box::new(|text: &str| {
            let id = text.parse::<i64>().ok()?;
            Some(QuickFilterOverride::Expression(FilterExpression::more_equal("id", id)))
        })));
        engine.set_quick_filter("4");
        assert_eq!(ids(&engine), vec![4, 5]);

        // no override: the plain quick filter applies
        engine.set_quick_filter("x");
        assert!(engine.view().rows.is_empty());

        let service = MemoryService::new("items", numbered(25));
        let mut engine = remote_engine(&service);
        engine.set_quick_filter_callback(Some(Box::new(|_: &str| {
            Some(QuickFilterOverride::Values(BTreeMap::from([("id".to_string(), CellValue::Int(3))])))
        })));
        engine.set_quick_filter("three");
        let filter = service.last_submitted().unwrap().args.filter;
        assert_eq!(filter.filter_expression, Some(FilterExpression::equals("id", 3)));
        assert_eq!(ids(&engine), vec![3]);
    }

    #[test]
    fn test_builder_resumes_saved_state() {
        let saved = PersistedViewState {
            sort_columns: Some("id:DESC".into()),
            current_page: Some(1),
            ..PersistedViewState::default()
        };
        let mut engine = ViewEngine::builder()
            .store(Rc::new(RefCell::new(RecordStore::with_rows(numbered(25)))))
            .columns(ColumnRegistry::new(vec![ColumnDescriptor::new("id")]).unwrap())
            .saved_state(saved)
            .build()
            .unwrap();
        engine.reload();
        assert_eq!(ids(&engine), (6..=15).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_newer_query_supersedes_older() {
        let service = MemoryService::new("items", numbered(25));
        let mut engine = remote_engine(&service);
        service.set_paused(true);

        engine.set_sort(Some(SortSpec::ascending("id")));
        engine.set_sort(Some(SortSpec::descending("id")));
        let tickets: Vec<QueryTicket> = service.submitted().iter().map(|q| q.ticket).collect();
        assert_eq!(tickets.len(), 2);
        assert_eq!(service.cancelled(), vec![tickets[0]]);
        assert!(engine.is_loading());

        service.set_paused(false);
        assert_eq!(engine.poll(), 2);
        assert_eq!(ids(&engine)[0], 25);
        assert_eq!(engine.view().revision, 1);
        assert!(!engine.is_loading());

        // a late answer for an old ticket changes nothing
        engine.complete(tickets[0], Ok(ServiceResponse::Rows(numbered(1))));
        assert_eq!(engine.view().revision, 1);
    }

    #[test]
    fn test_failure_empties_view() {
        let service = MemoryService::new("items", numbered(25));
        let mut engine = remote_engine(&service);
        engine.reload();
        assert_eq!(engine.view().rows.len(), 10);

        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        engine.subscribe(move |n| {
            if let ViewNotification::Error(e) = n {
                sink.borrow_mut().push((*e).clone());
            }
        });

        service.set_failure(Some(ServiceError::Transport("down".into())));
        engine.reload();
        assert!(engine.view().rows.is_empty());
        assert_eq!(errors.borrow().as_slice(), &[ServiceError::Transport("down".into())]);
        assert!(engine.store().borrow().is_empty());
    }

    #[test]
    fn test_misconfigured_service_is_a_no_op() {
        let service = MemoryService::new("items", numbered(5)).with_methods(&["query"]);
        let mut engine = remote_engine(&service);
        engine.reload();
        assert!(service.submitted().is_empty());
        assert!(!engine.is_loading());

        let columns = ColumnRegistry::new(vec![ColumnDescriptor::new("id")]).unwrap();
        let mut engine = ViewEngine::builder()
            .store(Rc::new(RefCell::new(RecordStore::new())))
            .columns(columns)
            .config(EngineConfig::remote("items"))
            .build()
            .unwrap();
        engine.reload();
        assert!(engine.view().rows.is_empty());

        // remote mode without an entity
        let service = MemoryService::new("items", numbered(5));
        let columns = ColumnRegistry::new(vec![ColumnDescriptor::new("id")]).unwrap();
        let mut engine = ViewEngine::builder()
            .store(Rc::new(RefCell::new(RecordStore::new())))
            .columns(columns)
            .service(service.clone())
            .config(EngineConfig::remote(""))
            .build()
            .unwrap();
        engine.reload();
        engine.set_page(1, PageSize::Rows(10));
        assert!(service.submitted().is_empty());
        assert!(!engine.is_loading());
        assert!(engine.view().rows.is_empty());
    }

    #[test]
    fn test_accumulating_pages() {
        let service = MemoryService::new("items", numbered(25));
        let columns = ColumnRegistry::new(vec![
            ColumnDescriptor::new("id"),
            ColumnDescriptor::new("amount").aggregate(AggregateOp::Sum),
            ColumnDescriptor::new("double").formula("amount * 2"),
        ])
        .unwrap();
        let mut engine = ViewEngine::builder()
            .store(Rc::new(RefCell::new(RecordStore::new())))
            .columns(columns)
            .service(service.clone())
            .config(EngineConfig { accumulate_pages: true, ..EngineConfig::remote("items") })
            .build()
            .unwrap();
        engine.reload();
        assert_eq!(engine.view().rows.len(), 10);

        assert!(engine.load_more());
        assert!(engine.load_more());
        assert_eq!(engine.view().rows.len(), 25);
        assert_eq!(ids(&engine), (1..=25).collect::<Vec<_>>());
        // appended rows get their calculated columns and count in the totals
        assert_eq!(engine.view().rows[24]["double"], CellValue::Int(500));
        assert_eq!(engine.totals()["amount"], CellValue::Int(3250));
        assert!(!engine.load_more());

        // a reload replaces the accumulated rows
        engine.reload();
        assert_eq!(ids(&engine), (1..=10).collect::<Vec<_>>());
        assert_eq!(engine.view().rows[9]["double"], CellValue::Int(200));
    }

    #[test]
    fn test_appended_from() {
        assert_eq!(appended_from(&[]), None);
        assert_eq!(
            appended_from(&[
                StoreChange::Appended { start: 10, count: 10 },
                StoreChange::Appended { start: 20, count: 5 },
            ]),
            Some(10)
        );
        assert_eq!(
            appended_from(&[
                StoreChange::Appended { start: 10, count: 10 },
                StoreChange::Replaced { len: 3 },
            ]),
            None
        );
        assert_eq!(
            appended_from(&[StoreChange::Appended { start: 10, count: 10 }, StoreChange::Appended { start: 4, count: 1 }]),
            None
        );
    }

    #[test]
    fn test_restore_remote_state() {
        let service = MemoryService::new("items", numbered(100));
        let mut engine = remote_engine(&service);
        let saved = PersistedViewState {
            page_size: Some(PageSize::Rows(25)),
            current_page: Some(2),
            query_record_offset: Some(75),
            selected_indexes: vec![3],
            ..PersistedViewState::default()
        };
        engine.restore(&saved);

        let query = service.last_submitted().unwrap();
        assert_eq!((query.args.offset, query.args.length), (Some(50), Some(25)));
        assert_eq!(ids(&engine)[0], 51);
        assert_eq!(engine.selected(), &[3]);

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.current_page, Some(2));
        assert_eq!(snapshot.query_record_offset, Some(75));
        assert_eq!(snapshot.total_query_records_number, Some(100));
    }

    #[test]
    fn test_lookups_replace_per_row() {
        let countries = vec![
            row([("id", CellValue::Int(1)), ("name", CellValue::from("Spain"))]),
            row([("id", CellValue::Int(2)), ("name", CellValue::from("France"))]),
        ];
        let service = MemoryService::new("countries", countries);
        let mut engine = ViewEngine::builder()
            .store(Rc::new(RefCell::new(RecordStore::new())))
            .columns(ColumnRegistry::new(vec![ColumnDescriptor::new("country")]).unwrap())
            .service(service.clone())
            .build()
            .unwrap();

        let resolved = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&resolved);
        engine.subscribe(move |n| {
            if let ViewNotification::LookupResolved { row_index, value, .. } = n {
                sink.borrow_mut().push((*row_index, (*value).clone()));
            }
        });

        let request = |key: i64| LookupRequest {
            column: "country".into(),
            entity: "countries".into(),
            key_column: "id".into(),
            value_column: "name".into(),
            key: CellValue::Int(key),
        };
        service.set_paused(true);
        assert_eq!(engine.request_lookup(0, request(1)), None);
        assert_eq!(engine.request_lookup(0, request(2)), None);
        assert_eq!(service.cancelled().len(), 1);

        service.set_paused(false);
        engine.poll();
        assert_eq!(resolved.borrow().as_slice(), &[(0, CellValue::from("France"))]);
        assert_eq!(engine.request_lookup(5, request(2)), Some(CellValue::from("France")));
    }

    #[test]
    fn test_destroy_releases_everything() {
        let service = MemoryService::new("items", numbered(25));
        let mut engine = remote_engine(&service);
        let seen = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&seen);
        engine.subscribe(move |_| *counter.borrow_mut() += 1);

        service.set_paused(true);
        engine.reload();
        let ticket = service.last_submitted().unwrap().ticket;
        let before = *seen.borrow();

        engine.destroy();
        assert!(engine.is_destroyed());
        assert_eq!(service.cancelled(), vec![ticket]);

        service.set_paused(false);
        engine.poll();
        engine.reload();
        assert_eq!(*seen.borrow(), before);
        assert!(engine.view().rows.is_empty());
    }

    #[test]
    fn test_current_data_projection() {
        use crate::column::CellRenderer;

        struct Euros;
        impl CellRenderer for Euros {
            fn cell_data(&self, value: &CellValue, _row: &Row) -> String {
                format!("{} €", value)
            }
        }

        let mut engine = local_engine(
            numbered(3),
            vec![
                ColumnDescriptor::new("id").visible(false),
                ColumnDescriptor::new("amount").renderer(Rc::new(Euros)),
            ],
        );
        engine.set_sort(Some(SortSpec::descending("amount")));
        let data = engine.current_data(true);
        assert_eq!(data.len(), 3);
        assert!(!data[0].contains_key("id"));
        assert_eq!(data[0]["amount"], CellValue::from("30 €"));
        assert_eq!(engine.current_data(false)[0]["amount"], CellValue::Int(30));
        assert_eq!(engine.column_data("id"), vec![CellValue::Int(3), CellValue::Int(2), CellValue::Int(1)]);
        assert_eq!(engine.all_data().len(), 3);
    }
}
