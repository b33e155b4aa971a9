//! Data service contract.
//!
//! Queries go out as a positional argument tuple
//! `(filter, columns, entity, sqlTypes, offset?, length?, orderBy?)` and come
//! back either as a raw row array or as an envelope carrying a status code,
//! the rows, their sql types and paging information.
//!
//! Services are driven by tickets. The engine submits a query under a fresh
//! [`QueryTicket`] and later receives the outcome for that ticket, either
//! pushed through [`crate::ViewEngine::complete`] or pulled from
//! [`DataService::poll`]. Only the outcome for the most recent ticket is
//! applied; cancelling is advisory.

use crate::criteria::QueryFilter;
use crate::error::ServiceError;
use crate::sort::{sort_rows, SortSpec};
use crate::value::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;

/// Identifies one submitted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryTicket(pub u64);

impl fmt::Display for QueryTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arguments of one query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryArguments {
    pub filter: QueryFilter,
    pub columns: Vec<String>,
    pub entity: String,
    pub sql_types: BTreeMap<String, i32>,
    /// Paging arguments, set for paginated queries only
    pub offset: Option<usize>,
    pub length: Option<usize>,
    pub order_by: Option<Vec<SortSpec>>,
}

impl QueryArguments {
    pub fn is_paginated(&self) -> bool {
        self.offset.is_some()
    }

    /// The positional tuple sent to the service: four arguments for a plain
    /// query, seven for a paginated one.
    pub fn to_positional(&self) -> Vec<JsonValue> {
        let mut args = vec![
            self.filter.to_json(),
            serde_json::json!(self.columns),
            JsonValue::String(self.entity.clone()),
            serde_json::json!(self.sql_types),
        ];
        if self.is_paginated() {
            args.push(serde_json::json!(self.offset));
            args.push(serde_json::json!(self.length));
            args.push(serde_json::json!(self.order_by));
        }
        args
    }
}

/// Envelope form of a service response
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// `0` is success
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub data: Vec<Row>,
    #[serde(default)]
    pub sql_types: HashMap<String, i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_record_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_query_records_number: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Raw response of a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceResponse {
    Rows(Vec<Row>),
    Envelope(ResponseEnvelope),
}

/// A successful response, normalized.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub sql_types: HashMap<String, i32>,
    pub start_record_index: Option<usize>,
    pub total_records: Option<usize>,
}

impl ServiceResponse {
    pub fn from_json(value: JsonValue) -> Result<Self, ServiceError> {
        serde_json::from_value(value).map_err(|e| ServiceError::Malformed(e.to_string()))
    }

    /// Normalizes the response; a non-zero code is a failure.
    pub fn into_result(self) -> Result<QueryResult, ServiceError> {
        match self {
            ServiceResponse::Rows(rows) => Ok(QueryResult { rows, ..QueryResult::default() }),
            ServiceResponse::Envelope(env) if env.code != 0 => Err(ServiceError::Failed {
                code: env.code,
                message: env.message.unwrap_or_default(),
            }),
            ServiceResponse::Envelope(env) => Ok(QueryResult {
                rows: env.data,
                sql_types: env.sql_types,
                start_record_index: env.start_record_index,
                total_records: env.total_query_records_number,
            }),
        }
    }
}

/// Outcome of one query
pub type QueryOutcome = Result<ServiceResponse, ServiceError>;

/// Data service port.
pub trait DataService {
    /// Whether the service exposes `method`.
    fn supports(&self, _method: &str) -> bool {
        true
    }

    /// Starts a query. The outcome is delivered later under `ticket`.
    fn submit(&mut self, ticket: QueryTicket, method: &str, args: QueryArguments);

    /// Advises the service that `ticket` is no longer wanted.
    fn cancel(&mut self, _ticket: QueryTicket) {}

    /// Outcomes that became available since the last poll.
    fn poll(&mut self) -> Vec<(QueryTicket, QueryOutcome)> {
        Vec::new()
    }
}

/// A query as seen by [`MemoryService`]
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedQuery {
    pub ticket: QueryTicket,
    pub method: String,
    pub args: QueryArguments,
}

#[derive(Debug, Default)]
struct MemoryServiceInner {
    entity: String,
    methods: HashSet<String>,
    rows: Vec<Row>,
    paused: bool,
    failure: Option<ServiceError>,
    outbox: VecDeque<(QueryTicket, QueryOutcome)>,
    submitted: Vec<SubmittedQuery>,
    cancelled: Vec<QueryTicket>,
}

/// In-memory data service over a fixed row set.
///
/// Applies the query filter, the first `orderBy` entry and the paging window
/// the way a backend would. Clones share state, so one handle can be given to
/// an engine while another inspects submitted queries or holds responses.
#[derive(Debug, Clone, Default)]
pub struct MemoryService {
    inner: Rc<RefCell<MemoryServiceInner>>,
}

impl MemoryService {
    pub fn new(entity: impl Into<String>, rows: Vec<Row>) -> Self {
        let inner = MemoryServiceInner {
            entity: entity.into(),
            methods: ["query", "advancedQuery"].iter().map(|m| m.to_string()).collect(),
            rows,
            ..MemoryServiceInner::default()
        };
        MemoryService { inner: Rc::new(RefCell::new(inner)) }
    }

    pub fn with_methods(self, methods: &[&str]) -> Self {
        self.inner.borrow_mut().methods = methods.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn set_rows(&self, rows: Vec<Row>) {
        self.inner.borrow_mut().rows = rows;
    }

    /// While paused, outcomes queue up and `poll` returns nothing.
    pub fn set_paused(&self, paused: bool) {
        self.inner.borrow_mut().paused = paused;
    }

    /// Makes every following query fail with `error`.
    pub fn set_failure(&self, error: Option<ServiceError>) {
        self.inner.borrow_mut().failure = error;
    }

    pub fn submitted(&self) -> Vec<SubmittedQuery> {
        self.inner.borrow().submitted.clone()
    }

    pub fn last_submitted(&self) -> Option<SubmittedQuery> {
        self.inner.borrow().submitted.last().cloned()
    }

    pub fn cancelled(&self) -> Vec<QueryTicket> {
        self.inner.borrow().cancelled.clone()
    }

    pub fn pending(&self) -> usize {
        self.inner.borrow().outbox.len()
    }

    fn answer(inner: &MemoryServiceInner, args: &QueryArguments) -> ServiceResponse {
        let mut rows: Vec<Row> = inner.rows.iter().filter(|r| args.filter.matches(r)).cloned().collect();
        if let Some(spec) = args.order_by.as_ref().and_then(|o| o.first()) {
            sort_rows(&mut rows, spec);
        }
        let total = rows.len();
        let start = args.offset.unwrap_or(0).min(total);
        let length = args.length.unwrap_or(total);

        let data = rows
            .into_iter()
            .skip(start)
            .take(length)
            .map(|r| {
                if args.columns.is_empty() {
                    r
                } else {
                    r.into_iter().filter(|(k, _)| args.columns.contains(k)).collect()
                }
            })
            .collect();

        ServiceResponse::Envelope(ResponseEnvelope {
            code: 0,
            data,
            start_record_index: Some(start),
            total_query_records_number: Some(total),
            ..ResponseEnvelope::default()
        })
    }
}

impl DataService for MemoryService {
    fn supports(&self, method: &str) -> bool {
        self.inner.borrow().methods.contains(method)
    }

    fn submit(&mut self, ticket: QueryTicket, method: &str, args: QueryArguments) {
        let mut inner = self.inner.borrow_mut();
        let outcome = if args.entity != inner.entity {
            Err(ServiceError::Failed { code: 1, message: format!("unknown entity '{}'", args.entity) })
        } else if let Some(error) = inner.failure.clone() {
            Err(error)
        } else {
            Ok(Self::answer(&inner, &args))
        };
        inner.outbox.push_back((ticket, outcome));
        inner.submitted.push(SubmittedQuery { ticket, method: method.to_string(), args });
    }

    fn cancel(&mut self, ticket: QueryTicket) {
        // advisory: the outcome is still delivered
        self.inner.borrow_mut().cancelled.push(ticket);
    }

    fn poll(&mut self) -> Vec<(QueryTicket, QueryOutcome)> {
        let mut inner = self.inner.borrow_mut();
        if inner.paused {
            return Vec::new();
        }
        inner.outbox.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::FilterExpression;
    use crate::value::{row, CellValue};

    #[test]
    fn test_positional_arguments() {
        let mut args = QueryArguments {
            columns: vec!["id".into()],
            entity: "customers".into(),
            ..QueryArguments::default()
        };
        assert_eq!(args.to_positional().len(), 4);

        args.offset = Some(20);
        args.length = Some(10);
        args.order_by = Some(vec![SortSpec::descending("id")]);
        let positional = args.to_positional();
        assert_eq!(positional.len(), 7);
        assert_eq!(positional[2], "customers");
        assert_eq!(positional[4], 20);
        assert_eq!(positional[6][0]["columnName"], "id");
    }

    #[test]
    fn test_response_forms() {
        let raw = ServiceResponse::from_json(serde_json::json!([{"id": 1}])).unwrap();
        assert_eq!(raw.into_result().unwrap().rows.len(), 1);

        let env = ServiceResponse::from_json(serde_json::json!({
            "code": 0,
            "data": [{"id": 1}, {"id": 2}],
            "sqlTypes": {"id": 4},
            "startRecordIndex": 10,
            "totalQueryRecordsNumber": 42
        }))
        .unwrap()
        .into_result()
        .unwrap();
        assert_eq!(env.rows.len(), 2);
        assert_eq!(env.sql_types["id"], 4);
        assert_eq!(env.start_record_index, Some(10));
        assert_eq!(env.total_records, Some(42));
    }

    #[test]
    fn test_failure_code() {
        let failed = ServiceResponse::from_json(serde_json::json!({"code": 3, "message": "denied"}))
            .unwrap()
            .into_result();
        assert_eq!(failed, Err(ServiceError::Failed { code: 3, message: "denied".into() }));
        assert!(ServiceResponse::from_json(serde_json::json!("nope")).is_err());
    }

    #[test]
    fn test_memory_service_query() {
        let rows: Vec<Row> = (1..=25).map(|i| row([("id", CellValue::Int(i)), ("odd", CellValue::Bool(i % 2 == 1))])).collect();
        let mut service = MemoryService::new("items", rows);
        let observer = service.clone();

        let mut filter = QueryFilter::new();
        filter.filter_expression = Some(FilterExpression::equals("odd", true));
        let args = QueryArguments {
            filter,
            columns: vec!["id".into()],
            entity: "items".into(),
            offset: Some(5),
            length: Some(5),
            order_by: Some(vec![SortSpec::descending("id")]),
            ..QueryArguments::default()
        };
        service.submit(QueryTicket(1), "advancedQuery", args);
        assert_eq!(observer.submitted().len(), 1);

        let mut outcomes = service.poll();
        assert_eq!(outcomes.len(), 1);
        let (ticket, outcome) = outcomes.remove(0);
        assert_eq!(ticket, QueryTicket(1));
        let result = outcome.unwrap().into_result().unwrap();
        assert_eq!(result.total_records, Some(13));
        assert_eq!(result.start_record_index, Some(5));
        let ids: Vec<i64> = result.rows.iter().filter_map(|r| r["id"].as_i64()).collect();
        assert_eq!(ids, vec![15, 13, 11, 9, 7]);
        assert!(!result.rows[0].contains_key("odd"));
    }

    #[test]
    fn test_memory_service_pause_and_entity() {
        let mut service = MemoryService::new("items", vec![]);
        service.set_paused(true);
        service.submit(QueryTicket(1), "query", QueryArguments { entity: "other".into(), ..QueryArguments::default() });
        assert!(service.poll().is_empty());
        assert_eq!(service.pending(), 1);
        service.set_paused(false);
        let outcomes = service.poll();
        assert!(matches!(outcomes[0].1, Err(ServiceError::Failed { code: 1, .. })));
    }
}
