//! Service-backed cell lookups.
//!
//! A column can show a description fetched through a secondary query
//! (`key -> description`). Outstanding lookups are keyed by row index: asking
//! again for the same row replaces the previous request, whose ticket is
//! handed back so the caller can cancel it. Resolved descriptions are cached
//! per column and key.

use crate::service::QueryTicket;
use crate::value::CellValue;
use std::collections::HashMap;

/// What to look up for one cell
#[derive(Debug, Clone, PartialEq)]
pub struct LookupRequest {
    /// Column the description is shown in
    pub column: String,
    pub entity: String,
    /// Column of the lookup entity matched against `key`
    pub key_column: String,
    /// Column of the lookup entity holding the description
    pub value_column: String,
    pub key: CellValue,
}

impl LookupRequest {
    fn cache_key(&self) -> (String, String) {
        (self.column.clone(), self.key.to_text())
    }
}

/// Outstanding and resolved lookups.
#[derive(Debug, Default)]
pub struct LookupRegistry {
    by_row: HashMap<usize, QueryTicket>,
    pending: HashMap<QueryTicket, (usize, LookupRequest)>,
    cache: HashMap<(String, String), CellValue>,
}

impl LookupRegistry {
    pub fn new() -> Self {
        LookupRegistry::default()
    }

    /// Records a lookup for `row_index`, returning the ticket it replaces.
    pub fn begin(&mut self, row_index: usize, ticket: QueryTicket, request: LookupRequest) -> Option<QueryTicket> {
        let replaced = self.by_row.insert(row_index, ticket);
        if let Some(old) = replaced {
            self.pending.remove(&old);
        }
        self.pending.insert(ticket, (row_index, request));
        replaced
    }

    pub fn is_pending(&self, ticket: QueryTicket) -> bool {
        self.pending.contains_key(&ticket)
    }

    /// Removes a pending lookup, returning its row index and request.
    pub fn resolve(&mut self, ticket: QueryTicket) -> Option<(usize, LookupRequest)> {
        let (row_index, request) = self.pending.remove(&ticket)?;
        if self.by_row.get(&row_index) == Some(&ticket) {
            self.by_row.remove(&row_index);
        }
        Some((row_index, request))
    }

    pub fn cached(&self, request: &LookupRequest) -> Option<&CellValue> {
        self.cache.get(&request.cache_key())
    }

    pub fn store(&mut self, request: &LookupRequest, value: CellValue) {
        self.cache.insert(request.cache_key(), value);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drops every outstanding lookup, returning their tickets.
    pub fn release_all(&mut self) -> Vec<QueryTicket> {
        self.by_row.clear();
        let mut tickets: Vec<QueryTicket> = self.pending.drain().map(|(t, _)| t).collect();
        tickets.sort();
        tickets
    }
}
