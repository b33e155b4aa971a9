//! Record store.
//!
//! Holds the authoritative row array plus the sql types reported alongside it.
//! Rows only change through [`RecordStore::set_rows`] and
//! [`RecordStore::append_rows`]; every mutation is recorded in a changeset so
//! that the change coordinator can tell, by generation, whether it has seen
//! the latest data.
//!
//! # Examples
//!
//! ```
//! use livegrid::{RecordStore, row};
//!
//! let mut store = RecordStore::new();
//! let before = store.generation();
//!
//! store.set_rows(vec![row([("id", 1)]), row([("id", 2)])]);
//! store.append_rows(vec![row([("id", 3)])]);
//!
//! assert_eq!(store.len(), 3);
//! assert!(store.generation() > before);
//! assert_eq!(store.drain_changes().len(), 2);
//! ```

use crate::value::Row;
use std::collections::HashMap;

/// A single change to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// The whole row set was replaced
    Replaced { len: usize },
    /// Rows were appended starting at `start`
    Appended { start: usize, count: usize },
}

/// Pending store changes plus a generation counter bumped on every mutation
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    changes: Vec<StoreChange>,
    generation: u64,
}

impl Changeset {
    pub fn new() -> Self {
        Changeset::default()
    }

    pub fn push(&mut self, change: StoreChange) {
        self.changes.push(change);
        self.generation += 1;
    }

    pub fn changes(&self) -> &[StoreChange] {
        &self.changes
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Drain changes, returning ownership and clearing the buffer
    pub fn drain(&mut self) -> Vec<StoreChange> {
        std::mem::take(&mut self.changes)
    }
}

/// Authoritative row array
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    rows: Vec<Row>,
    /// attr -> declared sql type, as reported by the data service
    sql_types: HashMap<String, i32>,
    changeset: Changeset,
}

impl RecordStore {
    pub fn new() -> Self {
        RecordStore::default()
    }

    pub fn with_rows(rows: Vec<Row>) -> Self {
        let mut store = RecordStore::new();
        store.set_rows(rows);
        store
    }

    /// Replace every row.
    pub fn set_rows(&mut self, rows: Vec<Row>) {
        let len = rows.len();
        self.rows = rows;
        self.changeset.push(StoreChange::Replaced { len });
    }

    /// Append rows after the current ones (used when pages accumulate).
    pub fn append_rows(&mut self, rows: Vec<Row>) {
        let start = self.rows.len();
        let count = rows.len();
        self.rows.extend(rows);
        self.changeset.push(StoreChange::Appended { start, count });
    }

    /// Current rows. Callers that need to reshape them copy first.
    pub fn current(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn sql_types(&self) -> &HashMap<String, i32> {
        &self.sql_types
    }

    /// Sql types travel with the data; setting them is not a row mutation.
    pub fn set_sql_types(&mut self, sql_types: HashMap<String, i32>) {
        self.sql_types = sql_types;
    }

    pub fn changeset(&self) -> &Changeset {
        &self.changeset
    }

    pub fn generation(&self) -> u64 {
        self.changeset.generation()
    }

    pub fn drain_changes(&mut self) -> Vec<StoreChange> {
        self.changeset.drain()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.changeset.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{row, CellValue};

    #[test]
    fn test_set_and_append() {
        let mut store = RecordStore::new();
        store.set_rows(vec![row([("id", 1)])]);
        store.append_rows(vec![row([("id", 2)]), row([("id", 3)])]);

        assert_eq!(store.len(), 3);
        assert_eq!(store.current()[2]["id"], CellValue::Int(3));
        assert_eq!(
            store.drain_changes(),
            vec![
                StoreChange::Replaced { len: 1 },
                StoreChange::Appended { start: 1, count: 2 },
            ]
        );
        assert!(!store.has_pending_changes());
    }

    #[test]
    fn test_generation_tracks_every_mutation() {
        let mut store = RecordStore::with_rows(vec![]);
        let g0 = store.generation();
        store.append_rows(vec![]);
        assert_eq!(store.generation(), g0 + 1);
        store.drain_changes();
        // draining does not reset the generation
        assert_eq!(store.generation(), g0 + 1);
    }

    #[test]
    fn test_sql_types_do_not_bump_generation() {
        let mut store = RecordStore::new();
        let g0 = store.generation();
        store.set_sql_types(HashMap::from([("id".to_string(), 4)]));
        assert_eq!(store.generation(), g0);
        assert_eq!(store.sql_types()["id"], 4);
    }
}
