//! Single-channel recompute queue.
//!
//! Every change source posts a typed [`ViewEvent`]; the coordinator drains the
//! queue once per cycle into one [`RecomputeRequest`] describing everything
//! that has to be redone.

use crate::pagination::QueryWindow;
use std::collections::VecDeque;

/// A change posted by one of the view's change sources
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// Record store rows were replaced or appended
    DataChanged,
    SortChanged,
    QuickFilterChanged,
    ColumnFiltersChanged,
    /// Parent values or external expression changed
    ParentFilterChanged,
    /// Page moved; remote mode carries the window to fetch
    PageChanged { window: Option<QueryWindow> },
    RecalculateColumns,
    Reload { from_start: bool },
    /// A persisted state was restored
    StateRestored,
}

/// Coalesced work for one recompute cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecomputeRequest {
    pub data: bool,
    pub sort: bool,
    pub filters: bool,
    /// Parent values or external expression changed
    pub parent: bool,
    pub page: bool,
    /// Latest remote page window posted this cycle
    pub window: Option<QueryWindow>,
    pub recalculate: bool,
    /// `Some(from_start)` when a reload was asked for
    pub reload: Option<bool>,
    pub restored: bool,
}

impl RecomputeRequest {
    fn merge(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::DataChanged => self.data = true,
            ViewEvent::SortChanged => self.sort = true,
            ViewEvent::QuickFilterChanged | ViewEvent::ColumnFiltersChanged => self.filters = true,
            ViewEvent::ParentFilterChanged => {
                self.filters = true;
                self.parent = true;
            }
            ViewEvent::PageChanged { window } => {
                self.page = true;
                if window.is_some() {
                    self.window = window;
                }
            }
            ViewEvent::RecalculateColumns => self.recalculate = true,
            ViewEvent::Reload { from_start } => {
                self.reload = Some(from_start || self.reload.unwrap_or(false));
            }
            ViewEvent::StateRestored => self.restored = true,
        }
    }

    /// Whether the filtered row set has to be rebuilt, not just re-sliced.
    pub fn needs_pipeline(&self) -> bool {
        self.data || self.sort || self.filters || self.recalculate || self.restored || self.reload.is_some()
    }
}

/// FIFO of posted events
#[derive(Debug, Default)]
pub struct RecomputeQueue {
    events: VecDeque<ViewEvent>,
}

impl RecomputeQueue {
    pub fn new() -> Self {
        RecomputeQueue::default()
    }

    pub fn post(&mut self, event: ViewEvent) {
        log::trace!("posted {:?}", event);
        self.events.push_back(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Coalesces every posted event; `None` when nothing was posted.
    pub fn drain(&mut self) -> Option<RecomputeRequest> {
        if self.events.is_empty() {
            return None;
        }
        let mut request = RecomputeRequest::default();
        for event in self.events.drain(..) {
            request.merge(event);
        }
        Some(request)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
