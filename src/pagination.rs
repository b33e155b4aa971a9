//! Pagination engine.
//!
//! Local mode slices a window out of the filtered, sorted rows without
//! touching them. Remote mode turns page navigation into an offset/length
//! window for the data service and tracks what the service reported back.
//!
//! # Examples
//!
//! ```
//! use livegrid::pagination::{PageSize, Paginator};
//!
//! let mut paginator = Paginator::default();
//! assert_eq!(paginator.options(), &[10, 25, 50, 100]);
//!
//! paginator.set_page_size(PageSize::Rows(7));
//! assert_eq!(paginator.options(), &[7, 10, 25, 50, 100]);
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const DEFAULT_PAGE_SIZE_OPTIONS: [usize; 4] = [10, 25, 50, 100];

/// Requested page size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    Rows(usize),
    /// Every record on one page; resolves to the current total.
    ShowAll,
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize::Rows(DEFAULT_PAGE_SIZE_OPTIONS[0])
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PageSizeRepr {
    Rows(usize),
    Named(String),
}

impl Serialize for PageSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PageSize::Rows(n) => PageSizeRepr::Rows(*n),
            PageSize::ShowAll => PageSizeRepr::Named("all".to_string()),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PageSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match PageSizeRepr::deserialize(deserializer)? {
            PageSizeRepr::Rows(n) => Ok(PageSize::Rows(n)),
            PageSizeRepr::Named(s) if s.eq_ignore_ascii_case("all") => Ok(PageSize::ShowAll),
            PageSizeRepr::Named(s) => Err(serde::de::Error::custom(format!("unknown page size '{}'", s))),
        }
    }
}

/// Offset/length window requested from the data service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWindow {
    pub offset: usize,
    pub length: usize,
}

/// Pagination state
#[derive(Debug, Clone, PartialEq)]
pub struct Paginator {
    page_index: usize,
    page_size: PageSize,
    options: Vec<usize>,
    total_records: usize,
    /// End of the last window the service returned
    query_record_offset: usize,
}

impl Default for Paginator {
    fn default() -> Self {
        Paginator::new(DEFAULT_PAGE_SIZE_OPTIONS.to_vec(), PageSize::default())
    }
}

impl Paginator {
    pub fn new(options: Vec<usize>, page_size: PageSize) -> Self {
        let mut options: Vec<usize> = options.into_iter().filter(|&n| n > 0).collect();
        if options.is_empty() {
            options = DEFAULT_PAGE_SIZE_OPTIONS.to_vec();
        }
        options.sort_unstable();
        options.dedup();

        let mut paginator = Paginator {
            page_index: 0,
            page_size: PageSize::Rows(options[0]),
            options,
            total_records: 0,
            query_record_offset: 0,
        };
        paginator.set_page_size(page_size);
        paginator
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn set_page_index(&mut self, index: usize) {
        self.page_index = index;
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    /// Sets the page size. Zero falls back to the first option; a size the
    /// options do not offer is added and the options re-sorted.
    pub fn set_page_size(&mut self, size: PageSize) {
        self.page_size = match size {
            PageSize::Rows(0) => PageSize::Rows(self.options[0]),
            PageSize::Rows(n) => {
                if !self.options.contains(&n) {
                    self.options.push(n);
                    self.options.sort_unstable();
                }
                PageSize::Rows(n)
            }
            PageSize::ShowAll => PageSize::ShowAll,
        };
    }

    pub fn options(&self) -> &[usize] {
        &self.options
    }

    pub fn is_show_all(&self) -> bool {
        self.page_size == PageSize::ShowAll
    }

    /// Rows per page. "Show all" resolves to the known total, or to the
    /// largest option while no total is known.
    pub fn rows(&self) -> usize {
        match self.page_size {
            PageSize::Rows(n) => n,
            PageSize::ShowAll if self.total_records > 0 => self.total_records,
            PageSize::ShowAll => self.options.last().copied().unwrap_or(DEFAULT_PAGE_SIZE_OPTIONS[0]),
        }
    }

    pub fn total_records(&self) -> usize {
        self.total_records
    }

    pub fn set_total_records(&mut self, total: usize) {
        self.total_records = total;
    }

    pub fn query_record_offset(&self) -> usize {
        self.query_record_offset
    }

    pub fn set_query_record_offset(&mut self, offset: usize) {
        self.query_record_offset = offset;
    }

    pub fn page_count(&self) -> usize {
        let rows = self.rows();
        if rows == 0 {
            return 0;
        }
        self.total_records.div_ceil(rows)
    }

    /// Local window over `rows`, which stay untouched.
    ///
    /// Updates the total. A start beyond a non-empty row set resets to the
    /// first page.
    pub fn local_window<T: Clone>(&mut self, rows: &[T]) -> Vec<T> {
        self.total_records = rows.len();
        let size = self.rows();
        let mut start = self.page_index.saturating_mul(size);
        if !rows.is_empty() && rows.len() < start {
            log::debug!("page {} is past the end of {} rows, back to the first page", self.page_index, rows.len());
            self.page_index = 0;
            start = 0;
        }
        rows.iter().skip(start).take(size).cloned().collect()
    }

    /// Moves to a page and returns the window the service should be asked for.
    ///
    /// Going back or changing the page size requests a full page at
    /// `index * rows`. Moving forward continues from the end of the last
    /// window returned, clipped to the known total; a page past that total
    /// goes back to the first page.
    pub fn change_page(&mut self, index: usize, size: PageSize) -> QueryWindow {
        let going_back = index < self.page_index;
        let old_rows = self.rows();
        self.page_index = index;
        self.set_page_size(size);
        let rows = self.rows();
        let page_start = index.saturating_mul(rows);

        if self.total_records > 0 && page_start >= self.total_records {
            log::debug!("page {} is past the end of {} records, back to the first page", index, self.total_records);
            return self.first_page_window();
        }
        if going_back || old_rows != rows {
            return QueryWindow { offset: page_start, length: rows };
        }

        let offset = self.query_record_offset.max(page_start);
        if self.total_records == 0 {
            return QueryWindow { offset, length: rows };
        }
        let end = offset.saturating_add(rows).min(self.total_records);
        QueryWindow { offset, length: rows.min(end.saturating_sub(offset)) }
    }

    /// Window for the current page.
    pub fn current_window(&self) -> QueryWindow {
        let rows = self.rows();
        QueryWindow { offset: self.page_index.saturating_mul(rows), length: rows }
    }

    /// Back to the first page; returns its window.
    pub fn first_page_window(&mut self) -> QueryWindow {
        self.page_index = 0;
        self.query_record_offset = 0;
        QueryWindow { offset: 0, length: self.rows() }
    }

    /// Window continuing after the rows already held, for accumulating lists.
    /// `None` once everything is loaded.
    pub fn next_chunk_window(&self, held: usize) -> Option<QueryWindow> {
        if held >= self.total_records {
            return None;
        }
        Some(QueryWindow { offset: self.query_record_offset, length: self.rows() })
    }

    /// Records what the service reported for the last window.
    pub fn update_from_response(&mut self, start_record_index: Option<usize>, returned: usize, total: Option<usize>) {
        if let Some(start) = start_record_index {
            self.query_record_offset = start.saturating_add(returned);
        }
        if let Some(total) = total {
            self.total_records = total;
        }
    }

    /// Offset to resume from after restoring a persisted page.
    pub fn restore_offset(&mut self, page_index: usize, saved_offset: usize) {
        self.page_index = page_index;
        self.query_record_offset = if page_index == 0 {
            0
        } else {
            saved_offset.saturating_sub(self.rows())
        };
    }
}
