//! LiveGrid - reactive tabular view materialization.
//!
//! Given a record store, a column registry and a set of view directives
//! (quick filter, column value filters, sort, page), the engine derives the
//! rows to render and a totals row. It runs either over the rows it holds
//! (local mode) or by delegating filtering, sorting and paging to a data
//! service (remote mode), recomputing consistently whenever any input moves.

pub mod value;
pub mod error;
pub mod expr;
pub mod column;
pub mod store;
pub mod calculate;
pub mod criteria;
pub mod filter;
pub mod sort;
pub mod pagination;
pub mod aggregate;
pub mod service;
pub mod lookup;
pub mod queue;
pub mod state;
pub mod config;
pub mod engine;

// Tokio adapter for async data services - only when the async feature is enabled
#[cfg(feature = "async")]
pub mod remote;

pub use value::{row, CellValue, Row};
pub use error::{EngineError, FormulaError, ServiceError};
pub use column::{AggregateOp, Calculation, CellRenderer, ColumnDescriptor, ColumnRegistry, ColumnType};
pub use store::RecordStore;
pub use criteria::{FilterExpression, QueryFilter, QuickFilterOverride};
pub use filter::{ColumnFilters, ColumnValueFilter, FilterOperator, QuickFilter};
pub use sort::SortSpec;
pub use pagination::{PageSize, Paginator, QueryWindow};
pub use aggregate::TotalsRow;
pub use service::{DataService, MemoryService, QueryArguments, QueryTicket, ServiceResponse};
pub use lookup::LookupRequest;
pub use state::{HasFilterState, HasPagination, HasSortState, PersistedViewState};
pub use config::{EngineConfig, ExecutionMode, GridConfig};
pub use engine::{MaterializedView, ViewEngine, ViewNotification};

#[cfg(feature = "async")]
pub use remote::{AsyncDataService, SpawnedService};
