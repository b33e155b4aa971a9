/// LiveGrid command line
///
/// Loads a grid configuration (engine settings, columns, rows and view
/// directives), materializes the requested page and prints it with its
/// totals as JSON. Remote grids are served from the configured rows through
/// an in-memory data service.

use livegrid::{
    GridConfig, HasFilterState, HasPagination, HasSortState, MemoryService, PageSize, RecordStore, ViewEngine,
};
use std::cell::RefCell;
use std::rc::Rc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Config path from the first argument or LIVEGRID_CONFIG
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("LIVEGRID_CONFIG").ok())
        .ok_or("usage: livegrid <grid.json> (or set LIVEGRID_CONFIG)")?;
    let grid = GridConfig::from_json(&std::fs::read_to_string(&path)?)?;
    log::info!("loaded grid '{}' with {} columns and {} rows", path, grid.columns.len(), grid.data.len());

    let store = Rc::new(RefCell::new(RecordStore::new()));
    let mut builder = ViewEngine::builder()
        .store(Rc::clone(&store))
        .columns(grid.column_registry()?)
        .config(grid.engine.clone());
    if grid.engine.is_remote() {
        builder = builder.service(MemoryService::new(grid.engine.entity.clone(), grid.data.clone()));
    } else {
        store.borrow_mut().set_rows(grid.data.clone());
    }
    let mut engine = builder.build()?;

    let directives = &grid.directives;
    engine.batch(|e| {
        if let Some(text) = &directives.quick_filter {
            e.set_quick_filter(text);
        }
        for filter in &directives.column_filters {
            e.add_column_filter(filter.clone());
        }
        if let Some(sort) = &directives.sort_columns {
            e.set_sort_columns(sort);
        }
        let size = directives.page_size.map(PageSize::Rows).unwrap_or_else(|| e.paginator().page_size());
        e.set_page(directives.page_index, size);
        e.reload();
    });

    let output = serde_json::json!({
        "view": engine.view(),
        "totals": engine.totals(),
        "sort": engine.sort(),
        "pageCount": engine.paginator().page_count(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
