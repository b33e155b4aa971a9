use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use livegrid::calculate::apply_calculated_columns;
use livegrid::sort::sort_rows;
use livegrid::*;
use std::cell::RefCell;
use std::rc::Rc;

const NAMES: [&str; 6] = ["Ana", "Bob", "Carla", "Dámaso", "eve", "Fran"];

fn rows(size: usize) -> Vec<Row> {
    (0..size)
        .map(|i| {
            row([
                ("id", CellValue::Int(i as i64)),
                ("name", CellValue::from(NAMES[i % NAMES.len()])),
                ("qty", CellValue::Int(((i * 7919) % 101) as i64)),
                ("price", CellValue::Float((i % 37) as f64 * 1.25)),
            ])
        })
        .collect()
}

fn columns() -> ColumnRegistry {
    ColumnRegistry::new(vec![
        ColumnDescriptor::new("id"),
        ColumnDescriptor::new("name"),
        ColumnDescriptor::new("qty").aggregate(AggregateOp::Sum),
        ColumnDescriptor::new("price"),
        ColumnDescriptor::new("total").formula("price * qty + 1").aggregate(AggregateOp::Sum),
    ])
    .unwrap()
}

fn engine(size: usize) -> ViewEngine {
    let mut engine = ViewEngine::builder()
        .store(Rc::new(RefCell::new(RecordStore::with_rows(rows(size)))))
        .columns(columns())
        .build()
        .unwrap();
    engine.reload();
    engine
}

fn bench_quick_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("quick_filter");

    for size in [100, 1000, 10000].iter() {
        let mut engine = engine(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            let mut flip = false;
            b.iter(|| {
                flip = !flip;
                engine.set_quick_filter(black_box(if flip { "da" } else { "an" }));
            });
        });
    }
    group.finish();
}

fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_rows");

    for size in [100, 1000, 10000].iter() {
        let data = rows(*size);
        let spec = SortSpec::descending("qty");
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut copy = data.clone();
                sort_rows(black_box(&mut copy), &spec);
            });
        });
    }
    group.finish();
}

fn bench_calculated_columns(c: &mut Criterion) {
    let mut group = c.benchmark_group("calculated_columns");
    let registry = columns();

    for size in [100, 1000, 10000].iter() {
        let data = rows(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut copy = data.clone();
                apply_calculated_columns(&registry, black_box(&mut copy));
            });
        });
    }
    group.finish();
}

fn bench_page_change(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_change");

    for size in [1000, 10000].iter() {
        let mut engine = engine(*size);
        let pages = size / 25;
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            let mut page = 0;
            b.iter(|| {
                page = (page + 1) % pages;
                engine.set_page(black_box(page), PageSize::Rows(25));
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_quick_filter,
    bench_sort,
    bench_calculated_columns,
    bench_page_change
);

criterion_main!(benches);
