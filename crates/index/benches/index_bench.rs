//! Benchmarks for tessel-index using criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessel_core::Value;
use tessel_index::{ColumnIndex, Index, IndexSet, KeyRange, RangeIndex};

fn populated(size: i64) -> ColumnIndex {
    let mut index = ColumnIndex::new();
    for i in 0..size {
        index.insert(Value::Int64(i), i as u64);
    }
    index
}

fn column_insert_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("column_insert");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(populated(size)));
        });
    }

    group.finish();
}

fn column_range_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("column_range");
    let index = populated(100_000);

    for range_size in [100, 1000, 10000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(range_size),
            range_size,
            |b, &range_size| {
                let range = KeyRange::bound(
                    Value::Int64(50_000),
                    Value::Int64(50_000 + range_size),
                    false,
                    true,
                );
                b.iter(|| black_box(index.get_range(Some(&range), false, None, 0)));
            },
        );
    }

    group.finish();
}

/// First write to a cloned set, which copies the shared indexes.
fn snapshot_write_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_write");

    for size in [1000, 10000, 100000].iter() {
        let mut committed = IndexSet::new(2);
        for i in 0..*size {
            committed.insert_row(i as u64, &[Value::Int64(i), Value::Int64(i % 10)]);
        }

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut snapshot = committed.clone();
                snapshot.insert_row(size as u64, &[Value::Int64(size), Value::Int64(0)]);
                black_box(snapshot)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    column_insert_benchmark,
    column_range_benchmark,
    snapshot_write_benchmark
);
criterion_main!(benches);
