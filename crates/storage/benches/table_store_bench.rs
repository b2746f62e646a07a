//! Benchmarks for TableStore bulk removal and snapshots.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::collections::BTreeMap;
use tessera_core::Value;
use tessera_storage::TableStore;

fn populate_store(store: &mut TableStore, count: i64) {
    let sectors = ["Tech", "Finance", "Health", "Energy", "Consumer"];
    for i in 1..=count {
        let mut fields = BTreeMap::new();
        fields.insert("symbol".to_string(), Value::String(format!("SYM{}", i)));
        fields.insert(
            "sector".to_string(),
            Value::from(sectors[(i as usize) % sectors.len()]),
        );
        fields.insert("price".to_string(), Value::Float(100.0 + (i as f64) * 0.1));
        store.insert(Value::Int(i), Value::Object(fields));
    }
}

/// Benchmark: per-key remove() calls vs one remove_many() swap
fn table_store_remove_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_store_remove");
    let total_rows = 100_000i64;

    for remove_count in [100i64, 1000, 10000].iter() {
        let keys: Vec<Value> = (1..=*remove_count).map(|i| Value::Int(i * 7 % total_rows)).collect();

        group.bench_with_input(
            BenchmarkId::new("individual", remove_count),
            &keys,
            |b, keys| {
                b.iter_batched(
                    || {
                        let mut store = TableStore::new("bench");
                        populate_store(&mut store, total_rows);
                        store
                    },
                    |mut store| {
                        for key in keys {
                            black_box(store.remove(key));
                        }
                    },
                    BatchSize::LargeInput,
                )
            },
        );

        group.bench_with_input(BenchmarkId::new("batch", remove_count), &keys, |b, keys| {
            b.iter_batched(
                || {
                    let mut store = TableStore::new("bench");
                    populate_store(&mut store, total_rows);
                    store
                },
                |mut store| black_box(store.remove_many(keys)),
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

/// Benchmark: cost of the full-table backup taken on first write
fn table_store_snapshot_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_store_snapshot");

    for rows in [1_000i64, 10_000, 100_000].iter() {
        let mut store = TableStore::new("bench");
        populate_store(&mut store, *rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &store, |b, store| {
            b.iter(|| black_box(store.snapshot()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    table_store_remove_benchmark,
    table_store_snapshot_benchmark
);
criterion_main!(benches);
