//! Benchmarks for joined queries.
//!
//! Setup is excluded with iter_batched where a bench writes; read-only
//! benches share one populated store per size.
//!
//! Run with: cargo bench -p tessera-database

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use serde_json::json;
use tessera_database::{
    create_store, JoinDefinition, Query, QueryJoin, Store, StoreOptions, TableDefinition, Where,
};

fn populated_store(users: usize) -> Store {
    let store = create_store(
        vec![
            TableDefinition::new("users"),
            TableDefinition::new("addr").key_field("id"),
            TableDefinition::new("pets"),
            TableDefinition::new("states").key_field("code"),
        ],
        StoreOptions::new()
            .join(JoinDefinition::between("users.addID", "addr").unwrap().named("home"))
            .join(JoinDefinition::between("users", "pets.ownerID").unwrap().named("pets"))
            .join(JoinDefinition::between("addr.state", "states").unwrap().named("stateInfo")),
    )
    .unwrap();

    let states = ["CA", "NY", "TX", "WA", "OR"];
    store
        .transact(|store, _| {
            for code in states {
                store.table("states").add(json!({ "code": code }), None)?;
            }
            for i in 0..users {
                store.table("addr").add(
                    json!({ "id": i, "city": format!("city{}", i % 50), "state": states[i % states.len()] }),
                    None,
                )?;
                let user = store.table("users").add(
                    json!({ "name": format!("user{}", i), "age": (i % 70) as i64, "addID": i }),
                    None,
                )?;
                let owner = user.key().as_i64().unwrap_or_default();
                for p in 0..(i % 3) {
                    store.table("pets").add(
                        json!({ "name": format!("pet{}-{}", i, p), "ownerID": owner }),
                        None,
                    )?;
                }
            }
            Ok(())
        })
        .unwrap();
    store
}

/// Benchmark: one singular join, one plural join, and a nested join.
fn join_query_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_query");

    for size in [100usize, 1_000, 10_000] {
        let store = populated_store(size);

        group.bench_with_input(BenchmarkId::new("singular", size), &store, |b, store| {
            let query = Query::new("users").join("home");
            b.iter(|| black_box(store.query(&query).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("plural", size), &store, |b, store| {
            let query = Query::new("users").join("pets");
            b.iter(|| black_box(store.query(&query).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("nested", size), &store, |b, store| {
            let query = Query::new("users").join(QueryJoin::new("home").join("stateInfo"));
            b.iter(|| black_box(store.query_values(&query).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("filtered", size), &store, |b, store| {
            let query = Query::new("users")
                .filter(Where::field("age").gte(60))
                .join(QueryJoin::new("home").filter(Where::field("city").eq("city7")));
            b.iter(|| black_box(store.query(&query).unwrap()))
        });
    }

    group.finish();
}

/// Benchmark: many small transactions vs one transaction of the same writes
fn transaction_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("transactions");
    let writes = 1_000usize;

    group.bench_function(BenchmarkId::new("implicit", writes), |b| {
        b.iter_batched(
            Store::new,
            |store| {
                let users = store.table("users");
                for i in 0..writes {
                    users.add(json!({ "n": i }), None).unwrap();
                }
                black_box(store)
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function(BenchmarkId::new("batched", writes), |b| {
        b.iter_batched(
            Store::new,
            |store| {
                store
                    .transact(|store, _| {
                        let users = store.table("users");
                        for i in 0..writes {
                            users.add(json!({ "n": i }), None)?;
                        }
                        Ok(())
                    })
                    .unwrap();
                black_box(store)
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, join_query_benchmark, transaction_benchmark);
criterion_main!(benches);
