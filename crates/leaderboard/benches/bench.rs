use core::hint::black_box;
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use leaderboard::{
    CustomerScore, Order, RankIndex, RankStore, Rebuilder, ScoreStore, ScoreUpdate, Snapshot,
    neighbors_in, range_in,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

// Number of customers on the board for every benchmark.
const CUSTOMERS: i64 = 100_000;

// Number of score updates applied per benchmark iteration.
const UPDATES: usize = 4096;

fn random_updates(seed: u64) -> Vec<ScoreUpdate> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..UPDATES)
        .map(|_| ScoreUpdate {
            id: rng.random_range(1..=CUSTOMERS),
            score: f64::from(rng.random_range(1..=10_000)),
        })
        .collect()
}

fn populated_index() -> RankIndex {
    let mut rng = StdRng::seed_from_u64(7);
    let mut index = RankIndex::new();
    for id in 1..=CUSTOMERS {
        index.set_score(id, f64::from(rng.random_range(1..=10_000)));
    }
    index
}

fn populated_snapshot() -> Snapshot {
    let entries: Vec<CustomerScore> = populated_index()
        .range_by_rank(0, usize::MAX, Order::Descending);
    Snapshot::from_ordered(1, entries)
}

fn bench_index_upsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("index/upsert");
    group.throughput(Throughput::Elements(UPDATES as u64));

    let updates = random_updates(1);
    group.bench_function(format!("elems/{UPDATES}"), |b| {
        b.iter_batched_ref(
            populated_index,
            |index| {
                for update in &updates {
                    index.set_score(update.id, update.score);
                }
                black_box(index.len());
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn bench_rebuild_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuilder/publish");
    group.throughput(Throughput::Elements(CUSTOMERS as u64));

    group.bench_function(format!("customers/{CUSTOMERS}"), |b| {
        b.iter_batched_ref(
            || Rebuilder::with_store(populated_index()),
            |rebuilder| {
                // One update marks the store dirty, so publish materializes the
                // full board.
                rebuilder
                    .apply(&ScoreUpdate { id: 1, score: 1.0 })
                    .unwrap();
                rebuilder.publish();
                black_box(rebuilder.view().load().version());
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let snapshot = populated_snapshot();
    let mut group = c.benchmark_group("query");

    group.bench_function("range/top-100", |b| {
        b.iter(|| black_box(range_in(&snapshot, 1, 100).unwrap()));
    });

    group.bench_function("range/deep-100", |b| {
        b.iter(|| black_box(range_in(&snapshot, 90_001, 90_100).unwrap()));
    });

    let middle = snapshot.entries()[snapshot.len() / 2].customer_id;
    group.bench_function("neighbors/10-10", |b| {
        b.iter(|| black_box(neighbors_in(&snapshot, middle, 10, 10).unwrap()));
    });

    group.finish();
}

/// Concurrent score updates over a shared store, every thread hitting its own
/// slice of customers.
fn bench_score_store_contended(c: &mut Criterion) {
    const THREADS: usize = 8;

    let mut group = c.benchmark_group("score_store/contended");
    group.throughput(Throughput::Elements((UPDATES * THREADS) as u64));

    group.bench_function(format!("threads/{THREADS}/elems/{UPDATES}"), |b| {
        b.iter_custom(|iters| {
            let store = Arc::new(ScoreStore::new());
            let barrier = Arc::new(Barrier::new(THREADS + 1));

            scope(|s| {
                for t in 0..THREADS {
                    let store = Arc::clone(&store);
                    let barrier = Arc::clone(&barrier);
                    s.spawn(move || {
                        barrier.wait();
                        for _ in 0..iters {
                            for i in 0..UPDATES {
                                let id = (t * UPDATES + i) as i64;
                                black_box(store.update_raw(id, 1.0));
                            }
                        }
                    });
                }

                barrier.wait();
                let start = Instant::now();
                // The scope joins every writer before returning.
                start
            })
            .elapsed()
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_index_upsert,
    bench_rebuild_publish,
    bench_queries,
    bench_score_store_contended,
);
criterion_main!(benches);
