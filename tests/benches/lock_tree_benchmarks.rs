//! # Lock Tree Benchmarks
//!
//! | Path | Expectation |
//! |------|-------------|
//! | Uncontended acquire + release | O(log n) per lock |
//! | Conflict query over n records | O(log n + k) |
//! | Retry pass over a queue of readers | linear in queue length |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lock_tree::{
    KeyRange, LockMode, LockRequest, LockTree, LockTreeManager, LoggingPanicHandler,
    TableComparatorRegistry, TableId, TxnId,
};
use rand::Rng;
use std::sync::Arc;

const TABLE: TableId = TableId(1);

fn setup() -> (Arc<LockTreeManager>, Arc<LockTree>) {
    let manager = LockTreeManager::create(
        10_000_000,
        1 << 32,
        Arc::new(LoggingPanicHandler),
        Arc::new(TableComparatorRegistry::with_bytewise_default()),
    )
    .unwrap();
    let tree = manager.tree_for_table(TABLE).unwrap();
    (manager, tree)
}

fn key(i: u64) -> Vec<u8> {
    i.to_be_bytes().to_vec()
}

fn bench_acquire_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock-tree-acquire");

    for held in [0u64, 1_000, 100_000] {
        let (_manager, tree) = setup();
        for i in 0..held {
            LockRequest::point(TABLE, TxnId(1), key(i * 2), LockMode::Write)
                .start(&tree, false)
                .unwrap();
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("point_write", held), &held, |b, _| {
            let mut rng = rand::thread_rng();
            b.iter(|| {
                let odd = rng.gen_range(0..held.max(1)) * 2 + 1;
                let req = LockRequest::point(TABLE, TxnId(2), key(odd), LockMode::Write);
                black_box(req.start(&tree, false).unwrap());
                tree.release_all(TxnId(2)).unwrap();
            })
        });
    }

    group.finish();
}

fn bench_conflict_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock-tree-conflicts");

    for held in [1_000u64, 100_000] {
        let (_manager, tree) = setup();
        for i in 0..held {
            LockRequest::new(
                TABLE,
                TxnId(i),
                KeyRange::new(key(i * 10), key(i * 10 + 5)),
                LockMode::Read,
            )
            .start(&tree, false)
            .unwrap();
        }

        group.bench_with_input(BenchmarkId::new("write_probe", held), &held, |b, &held| {
            let mut rng = rand::thread_rng();
            b.iter(|| {
                let low = rng.gen_range(0..held * 10);
                let probe = KeyRange::new(key(low), key(low + 40));
                black_box(
                    tree.conflicting_owners(TxnId(u64::MAX), &probe, LockMode::Write)
                        .unwrap(),
                )
            })
        });
    }

    group.finish();
}

fn bench_retry_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock-tree-retry");

    for waiters in [10u64, 100, 1_000] {
        group.throughput(Throughput::Elements(waiters));
        group.bench_with_input(BenchmarkId::new("readers", waiters), &waiters, |b, &waiters| {
            b.iter(|| {
                let (_manager, tree) = setup();
                let writer = LockRequest::point(TABLE, TxnId(0), "hot", LockMode::Write);
                writer.start(&tree, false).unwrap();
                let readers: Vec<LockRequest> = (1..=waiters)
                    .map(|txn| LockRequest::point(TABLE, TxnId(txn), "hot", LockMode::Read))
                    .collect();
                for reader in &readers {
                    reader.start(&tree, false).unwrap();
                }
                tree.release_all(TxnId(0)).unwrap();
                black_box(tree.record_count())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_acquire_release,
    bench_conflict_query,
    bench_retry_pass
);
criterion_main!(benches);
