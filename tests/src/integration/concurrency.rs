//! # Multi-threaded Stress
//!
//! Worker threads run short transactions that lock a few random ranges,
//! hold them briefly and release. Timed waits break the deadlocks that
//! random multi-range transactions produce.

#[cfg(test)]
mod tests {
    use crate::fixtures::{TestEnv, TABLE};
    use lock_tree::{
        invariant_resource_conservation, AcquireOutcome, KeyRange, LockMode, LockRequest,
        LockTree, LockTreeError, TxnId,
    };
    use rand::Rng;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const THREADS: u64 = 8;
    const TXNS_PER_THREAD: u64 = 60;

    #[derive(Default)]
    struct Tally {
        granted: AtomicU64,
        timed_out: AtomicU64,
        refused: AtomicU64,
    }

    fn random_range(rng: &mut impl Rng) -> KeyRange {
        let low: u8 = rng.gen_range(b'a'..=b'z');
        let high = low.saturating_add(rng.gen_range(0..3)).min(b'z');
        KeyRange::new(vec![low], vec![high])
    }

    /// One transaction: lock up to three ranges, then release everything.
    fn run_txn(tree: &LockTree, txn: TxnId, tally: &Tally, rng: &mut impl Rng) {
        let locks = rng.gen_range(1..=3);
        for _ in 0..locks {
            let mode = if rng.gen_bool(0.4) {
                LockMode::Write
            } else {
                LockMode::Read
            };
            let req = LockRequest::new(TABLE, txn, random_range(rng), mode);
            let outcome = req.start(tree, false).expect("start");

            let result = match outcome {
                AcquireOutcome::Granted => Ok(()),
                AcquireOutcome::Refused(err) => Err(err),
                AcquireOutcome::Pending => req.wait_timeout(Duration::from_millis(20)),
            };
            match result {
                Ok(()) => {
                    tally.granted.fetch_add(1, Ordering::Relaxed);
                }
                Err(LockTreeError::LockTimeout) => {
                    tally.timed_out.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Err(LockTreeError::OutOfLocks) => {
                    tally.refused.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Err(other) => panic!("unexpected lock result: {other}"),
            }
        }
        if rng.gen_bool(0.3) {
            thread::yield_now();
        }
        tree.release_all(txn).expect("release");
    }

    fn stress(env: &TestEnv) -> Arc<Tally> {
        let tree = env.tree();
        let tally = Arc::new(Tally::default());
        let done = Arc::new(AtomicBool::new(false));

        let checker = {
            let tree = Arc::clone(&tree);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    tree.verify().expect("tree invariants");
                    thread::sleep(Duration::from_millis(1));
                }
            })
        };

        let workers: Vec<_> = (0..THREADS)
            .map(|worker| {
                let tree = Arc::clone(&tree);
                let tally = Arc::clone(&tally);
                thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    for i in 0..TXNS_PER_THREAD {
                        let txn = TxnId(worker * TXNS_PER_THREAD + i + 1);
                        run_txn(&tree, txn, &tally, &mut rng);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().expect("worker panicked");
        }
        done.store(true, Ordering::Relaxed);
        checker.join().expect("checker panicked");

        tree.verify().unwrap();
        assert_eq!(tree.record_count(), 0);
        assert_eq!(tree.pending_count(), 0);
        assert!(invariant_resource_conservation(
            env.manager.charged(),
            &tree.records()
        ));
        assert!(env.manager.charged().is_zero());
        assert!(!env.manager.is_poisoned());
        tree.close().unwrap();

        tally
    }

    #[test]
    fn test_concurrent_transactions_roomy() {
        let env = TestEnv::roomy();
        let tally = stress(&env);

        assert!(tally.granted.load(Ordering::Relaxed) > 0);
        assert_eq!(tally.refused.load(Ordering::Relaxed), 0);

        let metrics = env.manager.metrics();
        assert_eq!(
            metrics.total_grants(),
            tally.granted.load(Ordering::Relaxed)
        );
        assert_eq!(metrics.timeouts, tally.timed_out.load(Ordering::Relaxed));
    }

    #[test]
    fn test_concurrent_transactions_tight_ceiling() {
        let env = TestEnv::new(6, 1 << 20);
        let tally = stress(&env);

        assert!(tally.granted.load(Ordering::Relaxed) > 0);
        let metrics = env.manager.metrics();
        assert_eq!(metrics.out_of_locks, tally.refused.load(Ordering::Relaxed));
    }

    #[test]
    fn test_concurrent_trees_share_one_budget() {
        let env = TestEnv::new(16, 1 << 20);
        let trees: Vec<Arc<LockTree>> = (1..=4)
            .map(|table| env.table_tree(lock_tree::TableId(table)))
            .collect();

        let workers: Vec<_> = trees
            .iter()
            .enumerate()
            .map(|(t, tree)| {
                let tree = Arc::clone(tree);
                let table = tree.table().expect("bound tree");
                thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    for i in 0..100u64 {
                        let txn = TxnId(t as u64 * 1000 + i);
                        let key = [rng.gen_range(b'a'..=b'h')];
                        let req = LockRequest::point(table, txn, key.as_slice(), LockMode::Write);
                        if let AcquireOutcome::Pending = req.start(&tree, false).expect("start") {
                            let _ = req.wait_timeout(Duration::from_millis(10));
                        }
                        tree.release_all(txn).expect("release");
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().expect("worker panicked");
        }
        assert!(env.manager.charged().is_zero());
        assert_eq!(env.manager.status().open_trees, 4);
    }
}
