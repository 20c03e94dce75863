//! # Blocking, Timed and Cancelled Waits
//!
//! Waiters park on their request's condition variable and are woken by the
//! thread that completes the request.

#[cfg(test)]
mod tests {
    use crate::fixtures::{point, range, TestEnv};
    use lock_tree::{AcquireOutcome, LockMode, LockTreeError, RequestState, TxnId};
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_blocking_start_returns_after_release() {
        let env = TestEnv::roomy();
        let tree = env.tree();

        let holder = point(1, "k", LockMode::Write);
        holder.start(&tree, false).unwrap();

        let (started_tx, started_rx) = mpsc::channel();
        let waiter = {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let req = point(2, "k", LockMode::Write);
                started_tx.send(()).unwrap();
                req.start(&tree, true).unwrap()
            })
        };

        started_rx.recv().unwrap();
        while tree.pending_count() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        tree.release_all(TxnId(1)).unwrap();

        assert_eq!(waiter.join().unwrap(), AcquireOutcome::Granted);
        assert_eq!(tree.locks_held_by(TxnId(2)).len(), 1);
    }

    #[test]
    fn test_blocking_start_reports_refusal() {
        let env = TestEnv::new(1, 4096);
        let tree = env.tree();

        let holder = point(1, "L", LockMode::Write);
        holder.start(&tree, false).unwrap();
        let first = point(2, "L", LockMode::Read);
        first.start(&tree, false).unwrap();

        let waiter = {
            let tree = Arc::clone(&tree);
            thread::spawn(move || point(3, "L", LockMode::Read).start(&tree, true).unwrap())
        };
        while tree.pending_count() < 2 {
            thread::sleep(Duration::from_millis(1));
        }
        tree.release_all(TxnId(1)).unwrap();

        assert_eq!(
            waiter.join().unwrap(),
            AcquireOutcome::Refused(LockTreeError::OutOfLocks)
        );
        assert_eq!(first.result(), Some(Ok(())));
    }

    #[test]
    fn test_many_waiters_all_woken() {
        let env = TestEnv::roomy();
        let tree = env.tree();

        let holder = point(1, "k", LockMode::Write);
        holder.start(&tree, false).unwrap();

        let waiters: Vec<_> = (2..10)
            .map(|txn| {
                let tree = Arc::clone(&tree);
                thread::spawn(move || {
                    let req = point(txn, "k", LockMode::Read);
                    req.start(&tree, true).unwrap()
                })
            })
            .collect();
        while tree.pending_count() < 8 {
            thread::sleep(Duration::from_millis(1));
        }
        tree.release_all(TxnId(1)).unwrap();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), AcquireOutcome::Granted);
        }
        assert_eq!(tree.record_count(), 8);
    }

    #[test]
    fn test_wait_timeout_expires_and_dequeues() {
        let env = TestEnv::roomy();
        let tree = env.tree();

        let holder = point(1, "k", LockMode::Write);
        holder.start(&tree, false).unwrap();
        let req = point(2, "k", LockMode::Write);
        assert!(req.start(&tree, false).unwrap().is_pending());

        let begun = Instant::now();
        assert_eq!(
            req.wait_timeout(Duration::from_millis(30)),
            Err(LockTreeError::LockTimeout)
        );
        assert!(begun.elapsed() >= Duration::from_millis(30));
        assert_eq!(req.state(), RequestState::Complete);
        assert_eq!(tree.pending_count(), 0);

        // Nothing was charged while pending, so releasing the holder empties
        // the environment.
        tree.release_all(TxnId(1)).unwrap();
        assert!(env.manager.charged().is_zero());
        assert_eq!(env.manager.metrics().timeouts, 1);
    }

    #[test]
    fn test_wait_timeout_returns_grant_made_in_time() {
        let env = TestEnv::roomy();
        let tree = env.tree();

        let holder = point(1, "k", LockMode::Write);
        holder.start(&tree, false).unwrap();
        let req = point(2, "k", LockMode::Write);
        req.start(&tree, false).unwrap();

        let releaser = {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                tree.release_all(TxnId(1)).unwrap();
            })
        };

        assert_eq!(req.wait_timeout(Duration::from_secs(5)), Ok(()));
        releaser.join().unwrap();
    }

    #[test]
    fn test_cancel_wakes_blocked_waiter() {
        let env = TestEnv::roomy();
        let tree = env.tree();

        let holder = point(1, "k", LockMode::Write);
        holder.start(&tree, false).unwrap();
        let req = Arc::new(point(2, "k", LockMode::Write));
        req.start(&tree, false).unwrap();

        let waiter = {
            let req = Arc::clone(&req);
            thread::spawn(move || req.wait())
        };
        thread::sleep(Duration::from_millis(10));
        assert_eq!(req.cancel(), Err(LockTreeError::Cancelled));

        assert_eq!(waiter.join().unwrap(), Err(LockTreeError::Cancelled));
        assert_eq!(tree.pending_count(), 0);
        assert_eq!(env.manager.metrics().cancellations, 1);
    }

    #[test]
    fn test_cancel_after_completion_is_noop() {
        let env = TestEnv::roomy();
        let tree = env.tree();
        let req = point(1, "k", LockMode::Write);
        req.start(&tree, false).unwrap();

        assert_eq!(req.cancel(), Ok(()));
        assert_eq!(tree.record_count(), 1);
        assert_eq!(env.manager.metrics().cancellations, 0);
    }

    #[test]
    fn test_dropping_pending_request_unblocks_queue() {
        let env = TestEnv::roomy();
        let tree = env.tree();

        let early_reader = point(1, "a", LockMode::Read);
        early_reader.start(&tree, false).unwrap();
        let holder = point(2, "k", LockMode::Write);
        holder.start(&tree, false).unwrap();
        let writer = range(3, "a", "z", LockMode::Write);
        assert!(writer.start(&tree, false).unwrap().is_pending());
        let reader = point(4, "k", LockMode::Read);
        assert!(reader.start(&tree, false).unwrap().is_pending());

        tree.release_all(TxnId(2)).unwrap();
        assert_eq!(reader.state(), RequestState::Pending);

        drop(writer);
        assert_eq!(reader.result(), Some(Ok(())));
        assert_eq!(tree.pending_count(), 0);
    }

    #[test]
    fn test_blocking_start_returns_when_blocking_entry_cancelled() {
        let env = TestEnv::roomy();
        let tree = env.tree();

        let early_reader = point(1, "a", LockMode::Read);
        early_reader.start(&tree, false).unwrap();
        let holder = point(2, "k", LockMode::Write);
        holder.start(&tree, false).unwrap();
        let writer = Arc::new(range(3, "a", "z", LockMode::Write));
        assert!(writer.start(&tree, false).unwrap().is_pending());

        let reader = point(4, "k", LockMode::Read);
        assert!(reader.start(&tree, false).unwrap().is_pending());
        tree.release_all(TxnId(2)).unwrap();

        let canceller = {
            let writer = Arc::clone(&writer);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                writer.cancel()
            })
        };

        assert_eq!(reader.wait_timeout(Duration::from_secs(5)), Ok(()));
        assert_eq!(canceller.join().unwrap(), Err(LockTreeError::Cancelled));
    }

    #[test]
    fn test_restarting_request_is_invalid() {
        let env = TestEnv::roomy();
        let tree = env.tree();
        let req = point(1, "k", LockMode::Read);
        req.start(&tree, false).unwrap();

        assert!(matches!(
            req.start(&tree, false),
            Err(LockTreeError::InvalidArgument(_))
        ));
    }
}
