//! # Out-of-Locks After Release
//!
//! One admission slot, one writer, two queued readers. Releasing the writer
//! lets the first reader in; the second finds the slot taken and is refused
//! instead of queued again.

#[cfg(test)]
mod tests {
    use crate::fixtures::{point, range, TestEnv};
    use lock_tree::{AcquireOutcome, LockCost, LockMode, LockTreeError, RequestState, TxnId};

    const A: u64 = 1;
    const B: u64 = 2;
    const C: u64 = 3;

    #[test]
    fn test_second_reader_refused_after_release() {
        let env = TestEnv::new(1, 4096);
        let tree = env.tree();

        let a = point(A, "L", LockMode::Write);
        assert_eq!(a.start(&tree, false).unwrap(), AcquireOutcome::Granted);

        let b = point(B, "L", LockMode::Read);
        let c = point(C, "L", LockMode::Read);
        assert_eq!(b.start(&tree, false).unwrap(), AcquireOutcome::Pending);
        assert_eq!(c.start(&tree, false).unwrap(), AcquireOutcome::Pending);

        tree.release_all(TxnId(A)).unwrap();

        assert_eq!(b.state(), RequestState::Complete);
        assert_eq!(b.result(), Some(Ok(())));
        assert_eq!(c.state(), RequestState::Complete);
        assert_eq!(c.result(), Some(Err(LockTreeError::OutOfLocks)));

        // C is already complete; releasing B must not touch it.
        tree.release_all(TxnId(B)).unwrap();
        assert_eq!(c.result(), Some(Err(LockTreeError::OutOfLocks)));

        assert_eq!(tree.record_count(), 0);
        assert_eq!(tree.pending_count(), 0);
        assert_eq!(env.manager.charged(), LockCost::ZERO);
        tree.close().unwrap();
        env.manager.close().unwrap();
    }

    #[test]
    fn test_refusal_is_deterministic() {
        for _ in 0..25 {
            let env = TestEnv::new(1, 4096);
            let tree = env.tree();

            let a = point(A, "L", LockMode::Write);
            let b = point(B, "L", LockMode::Read);
            let c = point(C, "L", LockMode::Read);
            a.start(&tree, false).unwrap();
            b.start(&tree, false).unwrap();
            c.start(&tree, false).unwrap();
            tree.release_all(TxnId(A)).unwrap();

            assert_eq!(b.result(), Some(Ok(())));
            assert_eq!(c.result(), Some(Err(LockTreeError::OutOfLocks)));
        }
    }

    #[test]
    fn test_one_slot_grants_first_refuses_second() {
        let env = TestEnv::new(1, 4096);
        let tree = env.tree();

        let r1 = point(A, "a", LockMode::Write);
        let r2 = point(B, "b", LockMode::Write);

        assert!(r1.start(&tree, false).unwrap().is_granted());
        assert_eq!(
            r2.start(&tree, false).unwrap(),
            AcquireOutcome::Refused(LockTreeError::OutOfLocks)
        );
        assert_eq!(tree.pending_count(), 0);
    }

    #[test]
    fn test_memory_ceiling_refuses_like_count_ceiling() {
        // Room for exactly one record of a one-byte point key.
        let env = TestEnv::new(100, 96 + 2);
        let tree = env.tree();

        let first = point(A, "a", LockMode::Write);
        let second = point(B, "b", LockMode::Write);

        assert!(first.start(&tree, false).unwrap().is_granted());
        assert_eq!(
            second.start(&tree, false).unwrap(),
            AcquireOutcome::Refused(LockTreeError::OutOfLocks)
        );
    }

    #[test]
    fn test_point_and_degenerate_range_behave_identically() {
        let env = TestEnv::roomy();
        let tree = env.tree();

        let as_point = point(A, "k", LockMode::Write);
        let as_range = range(B, "k", "k", LockMode::Write);

        assert_eq!(as_point.range(), as_range.range());
        assert!(as_point.start(&tree, false).unwrap().is_granted());
        assert!(as_range.start(&tree, false).unwrap().is_pending());

        tree.release_all(TxnId(A)).unwrap();
        assert_eq!(as_range.result(), Some(Ok(())));

        let held = tree.locks_held_by(TxnId(B));
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].cost, lock_tree::LockCost::for_range(as_point.range()));
    }

    #[test]
    fn test_unlock_without_locks_is_noop() {
        let env = TestEnv::roomy();
        let tree = env.tree();
        let held = point(A, "k", LockMode::Read);
        held.start(&tree, false).unwrap();
        let before = env.manager.charged();

        tree.release_all(TxnId(42)).unwrap();

        assert_eq!(env.manager.charged(), before);
        assert_eq!(tree.record_count(), 1);
    }
}
