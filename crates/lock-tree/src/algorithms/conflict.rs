//! Conflict Query
//!
//! Decides whether a proposed `(txn, range, mode)` may be granted against the
//! records of one tree, and during a retry pass against requests still
//! waiting ahead of it.

use super::ordering::{contains, overlaps};
use super::range_index::RangeIndex;
use crate::domain::value_objects::{KeyRange, LockMode, TxnId};

/// A lock still waiting in the queue, seen by requests behind it.
#[derive(Debug, Clone, Copy)]
pub struct QueuedClaim<'a> {
    /// Waiting transaction.
    pub txn: TxnId,
    /// Requested range.
    pub range: &'a KeyRange,
    /// Requested mode.
    pub mode: LockMode,
}

/// Distinct owners whose records block `txn` from taking `mode` on `range`,
/// in ascending order.
pub fn conflicting_owners(
    index: &RangeIndex,
    txn: TxnId,
    range: &KeyRange,
    mode: LockMode,
) -> Vec<TxnId> {
    let mut owners: Vec<TxnId> = index
        .overlapping(range)
        .into_iter()
        .filter_map(|handle| index.get(handle))
        .filter(|record| record.blocks(txn, mode))
        .map(|record| record.owner)
        .collect();
    owners.sort();
    owners.dedup();
    owners
}

/// Whether any record blocks the proposed lock.
pub fn has_conflict(index: &RangeIndex, txn: TxnId, range: &KeyRange, mode: LockMode) -> bool {
    index
        .overlapping(range)
        .into_iter()
        .filter_map(|handle| index.get(handle))
        .any(|record| record.blocks(txn, mode))
}

/// Whether `txn` already holds a single record that covers `range` with a
/// mode at least as strong as `mode`.
pub fn is_covered(index: &RangeIndex, txn: TxnId, range: &KeyRange, mode: LockMode) -> bool {
    let cmp = index.comparator();
    index
        .overlapping(range)
        .into_iter()
        .filter_map(|handle| index.get(handle))
        .any(|record| {
            record.owner == txn && record.mode.dominates(mode) && contains(&record.range, range, cmp)
        })
}

/// Whether an earlier queued claim of another transaction would be jumped by
/// granting `(txn, range, mode)` now.
pub fn blocked_by_queue(
    index: &RangeIndex,
    ahead: &[QueuedClaim<'_>],
    txn: TxnId,
    range: &KeyRange,
    mode: LockMode,
) -> bool {
    let cmp = index.comparator();
    ahead.iter().any(|claim| {
        claim.txn != txn
            && !claim.mode.compatible_with(mode)
            && overlaps(claim.range, range, cmp)
    })
}
