//! # Domain Invariants
//!
//! Rules that must hold at every quiescent point of a lock tree environment.

use super::entities::{LockRecord, RequestState};
use super::value_objects::{KeyRange, LockCost};

/// INVARIANT-1: No incompatible overlap.
///
/// For any two records with overlapping ranges and different owners, both are
/// `Read`. The overlap test is supplied by the caller since it depends on the
/// table comparator.
pub fn invariant_no_incompatible_overlap<'a, I, F>(records: I, overlaps: F) -> bool
where
    I: IntoIterator<Item = &'a LockRecord>,
    F: Fn(&KeyRange, &KeyRange) -> bool,
{
    let records: Vec<&LockRecord> = records.into_iter().collect();

    for i in 0..records.len() {
        for j in (i + 1)..records.len() {
            let (a, b) = (records[i], records[j]);
            if a.owner == b.owner {
                continue;
            }
            if a.mode.compatible_with(b.mode) {
                continue;
            }
            if overlaps(&a.range, &b.range) {
                return false;
            }
        }
    }

    true
}

/// INVARIANT-2: Resource conservation.
///
/// The manager's running totals equal the summed cost of every live record.
pub fn invariant_resource_conservation<'a, I>(totals: LockCost, records: I) -> bool
where
    I: IntoIterator<Item = &'a LockRecord>,
{
    let sum = records
        .into_iter()
        .fold(LockCost::ZERO, |acc, record| acc.saturating_add(record.cost));
    sum == totals
}

/// INVARIANT-3: Monotonic request state.
///
/// Every observed step follows the state machine; nothing leaves `Complete`.
pub fn invariant_monotonic_state(history: &[RequestState]) -> bool {
    history
        .windows(2)
        .all(|pair| pair[0] == pair[1] || pair[0].can_transition_to(pair[1]))
}
