//! Range ordering under a table comparator
//!
//! Infinite bounds are handled here so that comparators only ever see
//! finite keys.

use crate::domain::value_objects::{KeyBound, KeyRange};
use crate::ports::outbound::KeyComparator;
use std::cmp::Ordering;

/// Compare two bounds.
pub fn compare_bounds(a: &KeyBound, b: &KeyBound, cmp: &dyn KeyComparator) -> Ordering {
    match (a, b) {
        (KeyBound::NegInfinity, KeyBound::NegInfinity) => Ordering::Equal,
        (KeyBound::PosInfinity, KeyBound::PosInfinity) => Ordering::Equal,
        (KeyBound::NegInfinity, _) | (_, KeyBound::PosInfinity) => Ordering::Less,
        (KeyBound::PosInfinity, _) | (_, KeyBound::NegInfinity) => Ordering::Greater,
        (KeyBound::Key(a), KeyBound::Key(b)) => cmp.compare(a, b),
    }
}

/// `low <= high`.
pub fn is_well_formed(range: &KeyRange, cmp: &dyn KeyComparator) -> bool {
    compare_bounds(range.low(), range.high(), cmp) != Ordering::Greater
}

/// Closed-interval intersection: `low1 <= high2 && low2 <= high1`.
pub fn overlaps(a: &KeyRange, b: &KeyRange, cmp: &dyn KeyComparator) -> bool {
    compare_bounds(a.low(), b.high(), cmp) != Ordering::Greater
        && compare_bounds(b.low(), a.high(), cmp) != Ordering::Greater
}

/// Whether `outer` covers every key of `inner`.
pub fn contains(outer: &KeyRange, inner: &KeyRange, cmp: &dyn KeyComparator) -> bool {
    compare_bounds(outer.low(), inner.low(), cmp) != Ordering::Greater
        && compare_bounds(inner.high(), outer.high(), cmp) != Ordering::Greater
}

/// Index order: by low bound, then by high bound.
pub fn compare_ranges(a: &KeyRange, b: &KeyRange, cmp: &dyn KeyComparator) -> Ordering {
    compare_bounds(a.low(), b.low(), cmp).then_with(|| compare_bounds(a.high(), b.high(), cmp))
}
