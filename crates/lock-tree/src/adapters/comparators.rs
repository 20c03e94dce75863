//! Key comparators
//!
//! Stock orders for tables that do not bring their own.

use crate::ports::outbound::KeyComparator;
use std::cmp::Ordering;

/// Lexicographic byte order.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &str {
        "bytewise"
    }
}

/// Reverse lexicographic byte order, for descending indexes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReverseBytewiseComparator;

impl KeyComparator for ReverseBytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        b.cmp(a)
    }

    fn name(&self) -> &str {
        "reverse-bytewise"
    }
}
