//! Algorithms module for the lock tree
//!
//! Contains:
//! - Range ordering under a table comparator (infinite bounds included)
//! - The arena-backed interval tree of lock records
//! - The conflict query and queue-fairness check

pub mod conflict;
pub mod ordering;
pub mod range_index;

pub use conflict::{blocked_by_queue, conflicting_owners, has_conflict, is_covered, QueuedClaim};
pub use ordering::{compare_bounds, contains, is_well_formed, overlaps};
pub use range_index::{RangeIndex, RecordHandle};
