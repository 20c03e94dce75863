//! Outbound Ports (Driven Ports / SPI)
//!
//! What the lock tree needs from its host: a key order per table and a place
//! to report unrecoverable invariant violations.

use crate::domain::value_objects::TableId;
use std::cmp::Ordering;
use std::sync::Arc;

/// Total order over opaque key bytes.
///
/// The lock tree never inspects key content; every ordering decision goes
/// through this trait.
pub trait KeyComparator: Send + Sync {
    /// Compare two keys.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> KeyComparator for F
where
    F: Fn(&[u8], &[u8]) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self(a, b)
    }
}

/// Shared comparator handle.
pub type SharedComparator = Arc<dyn KeyComparator>;

/// Resolves the comparator for a table.
///
/// Returns `None` for a table the host does not know.
pub trait ComparatorResolver: Send + Sync {
    /// Look up the comparator of `table`.
    fn resolve(&self, table: TableId) -> Option<SharedComparator>;
}

impl<F> ComparatorResolver for F
where
    F: Fn(TableId) -> Option<SharedComparator> + Send + Sync,
{
    fn resolve(&self, table: TableId) -> Option<SharedComparator> {
        self(table)
    }
}

/// Shared resolver handle.
pub type SharedResolver = Arc<dyn ComparatorResolver>;

/// Receives internal invariant violations.
///
/// Called once per violation, by the tree or manager that detected it, after
/// the environment is poisoned.
pub trait PanicHandler: Send + Sync {
    /// Report a violation.
    fn on_panic(&self, reason: &str);
}

impl<F> PanicHandler for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_panic(&self, reason: &str) {
        self(reason)
    }
}

/// Shared panic handler handle.
pub type SharedPanicHandler = Arc<dyn PanicHandler>;
