//! Comparator Registry Adapter
//!
//! Implements the `ComparatorResolver` port with an in-memory table map.

use super::comparators::BytewiseComparator;
use crate::domain::value_objects::TableId;
use crate::ports::outbound::{ComparatorResolver, SharedComparator};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Table-to-comparator map with an optional fallback.
pub struct TableComparatorRegistry {
    /// Registered orders: table -> comparator.
    tables: RwLock<HashMap<TableId, SharedComparator>>,
    /// Used for tables with no registration.
    fallback: Option<SharedComparator>,
}

impl TableComparatorRegistry {
    /// Registry that resolves only registered tables.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            fallback: None,
        }
    }

    /// Registry that falls back to bytewise order.
    pub fn with_bytewise_default() -> Self {
        Self::with_default(Arc::new(BytewiseComparator))
    }

    /// Registry that falls back to `comparator`.
    pub fn with_default(comparator: SharedComparator) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            fallback: Some(comparator),
        }
    }

    /// Register or replace the order of `table`.
    ///
    /// Trees already bound to `table` keep the comparator they resolved.
    pub fn register(&self, table: TableId, comparator: SharedComparator) {
        debug!(%table, comparator = comparator.name(), "[lock-tree] Registered comparator");
        self.tables.write().insert(table, comparator);
    }

    /// Forget the order of `table`.
    pub fn unregister(&self, table: TableId) -> bool {
        self.tables.write().remove(&table).is_some()
    }

    /// Number of explicit registrations.
    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

impl Default for TableComparatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComparatorResolver for TableComparatorRegistry {
    fn resolve(&self, table: TableId) -> Option<SharedComparator> {
        self.tables
            .read()
            .get(&table)
            .cloned()
            .or_else(|| self.fallback.clone())
    }
}
