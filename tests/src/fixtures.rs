//! Shared test fixtures.

use lock_tree::{
    KeyRange, LockMode, LockRequest, LockTree, LockTreeManager, PanicHandler,
    TableComparatorRegistry, TableId, TxnId,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Table used by single-table scenarios.
pub const TABLE: TableId = TableId(1);

/// Panic handler that keeps every reason.
#[derive(Default)]
pub struct PanicLog {
    reasons: Mutex<Vec<String>>,
}

impl PanicLog {
    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().clone()
    }
}

impl PanicHandler for PanicLog {
    fn on_panic(&self, reason: &str) {
        self.reasons.lock().push(reason.to_string());
    }
}

/// A manager with a bytewise registry and a panic log.
pub struct TestEnv {
    pub manager: Arc<LockTreeManager>,
    pub registry: Arc<TableComparatorRegistry>,
    pub panics: Arc<PanicLog>,
}

impl TestEnv {
    pub fn new(max_locks: u64, max_lock_memory: u64) -> Self {
        lock_telemetry::init_test_tracing();

        let registry = Arc::new(TableComparatorRegistry::with_bytewise_default());
        let panics = Arc::new(PanicLog::default());
        let manager = LockTreeManager::create(
            max_locks,
            max_lock_memory,
            panics.clone(),
            registry.clone(),
        )
        .expect("valid ceilings");

        Self {
            manager,
            registry,
            panics,
        }
    }

    /// Plenty of room for everything.
    pub fn roomy() -> Self {
        Self::new(1_000_000, 64 * 1024 * 1024)
    }

    /// An unbound tree sharing this environment's handlers.
    pub fn tree(&self) -> Arc<LockTree> {
        LockTree::create(self.panics.clone(), &self.manager, self.registry.clone())
            .expect("tree creation")
    }

    /// The registry tree for `table`.
    pub fn table_tree(&self, table: TableId) -> Arc<LockTree> {
        self.manager.tree_for_table(table).expect("tree for table")
    }
}

pub fn point(txn: u64, key: &str, mode: LockMode) -> LockRequest {
    LockRequest::point(TABLE, TxnId(txn), key, mode)
}

pub fn range(txn: u64, low: &str, high: &str, mode: LockMode) -> LockRequest {
    LockRequest::new(TABLE, TxnId(txn), KeyRange::new(low, high), mode)
}
