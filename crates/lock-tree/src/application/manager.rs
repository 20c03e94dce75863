//! Lock Tree Manager
//!
//! Process-wide owner of every lock tree in one environment. Holds the
//! running resource totals against the two ceilings, the registry of open
//! trees, and the poisoned flag.
//!
//! Lock order: a tree's state lock may be held while calling into the
//! manager; the manager never calls into a tree while holding its own locks.

use super::lock_tree::LockTree;
use crate::config::LockTreeConfig;
use crate::domain::errors::{LockTreeError, LockTreeResult};
use crate::domain::value_objects::{LockCost, TableId, TreeId};
use crate::metrics::{LockTreeMetrics, MetricsSnapshot};
use crate::ports::inbound::LockTreeManagerApi;
use crate::ports::outbound::{SharedPanicHandler, SharedResolver};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info};

/// Running totals and ceilings, guarded together.
#[derive(Debug)]
struct ResourceTotals {
    curr_locks: u64,
    curr_memory: u64,
    max_locks: u64,
    max_memory: u64,
}

struct TreeEntry {
    table: Option<TableId>,
    tree: Weak<LockTree>,
}

/// Point-in-time view of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStatus {
    /// Lock records currently charged.
    pub curr_locks: u64,
    /// Lock count ceiling.
    pub max_locks: u64,
    /// Bytes currently charged.
    pub curr_lock_memory: u64,
    /// Lock memory ceiling.
    pub max_lock_memory: u64,
    /// Trees registered and not yet closed.
    pub open_trees: usize,
    /// Whether the panic path has fired.
    pub poisoned: bool,
}

/// Owner of all lock trees of one environment.
pub struct LockTreeManager {
    totals: Mutex<ResourceTotals>,
    trees: Mutex<HashMap<TreeId, TreeEntry>>,
    /// Serialises lookup-or-create in `tree_for_table`.
    table_creation: Mutex<()>,
    poisoned: AtomicBool,
    closed: AtomicBool,
    next_tree_id: AtomicU64,
    panic_handler: SharedPanicHandler,
    resolver: SharedResolver,
    metrics: LockTreeMetrics,
    self_ref: Weak<LockTreeManager>,
}

impl LockTreeManager {
    /// Create a manager with zeroed totals.
    ///
    /// Fails with `InvalidArgument` if either ceiling is zero.
    pub fn create(
        max_locks: u64,
        max_lock_memory: u64,
        panic_handler: SharedPanicHandler,
        resolver: SharedResolver,
    ) -> LockTreeResult<Arc<Self>> {
        Self::from_config(
            &LockTreeConfig::new(max_locks, max_lock_memory),
            panic_handler,
            resolver,
        )
    }

    /// Create a manager from a validated config.
    pub fn from_config(
        config: &LockTreeConfig,
        panic_handler: SharedPanicHandler,
        resolver: SharedResolver,
    ) -> LockTreeResult<Arc<Self>> {
        config.validate()?;

        info!(
            max_locks = config.max_locks,
            max_lock_memory = config.max_lock_memory,
            "[lock-tree] Creating lock tree manager"
        );

        Ok(Arc::new_cyclic(|self_ref| Self {
            totals: Mutex::new(ResourceTotals {
                curr_locks: 0,
                curr_memory: 0,
                max_locks: config.max_locks,
                max_memory: config.max_lock_memory,
            }),
            trees: Mutex::new(HashMap::new()),
            table_creation: Mutex::new(()),
            poisoned: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            next_tree_id: AtomicU64::new(1),
            panic_handler,
            resolver,
            metrics: LockTreeMetrics::new(),
            self_ref: self_ref.clone(),
        }))
    }

    /// Close the manager. Fails with `Busy` while any tree is open.
    pub fn close(&self) -> LockTreeResult<()> {
        self.ensure_healthy()?;
        let trees = self.trees.lock();
        let open = trees
            .values()
            .filter(|entry| entry.tree.strong_count() > 0)
            .count();
        if open > 0 {
            return Err(LockTreeError::Busy(format!(
                "{} lock trees still open",
                open
            )));
        }
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(LockTreeError::invalid("lock tree manager already closed"));
        }
        drop(trees);

        info!("[lock-tree] Lock tree manager closed");
        Ok(())
    }

    /// Reserve `cost` against both ceilings.
    ///
    /// Returns `Ok(false)` with totals unchanged if either ceiling would be
    /// exceeded.
    pub fn admit(&self, cost: LockCost) -> LockTreeResult<bool> {
        self.ensure_healthy()?;
        let mut totals = self.totals.lock();

        let locks = totals.curr_locks.checked_add(cost.locks);
        let memory = totals.curr_memory.checked_add(cost.memory);
        match (locks, memory) {
            (Some(locks), Some(memory))
                if locks <= totals.max_locks && memory <= totals.max_memory =>
            {
                totals.curr_locks = locks;
                totals.curr_memory = memory;
                Ok(true)
            }
            _ => {
                debug!(
                    curr_locks = totals.curr_locks,
                    max_locks = totals.max_locks,
                    curr_memory = totals.curr_memory,
                    max_memory = totals.max_memory,
                    "[lock-tree] Admission refused"
                );
                Ok(false)
            }
        }
    }

    /// Return `cost` to the totals.
    ///
    /// Releasing more than is charged is an accounting violation and poisons
    /// the environment.
    pub fn release(&self, cost: LockCost) {
        let mut totals = self.totals.lock();
        if totals.curr_locks < cost.locks || totals.curr_memory < cost.memory {
            let reason = format!(
                "lock accounting underflow: releasing {} locks / {} bytes with {} / {} charged",
                cost.locks, cost.memory, totals.curr_locks, totals.curr_memory
            );
            drop(totals);
            self.panic(&reason);
            return;
        }
        totals.curr_locks -= cost.locks;
        totals.curr_memory -= cost.memory;
    }

    /// Mark the environment poisoned and report `reason`.
    pub fn panic(&self, reason: &str) {
        self.poison(reason);
        self.panic_handler.on_panic(reason);
    }

    /// Set the poisoned flag without calling the manager's handler. Used by
    /// trees, which report violations to their own handler.
    pub(crate) fn poison(&self, reason: &str) {
        let first = !self.poisoned.swap(true, Ordering::SeqCst);
        error!(first, reason, "[lock-tree] Lock tree environment poisoned");
    }

    /// Whether the panic path has fired.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Fail fast on a poisoned or closed manager.
    pub fn ensure_healthy(&self) -> LockTreeResult<()> {
        if self.is_poisoned() {
            return Err(LockTreeError::EnvironmentPoisoned);
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(LockTreeError::invalid("lock tree manager is closed"));
        }
        Ok(())
    }

    /// Change the lock count ceiling. Must be positive and not below the
    /// current count.
    pub fn set_max_locks(&self, max_locks: u64) -> LockTreeResult<()> {
        self.ensure_healthy()?;
        let mut totals = self.totals.lock();
        if max_locks == 0 || max_locks < totals.curr_locks {
            return Err(LockTreeError::invalid(format!(
                "max_locks {} must be positive and at least the {} locks held",
                max_locks, totals.curr_locks
            )));
        }
        totals.max_locks = max_locks;
        Ok(())
    }

    /// Change the lock memory ceiling. Must be positive and not below the
    /// current usage.
    pub fn set_max_lock_memory(&self, max_lock_memory: u64) -> LockTreeResult<()> {
        self.ensure_healthy()?;
        let mut totals = self.totals.lock();
        if max_lock_memory == 0 || max_lock_memory < totals.curr_memory {
            return Err(LockTreeError::invalid(format!(
                "max_lock_memory {} must be positive and at least the {} bytes held",
                max_lock_memory, totals.curr_memory
            )));
        }
        totals.max_memory = max_lock_memory;
        Ok(())
    }

    /// Current totals, ceilings and tree count.
    pub fn status(&self) -> ManagerStatus {
        let open_trees = self.trees.lock().len();
        let totals = self.totals.lock();
        ManagerStatus {
            curr_locks: totals.curr_locks,
            max_locks: totals.max_locks,
            curr_lock_memory: totals.curr_memory,
            max_lock_memory: totals.max_memory,
            open_trees,
            poisoned: self.is_poisoned(),
        }
    }

    /// Charged totals as a cost.
    pub fn charged(&self) -> LockCost {
        let totals = self.totals.lock();
        LockCost::new(totals.curr_locks, totals.curr_memory)
    }

    /// Copy of the request outcome counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The open tree bound to `table`, created with this manager's panic
    /// handler and resolver if none exists yet.
    pub fn tree_for_table(&self, table: TableId) -> LockTreeResult<Arc<LockTree>> {
        self.ensure_healthy()?;
        let _creation = self.table_creation.lock();

        // Upgraded handles are dropped outside the registry lock: dropping the
        // last one runs the tree's teardown, which deregisters.
        let candidates: Vec<Arc<LockTree>> = {
            let trees = self.trees.lock();
            trees
                .values()
                .filter(|entry| entry.table == Some(table))
                .filter_map(|entry| entry.tree.upgrade())
                .collect()
        };
        if let Some(tree) = candidates.into_iter().find(|tree| !tree.is_closed()) {
            return Ok(tree);
        }

        let manager = self
            .self_ref
            .upgrade()
            .ok_or_else(|| LockTreeError::invalid("lock tree manager is being dropped"))?;
        let tree = LockTree::create_for_table(
            self.panic_handler.clone(),
            &manager,
            self.resolver.clone(),
            table,
        )?;
        debug!(%table, tree = tree.id().0, "[lock-tree] Created lock tree for table");
        Ok(tree)
    }

    pub(crate) fn counters(&self) -> &LockTreeMetrics {
        &self.metrics
    }

    pub(crate) fn next_tree_id(&self) -> TreeId {
        TreeId(self.next_tree_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn register(
        &self,
        id: TreeId,
        table: Option<TableId>,
        tree: Weak<LockTree>,
    ) -> LockTreeResult<()> {
        self.ensure_healthy()?;
        let mut trees = self.trees.lock();
        // Re-checked under the registry lock so a concurrent close cannot miss
        // this tree.
        if self.closed.load(Ordering::SeqCst) {
            return Err(LockTreeError::invalid("lock tree manager is closed"));
        }
        trees.insert(id, TreeEntry { table, tree });
        Ok(())
    }

    pub(crate) fn deregister(&self, id: TreeId) {
        self.trees.lock().remove(&id);
    }
}

impl LockTreeManagerApi for LockTreeManager {
    fn admit(&self, cost: LockCost) -> LockTreeResult<bool> {
        LockTreeManager::admit(self, cost)
    }

    fn release(&self, cost: LockCost) {
        LockTreeManager::release(self, cost)
    }

    fn panic(&self, reason: &str) {
        LockTreeManager::panic(self, reason)
    }

    fn close(&self) -> LockTreeResult<()> {
        LockTreeManager::close(self)
    }

    fn status(&self) -> ManagerStatus {
        LockTreeManager::status(self)
    }
}
