//! Lock Tree
//!
//! Per-table container of granted range locks plus the FIFO queue of
//! requests waiting on them.
//!
//! ## Granting
//!
//! A request is granted at once when no record of another transaction
//! conflicts with it and the manager admits its cost. A record conflict
//! queues the request; an admission refusal completes it with `OutOfLocks`
//! and never queues it.
//!
//! ## Retry pass
//!
//! `release_all` removes every record of one transaction, returns their cost
//! to the manager, then walks the queue once in arrival order. Each entry is
//! re-checked against the current records and the entries still waiting
//! ahead of it, so a grant made earlier in the pass is visible to later
//! entries and a later entry never overtakes an earlier incompatible one.
//! Withdrawing a pending request runs the same pass, since entries queued
//! behind it may only have been waiting on its claim.

use super::manager::LockTreeManager;
use super::request::{LockRequest, RequestShared};
use crate::algorithms::{
    blocked_by_queue, conflicting_owners, has_conflict, is_covered, is_well_formed, overlaps,
    QueuedClaim, RangeIndex, RecordHandle,
};
use crate::domain::entities::{AcquireOutcome, LockRecord, RequestState};
use crate::domain::errors::{LockTreeError, LockTreeResult};
use crate::domain::invariants::invariant_no_incompatible_overlap;
use crate::domain::value_objects::{KeyRange, LockCost, LockMode, RequestId, TableId, TreeId, TxnId};
use crate::ports::inbound::LockTreeApi;
use crate::ports::outbound::{SharedPanicHandler, SharedResolver};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Records of the table this tree is bound to.
struct TableBinding {
    table: TableId,
    index: RangeIndex,
    owners: HashMap<TxnId, Vec<RecordHandle>>,
}

struct PendingEntry {
    id: RequestId,
    request: Weak<RequestShared>,
}

struct TreeState {
    binding: Option<TableBinding>,
    pending: VecDeque<PendingEntry>,
    /// Cost of every live record, as charged to the manager.
    charged: LockCost,
}

/// Per-table lock container.
pub struct LockTree {
    id: TreeId,
    manager: Arc<LockTreeManager>,
    panic_handler: SharedPanicHandler,
    resolver: SharedResolver,
    state: Mutex<TreeState>,
    closed: AtomicBool,
    self_ref: Weak<LockTree>,
}

impl LockTree {
    /// Create an empty tree registered with `manager`.
    ///
    /// The tree binds to the table of the first request started against it.
    pub fn create(
        panic_handler: SharedPanicHandler,
        manager: &Arc<LockTreeManager>,
        resolver: SharedResolver,
    ) -> LockTreeResult<Arc<Self>> {
        Self::build(panic_handler, manager, resolver, None)
    }

    /// Create an empty tree already bound to `table`.
    pub fn create_for_table(
        panic_handler: SharedPanicHandler,
        manager: &Arc<LockTreeManager>,
        resolver: SharedResolver,
        table: TableId,
    ) -> LockTreeResult<Arc<Self>> {
        let comparator = resolver.resolve(table).ok_or_else(|| {
            LockTreeError::invalid(format!("no comparator registered for {}", table))
        })?;
        let binding = TableBinding {
            table,
            index: RangeIndex::new(comparator),
            owners: HashMap::new(),
        };
        Self::build(panic_handler, manager, resolver, Some(binding))
    }

    fn build(
        panic_handler: SharedPanicHandler,
        manager: &Arc<LockTreeManager>,
        resolver: SharedResolver,
        binding: Option<TableBinding>,
    ) -> LockTreeResult<Arc<Self>> {
        manager.ensure_healthy()?;
        let id = manager.next_tree_id();
        let table = binding.as_ref().map(|b| b.table);

        let tree = Arc::new_cyclic(|self_ref| Self {
            id,
            manager: Arc::clone(manager),
            panic_handler,
            resolver,
            state: Mutex::new(TreeState {
                binding,
                pending: VecDeque::new(),
                charged: LockCost::ZERO,
            }),
            closed: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        });

        // On failure the tree drops here and deregisters an id that was never
        // registered, which is a no-op.
        manager.register(id, table, Arc::downgrade(&tree))?;

        info!(tree = id.0, table = ?table.map(|t| t.0), "[lock-tree] Lock tree created");
        Ok(tree)
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    /// Table this tree is bound to, once bound.
    pub fn table(&self) -> Option<TableId> {
        self.state.lock().binding.as_ref().map(|b| b.table)
    }

    pub fn manager(&self) -> &Arc<LockTreeManager> {
        &self.manager
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Start `request` against this tree.
    ///
    /// Returns `Granted` or `Refused` for a request completed on the spot and
    /// `Pending` for one queued behind a conflict.
    pub fn try_acquire(&self, request: &LockRequest) -> LockTreeResult<AcquireOutcome> {
        let shared = request.shared();
        if self.manager.is_poisoned() {
            shared.complete(Err(LockTreeError::EnvironmentPoisoned));
            return Err(LockTreeError::EnvironmentPoisoned);
        }
        self.ensure_open()?;

        let mut guard = self.state.lock();
        if shared.state() != RequestState::Init {
            return Err(LockTreeError::invalid("lock request already started"));
        }

        let TreeState {
            binding,
            pending,
            charged,
        } = &mut *guard;
        let binding = self.bind(binding, shared.table)?;

        if !is_well_formed(&shared.range, binding.index.comparator()) {
            return Err(LockTreeError::invalid(format!(
                "range {} has low above high",
                shared.range
            )));
        }

        let metrics = self.manager.counters();
        metrics.record_started();

        if is_covered(&binding.index, shared.txn, &shared.range, shared.mode) {
            shared.complete(Ok(()));
            metrics.record_immediate_grant();
            debug!(
                tree = self.id.0,
                txn = %shared.txn,
                range = %shared.range,
                mode = %shared.mode,
                "[lock-tree] Lock already held"
            );
            return Ok(AcquireOutcome::Granted);
        }

        if has_conflict(&binding.index, shared.txn, &shared.range, shared.mode) {
            if !shared.mark_pending(self.self_ref.clone()) {
                return Err(LockTreeError::invalid("lock request already started"));
            }
            pending.push_back(PendingEntry {
                id: shared.id,
                request: Arc::downgrade(shared),
            });
            metrics.record_queued();
            debug!(
                tree = self.id.0,
                txn = %shared.txn,
                range = %shared.range,
                mode = %shared.mode,
                queued = pending.len(),
                "[lock-tree] Lock request queued behind conflict"
            );
            return Ok(AcquireOutcome::Pending);
        }

        match self.install(binding, charged, shared) {
            Ok(true) => {
                shared.complete(Ok(()));
                metrics.record_immediate_grant();
                debug!(
                    tree = self.id.0,
                    txn = %shared.txn,
                    range = %shared.range,
                    mode = %shared.mode,
                    "[lock-tree] Lock granted"
                );
                Ok(AcquireOutcome::Granted)
            }
            Ok(false) => {
                shared.complete(Err(LockTreeError::OutOfLocks));
                metrics.record_out_of_locks();
                warn!(
                    tree = self.id.0,
                    txn = %shared.txn,
                    range = %shared.range,
                    "[lock-tree] Lock refused: out of locks"
                );
                Ok(AcquireOutcome::Refused(LockTreeError::OutOfLocks))
            }
            Err(err) => {
                shared.complete(Err(err.clone()));
                Err(err)
            }
        }
    }

    /// Release every record held by `txn` and run one retry pass over the
    /// queue. Releasing a transaction with no records is a no-op apart from
    /// the retry pass.
    pub fn release_all(&self, txn: TxnId) -> LockTreeResult<()> {
        if self.manager.is_poisoned() {
            self.fail_pending(LockTreeError::EnvironmentPoisoned);
            return Err(LockTreeError::EnvironmentPoisoned);
        }
        self.ensure_open()?;

        let mut guard = self.state.lock();
        let TreeState {
            binding,
            pending,
            charged,
        } = &mut *guard;
        let Some(binding) = binding.as_mut() else {
            return Ok(());
        };

        let handles = binding.owners.remove(&txn).unwrap_or_default();
        let released = handles.len();
        let mut freed = LockCost::ZERO;
        for handle in handles {
            match binding.index.remove(handle) {
                Ok(record) => freed = freed.saturating_add(record.cost),
                Err(corruption) => {
                    *charged = subtract(*charged, freed);
                    self.manager.release(freed);
                    Self::fail_queue(pending, LockTreeError::EnvironmentPoisoned);
                    self.raise_panic(&corruption.to_string());
                    return Err(LockTreeError::EnvironmentPoisoned);
                }
            }
        }
        *charged = subtract(*charged, freed);
        self.manager.release(freed);

        if released > 0 {
            debug!(
                tree = self.id.0,
                %txn,
                released,
                freed_memory = freed.memory,
                "[lock-tree] Released locks"
            );
        }

        self.retry_pass(binding, pending, charged)
    }

    /// Close an empty tree. Fails with `Busy` while records or pending
    /// requests remain.
    pub fn close(&self) -> LockTreeResult<()> {
        self.manager.ensure_healthy()?;
        let mut state = self.state.lock();
        state.pending.retain(|e| e.request.strong_count() > 0);

        let records = state.binding.as_ref().map_or(0, |b| b.index.len());
        let waiting = state.pending.len();
        if records > 0 || waiting > 0 {
            return Err(LockTreeError::Busy(format!(
                "{} lock records and {} pending requests remain",
                records, waiting
            )));
        }
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(LockTreeError::invalid("lock tree already closed"));
        }
        drop(state);

        self.manager.deregister(self.id);
        info!(tree = self.id.0, "[lock-tree] Lock tree closed");
        Ok(())
    }

    /// Number of live lock records.
    pub fn record_count(&self) -> usize {
        self.state.lock().binding.as_ref().map_or(0, |b| b.index.len())
    }

    /// Number of queued requests whose owner still holds them.
    pub fn pending_count(&self) -> usize {
        self.state
            .lock()
            .pending
            .iter()
            .filter(|e| e.request.strong_count() > 0)
            .count()
    }

    /// Records held by `txn`, in key order.
    pub fn locks_held_by(&self, txn: TxnId) -> Vec<LockRecord> {
        let state = self.state.lock();
        let Some(binding) = state.binding.as_ref() else {
            return Vec::new();
        };
        binding
            .index
            .in_order()
            .into_iter()
            .filter(|(_, record)| record.owner == txn)
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// Whether `txn` holds a single record covering `range` in at least
    /// `mode`.
    pub fn holds(&self, txn: TxnId, range: &KeyRange, mode: LockMode) -> bool {
        let state = self.state.lock();
        state
            .binding
            .as_ref()
            .is_some_and(|b| is_covered(&b.index, txn, range, mode))
    }

    /// Transactions whose records block `txn` from taking `mode` on `range`.
    pub fn conflicting_owners(
        &self,
        txn: TxnId,
        range: &KeyRange,
        mode: LockMode,
    ) -> LockTreeResult<Vec<TxnId>> {
        self.manager.ensure_healthy()?;
        let state = self.state.lock();
        let Some(binding) = state.binding.as_ref() else {
            return Ok(Vec::new());
        };
        if !is_well_formed(range, binding.index.comparator()) {
            return Err(LockTreeError::invalid(format!(
                "range {} has low above high",
                range
            )));
        }
        Ok(conflicting_owners(&binding.index, txn, range, mode))
    }

    /// Every live record, in key order.
    pub fn records(&self) -> Vec<LockRecord> {
        let state = self.state.lock();
        state.binding.as_ref().map_or_else(Vec::new, |b| {
            b.index.in_order().into_iter().map(|(_, r)| r.clone()).collect()
        })
    }

    /// Cost of every live record in this tree.
    pub fn charged(&self) -> LockCost {
        self.state.lock().charged
    }

    /// Check the index structure and the no-incompatible-overlap rule.
    ///
    /// A violation poisons the environment.
    pub fn verify(&self) -> LockTreeResult<()> {
        self.manager.ensure_healthy()?;
        let mut guard = self.state.lock();
        let TreeState {
            binding, pending, ..
        } = &mut *guard;
        let Some(binding) = binding.as_ref() else {
            return Ok(());
        };

        let violation = match binding.index.check_structure() {
            Err(corruption) => Some(corruption.to_string()),
            Ok(()) => {
                let cmp = binding.index.comparator();
                let records: Vec<&LockRecord> = binding.index.iter().map(|(_, r)| r).collect();
                let compatible = invariant_no_incompatible_overlap(records, |a, b| {
                    overlaps(a, b, cmp)
                });
                (!compatible).then(|| "incompatible lock records overlap".to_string())
            }
        };

        match violation {
            None => Ok(()),
            Some(reason) => {
                Self::fail_queue(pending, LockTreeError::EnvironmentPoisoned);
                self.raise_panic(&reason);
                Err(LockTreeError::EnvironmentPoisoned)
            }
        }
    }

    /// Remove a pending request from the queue and complete it with
    /// `reason`, then retry the entries that were queued behind it. Returns
    /// the request's final result.
    pub(crate) fn withdraw(
        &self,
        shared: &Arc<RequestShared>,
        reason: LockTreeError,
    ) -> LockTreeResult<()> {
        let mut guard = self.state.lock();
        let queued = guard.pending.len();
        guard.pending.retain(|e| e.id != shared.id);
        let removed = guard.pending.len() < queued;

        if shared.complete(Err(reason.clone())) {
            let metrics = self.manager.counters();
            match reason {
                LockTreeError::LockTimeout => metrics.record_timeout(),
                _ => metrics.record_cancellation(),
            }
            debug!(
                tree = self.id.0,
                txn = %shared.txn,
                range = %shared.range,
                %reason,
                "[lock-tree] Pending lock request withdrawn"
            );
        }

        if removed && !guard.pending.is_empty() && !self.manager.is_poisoned() {
            let TreeState {
                binding,
                pending,
                charged,
            } = &mut *guard;
            if let Some(binding) = binding.as_mut() {
                if let Err(err) = self.retry_pass(binding, pending, charged) {
                    warn!(
                        tree = self.id.0,
                        %err,
                        "[lock-tree] Retry pass after withdrawal failed"
                    );
                }
            }
        }
        drop(guard);

        shared.result().unwrap_or(Err(reason))
    }

    fn ensure_open(&self) -> LockTreeResult<()> {
        if self.is_closed() {
            return Err(LockTreeError::invalid("lock tree is closed"));
        }
        Ok(())
    }

    fn bind<'s>(
        &self,
        slot: &'s mut Option<TableBinding>,
        table: TableId,
    ) -> LockTreeResult<&'s mut TableBinding> {
        match slot {
            Some(bound) if bound.table != table => {
                return Err(LockTreeError::invalid(format!(
                    "lock tree bound to {} cannot serve {}",
                    bound.table, table
                )));
            }
            Some(_) => {}
            None => {
                let comparator = self.resolver.resolve(table).ok_or_else(|| {
                    LockTreeError::invalid(format!("no comparator registered for {}", table))
                })?;
                debug!(
                    tree = self.id.0,
                    %table,
                    comparator = comparator.name(),
                    "[lock-tree] Lock tree bound to table"
                );
                *slot = Some(TableBinding {
                    table,
                    index: RangeIndex::new(comparator),
                    owners: HashMap::new(),
                });
            }
        }
        slot.as_mut()
            .ok_or_else(|| LockTreeError::invalid("lock tree has no table binding"))
    }

    /// Admit the request's cost and insert its record. `Ok(false)` means the
    /// manager refused admission and nothing changed.
    fn install(
        &self,
        binding: &mut TableBinding,
        charged: &mut LockCost,
        shared: &RequestShared,
    ) -> LockTreeResult<bool> {
        let record = LockRecord::new(shared.txn, shared.range.clone(), shared.mode);
        let cost = record.cost;
        if !self.manager.admit(cost)? {
            return Ok(false);
        }
        let handle = binding.index.insert(record);
        binding.owners.entry(shared.txn).or_default().push(handle);
        *charged = charged.saturating_add(cost);
        Ok(true)
    }

    fn retry_pass(
        &self,
        binding: &mut TableBinding,
        pending: &mut VecDeque<PendingEntry>,
        charged: &mut LockCost,
    ) -> LockTreeResult<()> {
        let metrics = self.manager.counters();
        metrics.record_retry_pass();

        let entries: Vec<PendingEntry> = pending.drain(..).collect();
        let mut waiting: Vec<Arc<RequestShared>> = Vec::new();
        let mut granted = 0usize;
        let mut refused = 0usize;

        let mut entries = entries.into_iter();
        while let Some(entry) = entries.next() {
            let Some(request) = entry.request.upgrade() else {
                continue;
            };
            if request.state() != RequestState::Pending {
                continue;
            }

            if is_covered(&binding.index, request.txn, &request.range, request.mode) {
                request.complete(Ok(()));
                metrics.record_retry_grant();
                granted += 1;
                continue;
            }

            let blocked = {
                let claims: Vec<QueuedClaim<'_>> = waiting.iter().map(|r| r.claim()).collect();
                has_conflict(&binding.index, request.txn, &request.range, request.mode)
                    || blocked_by_queue(
                        &binding.index,
                        &claims,
                        request.txn,
                        &request.range,
                        request.mode,
                    )
            };
            if blocked {
                waiting.push(request);
                pending.push_back(entry);
                continue;
            }

            match self.install(binding, charged, &request) {
                Ok(true) => {
                    request.complete(Ok(()));
                    metrics.record_retry_grant();
                    granted += 1;
                }
                Ok(false) => {
                    request.complete(Err(LockTreeError::OutOfLocks));
                    metrics.record_out_of_locks();
                    refused += 1;
                    warn!(
                        tree = self.id.0,
                        txn = %request.txn,
                        range = %request.range,
                        "[lock-tree] Pending lock refused: out of locks"
                    );
                }
                Err(err) => {
                    request.complete(Err(err.clone()));
                    for rest in entries.by_ref() {
                        if let Some(r) = rest.request.upgrade() {
                            r.complete(Err(err.clone()));
                        }
                    }
                    Self::fail_queue(pending, err.clone());
                    return Err(err);
                }
            }
        }

        if granted > 0 || refused > 0 {
            debug!(
                tree = self.id.0,
                granted,
                refused,
                still_pending = pending.len(),
                "[lock-tree] Retry pass finished"
            );
        }
        Ok(())
    }

    fn fail_pending(&self, err: LockTreeError) {
        let mut state = self.state.lock();
        Self::fail_queue(&mut state.pending, err);
    }

    fn fail_queue(pending: &mut VecDeque<PendingEntry>, err: LockTreeError) {
        for entry in pending.drain(..) {
            if let Some(request) = entry.request.upgrade() {
                request.complete(Err(err.clone()));
            }
        }
    }

    /// Poison the environment and report `reason` to this tree's handler only.
    fn raise_panic(&self, reason: &str) {
        self.manager.poison(reason);
        self.panic_handler.on_panic(reason);
    }
}

fn subtract(total: LockCost, cost: LockCost) -> LockCost {
    LockCost::new(
        total.locks.saturating_sub(cost.locks),
        total.memory.saturating_sub(cost.memory),
    )
}

impl LockTreeApi for LockTree {
    fn try_acquire(&self, request: &LockRequest) -> LockTreeResult<AcquireOutcome> {
        LockTree::try_acquire(self, request)
    }

    fn release_all(&self, txn: TxnId) -> LockTreeResult<()> {
        LockTree::release_all(self, txn)
    }

    fn close(&self) -> LockTreeResult<()> {
        LockTree::close(self)
    }

    fn record_count(&self) -> usize {
        LockTree::record_count(self)
    }

    fn pending_count(&self) -> usize {
        LockTree::pending_count(self)
    }
}

impl Drop for LockTree {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        let state = self.state.get_mut();
        Self::fail_queue(&mut state.pending, LockTreeError::Cancelled);
        if let Some(binding) = state.binding.as_mut() {
            binding.index.drain();
            binding.owners.clear();
        }
        let charged = std::mem::take(&mut state.charged);
        if !charged.is_zero() {
            self.manager.release(charged);
        }
        self.manager.deregister(self.id);
    }
}
