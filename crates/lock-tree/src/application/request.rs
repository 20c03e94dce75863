//! Lock Request
//!
//! One attempt by one transaction to take one range in one mode. A request
//! moves `Init -> Pending -> Complete` (or straight to `Complete`) and never
//! leaves `Complete`.
//!
//! The caller owns the [`LockRequest`]; a lock tree queue only holds a weak
//! reference to its shared part, so dropping a pending request removes it
//! from the queue instead of leaving a dangling waiter.

use super::lock_tree::LockTree;
use crate::algorithms::QueuedClaim;
use crate::domain::entities::{AcquireOutcome, RequestState};
use crate::domain::errors::{LockTreeError, LockTreeResult};
use crate::domain::value_objects::{KeyBound, KeyRange, LockMode, RequestId, TableId, TxnId};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::debug;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

struct RequestSlot {
    state: RequestState,
    result: Option<LockTreeResult<()>>,
    tree: Weak<LockTree>,
}

/// Part of a request visible to the lock tree that queued it.
pub(crate) struct RequestShared {
    pub(crate) id: RequestId,
    pub(crate) table: TableId,
    pub(crate) txn: TxnId,
    pub(crate) range: KeyRange,
    pub(crate) mode: LockMode,
    slot: Mutex<RequestSlot>,
    cond: Condvar,
}

impl RequestShared {
    pub(crate) fn claim(&self) -> QueuedClaim<'_> {
        QueuedClaim {
            txn: self.txn,
            range: &self.range,
            mode: self.mode,
        }
    }

    pub(crate) fn state(&self) -> RequestState {
        self.slot.lock().state
    }

    pub(crate) fn result(&self) -> Option<LockTreeResult<()>> {
        self.slot.lock().result.clone()
    }

    /// `Init -> Pending`. Returns false if the request had already started.
    pub(crate) fn mark_pending(&self, tree: Weak<LockTree>) -> bool {
        let mut slot = self.slot.lock();
        if !slot.state.can_transition_to(RequestState::Pending) {
            return false;
        }
        slot.state = RequestState::Pending;
        slot.tree = tree;
        true
    }

    /// Fix the result and wake every waiter. Returns false, leaving the
    /// existing result untouched, if the request was already complete.
    pub(crate) fn complete(&self, result: LockTreeResult<()>) -> bool {
        let mut slot = self.slot.lock();
        if !slot.state.can_transition_to(RequestState::Complete) {
            return false;
        }
        slot.state = RequestState::Complete;
        slot.result = Some(result);
        slot.tree = Weak::new();
        self.cond.notify_all();
        true
    }

    fn wait_complete(&self) -> LockTreeResult<()> {
        let mut slot = self.slot.lock();
        loop {
            if let Some(result) = &slot.result {
                return result.clone();
            }
            self.cond.wait(&mut slot);
        }
    }

    fn wait_complete_until(&self, deadline: Instant) -> Option<LockTreeResult<()>> {
        let mut slot = self.slot.lock();
        loop {
            if let Some(result) = &slot.result {
                return Some(result.clone());
            }
            if self.cond.wait_until(&mut slot, deadline).timed_out() {
                return slot.result.clone();
            }
        }
    }

    fn tree(&self) -> Option<Arc<LockTree>> {
        self.slot.lock().tree.upgrade()
    }
}

/// A request for one range lock.
pub struct LockRequest {
    shared: Arc<RequestShared>,
}

impl LockRequest {
    /// Build a request in `Init`.
    pub fn new(table: TableId, txn: TxnId, range: KeyRange, mode: LockMode) -> Self {
        let id = RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            shared: Arc::new(RequestShared {
                id,
                table,
                txn,
                range,
                mode,
                slot: Mutex::new(RequestSlot {
                    state: RequestState::Init,
                    result: None,
                    tree: Weak::new(),
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Build a request for a single key.
    pub fn point(table: TableId, txn: TxnId, key: impl Into<KeyBound>, mode: LockMode) -> Self {
        Self::new(table, txn, KeyRange::point(key), mode)
    }

    pub fn id(&self) -> RequestId {
        self.shared.id
    }

    pub fn table(&self) -> TableId {
        self.shared.table
    }

    pub fn txn(&self) -> TxnId {
        self.shared.txn
    }

    pub fn range(&self) -> &KeyRange {
        &self.shared.range
    }

    pub fn mode(&self) -> LockMode {
        self.shared.mode
    }

    /// Current state.
    pub fn state(&self) -> RequestState {
        self.shared.state()
    }

    /// The final result once `Complete`, `None` before.
    pub fn result(&self) -> Option<LockTreeResult<()>> {
        self.shared.result()
    }

    /// Start the request against `tree`.
    ///
    /// With `blocking` set, a queued request waits here for its final result
    /// and the outcome is `Granted` or `Refused`; otherwise the caller gets
    /// `Pending` back and later calls [`wait`](Self::wait) or
    /// [`wait_timeout`](Self::wait_timeout).
    pub fn start(&self, tree: &LockTree, blocking: bool) -> LockTreeResult<AcquireOutcome> {
        let outcome = tree.try_acquire(self)?;
        if blocking && outcome.is_pending() {
            return Ok(match self.wait() {
                Ok(()) => AcquireOutcome::Granted,
                Err(err) => AcquireOutcome::Refused(err),
            });
        }
        Ok(outcome)
    }

    /// Block until the request completes.
    pub fn wait(&self) -> LockTreeResult<()> {
        if self.state() == RequestState::Init {
            return Err(LockTreeError::invalid("lock request has not been started"));
        }
        self.shared.wait_complete()
    }

    /// Block until the request completes or `timeout` elapses.
    ///
    /// On expiry the request is removed from its queue and completes with
    /// `LockTimeout`. A grant that races the expiry wins. A timeout too large
    /// to form a deadline waits without one.
    pub fn wait_timeout(&self, timeout: Duration) -> LockTreeResult<()> {
        if self.state() == RequestState::Init {
            return Err(LockTreeError::invalid("lock request has not been started"));
        }
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait();
        };
        if let Some(result) = self.shared.wait_complete_until(deadline) {
            return result;
        }

        debug!(
            request = self.shared.id.0,
            txn = %self.shared.txn,
            range = %self.shared.range,
            timeout_ms = timeout.as_millis() as u64,
            "[lock-tree] Pending lock request timed out"
        );
        self.withdraw(LockTreeError::LockTimeout)
    }

    /// Withdraw a pending request. Returns the final result, which is
    /// `Cancelled` unless the request had already completed.
    pub fn cancel(&self) -> LockTreeResult<()> {
        if self.state() == RequestState::Init {
            return Err(LockTreeError::invalid("lock request has not been started"));
        }
        self.withdraw(LockTreeError::Cancelled)
    }

    pub(crate) fn shared(&self) -> &Arc<RequestShared> {
        &self.shared
    }

    fn withdraw(&self, reason: LockTreeError) -> LockTreeResult<()> {
        match self.shared.tree() {
            Some(tree) => tree.withdraw(&self.shared, reason),
            None => {
                self.shared.complete(Err(reason.clone()));
                self.shared.result().unwrap_or(Err(reason))
            }
        }
    }
}

impl Drop for LockRequest {
    fn drop(&mut self) {
        if self.shared.state() == RequestState::Pending {
            let _ = self.withdraw(LockTreeError::Cancelled);
        }
    }
}

impl std::fmt::Debug for LockRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockRequest")
            .field("id", &self.shared.id)
            .field("table", &self.shared.table)
            .field("txn", &self.shared.txn)
            .field("range", &self.shared.range)
            .field("mode", &self.shared.mode)
            .field("state", &self.state())
            .finish()
    }
}
