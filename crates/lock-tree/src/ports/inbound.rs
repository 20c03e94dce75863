//! Inbound Ports (Driving Ports)
//!
//! The API that transaction code drives: start requests against a tree,
//! release a transaction's locks, and tear trees and managers down.

use crate::application::manager::ManagerStatus;
use crate::application::request::LockRequest;
use crate::domain::entities::AcquireOutcome;
use crate::domain::errors::LockTreeResult;
use crate::domain::value_objects::{LockCost, TxnId};

/// Per-table lock container API (Driving Port)
pub trait LockTreeApi: Send + Sync {
    /// Start `request` against this tree.
    fn try_acquire(&self, request: &LockRequest) -> LockTreeResult<AcquireOutcome>;

    /// Release every lock held by `txn` and retry the pending queue.
    fn release_all(&self, txn: TxnId) -> LockTreeResult<()>;

    /// Close an empty tree.
    fn close(&self) -> LockTreeResult<()>;

    /// Number of live lock records.
    fn record_count(&self) -> usize;

    /// Number of queued requests.
    fn pending_count(&self) -> usize;
}

/// Resource admission API shared by every tree of one environment
/// (Driving Port)
pub trait LockTreeManagerApi: Send + Sync {
    /// Reserve `cost`; `Ok(false)` when a ceiling would be exceeded.
    fn admit(&self, cost: LockCost) -> LockTreeResult<bool>;

    /// Return `cost` to the totals.
    fn release(&self, cost: LockCost);

    /// Poison the environment.
    fn panic(&self, reason: &str);

    /// Close the manager once no tree is open.
    fn close(&self) -> LockTreeResult<()>;

    /// Current totals and ceilings.
    fn status(&self) -> ManagerStatus;
}
