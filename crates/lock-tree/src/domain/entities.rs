//! Core entities for the lock tree
//!
//! Lock records, request states and acquisition outcomes.

use super::errors::LockTreeError;
use super::value_objects::{KeyRange, LockCost, LockMode, TxnId};
use serde::{Deserialize, Serialize};

/// "Transaction `owner` holds `mode` on `range`."
///
/// Owned exclusively by the lock tree that granted it; destroyed only by an
/// unlock-by-transaction sweep or tree teardown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Owning transaction.
    pub owner: TxnId,
    /// Locked range.
    pub range: KeyRange,
    /// Lock mode.
    pub mode: LockMode,
    /// Cost charged to the manager when the record was granted.
    pub cost: LockCost,
}

impl LockRecord {
    /// Build a record and compute its cost from the range.
    pub fn new(owner: TxnId, range: KeyRange, mode: LockMode) -> Self {
        let cost = LockCost::for_range(&range);
        Self {
            owner,
            range,
            mode,
            cost,
        }
    }

    /// Whether this record blocks `txn` from taking `mode` on an
    /// overlapping range.
    pub fn blocks(&self, txn: TxnId, mode: LockMode) -> bool {
        self.owner != txn && !self.mode.compatible_with(mode)
    }
}

/// Lock request state machine.
///
/// ```text
/// [Init] ──start──→ [Pending] ──retry pass / wait expiry / cancel──→ [Complete]
///    │                                                                   ↑
///    └──────────────── grant or refusal ─────────────────────────────────┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
    /// Constructed, not started.
    Init,
    /// Queued in a lock tree behind a conflicting holder.
    Pending,
    /// Terminal; the result is fixed.
    Complete,
}

impl RequestState {
    /// Whether moving to `next` respects the state machine.
    pub fn can_transition_to(self, next: RequestState) -> bool {
        matches!(
            (self, next),
            (RequestState::Init, RequestState::Pending)
                | (RequestState::Init, RequestState::Complete)
                | (RequestState::Pending, RequestState::Complete)
        )
    }
}

/// Outcome of starting a request against a lock tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The lock is held; the request is complete with success.
    Granted,
    /// The request is queued behind a conflict.
    Pending,
    /// The request completed without a grant.
    Refused(LockTreeError),
}

impl AcquireOutcome {
    /// True for `Granted`.
    pub fn is_granted(&self) -> bool {
        matches!(self, AcquireOutcome::Granted)
    }

    /// True for `Pending`.
    pub fn is_pending(&self) -> bool {
        matches!(self, AcquireOutcome::Pending)
    }
}
