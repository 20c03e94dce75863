//! # Domain Errors
//!
//! Error taxonomy for the lock tree subsystem.
//!
//! Conflict and admission outcomes are ordinary control flow and surface as
//! request results. Only structural corruption goes through the panic path,
//! after which every operation reports [`LockTreeError::EnvironmentPoisoned`].

use thiserror::Error;

/// Lock tree error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockTreeError {
    /// Malformed input: zero ceilings, inverted range, closed handle,
    /// table mismatch, restarting a request.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Granting the lock would exceed the lock count or lock memory ceiling.
    #[error("Out of locks: resource ceiling would be exceeded")]
    OutOfLocks,

    /// Close attempted while resources are still live.
    #[error("Busy: {0}")]
    Busy(String),

    /// The manager's panic path fired; the environment must be recreated.
    #[error("Environment poisoned by an internal invariant violation")]
    EnvironmentPoisoned,

    /// A timed wait expired before the request was granted.
    #[error("Lock request timed out while pending")]
    LockTimeout,

    /// The owner withdrew the request while it was pending.
    #[error("Lock request cancelled while pending")]
    Cancelled,
}

impl LockTreeError {
    /// Shorthand for [`LockTreeError::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// True for results that end a request without a grant.
    pub fn is_terminal_refusal(&self) -> bool {
        matches!(
            self,
            Self::OutOfLocks | Self::EnvironmentPoisoned | Self::LockTimeout | Self::Cancelled
        )
    }
}

/// Result alias used across the crate.
pub type LockTreeResult<T> = Result<T, LockTreeError>;

/// Structural inconsistency detected inside the range index.
///
/// Never returned to callers directly; the tree converts it into a panic of
/// the owning manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Range index corrupted: {0}")]
pub struct IndexCorruption(pub String);
