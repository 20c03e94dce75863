//! Configuration for the lock tree subsystem
//!
//! The two resource ceilings are the only tunables. Both are required and
//! must be positive.

use crate::domain::errors::{LockTreeError, LockTreeResult};
use serde::{Deserialize, Serialize};
use std::env;

/// Default lock count ceiling.
pub const DEFAULT_MAX_LOCKS: u64 = 1_000_000;

/// Default lock memory ceiling (64 MiB).
pub const DEFAULT_MAX_LOCK_MEMORY: u64 = 64 * 1024 * 1024;

/// Resource ceilings shared by every lock tree of one manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockTreeConfig {
    /// Maximum number of lock records across all trees.
    pub max_locks: u64,
    /// Maximum estimated bytes of lock records across all trees.
    pub max_lock_memory: u64,
}

impl Default for LockTreeConfig {
    fn default() -> Self {
        Self {
            max_locks: DEFAULT_MAX_LOCKS,
            max_lock_memory: DEFAULT_MAX_LOCK_MEMORY,
        }
    }
}

impl LockTreeConfig {
    /// Build a config from explicit ceilings.
    pub fn new(max_locks: u64, max_lock_memory: u64) -> Self {
        Self {
            max_locks,
            max_lock_memory,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LT_MAX_LOCKS`: lock count ceiling (default: 1000000)
    /// - `LT_MAX_LOCK_MEMORY`: lock memory ceiling in bytes (default: 64 MiB)
    ///
    /// Unparseable values fall back to the defaults; zero is kept so that
    /// [`validate`](Self::validate) rejects it.
    pub fn from_env() -> Self {
        Self {
            max_locks: env::var("LT_MAX_LOCKS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_LOCKS),
            max_lock_memory: env::var("LT_MAX_LOCK_MEMORY")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_LOCK_MEMORY),
        }
    }

    /// Reject zero ceilings.
    pub fn validate(&self) -> LockTreeResult<()> {
        if self.max_locks == 0 {
            return Err(LockTreeError::invalid("max_locks must be positive"));
        }
        if self.max_lock_memory == 0 {
            return Err(LockTreeError::invalid("max_lock_memory must be positive"));
        }
        Ok(())
    }
}
