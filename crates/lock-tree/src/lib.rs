//! # Lock Tree
//!
//! Range-based transactional lock management.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Transactions take `Read` or `Write` locks on closed key ranges of a table.
//! Conflicting requests wait in a per-tree FIFO queue and are retried when a
//! transaction releases its locks. One manager enforces global ceilings on
//! the number of lock records and their estimated memory across every tree.
//!
//! | Concept | Type |
//! |---------|------|
//! | Environment-wide ceilings, poisoning | [`LockTreeManager`] |
//! | Per-table records and pending queue | [`LockTree`] |
//! | One acquisition attempt | [`LockRequest`] |
//! | Granted lock | [`LockRecord`] |
//!
//! ## Module Structure
//!
//! ```text
//! lock-tree/
//! ├── domain/          # Records, ranges, costs, errors, invariants
//! ├── algorithms/      # Range ordering, interval index, conflict query
//! ├── ports/           # API traits + comparator/panic dependencies
//! ├── adapters/        # Stock comparators, registry, logging panic handler
//! └── application/     # Manager, tree, request
//! ```
//!
//! ## Invariants
//!
//! - **INVARIANT-1**: Overlapping records of different owners are both `Read`
//! - **INVARIANT-2**: Manager totals equal the summed cost of live records
//! - **INVARIANT-3**: Request state only moves forward and `Complete` is final
//!
//! ## Usage Example
//!
//! ```ignore
//! use lock_tree::{
//!     KeyRange, LockMode, LockRequest, LockTreeManager, LoggingPanicHandler,
//!     TableComparatorRegistry, TableId, TxnId,
//! };
//! use std::sync::Arc;
//!
//! let manager = LockTreeManager::create(
//!     10_000,
//!     1 << 20,
//!     Arc::new(LoggingPanicHandler),
//!     Arc::new(TableComparatorRegistry::with_bytewise_default()),
//! )?;
//! let tree = manager.tree_for_table(TableId(1))?;
//!
//! let req = LockRequest::new(TableId(1), TxnId(7), KeyRange::new("a", "f"), LockMode::Write);
//! req.start(&tree, true)?;
//!
//! tree.release_all(TxnId(7))?;
//! ```

#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;

// Re-exports
pub use adapters::{
    BytewiseComparator, LoggingPanicHandler, ReverseBytewiseComparator, TableComparatorRegistry,
};
pub use algorithms::{RangeIndex, RecordHandle};
pub use application::{LockRequest, LockTree, LockTreeManager, ManagerStatus};
pub use config::LockTreeConfig;
pub use domain::{
    invariant_monotonic_state, invariant_no_incompatible_overlap,
    invariant_resource_conservation, AcquireOutcome, KeyBound, KeyRange, LockCost, LockMode,
    LockRecord, LockTreeError, LockTreeResult, RequestId, RequestState, TableId, TreeId, TxnId,
    LOCK_RECORD_OVERHEAD,
};
pub use metrics::{LockTreeMetrics, MetricsSnapshot};
pub use ports::{
    ComparatorResolver, KeyComparator, LockTreeApi, LockTreeManagerApi, PanicHandler,
    SharedComparator, SharedPanicHandler, SharedResolver,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
