//! Application layer
//!
//! - `LockTreeManager`: resource ceilings, tree registry and poisoning
//! - `LockTree`: per-table records, pending queue and retry pass
//! - `LockRequest`: one acquisition attempt and its wait handle

pub mod lock_tree;
pub mod manager;
pub mod request;

pub use lock_tree::LockTree;
pub use manager::{LockTreeManager, ManagerStatus};
pub use request::LockRequest;
