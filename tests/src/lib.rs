//! # Range Lock Test Suite
//!
//! Unified test crate for the lock tree workspace.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs      # Environments, requests, panic log
//! └── integration/     # Cross-component scenarios
//!     ├── canonical.rs     # Out-of-locks after release, determinism
//!     ├── fairness.rs      # FIFO ordering, unbounded ranges
//!     ├── waiting.rs       # Blocking, timed and cancelled waits
//!     ├── poisoning.rs     # Panic path across trees
//!     ├── accounting.rs    # Resource conservation, random operation sequences
//!     └── concurrency.rs   # Multi-threaded stress
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p lock-tree-tests
//!
//! # By category
//! cargo test -p lock-tree-tests integration::concurrency::
//!
//! # Benchmarks
//! cargo bench -p lock-tree-tests
//! ```

pub mod fixtures;
pub mod integration;
