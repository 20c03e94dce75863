//! # Integration Tests
//!
//! Scenarios that drive a manager, its trees and their requests together.

pub mod canonical;
pub mod concurrency;
pub mod waiting;
