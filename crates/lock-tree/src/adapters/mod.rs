//! Adapters Layer (Driven Adapters)
//!
//! Stock implementations of the outbound ports.
//!
//! - `BytewiseComparator`, `ReverseBytewiseComparator` - key orders
//! - `TableComparatorRegistry` - per-table comparator lookup
//! - `LoggingPanicHandler` - reports violations through `tracing`

pub mod comparator_registry;
pub mod comparators;
pub mod panic_handler;

pub use comparator_registry::TableComparatorRegistry;
pub use comparators::{BytewiseComparator, ReverseBytewiseComparator};
pub use panic_handler::LoggingPanicHandler;
