//! Ports Layer
//!
//! Defines the interfaces (traits) for:
//! - Driving Ports (inbound) - API for transaction code
//! - Driven Ports (outbound) - Key order, comparator lookup and panic reporting

pub mod inbound;
pub mod outbound;

pub use inbound::{LockTreeApi, LockTreeManagerApi};
pub use outbound::{
    ComparatorResolver, KeyComparator, PanicHandler, SharedComparator, SharedPanicHandler,
    SharedResolver,
};
