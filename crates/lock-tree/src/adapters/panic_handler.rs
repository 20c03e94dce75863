//! Panic handler that reports through `tracing`.

use crate::ports::outbound::PanicHandler;
use tracing::error;

/// Logs every invariant violation at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingPanicHandler;

impl PanicHandler for LoggingPanicHandler {
    fn on_panic(&self, reason: &str) {
        error!(reason, "[lock-tree] Internal invariant violated; environment must be recreated");
    }
}
