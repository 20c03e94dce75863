//! # Lock Telemetry
//!
//! Tracing setup for processes hosting lock trees.
//!
//! The `lock-tree` crate emits `tracing` events with a `[lock-tree]` prefix
//! and structured fields (`tree`, `txn`, `range`, `mode`). This crate installs
//! the subscriber that filters and formats them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lock_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("Failed to init telemetry");
//!     // lock tree events are now filtered and written to stdout
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LT_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter |
//! | `LT_JSON_LOGS` | `false` | JSON lines instead of text |
//! | `LT_CONSOLE_OUTPUT` | `true` | Write events to stdout |
//! | `LT_SERVICE_NAME` | `lock-tree` | Name on the startup event |

mod config;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::{build_filter, init_test_tracing, init_tracing};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber was already installed, or installation failed.
    #[error("Failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),

    /// The log filter directive did not parse.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install logging for the process.
///
/// Returns a guard to hold for the lifetime of the application; dropping it
/// logs the shutdown.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    init_tracing(&config)?;
    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Guard that marks the telemetry lifetime.
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}
