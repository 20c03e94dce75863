//! Telemetry configuration from environment variables.

use std::env;

/// Log output settings for a lock tree host process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,

    /// Filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` directive such as `lock_tree=debug`)
    pub log_level: String,

    /// Whether to write events to stdout at all
    pub console_output: bool,

    /// Whether to format events as JSON lines
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "lock-tree".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LT_SERVICE_NAME`: Service name (default: lock-tree)
    /// - `LT_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `LT_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `LT_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("LT_SERVICE_NAME").unwrap_or_else(|_| "lock-tree".to_string()),

            log_level: env::var("LT_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("LT_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: env::var("LT_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),
        }
    }

    /// Configuration for test binaries: warnings only, plain text.
    pub fn for_tests() -> Self {
        Self {
            service_name: "lock-tree-tests".to_string(),
            log_level: "warn".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}
