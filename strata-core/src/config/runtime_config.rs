//! Background runtime configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How long shutdown waits for in-flight cycles before abandoning them.
    pub shutdown_grace_secs: u64,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Emit logs as JSON lines.
    pub json_logs: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 30,
            log_filter: "info".to_string(),
            json_logs: false,
        }
    }
}
