//! Global `tracing` subscriber setup.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use strata_core::config::RuntimeConfig;
use strata_core::errors::{StrataError, StrataResult};

/// Install the process-wide subscriber. `RUST_LOG` wins over
/// `config.log_filter`. Fails if a subscriber is already installed.
pub fn init_tracing(config: &RuntimeConfig) -> StrataResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|e| StrataError::ConfigError(format!("invalid log filter {}: {e}", config.log_filter)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| StrataError::ConfigError(format!("failed to initialize tracing subscriber: {e}")))?;

    tracing::info!(filter = %config.log_filter, json = config.json_logs, "tracing initialized");
    Ok(())
}
