/// Errors from the text-generation capability and the guards around it.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("circuit open after {failures} consecutive failures, retry in {retry_in_secs}s")]
    CircuitOpen { failures: u32, retry_in_secs: u64 },

    #[error("{task} timed out after {timeout_ms}ms")]
    Timeout { task: String, timeout_ms: u64 },

    #[error("provider {provider} failed: {reason}")]
    ProviderFailed { provider: String, reason: String },

    #[error("malformed {task} output: {reason}")]
    MalformedOutput { task: String, reason: String },

    #[error("rate budget exhausted, pacing would wait {wait_ms}ms")]
    RateLimited { wait_ms: u64 },
}

impl GenerationError {
    /// Whether this error counts against the circuit breaker.
    ///
    /// Short-circuits and local pacing rejections never reached the provider.
    pub fn counts_as_failure(&self) -> bool {
        !matches!(self, Self::CircuitOpen { .. } | Self::RateLimited { .. })
    }
}
