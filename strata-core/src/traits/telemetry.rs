use tracing::info;

use crate::models::LifecycleEvent;

/// Receiver for lifecycle events.
pub trait ITelemetrySink: Send + Sync {
    fn emit(&self, event: &LifecycleEvent);
}

/// Writes lifecycle events as structured tracing records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl ITelemetrySink for TracingTelemetry {
    fn emit(&self, event: &LifecycleEvent) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        info!(
            target: "strata::lifecycle",
            event = event.name(),
            payload = %payload,
            "lifecycle event"
        );
    }
}
