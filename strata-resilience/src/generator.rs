//! Generation client shared by every engine.
//!
//! Order per call: breaker admission, rate-limit pacing, dispatch under a
//! timeout, then (for [`ResilientGenerator::generate_validated`]) strict
//! parsing and validation. A provider error, a timeout and a malformed output
//! all count as breaker failures. Success is only recorded once the output has
//! been accepted. A call dropped mid-flight records nothing.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use strata_core::config::ResilienceConfig;
use strata_core::errors::{GenerationError, StrataError, StrataResult};
use strata_core::models::{GenerationRequest, GenerationResponse, LifecycleEvent};
use strata_core::traits::{IGenerationProvider, ITelemetrySink};
use strata_core::Clock;

use crate::breaker::{Admission, BreakerTransition, CircuitBreaker};
use crate::rate_limiter::RateLimiter;
use crate::tokens::TokenEstimator;

pub struct ResilientGenerator {
    provider: Arc<dyn IGenerationProvider>,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<RateLimiter>,
    tokens: TokenEstimator,
    timeout: Duration,
    telemetry: Arc<dyn ITelemetrySink>,
}

impl ResilientGenerator {
    pub fn new(
        provider: Arc<dyn IGenerationProvider>,
        breaker: Arc<CircuitBreaker>,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
        telemetry: Arc<dyn ITelemetrySink>,
    ) -> Self {
        Self {
            provider,
            breaker,
            limiter,
            tokens: TokenEstimator::new(),
            timeout,
            telemetry,
        }
    }

    /// Build a generator with its own breaker and limiter.
    pub fn from_config(
        provider: Arc<dyn IGenerationProvider>,
        config: &ResilienceConfig,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn ITelemetrySink>,
    ) -> StrataResult<Self> {
        config.validate()?;
        let breaker = Arc::new(CircuitBreaker::new(
            provider.name().to_string(),
            config.circuit_breaker.clone(),
            clock,
        ));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Ok(Self::new(
            provider,
            breaker,
            limiter,
            Duration::from_millis(config.timeouts.generation_ms),
            telemetry,
        ))
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn on_transition(&self, transition: BreakerTransition) {
        match transition {
            BreakerTransition::Unchanged => {}
            BreakerTransition::Opened { failures } => {
                self.telemetry.emit(&LifecycleEvent::CircuitOpened {
                    breaker: self.breaker.name().to_string(),
                    failures,
                });
            }
            BreakerTransition::Closed => {
                self.telemetry.emit(&LifecycleEvent::CircuitClosed {
                    breaker: self.breaker.name().to_string(),
                });
            }
        }
    }

    fn fail(&self, admission: Admission<'_>, error: StrataError) -> StrataError {
        let counts = match &error {
            StrataError::GenerationError(e) => e.counts_as_failure(),
            _ => true,
        };
        if counts {
            let transition = admission.fail();
            self.on_transition(transition);
        }
        error
    }

    fn succeed(&self, admission: Admission<'_>) {
        let transition = admission.succeed();
        self.on_transition(transition);
    }

    /// Admission, pacing and timed dispatch. Records failures, never success;
    /// the returned admission carries the outcome still to be recorded.
    async fn dispatch(&self, request: &GenerationRequest) -> StrataResult<(GenerationResponse, Admission<'_>)> {
        let admission = self.breaker.admit()?;

        let estimate = self
            .tokens
            .estimate(&request.prompt)
            .saturating_add(request.max_output_tokens.unwrap_or(0));
        // Dropping the admission frees a half-open trial slot.
        self.limiter.acquire(estimate).await?;

        let task = request.task_type.as_str();
        match tokio::time::timeout(self.timeout, self.provider.generate(request)).await {
            Ok(Ok(response)) => {
                debug!(
                    task,
                    provider = %response.provider,
                    tokens_used = response.tokens_used,
                    "generation call succeeded"
                );
                Ok((response, admission))
            }
            Ok(Err(e)) => {
                warn!(task, error = %e, "generation call failed");
                Err(self.fail(admission, e))
            }
            Err(_) => {
                warn!(task, timeout_ms = self.timeout.as_millis() as u64, "generation call timed out");
                Err(self.fail(
                    admission,
                    GenerationError::Timeout {
                        task: task.to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                    .into(),
                ))
            }
        }
    }

    /// Raw call: any response from the provider counts as success.
    pub async fn generate(&self, request: &GenerationRequest) -> StrataResult<GenerationResponse> {
        let (response, admission) = self.dispatch(request).await?;
        self.succeed(admission);
        Ok(response)
    }

    /// Structured call: the output must deserialize into `T` and pass `check`.
    /// Anything else is a malformed output and counts against the breaker; the
    /// partial result is discarded.
    pub async fn generate_validated<T, F>(
        &self,
        request: &GenerationRequest,
        check: F,
    ) -> StrataResult<T>
    where
        T: DeserializeOwned,
        F: FnOnce(&T) -> Result<(), String>,
    {
        let (response, admission) = self.dispatch(request).await?;
        let task = request.task_type.as_str();
        let parsed = serde_json::from_value::<T>(response.output)
            .map_err(|e| e.to_string())
            .and_then(|value| check(&value).map(|()| value));

        match parsed {
            Ok(value) => {
                self.succeed(admission);
                Ok(value)
            }
            Err(reason) => {
                warn!(task, reason = %reason, "generation output rejected");
                Err(self.fail(
                    admission,
                    GenerationError::MalformedOutput {
                        task: task.to_string(),
                        reason,
                    }
                    .into(),
                ))
            }
        }
    }
}
