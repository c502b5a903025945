//! Proactive requests/minute and tokens/minute pacing for generation calls.
//!
//! Callers wait *before* dispatch until the sliding 60 s window has room.
//! A wait longer than `max_wait_ms` is refused with [`GenerationError::RateLimited`].

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use strata_core::config::RateLimitConfig;
use strata_core::errors::GenerationError;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Dispatch time and token estimate of every call in the window.
    window: Mutex<VecDeque<(Instant, u32)>>,
}

/// Calls and tokens currently counted against the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUsage {
    pub requests: u32,
    pub tokens: u64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: Mutex::new(VecDeque::new()),
        }
    }

    fn prune(window: &mut VecDeque<(Instant, u32)>, now: Instant) {
        while let Some((at, _)) = window.front() {
            if now.duration_since(*at) >= WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long until a call of `tokens` fits, or zero if it fits now.
    fn required_wait(&self, window: &VecDeque<(Instant, u32)>, tokens: u32, now: Instant) -> Duration {
        let rpm = self.config.requests_per_minute as usize;
        let tpm = u64::from(self.config.tokens_per_minute);
        let mut requests = window.len();
        let mut used: u64 = window.iter().map(|(_, t)| u64::from(*t)).sum();
        let fits = |requests: usize, used: u64| {
            requests < rpm && (used + u64::from(tokens) <= tpm || requests == 0)
        };
        if fits(requests, used) {
            return Duration::ZERO;
        }
        // Walk the window oldest first until enough entries would have expired.
        for (at, t) in window.iter() {
            requests -= 1;
            used -= u64::from(*t);
            if fits(requests, used) {
                return (*at + WINDOW).saturating_duration_since(now);
            }
        }
        Duration::ZERO
    }

    /// Wait until a call estimated at `tokens` may be dispatched and record it.
    /// Returns the time spent waiting.
    pub async fn acquire(&self, tokens: u32) -> Result<Duration, GenerationError> {
        let started = Instant::now();
        let max_wait = Duration::from_millis(self.config.max_wait_ms);
        let min_pause = Duration::from_millis(self.config.backoff_ms.max(1));
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                Self::prune(&mut window, now);
                let wait = self.required_wait(&window, tokens, now);
                if wait.is_zero() {
                    window.push_back((now, tokens));
                    return Ok(now.duration_since(started));
                }
                wait
            };

            let waited = started.elapsed();
            if waited + wait > max_wait {
                return Err(GenerationError::RateLimited {
                    wait_ms: (waited + wait).as_millis() as u64,
                });
            }
            debug!(wait_ms = wait.as_millis() as u64, tokens, "rate limiter pacing call");
            tokio::time::sleep(wait.max(min_pause)).await;
        }
    }

    pub async fn usage(&self) -> WindowUsage {
        let mut window = self.window.lock().await;
        Self::prune(&mut window, Instant::now());
        WindowUsage {
            requests: window.len() as u32,
            tokens: window.iter().map(|(_, t)| u64::from(*t)).sum(),
        }
    }
}
