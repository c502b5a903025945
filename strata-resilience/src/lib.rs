//! # strata-resilience
//!
//! The resilience fabric shared by every lifecycle engine:
//! - [`CircuitBreaker`] tracks consecutive generation failures
//! - [`RateLimiter`] paces generation calls by requests and tokens per minute
//! - [`ResilientGenerator`] composes breaker, limiter, timeout and output validation
//! - [`LeaseKeeper`] holds a distributed lease alive until explicitly released

pub mod breaker;
pub mod generator;
pub mod lease;
pub mod rate_limiter;
pub mod tokens;

pub use breaker::{Admission, BreakerState, BreakerTransition, CircuitBreaker};
pub use generator::ResilientGenerator;
pub use lease::LeaseKeeper;
pub use rate_limiter::RateLimiter;
pub use tokens::TokenEstimator;
