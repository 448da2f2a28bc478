//! Failure-Tolerant Call Layer
//!
//! Everything that touches an unreliable dependency (sensor bus, remote
//! gateway, actuator) goes through this module:
//!
//! - `failure`: the failure taxonomy and its pure classifier
//! - `retry`: bounded exponential backoff with jitter
//! - `breaker`: per-device three-state circuit breaker
//! - `invoker`: the composed entry point with default-value fallback
//!
//! Composition order is fixed: the breaker wraps the retry executor, which
//! wraps the raw operation. One exhausted retry run counts as one breaker
//! failure, so the breaker reacts to sustained outages rather than to every
//! transient blip.

pub mod breaker;
pub mod failure;
pub mod invoker;
pub mod retry;

pub use breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use failure::{FailureClass, SensorFailure};
pub use invoker::{BreakerRegistry, ResilientInvoker};
pub use retry::RetryPolicy;
