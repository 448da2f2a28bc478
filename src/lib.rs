//! Atmosense: Adaptive Calibration & Resilience Core
//!
//! Failure-tolerant sensing and self-calibrating environmental ranges for an
//! ambient device.
//!
//! ## Architecture
//!
//! - **Resilience layer**: failure classification, bounded retry with
//!   jitter, per-device circuit breakers, and a default-value fallback
//!   wrapper: the only path through which unreliable dependencies are
//!   touched
//! - **Observation store**: append-only, time-indexed log of environmental
//!   readings with windowed queries and gap detection
//! - **Calibration learner**: re-derives "normal" temperature/pressure/
//!   humidity ranges from a trailing observation window, widening the
//!   window after outages
//! - **Adaptation scheduler**: cooldown-gated, atomically publishes adapted
//!   profiles and keeps an append-only audit trail
//!
//! Data flows one direction: sensor reads → resilient invoker → observation
//! store → learner → scheduler → published profile, consumed by downstream
//! mood derivation (out of scope).

pub mod adaptation;
pub mod config;
pub mod learning;
pub mod resilience;
pub mod sensors;
pub mod store;
pub mod types;

// Re-export device configuration
pub use config::DeviceConfig;

// Re-export commonly used types
pub use types::{
    AdaptationRecord, AdaptationTrigger, CalibrationProfile, Observation, ProfileSource,
};

// Re-export the resilience layer
pub use resilience::{
    BreakerConfig, BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitState, FailureClass,
    ResilientInvoker, RetryPolicy, SensorFailure,
};

// Re-export storage
pub use store::{GapDetector, ObservationStore, StoreError, StoreStats};

// Re-export learning and adaptation
pub use adaptation::{AdaptationScheduler, CalibrationStateStore, SchedulerConfig};
pub use learning::{CalibrationLearner, LearnerConfig};

// Re-export the sensor contract
pub use sensors::SensorRead;
