//! Three-state circuit breaker
//!
//! Isolates a single unreliable dependency: after `failure_threshold`
//! consecutive failures the circuit opens and every call is rejected
//! without touching the dependency. After `open_timeout` one probe call is
//! allowed through (single-probe policy: concurrent callers during a probe
//! are rejected); `success_threshold` consecutive probe successes close the
//! circuit, any probe failure reopens it with a fresh timeout.
//!
//! One breaker per protected device/endpoint. Breakers are never shared
//! across unrelated dependencies, so a failing remote gateway cannot trip
//! the local sensor bus circuit.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use super::failure::SensorFailure;
use crate::config::defaults;

// ============================================================================
// Configuration
// ============================================================================

/// Thresholds for one breaker instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive Closed-state failures before the circuit opens
    pub failure_threshold: u32,
    /// Consecutive HalfOpen successes before the circuit closes
    pub success_threshold: u32,
    /// How long an Open circuit rejects calls before allowing a probe
    pub open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::BREAKER_FAILURE_THRESHOLD,
            success_threshold: defaults::BREAKER_SUCCESS_THRESHOLD,
            open_timeout: Duration::from_secs(defaults::BREAKER_OPEN_TIMEOUT_SECS),
        }
    }
}

// ============================================================================
// State Machine
// ============================================================================

/// Breaker state as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Operations execute directly
    Closed,
    /// Operations are rejected immediately
    Open,
    /// A bounded number of trial operations are allowed through
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Mutable breaker state. Mutated only by the breaker's own call path.
#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    /// Single-probe policy: true while a HalfOpen trial call is in flight.
    probe_in_flight: bool,
}

/// Point-in-time view of a breaker, for diagnostics surfaces.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    /// Device/endpoint this breaker protects
    pub device: String,
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures observed in Closed state
    pub consecutive_failures: u32,
    /// Consecutive successes observed in HalfOpen state
    pub consecutive_successes: u32,
    /// Time left until an Open circuit allows a probe, if Open
    pub open_remaining: Option<Duration>,
}

/// Failure-isolation gate for one unreliable dependency.
pub struct CircuitBreaker {
    device: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a breaker in the Closed state with zero counters.
    pub fn new(device: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            device: device.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Device/endpoint identifier this breaker protects.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Execute `op` through the breaker.
    ///
    /// Rejects with [`SensorFailure::CircuitOpen`] while the circuit is Open
    /// (or while another caller holds the HalfOpen probe slot). The
    /// operation itself always runs outside the state lock, so slow calls
    /// never block state inspection by other callers.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, SensorFailure>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SensorFailure>>,
    {
        self.acquire()?;
        let result = op().await;
        self.record(result.is_ok());
        result
    }

    /// Current state (recomputing Open → HalfOpen eligibility is deferred to
    /// the next call; this reports the stored state).
    pub fn state(&self) -> CircuitState {
        match self.inner.lock() {
            Ok(inner) => inner.state,
            Err(poisoned) => poisoned.into_inner().state,
        }
    }

    /// Point-in-time snapshot for health/diagnostics surfaces.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let open_remaining = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) => {
                Some(self.config.open_timeout.saturating_sub(at.elapsed()))
            }
            _ => None,
        };
        BreakerSnapshot {
            device: self.device.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            open_remaining,
        }
    }

    /// Gate a call: decide whether it may proceed, performing the
    /// Open → HalfOpen transition when the timeout has elapsed.
    fn acquire(&self) -> Result<(), SensorFailure> {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed >= self.config.open_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    inner.probe_in_flight = true;
                    info!(device = %self.device, "Circuit half-open, probing");
                    Ok(())
                } else {
                    Err(SensorFailure::CircuitOpen {
                        device: self.device.clone(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    // Single-probe policy: only one trial call at a time.
                    Err(SensorFailure::CircuitOpen {
                        device: self.device.clone(),
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Record a call outcome and apply state transitions.
    fn record(&self, success: bool) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match inner.state {
            CircuitState::Closed => {
                if success {
                    inner.consecutive_failures = 0;
                } else {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.config.failure_threshold {
                        inner.state = CircuitState::Open;
                        inner.opened_at = Some(Instant::now());
                        warn!(
                            device = %self.device,
                            failures = inner.consecutive_failures,
                            timeout_secs = self.config.open_timeout.as_secs(),
                            "Circuit opened"
                        );
                    }
                }
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                if success {
                    inner.consecutive_successes += 1;
                    if inner.consecutive_successes >= self.config.success_threshold {
                        inner.state = CircuitState::Closed;
                        inner.consecutive_failures = 0;
                        inner.consecutive_successes = 0;
                        inner.opened_at = None;
                        info!(device = %self.device, "Circuit closed after successful probes");
                    }
                } else {
                    // One probe failure reopens with a fresh timeout,
                    // discarding any partial success count.
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.consecutive_successes = 0;
                    warn!(device = %self.device, "Probe failed, circuit reopened");
                }
            }
            CircuitState::Open => {
                // A straggler that acquired while Closed finished after the
                // circuit tripped. Its outcome no longer changes the state.
            }
        }
    }
}
