//! Bounded exponential backoff with jitter
//!
//! [`run`] executes an async operation under a [`RetryPolicy`], consulting
//! [`FailureClass::classify`] after each failure. Non-retryable classes
//! (Config, Permanent) surface immediately; retryable ones sleep and try
//! again until attempts are exhausted.
//!
//! The inter-attempt sleep is the only suspension point in this subsystem.
//! It is local to the retrying call; concurrent operations on other
//! devices are never blocked by it.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::failure::{FailureClass, SensorFailure};
use crate::config::defaults;

// ============================================================================
// Retry Policy
// ============================================================================

/// Immutable backoff configuration, one instance per call-site class.
///
/// Delay for attempt `n` (1-based) is
/// `min(max_delay, initial_delay * exponential_base^(n-1))`, optionally
/// scaled by a uniform jitter factor in `[0.5, 1.0]`. Total wall-clock spent
/// sleeping is therefore bounded by `(max_attempts - 1) * max_delay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first (>= 1)
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Ceiling on any single delay (>= initial_delay)
    pub max_delay: Duration,
    /// Per-attempt delay multiplier (> 1)
    pub exponential_base: f64,
    /// Scale each delay by a uniform factor in [0.5, 1.0]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::steady_state()
    }
}

impl RetryPolicy {
    /// Preset for one-shot initialization call sites (sensor probe, bus
    /// setup). Patient: the process is starting anyway.
    pub fn init() -> Self {
        Self {
            max_attempts: defaults::RETRY_INIT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(defaults::RETRY_INIT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(defaults::RETRY_INIT_MAX_DELAY_MS),
            exponential_base: defaults::RETRY_EXPONENTIAL_BASE,
            jitter: true,
        }
    }

    /// Preset for steady-state read call sites. Impatient: a dead sensor
    /// should degrade the tick, not stall it.
    pub fn steady_state() -> Self {
        Self {
            max_attempts: defaults::RETRY_READ_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(defaults::RETRY_READ_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(defaults::RETRY_READ_MAX_DELAY_MS),
            exponential_base: defaults::RETRY_EXPONENTIAL_BASE,
            jitter: true,
        }
    }

    /// Preset for bus/peripheral call sites (capped attempts).
    pub fn hardware() -> Self {
        Self {
            max_attempts: defaults::RETRY_HARDWARE_MAX_ATTEMPTS,
            ..Self::steady_state()
        }
    }

    /// Preset for remote call sites. Network faults recover more often than
    /// bus faults, so this allows more attempts than [`RetryPolicy::hardware`].
    pub fn network() -> Self {
        Self {
            max_attempts: defaults::RETRY_NETWORK_MAX_ATTEMPTS,
            ..Self::steady_state()
        }
    }

    /// Unjittered delay before the attempt following failure number
    /// `attempt` (1-based). Monotonically non-decreasing in `attempt`,
    /// never exceeds `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // powi saturates to infinity for large exponents; the min() below
        // caps that back to max_delay before Duration conversion.
        let exponent = attempt.saturating_sub(1).min(1_000) as i32;
        let raw = self.initial_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Execute `op` under `policy`, retrying retryable failures with backoff.
///
/// Returns the first success, or the last failure once attempts are
/// exhausted. Config and Permanent failures are returned immediately
/// without consuming further attempts.
pub async fn run<T, F, Fut>(mut op: F, policy: &RetryPolicy) -> Result<T, SensorFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SensorFailure>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_failure;

    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(failure) => {
                let class = FailureClass::classify(&failure);
                if !class.is_retryable() {
                    debug!(class = %class, error = %failure, "Failure not retryable, surfacing");
                    return Err(failure);
                }
                last_failure = failure;
            }
        }

        if attempt >= max_attempts {
            warn!(
                attempts = attempt,
                error = %last_failure,
                "Retry attempts exhausted"
            );
            return Err(last_failure);
        }

        let delay = jittered(policy.delay_for_attempt(attempt), policy.jitter);
        debug!(
            attempt,
            next_delay_ms = delay.as_millis() as u64,
            error = %last_failure,
            "Attempt failed, backing off"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Scale a delay by a uniform factor in [0.5, 1.0] when jitter is enabled.
///
/// The expected delay (0.75 × unjittered) still grows monotonically with
/// attempt count, and the jittered value never exceeds the unjittered one.
fn jittered(delay: Duration, jitter: bool) -> Duration {
    if !jitter {
        return delay;
    }
    use rand::Rng;
    let factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
    delay.mul_f64(factor)
}
