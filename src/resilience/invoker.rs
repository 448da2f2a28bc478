//! Resilient call wrapper and per-device breaker registry
//!
//! [`ResilientInvoker`] is the single entry point the rest of the system
//! uses to touch an unreliable dependency: it composes the circuit breaker
//! around the retry executor and converts any unrecovered failure into a
//! caller-supplied default, so a hardware or network outage degrades the
//! sensing pipeline instead of crashing it.
//!
//! [`BreakerRegistry`] hands out one independent breaker per device or
//! endpoint id, so failures of unrelated devices never cross-trip.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

use super::breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker};
use super::failure::{FailureClass, SensorFailure};
use super::retry::{self, RetryPolicy};

// ============================================================================
// Resilient Invoker
// ============================================================================

/// Retry + circuit breaker + default-value fallback for one call-site class
/// against one device.
pub struct ResilientInvoker {
    breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
    failures_recorded: AtomicU64,
}

impl ResilientInvoker {
    pub fn new(breaker: Arc<CircuitBreaker>, policy: RetryPolicy) -> Self {
        Self {
            breaker,
            policy,
            failures_recorded: AtomicU64::new(0),
        }
    }

    /// Execute `op` with retry inside the breaker; on any unrecovered
    /// failure (including circuit-open) return `default` instead.
    ///
    /// The failure occurrence stays observable: the counter increments and a
    /// structured warning is emitted.
    pub async fn call<T, F, Fut>(&self, op: F, default: T) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SensorFailure>>,
    {
        match self.try_call(op).await {
            Ok(value) => value,
            Err(failure) => {
                self.failures_recorded.fetch_add(1, Ordering::Relaxed);
                warn!(
                    device = %self.breaker.device(),
                    class = %FailureClass::classify(&failure),
                    error = %failure,
                    "Resilient call failed, using default"
                );
                default
            }
        }
    }

    /// Like [`ResilientInvoker::call`] but surfaces the failure, for callers
    /// that distinguish "no data" from "default data" (e.g. the sensing loop
    /// skipping an append entirely).
    pub async fn try_call<T, F, Fut>(&self, op: F) -> Result<T, SensorFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SensorFailure>>,
    {
        self.breaker.call(|| retry::run(op, &self.policy)).await
    }

    /// Number of calls that fell back to the default so far.
    pub fn failures_recorded(&self) -> u64 {
        self.failures_recorded.load(Ordering::Relaxed)
    }

    /// Snapshot of the underlying breaker, for health surfaces.
    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }
}

// ============================================================================
// Breaker Registry
// ============================================================================

/// Explicit mapping from device/endpoint id to its independent breaker.
///
/// Breakers are created lazily on first use with the registry's shared
/// thresholds and live for the life of the registry (device sets are small
/// and static in practice).
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the breaker for `device`.
    pub fn breaker_for(&self, device: &str) -> Arc<CircuitBreaker> {
        let mut breakers = match self.breakers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        breakers
            .entry(device.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(device.to_string(), self.config.clone()))
            })
            .clone()
    }

    /// Build an invoker for `device` with the given retry policy.
    pub fn invoker_for(&self, device: &str, policy: RetryPolicy) -> ResilientInvoker {
        ResilientInvoker::new(self.breaker_for(device), policy)
    }

    /// Snapshots of every registered breaker, for health surfaces.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers = match self.breakers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut snaps: Vec<BreakerSnapshot> =
            breakers.values().map(|b| b.snapshot()).collect();
        snaps.sort_by(|a, b| a.device.cmp(&b.device));
        snaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::breaker::CircuitState;
    use std::sync::atomic::AtomicU32;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            jitter: false,
            ..RetryPolicy::steady_state()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn returns_default_on_exhaustion_and_counts() {
        let registry = BreakerRegistry::new(BreakerConfig::default());
        let invoker = registry.invoker_for("bme280", quick_policy());

        let value = invoker
            .call(
                || async { Err::<f64, _>(SensorFailure::ReadFailed("dead".into())) },
                21.5,
            )
            .await;

        assert_eq!(value, 21.5);
        assert_eq!(invoker.failures_recorded(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_passes_through_untouched() {
        let registry = BreakerRegistry::new(BreakerConfig::default());
        let invoker = registry.invoker_for("bme280", quick_policy());

        let value = invoker.call(|| async { Ok(19.25) }, 0.0).await;
        assert_eq!(value, 19.25);
        assert_eq!(invoker.failures_recorded(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_returns_default_without_invoking_op() {
        let registry = BreakerRegistry::new(BreakerConfig {
            failure_threshold: 1,
            ..BreakerConfig::default()
        });
        let invoker = registry.invoker_for("bme280", quick_policy());

        // Trip the breaker (1 exhausted retry run = 1 breaker failure).
        let _ = invoker
            .call(
                || async { Err::<u32, _>(SensorFailure::ReadFailed("dead".into())) },
                0,
            )
            .await;
        assert_eq!(invoker.breaker_snapshot().state, CircuitState::Open);

        let executed = AtomicU32::new(0);
        let value = invoker
            .call(
                || {
                    executed.fetch_add(1, Ordering::SeqCst);
                    async { Ok(1) }
                },
                99,
            )
            .await;
        assert_eq!(value, 99);
        assert_eq!(executed.load(Ordering::SeqCst), 0);
        assert_eq!(invoker.failures_recorded(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn registry_isolates_devices() {
        let registry = BreakerRegistry::new(BreakerConfig {
            failure_threshold: 1,
            ..BreakerConfig::default()
        });

        let gateway = registry.invoker_for("gateway", quick_policy());
        let sensor = registry.invoker_for("bme280", quick_policy());

        // Trip the gateway breaker.
        let _ = gateway
            .call(
                || async {
                    Err::<u32, _>(SensorFailure::ConnectionRefused {
                        endpoint: "gateway:8443".into(),
                    })
                },
                0,
            )
            .await;
        assert_eq!(gateway.breaker_snapshot().state, CircuitState::Open);

        // The sensor breaker is unaffected.
        assert_eq!(sensor.breaker_snapshot().state, CircuitState::Closed);
        assert_eq!(sensor.call(|| async { Ok(20.0) }, 0.0).await, 20.0);

        let snaps = registry.snapshots();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].device, "bme280");
        assert_eq!(snaps[1].device, "gateway");
    }

    #[tokio::test(start_paused = true)]
    async fn registry_reuses_breaker_instances() {
        let registry = BreakerRegistry::new(BreakerConfig::default());
        let a = registry.breaker_for("bme280");
        let b = registry.breaker_for("bme280");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
