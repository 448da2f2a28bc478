//! Device Configuration Module
//!
//! Provides per-device tuning loaded from TOML files, replacing hardcoded
//! resilience and learning parameters with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `ATMOSENSE_CONFIG` environment variable (path to TOML file)
//! 2. `atmosense.toml` in the current working directory
//! 3. Built-in defaults (matching `config::defaults`)
//!
//! Every section is optional; a missing section or field falls back to its
//! default, so an empty file behaves identically to no file.

pub mod defaults;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::adaptation::SchedulerConfig;
use crate::learning::LearnerConfig;
use crate::resilience::breaker::BreakerConfig;
use crate::resilience::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one device deployment.
///
/// Load with [`DeviceConfig::load`] which searches:
/// 1. `$ATMOSENSE_CONFIG` env var
/// 2. `./atmosense.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device identification
    #[serde(default)]
    pub device: DeviceInfo,

    /// Retry backoff tuning per call-site class
    #[serde(default)]
    pub retry: RetrySettings,

    /// Circuit breaker thresholds
    #[serde(default)]
    pub breaker: BreakerSettings,

    /// Calibration learning parameters
    #[serde(default)]
    pub learning: LearningSettings,

    /// Adaptation scheduling parameters
    #[serde(default)]
    pub adaptation: AdaptationSettings,
}

impl DeviceConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("ATMOSENSE_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), device = %config.device.name, "Loaded device config from ATMOSENSE_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from ATMOSENSE_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "ATMOSENSE_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("atmosense.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(device = %config.device.name, "Loaded device config from ./atmosense.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./atmosense.toml, using defaults");
                }
            }
        }

        info!("No atmosense.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }
}

// ============================================================================
// Device Identification
// ============================================================================

/// Device identity, used in log fields and breaker registry keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    /// Human-readable device name
    #[serde(default = "default_device_name")]
    pub name: String,

    /// Free-form placement note ("living room shelf")
    #[serde(default)]
    pub location: String,
}

fn default_device_name() -> String {
    "atmosense".to_string()
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            location: String::new(),
        }
    }
}

// ============================================================================
// Retry Settings
// ============================================================================

/// Backoff tuning for the two call-site classes: one-shot initialization
/// and steady-state reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts for initialization calls
    pub init_max_attempts: u32,
    /// Initial backoff for initialization calls (ms)
    pub init_initial_delay_ms: u64,
    /// Backoff ceiling for initialization calls (ms)
    pub init_max_delay_ms: u64,

    /// Attempts for steady-state reads
    pub read_max_attempts: u32,
    /// Initial backoff for steady-state reads (ms)
    pub read_initial_delay_ms: u64,
    /// Backoff ceiling for steady-state reads (ms)
    pub read_max_delay_ms: u64,

    /// Per-attempt delay multiplier
    pub exponential_base: f64,
    /// Randomize delays to avoid synchronized retry storms
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            init_max_attempts: defaults::RETRY_INIT_MAX_ATTEMPTS,
            init_initial_delay_ms: defaults::RETRY_INIT_INITIAL_DELAY_MS,
            init_max_delay_ms: defaults::RETRY_INIT_MAX_DELAY_MS,
            read_max_attempts: defaults::RETRY_READ_MAX_ATTEMPTS,
            read_initial_delay_ms: defaults::RETRY_READ_INITIAL_DELAY_MS,
            read_max_delay_ms: defaults::RETRY_READ_MAX_DELAY_MS,
            exponential_base: defaults::RETRY_EXPONENTIAL_BASE,
            jitter: true,
        }
    }
}

impl RetrySettings {
    /// Policy for one-shot initialization call sites.
    pub fn init_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.init_max_attempts.max(1),
            initial_delay: Duration::from_millis(self.init_initial_delay_ms),
            max_delay: Duration::from_millis(self.init_max_delay_ms.max(self.init_initial_delay_ms)),
            exponential_base: self.exponential_base,
            jitter: self.jitter,
        }
    }

    /// Policy for steady-state read call sites.
    pub fn read_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.read_max_attempts.max(1),
            initial_delay: Duration::from_millis(self.read_initial_delay_ms),
            max_delay: Duration::from_millis(self.read_max_delay_ms.max(self.read_initial_delay_ms)),
            exponential_base: self.exponential_base,
            jitter: self.jitter,
        }
    }
}

// ============================================================================
// Breaker Settings
// ============================================================================

/// Circuit breaker thresholds, shared by every per-device breaker created
/// from this config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Consecutive half-open successes before it closes again
    pub success_threshold: u32,
    /// Seconds an open circuit rejects calls before allowing a probe
    pub open_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::BREAKER_FAILURE_THRESHOLD,
            success_threshold: defaults::BREAKER_SUCCESS_THRESHOLD,
            open_timeout_secs: defaults::BREAKER_OPEN_TIMEOUT_SECS,
        }
    }
}

impl BreakerSettings {
    pub fn to_breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold.max(1),
            success_threshold: self.success_threshold.max(1),
            open_timeout: Duration::from_secs(self.open_timeout_secs),
        }
    }
}

// ============================================================================
// Learning Settings
// ============================================================================

/// Calibration learning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningSettings {
    /// Trailing observation window (days)
    pub base_window_days: i64,
    /// Hard cap on the gap-expanded window (days)
    pub max_window_days: i64,
    /// Per-channel minimum samples before recalibration
    pub min_samples: usize,
    /// Temperature range margin fraction
    pub margin_fraction: f64,
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            base_window_days: defaults::LEARNING_BASE_WINDOW_DAYS,
            max_window_days: defaults::LEARNING_MAX_WINDOW_DAYS,
            min_samples: defaults::LEARNING_MIN_SAMPLES,
            margin_fraction: defaults::LEARNING_MARGIN_FRACTION,
        }
    }
}

impl LearningSettings {
    pub fn to_learner_config(&self) -> LearnerConfig {
        LearnerConfig {
            base_window_days: self.base_window_days.max(1),
            max_window_days: self.max_window_days.max(self.base_window_days),
            min_samples: self.min_samples,
            margin_fraction: self.margin_fraction,
        }
    }
}

// ============================================================================
// Adaptation Settings
// ============================================================================

/// Adaptation scheduling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationSettings {
    /// Minimum seconds between periodic adaptations
    pub cooldown_secs: i64,
    /// Relative change required before a candidate is applied
    pub change_threshold: f64,
    /// Denominator floor for relative-change computation
    pub epsilon: f64,
}

impl Default for AdaptationSettings {
    fn default() -> Self {
        Self {
            cooldown_secs: defaults::ADAPTATION_COOLDOWN_SECS,
            change_threshold: defaults::ADAPTATION_CHANGE_THRESHOLD,
            epsilon: defaults::ADAPTATION_EPSILON,
        }
    }
}

impl AdaptationSettings {
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            cooldown: chrono::Duration::seconds(self.cooldown_secs.max(0)),
            change_threshold: self.change_threshold,
            epsilon: self.epsilon,
        }
    }
}
