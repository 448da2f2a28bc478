//! System-wide default constants.
//!
//! Centralises magic numbers so every tunable has exactly one home.
//! Grouped by subsystem for easy discovery. All values are overridable
//! through `atmosense.toml`; see [`crate::config::DeviceConfig`].

// ============================================================================
// Retry
// ============================================================================

/// Attempts for one-shot initialization calls (sensor probe, bus setup).
pub const RETRY_INIT_MAX_ATTEMPTS: u32 = 5;

/// Initial backoff delay for initialization calls (ms).
pub const RETRY_INIT_INITIAL_DELAY_MS: u64 = 500;

/// Backoff ceiling for initialization calls (ms).
pub const RETRY_INIT_MAX_DELAY_MS: u64 = 8_000;

/// Attempts for steady-state sensor reads. Kept low so a dead sensor
/// degrades the tick, not stalls it.
pub const RETRY_READ_MAX_ATTEMPTS: u32 = 3;

/// Initial backoff delay for steady-state reads (ms).
pub const RETRY_READ_INITIAL_DELAY_MS: u64 = 100;

/// Backoff ceiling for steady-state reads (ms).
pub const RETRY_READ_MAX_DELAY_MS: u64 = 2_000;

/// Attempts for bus/peripheral (hardware-class) call sites.
pub const RETRY_HARDWARE_MAX_ATTEMPTS: u32 = 3;

/// Attempts for remote (network-class) call sites. Network faults recover
/// more often than bus faults, so these get more attempts.
pub const RETRY_NETWORK_MAX_ATTEMPTS: u32 = 5;

/// Multiplier applied to the delay on each successive attempt.
pub const RETRY_EXPONENTIAL_BASE: f64 = 2.0;

// ============================================================================
// Circuit Breaker
// ============================================================================

/// Consecutive failures in Closed state before the circuit trips.
pub const BREAKER_FAILURE_THRESHOLD: u32 = 5;

/// Consecutive half-open successes required to close the circuit again.
pub const BREAKER_SUCCESS_THRESHOLD: u32 = 2;

/// How long an Open circuit rejects calls before allowing a probe (seconds).
pub const BREAKER_OPEN_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Calibration Learning
// ============================================================================

/// Trailing window of observations used for calibration (days).
pub const LEARNING_BASE_WINDOW_DAYS: i64 = 7;

/// Hard cap on the gap-expanded learning window (days).
pub const LEARNING_MAX_WINDOW_DAYS: i64 = 30;

/// Minimum per-channel sample count before that channel's calibration
/// is recomputed. Below this the prior value is carried over unchanged.
pub const LEARNING_MIN_SAMPLES: usize = 50;

/// Fraction of the observed temperature range added as margin on each side.
pub const LEARNING_MARGIN_FRACTION: f64 = 0.2;

// ============================================================================
// Adaptation Scheduling
// ============================================================================

/// Minimum time between two periodic adaptations (seconds).
pub const ADAPTATION_COOLDOWN_SECS: i64 = 300;

/// Relative change a sub-field must exceed before a candidate is applied.
pub const ADAPTATION_CHANGE_THRESHOLD: f64 = 0.10;

/// Denominator floor for relative-change computation near zero.
pub const ADAPTATION_EPSILON: f64 = 1e-6;

/// Observation gap above which the sensing loop fires a gap-resume
/// adaptation at startup (seconds). 3 600 = 1 hour.
pub const GAP_RESUME_THRESHOLD_SECS: i64 = 3_600;

// ============================================================================
// Default Calibration Profile (indoor ambient)
// ============================================================================

/// Default comfortable temperature lower bound (°C).
pub const DEFAULT_AMBIENT_TEMP_MIN_C: f64 = 15.0;

/// Default comfortable temperature upper bound (°C).
pub const DEFAULT_AMBIENT_TEMP_MAX_C: f64 = 30.0;

/// Default ideal barometric pressure (hPa): standard atmosphere.
pub const DEFAULT_PRESSURE_IDEAL_HPA: f64 = 1_013.25;

/// Default ideal relative humidity (%).
pub const DEFAULT_HUMIDITY_IDEAL_PCT: f64 = 45.0;
