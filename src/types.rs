//! Shared data structures for the calibration and resilience core
//!
//! This module defines the types that flow through the sensing pipeline:
//! - `Observation`: one timestamped, possibly-partial environmental reading
//! - `CalibrationProfile`: the accepted "normal" environmental ranges
//! - `AdaptationRecord`: audit trail entry for each profile replacement
//! - `AdaptationTrigger`: what caused an adaptation attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Observations
// ============================================================================

/// One environmental reading from the sensor head.
///
/// Any subset of fields may be absent; a partially-available sensor still
/// produces a useful observation. Observations are immutable once stored and
/// ordered only by timestamp; two observations at the same instant are both
/// kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,

    /// Ambient temperature (°C), if the temperature channel responded
    pub temperature: Option<f64>,

    /// Barometric pressure (hPa), if the pressure channel responded
    pub pressure: Option<f64>,

    /// Relative humidity (%), if the humidity channel responded
    pub humidity: Option<f64>,
}

impl Observation {
    /// Create a complete observation with all three channels present.
    pub fn new(timestamp: DateTime<Utc>, temperature: f64, pressure: f64, humidity: f64) -> Self {
        Self {
            timestamp,
            temperature: Some(temperature),
            pressure: Some(pressure),
            humidity: Some(humidity),
        }
    }

    /// Create an observation with no channels present (timestamp only).
    ///
    /// Used as the degraded fallback when every channel read fails, so the
    /// sensing loop still records that an attempt happened.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            temperature: None,
            pressure: None,
            humidity: None,
        }
    }

    /// True when no channel produced a value.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.pressure.is_none() && self.humidity.is_none()
    }
}

// ============================================================================
// Calibration Profile
// ============================================================================

/// Where the active profile's values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProfileSource {
    /// Built-in defaults, never adapted
    #[default]
    Default,
    /// Learned from the observation window
    Learned,
}

impl std::fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileSource::Default => write!(f, "default"),
            ProfileSource::Learned => write!(f, "learned"),
        }
    }
}

/// The accepted set of "normal" environmental ranges.
///
/// Downstream consumers normalize raw readings against these ranges. Exactly
/// one profile is active at a time; the scheduler replaces it atomically so
/// readers never see a half-written mix of old and new fields.
///
/// Invariant: `ambient_temp_min <= ambient_temp_max`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    /// Lower bound of the comfortable ambient temperature range (°C)
    pub ambient_temp_min: f64,

    /// Upper bound of the comfortable ambient temperature range (°C)
    pub ambient_temp_max: f64,

    /// Ideal barometric pressure (hPa)
    pub pressure_ideal: f64,

    /// Ideal relative humidity (%)
    pub humidity_ideal: f64,

    /// When this profile was produced
    pub last_updated: DateTime<Utc>,

    /// Default vs learned provenance
    pub source: ProfileSource,
}

impl CalibrationProfile {
    /// Built-in default profile used until enough data has been learned.
    ///
    /// Values are the indoor-ambient defaults from `config::defaults`.
    pub fn default_at(now: DateTime<Utc>) -> Self {
        use crate::config::defaults;
        Self {
            ambient_temp_min: defaults::DEFAULT_AMBIENT_TEMP_MIN_C,
            ambient_temp_max: defaults::DEFAULT_AMBIENT_TEMP_MAX_C,
            pressure_ideal: defaults::DEFAULT_PRESSURE_IDEAL_HPA,
            humidity_ideal: defaults::DEFAULT_HUMIDITY_IDEAL_PCT,
            last_updated: now,
            source: ProfileSource::Default,
        }
    }

    /// Width of the temperature range (°C). Always >= 0 on a valid profile.
    pub fn temp_span(&self) -> f64 {
        self.ambient_temp_max - self.ambient_temp_min
    }

    /// Check the structural invariant.
    pub fn is_valid(&self) -> bool {
        self.ambient_temp_min <= self.ambient_temp_max
            && self.ambient_temp_min.is_finite()
            && self.ambient_temp_max.is_finite()
            && self.pressure_ideal.is_finite()
            && self.humidity_ideal.is_finite()
    }
}

// ============================================================================
// Adaptation Audit Trail
// ============================================================================

/// What caused an adaptation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdaptationTrigger {
    /// Invoked once at process start
    Startup,
    /// Invoked once after resuming from a detected observation gap
    GapResume,
    /// Invoked on the sensing loop's steady tick
    Periodic,
}

impl AdaptationTrigger {
    /// Whether this trigger is allowed to bypass the cooldown window.
    ///
    /// Startup and gap-resume each bypass exactly once per invocation; they
    /// do not disable cooldown checks for later periodic attempts.
    pub fn bypasses_cooldown(&self) -> bool {
        matches!(self, AdaptationTrigger::Startup | AdaptationTrigger::GapResume)
    }
}

impl std::fmt::Display for AdaptationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdaptationTrigger::Startup => write!(f, "startup"),
            AdaptationTrigger::GapResume => write!(f, "gap-resume"),
            AdaptationTrigger::Periodic => write!(f, "periodic"),
        }
    }
}

/// One entry in the append-only adaptation audit trail.
///
/// Never mutated after being written. The most recent entry's `applied_at`
/// is also what the scheduler's cooldown check compares against, so the
/// cooldown survives process restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationRecord {
    /// When the replacement was applied
    pub applied_at: DateTime<Utc>,

    /// Profile that was active before the replacement
    pub previous: CalibrationProfile,

    /// Profile that became active
    pub next: CalibrationProfile,

    /// What caused this adaptation
    pub trigger: AdaptationTrigger,
}
