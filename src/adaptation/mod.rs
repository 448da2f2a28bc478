//! Adaptation Scheduling
//!
//! Owns the single active [`CalibrationProfile`] and the append-only
//! adaptation audit trail. The external sensing loop drives
//! [`AdaptationScheduler::maybe_adapt`] on its tick (periodic), once at boot
//! (startup), and once after a long observation gap (gap-resume).
//!
//! A candidate replaces the active profile only when at least one sub-field
//! moved by more than the change threshold and, for periodic triggers,
//! only after the cooldown since the last adaptation has elapsed. The
//! replacement itself is all-or-nothing: state is persisted first, then the
//! new profile is published through an `ArcSwap`, so a concurrent reader
//! sees either the fully-old or the fully-new profile.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::defaults;
use crate::learning::CalibrationLearner;
use crate::store::StoreError;
use crate::types::{AdaptationRecord, AdaptationTrigger, CalibrationProfile};

// ============================================================================
// Configuration
// ============================================================================

/// Scheduling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Minimum time between periodic adaptations
    pub cooldown: Duration,
    /// Relative change a sub-field must exceed before a candidate applies
    pub change_threshold: f64,
    /// Denominator floor for relative-change computation near zero
    pub epsilon: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::seconds(defaults::ADAPTATION_COOLDOWN_SECS),
            change_threshold: defaults::ADAPTATION_CHANGE_THRESHOLD,
            epsilon: defaults::ADAPTATION_EPSILON,
        }
    }
}

// ============================================================================
// Persistent Calibration State
// ============================================================================

/// Schema version for the persisted profile record.
const PROFILE_SCHEMA_VERSION: u32 = 1;

/// Fixed key the current profile is stored under.
const ACTIVE_PROFILE_KEY: &[u8] = b"active";

/// Serialized wrapper around the persisted profile.
///
/// A version mismatch or corrupt record is ignored with a warning; the
/// scheduler then starts from the built-in default profile rather than
/// crashing on bad state.
#[derive(Serialize, Deserialize)]
struct PersistedProfile {
    schema_version: u32,
    profile: CalibrationProfile,
}

/// Record key: 8 bytes applied_at millis + 8 bytes sequence, so iteration
/// is chronological and same-instant records stay distinct.
fn record_key(applied_millis: u64, seq: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&applied_millis.to_be_bytes());
    key[8..].copy_from_slice(&seq.to_be_bytes());
    key
}

/// sled-backed store for the active profile and the adaptation audit trail.
///
/// Two trees in one database: `profile` holds the single current record
/// under a fixed key, `adaptations` holds the append-only trail.
#[derive(Clone)]
pub struct CalibrationStateStore {
    profile_tree: sled::Tree,
    record_tree: sled::Tree,
    seq: Arc<AtomicU64>,
    // Keeps the database alive as long as any clone of the store.
    _db: Arc<sled::Db>,
}

impl CalibrationStateStore {
    /// Open or create the calibration state database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        let profile_tree = db.open_tree("profile")?;
        let record_tree = db.open_tree("adaptations")?;

        let next_seq = record_tree
            .last()?
            .map(|(key, _)| {
                let mut bytes = [0u8; 8];
                if key.len() == 16 {
                    bytes.copy_from_slice(&key[8..]);
                }
                u64::from_be_bytes(bytes).wrapping_add(1)
            })
            .unwrap_or(0);

        Ok(Self {
            profile_tree,
            record_tree,
            seq: Arc::new(AtomicU64::new(next_seq)),
            _db: Arc::new(db),
        })
    }

    /// Load the persisted profile, or `None` when missing, corrupt, or from
    /// an incompatible schema version.
    pub fn load_profile(&self) -> Option<CalibrationProfile> {
        let value = match self.profile_tree.get(ACTIVE_PROFILE_KEY) {
            Ok(Some(v)) => v,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted profile, ignoring");
                return None;
            }
        };
        let persisted: PersistedProfile = match serde_json::from_slice(&value) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Corrupt persisted profile, ignoring");
                return None;
            }
        };
        if persisted.schema_version != PROFILE_SCHEMA_VERSION {
            warn!(
                file_version = persisted.schema_version,
                expected = PROFILE_SCHEMA_VERSION,
                "Profile schema version mismatch, ignoring persisted state"
            );
            return None;
        }
        Some(persisted.profile)
    }

    /// Persist the profile under the fixed key (overwrites the previous
    /// record; there is exactly one current profile).
    pub fn persist_profile(&self, profile: &CalibrationProfile) -> Result<(), StoreError> {
        let persisted = PersistedProfile {
            schema_version: PROFILE_SCHEMA_VERSION,
            profile: profile.clone(),
        };
        let value = serde_json::to_vec(&persisted)?;
        self.profile_tree.insert(ACTIVE_PROFILE_KEY, value)?;
        Ok(())
    }

    /// Append one record to the audit trail.
    pub fn append_record(&self, record: &AdaptationRecord) -> Result<(), StoreError> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let key = record_key(record.applied_at.timestamp_millis().max(0) as u64, seq);
        let value = serde_json::to_vec(record)?;
        self.record_tree.insert(key, value)?;
        Ok(())
    }

    /// `applied_at` of the newest record, for cooldown checks. Survives
    /// restarts since it reads the persisted trail.
    pub fn last_adaptation_at(&self) -> Option<DateTime<Utc>> {
        self.record_tree
            .last()
            .ok()
            .flatten()
            .and_then(|(_, value)| serde_json::from_slice::<AdaptationRecord>(&value).ok())
            .map(|record| record.applied_at)
    }

    /// The most recent `limit` records, newest first.
    pub fn recent_records(&self, limit: usize) -> Vec<AdaptationRecord> {
        self.record_tree
            .iter()
            .rev()
            .take(limit)
            .filter_map(|item| item.ok())
            .filter_map(|(_, value)| serde_json::from_slice(&value).ok())
            .collect()
    }

    /// Total number of records in the trail.
    pub fn record_count(&self) -> usize {
        self.record_tree.len()
    }

    /// Force outstanding writes to disk (shutdown path).
    pub fn flush(&self) -> Result<(), StoreError> {
        self.profile_tree.flush()?;
        self.record_tree.flush()?;
        Ok(())
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Cooldown-gated driver that periodically re-learns calibration and
/// atomically publishes the adapted profile.
///
/// Single writer of the active profile; any number of concurrent readers
/// take lock-free snapshots via [`AdaptationScheduler::active_profile`].
pub struct AdaptationScheduler {
    learner: CalibrationLearner,
    state: CalibrationStateStore,
    active: ArcSwap<CalibrationProfile>,
    config: SchedulerConfig,
}

impl AdaptationScheduler {
    /// Create a scheduler, restoring the persisted profile if one exists
    /// or installing the built-in default otherwise.
    pub fn new(
        learner: CalibrationLearner,
        state: CalibrationStateStore,
        config: SchedulerConfig,
    ) -> Self {
        let initial = state.load_profile().unwrap_or_else(|| {
            info!("No persisted calibration profile, starting from defaults");
            CalibrationProfile::default_at(Utc::now())
        });
        Self {
            learner,
            state,
            active: ArcSwap::from_pointee(initial),
            config,
        }
    }

    /// Lock-free snapshot of the active profile.
    pub fn active_profile(&self) -> Arc<CalibrationProfile> {
        self.active.load_full()
    }

    /// The most recent `limit` adaptation records, newest first.
    pub fn adaptation_history(&self, limit: usize) -> Vec<AdaptationRecord> {
        self.state.recent_records(limit)
    }

    /// Learn a candidate and apply it if it qualifies.
    pub fn maybe_adapt(&self, trigger: AdaptationTrigger) -> Result<Option<AdaptationRecord>, StoreError> {
        self.maybe_adapt_at(trigger, Utc::now())
    }

    /// Same as [`AdaptationScheduler::maybe_adapt`] with an explicit time.
    pub fn maybe_adapt_at(
        &self,
        trigger: AdaptationTrigger,
        now: DateTime<Utc>,
    ) -> Result<Option<AdaptationRecord>, StoreError> {
        let active = self.active.load_full();
        let candidate = self.learner.learn_at(&active, now);

        let change = max_relative_change(&active, &candidate, self.config.epsilon);
        if change <= self.config.change_threshold {
            debug!(trigger = %trigger, change, "Candidate below change threshold, keeping profile");
            return Ok(None);
        }

        if !trigger.bypasses_cooldown() {
            if let Some(last) = self.state.last_adaptation_at() {
                let elapsed = now - last;
                if elapsed < self.config.cooldown {
                    debug!(
                        trigger = %trigger,
                        elapsed_secs = elapsed.num_seconds(),
                        cooldown_secs = self.config.cooldown.num_seconds(),
                        "Cooldown active, deferring adaptation"
                    );
                    return Ok(None);
                }
            }
        }

        if !candidate.is_valid() {
            // Should not happen given the learner's aggregates, but a bad
            // candidate must never corrupt the active profile.
            warn!(trigger = %trigger, "Discarding invalid calibration candidate");
            return Ok(None);
        }

        let record = AdaptationRecord {
            applied_at: now,
            previous: (*active).clone(),
            next: candidate.clone(),
            trigger,
        };

        // Persist before publishing: on a write failure the active profile
        // stays untouched and the caller sees the error.
        self.state.persist_profile(&candidate)?;
        self.state.append_record(&record)?;
        self.active.store(Arc::new(candidate));

        info!(
            trigger = %trigger,
            change = format!("{:.1}%", change * 100.0),
            temp_min = record.next.ambient_temp_min,
            temp_max = record.next.ambient_temp_max,
            pressure = record.next.pressure_ideal,
            humidity = record.next.humidity_ideal,
            "Calibration profile adapted"
        );

        Ok(Some(record))
    }
}

/// Relative change of one scalar: `|b - a| / max(|a|, epsilon)`.
fn relative_change(a: f64, b: f64, epsilon: f64) -> f64 {
    (b - a).abs() / a.abs().max(epsilon)
}

/// Largest relative change across the three calibration sub-fields.
/// Temperature spans two numbers, so its change is the larger of the
/// min/max bound changes.
fn max_relative_change(
    active: &CalibrationProfile,
    candidate: &CalibrationProfile,
    epsilon: f64,
) -> f64 {
    let temp = relative_change(active.ambient_temp_min, candidate.ambient_temp_min, epsilon)
        .max(relative_change(active.ambient_temp_max, candidate.ambient_temp_max, epsilon));
    let pressure = relative_change(active.pressure_ideal, candidate.pressure_ideal, epsilon);
    let humidity = relative_change(active.humidity_ideal, candidate.humidity_ideal, epsilon);
    temp.max(pressure).max(humidity)
}
