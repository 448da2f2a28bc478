//! Calibration Learning
//!
//! Derives a candidate [`CalibrationProfile`] from a trailing window of the
//! observation log. Each channel (temperature, pressure, humidity) is
//! recomputed independently and only when the window holds enough samples
//! for that channel; sparse data degrades to "leave unchanged", never to
//! zero or NaN.
//!
//! After an observation gap (power loss, long outage) the window widens by
//! the gap length so learning re-converges from the data that exists,
//! capped at a hard maximum.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::defaults;
use crate::store::{GapDetector, ObservationStore};
use crate::types::{CalibrationProfile, ProfileSource};

// ============================================================================
// Configuration
// ============================================================================

/// Learning parameters, one instance per learner.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnerConfig {
    /// Trailing window under normal operation (days)
    pub base_window_days: i64,
    /// Hard cap on the gap-expanded window (days)
    pub max_window_days: i64,
    /// Per-channel minimum samples before that channel is recomputed
    pub min_samples: usize,
    /// Fraction of the observed temperature range added as margin per side
    pub margin_fraction: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            base_window_days: defaults::LEARNING_BASE_WINDOW_DAYS,
            max_window_days: defaults::LEARNING_MAX_WINDOW_DAYS,
            min_samples: defaults::LEARNING_MIN_SAMPLES,
            margin_fraction: defaults::LEARNING_MARGIN_FRACTION,
        }
    }
}

// ============================================================================
// Per-Channel Accumulator
// ============================================================================

/// Running min/max/mean over one channel's samples in the window.
///
/// Non-finite values (NaN, infinity) are rejected so a single corrupt
/// reading cannot poison the aggregate.
#[derive(Debug, Default)]
struct ChannelStats {
    count: usize,
    min: f64,
    max: f64,
    sum: f64,
}

impl ChannelStats {
    fn add(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

// ============================================================================
// Learner
// ============================================================================

/// Derives candidate calibration profiles from the observation log.
///
/// Stateless between calls: it produces a candidate value on demand and
/// owns no persistent state of its own.
pub struct CalibrationLearner {
    store: ObservationStore,
    gap_detector: GapDetector,
    config: LearnerConfig,
}

impl CalibrationLearner {
    pub fn new(store: ObservationStore, config: LearnerConfig) -> Self {
        let gap_detector = GapDetector::new(store.clone());
        Self {
            store,
            gap_detector,
            config,
        }
    }

    /// Learn a candidate profile from the current window.
    pub fn learn(&self, current: &CalibrationProfile) -> CalibrationProfile {
        self.learn_at(current, Utc::now())
    }

    /// Same as [`CalibrationLearner::learn`] with an explicit reference time.
    pub fn learn_at(&self, current: &CalibrationProfile, now: DateTime<Utc>) -> CalibrationProfile {
        if self.store.count() == 0 {
            return current.clone();
        }

        let gap = self.gap_detector.detect_gap_at(now);
        let window_days = self.effective_window_days(gap);
        let since = now - Duration::days(window_days);

        let mut temperature = ChannelStats::default();
        let mut pressure = ChannelStats::default();
        let mut humidity = ChannelStats::default();

        for observation in self.store.window(since) {
            if let Some(t) = observation.temperature {
                temperature.add(t);
            }
            if let Some(p) = observation.pressure {
                pressure.add(p);
            }
            if let Some(h) = observation.humidity {
                humidity.add(h);
            }
        }

        let mut candidate = current.clone();

        if temperature.count >= self.config.min_samples {
            let margin = (temperature.max - temperature.min) * self.config.margin_fraction;
            candidate.ambient_temp_min = temperature.min - margin;
            candidate.ambient_temp_max = temperature.max + margin;
        }
        if pressure.count >= self.config.min_samples {
            candidate.pressure_ideal = pressure.mean();
        }
        if humidity.count >= self.config.min_samples {
            candidate.humidity_ideal = humidity.mean();
        }

        debug!(
            window_days,
            temp_samples = temperature.count,
            pressure_samples = pressure.count,
            humidity_samples = humidity.count,
            "Learned calibration candidate"
        );

        candidate.last_updated = now;
        candidate.source = ProfileSource::Learned;
        candidate
    }

    /// Window length in days, widened after a gap longer than the base
    /// window: `min(gap_days + base, max)`.
    fn effective_window_days(&self, gap: Option<Duration>) -> i64 {
        let base = self.config.base_window_days;
        match gap {
            Some(gap) if gap.num_days() > base => {
                (gap.num_days() + base).min(self.config.max_window_days)
            }
            _ => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Observation;

    fn setup(config: LearnerConfig) -> (tempfile::TempDir, ObservationStore, CalibrationLearner) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ObservationStore::open(dir.path()).expect("open");
        let learner = CalibrationLearner::new(store.clone(), config);
        (dir, store, learner)
    }

    fn small_config() -> LearnerConfig {
        LearnerConfig {
            min_samples: 3,
            ..LearnerConfig::default()
        }
    }

    #[test]
    fn empty_store_returns_current_unchanged() {
        let (_dir, _store, learner) = setup(LearnerConfig::default());
        let now = Utc::now();
        let current = CalibrationProfile::default_at(now - Duration::days(1));

        let learned = learner.learn_at(&current, now);
        assert_eq!(learned, current);
        assert_eq!(learned.source, ProfileSource::Default);
    }

    #[test]
    fn temperature_margin_widens_observed_range() {
        let (_dir, store, learner) = setup(small_config());
        let now = Utc::now();

        for (i, t) in [10.0, 20.0, 30.0].iter().enumerate() {
            store
                .append(&Observation {
                    timestamp: now - Duration::hours(i as i64 + 1),
                    temperature: Some(*t),
                    pressure: None,
                    humidity: None,
                })
                .expect("append");
        }

        let current = CalibrationProfile::default_at(now);
        let learned = learner.learn_at(&current, now);

        // Range 20, margin 20 * 0.2 = 4 on each side.
        assert!((learned.ambient_temp_min - 6.0).abs() < 1e-9);
        assert!((learned.ambient_temp_max - 34.0).abs() < 1e-9);
        assert_eq!(learned.source, ProfileSource::Learned);
        assert!(learned.is_valid());
    }

    #[test]
    fn pressure_and_humidity_use_window_mean() {
        let (_dir, store, learner) = setup(small_config());
        let now = Utc::now();

        for i in 0..4u32 {
            store
                .append(&Observation {
                    timestamp: now - Duration::minutes(i as i64 + 1),
                    temperature: None,
                    pressure: Some(1_000.0 + f64::from(i)),
                    humidity: Some(40.0 + f64::from(i)),
                })
                .expect("append");
        }

        let current = CalibrationProfile::default_at(now);
        let learned = learner.learn_at(&current, now);

        assert!((learned.pressure_ideal - 1_001.5).abs() < 1e-9);
        assert!((learned.humidity_ideal - 41.5).abs() < 1e-9);
        // Temperature had zero samples, carried over from current.
        assert_eq!(learned.ambient_temp_min, current.ambient_temp_min);
        assert_eq!(learned.ambient_temp_max, current.ambient_temp_max);
    }

    #[test]
    fn sparse_channel_is_left_unchanged_exactly() {
        // Default threshold: 49 pressure samples is not enough.
        let (_dir, store, learner) = setup(LearnerConfig::default());
        let now = Utc::now();

        for i in 0..49i64 {
            store
                .append(&Observation {
                    timestamp: now - Duration::minutes(i + 1),
                    temperature: None,
                    pressure: Some(990.0 + i as f64),
                    humidity: None,
                })
                .expect("append");
        }

        let current = CalibrationProfile::default_at(now);
        let learned = learner.learn_at(&current, now);
        assert_eq!(learned.pressure_ideal, current.pressure_ideal);
    }

    #[test]
    fn fiftieth_sample_unlocks_recalibration() {
        let (_dir, store, learner) = setup(LearnerConfig::default());
        let now = Utc::now();

        for i in 0..50i64 {
            store
                .append(&Observation {
                    timestamp: now - Duration::minutes(i + 1),
                    temperature: None,
                    pressure: Some(1_000.0),
                    humidity: None,
                })
                .expect("append");
        }

        let current = CalibrationProfile::default_at(now);
        let learned = learner.learn_at(&current, now);
        assert!((learned.pressure_ideal - 1_000.0).abs() < 1e-9);
        assert_ne!(learned.pressure_ideal, current.pressure_ideal);
    }

    #[test]
    fn non_finite_samples_are_skipped() {
        let (_dir, store, learner) = setup(small_config());
        let now = Utc::now();

        for t in [10.0, 20.0, 30.0, f64::NAN, f64::INFINITY] {
            store
                .append(&Observation {
                    timestamp: now - Duration::minutes(1),
                    temperature: Some(t),
                    pressure: None,
                    humidity: None,
                })
                .expect("append");
        }

        let current = CalibrationProfile::default_at(now);
        let learned = learner.learn_at(&current, now);
        assert!((learned.ambient_temp_min - 6.0).abs() < 1e-9);
        assert!((learned.ambient_temp_max - 34.0).abs() < 1e-9);
        assert!(learned.is_valid());
    }

    #[test]
    fn gap_expands_window_capped_at_max() {
        let (_dir, _store, learner) = setup(LearnerConfig::default());

        // No gap, or gap shorter than the base window: base window.
        assert_eq!(learner.effective_window_days(None), 7);
        assert_eq!(learner.effective_window_days(Some(Duration::days(3))), 7);
        assert_eq!(learner.effective_window_days(Some(Duration::days(7))), 7);

        // 14-day gap: 14 + 7 = 21-day window.
        assert_eq!(learner.effective_window_days(Some(Duration::days(14))), 21);

        // 40-day gap: capped at 30.
        assert_eq!(learner.effective_window_days(Some(Duration::days(40))), 30);
    }

    #[test]
    fn gap_expanded_window_actually_reads_older_data() {
        let (_dir, store, learner) = setup(small_config());
        let now = Utc::now();

        // Data is 10-11 days old (outside the 7-day base window), and the
        // resulting ~10-day gap widens the window to ~17 days.
        for (i, t) in [10.0, 20.0, 30.0].iter().enumerate() {
            store
                .append(&Observation {
                    timestamp: now - Duration::days(10) - Duration::hours(i as i64),
                    temperature: Some(*t),
                    pressure: None,
                    humidity: None,
                })
                .expect("append");
        }

        let current = CalibrationProfile::default_at(now);
        let learned = learner.learn_at(&current, now);
        assert!((learned.ambient_temp_min - 6.0).abs() < 1e-9);
        assert!((learned.ambient_temp_max - 34.0).abs() < 1e-9);
    }
}
