//! Observation gap detection
//!
//! A gap is an interval with no stored observations, typically power or
//! network loss. The learner widens its window after a gap so calibration
//! re-converges from the data that does exist, and the sensing loop fires a
//! gap-resume adaptation when the gap at startup exceeds one hour.

use chrono::{DateTime, Duration, Utc};

use super::ObservationStore;

/// Computes elapsed time since the most recent stored observation.
///
/// Pure query; never mutates the store.
#[derive(Clone)]
pub struct GapDetector {
    store: ObservationStore,
}

impl GapDetector {
    pub fn new(store: ObservationStore) -> Self {
        Self { store }
    }

    /// Time since the newest observation, or `None` if the store is empty.
    pub fn detect_gap(&self) -> Option<Duration> {
        self.detect_gap_at(Utc::now())
    }

    /// Same as [`GapDetector::detect_gap`] with an explicit reference time.
    pub fn detect_gap_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.store
            .most_recent()
            .map(|observation| now - observation.timestamp)
    }
}
