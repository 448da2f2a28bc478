//! Observation Log Storage
//!
//! Append-only, time-indexed log of environmental observations backed by
//! sled. Keys are `timestamp_millis (u64 BE) ++ sequence (u64 BE)` so
//! iteration order is chronological and observations sharing an instant are
//! all kept; nothing is deduplicated.
//!
//! Durability contract: appends are eventually durable (sled's background
//! flush). On crash the last few appends may be lost, which this system
//! tolerates: the stream resumes on restart and calibration simply sees a
//! slightly thinner window. Read-your-writes within the process always
//! holds. `flush()` is available for shutdown paths.

pub mod gap;

pub use gap::GapDetector;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::Observation;

/// Error type for observation log operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Byte length of a log key: 8 bytes timestamp millis + 8 bytes sequence.
const KEY_LEN: usize = 16;

/// Build a log key. The sequence suffix keeps same-instant observations
/// distinct and preserves their append order.
fn make_key(timestamp_millis: u64, seq: u64) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    key[..8].copy_from_slice(&timestamp_millis.to_be_bytes());
    key[8..].copy_from_slice(&seq.to_be_bytes());
    key
}

/// Millis since epoch for an observation timestamp, clamped at zero.
fn key_millis(ts: DateTime<Utc>) -> u64 {
    ts.timestamp_millis().max(0) as u64
}

// ============================================================================
// Observation Store
// ============================================================================

/// Append-only observation log with point and windowed queries.
///
/// Cheap to clone; clones share the same underlying database. Appends are
/// serialized through the monotonic sequence counter, and each sled insert
/// is atomic, so a reader never observes a partially-appended observation.
#[derive(Clone)]
pub struct ObservationStore {
    db: Arc<sled::Db>,
    /// Next sequence suffix; restored from the newest key on open.
    seq: Arc<AtomicU64>,
}

impl ObservationStore {
    /// Open or create the observation log at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;

        // Resume the sequence counter past the newest stored key so appends
        // after a restart keep their order even within the same millisecond.
        let next_seq = db
            .last()?
            .map(|(key, _)| parse_seq(&key).wrapping_add(1))
            .unwrap_or(0);

        info!(
            path = %path.as_ref().display(),
            observations = db.len(),
            "Observation store opened"
        );

        Ok(Self {
            db: Arc::new(db),
            seq: Arc::new(AtomicU64::new(next_seq)),
        })
    }

    /// Append one observation. O(1) amortized; eventually durable.
    pub fn append(&self, observation: &Observation) -> Result<(), StoreError> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let key = make_key(key_millis(observation.timestamp), seq);
        let value = serde_json::to_vec(observation)?;
        self.db.insert(key, value)?;
        Ok(())
    }

    /// Latest observation by timestamp, or `None` if the log is empty.
    pub fn most_recent(&self) -> Option<Observation> {
        self.db
            .last()
            .ok()
            .flatten()
            .and_then(|(_, value)| serde_json::from_slice(&value).ok())
    }

    /// All observations with `timestamp >= since`, ascending. Lazy: rows
    /// are read and decoded as the iterator is consumed. Corrupt rows are
    /// skipped rather than terminating the scan.
    pub fn window(&self, since: DateTime<Utc>) -> impl Iterator<Item = Observation> + '_ {
        let start = make_key(key_millis(since), 0);
        self.db
            .range(start..)
            .filter_map(|item| item.ok())
            .filter_map(|(_, value)| serde_json::from_slice(&value).ok())
    }

    /// Total number of stored observations.
    pub fn count(&self) -> usize {
        self.db.len()
    }

    /// Delete observations older than `cutoff`. Returns how many were
    /// removed. Used by the retention sweep.
    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff_key = make_key(key_millis(cutoff), 0);
        let keys_to_delete: Vec<_> = self
            .db
            .range(..cutoff_key)
            .filter_map(|item| item.ok())
            .map(|(key, _)| key)
            .collect();

        let deleted = keys_to_delete.len();
        for key in keys_to_delete {
            self.db.remove(key)?;
        }

        if deleted > 0 {
            self.db.flush()?;
            debug!(deleted, "Observation retention sweep complete");
        }

        Ok(deleted)
    }

    /// Force outstanding writes to disk (shutdown path).
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Storage statistics for diagnostics surfaces.
    pub fn stats(&self) -> StoreStats {
        let oldest = self
            .db
            .first()
            .ok()
            .flatten()
            .map(|(key, _)| parse_timestamp(&key));
        let newest = self
            .db
            .last()
            .ok()
            .flatten()
            .map(|(key, _)| parse_timestamp(&key));

        StoreStats {
            observation_count: self.db.len(),
            size_bytes: self.db.size_on_disk().unwrap_or(0),
            oldest_timestamp: oldest,
            newest_timestamp: newest,
        }
    }
}

/// Sequence suffix of a log key (0 for malformed keys).
fn parse_seq(key: &[u8]) -> u64 {
    if key.len() != KEY_LEN {
        return 0;
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&key[8..]);
    u64::from_be_bytes(bytes)
}

/// Timestamp part of a log key.
fn parse_timestamp(key: &[u8]) -> DateTime<Utc> {
    if key.len() != KEY_LEN {
        return Utc.timestamp_millis_opt(0).single().unwrap_or_default();
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&key[..8]);
    let millis = u64::from_be_bytes(bytes) as i64;
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

/// Storage statistics.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub observation_count: usize,
    pub size_bytes: u64,
    pub oldest_timestamp: Option<DateTime<Utc>>,
    pub newest_timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn obs(ts: DateTime<Utc>, temp: f64) -> Observation {
        Observation {
            timestamp: ts,
            temperature: Some(temp),
            pressure: None,
            humidity: None,
        }
    }

    #[test]
    fn append_then_read_back_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ObservationStore::open(dir.path()).expect("open");
        let t0 = Utc::now();

        store.append(&obs(t0, 20.0)).expect("append");
        store.append(&obs(t0 + Duration::seconds(1), 21.0)).expect("append");
        store.append(&obs(t0 + Duration::seconds(2), 22.0)).expect("append");

        let all: Vec<_> = store.window(t0 - Duration::seconds(1)).collect();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].temperature, Some(20.0));
        assert_eq!(all[2].temperature, Some(22.0));

        let recent = store.most_recent().expect("most recent");
        assert_eq!(recent.temperature, Some(22.0));
    }

    #[test]
    fn duplicate_timestamps_are_all_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ObservationStore::open(dir.path()).expect("open");
        let t0 = Utc::now();

        store.append(&obs(t0, 20.0)).expect("append");
        store.append(&obs(t0, 20.5)).expect("append");
        store.append(&obs(t0, 21.0)).expect("append");

        assert_eq!(store.count(), 3);
        let all: Vec<_> = store.window(t0 - Duration::seconds(1)).collect();
        // Append order preserved within the same instant.
        assert_eq!(all[0].temperature, Some(20.0));
        assert_eq!(all[1].temperature, Some(20.5));
        assert_eq!(all[2].temperature, Some(21.0));
    }

    #[test]
    fn window_excludes_older_observations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ObservationStore::open(dir.path()).expect("open");
        let t0 = Utc::now();

        store.append(&obs(t0 - Duration::days(10), 10.0)).expect("append");
        store.append(&obs(t0 - Duration::days(3), 15.0)).expect("append");
        store.append(&obs(t0, 20.0)).expect("append");

        let windowed: Vec<_> = store.window(t0 - Duration::days(7)).collect();
        assert_eq!(windowed.len(), 2);
        assert_eq!(windowed[0].temperature, Some(15.0));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let t0 = Utc::now();

        {
            let store = ObservationStore::open(dir.path()).expect("open");
            store.append(&obs(t0, 20.0)).expect("append");
            store.append(&obs(t0, 20.5)).expect("append");
            store.flush().expect("flush");
        }

        let store = ObservationStore::open(dir.path()).expect("reopen");
        assert_eq!(store.count(), 2);

        // Sequence resumes past existing keys, so same-instant appends after
        // a restart must not overwrite old rows.
        store.append(&obs(t0, 21.0)).expect("append");
        assert_eq!(store.count(), 3);
    }

    #[test]
    fn cleanup_before_removes_only_older() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ObservationStore::open(dir.path()).expect("open");
        let t0 = Utc::now();

        store.append(&obs(t0 - Duration::days(40), 5.0)).expect("append");
        store.append(&obs(t0 - Duration::days(2), 15.0)).expect("append");
        store.append(&obs(t0, 20.0)).expect("append");

        let deleted = store.cleanup_before(t0 - Duration::days(30)).expect("cleanup");
        assert_eq!(deleted, 1);
        assert_eq!(store.count(), 2);
        let stats = store.stats();
        assert_eq!(stats.observation_count, 2);
        assert!(stats.oldest_timestamp.expect("oldest") > t0 - Duration::days(3));
    }

    #[test]
    fn empty_store_has_no_most_recent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ObservationStore::open(dir.path()).expect("open");
        assert!(store.most_recent().is_none());
        assert_eq!(store.count(), 0);
        assert!(store.stats().newest_timestamp.is_none());
    }
}
