//! Sensor collaborator contract
//!
//! The physical drivers live outside this crate; they implement
//! [`SensorRead`] and nothing else. Every call into a driver goes through a
//! [`crate::resilience::ResilientInvoker`] before its output reaches the
//! observation log.

use async_trait::async_trait;

use crate::resilience::SensorFailure;
use crate::types::Observation;

/// One readable environmental sensor (or sensor head aggregating several
/// channels).
///
/// Implementations may be partially available; a reading with only some
/// channels populated is a success, not a failure. A failed read surfaces a
/// [`SensorFailure`] so the resilience layer can classify and retry it.
#[async_trait]
pub trait SensorRead: Send + Sync {
    /// Stable identifier for this sensor, used as the breaker registry key
    /// and in log fields (e.g. `"bme280"`, `"gateway:outdoor"`).
    fn device_id(&self) -> &str;

    /// Take one reading.
    async fn read(&self) -> Result<Observation, SensorFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct FixedSensor;

    #[async_trait]
    impl SensorRead for FixedSensor {
        fn device_id(&self) -> &str {
            "fixed"
        }

        async fn read(&self) -> Result<Observation, SensorFailure> {
            Ok(Observation::new(Utc::now(), 21.0, 1_013.0, 45.0))
        }
    }

    #[tokio::test]
    async fn trait_object_reads() {
        let sensor: Box<dyn SensorRead> = Box::new(FixedSensor);
        let obs = sensor.read().await.expect("read");
        assert_eq!(sensor.device_id(), "fixed");
        assert_eq!(obs.temperature, Some(21.0));
    }
}
