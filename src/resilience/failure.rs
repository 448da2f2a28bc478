//! Sensor failure taxonomy and classification
//!
//! Every fallible dependency call in the sensing path surfaces a
//! [`SensorFailure`]. Classification into a [`FailureClass`] is a pure
//! function over the failure value; the retry executor and circuit breaker
//! branch on the class, never on the concrete variant.

use thiserror::Error;

// ============================================================================
// Failure Type
// ============================================================================

/// A failed interaction with an unreliable dependency (sensor bus, remote
/// gateway, actuator).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SensorFailure {
    /// A required dependency (driver, bus handle, config key) is missing.
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    /// The caller passed an argument the dependency rejects.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The peripheral bus timed out mid-transaction.
    #[error("Bus timeout on {device}")]
    BusTimeout { device: String },

    /// The device responded but is not ready to service the request.
    #[error("Device not ready: {device}")]
    DeviceNotReady { device: String },

    /// Local I/O fault while talking to the peripheral.
    #[error("I/O fault: {0}")]
    Io(String),

    /// A remote peer refused the connection.
    #[error("Connection refused by {endpoint}")]
    ConnectionRefused { endpoint: String },

    /// Name resolution for a remote peer failed.
    #[error("DNS resolution failed for {endpoint}")]
    DnsFailure { endpoint: String },

    /// A remote call timed out.
    #[error("Remote timeout talking to {endpoint}")]
    RemoteTimeout { endpoint: String },

    /// The caller has marked this failure as not worth retrying.
    #[error("Non-recoverable: {0}")]
    NonRecoverable(String),

    /// The protecting circuit is open; the call was rejected without
    /// touching the dependency.
    #[error("Circuit open for {device}")]
    CircuitOpen { device: String },

    /// Anything else, treated as transient.
    #[error("Read failed: {0}")]
    ReadFailed(String),
}

impl From<std::io::Error> for SensorFailure {
    fn from(err: std::io::Error) -> Self {
        SensorFailure::Io(err.to_string())
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Category a failure falls into, deciding retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Default class; retried with the standard policy
    Transient,
    /// Explicitly non-recoverable; never retried
    Permanent,
    /// Bus/peripheral fault; retried with capped attempts
    Hardware,
    /// Remote call fault; retried with more attempts than Hardware
    Network,
    /// Missing dependency or invalid argument; never retried
    Config,
}

impl FailureClass {
    /// Classify a failure. Deterministic and side-effect free.
    ///
    /// Priority order, first match wins:
    /// 1. missing dependency / invalid argument → Config
    /// 2. bus/peripheral fault → Hardware
    /// 3. remote call fault → Network
    /// 4. caller-marked non-recoverable (incl. circuit-open) → Permanent
    /// 5. everything else → Transient
    pub fn classify(failure: &SensorFailure) -> Self {
        match failure {
            SensorFailure::MissingDependency(_) | SensorFailure::InvalidArgument(_) => {
                FailureClass::Config
            }
            SensorFailure::BusTimeout { .. }
            | SensorFailure::DeviceNotReady { .. }
            | SensorFailure::Io(_) => FailureClass::Hardware,
            SensorFailure::ConnectionRefused { .. }
            | SensorFailure::DnsFailure { .. }
            | SensorFailure::RemoteTimeout { .. } => FailureClass::Network,
            SensorFailure::NonRecoverable(_) | SensorFailure::CircuitOpen { .. } => {
                FailureClass::Permanent
            }
            SensorFailure::ReadFailed(_) => FailureClass::Transient,
        }
    }

    /// Whether a failure of this class should be retried at all.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureClass::Permanent | FailureClass::Config)
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureClass::Transient => write!(f, "transient"),
            FailureClass::Permanent => write!(f, "permanent"),
            FailureClass::Hardware => write!(f, "hardware"),
            FailureClass::Network => write!(f, "network"),
            FailureClass::Config => write!(f, "config"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_failures_never_retryable() {
        let class = FailureClass::classify(&SensorFailure::MissingDependency("i2c bus".into()));
        assert_eq!(class, FailureClass::Config);
        assert!(!class.is_retryable());

        let class = FailureClass::classify(&SensorFailure::InvalidArgument("addr 0x00".into()));
        assert_eq!(class, FailureClass::Config);
        assert!(!class.is_retryable());
    }

    #[test]
    fn bus_faults_are_hardware() {
        let class = FailureClass::classify(&SensorFailure::BusTimeout {
            device: "bme280".into(),
        });
        assert_eq!(class, FailureClass::Hardware);
        assert!(class.is_retryable());

        let io: SensorFailure =
            std::io::Error::new(std::io::ErrorKind::TimedOut, "i2c stall").into();
        assert_eq!(FailureClass::classify(&io), FailureClass::Hardware);
    }

    #[test]
    fn remote_faults_are_network() {
        for failure in [
            SensorFailure::ConnectionRefused {
                endpoint: "gateway:8443".into(),
            },
            SensorFailure::DnsFailure {
                endpoint: "gateway.local".into(),
            },
            SensorFailure::RemoteTimeout {
                endpoint: "gateway:8443".into(),
            },
        ] {
            assert_eq!(FailureClass::classify(&failure), FailureClass::Network);
        }
    }

    #[test]
    fn non_recoverable_and_circuit_open_are_permanent() {
        let class = FailureClass::classify(&SensorFailure::NonRecoverable("fried sensor".into()));
        assert_eq!(class, FailureClass::Permanent);
        assert!(!class.is_retryable());

        let class = FailureClass::classify(&SensorFailure::CircuitOpen {
            device: "bme280".into(),
        });
        assert_eq!(class, FailureClass::Permanent);
    }

    #[test]
    fn default_is_transient() {
        let class = FailureClass::classify(&SensorFailure::ReadFailed("garbled frame".into()));
        assert_eq!(class, FailureClass::Transient);
        assert!(class.is_retryable());
    }
}
