//! Control error types.

use airnode_sensors::SensorError;
use airnode_session::{SessionError, TransportError};
use airnode_storage::StorageError;
use thiserror::Error;

/// Failures surfaced to the duty-cycle controller
#[derive(Error, Debug)]
pub enum ControlError {
    /// Radio link could not be brought up
    #[error("link error: {0}")]
    Link(#[from] TransportError),

    /// Broker connection or publish failed
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Sensor init or read failed
    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// Baseline persistence failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Stored baseline does not fit a sensor word
    #[error("stored value {value} for {name} out of range")]
    BaselineRange {
        /// Stored name
        name: &'static str,
        /// Offending value
        value: i64,
    },
}
