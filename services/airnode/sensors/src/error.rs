//! Sensor error types.

use std::time::Duration;
use thiserror::Error;

/// Sensor failures
#[derive(Error, Debug)]
pub enum SensorError {
    /// Frame checksum did not match its contents
    #[error("checksum mismatch: expected {expected:#06x}, got {got:#06x}")]
    Checksum {
        /// Checksum computed over the received bytes
        expected: u16,
        /// Checksum carried by the frame
        got: u16,
    },

    /// Device refused or failed its calibration / init sequence
    #[error("{0}: calibration refused")]
    CalibrationRefused(&'static str),

    /// Busy flag never cleared before the deadline
    #[error("{sensor}: still busy after {waited:?}")]
    BusyTimeout {
        /// Sensor name
        sensor: &'static str,
        /// How long the caller polled
        waited: Duration,
    },

    /// Baseline rejected by the gas sensor
    #[error("invalid baseline: eco2={eco2}, tvoc={tvoc}")]
    InvalidBaseline {
        /// Equivalent CO2 baseline word
        eco2: u16,
        /// TVOC baseline word
        tvoc: u16,
    },

    /// Bus or serial I/O failure
    #[error("sensor I/O error: {0}")]
    Io(#[from] std::io::Error),
}
