//! Sensor capability traits.
//!
//! Each physical sensor is owned by exactly one driver value constructed over
//! an explicit bus or serial handle.

use crate::error::SensorError;
use crate::measurement::{AirQuality, Baseline};
use async_trait::async_trait;

/// A device producing one typed reading per query
#[async_trait]
pub trait Sensor: Send {
    /// Reading type
    type Reading: Send;

    /// Short device name for logs
    fn name(&self) -> &'static str;

    /// One-time reset, calibration or mode selection
    async fn init(&mut self) -> Result<(), SensorError>;

    /// Take one reading
    async fn read(&mut self) -> Result<Self::Reading, SensorError>;
}

/// Gas sensor with a persistable calibration baseline
#[async_trait]
pub trait GasSensor: Sensor<Reading = AirQuality> {
    /// Current baseline words
    async fn baseline(&mut self) -> Result<Baseline, SensorError>;

    /// Restore a previously saved baseline; all-zero is rejected
    async fn set_baseline(&mut self, baseline: Baseline) -> Result<(), SensorError>;

    /// Humidity compensation, g/m³
    async fn set_absolute_humidity(&mut self, grams_per_m3: f64) -> Result<(), SensorError>;
}
