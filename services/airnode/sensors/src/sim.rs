//! Deterministic simulated sensors for running the node without hardware.
//!
//! Readings follow a slow repeating pattern so published series look alive
//! while staying reproducible across runs.

use crate::error::SensorError;
use crate::measurement::{AirQuality, Baseline, Climate, Particulates, Pressure};
use crate::sensor::{GasSensor, Sensor};
use async_trait::async_trait;
use tracing::debug;

/// Repeating offset pattern, one step per reading
const WAVE: [i32; 8] = [0, 1, 2, 3, 2, 1, 0, -1];

fn wave(tick: usize) -> i32 {
    WAVE[tick % WAVE.len()]
}

/// Simulated temperature / humidity sensor
#[derive(Debug, Clone)]
pub struct SimClimate {
    temperature_c: f64,
    relative_humidity: f64,
    calibrates: bool,
    tick: usize,
}

impl SimClimate {
    /// Sensor centred on the given conditions
    pub fn new(temperature_c: f64, relative_humidity: f64) -> Self {
        Self {
            temperature_c,
            relative_humidity,
            calibrates: true,
            tick: 0,
        }
    }

    /// Make [`Sensor::init`] fail as an uncalibratable part would
    pub fn refusing_calibration(mut self) -> Self {
        self.calibrates = false;
        self
    }
}

impl Default for SimClimate {
    fn default() -> Self {
        Self::new(21.0, 45.0)
    }
}

#[async_trait]
impl Sensor for SimClimate {
    type Reading = Climate;

    fn name(&self) -> &'static str {
        "sim-climate"
    }

    async fn init(&mut self) -> Result<(), SensorError> {
        if !self.calibrates {
            return Err(SensorError::CalibrationRefused(self.name()));
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<Climate, SensorError> {
        let step = f64::from(wave(self.tick));
        self.tick += 1;
        Ok(Climate {
            temperature_c: self.temperature_c + 0.15 * step,
            relative_humidity: (self.relative_humidity + step).clamp(0.0, 100.0),
        })
    }
}

/// Simulated barometer
#[derive(Debug, Clone)]
pub struct SimPressure {
    pascals: f64,
    tick: usize,
}

impl SimPressure {
    /// Barometer centred on `pascals`
    pub fn new(pascals: f64) -> Self {
        Self { pascals, tick: 0 }
    }
}

impl Default for SimPressure {
    fn default() -> Self {
        Self::new(101_325.0)
    }
}

#[async_trait]
impl Sensor for SimPressure {
    type Reading = Pressure;

    fn name(&self) -> &'static str {
        "sim-pressure"
    }

    async fn init(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    async fn read(&mut self) -> Result<Pressure, SensorError> {
        let step = f64::from(wave(self.tick));
        self.tick += 1;
        Ok(Pressure {
            pascals: self.pascals + 7.0 * step,
        })
    }
}

/// Simulated gas sensor with a mutable baseline
#[derive(Debug, Clone)]
pub struct SimGas {
    baseline: Baseline,
    absolute_humidity: Option<f64>,
    initialises: bool,
    tick: usize,
}

impl SimGas {
    /// Gas sensor starting from a factory baseline
    pub fn new() -> Self {
        Self {
            baseline: Baseline {
                eco2: 0x8973,
                tvoc: 0x8AAE,
            },
            absolute_humidity: None,
            initialises: true,
            tick: 0,
        }
    }

    /// Make [`Sensor::init`] report a refused init sequence
    pub fn refusing_init(mut self) -> Self {
        self.initialises = false;
        self
    }

    /// Last humidity compensation applied, g/m³
    pub fn absolute_humidity(&self) -> Option<f64> {
        self.absolute_humidity
    }
}

impl Default for SimGas {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sensor for SimGas {
    type Reading = AirQuality;

    fn name(&self) -> &'static str {
        "sim-gas"
    }

    async fn init(&mut self) -> Result<(), SensorError> {
        if !self.initialises {
            return Err(SensorError::CalibrationRefused(self.name()));
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<AirQuality, SensorError> {
        let step = wave(self.tick);
        self.tick += 1;
        Ok(AirQuality {
            eco2_ppm: (420 + 15 * step) as u16,
            tvoc_ppb: (12 + 3 * step) as u16,
        })
    }
}

#[async_trait]
impl GasSensor for SimGas {
    async fn baseline(&mut self) -> Result<Baseline, SensorError> {
        Ok(self.baseline)
    }

    async fn set_baseline(&mut self, baseline: Baseline) -> Result<(), SensorError> {
        self.baseline = baseline.validate()?;
        debug!("Simulated gas baseline set to {:?}", self.baseline);
        Ok(())
    }

    async fn set_absolute_humidity(&mut self, grams_per_m3: f64) -> Result<(), SensorError> {
        self.absolute_humidity = Some(grams_per_m3);
        Ok(())
    }
}

/// Simulated particulate sensor
#[derive(Debug, Clone, Default)]
pub struct SimParticulates {
    miss_every: Option<usize>,
    tick: usize,
}

impl SimParticulates {
    /// Sensor that always produces a reading
    pub fn new() -> Self {
        Self::default()
    }

    /// Report no reading on every `n`th query, as a timed-out serial read would
    pub fn missing_every(mut self, n: usize) -> Self {
        self.miss_every = Some(n.max(1));
        self
    }
}

#[async_trait]
impl Sensor for SimParticulates {
    type Reading = Option<Particulates>;

    fn name(&self) -> &'static str {
        "sim-particulates"
    }

    async fn init(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Particulates>, SensorError> {
        self.tick += 1;
        if let Some(n) = self.miss_every {
            if self.tick % n == 0 {
                return Ok(None);
            }
        }
        let step = (wave(self.tick) + 1) as u16;
        Ok(Some(Particulates {
            pm1_0: 3 + step,
            pm2_5: 6 + 2 * step,
            pm10_0: 9 + 3 * step,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_climate_is_deterministic() {
        let mut a = SimClimate::default();
        let mut b = SimClimate::default();
        for _ in 0..10 {
            assert_eq!(a.read().await.unwrap(), b.read().await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_climate_calibration_refusal() {
        let mut sensor = SimClimate::default().refusing_calibration();
        assert!(matches!(
            sensor.init().await,
            Err(SensorError::CalibrationRefused("sim-climate"))
        ));
    }

    #[tokio::test]
    async fn test_gas_baseline_round_trip() {
        let mut gas = SimGas::new();
        let restored = Baseline {
            eco2: 0x1234,
            tvoc: 0x5678,
        };
        gas.set_baseline(restored).await.unwrap();
        assert_eq!(gas.baseline().await.unwrap(), restored);

        assert!(gas
            .set_baseline(Baseline { eco2: 0, tvoc: 0 })
            .await
            .is_err());
        assert_eq!(gas.baseline().await.unwrap(), restored);
    }

    #[tokio::test]
    async fn test_particulates_miss_schedule() {
        let mut pms = SimParticulates::new().missing_every(3);
        let mut misses = 0;
        for _ in 0..6 {
            if pms.read().await.unwrap().is_none() {
                misses += 1;
            }
        }
        assert_eq!(misses, 2);
    }
}
