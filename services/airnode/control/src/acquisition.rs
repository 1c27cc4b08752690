//! Acquisition stage: query each sensor once, publish the readings and feed
//! the particulate accumulators.

use crate::cycle::CycleState;
use crate::error::ControlError;
use crate::topics::Topics;
use airnode_sensors::{caqi, AirQuality, Climate, GasSensor, Particulates, Pressure, Sensor};
use airnode_session::Publish;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default CAQI averaging window
pub const DEFAULT_INDEX_WINDOW: Duration = Duration::from_secs(3600);

/// The node's sensors, each owned exclusively
pub struct SensorSuite {
    /// Temperature / humidity
    pub climate: Box<dyn Sensor<Reading = Climate>>,
    /// Barometer
    pub pressure: Box<dyn Sensor<Reading = Pressure>>,
    /// Gas sensor
    pub gas: Box<dyn GasSensor>,
    /// Particulate sensor; `None` readings are missed samples
    pub particulates: Box<dyn Sensor<Reading = Option<Particulates>>>,
}

/// What one cycle measured and sent
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Climate reading, reused for gas humidity compensation
    pub climate: Climate,
    /// Pressure reading
    pub pressure: Pressure,
    /// Gas reading
    pub air_quality: AirQuality,
    /// Particulate reading, if the sensor produced one
    pub particulates: Option<Particulates>,
    /// Index published this cycle
    pub index: Option<u32>,
    /// Messages written to the broker
    pub published: u64,
}

/// Temperature payload: one decimal
pub fn format_temperature(temperature_c: f64) -> String {
    format!("{:.1}", temperature_c)
}

/// Humidity payload: whole percent
pub fn format_humidity(relative_humidity: f64) -> String {
    format!("{:.0}", relative_humidity)
}

/// Pressure payload: pascals rounded to the nearest 10
pub fn format_pressure(pascals: f64) -> String {
    let rounded = (pascals / 10.0).round() as i64 * 10;
    rounded.to_string()
}

/// Per-cycle sensor sweep
pub struct Acquisition {
    sensors: SensorSuite,
    topics: Topics,
    index_window: Duration,
}

impl Acquisition {
    /// Build the stage over a sensor suite
    pub fn new(sensors: SensorSuite, topics: Topics) -> Self {
        Self {
            sensors,
            topics,
            index_window: DEFAULT_INDEX_WINDOW,
        }
    }

    /// Override the CAQI averaging window
    pub fn with_index_window(mut self, window: Duration) -> Self {
        self.index_window = window;
        self
    }

    /// Topic names in use
    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Gas sensor, for baseline maintenance
    pub fn gas_mut(&mut self) -> &mut dyn GasSensor {
        self.sensors.gas.as_mut()
    }

    /// One-time sensor initialisation.
    ///
    /// A refused gas-sensor init is logged and tolerated; any other failure
    /// is returned.
    pub async fn init_sensors(&mut self) -> Result<(), ControlError> {
        let climate = &mut self.sensors.climate;
        climate.init().await.map_err(|e| {
            warn!("Could not calibrate {}: {}", climate.name(), e);
            e
        })?;

        self.sensors.pressure.init().await?;

        let gas = &mut self.sensors.gas;
        if let Err(e) = gas.init().await {
            warn!("{} init failed, continuing with factory state: {}", gas.name(), e);
        }

        self.sensors.particulates.init().await?;
        debug!("Sensors initialised");
        Ok(())
    }

    /// Run one cycle: read every sensor in fixed order and publish.
    ///
    /// Takes the cycle state by value and hands it back updated. A missed
    /// particulate sample skips accumulation and the particulate topics for
    /// this cycle only.
    pub async fn run<P>(
        &mut self,
        mut state: CycleState,
        publisher: &mut P,
    ) -> Result<(CycleState, CycleReport), ControlError>
    where
        P: Publish + ?Sized,
    {
        let mut published = 0u64;

        let climate = self.sensors.climate.read().await?;
        publisher
            .publish(&self.topics.temperature, format_temperature(climate.temperature_c).as_bytes())
            .await?;
        publisher
            .publish(&self.topics.humidity, format_humidity(climate.relative_humidity).as_bytes())
            .await?;
        published += 2;

        let pressure = self.sensors.pressure.read().await?;
        publisher
            .publish(&self.topics.pressure, format_pressure(pressure.pascals).as_bytes())
            .await?;
        published += 1;

        let air_quality = self.sensors.gas.read().await?;
        publisher
            .publish(&self.topics.eco2, air_quality.eco2_ppm.to_string().as_bytes())
            .await?;
        publisher
            .publish(&self.topics.tvoc, air_quality.tvoc_ppb.to_string().as_bytes())
            .await?;
        published += 2;

        let particulates = self.sensors.particulates.read().await?;
        let mut index = None;
        match particulates {
            Some(pm) => {
                state.accumulate(&pm);

                let now = Instant::now();
                if state.index_due(now, self.index_window) {
                    if let Some((pm2_5_avg, pm10_avg)) = state.take_index_average(now) {
                        let value = caqi(pm2_5_avg, pm10_avg);
                        info!(
                            "CAQI {} from averages pm2.5={} pm10={}",
                            value, pm2_5_avg, pm10_avg
                        );
                        publisher
                            .publish(&self.topics.caqi, value.to_string().as_bytes())
                            .await?;
                        published += 1;
                        index = Some(value);
                    }
                }

                publisher
                    .publish(&self.topics.pm01, pm.pm1_0.to_string().as_bytes())
                    .await?;
                publisher
                    .publish(&self.topics.pm25, pm.pm2_5.to_string().as_bytes())
                    .await?;
                publisher
                    .publish(&self.topics.pm100, pm.pm10_0.to_string().as_bytes())
                    .await?;
                published += 3;
            }
            None => {
                warn!(
                    "No reading from {}, skipping particulates this cycle",
                    self.sensors.particulates.name()
                );
            }
        }

        Ok((
            state,
            CycleReport {
                climate,
                pressure,
                air_quality,
                particulates,
                index,
                published,
            },
        ))
    }
}
