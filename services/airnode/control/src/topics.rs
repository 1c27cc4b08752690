//! Published topic names.

/// Full topic names for every published quantity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Temperature, °C with one decimal
    pub temperature: String,
    /// Relative humidity, whole percent
    pub humidity: String,
    /// Pressure, Pa rounded to 10
    pub pressure: String,
    /// Equivalent CO2, ppm
    pub eco2: String,
    /// TVOC, ppb
    pub tvoc: String,
    /// Hourly air-quality index
    pub caqi: String,
    /// PM1.0, µg/m³
    pub pm01: String,
    /// PM2.5, µg/m³
    pub pm25: String,
    /// PM10, µg/m³
    pub pm100: String,
}

impl Topics {
    /// Topics under `prefix/`; an empty prefix yields bare names
    pub fn new(prefix: &str) -> Self {
        let topic = |name: &str| {
            if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", prefix.trim_end_matches('/'), name)
            }
        };
        Self {
            temperature: topic("temperature"),
            humidity: topic("humidity"),
            pressure: topic("pressure"),
            eco2: topic("eco2"),
            tvoc: topic("tvoc"),
            caqi: topic("caqi"),
            pm01: topic("pm01"),
            pm25: topic("pm25"),
            pm100: topic("pm100"),
        }
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::new("box01")
    }
}
