//! Typed sensor readings and the derived quantities computed from them.

use crate::error::SensorError;

/// Temperature / relative-humidity sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    /// Degrees Celsius
    pub temperature_c: f64,
    /// Relative humidity, percent
    pub relative_humidity: f64,
}

/// Barometric pressure sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pressure {
    /// Pascals
    pub pascals: f64,
}

/// Gas sensor sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AirQuality {
    /// Equivalent CO2, ppm
    pub eco2_ppm: u16,
    /// Total volatile organic compounds, ppb
    pub tvoc_ppb: u16,
}

/// Atmospheric particulate mass concentrations, µg/m³
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Particulates {
    /// PM1.0
    pub pm1_0: u16,
    /// PM2.5
    pub pm2_5: u16,
    /// PM10
    pub pm10_0: u16,
}

/// Gas sensor calibration baseline words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    /// Equivalent CO2 baseline
    pub eco2: u16,
    /// TVOC baseline
    pub tvoc: u16,
}

impl Baseline {
    /// Reject the all-zero baseline a freshly reset sensor reports
    pub fn validate(self) -> Result<Self, SensorError> {
        if self.eco2 == 0 && self.tvoc == 0 {
            return Err(SensorError::InvalidBaseline {
                eco2: self.eco2,
                tvoc: self.tvoc,
            });
        }
        Ok(self)
    }
}

/// Absolute humidity in g/m³ from temperature (°C) and relative humidity (%).
///
/// Magnus approximation as used for gas-sensor humidity compensation.
pub fn absolute_humidity(temperature_c: f64, relative_humidity: f64) -> f64 {
    let saturation = 6.112 * ((17.62 * temperature_c) / (243.12 + temperature_c)).exp();
    216.7 * ((relative_humidity / 100.0) * saturation / (273.15 + temperature_c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_humidity_reference_points() {
        // 25 °C at 50 % holds roughly 11.5 g/m³
        let ah = absolute_humidity(25.0, 50.0);
        assert!((ah - 11.5).abs() < 0.1, "got {}", ah);

        // 0 °C at 100 % holds roughly 4.85 g/m³
        let ah = absolute_humidity(0.0, 100.0);
        assert!((ah - 4.85).abs() < 0.05, "got {}", ah);

        assert_eq!(absolute_humidity(20.0, 0.0), 0.0);
    }

    #[test]
    fn test_baseline_validation() {
        assert!(Baseline { eco2: 0, tvoc: 0 }.validate().is_err());
        assert!(Baseline { eco2: 0x8973, tvoc: 0 }.validate().is_ok());
    }
}
