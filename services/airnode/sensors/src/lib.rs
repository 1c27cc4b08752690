//! Sensor capabilities for airnode.
//!
//! Drivers sit behind the [`Sensor`] and [`GasSensor`] traits so the
//! acquisition stage can be exercised against simulated or fake devices.
//! This crate also carries the pure functions the node derives from raw
//! readings: absolute humidity for gas compensation and the CAQI index.

#![warn(missing_docs)]

pub mod caqi;
pub mod error;
pub mod measurement;
pub mod pms;
pub mod sensor;
pub mod sim;

pub use caqi::caqi;
pub use error::SensorError;
pub use measurement::{absolute_humidity, AirQuality, Baseline, Climate, Particulates, Pressure};
pub use pms::{parse_frame, Pms7003, PmsCommand, PmsFrame};
pub use sensor::{GasSensor, Sensor};
