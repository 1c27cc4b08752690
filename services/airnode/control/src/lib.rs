//! Acquisition stage and duty-cycle controller for airnode.
//!
//! The [`Controller`] sequences radio association, sensor setup, broker
//! connection, one [`Acquisition`] sweep per cycle and the low-power sleeps
//! in between. Failures anywhere in a phase end in a supervised low-power
//! reset rather than a crash.
//!
//! ## Example
//!
//! ```rust,no_run
//! use airnode_control::{Acquisition, Controller, ControllerConfig, HostPower, SensorSuite, Topics};
//! use airnode_sensors::sim::{SimClimate, SimGas, SimParticulates, SimPressure};
//! use airnode_session::{ClientIdentity, HostLink, ProtocolClient, TcpTransport};
//! use airnode_storage::MemoryStore;
//!
//! # async fn example() {
//! let sensors = SensorSuite {
//!     climate: Box::new(SimClimate::default()),
//!     pressure: Box::new(SimPressure::default()),
//!     gas: Box::new(SimGas::new()),
//!     particulates: Box::new(SimParticulates::new()),
//! };
//! let client = ProtocolClient::new(ClientIdentity::new("box01", "broker", 1883), TcpTransport);
//! let mut controller = Controller::new(
//!     ControllerConfig::default(),
//!     client,
//!     HostLink::new("broker", 1883),
//!     HostPower,
//!     Acquisition::new(sensors, Topics::new("box01")),
//!     Box::new(MemoryStore::new()),
//! );
//! let stats = controller.run(Some(1), std::future::pending()).await;
//! println!("published {}", stats.messages_published);
//! # }
//! ```

#![warn(missing_docs)]

pub mod acquisition;
pub mod baseline;
pub mod controller;
pub mod cycle;
pub mod error;
pub mod power;
pub mod topics;

pub use acquisition::{
    format_humidity, format_pressure, format_temperature, Acquisition, CycleReport, SensorSuite,
    DEFAULT_INDEX_WINDOW,
};
pub use baseline::{persist_baseline, restore_baseline};
pub use controller::{
    Controller, ControllerConfig, ControllerStats, Phase, DEFAULT_BASELINE_INTERVAL,
    DEFAULT_LINK_TIMEOUT,
};
pub use cycle::CycleState;
pub use error::ControlError;
pub use power::{
    HostPower, PowerControl, DEFAULT_CYCLE_SLEEP, DEFAULT_FATAL_PARK, DEFAULT_FATAL_SLEEP,
    DEFAULT_SETTLE_SLEEP,
};
pub use topics::Topics;
