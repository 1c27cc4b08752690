//! Broker session for the telemetry node: radio link, byte transport and the
//! publish-only protocol client.
//!
//! ## Features
//!
//! - **Link association**: power the radio and wait for association with a deadline
//! - **TCP Transport**: timed connect to the broker
//! - **Handshake**: CONNECT / CONNACK with optional credentials
//! - **Publishing**: QoS 0 fire-and-forget PUBLISH
//! - **Keepalive and teardown**: PINGREQ, DISCONNECT
//! - **Inbound frames**: PINGRESP consumption, QoS 1 acknowledgement
//!
//! ## Example
//!
//! ```rust,no_run
//! use airnode_session::{ClientIdentity, ProtocolClient, TcpTransport};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let identity = ClientIdentity::new("box01", "192.168.1.10", 1883);
//! let mut client = ProtocolClient::new(identity, TcpTransport);
//!
//! client.connect(true).await?;
//! client.publish("box01/temperature", b"21.4").await?;
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod inbound;
pub mod transport;

pub use client::{
    ClientIdentity, ClientState, ProtocolClient, Publish, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_IO_TIMEOUT,
};
pub use error::{SessionError, TransportError};
pub use inbound::InboundFrame;
pub use transport::{
    associate_with_timeout, with_timeout, HostLink, Link, LinkStatus, TcpTransport, Transport,
    DEFAULT_LINK_POLL, RADIO_WAKE_DELAY, RESOLVE_TIMEOUT,
};
