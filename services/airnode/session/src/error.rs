//! Session error types.

use airnode_wire::ProtocolError;
use std::time::Duration;
use thiserror::Error;

/// Link and stream failures
#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not open the stream to the broker
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Broker address as configured
        addr: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// A bounded wait expired
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Operation needs an open connection
    #[error("not connected")]
    NotConnected,

    /// Peer closed the stream mid-frame
    #[error("stream closed by peer")]
    Closed,

    /// Read or write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything the protocol client can fail with
#[derive(Error, Debug)]
pub enum SessionError {
    /// Link or stream failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Malformed, unexpected or refused frame
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Whether the underlying stream can no longer be trusted
    pub fn is_transport(&self) -> bool {
        matches!(self, SessionError::Transport(_))
    }
}
