//! Wire protocol error types.

use thiserror::Error;

/// Protocol errors: malformed or unexpected frames and encoding limits
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Remaining length did not terminate within four bytes
    #[error("malformed remaining length: no terminator after {0} bytes")]
    MalformedLength(usize),

    /// Value does not fit the four-byte remaining length encoding
    #[error("remaining length {0} exceeds encodable maximum")]
    LengthOverflow(usize),

    /// Byte source ran dry before the field was complete
    #[error("incomplete field")]
    Incomplete,

    /// Length-prefixed string longer than a 16-bit prefix can describe
    #[error("field too long: {0} bytes")]
    FieldTooLong(usize),

    /// Packet type nibble not known to this client
    #[error("unknown packet type {0:#04x}")]
    Type(u8),

    /// Frame of a different type than the one expected at this point
    #[error("unexpected frame: expected {expected:#04x}, got {got:#04x}")]
    UnexpectedFrame {
        /// Header byte the client was waiting for
        expected: u8,
        /// Header byte actually received
        got: u8,
    },

    /// Broker refused the session
    #[error("connection refused by broker (ack flags {flags:#04x}, return code {code})")]
    Rejected {
        /// Acknowledge flags byte from CONNACK
        flags: u8,
        /// Return code byte from CONNACK
        code: u8,
    },

    /// Frame too short for its declared structure
    #[error("malformed frame")]
    Malformed,
}
