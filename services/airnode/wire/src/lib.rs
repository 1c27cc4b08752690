//! Packet framing and remaining-length encoding for the airnode broker protocol.
//!
//! This crate is pure: it builds and parses byte buffers and never touches a
//! socket. The session crate owns all I/O.
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------------+
//! | u8 header            | packet type (hi nibble) + flags  |
//! +----------------------+----------------------------------+
//! | remaining length     | 1..4 bytes, base-128 + cont. bit |
//! +----------------------+----------------------------------+
//! | variable header      | packet specific, big-endian      |
//! +----------------------+----------------------------------+
//! | payload              | u16-prefixed strings / raw bytes |
//! +----------------------+----------------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod packet;

// Re-export main types
pub use codec::{
    decode_remaining_length, encode_remaining_length, put_remaining_length, EncodedLength,
    RemainingLengthDecoder, MAX_LENGTH_BYTES, MAX_REMAINING_LENGTH,
};
pub use error::ProtocolError;
pub use packet::{
    encode_puback, publish_qos, put_str, ConnAck, ConnectFlags, ConnectPacket, Credentials,
    PacketType, PublishPacket, CONNACK_LEN, DISCONNECT, PINGREQ, PINGRESP_HEADER,
    PUBLISH_QOS0_HEADER,
};
