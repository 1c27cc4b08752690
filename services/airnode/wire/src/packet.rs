//! Packet layouts for the publish-only subset of the protocol.
//!
//! ```text
//! CONNECT     0x10 | rlen | 00 04 'M' 'Q' 'T' 'T' | 04 | flags | ka_hi ka_lo | id [user pass]
//! CONNACK     0x20 | 0x02 | ack flags | return code
//! PUBLISH     0x30 | rlen | topic_len(2) topic | payload
//! PUBACK      0x40 | 0x02 | pid_hi pid_lo
//! PINGREQ     0xC0 0x00
//! PINGRESP    0xD0 0x00
//! DISCONNECT  0xE0 0x00
//! ```

use crate::codec::put_remaining_length;
use crate::error::ProtocolError;
use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

/// Protocol name carried in the CONNECT variable header
pub const PROTOCOL_NAME: &[u8] = b"MQTT";

/// Protocol level 4 (3.1.1)
pub const PROTOCOL_LEVEL: u8 = 4;

/// Fixed part of the CONNECT variable header: name prefix + name + level + flags + keepalive
pub const CONNECT_VARIABLE_HEADER_LEN: usize = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2;

/// CONNACK is always four bytes on the wire
pub const CONNACK_LEN: usize = 4;

/// Ping request, two bytes
pub const PINGREQ: [u8; 2] = [0xC0, 0x00];

/// Disconnect, two bytes
pub const DISCONNECT: [u8; 2] = [0xE0, 0x00];

/// Fixed header byte of a ping response
pub const PINGRESP_HEADER: u8 = 0xD0;

/// Fixed header byte of a QoS 0 publish with no DUP/RETAIN flags
pub const PUBLISH_QOS0_HEADER: u8 = 0x30;

/// Largest string a 2-byte length prefix can describe
pub const MAX_STR_LEN: usize = u16::MAX as usize;

/// Control packet types, as carried in the high nibble of the fixed header
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Client request to open a session
    Connect = 0x1,
    /// Broker acknowledgement of CONNECT
    ConnAck = 0x2,
    /// Application message
    Publish = 0x3,
    /// QoS 1 publish acknowledgement
    PubAck = 0x4,
    /// Keepalive request
    PingReq = 0xC,
    /// Keepalive response
    PingResp = 0xD,
    /// Orderly session close
    Disconnect = 0xE,
}

impl PacketType {
    /// Classify a fixed header byte by its high nibble
    pub fn from_header(header: u8) -> Result<Self, ProtocolError> {
        Self::try_from(header >> 4)
    }

    /// Fixed header byte with all flag bits clear
    pub fn header(self) -> u8 {
        (self as u8) << 4
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x1 => Ok(PacketType::Connect),
            0x2 => Ok(PacketType::ConnAck),
            0x3 => Ok(PacketType::Publish),
            0x4 => Ok(PacketType::PubAck),
            0xC => Ok(PacketType::PingReq),
            0xD => Ok(PacketType::PingResp),
            0xE => Ok(PacketType::Disconnect),
            _ => Err(ProtocolError::Type(value)),
        }
    }
}

bitflags! {
    /// CONNECT flags byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConnectFlags: u8 {
        /// Broker discards prior session state for this client id
        const CLEAN_SESSION = 1 << 1;
        /// Password present in payload
        const PASSWORD = 1 << 6;
        /// User name present in payload
        const USERNAME = 1 << 7;
    }
}

/// QoS bits of a PUBLISH fixed header
pub fn publish_qos(header: u8) -> u8 {
    (header >> 1) & 0x03
}

/// Write a length-prefixed string: 2-byte big-endian length, then raw bytes
pub fn put_str<B: BufMut>(buf: &mut B, s: &[u8]) -> Result<(), ProtocolError> {
    if s.len() > MAX_STR_LEN {
        return Err(ProtocolError::FieldTooLong(s.len()));
    }
    buf.put_u16(s.len() as u16);
    buf.put_slice(s);
    Ok(())
}

/// Plaintext broker credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name
    pub username: String,
    /// Password
    pub password: String,
}

/// CONNECT packet
#[derive(Debug, Clone)]
pub struct ConnectPacket<'a> {
    /// Client identifier
    pub client_id: &'a str,
    /// Optional user name / password pair
    pub credentials: Option<&'a Credentials>,
    /// Keepalive interval in seconds, 0 disables it
    pub keepalive: u16,
    /// Ask the broker to discard previous session state
    pub clean_session: bool,
}

impl<'a> ConnectPacket<'a> {
    /// Flags byte for this handshake
    pub fn flags(&self) -> ConnectFlags {
        let mut flags = ConnectFlags::empty();
        if self.clean_session {
            flags |= ConnectFlags::CLEAN_SESSION;
        }
        if self.credentials.is_some() {
            flags |= ConnectFlags::USERNAME | ConnectFlags::PASSWORD;
        }
        flags
    }

    /// Bytes following the fixed header
    pub fn remaining_length(&self) -> usize {
        let mut size = CONNECT_VARIABLE_HEADER_LEN + 2 + self.client_id.len();
        if let Some(creds) = self.credentials {
            size += 2 + creds.username.len() + 2 + creds.password.len();
        }
        size
    }

    /// Encode the full packet
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let remaining = self.remaining_length();
        let mut buf = BytesMut::with_capacity(remaining + 5);

        buf.put_u8(PacketType::Connect.header());
        put_remaining_length(&mut buf, remaining)?;

        put_str(&mut buf, PROTOCOL_NAME)?;
        buf.put_u8(PROTOCOL_LEVEL);
        buf.put_u8(self.flags().bits());
        buf.put_u16(self.keepalive);

        put_str(&mut buf, self.client_id.as_bytes())?;
        if let Some(creds) = self.credentials {
            put_str(&mut buf, creds.username.as_bytes())?;
            put_str(&mut buf, creds.password.as_bytes())?;
        }

        trace!(
            "Encoded CONNECT client_id={} rlen={} flags={:#04x}",
            self.client_id,
            remaining,
            self.flags().bits()
        );
        Ok(buf.freeze())
    }
}

/// CONNECT acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    /// Acknowledge flags (third byte)
    pub ack_flags: u8,
    /// Return code (fourth byte)
    pub return_code: u8,
}

impl ConnAck {
    /// Parse the four CONNACK bytes
    pub fn parse(raw: &[u8; CONNACK_LEN]) -> Result<Self, ProtocolError> {
        let expected = PacketType::ConnAck.header();
        if raw[0] != expected {
            return Err(ProtocolError::UnexpectedFrame {
                expected,
                got: raw[0],
            });
        }
        Ok(Self {
            ack_flags: raw[2],
            return_code: raw[3],
        })
    }

    /// Session accepted iff bit 0 of the third byte is clear
    pub fn accepted(&self) -> bool {
        self.ack_flags & 0x01 == 0
    }
}

/// QoS 0 PUBLISH packet
#[derive(Debug, Clone)]
pub struct PublishPacket<'a> {
    /// Topic name
    pub topic: &'a str,
    /// Raw payload, sent without a length prefix
    pub payload: &'a [u8],
}

impl<'a> PublishPacket<'a> {
    /// Create a publish packet
    pub fn new(topic: &'a str, payload: &'a [u8]) -> Self {
        Self { topic, payload }
    }

    /// Bytes following the fixed header
    pub fn remaining_length(&self) -> usize {
        2 + self.topic.len() + self.payload.len()
    }

    /// Encode the full packet
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let remaining = self.remaining_length();
        let mut buf = BytesMut::with_capacity(remaining + 5);

        buf.put_u8(PUBLISH_QOS0_HEADER);
        put_remaining_length(&mut buf, remaining)?;
        put_str(&mut buf, self.topic.as_bytes())?;
        buf.put_slice(self.payload);

        Ok(buf.freeze())
    }
}

/// PUBACK echoing the packet identifier of an inbound QoS 1 publish
pub fn encode_puback(packet_id: u16) -> [u8; 4] {
    let [hi, lo] = packet_id.to_be_bytes();
    [PacketType::PubAck.header(), 0x02, hi, lo]
}
