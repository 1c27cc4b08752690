//! Remaining-length encoding.
//!
//! Each byte carries seven significant bits, least significant group first;
//! the high bit is set while more bytes follow. Four bytes cover values up
//! to [`MAX_REMAINING_LENGTH`].

use crate::error::ProtocolError;
use bytes::{Buf, BufMut};
use smallvec::SmallVec;

/// Largest value representable in four encoded bytes
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Maximum number of bytes a remaining length may occupy
pub const MAX_LENGTH_BYTES: usize = 4;

const CONTINUATION: u8 = 0x80;
const VALUE_MASK: u8 = 0x7F;

/// Encoded remaining length, never longer than four bytes
pub type EncodedLength = SmallVec<[u8; MAX_LENGTH_BYTES]>;

/// Encode `n` with the base-128 continuation-bit scheme
pub fn encode_remaining_length(n: usize) -> Result<EncodedLength, ProtocolError> {
    if n > MAX_REMAINING_LENGTH {
        return Err(ProtocolError::LengthOverflow(n));
    }

    let mut out = EncodedLength::new();
    let mut rest = n;
    loop {
        let mut byte = (rest & VALUE_MASK as usize) as u8;
        rest >>= 7;
        if rest > 0 {
            byte |= CONTINUATION;
        }
        out.push(byte);
        if rest == 0 {
            return Ok(out);
        }
    }
}

/// Append the encoding of `n` to `buf`, returning the number of bytes written
pub fn put_remaining_length<B: BufMut>(buf: &mut B, n: usize) -> Result<usize, ProtocolError> {
    let encoded = encode_remaining_length(n)?;
    buf.put_slice(&encoded);
    Ok(encoded.len())
}

/// Decode a remaining length from the front of `buf`, one byte at a time.
///
/// Consumes exactly the bytes of the length field. Fails with
/// [`ProtocolError::MalformedLength`] when four bytes pass without a
/// terminator and with [`ProtocolError::Incomplete`] when `buf` runs out.
pub fn decode_remaining_length<B: Buf>(buf: &mut B) -> Result<usize, ProtocolError> {
    let mut decoder = RemainingLengthDecoder::new();
    while buf.has_remaining() {
        if let Some(n) = decoder.push(buf.get_u8())? {
            return Ok(n);
        }
    }
    Err(ProtocolError::Incomplete)
}

/// Incremental decoder for byte sources that deliver one byte per read
#[derive(Debug, Default, Clone)]
pub struct RemainingLengthDecoder {
    value: usize,
    consumed: usize,
}

impl RemainingLengthDecoder {
    /// Create a decoder with no bytes consumed
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next byte; returns the value once the terminating byte arrives
    pub fn push(&mut self, byte: u8) -> Result<Option<usize>, ProtocolError> {
        if self.consumed >= MAX_LENGTH_BYTES {
            return Err(ProtocolError::MalformedLength(self.consumed + 1));
        }

        self.value |= ((byte & VALUE_MASK) as usize) << (7 * self.consumed);
        self.consumed += 1;

        if byte & CONTINUATION == 0 {
            Ok(Some(self.value))
        } else if self.consumed == MAX_LENGTH_BYTES {
            Err(ProtocolError::MalformedLength(self.consumed))
        } else {
            Ok(None)
        }
    }

    /// Number of bytes consumed so far
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}
