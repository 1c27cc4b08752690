//! Reading broker-initiated frames off an established stream.

use crate::error::{SessionError, TransportError};
use crate::transport::with_timeout;
use airnode_wire::{
    encode_puback, publish_qos, ProtocolError, RemainingLengthDecoder, PINGRESP_HEADER,
    PUBLISH_QOS0_HEADER,
};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Frame observed by [`crate::ProtocolClient::wait_for_frame`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Broker delivered a PUBLISH; its body has been consumed
    Publish {
        /// Fixed header byte
        header: u8,
        /// Packet identifier for QoS 1 and 2 deliveries; only QoS 1 is acknowledged
        packet_id: Option<u16>,
        /// Payload length in bytes
        payload_len: usize,
    },
    /// Any other control packet; only its header byte has been consumed
    Other(u8),
}

/// Outcome of one inbound poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Polled {
    /// Idle for the whole wait, or a PINGRESP
    Nothing,
    /// Empty read: the peer closed its end
    Eof,
    /// A frame worth reporting
    Frame(InboundFrame),
}

/// Read one inbound frame.
pub(crate) async fn read_frame<S>(
    stream: &mut S,
    idle: Duration,
    io_timeout: Duration,
) -> Result<Polled, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut first = [0u8; 1];
    let n = match tokio::time::timeout(idle, stream.read(&mut first)).await {
        Err(_) => return Ok(Polled::Nothing),
        Ok(result) => result.map_err(TransportError::Io)?,
    };
    if n == 0 {
        return Ok(Polled::Eof);
    }

    let header = first[0];
    if header == PINGRESP_HEADER {
        let len = read_remaining_length(stream, io_timeout).await?;
        discard(stream, len, io_timeout).await?;
        trace!("PINGRESP received");
        return Ok(Polled::Nothing);
    }

    if header & 0xF0 != PUBLISH_QOS0_HEADER {
        debug!("Unhandled control packet 0x{:02X}", header);
        return Ok(Polled::Frame(InboundFrame::Other(header)));
    }

    let mut remaining = read_remaining_length(stream, io_timeout).await?;
    let topic_len = usize::from(with_timeout(io_timeout, stream.read_u16()).await?);
    remaining = remaining
        .checked_sub(2 + topic_len)
        .ok_or(ProtocolError::Malformed)?;
    discard(stream, topic_len, io_timeout).await?;

    let qos = publish_qos(header);
    let mut packet_id = None;
    if qos > 0 {
        let pid = with_timeout(io_timeout, stream.read_u16()).await?;
        remaining = remaining.checked_sub(2).ok_or(ProtocolError::Malformed)?;
        if qos == 1 {
            with_timeout(io_timeout, stream.write_all(&encode_puback(pid))).await?;
            trace!("Acknowledged inbound publish {}", pid);
        }
        packet_id = Some(pid);
    }

    discard(stream, remaining, io_timeout).await?;
    Ok(Polled::Frame(InboundFrame::Publish {
        header,
        packet_id,
        payload_len: remaining,
    }))
}

async fn read_remaining_length<S>(stream: &mut S, io_timeout: Duration) -> Result<usize, SessionError>
where
    S: AsyncRead + Unpin,
{
    let mut decoder = RemainingLengthDecoder::new();
    loop {
        let byte = with_timeout(io_timeout, stream.read_u8()).await?;
        if let Some(len) = decoder.push(byte)? {
            return Ok(len);
        }
    }
}

async fn discard<S>(stream: &mut S, len: usize, io_timeout: Duration) -> Result<(), SessionError>
where
    S: AsyncRead + Unpin,
{
    if len == 0 {
        return Ok(());
    }
    let mut limited = (&mut *stream).take(len as u64);
    let copied = with_timeout(io_timeout, tokio::io::copy(&mut limited, &mut tokio::io::sink())).await?;
    if copied < len as u64 {
        return Err(TransportError::Closed.into());
    }
    Ok(())
}
