//! Plantower PMS7003 particulate sensor over a serial handle.
//!
//! The sensor is kept in passive mode: each reading wakes the fan, waits for
//! the airflow to settle, requests one frame and puts the sensor back to sleep.
//!
//! Frame layout (32 bytes, big-endian):
//!
//! | Offset | Field |
//! |---|---|
//! | 0..2 | start bytes `0x42 0x4D` |
//! | 2..4 | frame length |
//! | 4..10 | PM1.0 / PM2.5 / PM10, standard particle |
//! | 10..16 | PM1.0 / PM2.5 / PM10, atmospheric |
//! | 16..28 | particle counts >0.3, >0.5, >1.0, >2.5, >5.0, >10 µm per 0.1 L |
//! | 28 | version |
//! | 29 | error code |
//! | 30..32 | checksum: sum of bytes 0..30 |

use crate::error::SensorError;
use crate::measurement::Particulates;
use crate::sensor::Sensor;
use async_trait::async_trait;
use bytes::Buf;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// First start byte
pub const START_BYTE_1: u8 = 0x42;

/// Second start byte
pub const START_BYTE_2: u8 = 0x4D;

/// Full frame length including start bytes
pub const FRAME_LEN: usize = 32;

/// Bytes following the start bytes
pub const BODY_LEN: usize = FRAME_LEN - 2;

/// Give up on a frame after this long
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Fan run time before a reading is requested
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(30);

/// Pause after every command so the sensor can process it
pub const COMMAND_GAP: Duration = Duration::from_millis(50);

/// Back-off when the serial handle reports end of stream
const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(10);

/// Host-to-sensor commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmsCommand {
    /// Sensor streams frames continuously
    ActiveMode,
    /// Sensor answers only [`PmsCommand::RequestRead`]
    PassiveMode,
    /// Start the fan
    Wake,
    /// Stop the fan
    Sleep,
    /// Ask for one frame in passive mode
    RequestRead,
}

impl PmsCommand {
    /// Seven-byte command frame: start bytes, command, data word, checksum word
    pub fn frame(self) -> [u8; 7] {
        let (cmd, data) = match self {
            PmsCommand::ActiveMode => (0xE1, 0x01),
            PmsCommand::PassiveMode => (0xE1, 0x00),
            PmsCommand::Wake => (0xE4, 0x01),
            PmsCommand::Sleep => (0xE4, 0x00),
            PmsCommand::RequestRead => (0xE2, 0x00),
        };
        let sum = u16::from(START_BYTE_1) + u16::from(START_BYTE_2) + cmd + data;
        let [hi, lo] = sum.to_be_bytes();
        [START_BYTE_1, START_BYTE_2, cmd as u8, 0x00, data as u8, hi, lo]
    }
}

/// Decoded data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmsFrame {
    /// Length field as sent by the sensor
    pub frame_length: u16,
    /// Standard-particle concentrations
    pub standard: Particulates,
    /// Atmospheric-environment concentrations
    pub atmospheric: Particulates,
    /// Particle counts per 0.1 L: >0.3, >0.5, >1.0, >2.5, >5.0, >10 µm
    pub counts: [u16; 6],
    /// Firmware version
    pub version: u8,
    /// Error code
    pub error_code: u8,
}

/// Checksum over the start bytes and the first 28 body bytes
pub fn frame_checksum(body: &[u8; BODY_LEN]) -> u16 {
    body[..BODY_LEN - 2]
        .iter()
        .fold(u16::from(START_BYTE_1) + u16::from(START_BYTE_2), |acc, b| {
            acc.wrapping_add(u16::from(*b))
        })
}

/// Parse the 30 bytes following the start bytes
pub fn parse_frame(body: &[u8; BODY_LEN]) -> Result<PmsFrame, SensorError> {
    let mut buf = &body[..];
    let frame_length = buf.get_u16();
    let standard = Particulates {
        pm1_0: buf.get_u16(),
        pm2_5: buf.get_u16(),
        pm10_0: buf.get_u16(),
    };
    let atmospheric = Particulates {
        pm1_0: buf.get_u16(),
        pm2_5: buf.get_u16(),
        pm10_0: buf.get_u16(),
    };
    let mut counts = [0u16; 6];
    for count in counts.iter_mut() {
        *count = buf.get_u16();
    }
    let version = buf.get_u8();
    let error_code = buf.get_u8();
    let got = buf.get_u16();

    let expected = frame_checksum(body);
    if expected != got {
        return Err(SensorError::Checksum { expected, got });
    }

    Ok(PmsFrame {
        frame_length,
        standard,
        atmospheric,
        counts,
        version,
        error_code,
    })
}

/// PMS7003 driver owning its serial handle
pub struct Pms7003<S> {
    port: S,
    settle: Duration,
    read_timeout: Duration,
}

impl<S> Pms7003<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Driver with the default settle time and read timeout
    pub fn new(port: S) -> Self {
        Self {
            port,
            settle: DEFAULT_SETTLE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Override the fan settle time
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Override the frame read timeout
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Release the serial handle
    pub fn into_inner(self) -> S {
        self.port
    }

    /// Write one command and give the sensor time to act on it.
    ///
    /// The write is bounded by the read timeout so a wedged port surfaces as
    /// [`SensorError::BusyTimeout`].
    pub async fn command(&mut self, command: PmsCommand) -> Result<(), SensorError> {
        let frame = command.frame();
        let write = async {
            self.port.write_all(&frame).await?;
            self.port.flush().await
        };
        match tokio::time::timeout(self.read_timeout, write).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SensorError::BusyTimeout {
                    sensor: "pms7003",
                    waited: self.read_timeout,
                })
            }
        }
        trace!("PMS command {:?}", command);
        tokio::time::sleep(COMMAND_GAP).await;
        Ok(())
    }

    /// Read the next valid frame, resynchronising on garbage.
    ///
    /// Returns `Ok(None)` when no valid frame arrives before the read timeout.
    pub async fn read_frame(&mut self) -> Result<Option<PmsFrame>, SensorError> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("Timeout while reading data from PMS sensor");
                return Ok(None);
            }
            match tokio::time::timeout(remaining, self.next_candidate()).await {
                Err(_) => {
                    warn!("Timeout while reading data from PMS sensor");
                    return Ok(None);
                }
                Ok(Ok(Some(frame))) => return Ok(Some(frame)),
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => return Err(e),
            }
        }
    }

    /// One attempt at a frame; `None` means resync and try again
    async fn next_candidate(&mut self) -> Result<Option<PmsFrame>, SensorError> {
        match self.port.read_u8().await {
            Ok(START_BYTE_1) => {}
            Ok(_) => return Ok(None),
            Err(e) => return self.stream_ended(e).await,
        }
        match self.port.read_u8().await {
            Ok(START_BYTE_2) => {}
            Ok(_) => return Ok(None),
            Err(e) => return self.stream_ended(e).await,
        }

        let mut body = [0u8; BODY_LEN];
        if let Err(e) = self.port.read_exact(&mut body).await {
            return self.stream_ended(e).await;
        }

        match parse_frame(&body) {
            Ok(frame) => Ok(Some(frame)),
            Err(e) => {
                debug!("Dropping PMS frame: {}", e);
                Ok(None)
            }
        }
    }

    async fn stream_ended(&mut self, e: std::io::Error) -> Result<Option<PmsFrame>, SensorError> {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            tokio::time::sleep(EMPTY_READ_BACKOFF).await;
            return Ok(None);
        }
        Err(e.into())
    }
}

#[async_trait]
impl<S> Sensor for Pms7003<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    type Reading = Option<Particulates>;

    fn name(&self) -> &'static str {
        "pms7003"
    }

    async fn init(&mut self) -> Result<(), SensorError> {
        self.command(PmsCommand::PassiveMode).await
    }

    async fn read(&mut self) -> Result<Option<Particulates>, SensorError> {
        self.command(PmsCommand::Wake).await?;
        tokio::time::sleep(self.settle).await;
        self.command(PmsCommand::RequestRead).await?;
        let frame = self.read_frame().await;
        self.command(PmsCommand::Sleep).await?;
        Ok(frame?.map(|f| f.atmospheric))
    }
}
