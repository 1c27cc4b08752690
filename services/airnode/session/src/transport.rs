//! Transport provider: broker byte streams and radio link association.
//!
//! The protocol client only needs a connected, readable and writable stream.
//! [`TcpTransport`] supplies one over TCP; tests substitute in-memory pipes.
//! [`Link`] models the station-mode radio that must be associated before any
//! stream can be opened.

use crate::error::TransportError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Delay after powering the radio before it accepts commands
pub const RADIO_WAKE_DELAY: Duration = Duration::from_millis(500);

/// Default interval between association status polls
pub const DEFAULT_LINK_POLL: Duration = Duration::from_millis(50);

/// Supplies connected byte streams to a broker
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stream type handed to the protocol client
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Open a stream to `host:port`, giving up after `timeout`
    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self::Stream, TransportError>;
}

/// Plain TCP transport
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self::Stream, TransportError> {
        debug!("Connecting TCP to {}:{}", host, port);
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(|source| TransportError::Connect {
                addr: format!("{}:{}", host, port),
                source,
            })?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Run an I/O future under a deadline, folding both failure kinds into [`TransportError`]
pub async fn with_timeout<F, R>(limit: Duration, fut: F) -> Result<R, TransportError>
where
    F: Future<Output = std::io::Result<R>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(TransportError::Closed),
        Ok(Err(e)) => Err(TransportError::Io(e)),
        Err(_) => Err(TransportError::Timeout(limit)),
    }
}

/// Radio link state as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Radio unpowered
    Off,
    /// Powered but not associated
    Down,
    /// Associated and routable
    Up,
}

/// Station-mode radio link
#[async_trait]
pub trait Link: Send {
    /// Current link state
    async fn status(&mut self) -> LinkStatus;

    /// Power the radio up
    async fn power_on(&mut self) -> Result<(), TransportError>;

    /// Start association; completion is observed through [`Link::status`]
    async fn begin_association(&mut self) -> Result<(), TransportError>;
}

/// Bring the link up, polling every `poll`.
///
/// The whole sequence, including power-up and starting association, is
/// bounded by `timeout`. Returns immediately when the link is already up.
pub async fn associate_with_timeout<L: Link + ?Sized>(
    link: &mut L,
    timeout: Duration,
    poll: Duration,
) -> Result<(), TransportError> {
    let deadline = Instant::now() + timeout;
    match tokio::time::timeout_at(deadline, associate(link, poll)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Radio link association timed out after {:?}", timeout);
            Err(TransportError::Timeout(timeout))
        }
    }
}

async fn associate<L: Link + ?Sized>(link: &mut L, poll: Duration) -> Result<(), TransportError> {
    if link.status().await == LinkStatus::Off {
        debug!("Powering radio");
        link.power_on().await?;
        tokio::time::sleep(RADIO_WAKE_DELAY).await;
    }

    if link.status().await == LinkStatus::Up {
        return Ok(());
    }

    info!("Associating radio link");
    link.begin_association().await?;

    loop {
        if link.status().await == LinkStatus::Up {
            info!("Radio link up");
            return Ok(());
        }
        tokio::time::sleep(poll).await;
    }
}

/// Upper bound on one broker name lookup
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Host link: the network is managed by the OS, so the link counts as up
/// while the broker name resolves. Every status query re-resolves, so a lost
/// network shows up as [`LinkStatus::Down`].
#[derive(Debug)]
pub struct HostLink {
    host: String,
    port: u16,
    powered: bool,
    resolved: bool,
}

impl HostLink {
    /// Create a link that checks reachability of `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            powered: false,
            resolved: false,
        }
    }

    async fn resolve(&mut self) -> bool {
        let lookup = tokio::net::lookup_host((self.host.as_str(), self.port));
        let resolved = match tokio::time::timeout(RESOLVE_TIMEOUT, lookup).await {
            Ok(Ok(mut addrs)) => addrs.next().is_some(),
            Ok(Err(e)) => {
                debug!("Failed to resolve broker {}: {}", self.host, e);
                false
            }
            Err(_) => {
                debug!("Resolving broker {} timed out", self.host);
                false
            }
        };
        if resolved != self.resolved {
            if resolved {
                debug!("Broker {} resolves", self.host);
            } else {
                warn!("Broker {} no longer resolves", self.host);
            }
        }
        self.resolved = resolved;
        resolved
    }
}

#[async_trait]
impl Link for HostLink {
    async fn status(&mut self) -> LinkStatus {
        if !self.powered {
            return LinkStatus::Off;
        }
        if self.resolve().await {
            LinkStatus::Up
        } else {
            LinkStatus::Down
        }
    }

    async fn power_on(&mut self) -> Result<(), TransportError> {
        self.powered = true;
        Ok(())
    }

    async fn begin_association(&mut self) -> Result<(), TransportError> {
        self.resolve().await;
        Ok(())
    }
}
