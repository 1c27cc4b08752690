//! Publish-only broker client.
//!
//! A [`ProtocolClient`] owns at most one live connection. Publishing is
//! fire-and-forget at QoS 0: nothing is read back after a PUBLISH, so the
//! broker never acknowledges it.

use crate::error::{SessionError, TransportError};
use crate::inbound::{read_frame, InboundFrame, Polled};
use crate::transport::{with_timeout, Transport};
use airnode_wire::{
    ConnAck, ConnectPacket, Credentials, ProtocolError, PublishPacket, CONNACK_LEN, DISCONNECT,
    PINGREQ,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

/// Default bound on opening the broker stream
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on a single read or write
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Who the client is and where its broker lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Client identifier presented in CONNECT
    pub client_id: String,
    /// Broker host name or address
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Optional plaintext credentials
    pub credentials: Option<Credentials>,
    /// Keepalive interval in seconds, 0 disables it
    pub keepalive: u16,
}

impl ClientIdentity {
    /// Identity with no credentials and keepalive disabled
    pub fn new(client_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            client_id: client_id.into(),
            host: host.into(),
            port,
            credentials: None,
            keepalive: 0,
        }
    }
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No connection
    Disconnected,
    /// Handshake in flight
    Connecting,
    /// Handshake accepted; publishes may be sent
    Connected,
}

/// Anything that can emit a QoS 0 publish
#[async_trait]
pub trait Publish: Send {
    /// Send `payload` on `topic`
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError>;
}

/// Publish-only protocol client over a pluggable transport
pub struct ProtocolClient<T: Transport> {
    identity: ClientIdentity,
    transport: T,
    connection: Option<T::Stream>,
    state: ClientState,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl<T: Transport> ProtocolClient<T> {
    /// Create a disconnected client
    pub fn new(identity: ClientIdentity, transport: T) -> Self {
        Self {
            identity,
            transport,
            connection: None,
            state: ClientState::Disconnected,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    /// Override the connect and per-operation timeouts
    pub fn with_timeouts(mut self, connect_timeout: Duration, io_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.io_timeout = io_timeout;
        self
    }

    /// Client identity
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Transport provider
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Current lifecycle state
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Whether a connection is open
    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    /// Open a stream and run the CONNECT / CONNACK handshake.
    ///
    /// Any previous connection is released first. On refusal the stream is
    /// dropped and [`ProtocolError::Rejected`] is returned.
    pub async fn connect(&mut self, clean_session: bool) -> Result<ConnAck, SessionError> {
        if self.connection.is_some() {
            debug!("Releasing previous broker connection before reconnect");
            self.drop_connection();
        }

        self.state = ClientState::Connecting;
        let attempt = handshake(
            &self.transport,
            &self.identity,
            clean_session,
            self.connect_timeout,
            self.io_timeout,
        )
        .await;
        match attempt {
            Ok((stream, ack)) => {
                self.connection = Some(stream);
                self.state = ClientState::Connected;
                info!(
                    "Connected to broker {}:{} as {} (return code {})",
                    self.identity.host, self.identity.port, self.identity.client_id, ack.return_code
                );
                Ok(ack)
            }
            Err(e) => {
                self.state = ClientState::Disconnected;
                warn!(
                    "Broker handshake with {}:{} failed: {}",
                    self.identity.host, self.identity.port, e
                );
                Err(e)
            }
        }
    }

    /// Write one QoS 0 PUBLISH. A write failure closes the connection.
    pub async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
        let packet = PublishPacket::new(topic, payload).encode()?;
        let io_timeout = self.io_timeout;
        let stream = self
            .connection
            .as_mut()
            .ok_or(TransportError::NotConnected)?;

        let result = with_timeout(io_timeout, stream.write_all(&packet)).await;
        if let Err(e) = result {
            warn!("Publish to {} failed: {}", topic, e);
            self.drop_connection();
            return Err(e.into());
        }
        trace!("Published {} bytes to {}", payload.len(), topic);
        Ok(())
    }

    /// Send PINGREQ. Returns false when there is no connection or the write fails.
    pub async fn ping(&mut self) -> bool {
        let io_timeout = self.io_timeout;
        let Some(stream) = self.connection.as_mut() else {
            return false;
        };
        match with_timeout(io_timeout, stream.write_all(&PINGREQ)).await {
            Ok(()) => true,
            Err(e) => {
                debug!("PINGREQ failed: {}", e);
                false
            }
        }
    }

    /// Send DISCONNECT and close the stream. Never fails.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.connection.take() {
            if let Err(e) = with_timeout(self.io_timeout, stream.write_all(&DISCONNECT)).await {
                debug!("DISCONNECT not delivered: {}", e);
            }
            if let Err(e) = with_timeout(self.io_timeout, stream.shutdown()).await {
                debug!("Stream shutdown failed: {}", e);
            }
            info!("Disconnected from broker {}", self.identity.host);
        }
        self.state = ClientState::Disconnected;
    }

    /// Wait up to the I/O timeout for a broker-initiated frame.
    ///
    /// Returns `Ok(None)` when idle, on a PINGRESP or on an empty read. An
    /// empty read means the broker closed its end, so the connection is
    /// released as well. QoS 1 deliveries are acknowledged before returning.
    /// A transport failure closes the connection.
    pub async fn wait_for_frame(&mut self) -> Result<Option<InboundFrame>, SessionError> {
        let io_timeout = self.io_timeout;
        let stream = self
            .connection
            .as_mut()
            .ok_or(TransportError::NotConnected)?;

        match read_frame(stream, io_timeout, io_timeout).await {
            Ok(Polled::Nothing) => Ok(None),
            Ok(Polled::Frame(frame)) => Ok(Some(frame)),
            Ok(Polled::Eof) => {
                debug!("Empty inbound read, broker closed the connection");
                self.drop_connection();
                Ok(None)
            }
            Err(e) => {
                if e.is_transport() {
                    debug!("Inbound read failed, closing connection: {}", e);
                    self.drop_connection();
                }
                Err(e)
            }
        }
    }

    fn drop_connection(&mut self) {
        self.connection = None;
        self.state = ClientState::Disconnected;
    }
}

/// Open a stream and exchange CONNECT / CONNACK
async fn handshake<T: Transport>(
    transport: &T,
    identity: &ClientIdentity,
    clean_session: bool,
    connect_timeout: Duration,
    io_timeout: Duration,
) -> Result<(T::Stream, ConnAck), SessionError> {
    let packet = ConnectPacket {
        client_id: &identity.client_id,
        credentials: identity.credentials.as_ref(),
        keepalive: identity.keepalive,
        clean_session,
    }
    .encode()?;

    let mut stream = transport
        .connect(&identity.host, identity.port, connect_timeout)
        .await?;

    with_timeout(io_timeout, stream.write_all(&packet)).await?;
    with_timeout(io_timeout, stream.flush()).await?;
    trace!("Sent CONNECT ({} bytes)", packet.len());

    let mut raw = [0u8; CONNACK_LEN];
    with_timeout(io_timeout, stream.read_exact(&mut raw)).await?;
    let ack = ConnAck::parse(&raw)?;
    if !ack.accepted() {
        return Err(ProtocolError::Rejected {
            flags: ack.ack_flags,
            code: ack.return_code,
        }
        .into());
    }
    Ok((stream, ack))
}

#[async_trait]
impl<T: Transport> Publish for ProtocolClient<T> {
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
        ProtocolClient::publish(self, topic, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::io::{duplex, DuplexStream};

    const ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

    /// In-memory broker: each connect hands back one end of a pipe
    struct PipeTransport {
        connack: Option<[u8; 4]>,
        refuse: bool,
        hang_up: bool,
        connects: AtomicUsize,
        brokers: Mutex<Vec<DuplexStream>>,
    }

    impl PipeTransport {
        fn new(connack: Option<[u8; 4]>) -> Self {
            Self {
                connack,
                refuse: false,
                hang_up: false,
                connects: AtomicUsize::new(0),
                brokers: Mutex::new(Vec::new()),
            }
        }

        fn take_broker(&self) -> DuplexStream {
            self.brokers.lock().unwrap().remove(0)
        }
    }

    #[async_trait]
    impl Transport for PipeTransport {
        type Stream = DuplexStream;

        async fn connect(
            &self,
            host: &str,
            port: u16,
            _timeout: Duration,
        ) -> Result<DuplexStream, TransportError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                return Err(TransportError::Connect {
                    addr: format!("{}:{}", host, port),
                    source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
                });
            }
            let (client, mut broker) = duplex(64 * 1024);
            if let Some(ack) = self.connack {
                broker.write_all(&ack).await?;
            }
            if !self.hang_up {
                self.brokers.lock().unwrap().push(broker);
            }
            Ok(client)
        }
    }

    fn client(transport: PipeTransport) -> ProtocolClient<PipeTransport> {
        let mut identity = ClientIdentity::new("box01", "broker.local", 1883);
        identity.keepalive = 60;
        ProtocolClient::new(identity, transport)
    }

    fn expected_connect(clean_session: bool) -> Vec<u8> {
        ConnectPacket {
            client_id: "box01",
            credentials: None,
            keepalive: 60,
            clean_session,
        }
        .encode()
        .unwrap()
        .to_vec()
    }

    #[tokio::test]
    async fn test_connect_accepted() {
        let mut client = client(PipeTransport::new(Some(ACCEPTED)));
        assert_eq!(client.state(), ClientState::Disconnected);

        let ack = client.connect(true).await.unwrap();
        assert!(ack.accepted());
        assert!(client.is_connected());

        let mut broker = client.transport().take_broker();
        let expected = expected_connect(true);
        let mut sent = vec![0u8; expected.len()];
        broker.read_exact(&mut sent).await.unwrap();
        assert_eq!(sent, expected);
    }

    #[tokio::test]
    async fn test_connect_refused_by_broker() {
        let mut client = client(PipeTransport::new(Some([0x20, 0x02, 0x01, 0x05])));
        let err = client.connect(false).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolError::Rejected { flags: 1, code: 5 })
        ));
        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(!client.ping().await);
    }

    #[tokio::test]
    async fn test_connect_transport_failure() {
        let mut transport = PipeTransport::new(Some(ACCEPTED));
        transport.refuse = true;
        let mut client = client(transport);

        let err = client.connect(true).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(client.transport().connects.load(Ordering::SeqCst), 1);
        assert!(!client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_times_out_without_connack() {
        let mut client = client(PipeTransport::new(None));
        let err = client.connect(true).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::Timeout(_))
        ));
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_broker_hangs_up() {
        let mut transport = PipeTransport::new(None);
        transport.hang_up = true;
        let mut client = client(transport);

        let err = client.connect(true).await.unwrap_err();
        assert!(err.is_transport());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_publish_exact_bytes() {
        let mut client = client(PipeTransport::new(Some(ACCEPTED)));
        client.connect(true).await.unwrap();
        let mut broker = client.transport().take_broker();
        let mut connect = vec![0u8; expected_connect(true).len()];
        broker.read_exact(&mut connect).await.unwrap();

        client.publish("box01/temperature", b"21.5").await.unwrap();

        let mut sent = [0u8; 25];
        broker.read_exact(&mut sent).await.unwrap();
        assert_eq!(sent[0], 0x30);
        assert_eq!(sent[1], 23);
        assert_eq!(&sent[2..4], &[0x00, 17]);
        assert_eq!(&sent[4..21], b"box01/temperature");
        assert_eq!(&sent[21..], b"21.5");
    }

    #[tokio::test]
    async fn test_publish_reads_nothing_back() {
        let mut client = client(PipeTransport::new(Some(ACCEPTED)));
        client.connect(true).await.unwrap();
        let mut broker = client.transport().take_broker();
        broker.write_all(&[0x90]).await.unwrap();

        client.publish("box01/pm25", b"7").await.unwrap();
        client.publish("box01/pm100", b"11").await.unwrap();

        // The queued byte is still unread after both publishes
        let frame = client.wait_for_frame().await.unwrap();
        assert_eq!(frame, Some(InboundFrame::Other(0x90)));
    }

    #[tokio::test]
    async fn test_publish_not_connected() {
        let mut client = client(PipeTransport::new(Some(ACCEPTED)));
        let err = client.publish("box01/temperature", b"20.0").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_publish_failure_closes_connection() {
        let mut client = client(PipeTransport::new(Some(ACCEPTED)));
        client.connect(true).await.unwrap();
        drop(client.transport().take_broker());

        assert!(client.publish("box01/temperature", b"20.0").await.is_err());
        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(matches!(
            client.publish("box01/temperature", b"20.0").await,
            Err(SessionError::Transport(TransportError::NotConnected))
        ));
    }

    #[tokio::test]
    async fn test_ping_and_disconnect() {
        let mut client = client(PipeTransport::new(Some(ACCEPTED)));
        client.connect(true).await.unwrap();
        let mut broker = client.transport().take_broker();

        assert!(client.ping().await);
        client.disconnect().await;
        assert_eq!(client.state(), ClientState::Disconnected);

        let mut received = Vec::new();
        broker.read_to_end(&mut received).await.unwrap();
        let tail = &received[received.len() - 4..];
        assert_eq!(tail, &[0xC0, 0x00, 0xE0, 0x00]);

        // Disconnecting twice is harmless
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnect_after_peer_gone() {
        let mut client = client(PipeTransport::new(Some(ACCEPTED)));
        client.connect(true).await.unwrap();
        drop(client.transport().take_broker());

        assert!(!client.ping().await);
        client.disconnect().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_reconnect_releases_previous_stream() {
        let mut client = client(PipeTransport::new(Some(ACCEPTED)));
        client.connect(true).await.unwrap();
        client.connect(false).await.unwrap();
        assert_eq!(client.transport().connects.load(Ordering::SeqCst), 2);

        let mut first = client.transport().take_broker();
        let mut received = Vec::new();
        first.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, expected_connect(true));
    }

    #[tokio::test]
    async fn test_wait_for_frame_pingresp() {
        let mut client = client(PipeTransport::new(Some(ACCEPTED)));
        client.connect(true).await.unwrap();
        let mut broker = client.transport().take_broker();
        broker.write_all(&[0xD0, 0x00, 0x90]).await.unwrap();

        assert_eq!(client.wait_for_frame().await.unwrap(), None);
        assert_eq!(
            client.wait_for_frame().await.unwrap(),
            Some(InboundFrame::Other(0x90))
        );
    }

    #[tokio::test]
    async fn test_wait_for_frame_acknowledges_qos1() {
        let mut client = client(PipeTransport::new(Some(ACCEPTED)));
        client.connect(true).await.unwrap();
        let mut broker = client.transport().take_broker();
        let mut connect = vec![0u8; expected_connect(true).len()];
        broker.read_exact(&mut connect).await.unwrap();

        // QoS 1 publish: topic "a/b", packet id 0x1234, payload "hi"
        broker
            .write_all(&[0x32, 9, 0x00, 0x03, b'a', b'/', b'b', 0x12, 0x34, b'h', b'i'])
            .await
            .unwrap();

        let frame = client.wait_for_frame().await.unwrap();
        assert_eq!(
            frame,
            Some(InboundFrame::Publish {
                header: 0x32,
                packet_id: Some(0x1234),
                payload_len: 2,
            })
        );

        let mut puback = [0u8; 4];
        broker.read_exact(&mut puback).await.unwrap();
        assert_eq!(puback, [0x40, 0x02, 0x12, 0x34]);
    }

    #[tokio::test]
    async fn test_wait_for_frame_qos0_publish_consumed() {
        let mut client = client(PipeTransport::new(Some(ACCEPTED)));
        client.connect(true).await.unwrap();
        let mut broker = client.transport().take_broker();
        broker
            .write_all(&[0x30, 6, 0x00, 0x01, b't', b'x', b'y', b'z', 0xD0, 0x00])
            .await
            .unwrap();

        assert_eq!(
            client.wait_for_frame().await.unwrap(),
            Some(InboundFrame::Publish {
                header: 0x30,
                packet_id: None,
                payload_len: 3,
            })
        );
        assert_eq!(client.wait_for_frame().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_frame_idle() {
        let mut client = client(PipeTransport::new(Some(ACCEPTED)));
        client.connect(true).await.unwrap();
        let _broker = client.transport().take_broker();

        assert_eq!(client.wait_for_frame().await.unwrap(), None);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_wait_for_frame_empty_read_is_no_frame() {
        let mut client = client(PipeTransport::new(Some(ACCEPTED)));
        client.connect(true).await.unwrap();
        drop(client.transport().take_broker());

        assert_eq!(client.wait_for_frame().await.unwrap(), None);
        assert!(!client.is_connected());

        let err = client.wait_for_frame().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_wait_for_frame_qos2_publish_not_acknowledged() {
        let mut client = client(PipeTransport::new(Some(ACCEPTED)));
        client.connect(true).await.unwrap();
        let mut broker = client.transport().take_broker();
        let mut connect = vec![0u8; expected_connect(true).len()];
        broker.read_exact(&mut connect).await.unwrap();

        // QoS 2 publish: topic "a", packet id 0x0007, payload "xyz", then PINGRESP
        broker
            .write_all(&[0x34, 8, 0x00, 0x01, b'a', 0x00, 0x07, b'x', b'y', b'z', 0xD0, 0x00])
            .await
            .unwrap();

        assert_eq!(
            client.wait_for_frame().await.unwrap(),
            Some(InboundFrame::Publish {
                header: 0x34,
                packet_id: Some(0x0007),
                payload_len: 3,
            })
        );
        assert_eq!(client.wait_for_frame().await.unwrap(), None);

        client.disconnect().await;
        let mut rest = Vec::new();
        broker.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, DISCONNECT.to_vec());
    }
}
