//! Tokio TCP transport.
//!
//! Stand-in for a reliable-UDP messaging transport: every packet travels
//! over one TCP stream, so best-effort packets are in fact delivered
//! reliably.  The requested mode is still carried in the frame.
//!
//! Frame layout (all integers big-endian):
//! ```text
//! [opcode:1][mode:1][reserved:2][payload_len:4][payload:payload_len]
//! ```
//!
//! Architecture:
//! - `connect()` resolves the target synchronously, then spawns one
//!   connection task on the runtime.  The address is kept until the target
//!   changes, so only the first connect to a hostname blocks on the lookup.
//! - The task retries `TcpStream::connect` every `reconnect_interval` until
//!   it succeeds, emits [`TransportEvent::Connected`], then runs a reader
//!   (frames → [`TransportEvent::Packet`]) and a writer (outbound channel →
//!   socket) side by side.
//! - When either side fails, or the peer closes, the task emits
//!   [`TransportEvent::Lost`] and exits.  Reconnecting is the client's call.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use hidlink_core::protocol::messages::Opcode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::application::transport::{
    SendMode, Target, Transport, TransportError, TransportEvent, IP_FLAG_IPV4, IP_FLAG_IPV6,
};

/// Size of the frame header preceding every payload.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest payload accepted from the peer.  A maximal device announcement
/// is well under this.
pub const MAX_FRAME_PAYLOAD: usize = 1 << 20;

const MODE_RELIABLE: u8 = 1;
const MODE_BEST_EFFORT: u8 = 0;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub mode: SendMode,
    pub payload: Vec<u8>,
}

// ── Framing ───────────────────────────────────────────────────────────────────

/// Builds one frame ready for the socket.
pub fn encode_frame(mode: SendMode, opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.push(opcode);
    buf.push(if mode.is_reliable() {
        MODE_RELIABLE
    } else {
        MODE_BEST_EFFORT
    });
    buf.extend_from_slice(&[0, 0]);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Reads one frame.  Returns `Ok(None)` on a clean end of stream (EOF on a
/// frame boundary).
///
/// # Errors
///
/// I/O errors, EOF inside a frame, and payloads larger than
/// [`MAX_FRAME_PAYLOAD`] (as `InvalidData`).
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    if reader.read(&mut header[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[1..]).await?;

    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if len > MAX_FRAME_PAYLOAD {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame payload of {len} bytes exceeds {MAX_FRAME_PAYLOAD}"),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(Frame {
        opcode: header[0],
        mode: SendMode::from_reliable(header[1] == MODE_RELIABLE),
        payload,
    }))
}

// ── Address resolution ────────────────────────────────────────────────────────

fn family_allowed(addr: &SocketAddr, flags: u32) -> bool {
    let want_v4 = flags & IP_FLAG_IPV4 != 0;
    let want_v6 = flags & IP_FLAG_IPV6 != 0;
    match (want_v4, want_v6) {
        (false, false) | (true, true) => true,
        (true, false) => addr.is_ipv4(),
        (false, true) => addr.is_ipv6(),
    }
}

/// Resolves `target` to one socket address, honouring the family flags.
///
/// # Errors
///
/// [`TransportError::Resolve`] if the lookup fails or yields no address of
/// an allowed family.
pub fn resolve(target: &Target) -> Result<SocketAddr, TransportError> {
    match target {
        Target::Addr(addr) => Ok(*addr),
        Target::Hostname { host, port, flags } => {
            let resolve_err = |source| TransportError::Resolve {
                target: target.to_string(),
                source,
            };
            let mut addrs = (host.as_str(), *port).to_socket_addrs().map_err(resolve_err)?;
            addrs.find(|a| family_allowed(a, *flags)).ok_or_else(|| {
                resolve_err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no address of the requested family",
                ))
            })
        }
    }
}

// ── Connection task ───────────────────────────────────────────────────────────

enum WriterExit {
    /// The transport dropped its sender: closed on purpose, nothing to report.
    Closed,
    Failed(std::io::Error),
}

async fn read_loop<R>(
    mut reader: R,
    events: mpsc::UnboundedSender<TransportEvent>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    while let Some(frame) = read_frame(&mut reader).await? {
        debug!(opcode = frame.opcode, len = frame.payload.len(), "frame received");
        let event = TransportEvent::Packet {
            opcode: frame.opcode,
            payload: frame.payload,
        };
        if events.send(event).is_err() {
            break;
        }
    }
    Ok(())
}

async fn write_loop<W>(mut writer: W, mut outbound: mpsc::UnboundedReceiver<Vec<u8>>) -> WriterExit
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            return WriterExit::Failed(e);
        }
    }
    WriterExit::Closed
}

async fn run_connection(
    addr: SocketAddr,
    reconnect_interval: Duration,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    let stream = loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => break stream,
            Err(e) => {
                warn!("could not connect to {addr}: {e}; retrying in {reconnect_interval:?}");
                time::sleep(reconnect_interval).await;
            }
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay failed: {e}");
    }

    info!("connected to {addr}");
    if events.send(TransportEvent::Connected).is_err() {
        return;
    }

    let (reader, writer) = stream.into_split();
    tokio::select! {
        result = read_loop(reader, events.clone()) => match result {
            Ok(()) => info!("{addr} closed the connection"),
            Err(e) => warn!("read error from {addr}: {e}"),
        },
        exit = write_loop(writer, outbound) => match exit {
            WriterExit::Closed => return,
            WriterExit::Failed(e) => warn!("write error to {addr}: {e}"),
        },
    }

    // The client may already be gone at shutdown.
    let _ = events.send(TransportEvent::Lost);
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// TCP transport driven from a Tokio runtime.
pub struct TcpTransport {
    runtime: Handle,
    events: mpsc::UnboundedSender<TransportEvent>,
    reconnect_interval: Duration,
    target: Option<Target>,
    /// Address `target` last resolved to; reconnects reuse it instead of
    /// blocking the runtime on another lookup.
    resolved: Option<SocketAddr>,
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl TcpTransport {
    /// Creates a transport that spawns its I/O on `runtime` and reports on
    /// `events`.
    pub fn new(
        runtime: Handle,
        events: mpsc::UnboundedSender<TransportEvent>,
        reconnect_interval: Duration,
    ) -> Self {
        Self {
            runtime,
            events,
            reconnect_interval,
            target: None,
            resolved: None,
            outbound: None,
            task: None,
        }
    }

    /// Creates a transport together with the receiving end of its event
    /// channel.
    pub fn with_channel(
        runtime: Handle,
        reconnect_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(runtime, tx, reconnect_interval), rx)
    }

    fn stop_task(&mut self) {
        self.outbound = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Transport for TcpTransport {
    fn initialize(&mut self) -> Result<(), TransportError> {
        debug!(interval = ?self.reconnect_interval, "tcp transport initialized");
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), TransportError> {
        self.stop_task();
        debug!("tcp transport terminated");
        Ok(())
    }

    fn set_target(&mut self, target: Target) -> Result<(), TransportError> {
        self.target = Some(target);
        self.resolved = None;
        Ok(())
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| TransportError::InvalidTarget("no target set".to_string()))?;
        let addr = match self.resolved {
            Some(addr) => addr,
            None => {
                let addr = resolve(target)?;
                self.resolved = Some(addr);
                addr
            }
        };

        self.stop_task();
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        self.task = Some(self.runtime.spawn(run_connection(
            addr,
            self.reconnect_interval,
            self.events.clone(),
            rx,
        )));
        debug!("connecting to {addr}");
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.stop_task();
        Ok(())
    }

    fn send(
        &mut self,
        mode: SendMode,
        opcode: Opcode,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::NotConnected)?;
        outbound
            .send(encode_frame(mode, opcode as u8, payload))
            .map_err(|_| TransportError::ChannelClosed)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.stop_task();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event within timeout")
            .expect("channel open")
    }

    #[test]
    fn test_encode_frame_layout() {
        let frame = encode_frame(SendMode::Reliable, Opcode::Data as u8, &[0xAA, 0xBB]);

        assert_eq!(frame, vec![5, 1, 0, 0, 0, 0, 0, 2, 0xAA, 0xBB]);
    }

    #[tokio::test]
    async fn test_read_frame_round_trip_and_clean_eof() {
        // Arrange
        let mut bytes = encode_frame(SendMode::BestEffort, 6, &[0, 0, 0, 1, 0, 0, 0, 2]);
        bytes.extend(encode_frame(SendMode::Reliable, 3, &[]));
        let mut reader = bytes.as_slice();

        // Act
        let first = read_frame(&mut reader).await.unwrap().unwrap();
        let second = read_frame(&mut reader).await.unwrap().unwrap();
        let end = read_frame(&mut reader).await.unwrap();

        // Assert
        assert_eq!(first.opcode, 6);
        assert_eq!(first.mode, SendMode::BestEffort);
        assert_eq!(first.payload.len(), 8);
        assert_eq!(second.opcode, 3);
        assert!(second.payload.is_empty());
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_read_frame_reassembles_split_reads() {
        // Arrange – header and payload dribble in across three reads
        let payload: [u8; 9] = [0, 0, 0, 2, 0, 0, 0, 7, 0x55];
        let bytes = encode_frame(SendMode::Reliable, Opcode::Feature as u8, &payload);
        let mut reader = tokio_test::io::Builder::new()
            .read(&bytes[..1])
            .read(&bytes[1..5])
            .read(&bytes[5..])
            .build();

        // Act
        let frame = tokio_test::assert_ok!(read_frame(&mut reader).await);

        // Assert
        let frame = frame.expect("one frame");
        assert_eq!(frame.opcode, Opcode::Feature as u8);
        assert_eq!(frame.mode, SendMode::Reliable);
        assert_eq!(frame.payload, vec![0, 0, 0, 2, 0, 0, 0, 7, 0x55]);
    }

    #[tokio::test]
    async fn test_read_frame_truncated_payload_is_an_error() {
        let bytes = encode_frame(SendMode::Reliable, 4, &[1, 2, 3, 4]);
        let mut reader = &bytes[..bytes.len() - 1];

        let result = read_frame(&mut reader).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized_payload() {
        let mut bytes = vec![5, 1, 0, 0];
        bytes.extend_from_slice(&(MAX_FRAME_PAYLOAD as u32 + 1).to_be_bytes());
        let mut reader = bytes.as_slice();

        let err = read_frame(&mut reader).await.unwrap_err();

        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_resolve_literal_address_honours_family_flags() {
        let v4_only = Target::Hostname {
            host: "127.0.0.1".to_string(),
            port: 24322,
            flags: IP_FLAG_IPV4,
        };
        let v6_only = Target::Hostname {
            host: "127.0.0.1".to_string(),
            port: 24322,
            flags: IP_FLAG_IPV6,
        };

        assert_eq!(resolve(&v4_only).unwrap(), "127.0.0.1:24322".parse().unwrap());
        assert!(matches!(resolve(&v6_only), Err(TransportError::Resolve { .. })));
    }

    #[tokio::test]
    async fn test_connect_without_target_is_invalid() {
        let (mut transport, _rx) =
            TcpTransport::with_channel(Handle::current(), Duration::from_millis(10));

        let result = transport.connect();

        assert!(matches!(result, Err(TransportError::InvalidTarget(_))));
    }

    #[tokio::test]
    async fn test_reconnect_reuses_resolved_address_until_target_changes() {
        // Arrange
        let (mut transport, _rx) =
            TcpTransport::with_channel(Handle::current(), Duration::from_millis(10));
        transport
            .set_target(Target::Hostname {
                host: "127.0.0.1".to_string(),
                port: 1,
                flags: 0,
            })
            .unwrap();

        // Act
        transport.connect().unwrap();
        let first = transport.resolved;
        transport.connect().unwrap();

        // Assert
        assert_eq!(first, Some("127.0.0.1:1".parse().unwrap()));
        assert_eq!(transport.resolved, first);

        transport.set_target(Target::Addr("127.0.0.1:2".parse().unwrap())).unwrap();
        assert_eq!(transport.resolved, None);
        transport.close().unwrap();
    }

    #[tokio::test]
    async fn test_send_before_connect_is_not_connected() {
        let (mut transport, _rx) =
            TcpTransport::with_channel(Handle::current(), Duration::from_millis(10));

        let result = transport.send(SendMode::Reliable, Opcode::DeviceNew, &[]);

        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_loopback_connect_exchange_and_loss() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (mut transport, mut events) =
            TcpTransport::with_channel(Handle::current(), Duration::from_millis(10));
        transport.set_target(Target::Addr(addr)).unwrap();

        // Act – connect
        transport.connect().unwrap();
        let (mut server, _) = listener.accept().await.unwrap();
        assert_eq!(next_event(&mut events).await, TransportEvent::Connected);

        // Act – peer sends a GRAB
        let grab = encode_frame(SendMode::Reliable, Opcode::Grab as u8, &[0, 0, 0, 0, 0, 0, 0, 1]);
        server.write_all(&grab).await.unwrap();

        // Assert
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::Packet {
                opcode: Opcode::Grab as u8,
                payload: vec![0, 0, 0, 0, 0, 0, 0, 1],
            }
        );

        // Act – client sends a report
        transport
            .send(SendMode::BestEffort, Opcode::Data, &[0, 0, 0, 0, 0, 0, 0, 1, 0x04])
            .unwrap();
        let frame = read_frame(&mut server).await.unwrap().unwrap();

        // Assert
        assert_eq!(frame.opcode, Opcode::Data as u8);
        assert_eq!(frame.mode, SendMode::BestEffort);
        assert_eq!(frame.payload, vec![0, 0, 0, 0, 0, 0, 0, 1, 0x04]);

        // Act – peer hangs up
        drop(server);

        // Assert
        assert_eq!(next_event(&mut events).await, TransportEvent::Lost);
    }

    #[tokio::test]
    async fn test_close_stops_the_connection_without_lost_event() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (mut transport, mut events) =
            TcpTransport::with_channel(Handle::current(), Duration::from_millis(10));
        transport
            .set_target(Target::Addr(listener.local_addr().unwrap()))
            .unwrap();
        transport.connect().unwrap();
        let (_server, _) = listener.accept().await.unwrap();
        assert_eq!(next_event(&mut events).await, TransportEvent::Connected);

        // Act
        transport.close().unwrap();

        // Assert
        assert!(matches!(
            transport.send(SendMode::Reliable, Opcode::Data, &[]),
            Err(TransportError::NotConnected)
        ));
        let quiet = time::timeout(Duration::from_millis(100), events.recv()).await;
        assert!(quiet.is_err(), "no event after close");
    }
}
