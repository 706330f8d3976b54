//! Messaging transport seam.
//!
//! The client never touches sockets directly.  It drives a [`Transport`]
//! (connect, close, send) and is driven back by [`TransportEvent`]s that the
//! host event loop feeds into `HidClient::handle_transport_event`.
//!
//! Implementations live in the infrastructure layer: a recording mock for
//! tests and a Tokio TCP transport for the bundled binary.

use std::fmt;
use std::net::SocketAddr;

use hidlink_core::protocol::messages::Opcode;
use thiserror::Error;

/// Restrict hostname resolution to IPv4 addresses.
pub const IP_FLAG_IPV4: u32 = 1 << 0;
/// Restrict hostname resolution to IPv6 addresses.
pub const IP_FLAG_IPV6: u32 = 1 << 1;

/// Errors reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The target could not be turned into a socket address.
    #[error("failed to resolve {target}: {source}")]
    Resolve {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// A send was attempted with no established connection.
    #[error("transport is not connected")]
    NotConnected,

    /// The background I/O task is gone.
    #[error("transport channel closed")]
    ChannelClosed,

    /// An I/O error occurred on the underlying socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `connect` was called without a usable target.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

/// Delivery class requested for one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendMode {
    /// Retransmitted until acknowledged, ordered with other reliable packets.
    Reliable,
    /// May be lost; lower latency.
    BestEffort,
}

impl SendMode {
    /// Maps the application's `reliable` flag.
    pub fn from_reliable(reliable: bool) -> Self {
        if reliable {
            SendMode::Reliable
        } else {
            SendMode::BestEffort
        }
    }

    pub fn is_reliable(&self) -> bool {
        matches!(self, SendMode::Reliable)
    }
}

/// Where the transport should connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Resolved by the transport at connect time.  `flags` is a mask of
    /// [`IP_FLAG_IPV4`] / [`IP_FLAG_IPV6`]; zero accepts either family.
    Hostname { host: String, port: u16, flags: u32 },
    /// Already-resolved address (IPv6 scope IDs are preserved).
    Addr(SocketAddr),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Hostname { host, port, .. } => write!(f, "{host}:{port}"),
            Target::Addr(addr) => write!(f, "{addr}"),
        }
    }
}

/// Events produced by a transport, applied to the client in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The peer is reachable.
    Connected,
    /// The peer went away.
    Lost,
    /// A packet arrived.
    Packet { opcode: u8, payload: Vec<u8> },
}

/// Messaging transport driven by the client.
///
/// Every method is synchronous and non-blocking from the client's point of
/// view; outcomes of `connect` arrive later as [`TransportEvent`]s.  A
/// synchronous error from `connect` means the target could not even be
/// resolved.
pub trait Transport {
    /// Acquires transport resources.  Called once by `HidClient::new`.
    fn initialize(&mut self) -> Result<(), TransportError>;

    /// Releases transport resources.  Called once at teardown.
    fn terminate(&mut self) -> Result<(), TransportError>;

    /// Records the connection target.  Does not connect.
    fn set_target(&mut self, target: Target) -> Result<(), TransportError>;

    /// Starts connecting to the recorded target.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Drops the current connection or connection attempt.
    fn close(&mut self) -> Result<(), TransportError>;

    /// Queues one packet for the peer.
    fn send(&mut self, mode: SendMode, opcode: Opcode, payload: &[u8])
        -> Result<(), TransportError>;
}
