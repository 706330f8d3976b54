//! Connection lifecycle state.
//!
//! ```text
//!          connect(target)            connected
//!  Idle ───────────────────▶ Connecting ─────────▶ Connected
//!   ▲   (sync failure:                 ◀─────────
//!   │    ResolveFailed, back to Idle)     lost
//!   └──────────── disconnect() ───────────────────────┘
//! ```
//!
//! `ResolveFailed` is only ever *reported*; the stored state after a
//! failed connect is `Idle`.  `Dropped` exists for status consumers but is
//! never entered.

use std::fmt;

use tracing::info;

use crate::application::transport::Target;

/// Connection state as reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    ResolveFailed,
    Dropped,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ResolveFailed => "resolve failed",
            ConnectionState::Dropped => "dropped",
        };
        f.write_str(s)
    }
}

/// Current state plus the last target handed to the transport.
#[derive(Debug, Default)]
pub struct Connection {
    state: ConnectionState,
    target: Option<Target>,
}

impl Connection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn set_target(&mut self, target: Target) {
        self.target = Some(target);
    }

    /// Moves to `next`, returning the previous state.
    pub fn transition(&mut self, next: ConnectionState) -> ConnectionState {
        let prev = std::mem::replace(&mut self.state, next);
        if prev != next {
            match &self.target {
                Some(t) => info!(target_addr = %t, "connection {prev} -> {next}"),
                None => info!("connection {prev} -> {next}"),
            }
        }
        prev
    }
}
