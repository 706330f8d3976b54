//! Recording transport for tests.
//!
//! `MockTransport` performs no I/O.  Every trait call is appended to
//! `calls`, every packet to `sent`, so tests can assert the exact
//! transcript the client produced.  The `fail_*` flags simulate transport
//! failures.
//!
//! Teardown consumes the client, so the call log is also mirrored into a
//! shared [`CallLog`] that outlives it:
//!
//! ```ignore
//! let log = client.transport().shared_log();
//! client.teardown()?;
//! assert_eq!(log.snapshot().last(), Some(&TransportCall::Terminate));
//! ```

use std::sync::{Arc, Mutex};

use hidlink_core::protocol::messages::Opcode;

use crate::application::transport::{SendMode, Target, Transport, TransportError};

/// One recorded trait call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Initialize,
    Terminate,
    SetTarget(Target),
    Connect,
    Close,
    Send(Opcode),
}

/// One recorded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub mode: SendMode,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

/// Shared, clonable view of a mock's call log.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<TransportCall>>>);

impl CallLog {
    fn push(&self, call: TransportCall) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }

    /// Copy of every call recorded so far.
    pub fn snapshot(&self) -> Vec<TransportCall> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// A transport that records calls instead of talking to a peer.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub calls: Vec<TransportCall>,
    pub sent: Vec<SentPacket>,
    pub log: CallLog,
    /// `initialize` fails with `TransportError::Io`.
    pub fail_initialize: bool,
    /// `connect` fails as if the target could not be resolved.
    pub fail_connect: bool,
    /// `send` fails with `TransportError::NotConnected` (nothing is recorded in `sent`).
    pub fail_send: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle on the call log that survives the transport.
    pub fn shared_log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, TransportCall::Connect))
            .count()
    }

    /// Opcodes of every packet sent, in order.
    pub fn sent_opcodes(&self) -> Vec<Opcode> {
        self.sent.iter().map(|p| p.opcode).collect()
    }

    fn record(&mut self, call: TransportCall) {
        self.log.push(call.clone());
        self.calls.push(call);
    }
}

impl Transport for MockTransport {
    fn initialize(&mut self) -> Result<(), TransportError> {
        self.record(TransportCall::Initialize);
        if self.fail_initialize {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "mock initialize failure",
            )));
        }
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), TransportError> {
        self.record(TransportCall::Terminate);
        Ok(())
    }

    fn set_target(&mut self, target: Target) -> Result<(), TransportError> {
        self.record(TransportCall::SetTarget(target));
        Ok(())
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        self.record(TransportCall::Connect);
        if self.fail_connect {
            return Err(TransportError::Resolve {
                target: "mock".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock resolve failure"),
            });
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.record(TransportCall::Close);
        Ok(())
    }

    fn send(
        &mut self,
        mode: SendMode,
        opcode: Opcode,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        self.record(TransportCall::Send(opcode));
        if self.fail_send {
            return Err(TransportError::NotConnected);
        }
        self.sent.push(SentPacket {
            mode,
            opcode,
            payload: payload.to_vec(),
        });
        Ok(())
    }
}
