//! HidClient: the public surface of the client.
//!
//! Owns the device descriptors, the enable mask, the grab accountant and
//! the connection state, and talks to the peer through a [`Transport`].
//!
//! Outbound flow: `enable` / `send_*_report` → codec → `Transport::send`.
//! Inbound flow: [`TransportEvent`] → [`HidClient::handle_transport_event`]
//! → [`dispatch_packet`] → the [`ProtocolHandler`] impl below → grab
//! accountant / state machine / application [`HidHandler`].

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::Arc;

use hidlink_core::protocol::codec::{encode_device_dropped, encode_device_new, encode_report};
use hidlink_core::protocol::messages::Opcode;
use hidlink_core::{dispatch_packet, DeviceDescriptor, GrabAccountant, ProtocolHandler, MAX_DEVICES};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::application::connection::{Connection, ConnectionState};
use crate::application::transport::{SendMode, Target, Transport, TransportError, TransportEvent};

/// Errors returned by the client facade.
#[derive(Debug, Error)]
pub enum ClientError {
    /// More descriptors than the 32-bit enable mask can address.
    #[error(
        "invalid argument: {count} devices declared, at most {max} supported",
        max = MAX_DEVICES
    )]
    TooManyDevices { count: usize },

    /// The grab sets could not be allocated.
    #[error("out of memory allocating grab sets")]
    OutOfMemory,

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `connect_by_hostname` while already connected.
    #[error("invalid argument: already connected")]
    AlreadyConnected,
}

/// Callbacks the application receives from the client.
///
/// Only `on_status` is mandatory; the rest default to no-ops.
#[cfg_attr(test, mockall::automock)]
pub trait HidHandler {
    /// The connection state changed (or a connect attempt failed to resolve).
    fn on_status(&mut self, state: ConnectionState);

    /// The peer sent a feature report.
    fn on_feature_report(&mut self, _device_id: u32, _report_id: u8, _payload: &[u8]) {}

    /// The peer sent an output report (LEDs, rumble...).
    fn on_output_report(&mut self, _device_id: u32, _report_id: u8, _payload: &[u8]) {}

    /// The peer wants the current value of a feature report.
    fn on_feature_sollicit(&mut self, _device_id: u32, _report_id: u8) {}

    /// The peer instantiated the device.
    fn on_device_open(&mut self, _device_id: u32) {}

    /// The peer closed the device.
    fn on_device_close(&mut self, _device_id: u32) {}
}

/// Client context for one set of virtual devices and one peer connection.
pub struct HidClient<T: Transport, H: HidHandler> {
    transport: T,
    handler: H,
    descriptors: Arc<[DeviceDescriptor]>,
    enabled: u32,
    grabs: GrabAccountant,
    connection: Connection,
}

impl<T: Transport, H: HidHandler> HidClient<T, H> {
    /// Creates a client for `descriptors`.  All devices start disabled and
    /// the connection starts `Idle`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::TooManyDevices`] for more than [`MAX_DEVICES`] descriptors.
    /// - [`ClientError::OutOfMemory`] if the grab sets cannot be allocated.
    /// - [`ClientError::Transport`] if the transport fails to initialize.
    pub fn new(
        mut transport: T,
        handler: H,
        descriptors: impl Into<Arc<[DeviceDescriptor]>>,
    ) -> Result<Self, ClientError> {
        let descriptors = descriptors.into();
        if descriptors.len() > MAX_DEVICES {
            return Err(ClientError::TooManyDevices {
                count: descriptors.len(),
            });
        }

        let grabs =
            GrabAccountant::try_new(descriptors.len()).map_err(|_| ClientError::OutOfMemory)?;

        transport.initialize()?;

        debug!(devices = descriptors.len(), "hid client initialized");
        Ok(Self {
            transport,
            handler,
            descriptors,
            enabled: 0,
            grabs,
            connection: Connection::new(),
        })
    }

    // ── Device enable mask ────────────────────────────────────────────────────

    /// Enables device `index`, announcing it right away when connected.
    pub fn enable(&mut self, index: usize) {
        let Some(bit) = self.device_bit(index) else {
            warn!(index, "enable: no such device");
            return;
        };
        if self.enabled & bit != 0 {
            return;
        }
        self.enabled |= bit;
        debug!(index, "device enabled");

        if self.connection.state().is_connected() {
            self.announce(index);
        }
    }

    /// Disables device `index`, telling the peer when connected.
    pub fn disable(&mut self, index: usize) {
        let Some(bit) = self.device_bit(index) else {
            warn!(index, "disable: no such device");
            return;
        };
        if self.enabled & bit == 0 {
            return;
        }
        self.enabled &= !bit;
        debug!(index, "device disabled");

        if self.connection.state().is_connected() {
            let payload = encode_device_dropped(index as u32);
            self.send(SendMode::Reliable, Opcode::DeviceDropped, &payload);
        }
    }

    // ── Report sending ────────────────────────────────────────────────────────

    /// Sends an input report.  Silently dropped unless connected and the
    /// peer has grabbed `(index, report_id)`.
    pub fn send_input_report(
        &mut self,
        index: usize,
        report_id: u8,
        reliable: bool,
        payload: &[u8],
    ) {
        self.send_report(Opcode::Data, index, report_id, reliable, payload);
    }

    /// Sends a feature report, under the same gating as input reports.
    pub fn send_feature_report(
        &mut self,
        index: usize,
        report_id: u8,
        reliable: bool,
        payload: &[u8],
    ) {
        self.send_report(Opcode::Feature, index, report_id, reliable, payload);
    }

    fn send_report(
        &mut self,
        opcode: Opcode,
        index: usize,
        report_id: u8,
        reliable: bool,
        payload: &[u8],
    ) {
        if !self.connection.state().is_connected() {
            trace!(?opcode, index, report_id, "not connected, report dropped");
            return;
        }
        let Ok(device_id) = u32::try_from(index) else {
            return;
        };
        if !self.grabs.is_grabbed(device_id, report_id) {
            trace!(?opcode, index, report_id, "not grabbed, report dropped");
            return;
        }
        let bytes = encode_report(device_id, report_id, payload);
        self.send(SendMode::from_reliable(reliable), opcode, &bytes);
    }

    // ── Connection management ─────────────────────────────────────────────────

    /// Connects to `host:port`, resolved by the transport.
    ///
    /// A failed resolution is not an error here: the state returns to
    /// `Idle` and the handler receives `on_status(ResolveFailed)`.
    ///
    /// # Errors
    ///
    /// [`ClientError::AlreadyConnected`] when the client is connected.
    pub fn connect_by_hostname(
        &mut self,
        host: &str,
        port: u16,
        flags: u32,
    ) -> Result<(), ClientError> {
        if self.connection.state().is_connected() {
            return Err(ClientError::AlreadyConnected);
        }
        self.start_connect(Target::Hostname {
            host: host.to_string(),
            port,
            flags,
        });
        Ok(())
    }

    /// Connects to an IPv4 address.  No-op when connected.
    pub fn connect_by_ipv4(&mut self, addr: Ipv4Addr, port: u16) {
        self.connect_by_addr(SocketAddr::V4(SocketAddrV4::new(addr, port)));
    }

    /// Connects to an IPv6 address.  No-op when connected.
    pub fn connect_by_ipv6(&mut self, addr: Ipv6Addr, port: u16) {
        self.connect_by_addr(SocketAddr::V6(SocketAddrV6::new(addr, port, 0, 0)));
    }

    /// Connects to a fully specified socket address (keeps IPv6 scope IDs).
    /// No-op when connected.
    pub fn connect_by_addr(&mut self, addr: SocketAddr) {
        if self.connection.state().is_connected() {
            debug!(%addr, "already connected, connect ignored");
            return;
        }
        self.start_connect(Target::Addr(addr));
    }

    fn start_connect(&mut self, target: Target) {
        self.connection.set_target(target.clone());
        if let Err(e) = self.transport.set_target(target) {
            warn!("transport rejected target: {e}");
        }

        self.connection.transition(ConnectionState::Connecting);
        if let Err(e) = self.transport.connect() {
            warn!("connect failed: {e}");
            self.connection.transition(ConnectionState::Idle);
            self.handler.on_status(ConnectionState::ResolveFailed);
        }
    }

    /// Closes the connection and returns to `Idle`.  Every grab is void.
    pub fn disconnect(&mut self) {
        if self.connection.state() == ConnectionState::Idle {
            return;
        }
        if let Err(e) = self.transport.close() {
            warn!("transport close failed: {e}");
        }
        self.grabs.reset_all();
        self.connection.transition(ConnectionState::Idle);
        self.handler.on_status(ConnectionState::Idle);
    }

    /// Closes (if needed) and terminates the transport, consuming the client.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if termination fails.
    pub fn teardown(mut self) -> Result<(), ClientError> {
        if self.connection.state() != ConnectionState::Idle {
            if let Err(e) = self.transport.close() {
                warn!("transport close failed: {e}");
            }
        }
        self.transport.terminate()?;
        info!("hid client torn down");
        Ok(())
    }

    /// Applies one transport event.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        let is_lifecycle = !matches!(event, TransportEvent::Packet { .. });
        if is_lifecycle && self.connection.state() == ConnectionState::Idle {
            debug!(?event, "stale transport event while idle");
            return;
        }
        match event {
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Lost => self.on_server_lost(),
            TransportEvent::Packet { opcode, payload } => {
                dispatch_packet(self, opcode, &payload);
            }
        }
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_enabled(&self, index: usize) -> bool {
        self.device_bit(index)
            .map(|bit| self.enabled & bit != 0)
            .unwrap_or(false)
    }

    pub fn is_grabbed(&self, index: usize, report_id: u8) -> bool {
        u32::try_from(index)
            .map(|d| self.grabs.is_grabbed(d, report_id))
            .unwrap_or(false)
    }

    pub fn device_count(&self) -> usize {
        self.descriptors.len()
    }

    pub fn descriptor(&self, index: usize) -> Option<&DeviceDescriptor> {
        self.descriptors.get(index)
    }

    pub fn target(&self) -> Option<&Target> {
        self.connection.target()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn device_bit(&self, index: usize) -> Option<u32> {
        (index < self.descriptors.len()).then(|| 1u32 << index)
    }

    fn announce(&mut self, index: usize) {
        let Some(desc) = self.descriptors.get(index) else {
            return;
        };
        match encode_device_new(index as u32, desc) {
            Ok(payload) => {
                debug!(index, name = %desc.name, version = %desc.version, "announcing device");
                self.send(SendMode::Reliable, Opcode::DeviceNew, &payload);
            }
            Err(e) => warn!(index, "cannot announce device: {e}"),
        }
    }

    fn send(&mut self, mode: SendMode, opcode: Opcode, payload: &[u8]) {
        if let Err(e) = self.transport.send(mode, opcode, payload) {
            warn!(?opcode, "send failed: {e}");
        }
    }
}

impl<T: Transport, H: HidHandler> ProtocolHandler for HidClient<T, H> {
    fn on_connected(&mut self) {
        self.connection.transition(ConnectionState::Connected);
        self.handler.on_status(ConnectionState::Connected);

        for index in 0..self.descriptors.len() {
            if self.enabled & (1 << index) != 0 {
                self.announce(index);
            }
        }
    }

    fn on_server_lost(&mut self) {
        self.handler.on_status(ConnectionState::Connecting);
        self.connection.transition(ConnectionState::Connecting);

        self.grabs.reset_all();

        if let Err(e) = self.transport.connect() {
            warn!("reconnect failed: {e}");
        }
    }

    fn on_device_grab(&mut self, device_id: u32, report_id: u8) {
        if self.grabs.grab(device_id, report_id) {
            debug!(device_id, report_id, "grabbed");
        } else {
            warn!(device_id, report_id, "grab for unknown device ignored");
        }
    }

    fn on_device_release(&mut self, device_id: u32, report_id: u8) {
        if self.grabs.release(device_id, report_id) {
            debug!(device_id, report_id, "released");
        } else {
            warn!(device_id, report_id, "release for unknown device ignored");
        }
    }

    fn on_device_open(&mut self, device_id: u32) {
        info!(device_id, "device opened by peer");
        self.handler.on_device_open(device_id);
    }

    fn on_device_close(&mut self, device_id: u32) {
        if !self.grabs.reset_device(device_id) {
            warn!(device_id, "close for unknown device ignored");
            return;
        }
        info!(device_id, "device closed by peer");
        self.handler.on_device_close(device_id);
    }

    fn on_feature_report(&mut self, device_id: u32, report_id: u8, payload: &[u8]) {
        self.handler.on_feature_report(device_id, report_id, payload);
    }

    fn on_output_report(&mut self, device_id: u32, report_id: u8, payload: &[u8]) {
        self.handler.on_output_report(device_id, report_id, payload);
    }

    fn on_feature_sollicit(&mut self, device_id: u32, report_id: u8) {
        self.handler.on_feature_sollicit(device_id, report_id);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::mock::{MockTransport, TransportCall};
    use hidlink_core::protocol::codec::encode_message;
    use hidlink_core::protocol::messages::HEADER_SIZE;
    use hidlink_core::HidMessage;
    use mockall::predicate::eq;

    fn descriptors(n: usize) -> Vec<DeviceDescriptor> {
        (0..n)
            .map(|i| DeviceDescriptor::new(format!("dev{i}"), 0x0100, vec![0x05, 0x01, i as u8]))
            .collect()
    }

    fn quiet_handler() -> MockHidHandler {
        let mut h = MockHidHandler::new();
        h.expect_on_status().return_const(());
        h
    }

    fn connected_client(n: usize) -> HidClient<MockTransport, MockHidHandler> {
        let mut client =
            HidClient::new(MockTransport::new(), quiet_handler(), descriptors(n)).unwrap();
        client.connect_by_ipv4(Ipv4Addr::LOCALHOST, 24322);
        client.handle_transport_event(TransportEvent::Connected);
        client
    }

    fn packet(msg: HidMessage) -> TransportEvent {
        TransportEvent::Packet {
            opcode: msg.opcode() as u8,
            payload: encode_message(&msg).unwrap(),
        }
    }

    // ── Construction ──────────────────────────────────────────────────────────

    #[test]
    fn test_new_rejects_more_than_32_devices() {
        let result = HidClient::new(MockTransport::new(), MockHidHandler::new(), descriptors(33));

        assert!(matches!(result, Err(ClientError::TooManyDevices { count: 33 })));
    }

    #[test]
    fn test_new_accepts_exactly_32_devices() {
        let client =
            HidClient::new(MockTransport::new(), MockHidHandler::new(), descriptors(32)).unwrap();

        assert_eq!(client.device_count(), 32);
        assert!((0..32).all(|i| !client.is_enabled(i)));
    }

    #[test]
    fn test_new_initializes_transport_and_starts_idle() {
        let client =
            HidClient::new(MockTransport::new(), MockHidHandler::new(), descriptors(1)).unwrap();

        assert_eq!(client.state(), ConnectionState::Idle);
        assert_eq!(client.transport().calls, vec![TransportCall::Initialize]);
    }

    #[test]
    fn test_new_surfaces_transport_initialize_error() {
        let transport = MockTransport {
            fail_initialize: true,
            ..MockTransport::new()
        };

        let result = HidClient::new(transport, MockHidHandler::new(), descriptors(1));

        assert!(matches!(result, Err(ClientError::Transport(_))));
    }

    // ── Connect ───────────────────────────────────────────────────────────────

    #[test]
    fn test_connect_moves_to_connecting_without_status() {
        // Arrange – no on_status expectation: any call would panic
        let mut client =
            HidClient::new(MockTransport::new(), MockHidHandler::new(), descriptors(1)).unwrap();

        // Act
        client.connect_by_hostname("box.local", 24322, 0).unwrap();

        // Assert
        assert_eq!(client.state(), ConnectionState::Connecting);
        assert_eq!(client.transport().connect_count(), 1);
    }

    #[test]
    fn test_resolve_failure_reports_status_and_returns_to_idle() {
        // Arrange
        let mut handler = MockHidHandler::new();
        handler
            .expect_on_status()
            .with(eq(ConnectionState::ResolveFailed))
            .times(1)
            .return_const(());
        let transport = MockTransport {
            fail_connect: true,
            ..MockTransport::new()
        };
        let mut client = HidClient::new(transport, handler, descriptors(1)).unwrap();

        // Act
        let result = client.connect_by_hostname("nowhere.invalid", 1, 0);

        // Assert
        assert!(result.is_ok());
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_connect_by_hostname_while_connected_is_rejected() {
        let mut client = connected_client(1);
        let calls_before = client.transport().calls.len();

        let result = client.connect_by_hostname("other", 1, 0);

        assert!(matches!(result, Err(ClientError::AlreadyConnected)));
        assert_eq!(client.transport().calls.len(), calls_before);
    }

    #[test]
    fn test_connect_by_ipv6_while_connected_is_a_no_op() {
        let mut client = connected_client(1);
        let calls_before = client.transport().calls.len();

        client.connect_by_ipv6(Ipv6Addr::LOCALHOST, 904);

        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(client.transport().calls.len(), calls_before);
    }

    #[test]
    fn test_connect_records_target() {
        let mut client =
            HidClient::new(MockTransport::new(), MockHidHandler::new(), descriptors(1)).unwrap();
        let addr: SocketAddr = "[fe80::1%2]:904".parse().unwrap();

        client.connect_by_addr(addr);

        assert_eq!(client.target(), Some(&Target::Addr(addr)));
        assert!(client
            .transport()
            .calls
            .contains(&TransportCall::SetTarget(Target::Addr(addr))));
    }

    // ── Connected / lost ──────────────────────────────────────────────────────

    #[test]
    fn test_connected_reports_status_then_announces_enabled_devices() {
        // Arrange
        let mut handler = MockHidHandler::new();
        handler
            .expect_on_status()
            .with(eq(ConnectionState::Connected))
            .times(1)
            .return_const(());
        let mut client = HidClient::new(MockTransport::new(), handler, descriptors(3)).unwrap();
        client.enable(2);
        client.enable(0);
        client.connect_by_ipv4(Ipv4Addr::LOCALHOST, 24322);

        // Act
        client.handle_transport_event(TransportEvent::Connected);

        // Assert – ascending index order, reliable
        let sent = &client.transport().sent;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|p| p.opcode == Opcode::DeviceNew && p.mode == SendMode::Reliable));
        assert_eq!(&sent[0].payload[..4], &0u32.to_be_bytes());
        assert_eq!(&sent[1].payload[..4], &2u32.to_be_bytes());
    }

    #[test]
    fn test_lost_reports_connecting_resets_grabs_and_reconnects() {
        // Arrange
        let mut client = connected_client(2);
        client.enable(1);
        client.handle_transport_event(packet(HidMessage::Grab { device_id: 1, report_id: 4 }));
        let connects_before = client.transport().connect_count();

        // Act
        client.handle_transport_event(TransportEvent::Lost);

        // Assert
        assert_eq!(client.state(), ConnectionState::Connecting);
        assert!(!client.is_grabbed(1, 4));
        assert!(client.is_enabled(1), "enable mask survives loss");
        assert_eq!(client.transport().connect_count(), connects_before + 1);
    }

    #[test]
    fn test_lost_status_is_connecting() {
        // Arrange
        let mut handler = MockHidHandler::new();
        let mut seq = mockall::Sequence::new();
        handler
            .expect_on_status()
            .with(eq(ConnectionState::Connected))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        handler
            .expect_on_status()
            .with(eq(ConnectionState::Connecting))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        let mut client = HidClient::new(MockTransport::new(), handler, descriptors(1)).unwrap();
        client.connect_by_ipv4(Ipv4Addr::LOCALHOST, 1);

        // Act
        client.handle_transport_event(TransportEvent::Connected);
        client.handle_transport_event(TransportEvent::Lost);

        // Assert – verified by the mock on drop
    }

    #[test]
    fn test_events_while_idle_are_ignored() {
        // Arrange – no on_status expectation
        let mut client =
            HidClient::new(MockTransport::new(), MockHidHandler::new(), descriptors(1)).unwrap();

        // Act
        client.handle_transport_event(TransportEvent::Connected);
        client.handle_transport_event(TransportEvent::Lost);

        // Assert
        assert_eq!(client.state(), ConnectionState::Idle);
        assert_eq!(client.transport().connect_count(), 0);
    }

    // ── Enable / disable ──────────────────────────────────────────────────────

    #[test]
    fn test_enable_while_disconnected_sends_nothing() {
        let mut client =
            HidClient::new(MockTransport::new(), MockHidHandler::new(), descriptors(2)).unwrap();

        client.enable(1);

        assert!(client.is_enabled(1));
        assert!(client.transport().sent.is_empty());
    }

    #[test]
    fn test_enable_while_connected_announces_once() {
        // Arrange
        let mut client = connected_client(2);

        // Act
        client.enable(1);
        client.enable(1);

        // Assert
        let sent = &client.transport().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode, Opcode::DeviceNew);
    }

    #[test]
    fn test_disable_while_connected_sends_dropped_once() {
        // Arrange
        let mut client = connected_client(2);
        client.enable(0);
        client.transport_mut().sent.clear();

        // Act
        client.disable(0);
        client.disable(0);

        // Assert
        let sent = &client.transport().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode, Opcode::DeviceDropped);
        assert_eq!(sent[0].mode, SendMode::Reliable);
        assert_eq!(sent[0].payload, vec![0u8; 8]);
    }

    #[test]
    fn test_disable_of_never_enabled_device_sends_nothing() {
        let mut client = connected_client(1);

        client.disable(0);

        assert!(client.transport().sent.is_empty());
    }

    #[test]
    fn test_enable_out_of_range_is_ignored() {
        let mut client = connected_client(1);

        client.enable(5);
        client.enable(40);

        assert!(!client.is_enabled(5));
        assert!(client.transport().sent.is_empty());
    }

    // ── Report gating ─────────────────────────────────────────────────────────

    #[test]
    fn test_report_without_grab_is_dropped() {
        let mut client = connected_client(1);
        client.enable(0);
        client.transport_mut().sent.clear();

        client.send_input_report(0, 1, true, &[1, 2, 3]);
        client.send_feature_report(0, 1, true, &[1, 2, 3]);

        assert!(client.transport().sent.is_empty());
    }

    #[test]
    fn test_grabbed_input_report_is_sent_with_requested_mode() {
        // Arrange
        let mut client = connected_client(1);
        client.handle_transport_event(packet(HidMessage::Grab { device_id: 0, report_id: 2 }));

        // Act
        client.send_input_report(0, 2, false, &[0x00, 0x04]);

        // Assert
        let sent = &client.transport().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode, Opcode::Data);
        assert_eq!(sent[0].mode, SendMode::BestEffort);
        assert_eq!(sent[0].payload, vec![0, 0, 0, 0, 0, 0, 0, 2, 0x00, 0x04]);
    }

    #[test]
    fn test_grabbed_feature_report_uses_feature_opcode() {
        let mut client = connected_client(1);
        client.handle_transport_event(packet(HidMessage::Grab { device_id: 0, report_id: 7 }));

        client.send_feature_report(0, 7, true, &[0xAA]);

        assert_eq!(client.transport().sent[0].opcode, Opcode::Feature);
        assert_eq!(client.transport().sent[0].mode, SendMode::Reliable);
    }

    #[test]
    fn test_release_stops_reports() {
        let mut client = connected_client(1);
        client.handle_transport_event(packet(HidMessage::Grab { device_id: 0, report_id: 2 }));
        client.handle_transport_event(packet(HidMessage::Release { device_id: 0, report_id: 2 }));

        client.send_input_report(0, 2, true, &[1]);

        assert!(client.transport().sent.is_empty());
    }

    #[test]
    fn test_report_while_connecting_is_dropped_even_if_grabbed() {
        // Arrange
        let mut client = connected_client(1);
        client.handle_transport_event(packet(HidMessage::Grab { device_id: 0, report_id: 1 }));
        client.handle_transport_event(TransportEvent::Lost);
        // re-grab while connecting: still gated by state
        client.handle_transport_event(packet(HidMessage::Grab { device_id: 0, report_id: 1 }));

        // Act
        client.send_input_report(0, 1, true, &[1]);

        // Assert
        assert!(client.transport().sent.is_empty());
    }

    // ── Inbound notifications ─────────────────────────────────────────────────

    #[test]
    fn test_device_close_voids_grabs_and_notifies_handler() {
        // Arrange
        let mut handler = quiet_handler();
        handler.expect_on_device_close().with(eq(0u32)).times(1).return_const(());
        let mut client = HidClient::new(MockTransport::new(), handler, descriptors(1)).unwrap();
        client.connect_by_ipv4(Ipv4Addr::LOCALHOST, 1);
        client.handle_transport_event(TransportEvent::Connected);
        client.handle_transport_event(packet(HidMessage::Grab { device_id: 0, report_id: 3 }));

        // Act
        client.handle_transport_event(packet(HidMessage::DeviceClose { device_id: 0 }));

        // Assert
        assert!(!client.is_grabbed(0, 3));
    }

    #[test]
    fn test_output_report_reaches_handler() {
        // Arrange
        let mut handler = quiet_handler();
        handler
            .expect_on_output_report()
            .withf(|d, r, p| *d == 0 && *r == 1 && p.to_vec() == vec![0x02])
            .times(1)
            .return_const(());
        let mut client = HidClient::new(MockTransport::new(), handler, descriptors(1)).unwrap();

        // Act – inbound notifications are processed regardless of state
        client.handle_transport_event(TransportEvent::Packet {
            opcode: Opcode::Data as u8,
            payload: encode_report(0, 1, &[0x02]),
        });
    }

    #[test]
    fn test_feature_sollicit_and_open_reach_handler() {
        let mut handler = MockHidHandler::new();
        handler.expect_on_feature_sollicit().with(eq(0u32), eq(9u8)).times(1).return_const(());
        handler.expect_on_device_open().with(eq(0u32)).times(1).return_const(());
        let mut client = HidClient::new(MockTransport::new(), handler, descriptors(1)).unwrap();

        client.handle_transport_event(packet(HidMessage::DeviceCreated { device_id: 0 }));
        client.handle_transport_event(packet(HidMessage::FeatureSollicit {
            device_id: 0,
            report_id: 9,
        }));
    }

    #[test]
    fn test_grab_for_out_of_range_device_is_ignored() {
        let mut client = connected_client(1);

        client.handle_transport_event(packet(HidMessage::Grab { device_id: 7, report_id: 1 }));

        assert!(!client.is_grabbed(7, 1));
        assert!(!client.is_grabbed(0, 1));
    }

    #[test]
    fn test_short_packets_leave_every_state_untouched() {
        // Arrange – only the single Connected status is allowed
        let mut handler = MockHidHandler::new();
        handler
            .expect_on_status()
            .with(eq(ConnectionState::Connected))
            .times(1)
            .return_const(());
        let mut client = HidClient::new(MockTransport::new(), handler, descriptors(1)).unwrap();
        client.connect_by_ipv4(Ipv4Addr::LOCALHOST, 24322);
        client.handle_transport_event(TransportEvent::Connected);
        client.enable(0);
        client.handle_transport_event(packet(HidMessage::Grab { device_id: 0, report_id: 1 }));
        let calls_before = client.transport().calls.clone();

        // Act – every opcode, every length short of a header
        for opcode in 0u8..=8 {
            for len in 0..HEADER_SIZE {
                client.handle_transport_event(TransportEvent::Packet {
                    opcode,
                    payload: vec![0; len],
                });
            }
        }

        // Assert
        assert!(client.is_grabbed(0, 1));
        assert!(client.is_enabled(0));
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(client.transport().calls, calls_before);
    }

    #[test]
    fn test_wide_report_ids_are_narrowed_to_their_low_byte() {
        // Arrange
        let mut handler = quiet_handler();
        handler
            .expect_on_feature_report()
            .withf(|d, r, p| *d == 0 && *r == 2 && p.to_vec() == vec![0xAA])
            .times(1)
            .return_const(());
        let mut client = HidClient::new(MockTransport::new(), handler, descriptors(1)).unwrap();
        client.connect_by_ipv4(Ipv4Addr::LOCALHOST, 24322);
        client.handle_transport_event(TransportEvent::Connected);

        // Act
        client.handle_transport_event(TransportEvent::Packet {
            opcode: Opcode::Grab as u8,
            payload: vec![0, 0, 0, 0, 0, 0, 1, 1],
        });
        client.handle_transport_event(TransportEvent::Packet {
            opcode: Opcode::Feature as u8,
            payload: vec![0, 0, 0, 0, 0, 0, 1, 2, 0xAA],
        });

        // Assert
        assert!(client.is_grabbed(0, 1));
    }

    // ── Disconnect / teardown ─────────────────────────────────────────────────

    #[test]
    fn test_disconnect_closes_resets_and_reports_idle() {
        // Arrange
        let mut client = connected_client(1);
        client.handle_transport_event(packet(HidMessage::Grab { device_id: 0, report_id: 1 }));

        // Act
        client.disconnect();

        // Assert
        assert_eq!(client.state(), ConnectionState::Idle);
        assert!(!client.is_grabbed(0, 1));
        assert!(client.transport().calls.contains(&TransportCall::Close));
    }

    #[test]
    fn test_disconnect_while_idle_does_nothing() {
        let mut client =
            HidClient::new(MockTransport::new(), MockHidHandler::new(), descriptors(1)).unwrap();

        client.disconnect();

        assert!(!client.transport().calls.contains(&TransportCall::Close));
    }

    #[test]
    fn test_teardown_while_idle_only_terminates() {
        let client =
            HidClient::new(MockTransport::new(), MockHidHandler::new(), descriptors(1)).unwrap();
        let log = client.transport().shared_log();

        client.teardown().unwrap();

        assert_eq!(
            log.snapshot(),
            vec![TransportCall::Initialize, TransportCall::Terminate]
        );
    }

    #[test]
    fn test_teardown_while_connected_closes_first() {
        let client = connected_client(1);
        let log = client.transport().shared_log();

        client.teardown().unwrap();

        let calls = log.snapshot();
        let n = calls.len();
        assert_eq!(&calls[n - 2..], &[TransportCall::Close, TransportCall::Terminate]);
    }
}
