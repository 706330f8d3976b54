//! Inbound packet dispatch.
//!
//! [`dispatch_packet`] turns one raw payload received from the transport
//! into a single call on a [`ProtocolHandler`].  Malformed or unexpected
//! packets never reach the handler; they are logged and reported back as
//! [`Dispatch::Dropped`] or [`Dispatch::Ignored`].

use crate::protocol::codec::{decode_header, narrow_report_id};
use crate::protocol::messages::{Opcode, HEADER_SIZE};
use tracing::{debug, trace};

/// Receiver of decoded protocol notifications.
///
/// `on_connected` and `on_server_lost` are driven by transport events rather
/// than packets; they live here so that one object owns every protocol-level
/// reaction.
pub trait ProtocolHandler {
    /// The transport reached the peer.
    fn on_connected(&mut self);

    /// The transport lost the peer.
    fn on_server_lost(&mut self);

    /// The peer took ownership of `(device_id, report_id)`.
    fn on_device_grab(&mut self, device_id: u32, report_id: u8);

    /// The peer gave up `(device_id, report_id)`.
    fn on_device_release(&mut self, device_id: u32, report_id: u8);

    /// The peer instantiated an announced device.
    fn on_device_open(&mut self, device_id: u32);

    /// The peer closed a device; every grab on it is void.
    fn on_device_close(&mut self, device_id: u32);

    /// A feature report arrived from the peer.
    fn on_feature_report(&mut self, device_id: u32, report_id: u8, payload: &[u8]);

    /// An output report arrived from the peer.
    fn on_output_report(&mut self, device_id: u32, report_id: u8, payload: &[u8]);

    /// The peer asks the application for a feature report.
    fn on_feature_sollicit(&mut self, device_id: u32, report_id: u8);
}

/// What [`dispatch_packet`] did with a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Exactly one handler method was called.
    Delivered,
    /// Well-formed but not meant for a client (or unknown opcode).
    Ignored,
    /// Malformed: shorter than the header.
    Dropped,
}

/// Decodes `bytes` received with `opcode` and notifies `handler`.
///
/// Report payloads are handed out as a borrow of `bytes` past the header;
/// nothing is copied.
pub fn dispatch_packet<H>(handler: &mut H, opcode: u8, bytes: &[u8]) -> Dispatch
where
    H: ProtocolHandler + ?Sized,
{
    let header = match decode_header(bytes) {
        Ok(h) => h,
        Err(e) => {
            debug!(opcode, len = bytes.len(), "dropping short packet: {e}");
            return Dispatch::Dropped;
        }
    };

    let op = match Opcode::try_from(opcode) {
        Ok(op) => op,
        Err(()) => {
            trace!(opcode, "ignoring unknown opcode");
            return Dispatch::Ignored;
        }
    };

    let device_id = header.device_id;

    // Header-only notifications do not look at report_id.
    match op {
        Opcode::DeviceNew | Opcode::DeviceDropped => {
            trace!(?op, device_id, "ignoring client-to-server opcode");
            return Dispatch::Ignored;
        }
        Opcode::DeviceCreated => {
            debug!(device_id, "device created by peer");
            handler.on_device_open(device_id);
            return Dispatch::Delivered;
        }
        Opcode::DeviceClose => {
            debug!(device_id, "device closed by peer");
            handler.on_device_close(device_id);
            return Dispatch::Delivered;
        }
        _ => {}
    }

    let report_id = narrow_report_id(header.report_id);
    let payload = &bytes[HEADER_SIZE..];

    match op {
        Opcode::Feature => handler.on_feature_report(device_id, report_id, payload),
        Opcode::Data => handler.on_output_report(device_id, report_id, payload),
        Opcode::Grab => handler.on_device_grab(device_id, report_id),
        Opcode::Release => handler.on_device_release(device_id, report_id),
        Opcode::FeatureSollicit => handler.on_feature_sollicit(device_id, report_id),
        Opcode::DeviceNew
        | Opcode::DeviceDropped
        | Opcode::DeviceCreated
        | Opcode::DeviceClose => unreachable!("handled above"),
    }
    trace!(?op, device_id, report_id, len = payload.len(), "dispatched");
    Dispatch::Delivered
}
