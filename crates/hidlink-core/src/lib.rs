//! # hidlink-core
//!
//! Shared library for HID-Link containing the wire codec, the inbound
//! protocol dispatcher, device descriptors and per-device grab accounting.
//!
//! It has zero dependencies on OS APIs, sockets or async runtimes; the
//! transport is somebody else's problem.
//!
//! # Architecture overview
//!
//! HID-Link lets an application expose a set of *virtual* human interface
//! devices (keyboards, remotes, game pads...) to a remote peer.  The peer
//! instantiates each announced device locally and forwards its reports.
//!
//! - **`protocol`** – How bytes travel over the link.  Every message starts
//!   with an 8-byte header (`device_id`, `report_id`, both big-endian) and is
//!   tagged with a one-byte opcode carried by the transport.  Device
//!   announcements embed an offset/size table pointing at 4-byte aligned
//!   descriptor blobs.
//!
//! - **`domain`** – Device descriptors supplied by the application, and the
//!   grab accountant: a 256-bit set per device recording which report IDs
//!   the peer currently owns.  Reports may only be sent for grabbed IDs.

pub mod domain;
pub mod protocol;

pub use domain::device::{DeviceDescriptor, DeviceVersion};
pub use domain::grab::{GrabAccountant, GrabSet, MAX_DEVICES};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::dispatch::{dispatch_packet, Dispatch, ProtocolHandler};
pub use protocol::messages::{HidMessage, Opcode};
