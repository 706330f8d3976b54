//! Protocol module containing message types, the binary codec and the
//! inbound dispatcher.

pub mod codec;
pub mod dispatch;
pub mod messages;

pub use codec::{
    decode_header, decode_message, encode_device_dropped, encode_device_new, encode_message,
    encode_report, ProtocolError,
};
pub use dispatch::{dispatch_packet, Dispatch, ProtocolHandler};
pub use messages::*;
