//! Domain entities for HID-Link.
//!
//! Pure data and bookkeeping with no transport or I/O dependencies.
//!
//! - [`device`] – the application-supplied description of each virtual
//!   device (name, version and the three opaque descriptor blobs).
//! - [`grab`] – which report IDs of which device the peer has grabbed.

pub mod device;
pub mod grab;
