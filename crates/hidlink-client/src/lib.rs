//! hidlink-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does hidlink-client do?
//!
//! An application declares up to 32 virtual HID devices and hands them to
//! a [`HidClient`].  The client then:
//!
//! 1. Connects to the peer through a [`Transport`] and re-connects on loss.
//! 2. Announces every enabled device (`DEVICE_NEW`) each time the
//!    connection comes up, and withdraws disabled ones (`DEVICE_DROPPED`).
//! 3. Tracks which report IDs the peer has *grabbed*, and only forwards
//!    input / feature reports for those.
//! 4. Hands feature reports, output reports and feature sollicitations
//!    from the peer to the application's [`HidHandler`].

/// Application layer: the client facade and its collaborators.
pub mod application;

/// Infrastructure layer: transports and configuration.
pub mod infrastructure;

pub use application::connection::ConnectionState;
pub use application::hid_client::{ClientError, HidClient, HidHandler};
pub use application::transport::{SendMode, Target, Transport, TransportError, TransportEvent};
