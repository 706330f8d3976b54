//! Infrastructure layer for the client.
//!
//! Contains the I/O-facing adapters: transports and on-disk configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `hidlink_core`, but MUST NOT be imported by the `application` layer
//! outside of tests.
//!
//! # Sub-modules
//!
//! - **`transport`** – the Tokio TCP transport and a recording mock.
//! - **`storage`** – TOML configuration: server target, reconnect interval,
//!   log level and the declared devices.

pub mod storage;
pub mod transport;
