//! Application layer of the client.
//!
//! - **`hid_client`** – the [`HidClient`](hid_client::HidClient) facade:
//!   device enable mask, report gating and the reaction to every protocol
//!   notification.
//! - **`connection`** – connection states and the bookkeeping of the
//!   current target.
//! - **`transport`** – the [`Transport`](transport::Transport) trait the
//!   facade drives, and the events it is driven by.

pub mod connection;
pub mod hid_client;
pub mod transport;
