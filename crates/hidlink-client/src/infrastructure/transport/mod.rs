//! [`Transport`](crate::application::transport::Transport) implementations.
//!
//! - **`tcp`** – Tokio TCP transport used by the bundled binary.
//! - **`mock`** – Recording transport for tests.

pub mod mock;
pub mod tcp;

pub use mock::MockTransport;
pub use tcp::TcpTransport;
