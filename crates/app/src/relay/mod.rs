//! Transport relay: the duplex channel between the device runtime and
//! the backend voice session.

pub mod protocol;
pub mod sender;
pub mod server;

pub use protocol::ServerEvent;
pub use server::{router, RelayState};
