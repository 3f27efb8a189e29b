//! BLE device link for VoxLink
//!
//! Owns the connection to the wearable: subscribes to the fixed audio
//! notification characteristic, decodes each compressed packet, and
//! surfaces PCM chunks to a callback and a bounded queue in arrival
//! order. One link per runtime process invocation.

pub mod link;

pub use link::{DeviceLink, LinkStats};
