//! VoxLink application layer: transport relay, command dispatch, session
//! accounting, and the wiring for both binaries.

pub mod dispatch;
pub mod relay;
pub mod runtime;
pub mod session;
