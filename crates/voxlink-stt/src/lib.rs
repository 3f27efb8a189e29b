//! Speech-to-text streaming layer for VoxLink
//!
//! This crate owns the connection to the external transcription provider:
//! it submits PCM audio, normalizes the provider's several payload shapes
//! into one event type, and delivers events over a channel in provider
//! order.

pub mod payload;
pub mod session;
pub mod types;

pub use payload::ProviderPayload;
pub use session::TranscriptionSession;
pub use types::TranscriptEvent;
