//! Wake-phrase gating for VoxLink sessions.
//!
//! A small state machine over a rolling transcript window decides when a
//! session enters command mode. The transition is one-way: once active,
//! a session stays active until it ends.

pub mod buffer;
pub mod gate;

pub use buffer::{TranscriptBuffer, WINDOW_CAPACITY};
pub use gate::{GateDecision, GateState, WakeGate};
