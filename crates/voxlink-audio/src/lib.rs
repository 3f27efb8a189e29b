//! Compressed audio decoding for the VoxLink pipeline.
//!
//! The wearable streams Opus frames wrapped in small notification packets;
//! this crate turns one packet into linear PCM or nothing.

pub mod constants;
pub mod decoder;

pub use constants::{
    BYTES_PER_SAMPLE, CHANNELS, MAX_FRAME_SAMPLES, PACKET_HEADER_LEN, SAMPLE_RATE_HZ,
};
pub use decoder::{DecoderError, PacketDecoder};
