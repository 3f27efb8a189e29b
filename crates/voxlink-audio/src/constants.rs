/// Sample rate of decoded PCM, in Hz.
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Decoded PCM channel count (mono).
pub const CHANNELS: usize = 1;

/// Bytes per PCM sample (signed 16-bit little-endian).
pub const BYTES_PER_SAMPLE: usize = 2;

/// Notification packets carry a 3-byte header (u16 LE packet index plus
/// a u8 sub-index) ahead of the Opus frame.
pub const PACKET_HEADER_LEN: usize = 3;

/// Largest Opus frame the decoder accepts: 120 ms at 16 kHz.
pub const MAX_FRAME_SAMPLES: usize = 1920;
