use std::sync::atomic::Ordering;
use std::sync::Arc;

use thiserror::Error;
use voxlink_telemetry::PipelineMetrics;

use crate::constants::{MAX_FRAME_SAMPLES, PACKET_HEADER_LEN, SAMPLE_RATE_HZ};

#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("Failed to initialize codec: {0}")]
    Init(#[from] opus::Error),
}

/// Decodes one compressed notification packet into 16-bit/16 kHz/mono PCM.
///
/// Codec state mutates per call and is scoped to one device connection;
/// instances are never shared across connections. Malformed packets are
/// dropped, never raised: the pipeline must not halt on one corrupt frame.
pub struct PacketDecoder {
    decoder: opus::Decoder,
    pcm: Vec<i16>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl PacketDecoder {
    pub fn new() -> Result<Self, DecoderError> {
        let decoder = opus::Decoder::new(SAMPLE_RATE_HZ, opus::Channels::Mono)?;
        Ok(Self {
            decoder,
            pcm: vec![0i16; MAX_FRAME_SAMPLES],
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.set_metrics(metrics);
        self
    }

    pub fn set_metrics(&mut self, metrics: Arc<PipelineMetrics>) {
        self.metrics = Some(metrics);
    }

    /// Decode a packet, returning interleaved little-endian PCM bytes, or
    /// `None` when the packet is malformed.
    pub fn decode(&mut self, packet: &[u8]) -> Option<Vec<u8>> {
        if let Some(m) = &self.metrics {
            m.packets_in.fetch_add(1, Ordering::Relaxed);
        }

        if packet.len() <= PACKET_HEADER_LEN {
            tracing::debug!(len = packet.len(), "Dropping runt audio packet");
            self.note_failure();
            return None;
        }

        let payload = &packet[PACKET_HEADER_LEN..];
        match self.decoder.decode(payload, &mut self.pcm, false) {
            Ok(samples) => {
                let mut out = Vec::with_capacity(samples * 2);
                for &s in &self.pcm[..samples] {
                    out.extend_from_slice(&s.to_le_bytes());
                }
                if let Some(m) = &self.metrics {
                    m.pcm_chunks.fetch_add(1, Ordering::Relaxed);
                }
                Some(out)
            }
            Err(e) => {
                tracing::debug!(error = %e, len = payload.len(), "Opus decode failed, dropping frame");
                self.note_failure();
                None
            }
        }
    }

    fn note_failure(&self) {
        if let Some(m) = &self.metrics {
            m.decode_failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}
