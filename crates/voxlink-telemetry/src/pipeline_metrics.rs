use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared metrics for cross-task pipeline monitoring.
///
/// Every stage clones the struct and bumps its own counters; nothing here
/// blocks the audio path.
#[derive(Clone)]
pub struct PipelineMetrics {
    // Device link / decoder
    pub packets_in: Arc<AtomicU64>,
    pub decode_failures: Arc<AtomicU64>,
    pub pcm_chunks: Arc<AtomicU64>,

    // Transport relay
    pub frames_relayed: Arc<AtomicU64>,
    pub bytes_relayed: Arc<AtomicU64>,
    pub events_sent: Arc<AtomicU64>,

    // Transcription session
    pub transcripts_partial: Arc<AtomicU64>,
    pub transcripts_final: Arc<AtomicU64>,
    pub provider_parse_failures: Arc<AtomicU64>,

    // Wake gate / dispatcher
    pub wake_activations: Arc<AtomicU64>,
    pub intents_dispatched: Arc<AtomicU64>,
    pub dispatch_failures: Arc<AtomicU64>,

    // Session accounting
    pub active_sessions: Arc<AtomicUsize>,
    pub sessions_started: Arc<AtomicU64>,
    pub sessions_closed: Arc<AtomicU64>,

    pub last_transcript_time: Arc<RwLock<Option<Instant>>>,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            packets_in: Arc::new(AtomicU64::new(0)),
            decode_failures: Arc::new(AtomicU64::new(0)),
            pcm_chunks: Arc::new(AtomicU64::new(0)),

            frames_relayed: Arc::new(AtomicU64::new(0)),
            bytes_relayed: Arc::new(AtomicU64::new(0)),
            events_sent: Arc::new(AtomicU64::new(0)),

            transcripts_partial: Arc::new(AtomicU64::new(0)),
            transcripts_final: Arc::new(AtomicU64::new(0)),
            provider_parse_failures: Arc::new(AtomicU64::new(0)),

            wake_activations: Arc::new(AtomicU64::new(0)),
            intents_dispatched: Arc::new(AtomicU64::new(0)),
            dispatch_failures: Arc::new(AtomicU64::new(0)),

            active_sessions: Arc::new(AtomicUsize::new(0)),
            sessions_started: Arc::new(AtomicU64::new(0)),
            sessions_closed: Arc::new(AtomicU64::new(0)),

            last_transcript_time: Arc::new(RwLock::new(None)),
        }
    }
}

impl PipelineMetrics {
    pub fn record_transcript(&self, is_final: bool) {
        if is_final {
            self.transcripts_final.fetch_add(1, Ordering::Relaxed);
        } else {
            self.transcripts_partial.fetch_add(1, Ordering::Relaxed);
        }
        *self.last_transcript_time.write() = Some(Instant::now());
    }

    pub fn session_opened(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
        // Saturating: a close observed twice must not wrap the gauge.
        let _ = self
            .active_sessions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }
}
