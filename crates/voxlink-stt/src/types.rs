//! Core types for streaming transcription

use chrono::{DateTime, Utc};

/// One normalized transcript delivered by the provider, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub text: String,
    /// Interim results arrive with `is_final == false` and may be revised
    /// by the provider; final results close out a stretch of speech.
    pub is_final: bool,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEvent {
    pub fn new(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            text: text.into(),
            is_final,
            timestamp: Utc::now(),
        }
    }
}
