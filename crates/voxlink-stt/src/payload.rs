//! Provider payload normalization
//!
//! Transcript payloads arrive in several shapes depending on the provider
//! and message kind. Deserialization tries each known shape in order and
//! lands on an explicit `Unrecognized` variant for anything else, so an
//! unexpected message is skipped rather than crashing the read loop.

use serde::Deserialize;

use crate::types::TranscriptEvent;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ProviderPayload {
    /// `{"channel": {"alternatives": [{"transcript": ...}]}, "is_final": ...}`
    ChannelAlternatives {
        channel: PayloadChannel,
        #[serde(default)]
        is_final: bool,
    },
    /// `{"alternatives": [{"transcript": ...}], "is_final": ...}`
    BareAlternatives {
        alternatives: Vec<PayloadAlternative>,
        #[serde(default)]
        is_final: bool,
    },
    /// `{"transcript": ..., "is_final": ...}`
    Flat {
        transcript: String,
        #[serde(default)]
        is_final: bool,
    },
    /// Anything else the provider sends (metadata, keepalives, future
    /// message kinds). Skipped by the reader.
    Unrecognized(serde_json::Value),
}

#[derive(Debug, Deserialize)]
pub struct PayloadChannel {
    pub alternatives: Vec<PayloadAlternative>,
}

#[derive(Debug, Deserialize)]
pub struct PayloadAlternative {
    pub transcript: String,
}

impl ProviderPayload {
    /// Normalize into a transcript event. Returns `None` for unrecognized
    /// payloads and for recognized ones whose transcript is empty.
    pub fn normalize(self) -> Option<TranscriptEvent> {
        let (text, is_final) = match self {
            ProviderPayload::ChannelAlternatives { channel, is_final } => {
                (channel.alternatives.into_iter().next()?.transcript, is_final)
            }
            ProviderPayload::BareAlternatives {
                alternatives,
                is_final,
            } => (alternatives.into_iter().next()?.transcript, is_final),
            ProviderPayload::Flat {
                transcript,
                is_final,
            } => (transcript, is_final),
            ProviderPayload::Unrecognized(_) => return None,
        };

        if text.trim().is_empty() {
            return None;
        }
        Some(TranscriptEvent::new(text, is_final))
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, ProviderPayload::Unrecognized(_))
    }
}
