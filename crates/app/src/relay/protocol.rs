//! Wire protocol for the duplex voice channel.
//!
//! Binary frames carry PCM audio device -> backend; JSON text frames
//! carry events backend -> device. Both halves of the relay share these
//! types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Raw transcript annotated with the gate status. Sent for every
    /// transcript, active or not.
    Transcription { text: String, wake_word_active: bool },
    /// The gate transitioned to active.
    WakeWord { message: String },
    /// Classifier verdict for one command transcript.
    Intent {
        intent: String,
        confidence: f64,
        entities: serde_json::Value,
    },
    /// Non-fatal or terminal session error.
    Error { message: String },
}

impl ServerEvent {
    pub fn wake_word_detected() -> Self {
        Self::WakeWord {
            message: "Wake word detected!".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcription_uses_type_discriminator() {
        let event = ServerEvent::Transcription {
            text: "check slack".into(),
            wake_word_active: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"transcription""#));
        assert!(json.contains(r#""wake_word_active":true"#));
    }

    #[test]
    fn wake_word_event_round_trips() {
        let event = ServerEvent::wake_word_detected();
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"wake_word""#));
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn intent_event_carries_entities() {
        let event = ServerEvent::Intent {
            intent: "check_slack".into(),
            confidence: 0.92,
            entities: serde_json::json!({"channel": "general"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"intent""#));
        assert!(json.contains(r#""channel":"general""#));
    }

    #[test]
    fn unknown_event_type_fails_to_parse() {
        let err = serde_json::from_str::<ServerEvent>(r#"{"type":"telemetry","x":1}"#);
        assert!(err.is_err());
    }
}
