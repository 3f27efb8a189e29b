use crate::buffer::TranscriptBuffer;

/// Gate state. `Active` is terminal: within one session the gate never
/// returns to `Passive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Passive,
    Active,
}

/// Outcome of observing one transcript fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    /// This fragment caused the Passive -> Active transition.
    pub activated_now: bool,
    /// Current gate state after observing the fragment. Consumers always
    /// receive the raw transcript annotated with this flag.
    pub active: bool,
}

/// Wake-phrase gate over a rolling transcript window.
///
/// Each fragment is appended to the window, the window is joined with
/// single spaces, and the configured phrase is tested as a
/// case-insensitive substring of the joined text.
pub struct WakeGate {
    phrase: String,
    state: GateState,
    buffer: TranscriptBuffer,
}

impl WakeGate {
    pub fn new(phrase: impl Into<String>) -> Self {
        let phrase = phrase.into().to_lowercase();
        Self {
            phrase,
            state: GateState::Passive,
            buffer: TranscriptBuffer::new(),
        }
    }

    pub fn observe(&mut self, text: &str) -> GateDecision {
        self.buffer.push(text);

        let mut activated_now = false;
        if self.state == GateState::Passive {
            let window = self.buffer.joined().to_lowercase();
            if window.contains(&self.phrase) {
                tracing::info!(phrase = %self.phrase, "Wake phrase detected, gate active");
                self.state = GateState::Active;
                activated_now = true;
            }
        }

        GateDecision {
            activated_now,
            active: self.state == GateState::Active,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == GateState::Active
    }
}
