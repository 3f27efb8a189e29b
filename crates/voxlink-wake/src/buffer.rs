use std::collections::VecDeque;

/// How many trailing transcript fragments are kept for phrase matching.
pub const WINDOW_CAPACITY: usize = 5;

/// Rolling window over the most recent transcript fragments.
///
/// Bounded FIFO: pushing a sixth entry evicts the oldest. Exists only so a
/// wake phrase split across adjacent fragments can still match.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    entries: VecDeque<String>,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(WINDOW_CAPACITY),
        }
    }

    pub fn push(&mut self, text: impl Into<String>) {
        if self.entries.len() == WINDOW_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(text.into());
    }

    /// All retained fragments, oldest first, joined with single spaces.
    pub fn joined(&self) -> String {
        let mut out = String::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(entry);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}
