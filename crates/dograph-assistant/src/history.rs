//! Bounded conversational history.
//!
//! The log itself is append-only for the lifetime of the session; prompts
//! only ever see the most recent `window` exchanges. A session object is owned
//! by whoever drives the turns and passed into each one explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTORY_WINDOW: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub input: String,
    pub output: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ConversationHistory {
    log: Vec<Exchange>,
    window: usize,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl ConversationHistory {
    pub fn new(window: usize) -> Self {
        Self {
            log: Vec::new(),
            window,
        }
    }

    pub fn append(&mut self, input: impl Into<String>, output: impl Into<String>) {
        self.log.push(Exchange {
            input: input.into(),
            output: output.into(),
            at: Utc::now(),
        });
    }

    /// The most recent exchanges, oldest first.
    pub fn window(&self) -> &[Exchange] {
        let start = self.log.len().saturating_sub(self.window);
        &self.log[start..]
    }

    /// Window rendered as `Human:` / `AI:` lines for prompt inclusion.
    pub fn render_window(&self) -> String {
        self.window()
            .iter()
            .map(|e| format!("Human: {}\nAI: {}", e.input, e.output))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn window_size(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }
}
