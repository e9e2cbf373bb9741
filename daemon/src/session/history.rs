use std::collections::VecDeque;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Conversation turns need non-empty user and assistant text")]
pub struct EmptyTurnError;

/// One committed (user, assistant) exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    user: String,
    assistant: String,
}

impl Turn {
    pub fn new(
        user: impl Into<String>,
        assistant: impl Into<String>,
    ) -> Result<Self, EmptyTurnError> {
        let user = user.into();
        let assistant = assistant.into();
        if user.trim().is_empty() || assistant.trim().is_empty() {
            return Err(EmptyTurnError);
        }
        Ok(Self { user, assistant })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn assistant(&self) -> &str {
        &self.assistant
    }
}

/// Sliding window over the most recent turns, oldest first.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl ConversationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Pushes to the end, evicting from the front once over capacity.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
    }

    /// The most recent `count` turns in chronological order.
    pub fn context(&self, count: usize) -> Vec<Turn> {
        let skip = self.turns.len().saturating_sub(count);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
