pub mod detector;
pub mod history;

pub use detector::{CommandDetector, ControlEvent, Detection};
pub use history::{ConversationHistory, EmptyTurnError, Turn};

use shared::SessionState;

/// Conversational state plus the history it owns. History is only ever
/// non-empty while listening and is cleared on every transition.
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    history: ConversationHistory,
}

impl Session {
    pub fn new(max_history: usize) -> Self {
        Self {
            state: SessionState::Idle,
            history: ConversationHistory::new(max_history),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn transition(&mut self, next: SessionState) {
        if next != self.state {
            tracing::info!("Session state: {} → {}", self.state, next);
            self.history.clear();
            self.state = next;
        }
    }

    /// Commits a finished turn. Turns are dropped when no session is active.
    pub fn commit(&mut self, turn: Turn) -> bool {
        if !self.state.is_listening() {
            tracing::warn!("Dropping turn committed while idle");
            return false;
        }
        self.history.append(turn);
        true
    }
}
