use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Conversational gate of the assistant.
///
/// `Idle` ignores everything except a wake phrase; `Listening` forwards
/// every non-control utterance to the response backend.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Listening,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
        }
    }

    pub fn is_listening(&self) -> bool {
        matches!(self, SessionState::Listening)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown session state: '{0}' (expected 'idle' or 'listening')")]
pub struct UnknownStateError(pub String);

impl FromStr for SessionState {
    type Err = UnknownStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "idle" => Ok(SessionState::Idle),
            "listening" => Ok(SessionState::Listening),
            _ => Err(UnknownStateError(s.to_string())),
        }
    }
}
