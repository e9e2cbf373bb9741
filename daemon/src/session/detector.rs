use shared::SessionState;

/// Control events produced by a recognized keyword phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    SessionStarted,
    SessionEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub state: SessionState,
    pub event: Option<ControlEvent>,
}

impl Detection {
    pub fn matched(&self) -> bool {
        self.event.is_some()
    }
}

/// Substring matcher over explicit wake and stop phrase spellings.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    wake_phrases: Vec<String>,
    stop_phrases: Vec<String>,
}

impl CommandDetector {
    pub fn new(wake_phrases: Vec<String>, stop_phrases: Vec<String>) -> Self {
        Self {
            wake_phrases,
            stop_phrases,
        }
    }

    pub fn contains_wake_phrase(&self, text: &str) -> bool {
        self.wake_phrases.iter().any(|p| text.contains(p.as_str()))
    }

    pub fn contains_stop_phrase(&self, text: &str) -> bool {
        self.stop_phrases.iter().any(|p| text.contains(p.as_str()))
    }

    /// A wake phrase only counts while idle and a stop phrase only while
    /// listening; anything else leaves the state alone and is not a match.
    ///
    /// Only the phrase valid for the current state is looked for, so an
    /// utterance carrying both phrases while listening ends the session
    /// instead of being answered as content.
    pub fn detect(&self, state: SessionState, text: &str) -> Detection {
        let event = match state {
            SessionState::Idle if self.contains_wake_phrase(text) => {
                Some(ControlEvent::SessionStarted)
            }
            SessionState::Listening if self.contains_stop_phrase(text) => {
                Some(ControlEvent::SessionEnded)
            }
            _ => None,
        };

        let state = match event {
            Some(ControlEvent::SessionStarted) => SessionState::Listening,
            Some(ControlEvent::SessionEnded) => SessionState::Idle,
            None => state,
        };

        Detection { state, event }
    }
}
