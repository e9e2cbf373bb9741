pub mod gemini;

pub use gemini::GeminiClient;

use thiserror::Error;

use crate::session::Turn;

pub const USER_LABEL: &str = "ユーザー";
pub const ASSISTANT_LABEL: &str = "AI秘書";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Prompt blocked by backend: {0}")]
    Blocked(String),

    #[error("Backend reply contained no text (finish reason: {0})")]
    NoText(String),
}

/// Generative response collaborator. An empty `Ok` string is a valid (if
/// useless) reply and is distinct from a failed call.
#[allow(async_fn_in_trait)]
pub trait ResponseBackend {
    async fn respond(
        &self,
        system_prompt: &str,
        history: &[Turn],
        user_text: &str,
    ) -> Result<String, BackendError>;
}

/// Lays out the single-text prompt: instruction, prior turns, then the new
/// utterance, separated by blank lines.
pub fn build_prompt(system_prompt: &str, history: &[Turn], user_text: &str) -> String {
    let mut blocks: Vec<String> = Vec::with_capacity(history.len() * 2 + 2);
    blocks.push(system_prompt.to_string());

    for turn in history {
        blocks.push(format!("{}: {}", USER_LABEL, turn.user()));
        blocks.push(format!("{}: {}", ASSISTANT_LABEL, turn.assistant()));
    }

    blocks.push(format!("{}: {}", USER_LABEL, user_text));
    blocks.join("\n\n")
}
