pub mod engine;

pub use engine::WhisperEngine;

use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscriptionError {
    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Model error: {0}")]
    Model(String),

    #[error("Model download failed: {0}")]
    Download(String),

    #[error("Transcription failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Speech-to-text collaborator. Returns an empty string when nothing
/// intelligible was recognized.
#[allow(async_fn_in_trait)]
pub trait Transcriber {
    async fn transcribe(&mut self, audio: &[f32], language: &str)
        -> Result<String, TranscriptionError>;
}

fn annotation_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex::Regex::new(r"\[.*?\]|\{.*?\}|\(.*?\)|（.*?）|【.*?】|＜.*?＞")
            .expect("annotation pattern is a valid regex")
    })
}

/// Strips non-speech annotations (`[音楽]`, `(拍手)`, `（笑）`) and repeated words
/// from raw recognizer output.
pub fn post_process_transcription(text: &str) -> String {
    let stripped = annotation_pattern().replace_all(text.trim(), " ");

    let mut deduped_words: Vec<&str> = Vec::new();
    for word in stripped.split_whitespace() {
        if deduped_words.last() != Some(&word) {
            deduped_words.push(word);
        }
    }
    let cleaned = deduped_words.join(" ");

    tracing::debug!("Post-processed: '{}' -> '{}'", text.trim(), cleaned);

    cleaned
}
