use std::process::Stdio;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SpeechConfig;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Failed to start speech command '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("Speech command '{command}' exited with {status}")]
    Exit { command: String, status: String },
}

/// Text-to-speech collaborator. Failures are reported, never fatal.
#[allow(async_fn_in_trait)]
pub trait SpeechRenderer {
    async fn speak(&mut self, text: &str) -> Result<(), SpeechError>;
}

/// Speaks through an external command such as `espeak-ng` or `say`, with the
/// text as the final argument.
pub struct CommandSpeaker {
    command: String,
    args: Vec<String>,
    available: bool,
}

impl CommandSpeaker {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            available: true,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }
}

impl SpeechRenderer for CommandSpeaker {
    async fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        if !self.available || text.trim().is_empty() {
            return Ok(());
        }

        debug!("Speaking {} chars via '{}'", text.chars().count(), self.command);

        let status = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(SpeechError::Exit {
                command: self.command.clone(),
                status: status.to_string(),
            }),
            Err(source) => {
                if source.kind() == std::io::ErrorKind::NotFound {
                    warn!(
                        "Speech command '{}' not found, continuing with text-only output",
                        self.command
                    );
                    self.available = false;
                }
                Err(SpeechError::Spawn {
                    command: self.command.clone(),
                    source,
                })
            }
        }
    }
}

/// Renderer used when speech output is disabled.
pub struct TextOnly;

impl SpeechRenderer for TextOnly {
    async fn speak(&mut self, _text: &str) -> Result<(), SpeechError> {
        Ok(())
    }
}

pub enum Speaker {
    Command(CommandSpeaker),
    TextOnly(TextOnly),
}

impl Speaker {
    pub fn from_config(config: &SpeechConfig) -> Self {
        if config.enabled && !config.command.trim().is_empty() {
            Speaker::Command(CommandSpeaker::new(config.command.clone(), config.args.clone()))
        } else {
            tracing::info!("Speech output disabled, replies are text-only");
            Speaker::TextOnly(TextOnly)
        }
    }
}

impl SpeechRenderer for Speaker {
    async fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        match self {
            Speaker::Command(speaker) => speaker.speak(text).await,
            Speaker::TextOnly(speaker) => speaker.speak(text).await,
        }
    }
}
