pub mod audio;
pub mod backend;
pub mod config;
pub mod orchestrator;
pub mod output;
pub mod server;
pub mod session;
pub mod transcription;

pub use audio::{CpalInput, EndpointCapturer, Utterance};
pub use backend::{GeminiClient, ResponseBackend};
pub use config::{load_config, Config, ConfigError};
pub use orchestrator::{CycleOutcome, Orchestrator, OrchestratorSettings};
pub use output::{Speaker, SpeechRenderer};
pub use server::StatusServer;
pub use session::{CommandDetector, ConversationHistory, Session, Turn};
pub use transcription::{Transcriber, WhisperEngine};
