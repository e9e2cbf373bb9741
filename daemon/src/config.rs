use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Backend credential missing: set the {0} environment variable")]
    MissingCredential(String),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub whisper: WhisperConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub ipc: IpcConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AudioConfig {
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            chunk_size: default_chunk_size(),
            channels: default_channels(),
        }
    }
}

fn default_device() -> String {
    "default".to_string()
}
fn default_sample_rate() -> u32 {
    16000
}
fn default_chunk_size() -> u32 {
    1024
}
fn default_channels() -> u16 {
    1
}

/// Silence-based endpointing of a single utterance.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EndpointConfig {
    /// Mean absolute amplitude (i16 scale) below which a frame counts as silent.
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,
    #[serde(default = "default_silence_duration")]
    pub silence_duration_ms: u32,
    #[serde(default = "default_max_duration")]
    pub max_duration_ms: u32,
    #[serde(default = "default_min_utterance")]
    pub min_utterance_ms: u32,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            silence_threshold: default_silence_threshold(),
            silence_duration_ms: default_silence_duration(),
            max_duration_ms: default_max_duration(),
            min_utterance_ms: default_min_utterance(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

fn default_silence_threshold() -> f32 {
    500.0
}
fn default_silence_duration() -> u32 {
    2000
}
fn default_max_duration() -> u32 {
    5000
}
fn default_min_utterance() -> u32 {
    500
}
fn default_read_timeout() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WhisperConfig {
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default = "default_model_url")]
    pub model_url: String,
    #[serde(default)]
    pub model_checksum: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_n_thread")]
    pub n_thread: u32,
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_sampling_strategy")]
    pub sampling_strategy: String,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            model_url: default_model_url(),
            model_checksum: None,
            language: default_language(),
            n_thread: default_n_thread(),
            backend: default_backend(),
            sampling_strategy: default_sampling_strategy(),
        }
    }
}

fn default_model_url() -> String {
    "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.bin".to_string()
}
fn default_language() -> String {
    "ja".to_string()
}
fn default_n_thread() -> u32 {
    4
}
fn default_backend() -> String {
    "cpu".to_string()
}
fn default_sampling_strategy() -> String {
    "greedy".to_string()
}

/// Generative response backend (Gemini `generateContent`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default = "default_backend_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: default_backend_model(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_backend_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_system_prompt() -> String {
    "あなたは個人用のAI秘書です。\n\
     Zoom会議に同席し、ユーザーから『秘書さん聞いて』と呼ばれた時のみ応答してください。\n\
     回答は簡潔かつ要点のみ述べてください。\n\
     日本語で応答してください。"
        .to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,
    #[serde(default = "default_wake_phrases")]
    pub wake_phrases: Vec<String>,
    #[serde(default = "default_stop_phrases")]
    pub stop_phrases: Vec<String>,
    #[serde(default = "default_acknowledgment")]
    pub acknowledgment: String,
    #[serde(default = "default_farewell")]
    pub farewell: String,
    #[serde(default = "default_apology")]
    pub apology: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            context_turns: default_context_turns(),
            wake_phrases: default_wake_phrases(),
            stop_phrases: default_stop_phrases(),
            acknowledgment: default_acknowledgment(),
            farewell: default_farewell(),
            apology: default_apology(),
        }
    }
}

fn default_max_history() -> usize {
    10
}
fn default_context_turns() -> usize {
    10
}
fn default_wake_phrases() -> Vec<String> {
    vec!["秘書さん聞いて".to_string(), "秘書さんきいて".to_string()]
}
fn default_stop_phrases() -> Vec<String> {
    vec![
        "秘書さんありがとう".to_string(),
        "秘書さんありがと".to_string(),
    ]
}
fn default_acknowledgment() -> String {
    "はい、聞いています。".to_string()
}
fn default_farewell() -> String {
    "了解しました。また呼んでください。".to_string()
}
fn default_apology() -> String {
    "すみません、エラーが発生しました。".to_string()
}

/// External text-to-speech command. The text is appended as the final argument.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_enabled")]
    pub enabled: bool,
    #[serde(default = "default_speech_command")]
    pub command: String,
    #[serde(default = "default_speech_args")]
    pub args: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: default_speech_enabled(),
            command: default_speech_command(),
            args: default_speech_args(),
        }
    }
}

fn default_speech_enabled() -> bool {
    true
}
fn default_speech_command() -> String {
    "espeak-ng".to_string()
}
fn default_speech_args() -> Vec<String> {
    vec![
        "-v".to_string(),
        "ja".to_string(),
        "-s".to_string(),
        "150".to_string(),
    ]
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct IpcConfig {
    #[serde(default)]
    pub socket_path: Option<String>,
}

impl IpcConfig {
    /// Uses the XDG runtime directory if available, falls back to /tmp/hishod.sock
    pub fn resolve_socket_path(&self) -> PathBuf {
        if let Some(ref path) = self.socket_path {
            return PathBuf::from(path);
        }
        dirs::runtime_dir()
            .map(|dir| dir.join("hishod.sock"))
            .unwrap_or_else(|| PathBuf::from("/tmp/hishod.sock"))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TimeoutsConfig {
    #[serde(default = "default_transcription_timeout")]
    pub transcription_timeout_seconds: u64,
    #[serde(default = "default_backend_timeout")]
    pub backend_timeout_seconds: u64,
    #[serde(default = "default_speech_timeout")]
    pub speech_timeout_seconds: u64,
    #[serde(default = "default_socket_operation_timeout")]
    pub socket_operation_timeout_seconds: u64,
    #[serde(default = "default_model_download_timeout")]
    pub model_download_timeout_seconds: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            transcription_timeout_seconds: default_transcription_timeout(),
            backend_timeout_seconds: default_backend_timeout(),
            speech_timeout_seconds: default_speech_timeout(),
            socket_operation_timeout_seconds: default_socket_operation_timeout(),
            model_download_timeout_seconds: default_model_download_timeout(),
        }
    }
}

fn default_transcription_timeout() -> u64 {
    30
}
fn default_backend_timeout() -> u64 {
    30
}
fn default_speech_timeout() -> u64 {
    60
}
fn default_socket_operation_timeout() -> u64 {
    5
}
fn default_model_download_timeout() -> u64 {
    300
}

/// Whisper decodes 16 kHz mono; audio is captured at this rate and never resampled.
pub const TRANSCRIPTION_SAMPLE_RATE: u32 = 16000;

impl Config {
    /// Checks the values the capture and session code divides by or indexes with.
    /// `context_turns` is clamped to `max_history` rather than rejected.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.audio.sample_rate != TRANSCRIPTION_SAMPLE_RATE {
            return Err(ConfigError::Invalid(format!(
                "audio.sample_rate must be {} (got {}); capture at the recognizer's rate",
                TRANSCRIPTION_SAMPLE_RATE, self.audio.sample_rate
            )));
        }
        if self.audio.chunk_size == 0 {
            return Err(ConfigError::Invalid("audio.chunk_size must be non-zero".into()));
        }
        if self.audio.channels == 0 {
            return Err(ConfigError::Invalid("audio.channels must be non-zero".into()));
        }
        if self.endpoint.max_duration_ms == 0 {
            return Err(ConfigError::Invalid(
                "endpoint.max_duration_ms must be non-zero".into(),
            ));
        }
        if self.endpoint.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "endpoint.read_timeout_ms must be non-zero".into(),
            ));
        }
        if self.session.max_history == 0 {
            return Err(ConfigError::Invalid("session.max_history must be non-zero".into()));
        }
        check_phrases("session.wake_phrases", &self.session.wake_phrases)?;
        check_phrases("session.stop_phrases", &self.session.stop_phrases)?;

        if self.session.context_turns > self.session.max_history {
            tracing::warn!(
                "session.context_turns ({}) exceeds session.max_history ({}), clamping",
                self.session.context_turns,
                self.session.max_history
            );
            self.session.context_turns = self.session.max_history;
        }

        Ok(self)
    }

    /// Reads the backend credential from the environment variable named in the config.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        match std::env::var(&self.backend.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ConfigError::MissingCredential(
                self.backend.api_key_env.clone(),
            )),
        }
    }
}

fn check_phrases(field: &str, phrases: &[String]) -> Result<(), ConfigError> {
    if phrases.is_empty() {
        return Err(ConfigError::Invalid(format!("{} must not be empty", field)));
    }
    if phrases.iter().any(|p| p.trim().is_empty()) {
        return Err(ConfigError::Invalid(format!(
            "{} must not contain empty phrases",
            field
        )));
    }
    Ok(())
}

pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => match get_config_path() {
            Some(p) => p,
            None => {
                tracing::info!("No config directory available, using defaults");
                return Config::default().validate();
            }
        },
    };

    if !config_path.exists() {
        tracing::info!("Config file not found at {:?}, using defaults", config_path);
        return Config::default().validate();
    }

    tracing::info!("Loading config from {:?}", config_path);
    let config_str = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
        path: config_path.clone(),
        source,
    })?;

    let config: Config = toml::from_str(&config_str)?;

    tracing::info!("Config loaded successfully");
    config.validate()
}

fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hisho").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.audio.device, "default");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.chunk_size, 1024);
        assert_eq!(config.audio.channels, 1);

        assert_eq!(config.endpoint.silence_threshold, 500.0);
        assert_eq!(config.endpoint.silence_duration_ms, 2000);
        assert_eq!(config.endpoint.max_duration_ms, 5000);
        assert_eq!(config.endpoint.min_utterance_ms, 500);
        assert_eq!(config.endpoint.read_timeout_ms, 2000);

        assert_eq!(config.whisper.language, "ja");
        assert_eq!(config.whisper.backend, "cpu");
        assert_eq!(config.whisper.sampling_strategy, "greedy");
        assert!(config.whisper.model_path.is_none());
        assert!(config.whisper.model_checksum.is_none());

        assert_eq!(config.backend.model, "gemini-2.5-flash");
        assert_eq!(config.backend.api_key_env, "GEMINI_API_KEY");
        assert!(config.backend.system_prompt.contains("AI秘書"));

        assert_eq!(config.session.max_history, 10);
        assert_eq!(config.session.context_turns, 10);
        assert!(config
            .session
            .wake_phrases
            .contains(&"秘書さん聞いて".to_string()));
        assert!(config
            .session
            .stop_phrases
            .contains(&"秘書さんありがとう".to_string()));

        assert!(config.speech.enabled);
        assert_eq!(config.speech.command, "espeak-ng");

        assert_eq!(config.timeouts.transcription_timeout_seconds, 30);
        assert_eq!(config.timeouts.backend_timeout_seconds, 30);
        assert_eq!(config.timeouts.speech_timeout_seconds, 60);
    }

    #[test]
    fn test_config_toml_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();

        assert!(toml_str.contains("[audio]"));
        assert!(toml_str.contains("[endpoint]"));
        assert!(toml_str.contains("[whisper]"));
        assert!(toml_str.contains("[backend]"));
        assert!(toml_str.contains("[session]"));
        assert!(toml_str.contains("[speech]"));
        assert!(toml_str.contains("[timeouts]"));
    }

    #[test]
    fn test_config_with_custom_values() {
        let toml_str = r#"
            [audio]
            device = "CABLE Output"
            sample_rate = 48000
            chunk_size = 512

            [endpoint]
            silence_threshold = 300.0
            silence_duration_ms = 1500

            [session]
            max_history = 4
            context_turns = 2
            wake_phrases = ["ねえ秘書"]

            [speech]
            enabled = false
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(config.audio.device, "CABLE Output");
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.chunk_size, 512);
        assert_eq!(config.endpoint.silence_threshold, 300.0);
        assert_eq!(config.endpoint.silence_duration_ms, 1500);
        assert_eq!(config.endpoint.max_duration_ms, 5000);
        assert_eq!(config.session.max_history, 4);
        assert_eq!(config.session.context_turns, 2);
        assert_eq!(config.session.wake_phrases, vec!["ねえ秘書".to_string()]);
        assert_eq!(config.session.stop_phrases, default_stop_phrases());
        assert!(!config.speech.enabled);
    }

    #[test]
    fn test_config_with_missing_fields_uses_defaults() {
        let toml_str = r#"
            [audio]
            device = "partial"

            [endpoint]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(config.audio.device, "partial");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.endpoint, EndpointConfig::default());
        assert_eq!(config.timeouts, TimeoutsConfig::default());
    }

    #[test]
    fn test_config_with_invalid_toml() {
        let toml_str = "invalid toml content [unclosed";
        let result: Result<Config, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_with_invalid_types() {
        let toml_str = r#"
            [audio]
            sample_rate = "not_a_number"
        "#;
        let result: Result<Config, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut config = Config::default();
        config.audio.chunk_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_non_whisper_sample_rate() {
        let mut config = Config::default();
        config.audio.sample_rate = 48000;
        match config.validate() {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("48000")),
            other => panic!("unexpected: {:?}", other),
        }

        let mut config = Config::default();
        config.audio.sample_rate = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_read_timeout() {
        let mut config = Config::default();
        config.endpoint.read_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_config_rejects_cable_at_48k() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[audio]\ndevice = \"CABLE Output\"\nsample_rate = 48000").unwrap();
        assert!(matches!(
            load_config(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_history() {
        let mut config = Config::default();
        config.session.max_history = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_empty_phrase_lists() {
        let mut config = Config::default();
        config.session.wake_phrases.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.session.stop_phrases = vec!["  ".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_clamps_context_turns() {
        let mut config = Config::default();
        config.session.max_history = 3;
        config.session.context_turns = 8;
        let config = config.validate().unwrap();
        assert_eq!(config.session.context_turns, 3);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [whisper]
            language = "en"

            [session]
            max_history = 5
            "#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.whisper.language, "en");
        assert_eq!(config.session.max_history, 5);
        assert_eq!(config.session.context_turns, 5);
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[endpoint]\nmax_duration_ms = 0").unwrap();
        assert!(matches!(
            load_config(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_resolve_socket_path_override() {
        let ipc = IpcConfig {
            socket_path: Some("/tmp/custom-hishod.sock".to_string()),
        };
        assert_eq!(
            ipc.resolve_socket_path(),
            PathBuf::from("/tmp/custom-hishod.sock")
        );
    }

    #[test]
    fn test_resolve_socket_path_default() {
        let path = IpcConfig::default().resolve_socket_path();
        assert!(path.ends_with("hishod.sock"));
    }

    #[test]
    #[serial]
    fn test_api_key_from_environment() {
        let mut config = Config::default();
        config.backend.api_key_env = "HISHO_TEST_API_KEY".to_string();

        std::env::set_var("HISHO_TEST_API_KEY", "secret");
        assert_eq!(config.api_key().unwrap(), "secret");

        std::env::set_var("HISHO_TEST_API_KEY", "   ");
        assert!(matches!(
            config.api_key(),
            Err(ConfigError::MissingCredential(_))
        ));

        std::env::remove_var("HISHO_TEST_API_KEY");
        let err = config.api_key().unwrap_err();
        assert!(err.to_string().contains("HISHO_TEST_API_KEY"));
    }
}
