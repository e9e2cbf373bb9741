use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
};

use super::{Transcriber, TranscriptionError};
use crate::config::{WhisperConfig, TRANSCRIPTION_SAMPLE_RATE};

/// Whisper expects 16kHz mono input and at least one second of it.
const WHISPER_SAMPLE_RATE: usize = TRANSCRIPTION_SAMPLE_RATE as usize;
const MAX_DOWNLOAD_ATTEMPTS: u32 = 3;
const CHUNK_READ_TIMEOUT: Duration = Duration::from_secs(30);

pub struct WhisperEngine {
    /// Shared with the decode task so a timed-out decode can finish on its own.
    state: Option<Arc<Mutex<WhisperState>>>,
    model_path: PathBuf,
    model_url: String,
    model_checksum: Option<String>,
    backend: String,
    n_thread: u32,
    sampling_strategy: String,
    download_timeout: Duration,
}

impl WhisperEngine {
    pub fn from_config(
        config: &WhisperConfig,
        download_timeout: Duration,
    ) -> Result<Self, TranscriptionError> {
        let model_path = match config.model_path {
            Some(ref path) => PathBuf::from(path),
            None => Self::find_model_path(&config.model_url)?,
        };

        Ok(Self {
            state: None,
            model_path,
            model_url: config.model_url.clone(),
            model_checksum: config.model_checksum.clone(),
            backend: config.backend.clone(),
            n_thread: config.n_thread,
            sampling_strategy: config.sampling_strategy.clone(),
            download_timeout,
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Loads the model, downloading it first if it is missing or fails its checksum.
    pub async fn load_model(&mut self) -> Result<(), TranscriptionError> {
        info!("Loading Whisper model from: {:?}", self.model_path);

        if !self.model_path.exists() {
            warn!(
                "Model file not found at {:?}, downloading from {}",
                self.model_path, self.model_url
            );
            self.download_model().await?;
        } else if let Some(ref expected) = self.model_checksum {
            let actual = compute_file_checksum(&self.model_path)?;
            if !actual.eq_ignore_ascii_case(expected) {
                error!(
                    "Model checksum mismatch! Expected: {}, Got: {}",
                    expected, actual
                );
                self.download_model().await?;
            } else {
                info!("Model checksum verification passed");
            }
        }

        let use_gpu = match self.backend.to_lowercase().as_str() {
            "gpu" | "cuda" => true,
            "cpu" => false,
            other => {
                warn!(
                    "Invalid backend value '{}', defaulting to CPU. Valid options: cpu, gpu, cuda",
                    other
                );
                false
            }
        };

        let path = self
            .model_path
            .to_str()
            .ok_or_else(|| TranscriptionError::Model("model path is not valid UTF-8".into()))?
            .to_string();

        let context = match Self::create_context(&path, use_gpu) {
            Ok(ctx) => ctx,
            Err(e) if use_gpu => {
                warn!("GPU initialization failed: {}. Falling back to CPU backend", e);
                Self::create_context(&path, false)?
            }
            Err(e) => return Err(e),
        };

        let state = context
            .create_state()
            .map_err(|e| TranscriptionError::Model(format!("failed to create state: {}", e)))?;

        self.state = Some(Arc::new(Mutex::new(state)));

        info!("Whisper model loaded successfully");
        Ok(())
    }

    fn create_context(path: &str, use_gpu: bool) -> Result<WhisperContext, TranscriptionError> {
        let mut params = WhisperContextParameters::default();
        params.use_gpu(use_gpu);
        WhisperContext::new_with_params(path, params)
            .map_err(|e| TranscriptionError::Model(e.to_string()))
    }

    fn parse_sampling_strategy(&self) -> SamplingStrategy {
        match self.sampling_strategy.to_lowercase().as_str() {
            "greedy" => SamplingStrategy::Greedy { best_of: 1 },
            "beam" => SamplingStrategy::BeamSearch {
                beam_size: 5,
                patience: 1.0,
            },
            _ => {
                warn!(
                    "Unknown sampling strategy '{}', defaulting to greedy",
                    self.sampling_strategy
                );
                SamplingStrategy::Greedy { best_of: 1 }
            }
        }
    }

    /// Looks for an already-downloaded model in the usual places, falling back
    /// to the per-user data directory as the download target.
    pub fn find_model_path(model_url: &str) -> Result<PathBuf, TranscriptionError> {
        let model_filename = model_url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                TranscriptionError::Model(format!("cannot extract filename from '{}'", model_url))
            })?;

        let candidates = [
            dirs::data_dir().map(|p| p.join("hisho").join(model_filename)),
            Some(PathBuf::from("/usr/share/whisper/").join(model_filename)),
            Some(PathBuf::from("./models/").join(model_filename)),
        ];

        for candidate in candidates.iter().flatten() {
            if candidate.exists() {
                info!("Found model at: {:?}", candidate);
                return Ok(candidate.clone());
            }
        }

        let default_path = dirs::data_dir()
            .ok_or_else(|| TranscriptionError::Model("could not determine data directory".into()))?
            .join("hisho")
            .join(model_filename);

        debug!("Model not found, will use default path: {:?}", default_path);
        Ok(default_path)
    }

    async fn download_model(&self) -> Result<(), TranscriptionError> {
        let model_dir = self
            .model_path
            .parent()
            .ok_or_else(|| TranscriptionError::Download("invalid model path".into()))?;
        tokio::fs::create_dir_all(model_dir).await?;

        let temp_path = self.model_path.with_extension("tmp");
        let mut last_error = None;

        for attempt in 1..=MAX_DOWNLOAD_ATTEMPTS {
            info!(
                "Downloading model (attempt {}/{}): {}",
                attempt, MAX_DOWNLOAD_ATTEMPTS, self.model_url
            );

            match self.stream_to_file(&temp_path).await {
                Ok(checksum) => {
                    if let Some(ref expected) = self.model_checksum {
                        if !checksum.eq_ignore_ascii_case(expected) {
                            error!(
                                "Checksum verification failed! Expected: {}, Got: {}",
                                expected, checksum
                            );
                            let _ = tokio::fs::remove_file(&temp_path).await;
                            last_error = Some(TranscriptionError::Download(format!(
                                "checksum mismatch: expected {}, got {}",
                                expected, checksum
                            )));
                            continue;
                        }
                    }

                    tokio::fs::rename(&temp_path, &self.model_path).await?;
                    info!("Model downloaded to: {:?}", self.model_path);
                    return Ok(());
                }
                Err(e) => {
                    error!("Download attempt {} failed: {}", attempt, e);
                    if temp_path.exists() {
                        let _ = tokio::fs::remove_file(&temp_path).await;
                    }
                    last_error = Some(e);

                    if attempt < MAX_DOWNLOAD_ATTEMPTS {
                        let delay = Duration::from_millis(1000 * 2_u64.pow(attempt));
                        info!("Waiting {:?} before retry", delay);
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TranscriptionError::Download(format!(
                "failed after {} attempts",
                MAX_DOWNLOAD_ATTEMPTS
            ))
        }))
    }

    /// Streams the model into `temp_path`, returning the SHA-256 of what was written.
    async fn stream_to_file(&self, temp_path: &Path) -> Result<String, TranscriptionError> {
        use futures_util::StreamExt;
        use tokio::io::AsyncWriteExt;

        let client = reqwest::Client::builder()
            .timeout(self.download_timeout)
            .connect_timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| TranscriptionError::Download(e.to_string()))?;

        let response = client
            .get(&self.model_url)
            .send()
            .await
            .map_err(|e| TranscriptionError::Download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TranscriptionError::Download(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let expected_size = response.content_length();
        let mut stream = response.bytes_stream();
        let mut hasher = Sha256::new();
        let mut file = tokio::fs::File::create(temp_path).await?;
        let mut downloaded = 0u64;
        let mut last_logged_percent = 0u64;

        loop {
            let chunk = match timeout(CHUNK_READ_TIMEOUT, stream.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(TranscriptionError::Download(e.to_string())),
                Ok(None) => break,
                Err(_) => {
                    return Err(TranscriptionError::Download(format!(
                        "server sent no data within {:?}",
                        CHUNK_READ_TIMEOUT
                    )))
                }
            };

            downloaded += chunk.len() as u64;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;

            if let Some(total) = expected_size.filter(|t| *t > 0) {
                let percent = downloaded * 100 / total;
                if percent >= last_logged_percent + 10 {
                    last_logged_percent = percent;
                    info!(
                        "Download progress: {}% ({}/{})",
                        percent,
                        pretty_bytes(downloaded),
                        pretty_bytes(total)
                    );
                }
            }
        }

        file.flush().await?;
        drop(file);

        if let Some(expected) = expected_size {
            if downloaded != expected {
                return Err(TranscriptionError::Download(format!(
                    "size mismatch: expected {}, got {}",
                    pretty_bytes(expected),
                    pretty_bytes(downloaded)
                )));
            }
        }

        Ok(hex::encode(hasher.finalize()))
    }
}

impl Transcriber for WhisperEngine {
    async fn transcribe(
        &mut self,
        audio: &[f32],
        language: &str,
    ) -> Result<String, TranscriptionError> {
        let strategy = self.parse_sampling_strategy();
        let n_thread = self.n_thread;
        let state = self
            .state
            .as_ref()
            .map(Arc::clone)
            .ok_or(TranscriptionError::ModelNotLoaded)?;

        let audio = pad_audio(audio, WHISPER_SAMPLE_RATE);
        let language = language.to_string();
        debug!(
            "Transcribing {} samples with language: {}",
            audio.len(),
            language
        );

        // Decoding runs on the blocking pool so the caller's deadline can fire.
        tokio::task::spawn_blocking(move || decode(&state, strategy, n_thread, &language, &audio))
            .await
            .map_err(|e| TranscriptionError::Failed(format!("decode task failed: {}", e)))?
    }
}

fn decode(
    state: &Mutex<WhisperState>,
    strategy: SamplingStrategy,
    n_thread: u32,
    language: &str,
    audio: &[f32],
) -> Result<String, TranscriptionError> {
    let mut state = match state.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::WouldBlock) => {
            return Err(TranscriptionError::Failed(
                "previous transcription is still running".to_string(),
            ))
        }
        Err(TryLockError::Poisoned(_)) => {
            return Err(TranscriptionError::Failed(
                "whisper state poisoned by an earlier panic".to_string(),
            ))
        }
    };

    let mut params = FullParams::new(strategy);
    params.set_n_threads(n_thread as i32);
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    params.set_language(Some(language));

    state
        .full(params, audio)
        .map_err(|e| TranscriptionError::Failed(e.to_string()))?;

    let mut transcription = String::new();
    for i in 0..state.full_n_segments() {
        if let Some(segment) = state.get_segment(i) {
            if let Ok(text) = segment.to_str() {
                transcription.push_str(text);
            }
        }
    }

    Ok(transcription.trim().to_string())
}

/// Appends silence so the recognizer always sees at least `min_samples`.
fn pad_audio(audio: &[f32], min_samples: usize) -> Vec<f32> {
    let mut padded = audio.to_vec();
    if padded.len() < min_samples {
        padded.resize(min_samples, 0.0);
    }
    padded
}

fn compute_file_checksum(file_path: &Path) -> Result<String, TranscriptionError> {
    use std::io::Read;

    let mut file = std::fs::File::open(file_path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

fn pretty_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
