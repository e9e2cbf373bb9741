use shared::{SessionState, StatusInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::audio::{AudioError, AudioInput, CaptureEnd, EndpointCapturer, Utterance};
use crate::backend::ResponseBackend;
use crate::config::Config;
use crate::output::SpeechRenderer;
use crate::session::{CommandDetector, ControlEvent, Session, Turn};
use crate::transcription::{post_process_transcription, Transcriber};

/// What a single capture → respond cycle ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Shorter than the minimum utterance duration; never transcribed.
    TooShort,
    /// Transcription was empty or failed.
    NoSpeech,
    Control(ControlEvent),
    Answered,
    /// Backend succeeded with an empty reply; nothing recorded or spoken.
    EmptyReply,
    /// Backend failed; the apology was spoken and history left untouched.
    BackendFailed,
    /// Non-control speech while idle.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub language: String,
    pub system_prompt: String,
    pub context_turns: usize,
    pub max_history: usize,
    pub min_utterance: Duration,
    pub max_utterance: Duration,
    pub acknowledgment: String,
    pub farewell: String,
    pub apology: String,
    pub transcription_timeout: Duration,
    pub backend_timeout: Duration,
    pub speech_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            language: config.whisper.language.clone(),
            system_prompt: config.backend.system_prompt.clone(),
            context_turns: config.session.context_turns,
            max_history: config.session.max_history,
            min_utterance: Duration::from_millis(config.endpoint.min_utterance_ms as u64),
            max_utterance: Duration::from_millis(config.endpoint.max_duration_ms as u64),
            acknowledgment: config.session.acknowledgment.clone(),
            farewell: config.session.farewell.clone(),
            apology: config.session.apology.clone(),
            transcription_timeout: Duration::from_secs(
                config.timeouts.transcription_timeout_seconds,
            ),
            backend_timeout: Duration::from_secs(config.timeouts.backend_timeout_seconds),
            speech_timeout: Duration::from_secs(config.timeouts.speech_timeout_seconds),
        }
    }
}

/// Runs the sequential capture → transcribe → route → render loop. One
/// utterance is fully handled before the next capture starts.
pub struct Orchestrator<I, T, B, S> {
    capturer: Arc<EndpointCapturer<I>>,
    transcriber: T,
    backend: B,
    speaker: S,
    detector: CommandDetector,
    session: Session,
    settings: OrchestratorSettings,
    interrupt: Arc<AtomicBool>,
    status_tx: Option<watch::Sender<StatusInfo>>,
}

impl<I, T, B, S> Orchestrator<I, T, B, S>
where
    I: AudioInput + Send + Sync + 'static,
    T: Transcriber,
    B: ResponseBackend,
    S: SpeechRenderer,
{
    pub fn new(
        capturer: EndpointCapturer<I>,
        transcriber: T,
        backend: B,
        speaker: S,
        detector: CommandDetector,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            capturer: Arc::new(capturer),
            transcriber,
            backend,
            speaker,
            detector,
            session: Session::new(settings.max_history),
            settings,
            interrupt: Arc::new(AtomicBool::new(false)),
            status_tx: None,
        }
    }

    /// Shares the stop flag that is checked at every cycle boundary. The same
    /// flag should be given to the capturer so an in-progress capture ends early.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_status_channel(mut self, status_tx: watch::Sender<StatusInfo>) -> Self {
        self.status_tx = Some(status_tx);
        self.publish_status();
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn status(&self) -> StatusInfo {
        StatusInfo {
            is_running: !self.interrupt.load(Ordering::SeqCst),
            state: self.session.state(),
            history_len: self.session.history().len(),
            language: self.settings.language.clone(),
        }
    }

    fn publish_status(&self) {
        if let Some(ref tx) = self.status_tx {
            tx.send_replace(self.status());
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Loops until interrupted. Only audio device failures end the loop with an error.
    pub async fn run(&mut self) -> Result<(), AudioError> {
        info!(
            "Listening for wake phrase (state: {})",
            self.session.state()
        );

        while !self.interrupted() {
            let utterance = self.capture().await?;

            if utterance.end() == CaptureEnd::Interrupted {
                break;
            }

            let outcome = self.process(utterance).await;
            debug!("Cycle finished: {:?}", outcome);
            self.publish_status();
        }

        info!("Conversation loop stopped");
        self.publish_status();
        Ok(())
    }

    async fn capture(&self) -> Result<Utterance, AudioError> {
        let capturer = Arc::clone(&self.capturer);
        let max_duration = self.settings.max_utterance;

        tokio::task::spawn_blocking(move || capturer.capture(max_duration))
            .await
            .map_err(|e| AudioError::Device(format!("capture task failed: {}", e)))?
    }

    /// Handles one captured utterance end to end.
    pub async fn process(&mut self, utterance: Utterance) -> CycleOutcome {
        if utterance.duration() < self.settings.min_utterance {
            debug!(
                "Discarding {} ms utterance (minimum {} ms)",
                utterance.duration().as_millis(),
                self.settings.min_utterance.as_millis()
            );
            return CycleOutcome::TooShort;
        }

        let text = self.transcribe(&utterance).await;
        if text.is_empty() {
            return CycleOutcome::NoSpeech;
        }

        info!("User: {}", text);

        let detection = self.detector.detect(self.session.state(), &text);
        if let Some(event) = detection.event {
            self.session.transition(detection.state);
            self.publish_status();

            let reply = match event {
                ControlEvent::SessionStarted => self.settings.acknowledgment.clone(),
                ControlEvent::SessionEnded => self.settings.farewell.clone(),
            };
            self.render(&reply).await;
            return CycleOutcome::Control(event);
        }

        match self.session.state() {
            SessionState::Listening => self.respond(text).await,
            SessionState::Idle => {
                debug!("Ignoring speech outside an active session");
                CycleOutcome::Ignored
            }
        }
    }

    async fn transcribe(&mut self, utterance: &Utterance) -> String {
        let deadline = self.settings.transcription_timeout;
        let result = timeout(
            deadline,
            self.transcriber
                .transcribe(utterance.samples(), &self.settings.language),
        )
        .await;

        match result {
            Ok(Ok(raw)) => post_process_transcription(&raw),
            Ok(Err(e)) => {
                warn!("Transcription error: {}", e);
                String::new()
            }
            Err(_) => {
                warn!("Transcription timed out after {:?}", deadline);
                String::new()
            }
        }
    }

    async fn respond(&mut self, text: String) -> CycleOutcome {
        let context = self
            .session
            .history()
            .context(self.settings.context_turns);
        let deadline = self.settings.backend_timeout;

        let result = timeout(
            deadline,
            self.backend
                .respond(&self.settings.system_prompt, &context, &text),
        )
        .await;

        let reply = match result {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                error!("Response backend error: {}", e);
                let apology = self.settings.apology.clone();
                self.render(&apology).await;
                return CycleOutcome::BackendFailed;
            }
            Err(_) => {
                error!("Response backend timed out after {:?}", deadline);
                let apology = self.settings.apology.clone();
                self.render(&apology).await;
                return CycleOutcome::BackendFailed;
            }
        };

        match Turn::new(text, reply.clone()) {
            Ok(turn) => {
                self.session.commit(turn);
                self.render(&reply).await;
                CycleOutcome::Answered
            }
            Err(_) => {
                warn!("Response backend returned an empty reply");
                CycleOutcome::EmptyReply
            }
        }
    }

    /// Echoes the reply to the log and speaks it; speech failures never abort the cycle.
    async fn render(&mut self, text: &str) {
        info!("Assistant: {}", text);

        let deadline = self.settings.speech_timeout;
        match timeout(deadline, self.speaker.speak(text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Speech output failed: {}", e),
            Err(_) => warn!("Speech output timed out after {:?}", deadline),
        }
    }
}
