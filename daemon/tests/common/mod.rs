// Common test helpers for hishod daemon tests
//
// This module provides utilities for:
// - User interaction and confirmation (hardware tests)
// - Scripted stand-ins for the microphone, Whisper, Gemini and speech output
#![allow(dead_code)]

use hishod::audio::{AudioError, AudioInput, FrameSource};
use hishod::backend::{BackendError, ResponseBackend};
use hishod::output::{SpeechError, SpeechRenderer};
use hishod::session::Turn;
use hishod::transcription::{TranscriptionError, Transcriber};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ask user to confirm an action
pub fn confirm_action(prompt: &str) -> bool {
    print!(
        "\n[CONFIRM] {}\nPress 'y' to confirm, any other key to skip: ",
        prompt
    );
    io::stdout().flush().unwrap();

    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();

    input.trim().to_lowercase() == "y"
}

/// Print a section header
pub fn print_header(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("  {}", title);
    println!("{}", "=".repeat(60));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("\n✓ {}", message);
}

/// Print an error message
pub fn print_error(message: &str) {
    println!("\n✗ {}", message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("\nℹ {}", message);
}

pub fn loud_frame(chunk: usize) -> Vec<i16> {
    vec![2000; chunk]
}

pub fn quiet_frame(chunk: usize) -> Vec<i16> {
    vec![0; chunk]
}

/// Microphone stand-in fed from a frame queue. Once the queue runs dry it
/// raises the interrupt flag, so a `run()` loop ends after the scripted audio.
#[derive(Clone)]
pub struct QueuedInput {
    frames: Arc<Mutex<VecDeque<Vec<i16>>>>,
    interrupt: Arc<AtomicBool>,
}

impl QueuedInput {
    pub fn new(interrupt: Arc<AtomicBool>) -> Self {
        Self {
            frames: Arc::new(Mutex::new(VecDeque::new())),
            interrupt,
        }
    }

    /// Queues one utterance: `loud` voiced frames then `silent` quiet frames.
    pub fn push_utterance(&self, chunk: usize, loud: usize, silent: usize) {
        let mut frames = self.frames.lock().unwrap();
        frames.extend((0..loud).map(|_| loud_frame(chunk)));
        frames.extend((0..silent).map(|_| quiet_frame(chunk)));
    }

    pub fn remaining(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

pub struct QueuedStream {
    frames: Arc<Mutex<VecDeque<Vec<i16>>>>,
    interrupt: Arc<AtomicBool>,
}

impl AudioInput for QueuedInput {
    type Stream = QueuedStream;

    fn open(&self) -> Result<QueuedStream, AudioError> {
        Ok(QueuedStream {
            frames: Arc::clone(&self.frames),
            interrupt: Arc::clone(&self.interrupt),
        })
    }
}

impl FrameSource for QueuedStream {
    fn read_frame(&mut self, frame: &mut [i16]) -> Result<(), AudioError> {
        match self.frames.lock().unwrap().pop_front() {
            Some(data) => frame.copy_from_slice(&data),
            None => {
                self.interrupt.store(true, Ordering::SeqCst);
                frame.fill(0);
            }
        }
        Ok(())
    }
}

/// Input whose device disappears on open.
pub struct UnpluggedInput;

pub struct NeverStream;

impl AudioInput for UnpluggedInput {
    type Stream = NeverStream;

    fn open(&self) -> Result<NeverStream, AudioError> {
        Err(AudioError::NoDevice("CABLE Output".to_string()))
    }
}

impl FrameSource for NeverStream {
    fn read_frame(&mut self, _frame: &mut [i16]) -> Result<(), AudioError> {
        Err(AudioError::StreamClosed)
    }
}

/// Returns scripted transcripts in order; an exhausted script yields "".
pub struct ScriptedTranscriber {
    script: VecDeque<Result<String, TranscriptionError>>,
    calls: Arc<Mutex<Vec<usize>>>,
}

impl ScriptedTranscriber {
    pub fn new(texts: &[&str]) -> Self {
        Self::from_results(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    pub fn from_results(script: Vec<Result<String, TranscriptionError>>) -> Self {
        Self {
            script: script.into(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sample counts of every audio buffer handed to `transcribe`.
    pub fn calls(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.calls)
    }
}

impl Transcriber for ScriptedTranscriber {
    async fn transcribe(
        &mut self,
        audio: &[f32],
        _language: &str,
    ) -> Result<String, TranscriptionError> {
        self.calls.lock().unwrap().push(audio.len());
        self.script.pop_front().unwrap_or_else(|| Ok(String::new()))
    }
}

/// Decodes on the blocking pool the way the Whisper engine does, taking
/// `delay` of wall time per call before returning `text`.
pub struct BlockingTranscriber {
    delay: Duration,
    text: String,
}

impl BlockingTranscriber {
    pub fn new(delay: Duration, text: &str) -> Self {
        Self {
            delay,
            text: text.to_string(),
        }
    }
}

impl Transcriber for BlockingTranscriber {
    async fn transcribe(
        &mut self,
        _audio: &[f32],
        _language: &str,
    ) -> Result<String, TranscriptionError> {
        let delay = self.delay;
        let text = self.text.clone();
        tokio::task::spawn_blocking(move || {
            std::thread::sleep(delay);
            Ok(text)
        })
        .await
        .map_err(|e| TranscriptionError::Failed(e.to_string()))?
    }
}

#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub system_prompt: String,
    pub history: Vec<Turn>,
    pub user_text: String,
}

/// Replays scripted replies and records every request it receives.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    requests: Arc<Mutex<Vec<BackendRequest>>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<String, BackendError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answers every request with a numbered reply.
    pub fn echoing(count: usize) -> Self {
        Self::new((1..=count).map(|i| Ok(format!("回答{}", i))).collect())
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<BackendRequest>>> {
        Arc::clone(&self.requests)
    }
}

pub fn backend_failure() -> BackendError {
    BackendError::Status {
        status: 503,
        body: "unavailable".to_string(),
    }
}

impl ResponseBackend for ScriptedBackend {
    async fn respond(
        &self,
        system_prompt: &str,
        history: &[Turn],
        user_text: &str,
    ) -> Result<String, BackendError> {
        self.requests.lock().unwrap().push(BackendRequest {
            system_prompt: system_prompt.to_string(),
            history: history.to_vec(),
            user_text: user_text.to_string(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(backend_failure()))
    }
}

/// Collects everything that would have been spoken.
#[derive(Clone, Default)]
pub struct RecordingSpeaker {
    spoken: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl SpeechRenderer for RecordingSpeaker {
    async fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        self.spoken.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(SpeechError::Exit {
                command: "espeak-ng".to_string(),
                status: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }
}
