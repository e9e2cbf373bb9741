use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::{AudioConfig, EndpointConfig};

/// Full-scale magnitude used to normalize i16 samples into [-1, 1].
const FULL_SCALE: f32 = 32768.0;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No input device found: {0}")]
    NoDevice(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("No suitable audio configuration found for {sample_rate}Hz, {channels} channel(s)")]
    UnsupportedConfig { sample_rate: u32, channels: u16 },

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio stream closed unexpectedly")]
    StreamClosed,

    #[error("No audio received from input device within {0:?}")]
    Timeout(Duration),
}

/// A source of audio input streams. Each call to `open` hands out one stream
/// lease; dropping the returned stream releases the device.
pub trait AudioInput {
    type Stream: FrameSource;

    fn open(&self) -> Result<Self::Stream, AudioError>;
}

/// An open input stream delivering mono i16 samples.
pub trait FrameSource {
    /// Blocks until `frame` is completely filled.
    fn read_frame(&mut self, frame: &mut [i16]) -> Result<(), AudioError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    Silence,
    MaxDuration,
    Interrupted,
}

/// One captured span of audio, normalized to [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    samples: Vec<f32>,
    sample_rate: u32,
    end: CaptureEnd,
}

impl Utterance {
    pub fn new(samples: Vec<f32>, sample_rate: u32, end: CaptureEnd) -> Self {
        Self {
            samples,
            sample_rate,
            end,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn end(&self) -> CaptureEnd {
        self.end
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.samples.len() as u128 * 1_000_000_000 / self.sample_rate as u128;
        Duration::from_nanos(nanos as u64)
    }
}

/// Mean absolute amplitude of a frame on the i16 scale.
pub fn mean_abs_amplitude(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: u64 = frame.iter().map(|s| s.unsigned_abs() as u64).sum();
    sum as f32 / frame.len() as f32
}

pub fn normalize(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / FULL_SCALE).collect()
}

/// Captures one utterance per call, ending it once the silent run exceeds
/// the configured silence duration or the maximum duration is reached.
pub struct EndpointCapturer<I> {
    input: I,
    sample_rate: u32,
    chunk_size: usize,
    silence_threshold: f32,
    silence_duration: Duration,
    interrupt: Arc<AtomicBool>,
}

impl<I: AudioInput> EndpointCapturer<I> {
    pub fn new(input: I, audio: &AudioConfig, endpoint: &EndpointConfig) -> Self {
        tracing::info!(
            "EndpointCapturer initialized: {}Hz, chunk={}, silence_threshold={:.1}, silence_duration_ms={}",
            audio.sample_rate,
            audio.chunk_size,
            endpoint.silence_threshold,
            endpoint.silence_duration_ms
        );

        Self {
            input,
            sample_rate: audio.sample_rate,
            chunk_size: audio.chunk_size as usize,
            silence_threshold: endpoint.silence_threshold,
            silence_duration: Duration::from_millis(endpoint.silence_duration_ms as u64),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares a flag that, once set, ends the current capture at the next frame.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of consecutive silent frames tolerated before the utterance ends.
    pub fn max_silent_frames(&self) -> usize {
        self.frames_for(self.silence_duration)
    }

    fn frames_for(&self, duration: Duration) -> usize {
        let samples = duration.as_millis() * self.sample_rate as u128 / 1000;
        (samples / self.chunk_size as u128) as usize
    }

    pub fn capture(&self, max_duration: Duration) -> Result<Utterance, AudioError> {
        let max_frames = self.frames_for(max_duration);
        let max_silent_frames = self.max_silent_frames();

        // Lease is released on every return path when `stream` drops.
        let mut stream = self.input.open()?;

        let mut collected: Vec<i16> = Vec::with_capacity(max_frames * self.chunk_size);
        let mut frame = vec![0i16; self.chunk_size];
        let mut silent_frames = 0usize;
        let mut end = CaptureEnd::MaxDuration;

        for index in 0..max_frames {
            if self.interrupt.load(Ordering::SeqCst) {
                debug!("Capture interrupted after {} frames", index);
                end = CaptureEnd::Interrupted;
                break;
            }

            stream.read_frame(&mut frame)?;
            collected.extend_from_slice(&frame);

            let level = mean_abs_amplitude(&frame);
            if level < self.silence_threshold {
                silent_frames += 1;
                trace!(
                    "Frame {}: level {:.1} (silent run {})",
                    index,
                    level,
                    silent_frames
                );
                if silent_frames > max_silent_frames {
                    end = CaptureEnd::Silence;
                    break;
                }
            } else {
                trace!("Frame {}: level {:.1}", index, level);
                silent_frames = 0;
            }
        }

        drop(stream);

        let utterance = Utterance::new(normalize(&collected), self.sample_rate, end);
        debug!(
            "Captured {} samples ({} ms), ended by {:?}",
            utterance.len(),
            utterance.duration().as_millis(),
            end
        );
        Ok(utterance)
    }
}
