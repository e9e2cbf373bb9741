use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfig};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use super::capture::{AudioError, AudioInput, FrameSource};
use crate::config::{AudioConfig, EndpointConfig};

/// Microphone (or virtual cable) input through cpal.
///
/// Holds only the device selection; the device and its stream are looked up
/// on every `open` so no handle outlives a capture.
#[derive(Debug, Clone)]
pub struct CpalInput {
    device_name: String,
    sample_rate: u32,
    channels: u16,
    read_timeout: Duration,
}

impl CpalInput {
    pub fn new(audio: &AudioConfig, endpoint: &EndpointConfig) -> Self {
        Self {
            device_name: audio.device.clone(),
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            read_timeout: Duration::from_millis(endpoint.read_timeout_ms),
        }
    }

    /// Resolves the configured device once so a missing device fails at startup.
    pub fn probe(&self) -> Result<(), AudioError> {
        let device = self.find_device()?;
        tracing::info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "<unnamed>".to_string())
        );
        self.find_config(&device)?;
        Ok(())
    }

    fn find_device(&self) -> Result<Device, AudioError> {
        let host = cpal::default_host();

        if self.device_name.is_empty() || self.device_name == "default" {
            return host
                .default_input_device()
                .ok_or_else(|| AudioError::NoDevice("no default input device".to_string()));
        }

        let devices = host
            .input_devices()
            .map_err(|e| AudioError::Device(e.to_string()))?;

        for device in devices {
            if let Ok(name) = device.name() {
                if name.contains(&self.device_name) {
                    return Ok(device);
                }
            }
        }

        Err(AudioError::NoDevice(format!(
            "no input device matching '{}'",
            self.device_name
        )))
    }

    fn find_config(&self, device: &Device) -> Result<SupportedStreamConfig, AudioError> {
        let supported_configs = device
            .supported_input_configs()
            .map_err(|e| AudioError::Device(e.to_string()))?;

        for supported in supported_configs {
            tracing::debug!("Supported config: {:?}", supported);
            if supported.channels() == self.channels
                && supported.min_sample_rate().0 <= self.sample_rate
                && supported.max_sample_rate().0 >= self.sample_rate
            {
                return Ok(supported.with_sample_rate(SampleRate(self.sample_rate)));
            }
        }

        Err(AudioError::UnsupportedConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }
}

impl AudioInput for CpalInput {
    type Stream = CpalStream;

    fn open(&self) -> Result<CpalStream, AudioError> {
        let device = self.find_device()?;
        let supported = self.find_config(&device)?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let channels = config.channels as usize;

        let (tx, rx) = mpsc::channel::<Vec<i16>>();

        let error_callback = |err| {
            tracing::error!("Audio stream error: {}", err);
        };

        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &_| forward(&tx, data, channels, |s| s),
                error_callback,
                None,
            ),
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &_| {
                    forward(&tx, data, channels, |s| {
                        (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                    })
                },
                error_callback,
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _: &_| {
                    forward(&tx, data, channels, |s| (s as i32 - 32768) as i16)
                },
                error_callback,
                None,
            ),
            format => return Err(AudioError::UnsupportedFormat(format!("{:?}", format))),
        }
        .map_err(|e| AudioError::Device(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::Device(e.to_string()))?;

        tracing::debug!(
            "Audio input stream opened: {}Hz, {} channel(s), {:?}",
            self.sample_rate,
            channels,
            sample_format
        );

        Ok(CpalStream {
            _stream: stream,
            rx,
            pending: VecDeque::new(),
            read_timeout: self.read_timeout,
        })
    }
}

/// Converts one callback buffer to mono i16 and hands it to the reader.
fn forward<T: Copy>(
    tx: &Sender<Vec<i16>>,
    data: &[T],
    channels: usize,
    convert: impl Fn(T) -> i16,
) {
    let mono: Vec<i16> = if channels <= 1 {
        data.iter().map(|&s| convert(s)).collect()
    } else {
        data.chunks(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| convert(s) as i32).sum();
                (sum / frame.len() as i32) as i16
            })
            .collect()
    };
    // The reader may already be gone while cpal delivers the last buffer.
    let _ = tx.send(mono);
}

/// One open input stream lease. Dropping it stops and releases the device.
pub struct CpalStream {
    _stream: Stream,
    rx: Receiver<Vec<i16>>,
    pending: VecDeque<i16>,
    read_timeout: Duration,
}

impl FrameSource for CpalStream {
    fn read_frame(&mut self, frame: &mut [i16]) -> Result<(), AudioError> {
        while self.pending.len() < frame.len() {
            match self.rx.recv_timeout(self.read_timeout) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(AudioError::Timeout(self.read_timeout))
                }
                Err(RecvTimeoutError::Disconnected) => return Err(AudioError::StreamClosed),
            }
        }

        for (slot, sample) in frame.iter_mut().zip(self.pending.drain(..frame.len())) {
            *slot = sample;
        }
        Ok(())
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        tracing::debug!("Audio input stream closed");
    }
}
