//! CPAL-based audio output backend.
//!
//! The device callback pulls from every instance's frame ring, mixes, and
//! converts to interleaved `f32`. It never blocks: a ring that has fallen
//! behind is heard as silence for that callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange,
};
use pr_engine::{mix_available, RingConsumer};
use pr_ir::{AudioFrame, Sample};

use crate::AudioError;

/// CPAL-based audio output.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Open the default output device at `sample_rate`, stereo.
    pub fn new(sample_rate: u32) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let name = device
            .name()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;
        tracing::info!(device = %name, sample_rate, "opening audio output");

        let ranges = device
            .supported_output_configs()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;
        if !supports_rate(ranges, sample_rate) {
            let default = device.default_output_config().ok().map(|c| c.sample_rate().0);
            return Err(AudioError::UnsupportedRate {
                rate: sample_rate,
                default,
            });
        }

        // The callback assumes 2-channel interleaving.
        let config = StreamConfig {
            channels: AudioFrame::<f32>::CHANNELS,
            sample_rate: SampleRate(sample_rate),
            buffer_size: BufferSize::Default,
        };

        Ok(Self {
            device,
            config,
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Build the stream. `scratch_frames` sizes the mix buffer, which is
    /// allocated here and reused by every callback.
    pub fn build_stream<T: Sample>(
        &mut self,
        mut inputs: Vec<RingConsumer<T>>,
        scratch_frames: usize,
    ) -> Result<(), AudioError> {
        let running = self.running.clone();
        let channels = self.config.channels as usize;
        let mut scratch = vec![AudioFrame::<T>::silence(); scratch_frames.max(1)];

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    fill_output(&mut inputs, &mut scratch, data, channels);
                },
                |err| tracing::error!("audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}

/// Whether any range offers stereo `f32` output at `sample_rate`.
fn supports_rate(
    ranges: impl IntoIterator<Item = SupportedStreamConfigRange>,
    sample_rate: u32,
) -> bool {
    ranges.into_iter().any(|range| {
        range.channels() == AudioFrame::<f32>::CHANNELS
            && range.sample_format() == SampleFormat::F32
            && (range.min_sample_rate().0..=range.max_sample_rate().0).contains(&sample_rate)
    })
}

/// Mix every ring into `data` as interleaved `f32`, `scratch.len()` frames
/// at a time. Channels beyond the first two are zeroed.
pub fn fill_output<T: Sample>(
    inputs: &mut [RingConsumer<T>],
    scratch: &mut [AudioFrame<T>],
    data: &mut [f32],
    channels: usize,
) {
    if scratch.is_empty() || channels == 0 {
        data.fill(0.0);
        return;
    }
    for block in data.chunks_mut(scratch.len() * channels) {
        let frames = block.len() / channels;
        mix_available(inputs, &mut scratch[..frames]);
        for (out, frame) in block.chunks_mut(channels).zip(scratch.iter()) {
            for (i, sample) in out.iter_mut().enumerate() {
                *sample = match i {
                    0 => frame.left.to_f32(),
                    1 => frame.right.to_f32(),
                    _ => 0.0,
                };
            }
        }
    }
}
