use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use parking_lot::Mutex;
use ringbuf::HeapRb;
use std::sync::Arc;

use super::context::{SampleConsumer, SampleProducer};
use crate::error::{AnalyzerError, Result};

/// Terminal stream error reported by the capture callback.
pub type FailureSlot = Arc<Mutex<Option<String>>>;

/// Running microphone capture delivering mono samples.
pub struct Capture {
    stream: Option<cpal::Stream>,
    consumer: SampleConsumer,
    sample_rate: u32,
    device_name: String,
    failure: FailureSlot,
}

impl Capture {
    /// Wraps an externally fed ring buffer (no device stream).
    pub fn from_consumer(consumer: SampleConsumer, sample_rate: u32, device_name: &str) -> Self {
        Self {
            stream: None,
            consumer,
            sample_rate,
            device_name: device_name.to_string(),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    #[inline]
    pub fn pop(&mut self) -> Option<f32> {
        self.consumer.pop()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Error reported by the device, if the stream has failed.
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    /// Slot the stream error callback writes into.
    pub fn failure_slot(&self) -> FailureSlot {
        self.failure.clone()
    }
}

/// Starts audio capture on the default input device.
///
/// Requests `preferred_rate` when the device supports it, otherwise falls back
/// to the device default. Multi-channel input is downmixed to mono.
pub fn start_capture(buffer_size: usize, preferred_rate: u32) -> Result<Capture> {
    let host = cpal::default_host();

    //
    // Log all available input devices for debugging.
    //
    log::info!("--- AVAILABLE INPUT DEVICES ---");
    if let Ok(devices) = host.input_devices() {
        for (i, dev) in devices.enumerate() {
            let name = dev.name().unwrap_or_else(|_| "Unknown".into());
            log::info!("  [{}]: {}", i, name);
        }
    }
    log::info!("-------------------------------");

    let device = host
        .default_input_device()
        .ok_or_else(|| AnalyzerError::CaptureDenied("no audio input device found".into()))?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".into());

    let default = device
        .default_input_config()
        .map_err(|e| AnalyzerError::CaptureDenied(e.to_string()))?;

    //
    // Prefer the output clock's rate so monitor samples line up with the mic.
    //
    let supported = device
        .supported_input_configs()
        .ok()
        .and_then(|mut ranges| {
            ranges.find(|r| {
                r.sample_format() == default.sample_format()
                    && r.channels() == default.channels()
                    && r.min_sample_rate().0 <= preferred_rate
                    && preferred_rate <= r.max_sample_rate().0
            })
        })
        .map(|r| r.with_sample_rate(cpal::SampleRate(preferred_rate)))
        .unwrap_or(default);

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    log::info!(
        "Audio input: {} | {:?} @ {}Hz, Channels: {}",
        device_name,
        sample_format,
        config.sample_rate.0,
        config.channels
    );
    if config.sample_rate.0 != preferred_rate {
        log::warn!(
            "Input rate {}Hz differs from output rate {}Hz; bus audio will be resampled",
            config.sample_rate.0,
            preferred_rate
        );
    }

    //
    // Ring buffer of 4x the window to ride out UI stalls.
    //
    let (producer, consumer) = HeapRb::<f32>::new(buffer_size * 4).split();
    let failure: FailureSlot = Arc::new(Mutex::new(None));

    let stream = match sample_format {
        SampleFormat::F32 => build_input::<f32>(&device, &config, producer, failure.clone()),
        SampleFormat::I16 => build_input::<i16>(&device, &config, producer, failure.clone()),
        SampleFormat::U16 => build_input::<u16>(&device, &config, producer, failure.clone()),
        other => {
            return Err(AnalyzerError::CaptureDenied(format!(
                "unsupported input sample format {:?}",
                other
            )))
        }
    }
    .map_err(|e| AnalyzerError::CaptureDenied(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AnalyzerError::CaptureDenied(e.to_string()))?;

    Ok(Capture {
        stream: Some(stream),
        consumer,
        sample_rate: config.sample_rate.0,
        device_name,
        failure,
    })
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: SampleProducer,
    failure: FailureSlot,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if channels == 2 {
                //
                // Downmix stereo to mono using averaged samples.
                //
                for chunk in data.chunks_exact(2) {
                    let left = <f32 as FromSample<T>>::from_sample_(chunk[0]);
                    let right = <f32 as FromSample<T>>::from_sample_(chunk[1]);
                    let _ = producer.push((left + right) * 0.5);
                }
            } else {
                //
                // Mono passes through; wider layouts keep the first channel.
                //
                for chunk in data.chunks_exact(channels.max(1)) {
                    let _ = producer.push(<f32 as FromSample<T>>::from_sample_(chunk[0]));
                }
            }
        },
        move |err| {
            log::error!("Audio input error: {}", err);
            *failure.lock() = Some(err.to_string());
        },
        None,
    )
}
