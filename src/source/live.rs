use std::collections::VecDeque;

use super::SourceStatus;
use crate::audio::{start_capture, AudioContext, Capture, MonitorTap, StreamResampler};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::fft::analyser::RollingSpectrum;
use crate::fft::SpectralFrame;

/// Gain multiplier clamped to a configured range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gain {
    value: f32,
    min: f32,
    max: f32,
}

impl Gain {
    /// Unity gain (clamped into the range).
    pub fn new(range: (f32, f32)) -> Self {
        let (min, max) = range;
        Self {
            value: 1.0f32.clamp(min, max),
            min,
            max,
        }
    }

    /// Sets the multiplier, returning the clamped value actually applied.
    pub fn set(&mut self, value: f32) -> f32 {
        self.value = if value.is_finite() {
            value.clamp(self.min, self.max)
        } else {
            self.min
        };
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn range(&self) -> (f32, f32) {
        (self.min, self.max)
    }
}

/// Microphone input with gain, plus whatever the context bus is playing.
pub struct LiveSource {
    capture: Option<Capture>,
    device_name: String,
    monitor: MonitorTap,
    /// Converts bus audio from the context rate to the capture rate.
    monitor_resampler: StreamResampler,
    monitor_scratch: Vec<f32>,
    /// Bus samples waiting for microphone samples to pair with.
    pending_monitor: VecDeque<f32>,
    pending_limit: usize,
    gain: Gain,
    spectrum: RollingSpectrum,
    failed: Option<String>,
}

impl LiveSource {
    /// Opens the default microphone at the context rate when possible.
    pub fn start(ctx: &AudioContext, config: &AnalysisConfig) -> Result<Self> {
        let capture = start_capture(config.fft_size, ctx.sample_rate())?;
        Self::new(ctx, capture, config)
    }

    pub fn new(ctx: &AudioContext, capture: Capture, config: &AnalysisConfig) -> Result<Self> {
        let monitor_resampler = StreamResampler::new(ctx.sample_rate(), capture.sample_rate())?;
        log::info!(
            "Live source attached on '{}' @ {}Hz",
            capture.device_name(),
            capture.sample_rate()
        );
        Ok(Self {
            device_name: capture.device_name().to_string(),
            spectrum: RollingSpectrum::new(config, capture.sample_rate() as f32),
            capture: Some(capture),
            monitor: ctx.attach_monitor(config.fft_size * 8),
            monitor_resampler,
            monitor_scratch: Vec::new(),
            pending_monitor: VecDeque::new(),
            pending_limit: config.fft_size * 4,
            gain: Gain::new(config.gain_range),
            failed: None,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn bin_count(&self) -> usize {
        self.spectrum.bin_count()
    }

    pub fn sample_rate(&self) -> f32 {
        self.spectrum.sample_rate()
    }

    pub fn gain(&self) -> Gain {
        self.gain
    }

    pub fn set_gain(&mut self, value: f32) -> f32 {
        self.gain.set(value)
    }

    pub fn status(&self) -> SourceStatus {
        match (&self.failed, &self.capture) {
            (Some(reason), _) => SourceStatus::Failed(reason.clone()),
            (None, Some(_)) => SourceStatus::Running,
            (None, None) => SourceStatus::Idle,
        }
    }

    pub fn next_frame(&mut self) -> Option<SpectralFrame> {
        if self.failed.is_some() {
            return None;
        }
        let capture = self.capture.as_mut()?;

        if let Some(reason) = capture.failure() {
            log::error!("Capture on '{}' failed: {}", self.device_name, reason);
            self.failed = Some(reason);
            self.capture = None;
            self.monitor.detach();
            return None;
        }

        self.monitor_scratch.clear();
        while let Some(sample) = self.monitor.pop() {
            self.monitor_scratch.push(sample);
        }
        if let Err(err) = self
            .monitor_resampler
            .process(&self.monitor_scratch, &mut self.pending_monitor)
        {
            log::warn!("Dropping {} bus samples: {}", self.monitor_scratch.len(), err);
        }
        let excess = self
            .pending_monitor
            .len()
            .saturating_sub(self.pending_limit);
        self.pending_monitor.drain(..excess);

        //
        // Gain applies to the microphone only, ahead of analysis.
        //
        let gain = self.gain.value();
        while let Some(sample) = capture.pop() {
            let injected = self.pending_monitor.pop_front().unwrap_or(0.0);
            self.spectrum.push(sample * gain + injected);
        }

        Some(self.spectrum.latest().clone())
    }

    /// Stops capture and detaches the monitor.
    pub fn teardown(&mut self) {
        self.capture = None;
        self.monitor.detach();
        self.pending_monitor.clear();
    }
}
