//! Windowed magnitude analysis producing byte-quantized spectral frames.

use num_complex::Complex32;
use num_traits::Zero;
use std::collections::VecDeque;
use std::sync::Arc;

use super::{find_transform, hann_window, Transform};
use crate::config::AnalysisConfig;

/// One snapshot of per-bin magnitude, quantized to a byte.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralFrame {
    pub magnitudes: Vec<u8>,
    pub sample_rate: f32,
}

impl SpectralFrame {
    pub fn silent(bin_count: usize, sample_rate: f32) -> Self {
        Self {
            magnitudes: vec![0; bin_count],
            sample_rate,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn nyquist(&self) -> f32 {
        self.sample_rate / 2.0
    }

    /// Center frequency of bin `index` in Hz.
    pub fn bin_frequency(&self, index: usize) -> f32 {
        index as f32 * self.nyquist() / self.bin_count().max(1) as f32
    }
}

/// Hann-windowed FFT with dB quantization and optional time smoothing.
pub struct Analyser {
    plan: Arc<dyn Transform>,
    window: Vec<f32>,
    scratch: Vec<Complex32>,
    smoothed: Vec<f32>,
    min_db: f32,
    max_db: f32,
    smoothing: f32,
}

impl Analyser {
    pub fn new(config: &AnalysisConfig, smoothing: f32) -> Self {
        let n = config.fft_size;
        Self {
            plan: find_transform(n),
            window: (0..n).map(|i| hann_window(i, n)).collect(),
            scratch: vec![Complex32::zero(); n],
            smoothed: vec![0.0; n / 2],
            min_db: config.min_db,
            max_db: config.max_db,
            smoothing: smoothing.clamp(0.0, 0.99),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    pub fn bin_count(&self) -> usize {
        self.smoothed.len()
    }

    /// Analyses one window of `fft_size` samples into `out` (one byte per bin).
    ///
    /// Short input is zero padded; extra input is ignored.
    pub fn analyse<I>(&mut self, samples: I, out: &mut [u8])
    where
        I: IntoIterator<Item = f32>,
    {
        let mut samples = samples.into_iter();
        for (slot, &w) in self.scratch.iter_mut().zip(self.window.iter()) {
            let x = samples.next().unwrap_or(0.0);
            *slot = Complex32::new(x * w, 0.0);
        }

        self.plan.process(&mut self.scratch);

        let n = self.fft_size() as f32;
        let range = self.max_db - self.min_db;
        let s = self.smoothing;

        for (k, (level, byte)) in self.smoothed.iter_mut().zip(out.iter_mut()).enumerate() {
            let mag = self.scratch[k].norm() / n;
            *level = s * *level + (1.0 - s) * mag;

            let db = 20.0 * level.max(1e-12).log10();
            let norm = ((db - self.min_db) / range).clamp(0.0, 1.0);
            *byte = (norm * 255.0) as u8;
        }
    }

    /// Forgets the smoothing history.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Sliding window of the latest samples plus the frame computed from it.
///
/// Reading the frame only recomputes when samples arrived since the last
/// read, so repeated reads without new audio are identical.
pub struct RollingSpectrum {
    history: VecDeque<f32>,
    analyser: Analyser,
    frame: SpectralFrame,
    fresh: bool,
}

impl RollingSpectrum {
    pub fn new(config: &AnalysisConfig, sample_rate: f32) -> Self {
        let analyser = Analyser::new(config, config.smoothing);
        Self {
            history: VecDeque::from(vec![0.0; analyser.fft_size()]),
            frame: SpectralFrame::silent(analyser.bin_count(), sample_rate),
            analyser,
            fresh: false,
        }
    }

    #[inline]
    pub fn push(&mut self, sample: f32) {
        self.history.pop_front();
        self.history.push_back(sample);
        self.fresh = true;
    }

    pub fn bin_count(&self) -> usize {
        self.analyser.bin_count()
    }

    pub fn sample_rate(&self) -> f32 {
        self.frame.sample_rate
    }

    /// Most recent frame, recomputed only if new samples were pushed.
    pub fn latest(&mut self) -> &SpectralFrame {
        if self.fresh {
            let Self {
                history,
                analyser,
                frame,
                ..
            } = self;
            analyser.analyse(history.iter().copied(), &mut frame.magnitudes);
            self.fresh = false;
        }
        &self.frame
    }

    /// Clears the window, the smoothing and the last frame.
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|v| *v = 0.0);
        self.analyser.reset();
        self.frame.magnitudes.iter_mut().for_each(|m| *m = 0);
        self.fresh = false;
    }
}
