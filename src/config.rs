//! Analyzer configuration with documented units and defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::colormap::Palette;
use crate::error::{AnalyzerError, Result};

/// Transform size balancing resolution and latency.
pub const FFT_SIZE: usize = 2048;

/// Top of the displayed frequency axis (Hz), shared by both renderers.
pub const MAX_DISPLAY_FREQUENCY_HZ: f32 = 12_000.0;

/// Overrides the directory snapshots are written to.
pub const SNAPSHOT_DIR_ENV: &str = "SONOSCOPE_SNAPSHOT_DIR";

/// Folder scanned for tracks at startup.
pub const LIBRARY_DIR_ENV: &str = "SONOSCOPE_LIBRARY_DIR";

/// Spectral analysis parameters.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// FFT window size (must be a power of two); bin count is half of it.
    pub fft_size: usize,

    /// Magnitude (dB) mapped to byte 0.
    pub min_db: f32,

    /// Magnitude (dB) mapped to byte 255.
    pub max_db: f32,

    /// Time smoothing constant in [0, 1) for live and file frames.
    pub smoothing: f32,

    /// Allowed range of the live gain multiplier.
    pub gain_range: (f32, f32),
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: FFT_SIZE,
            min_db: -100.0,
            max_db: -30.0,
            smoothing: 0.8,
            gain_range: (0.0, 5.0),
        }
    }
}

impl AnalysisConfig {
    /// Number of frequency bins a frame carries.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

/// Live waterfall surface.
#[derive(Debug, Clone)]
pub struct WaterfallConfig {
    /// Buffer width in pixels (columns of history).
    pub width: usize,

    /// Buffer height in pixels.
    pub height: usize,

    /// Low bins averaged into the signal level indicator.
    pub level_bins: usize,
}

impl Default for WaterfallConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 256,
            level_bins: 50,
        }
    }
}

/// Static spectrogram rendering.
#[derive(Debug, Clone)]
pub struct SpectrogramConfig {
    /// Upper bound on raster columns; longer tracks use a larger hop.
    pub max_columns: usize,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self { max_columns: 4096 }
    }
}

/// Calibration sweep schedule.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// First frequency of the ramp (Hz).
    pub min_hz: f32,

    /// Frequency increment per step (Hz).
    pub step_hz: f32,

    /// Time spent on each step.
    pub step_duration: Duration,

    /// Peak amplitude of the synthetic tone.
    pub amplitude: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_hz: 10.0,
            step_hz: 200.0,
            step_duration: Duration::from_millis(50),
            amplitude: 0.25,
        }
    }
}

/// Complete analyzer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub analysis: AnalysisConfig,
    pub waterfall: WaterfallConfig,
    pub spectrogram: SpectrogramConfig,
    pub calibration: CalibrationConfig,

    /// Configured top of the frequency axis (Hz), before the Nyquist clamp.
    pub max_frequency_hz: f32,

    pub palette: Palette,

    /// Directory snapshots are saved into.
    pub snapshot_dir: PathBuf,

    /// Folder offered in the library panel at startup.
    pub library_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            waterfall: WaterfallConfig::default(),
            spectrogram: SpectrogramConfig::default(),
            calibration: CalibrationConfig::default(),
            max_frequency_hz: MAX_DISPLAY_FREQUENCY_HZ,
            palette: Palette::Inferno,
            snapshot_dir: PathBuf::from("."),
            library_dir: None,
        }
    }
}

impl Config {
    /// Defaults with the environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = std::env::var_os(SNAPSHOT_DIR_ENV) {
            config.snapshot_dir = PathBuf::from(dir);
        }
        if let Some(dir) = std::env::var_os(LIBRARY_DIR_ENV) {
            config.library_dir = Some(PathBuf::from(dir));
        }
        config
    }

    /// Checks the values the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        let analysis = &self.analysis;
        if !analysis.fft_size.is_power_of_two() || analysis.fft_size < 32 {
            return Err(AnalyzerError::Config(format!(
                "FFT size must be a power of two >= 32, got {}",
                analysis.fft_size
            )));
        }
        if analysis.min_db >= analysis.max_db {
            return Err(AnalyzerError::Config(format!(
                "min_db ({}) must be below max_db ({})",
                analysis.min_db, analysis.max_db
            )));
        }
        if !(0.0..1.0).contains(&analysis.smoothing) {
            return Err(AnalyzerError::Config(format!(
                "smoothing must be in [0, 1), got {}",
                analysis.smoothing
            )));
        }
        let (lo, hi) = analysis.gain_range;
        if lo < 0.0 || lo > hi {
            return Err(AnalyzerError::Config(format!(
                "invalid gain range [{}, {}]",
                lo, hi
            )));
        }
        if self.waterfall.width == 0 || self.waterfall.height == 0 {
            return Err(AnalyzerError::Config("waterfall must not be empty".into()));
        }
        if self.spectrogram.max_columns == 0 {
            return Err(AnalyzerError::Config("max_columns must be > 0".into()));
        }
        let calibration = &self.calibration;
        if calibration.step_hz <= 0.0 || calibration.step_duration.is_zero() {
            return Err(AnalyzerError::Config(
                "calibration step must be positive".into(),
            ));
        }
        if calibration.min_hz <= 0.0 || calibration.min_hz >= self.max_frequency_hz {
            return Err(AnalyzerError::Config(format!(
                "calibration start {} Hz must lie below the display maximum {} Hz",
                calibration.min_hz, self.max_frequency_hz
            )));
        }
        Ok(())
    }
}

/// Frequency shown at the top of both renderers.
pub fn display_max_frequency(configured_hz: f32, sample_rate: f32) -> f32 {
    configured_hz.min(sample_rate / 2.0)
}

/// Highest bin index drawn for the given axis maximum.
///
/// `floor(max / nyquist * bins)`, clamped to the last bin.
pub fn max_frequency_index(configured_hz: f32, sample_rate: f32, bin_count: usize) -> usize {
    if bin_count == 0 || sample_rate <= 0.0 {
        return 0;
    }
    let nyquist = sample_rate / 2.0;
    let top = display_max_frequency(configured_hz, sample_rate);
    let index = (top / nyquist * bin_count as f32).floor() as usize;
    index.min(bin_count - 1)
}
