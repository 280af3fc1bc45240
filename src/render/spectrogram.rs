//! Full-duration spectrogram of a decoded track.

use super::Raster;
use crate::audio::DecodedTrack;
use crate::colormap::Colormap;
use crate::config::{display_max_frequency, max_frequency_index, AnalysisConfig, SpectrogramConfig};
use crate::fft::Analyser;

/// Heatmap covering the whole track, with its time/frequency extent.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticSpectrogram {
    pub raster: Raster,
    pub track_name: String,
    /// Horizontal extent.
    pub duration_secs: f32,
    /// Frequency at the top edge; the bottom edge is 0 Hz.
    pub max_frequency_hz: f32,
    /// Samples between the starts of adjacent columns.
    pub hop: usize,
}

impl StaticSpectrogram {
    /// Column under a playback position.
    pub fn column_at(&self, secs: f32) -> usize {
        if self.duration_secs <= 0.0 {
            return 0;
        }
        let ratio = (secs / self.duration_secs).clamp(0.0, 1.0);
        ((ratio * self.raster.width() as f32) as usize).min(self.raster.width().saturating_sub(1))
    }
}

/// Renders `track` once, keeping bins up to `max_frequency_hz`.
///
/// One row per bin (highest on top); bins above the limit are dropped rather
/// than squeezed into the image.
pub fn render_spectrogram(
    track: &DecodedTrack,
    max_frequency_hz: f32,
    analysis: &AnalysisConfig,
    config: &SpectrogramConfig,
    colormap: &Colormap,
) -> StaticSpectrogram {
    let mut analyser = Analyser::new(analysis, 0.0);
    let fft_size = analyser.fft_size();
    let bins = analyser.bin_count();
    let rate = track.sample_rate as f32;

    let max_index = max_frequency_index(max_frequency_hz, rate, bins);
    let rows = max_index + 1;

    let samples = &track.samples;
    let len = samples.len();
    let hop = (fft_size / 2).max(len.div_ceil(config.max_columns.max(1)));
    let columns = len.div_ceil(hop).max(1);

    let mut raster = Raster::new(columns, rows, colormap.lookup(0));
    let mut magnitudes = vec![0u8; bins];

    for column in 0..columns {
        let start = (column * hop).min(len);
        let end = (start + fft_size).min(len);
        analyser.analyse(samples[start..end].iter().copied(), &mut magnitudes);

        for (bin, &m) in magnitudes[..rows].iter().enumerate() {
            raster.set_pixel(column, rows - 1 - bin, colormap.lookup(m));
        }
    }

    log::info!(
        "Rendered spectrogram for '{}': {}x{} (hop {}, top {:.0}Hz)",
        track.name,
        columns,
        rows,
        hop,
        display_max_frequency(max_frequency_hz, rate)
    );

    StaticSpectrogram {
        raster,
        track_name: track.name.clone(),
        duration_secs: track.duration_secs(),
        max_frequency_hz: display_max_frequency(max_frequency_hz, rate),
        hop,
    }
}
