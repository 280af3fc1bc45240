//! Scrolling live waterfall.
//!
//! Each tick pulls one frame, scrolls the buffer left by a column and paints
//! the new rightmost column. The buffer is allocated once per session.

use std::sync::Arc;

use super::{Raster, BACKGROUND};
use crate::colormap::Colormap;
use crate::config::{max_frequency_index, WaterfallConfig};
use crate::fft::SpectralFrame;
use crate::source::FrameSource;

pub struct LiveWaterfall {
    buffer: Raster,
    colormap: Arc<Colormap>,
    max_frequency_hz: f32,
    level_bins: usize,
    signal_level: f32,
    attached: bool,
    columns_drawn: u64,
}

impl LiveWaterfall {
    pub fn new(config: &WaterfallConfig, max_frequency_hz: f32, colormap: Arc<Colormap>) -> Self {
        Self {
            buffer: Raster::new(config.width, config.height, BACKGROUND),
            colormap,
            max_frequency_hz,
            level_bins: config.level_bins,
            signal_level: 0.0,
            attached: false,
            columns_drawn: 0,
        }
    }

    /// Resumes rendering from the current source.
    pub fn attach(&mut self) {
        self.attached = true;
    }

    /// Stops rendering; the image stays as it is.
    pub fn detach(&mut self) {
        self.attached = false;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Clears the image for a new session.
    pub fn reset(&mut self) {
        self.buffer.fill(BACKGROUND);
        self.signal_level = 0.0;
        self.columns_drawn = 0;
    }

    /// Applies to columns drawn from now on.
    pub fn set_colormap(&mut self, colormap: Arc<Colormap>) {
        self.colormap = colormap;
    }

    pub fn surface(&self) -> &Raster {
        &self.buffer
    }

    /// Mean magnitude of the lowest bins of the last frame (0–255).
    pub fn signal_level(&self) -> f32 {
        self.signal_level
    }

    pub fn columns_drawn(&self) -> u64 {
        self.columns_drawn
    }

    /// One scheduling step: pulls a single frame and draws it.
    ///
    /// Returns the frame that was drawn, if any.
    pub fn tick<S>(&mut self, source: &mut S) -> Option<SpectralFrame>
    where
        S: FrameSource + ?Sized,
    {
        if !self.attached {
            return None;
        }
        let frame = source.next_frame()?;
        self.draw_frame(&frame);
        Some(frame)
    }

    /// Scrolls left by one column and paints `frame` into the rightmost one.
    pub fn draw_frame(&mut self, frame: &SpectralFrame) {
        let width = self.buffer.width();
        let height = self.buffer.height();
        if width == 0 || height == 0 {
            return;
        }
        let x = width - 1;

        self.buffer.shift_left();
        for y in 0..height {
            self.buffer.set_pixel(x, y, BACKGROUND);
        }

        let bins = frame.bin_count();
        let max_index = max_frequency_index(self.max_frequency_hz, frame.sample_rate, bins);

        if max_index > 0 {
            let h = height as f32;
            let thickness = (h / max_index as f32) as usize + 1;

            for (i, &magnitude) in frame.magnitudes[..=max_index].iter().enumerate() {
                //
                // Zero stays background so silence is black.
                //
                if magnitude == 0 {
                    continue;
                }
                let y = h - (i as f32 / max_index as f32) * h;
                let top = y.floor() as usize;
                let rgb = self.colormap.lookup(magnitude);
                for row in top..(top + thickness).min(height) {
                    self.buffer.set_pixel(x, row, rgb);
                }
            }
        }

        let level_bins = self.level_bins.min(bins);
        self.signal_level = if level_bins == 0 {
            0.0
        } else {
            frame.magnitudes[..level_bins]
                .iter()
                .map(|&m| m as f32)
                .sum::<f32>()
                / level_bins as f32
        };

        self.columns_drawn += 1;
    }
}
