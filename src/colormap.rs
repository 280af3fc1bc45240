//! Magnitude-to-color lookup tables.
//!
//! A colormap is built once from a handful of keyframes and then indexed
//! directly by the quantized magnitude byte; nothing is interpolated while
//! rendering.

use lazy_static::lazy_static;
use std::sync::Arc;

use crate::error::{AnalyzerError, Result};

/// Number of entries in every colormap (one per magnitude byte).
pub const COLORMAP_SIZE: usize = 256;

/// Keyframe of a gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    /// Position along the gradient in [0, 1].
    pub position: f32,
    pub rgb: [u8; 3],
}

impl ColorStop {
    pub const fn new(position: f32, rgb: [u8; 3]) -> Self {
        Self { position, rgb }
    }
}

/// Perceptual dark-to-bright ramp (inferno).
pub const INFERNO_STOPS: &[ColorStop] = &[
    ColorStop::new(0.0, [0, 0, 4]),
    ColorStop::new(0.13, [31, 12, 72]),
    ColorStop::new(0.25, [85, 15, 109]),
    ColorStop::new(0.38, [136, 34, 106]),
    ColorStop::new(0.5, [186, 54, 85]),
    ColorStop::new(0.63, [227, 89, 51]),
    ColorStop::new(0.75, [249, 140, 10]),
    ColorStop::new(0.88, [249, 201, 50]),
    ColorStop::new(1.0, [252, 255, 164]),
];

/// Black → Blue → Cyan → Green → Yellow → Red.
pub const HEATMAP_STOPS: &[ColorStop] = &[
    ColorStop::new(0.0, [0, 0, 0]),
    ColorStop::new(0.2, [0, 0, 255]),
    ColorStop::new(0.4, [0, 255, 255]),
    ColorStop::new(0.6, [0, 255, 0]),
    ColorStop::new(0.8, [255, 255, 0]),
    ColorStop::new(1.0, [255, 0, 0]),
];

/// Immutable 256-entry RGB lookup table.
#[derive(Clone, PartialEq)]
pub struct Colormap {
    table: [[u8; 3]; COLORMAP_SIZE],
}

impl std::fmt::Debug for Colormap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Colormap")
            .field("first", &self.table[0])
            .field("last", &self.table[COLORMAP_SIZE - 1])
            .finish()
    }
}

impl Colormap {
    /// Builds a table from keyframes.
    ///
    /// Stops must lie in [0, 1] with strictly increasing positions. Table
    /// positions before the first stop or after the last one take the color
    /// of that endpoint.
    pub fn from_stops(stops: &[ColorStop]) -> Result<Self> {
        if stops.len() < 2 {
            return Err(AnalyzerError::Config(format!(
                "a colormap needs at least two stops, got {}",
                stops.len()
            )));
        }
        for stop in stops {
            if !(0.0..=1.0).contains(&stop.position) {
                return Err(AnalyzerError::Config(format!(
                    "colormap stop position {} outside [0, 1]",
                    stop.position
                )));
            }
        }
        for pair in stops.windows(2) {
            if pair[1].position <= pair[0].position {
                return Err(AnalyzerError::Config(format!(
                    "colormap stops must be strictly increasing ({} then {})",
                    pair[0].position, pair[1].position
                )));
            }
        }
        Ok(Self::interpolate(stops))
    }

    fn interpolate(stops: &[ColorStop]) -> Self {
        let mut table = [[0u8; 3]; COLORMAP_SIZE];
        let first = stops[0];
        let last = stops[stops.len() - 1];

        for (i, entry) in table.iter_mut().enumerate() {
            let ratio = i as f32 / (COLORMAP_SIZE - 1) as f32;

            let interval = stops
                .windows(2)
                .find(|pair| pair[0].position <= ratio && ratio <= pair[1].position);

            *entry = match interval {
                Some(pair) => {
                    let (start, end) = (pair[0], pair[1]);
                    let t = (ratio - start.position) / (end.position - start.position);
                    let mut rgb = [0u8; 3];
                    for c in 0..3 {
                        let a = start.rgb[c] as f32;
                        let b = end.rgb[c] as f32;
                        rgb[c] = (a + (b - a) * t).round().clamp(0.0, 255.0) as u8;
                    }
                    rgb
                }
                None if ratio < first.position => first.rgb,
                None => last.rgb,
            };
        }

        Self { table }
    }

    /// Color for a quantized magnitude.
    #[inline(always)]
    pub fn lookup(&self, magnitude: u8) -> [u8; 3] {
        self.table[magnitude as usize]
    }

    pub fn entries(&self) -> &[[u8; 3]] {
        &self.table
    }

    pub fn len(&self) -> usize {
        COLORMAP_SIZE
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

lazy_static! {
    static ref INFERNO: Arc<Colormap> = Arc::new(Colormap::interpolate(INFERNO_STOPS));
    static ref HEATMAP: Arc<Colormap> = Arc::new(Colormap::interpolate(HEATMAP_STOPS));
}

/// Built-in gradients selectable from the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Palette {
    Inferno,
    Heatmap,
}

impl Palette {
    pub const ALL: [Palette; 2] = [Palette::Inferno, Palette::Heatmap];

    pub fn name(self) -> &'static str {
        match self {
            Palette::Inferno => "Inferno",
            Palette::Heatmap => "Heatmap",
        }
    }

    /// Shared table for this palette, built on first use.
    pub fn colormap(self) -> Arc<Colormap> {
        match self {
            Palette::Inferno => INFERNO.clone(),
            Palette::Heatmap => HEATMAP.clone(),
        }
    }
}
