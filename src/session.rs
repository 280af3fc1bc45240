//! Analyzer state independent of any window: the audio context, the active
//! source, both renderers and the calibration sweep.
//!
//! The GUI forwards user actions here and only keeps what it needs to draw.

use std::sync::Arc;
use std::time::Instant;

use crate::audio::{decode_track, AudioContext, Capture, DecodedTrack, DEFAULT_SAMPLE_RATE};
use crate::calibration::{CalibrationSweep, SweepProgress};
use crate::colormap::{Colormap, Palette};
use crate::config::{AnalysisConfig, Config};
use crate::error::Result;
use crate::fft::SpectralFrame;
use crate::library::TrackHandle;
use crate::render::{render_spectrogram, LiveWaterfall, Raster, StaticSpectrogram};
use crate::scheduler::Tick;
use crate::snapshot::{export_snapshot, SaveTarget, SnapshotOutcome};
use crate::source::{AnalysisSource, FileSource, FrameSource, LiveSource, SourceStatus};

/// What one scheduling step produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub frame: Option<SpectralFrame>,
    pub sweep: SweepProgress,
    /// Set on the step that noticed a terminal capture failure.
    pub failure: Option<String>,
}

pub struct Session {
    config: Config,

    //
    // Audio context (opened on first use) and the active source.
    //
    audio: Option<AudioContext>,
    output_error: Option<String>,
    source: AnalysisSource,
    pump_buf: Vec<f32>,
    last_pump: Option<Instant>,

    //
    // Renderers.
    //
    palette: Palette,
    colormap: Arc<Colormap>,
    waterfall: LiveWaterfall,
    decoded: Option<DecodedTrack>,
    spectrogram: Option<StaticSpectrogram>,

    calibration: CalibrationSweep,
}

/// Default output device, or a headless context when none opens.
fn open_output(error: &mut Option<String>) -> AudioContext {
    match AudioContext::open() {
        Ok(ctx) => ctx,
        Err(e) => {
            log::warn!("{}; continuing without audible output", e);
            *error = Some(e.to_string());
            AudioContext::headless(DEFAULT_SAMPLE_RATE)
        }
    }
}

impl Session {
    pub fn new(config: Config) -> Self {
        let palette = config.palette;
        let colormap = palette.colormap();
        let waterfall =
            LiveWaterfall::new(&config.waterfall, config.max_frequency_hz, colormap.clone());

        Self {
            audio: None,
            output_error: None,
            source: AnalysisSource::Idle,
            pump_buf: Vec::new(),
            last_pump: None,
            palette,
            colormap,
            waterfall,
            decoded: None,
            spectrogram: None,
            calibration: CalibrationSweep::new(config.calibration.clone()),
            config,
        }
    }

    /// Uses `ctx` instead of opening the output device.
    pub fn with_context(config: Config, ctx: AudioContext) -> Self {
        let mut session = Self::new(config);
        session.audio = Some(ctx);
        session
    }

    pub fn context(&self) -> Option<&AudioContext> {
        self.audio.as_ref()
    }

    /// Why the output device could not be opened, reported once.
    pub fn take_output_error(&mut self) -> Option<String> {
        self.output_error.take()
    }

    pub fn source(&self) -> &AnalysisSource {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut AnalysisSource {
        &mut self.source
    }

    pub fn palette(&self) -> Palette {
        self.palette
    }

    pub fn waterfall(&self) -> &LiveWaterfall {
        &self.waterfall
    }

    pub fn spectrogram(&self) -> Option<&StaticSpectrogram> {
        self.spectrogram.as_ref()
    }

    pub fn decoded(&self) -> Option<&DecodedTrack> {
        self.decoded.as_ref()
    }

    pub fn calibration(&self) -> &CalibrationSweep {
        &self.calibration
    }

    /// Decodes `track` and switches to it.
    ///
    /// A failed decode returns before anything is torn down.
    pub fn load_track(&mut self, track: &TrackHandle) -> Result<()> {
        let decoded = decode_track(track)?;
        self.load_decoded(decoded)
    }

    /// Renders the spectrogram of `decoded` and makes it the playing source.
    pub fn load_decoded(&mut self, decoded: DecodedTrack) -> Result<()> {
        self.calibration.cancel();
        self.waterfall.detach();
        let spectrogram = render_spectrogram(
            &decoded,
            self.config.max_frequency_hz,
            &self.config.analysis,
            &self.config.spectrogram,
            &self.colormap,
        );

        let ctx: &AudioContext = self
            .audio
            .get_or_insert_with(|| open_output(&mut self.output_error));
        let analysis = &self.config.analysis;
        let result = self
            .source
            .replace_with(|| FileSource::new(ctx, &decoded, analysis).map(AnalysisSource::File));

        match result {
            Ok(()) => {
                self.spectrogram = Some(spectrogram);
                self.decoded = Some(decoded);
                Ok(())
            }
            Err(e) => {
                self.spectrogram = None;
                self.decoded = None;
                Err(e)
            }
        }
    }

    /// Switches to the default microphone.
    pub fn start_live(&mut self) -> Result<()> {
        self.switch_to_live(LiveSource::start)
    }

    /// Switches to an already opened capture.
    pub fn start_live_with(&mut self, capture: Capture) -> Result<()> {
        self.switch_to_live(|ctx, analysis| LiveSource::new(ctx, capture, analysis))
    }

    fn switch_to_live<F>(&mut self, build: F) -> Result<()>
    where
        F: FnOnce(&AudioContext, &AnalysisConfig) -> Result<LiveSource>,
    {
        self.calibration.cancel();
        let ctx: &AudioContext = self
            .audio
            .get_or_insert_with(|| open_output(&mut self.output_error));
        let analysis = &self.config.analysis;
        let result = self
            .source
            .replace_with(|| build(ctx, analysis).map(AnalysisSource::Live));

        self.spectrogram = None;
        self.decoded = None;

        match result {
            Ok(()) => {
                self.waterfall.reset();
                self.waterfall.attach();
                Ok(())
            }
            Err(e) => {
                log::error!("{}", e);
                self.waterfall.detach();
                Err(e)
            }
        }
    }

    pub fn stop(&mut self) {
        self.calibration.cancel();
        self.waterfall.detach();
        self.source.teardown();
    }

    /// Swaps the colormap and re-renders the static image if there is one.
    pub fn set_palette(&mut self, palette: Palette) {
        self.palette = palette;
        self.colormap = palette.colormap();
        self.waterfall.set_colormap(self.colormap.clone());

        if let Some(decoded) = &self.decoded {
            self.spectrogram = Some(render_spectrogram(
                decoded,
                self.config.max_frequency_hz,
                &self.config.analysis,
                &self.config.spectrogram,
                &self.colormap,
            ));
        }
    }

    /// Starts the sweep on the open context; `false` without one or while
    /// a sweep is already running.
    pub fn start_calibration(&mut self, now: Instant) -> bool {
        let Some(ctx) = self.audio.as_ref() else {
            return false;
        };
        self.calibration
            .start(ctx, self.config.max_frequency_hz, now)
    }

    pub fn cancel_calibration(&mut self) {
        self.calibration.cancel();
    }

    /// Surface that a snapshot would capture in the current mode.
    pub fn surface(&self) -> Option<&Raster> {
        match &self.source {
            AnalysisSource::File(_) => self.spectrogram.as_ref().map(|s| &s.raster),
            AnalysisSource::Live(_) => Some(self.waterfall.surface()),
            AnalysisSource::Idle => None,
        }
    }

    pub fn snapshot<T>(&self, target: &mut T, timestamp_millis: u128) -> Result<SnapshotOutcome>
    where
        T: SaveTarget + ?Sized,
    {
        let label = self.source.label().unwrap_or_default();
        export_snapshot(self.surface(), label, timestamp_millis, target)
    }

    /// Advances a headless context by the wall time since the last tick.
    fn pump_headless(&mut self, now: Instant) {
        let Some(ctx) = self.audio.as_ref().filter(|ctx| ctx.is_headless()) else {
            return;
        };
        let Some(last) = self.last_pump.replace(now) else {
            return;
        };

        let rate = ctx.sample_rate() as usize;
        let frames = (now.saturating_duration_since(last).as_secs_f64() * rate as f64) as usize;
        self.pump_buf.clear();
        self.pump_buf.resize(frames.min(rate), 0.0);
        ctx.render(&mut self.pump_buf);
    }

    /// One scheduling step: audio clock, sweep indicator, one frame.
    pub fn step(&mut self, tick: Tick) -> StepReport {
        self.pump_headless(tick.at);
        let sweep = self.calibration.tick(tick.at);

        let frame = if self.waterfall.is_attached() {
            self.waterfall.tick(&mut self.source)
        } else {
            self.source.next_frame()
        };

        //
        // A capture failure is terminal; drawing stops on the first step
        // that sees it.
        //
        let mut failure = None;
        if let SourceStatus::Failed(reason) = self.source.status() {
            if self.waterfall.is_attached() {
                self.waterfall.detach();
                self.calibration.cancel();
                failure = Some(reason);
            }
        }

        StepReport {
            frame,
            sweep,
            failure,
        }
    }
}
