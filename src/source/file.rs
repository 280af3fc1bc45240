use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::{resample_channel, AudioContext, DecodedTrack, MonitorTap, NodeHandle, Voice};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::fft::analyser::RollingSpectrum;
use crate::fft::SpectralFrame;

/// Playback cursor shared between the UI and the audio callback.
pub struct PlaybackState {
    /// Position in track frames.
    position: AtomicU64,
    playing: AtomicBool,
    length: u64,
}

impl PlaybackState {
    fn new(length: u64) -> Self {
        Self {
            position: AtomicU64::new(0),
            playing: AtomicBool::new(false),
            length,
        }
    }

    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }
}

/// Plays a track, already at the context rate, into the bus.
struct PlaybackVoice {
    samples: Arc<[f32]>,
    state: Arc<PlaybackState>,
}

impl Voice for PlaybackVoice {
    fn render(&mut self, out: &mut [f32]) {
        if !self.state.is_playing() {
            return;
        }

        let start = self.state.position();
        let len = self.state.length;
        let begin = start.min(len) as usize;
        let end = (begin + out.len()).min(len as usize);

        for (s, &x) in out.iter_mut().zip(self.samples[begin..end].iter()) {
            *s += x;
        }
        if end as u64 >= len {
            self.state.playing.store(false, Ordering::Release);
        }

        //
        // A seek during this block wins over the advanced cursor.
        //
        let _ = self.state.position.compare_exchange(
            start,
            end as u64,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Decoded track playing through the context, analysed from what is heard.
pub struct FileSource {
    track_name: String,
    /// Rate of the played samples, i.e. the context rate.
    playback_rate: u32,
    state: Arc<PlaybackState>,
    voice: NodeHandle,
    monitor: MonitorTap,
    spectrum: RollingSpectrum,
}

impl FileSource {
    /// Connects the track to the context and starts playback from the top.
    ///
    /// The track is converted to the context rate once, up front.
    pub fn new(ctx: &AudioContext, track: &DecodedTrack, config: &AnalysisConfig) -> Result<Self> {
        let playback_rate = ctx.sample_rate();
        let samples: Arc<[f32]> = if track.sample_rate == playback_rate {
            track.samples.clone()
        } else {
            resample_channel(&track.samples, track.sample_rate, playback_rate)?.into()
        };

        let state = Arc::new(PlaybackState::new(samples.len() as u64));
        let voice = PlaybackVoice {
            samples,
            state: state.clone(),
        };

        let monitor = ctx.attach_monitor(config.fft_size * 8);
        let voice = ctx.connect(Box::new(voice));
        state.playing.store(true, Ordering::Release);

        log::info!(
            "File source '{}' attached ({}Hz track, {}Hz context)",
            track.name,
            track.sample_rate,
            playback_rate
        );

        Ok(Self {
            track_name: track.name.clone(),
            playback_rate,
            state,
            voice,
            monitor,
            spectrum: RollingSpectrum::new(config, playback_rate as f32),
        })
    }

    pub fn track_name(&self) -> &str {
        &self.track_name
    }

    pub fn bin_count(&self) -> usize {
        self.spectrum.bin_count()
    }

    pub fn play(&mut self) {
        if self.state.position() >= self.state.length {
            self.state.position.store(0, Ordering::Release);
        }
        self.state.playing.store(true, Ordering::Release);
    }

    pub fn pause(&mut self) {
        self.state.playing.store(false, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// Moves the playback cursor; frames follow once the monitor refills.
    pub fn seek(&mut self, secs: f32) {
        let frame = (secs.max(0.0) as f64 * self.playback_rate as f64) as u64;
        self.state
            .position
            .store(frame.min(self.state.length), Ordering::Release);
        log::debug!("Seek '{}' to {:.2}s", self.track_name, secs);
    }

    pub fn position_secs(&self) -> f32 {
        self.state.position() as f32 / self.playback_rate as f32
    }

    pub fn duration_secs(&self) -> f32 {
        self.state.length as f32 / self.playback_rate as f32
    }

    pub fn next_frame(&mut self) -> SpectralFrame {
        while let Some(sample) = self.monitor.pop() {
            self.spectrum.push(sample);
        }
        self.spectrum.latest().clone()
    }

    /// Silences the voice and removes it and the monitor from the bus.
    pub fn teardown(&mut self) {
        self.pause();
        self.voice.disconnect();
        self.monitor.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::max_frequency_index;
    use std::f32::consts::PI;

    fn tone(freq: f32, rate: u32, secs: f32) -> DecodedTrack {
        let len = (rate as f32 * secs) as usize;
        let samples = (0..len)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / rate as f32).sin())
            .collect();
        DecodedTrack::new("tone.wav", samples, rate)
    }

    fn peak_bin(frame: &SpectralFrame) -> usize {
        frame
            .magnitudes
            .iter()
            .enumerate()
            .max_by_key(|(_, &m)| m)
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_playback_feeds_analysis() {
        let ctx = AudioContext::headless(44_100);
        let config = AnalysisConfig::default();
        let mut source = FileSource::new(&ctx, &tone(2_000.0, 44_100, 1.0), &config).unwrap();

        let mut block = vec![0.0f32; 4096];
        ctx.render(&mut block);

        assert_eq!(source.bin_count(), 1024);
        let frame = source.next_frame();
        let expected = (2_000.0 / frame.nyquist() * frame.bin_count() as f32).round() as usize;
        assert!((peak_bin(&frame) as isize - expected as isize).abs() <= 2);
        assert!(source.position_secs() > 0.09);
    }

    #[test]
    fn test_repeated_reads_without_audio_are_identical() {
        let ctx = AudioContext::headless(44_100);
        let config = AnalysisConfig::default();
        let mut source = FileSource::new(&ctx, &tone(440.0, 44_100, 1.0), &config).unwrap();

        let mut block = vec![0.0f32; 2048];
        ctx.render(&mut block);

        let a = source.next_frame();
        let b = source.next_frame();
        assert_eq!(a, b);
    }

    #[test]
    fn test_seek_and_end_of_track() {
        let ctx = AudioContext::headless(8_000);
        let config = AnalysisConfig::default();
        let mut source = FileSource::new(&ctx, &tone(440.0, 8_000, 1.0), &config).unwrap();

        source.seek(0.75);
        assert!((source.position_secs() - 0.75).abs() < 1e-3);

        let mut block = vec![0.0f32; 4_000];
        ctx.render(&mut block);
        assert!(!source.is_playing());
        assert_eq!(source.position_secs(), source.duration_secs());

        // Playing again restarts from the top.
        source.play();
        assert!(source.is_playing());
        assert_eq!(source.position_secs(), 0.0);
    }

    #[test]
    fn test_resamples_to_context_rate() {
        let ctx = AudioContext::headless(44_100);
        let config = AnalysisConfig::default();
        let source = FileSource::new(&ctx, &tone(440.0, 22_050, 1.0), &config).unwrap();
        assert!((source.duration_secs() - 1.0).abs() < 1e-3);

        let mut block = vec![0.0f32; 4_410];
        ctx.render(&mut block);
        // 0.1s of output consumes 0.1s of track.
        assert!((source.position_secs() - 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_ultrasonic_content_does_not_fold_into_axis() {
        let ctx = AudioContext::headless(44_100);
        let config = AnalysisConfig {
            smoothing: 0.0,
            ..AnalysisConfig::default()
        };
        let mut source = FileSource::new(&ctx, &tone(35_000.0, 96_000, 1.0), &config).unwrap();

        let mut block = vec![0.0f32; 8_192];
        ctx.render(&mut block);
        let frame = source.next_frame();

        //
        // Folded back at 44.1 kHz this tone would land near 9.1 kHz.
        //
        let top = max_frequency_index(12_000.0, 44_100.0, frame.bin_count());
        let loudest = frame.magnitudes[..=top].iter().copied().max().unwrap();
        assert!(loudest < 40, "peak {} inside the axis", loudest);
    }

    #[test]
    fn test_frames_follow_seek() {
        let rate = 44_100;
        let mut samples = tone(500.0, rate, 1.0).samples.to_vec();
        samples.extend_from_slice(&tone(3_000.0, rate, 1.0).samples);
        let track = DecodedTrack::new("two-part.wav", samples, rate);

        let ctx = AudioContext::headless(rate);
        let config = AnalysisConfig {
            smoothing: 0.0,
            ..AnalysisConfig::default()
        };
        let mut source = FileSource::new(&ctx, &track, &config).unwrap();
        let mut block = vec![0.0f32; 4_096];

        ctx.render(&mut block);
        let frame = source.next_frame();
        assert!((peak_bin(&frame) as isize - 23).abs() <= 2);

        source.seek(1.5);
        block.fill(0.0);
        ctx.render(&mut block);
        let frame = source.next_frame();
        assert!((peak_bin(&frame) as isize - 139).abs() <= 2);
    }

    #[test]
    fn test_teardown_releases_graph() {
        let ctx = AudioContext::headless(44_100);
        let config = AnalysisConfig::default();
        let mut source = FileSource::new(&ctx, &tone(440.0, 44_100, 1.0), &config).unwrap();
        assert_eq!(ctx.connected_voices(), 1);
        assert!(ctx.has_monitor());

        source.teardown();
        assert_eq!(ctx.connected_voices(), 0);
        assert!(!ctx.has_monitor());
        assert!(!source.is_playing());

        let mut block = vec![1.0f32; 256];
        ctx.render(&mut block);
        assert!(block.iter().all(|&s| s == 0.0));
    }
}
