//! End-to-end scenarios over a headless audio context.

use std::f32::consts::PI;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use ringbuf::HeapRb;

use sonoscope::audio::context::SampleProducer;
use sonoscope::audio::{decode_track, AudioContext, Capture, DecodedTrack};
use sonoscope::calibration::{CalibrationSweep, SweepProgress};
use sonoscope::colormap::Palette;
use sonoscope::config::Config;
use sonoscope::library::scan_folder;
use sonoscope::render::{render_spectrogram, LiveWaterfall};
use sonoscope::scheduler::{Scheduler, SyntheticTicks};
use sonoscope::snapshot::{export_snapshot, DirectorySaveTarget, SnapshotOutcome};
use sonoscope::source::{AnalysisSource, FileSource, FrameSource, LiveSource};

fn scratch_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sonoscope-{}-{}", name, std::process::id()))
}

fn write_two_tone_wav(path: &std::path::Path, rate: u32, secs: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..rate * secs {
        let t = i as f32 / rate as f32;
        let s = 0.4 * (2.0 * PI * 1_000.0 * t).sin() + 0.4 * (2.0 * PI * 15_000.0 * t).sin();
        writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn fake_capture(rate: u32) -> (SampleProducer, Capture) {
    let (producer, consumer) = HeapRb::<f32>::new(1 << 16).split();
    (producer, Capture::from_consumer(consumer, rate, "test mic"))
}

#[test]
fn test_ten_second_track_renders_full_extent() {
    let dir = scratch_dir("library");
    std::fs::create_dir_all(&dir).unwrap();
    write_two_tone_wav(&dir.join("two-tone.wav"), 44_100, 10);
    std::fs::write(dir.join("notes.txt"), b"not audio").unwrap();

    let tracks = scan_folder(&dir).unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].mime_type, "audio/wav");

    let decoded = decode_track(&tracks[0]).unwrap();
    assert_eq!(decoded.sample_rate, 44_100);
    assert_relative_eq!(decoded.duration_secs(), 10.0, epsilon = 1e-3);

    let config = Config::default();
    let colormap = Palette::Inferno.colormap();
    let spectrogram = render_spectrogram(
        &decoded,
        config.max_frequency_hz,
        &config.analysis,
        &config.spectrogram,
        &colormap,
    );

    assert_relative_eq!(spectrogram.duration_secs, 10.0, epsilon = 1e-3);
    assert_eq!(spectrogram.max_frequency_hz, 12_000.0);
    assert_eq!(spectrogram.raster.height(), 558);
    assert_eq!(spectrogram.raster.width(), 431);

    //
    // The 15 kHz tone lies above the top row and must not leak into it.
    // Only columns whose window is entirely inside the track are checked.
    //
    let [r, g, b] = colormap.lookup(0);
    let full_columns = (decoded.samples.len() - config.analysis.fft_size) / spectrogram.hop;
    for x in 0..full_columns {
        assert_eq!(spectrogram.raster.pixel(x, 0), [r, g, b, 255], "column {}", x);
    }

    // 1 kHz sits around bin 46, i.e. row 557 - 46.
    let [r, g, b] = colormap.lookup(255);
    let lit = (505..=515).any(|y| spectrogram.raster.pixel(100, y) == [r, g, b, 255]);
    assert!(lit);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_switching_file_to_live_releases_graph_first() {
    let ctx = AudioContext::headless(44_100);
    let config = Config::default();
    let track = DecodedTrack::new("tone.wav", vec![0.1; 44_100], 44_100);

    let mut source =
        AnalysisSource::File(FileSource::new(&ctx, &track, &config.analysis).unwrap());
    assert_eq!(ctx.connected_voices(), 1);
    assert!(ctx.has_monitor());

    let (_mic, capture) = fake_capture(44_100);
    source
        .replace_with(|| {
            assert_eq!(ctx.connected_voices(), 0);
            assert!(!ctx.has_monitor());
            LiveSource::new(&ctx, capture, &config.analysis).map(AnalysisSource::Live)
        })
        .unwrap();

    assert_eq!(source.label(), Some("live"));
    assert!(ctx.has_monitor());
    assert_eq!(ctx.connected_voices(), 0);
}

#[test]
fn test_snapshot_without_source_is_silently_ignored() {
    let dir = scratch_dir("no-surface");
    let source = AnalysisSource::default();
    let mut target = DirectorySaveTarget::new(&dir);

    let outcome = export_snapshot(None, source.label().unwrap_or_default(), 1, &mut target).unwrap();
    assert_eq!(outcome, SnapshotOutcome::NoSurfaceAttached);
    assert!(!dir.exists());
}

#[test]
fn test_calibration_sweep_through_live_waterfall() {
    let ctx = AudioContext::headless(44_100);
    let config = Config::default();
    let (mut mic, capture) = fake_capture(44_100);
    let mut source =
        AnalysisSource::Live(LiveSource::new(&ctx, capture, &config.analysis).unwrap());

    let mut waterfall = LiveWaterfall::new(
        &config.waterfall,
        config.max_frequency_hz,
        Palette::Heatmap.colormap(),
    );
    waterfall.attach();

    let mut sweep = CalibrationSweep::new(config.calibration.clone());
    let t0 = Instant::now();
    assert!(sweep.start(&ctx, config.max_frequency_hz, t0));
    assert_eq!(ctx.connected_voices(), 1);

    let interval = Duration::from_millis(50);
    let mut scheduler = Scheduler::new(SyntheticTicks::every(t0, interval, 70));

    //
    // Each tick renders one step of audio and feeds as much silent
    // microphone input, so the tone reaches analysis through the monitor.
    //
    let mut block = vec![0.0f32; 2_205];
    let silence = vec![0.0f32; 2_205];
    let mut targets = Vec::new();
    let mut levels = Vec::new();
    let mut completed = None;

    let ran = scheduler.drive(|tick| {
        ctx.render(&mut block);
        mic.push_slice(&silence);

        match sweep.tick(tick.at) {
            SweepProgress::Running { target_hz, .. } => targets.push(target_hz),
            SweepProgress::Completed { final_target_hz } => completed = Some(final_target_hz),
            SweepProgress::Idle => {}
        }

        waterfall.tick(&mut source);
        levels.push(waterfall.signal_level());
    });

    assert_eq!(ran, 70);
    assert_eq!(targets.len(), 61);
    assert!(targets.windows(2).all(|w| w[0] < w[1]));
    assert_relative_eq!(targets[0], 10.0);
    assert!(targets.iter().all(|&f| f <= 12_000.0));

    let final_target = completed.unwrap();
    assert!(final_target >= 11_990.0);
    assert!(!sweep.is_running());
    assert_eq!(ctx.connected_voices(), 0);

    // Early steps are low tones, inside the level-meter bins.
    assert!(levels[..5].iter().all(|&level| level > 0.0));
    assert_eq!(waterfall.columns_drawn(), 70);
    assert!(source.next_frame().is_some());
}
