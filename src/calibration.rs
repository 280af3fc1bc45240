//! Calibration sweep: a stepped sine ramp played through the audio context.
//!
//! The tone follows the audio clock (its own sample counter) while the
//! on-screen target follows the wall clock. The two may drift slightly.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::{AudioContext, NodeHandle, Voice};
use crate::config::{display_max_frequency, CalibrationConfig};

/// Frequencies and timing of one sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSchedule {
    pub min_hz: f32,
    pub max_hz: f32,
    pub step_hz: f32,
    pub step_duration: Duration,
}

impl SweepSchedule {
    pub fn new(config: &CalibrationConfig, max_hz: f32) -> Self {
        Self {
            min_hz: config.min_hz,
            max_hz,
            step_hz: config.step_hz,
            step_duration: config.step_duration,
        }
    }

    /// `ceil((max - min) / step) + 1`; a range that is already closed has one step.
    pub fn step_count(&self) -> usize {
        if self.max_hz <= self.min_hz || self.step_hz <= 0.0 {
            return 1;
        }
        ((self.max_hz - self.min_hz) / self.step_hz).ceil() as usize + 1
    }

    /// Target of step `k`, never above the maximum.
    pub fn frequency(&self, step: usize) -> f32 {
        (self.min_hz + step as f32 * self.step_hz).min(self.max_hz)
    }

    pub fn final_frequency(&self) -> f32 {
        self.frequency(self.step_count() - 1)
    }

    pub fn total_duration(&self) -> Duration {
        self.step_duration * self.step_count() as u32
    }

    /// Step active after `elapsed`, or `None` once the sweep is over.
    pub fn step_at(&self, elapsed: Duration) -> Option<usize> {
        let step_nanos = self.step_duration.as_nanos().max(1);
        let step = elapsed.as_nanos() / step_nanos;
        if step >= self.step_count() as u128 {
            None
        } else {
            Some(step as usize)
        }
    }
}

/// Sine voice stepping through a schedule on the audio clock.
struct SweepVoice {
    schedule: SweepSchedule,
    steps: u64,
    samples_per_step: u64,
    rendered: u64,
    phase: f32,
    sample_rate: f32,
    amplitude: f32,
    finished: Arc<AtomicBool>,
}

impl SweepVoice {
    fn new(
        schedule: SweepSchedule,
        sample_rate: u32,
        amplitude: f32,
        finished: Arc<AtomicBool>,
    ) -> Self {
        let samples_per_step =
            (sample_rate as f64 * schedule.step_duration.as_secs_f64()).round().max(1.0) as u64;
        Self {
            steps: schedule.step_count() as u64,
            schedule,
            samples_per_step,
            rendered: 0,
            phase: 0.0,
            sample_rate: sample_rate as f32,
            amplitude,
            finished,
        }
    }
}

impl Voice for SweepVoice {
    fn render(&mut self, out: &mut [f32]) {
        for s in out.iter_mut() {
            let step = self.rendered / self.samples_per_step;
            if step >= self.steps {
                self.finished.store(true, Ordering::Release);
                return;
            }

            let freq = self.schedule.frequency(step as usize);
            *s += self.amplitude * self.phase.sin();

            self.phase += TAU * freq / self.sample_rate;
            if self.phase >= TAU {
                self.phase -= TAU;
            }
            self.rendered += 1;
        }
    }
}

/// What the UI shows about the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalibrationState {
    pub active: bool,
    pub current_target_frequency: f32,
    pub sweep_start: f32,
    pub sweep_end: f32,
}

/// Result of advancing the wall-clock indicator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SweepProgress {
    Idle,
    Running { target_hz: f32, step: usize },
    Completed { final_target_hz: f32 },
}

struct SweepRun {
    schedule: SweepSchedule,
    voice: NodeHandle,
    finished: Arc<AtomicBool>,
    started: Instant,
}

/// Idle -> Running -> Idle state machine driving the sweep tone.
pub struct CalibrationSweep {
    config: CalibrationConfig,
    state: CalibrationState,
    run: Option<SweepRun>,
}

impl CalibrationSweep {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            state: CalibrationState::default(),
            run: None,
        }
    }

    /// Connects the sweep tone to `ctx` and starts the indicator at `now`.
    ///
    /// Ignored (returns `false`) while a sweep is already running.
    pub fn start(&mut self, ctx: &AudioContext, max_display_hz: f32, now: Instant) -> bool {
        if self.run.is_some() {
            log::warn!("Calibration already running, ignoring start");
            return false;
        }

        let max_hz = display_max_frequency(max_display_hz, ctx.sample_rate() as f32);
        let schedule = SweepSchedule::new(&self.config, max_hz);
        let finished = Arc::new(AtomicBool::new(false));
        let voice = SweepVoice::new(
            schedule.clone(),
            ctx.sample_rate(),
            self.config.amplitude,
            finished.clone(),
        );
        let voice = ctx.connect(Box::new(voice));

        log::info!(
            "Calibration sweep {:.0}Hz -> {:.0}Hz in {} steps of {}ms",
            schedule.min_hz,
            schedule.max_hz,
            schedule.step_count(),
            schedule.step_duration.as_millis()
        );

        self.state = CalibrationState {
            active: true,
            current_target_frequency: schedule.min_hz,
            sweep_start: schedule.min_hz,
            sweep_end: schedule.max_hz,
        };
        self.run = Some(SweepRun {
            schedule,
            voice,
            finished,
            started: now,
        });
        true
    }

    /// Updates the target frequency from the time elapsed since `start`.
    pub fn tick(&mut self, now: Instant) -> SweepProgress {
        let Some(run) = self.run.as_ref() else {
            return SweepProgress::Idle;
        };

        let elapsed = now.saturating_duration_since(run.started);
        match run.schedule.step_at(elapsed) {
            Some(step) => {
                let target_hz = run.schedule.frequency(step);
                self.state.current_target_frequency = target_hz;
                SweepProgress::Running { target_hz, step }
            }
            None => {
                let final_target_hz = run.schedule.final_frequency();
                //
                // Report the final target before the tone goes away.
                //
                self.state.current_target_frequency = final_target_hz;
                self.state.active = false;

                if let Some(mut run) = self.run.take() {
                    log::info!(
                        "Calibration sweep complete at {:.0}Hz (tone finished: {})",
                        final_target_hz,
                        run.finished.load(Ordering::Acquire)
                    );
                    run.voice.disconnect();
                }
                SweepProgress::Completed { final_target_hz }
            }
        }
    }

    /// Stops the tone immediately.
    pub fn cancel(&mut self) {
        if let Some(mut run) = self.run.take() {
            run.voice.disconnect();
            log::info!(
                "Calibration sweep cancelled at {:.0}Hz",
                self.state.current_target_frequency
            );
        }
        self.state.active = false;
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn current_target_frequency(&self) -> f32 {
        self.state.current_target_frequency
    }

    /// Whether the tone has played its last step on the audio clock.
    pub fn tone_finished(&self) -> bool {
        self.run
            .as_ref()
            .map(|run| run.finished.load(Ordering::Acquire))
            .unwrap_or(false)
    }
}

impl Drop for CalibrationSweep {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_default_schedule() {
        let schedule = SweepSchedule::new(&CalibrationConfig::default(), 12_000.0);
        assert_eq!(schedule.step_count(), 61);
        assert_relative_eq!(schedule.frequency(0), 10.0);
        assert_relative_eq!(schedule.frequency(1), 210.0);
        assert_relative_eq!(schedule.final_frequency(), 12_000.0);
        assert_eq!(schedule.total_duration(), ms(61 * 50));

        let freqs: Vec<f32> = (0..schedule.step_count())
            .map(|k| schedule.frequency(k))
            .collect();
        assert!(freqs.windows(2).all(|w| w[0] < w[1]));
        assert!(freqs.iter().all(|&f| f <= 12_000.0));
    }

    #[test]
    fn test_step_at_elapsed_time() {
        let schedule = SweepSchedule::new(&CalibrationConfig::default(), 12_000.0);
        assert_eq!(schedule.step_at(ms(0)), Some(0));
        assert_eq!(schedule.step_at(ms(49)), Some(0));
        assert_eq!(schedule.step_at(ms(50)), Some(1));
        assert_eq!(schedule.step_at(ms(60 * 50 + 10)), Some(60));
        assert_eq!(schedule.step_at(ms(61 * 50)), None);
    }

    #[test]
    fn test_sweep_clamps_to_nyquist() {
        let ctx = AudioContext::headless(16_000);
        let mut sweep = CalibrationSweep::new(CalibrationConfig::default());
        assert!(sweep.start(&ctx, 12_000.0, Instant::now()));
        assert_relative_eq!(sweep.state().sweep_end, 8_000.0);
        assert_relative_eq!(sweep.state().sweep_start, 10.0);
    }

    #[test]
    fn test_start_is_not_reentrant() {
        let ctx = AudioContext::headless(44_100);
        let mut sweep = CalibrationSweep::new(CalibrationConfig::default());
        let t0 = Instant::now();

        assert!(sweep.start(&ctx, 12_000.0, t0));
        assert!(!sweep.start(&ctx, 12_000.0, t0));
        assert_eq!(ctx.connected_voices(), 1);
        assert!(sweep.state().active);

        sweep.cancel();
        assert!(!sweep.is_running());
        assert!(!sweep.state().active);
        assert_eq!(ctx.connected_voices(), 0);

        assert!(sweep.start(&ctx, 12_000.0, t0));
    }

    #[test]
    fn test_tick_follows_wall_clock_and_completes() {
        let ctx = AudioContext::headless(44_100);
        let mut sweep = CalibrationSweep::new(CalibrationConfig::default());
        let t0 = Instant::now();
        sweep.start(&ctx, 12_000.0, t0);

        assert_eq!(
            sweep.tick(t0),
            SweepProgress::Running {
                target_hz: 10.0,
                step: 0
            }
        );
        assert_eq!(
            sweep.tick(t0 + ms(120)),
            SweepProgress::Running {
                target_hz: 410.0,
                step: 2
            }
        );
        assert_relative_eq!(sweep.current_target_frequency(), 410.0);

        let done = sweep.tick(t0 + ms(61 * 50));
        assert_eq!(
            done,
            SweepProgress::Completed {
                final_target_hz: 12_000.0
            }
        );
        assert!(sweep.current_target_frequency() >= 12_000.0 - 200.0);
        assert!(!sweep.state().active);
        assert_eq!(ctx.connected_voices(), 0);

        assert_eq!(sweep.tick(t0 + ms(10_000)), SweepProgress::Idle);
    }

    #[test]
    fn test_tone_is_silent_after_last_step() {
        // Nyquist 4 kHz: 21 steps of 400 samples.
        let ctx = AudioContext::headless(8_000);
        let mut sweep = CalibrationSweep::new(CalibrationConfig::default());
        sweep.start(&ctx, 12_000.0, Instant::now());

        let mut block = vec![0.0f32; 21 * 400];
        ctx.render(&mut block);
        assert!(block.iter().any(|&s| s.abs() > 0.1));
        assert!(block.iter().all(|&s| s.abs() <= 0.25 + 1e-6));

        let mut tail = vec![0.0f32; 400];
        ctx.render(&mut tail);
        assert!(sweep.tone_finished());
        assert!(tail.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_drop_disconnects_tone() {
        let ctx = AudioContext::headless(44_100);
        {
            let mut sweep = CalibrationSweep::new(CalibrationConfig::default());
            sweep.start(&ctx, 12_000.0, Instant::now());
            assert_eq!(ctx.connected_voices(), 1);
        }
        assert_eq!(ctx.connected_voices(), 0);
    }
}
