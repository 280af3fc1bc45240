//! Tick scheduling for the cooperative UI loop.
//!
//! A tick source decides when the next step runs; the step itself is a plain
//! closure. The GUI arms one tick per display refresh, tests feed synthetic
//! instants.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Zero-based position in the tick stream.
    pub seq: u64,
    pub at: Instant,
}

pub trait TickSource {
    /// Next due tick, if any.
    fn poll(&mut self) -> Option<Tick>;
}

/// One tick per display refresh; refreshes that arrive before the tick ran
/// are coalesced.
#[derive(Debug, Default)]
pub struct RefreshTicks {
    armed: Option<Instant>,
    seq: u64,
}

impl RefreshTicks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_refresh(&mut self, now: Instant) {
        self.armed = Some(now);
    }
}

impl TickSource for RefreshTicks {
    fn poll(&mut self) -> Option<Tick> {
        let at = self.armed.take()?;
        let tick = Tick { seq: self.seq, at };
        self.seq += 1;
        Some(tick)
    }
}

/// Pre-recorded instants, drained in order.
#[derive(Debug, Default)]
pub struct SyntheticTicks {
    pending: VecDeque<Instant>,
    seq: u64,
}

impl SyntheticTicks {
    pub fn new() -> Self {
        Self::default()
    }

    /// `count` ticks spaced by `interval`, the first at `start`.
    pub fn every(start: Instant, interval: Duration, count: usize) -> Self {
        let mut ticks = Self::new();
        for i in 0..count {
            ticks.push(start + interval * i as u32);
        }
        ticks
    }

    pub fn push(&mut self, at: Instant) {
        self.pending.push_back(at);
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl TickSource for SyntheticTicks {
    fn poll(&mut self) -> Option<Tick> {
        let at = self.pending.pop_front()?;
        let tick = Tick { seq: self.seq, at };
        self.seq += 1;
        Some(tick)
    }
}

/// Runs a step function for every tick its source yields.
pub struct Scheduler<T: TickSource> {
    source: T,
    executed: u64,
}

impl<T: TickSource> Scheduler<T> {
    pub fn new(source: T) -> Self {
        Self {
            source,
            executed: 0,
        }
    }

    pub fn ticks_mut(&mut self) -> &mut T {
        &mut self.source
    }

    /// Runs `step` for each due tick, each to completion, and returns how many ran.
    pub fn drive<F>(&mut self, mut step: F) -> usize
    where
        F: FnMut(Tick),
    {
        let mut ran = 0;
        while let Some(tick) = self.source.poll() {
            step(tick);
            ran += 1;
        }
        self.executed += ran as u64;
        ran
    }

    pub fn executed(&self) -> u64 {
        self.executed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_ticks_coalesce() {
        let mut scheduler = Scheduler::new(RefreshTicks::new());
        let t0 = Instant::now();

        scheduler.ticks_mut().on_refresh(t0);
        scheduler.ticks_mut().on_refresh(t0 + Duration::from_millis(5));

        let mut seen = Vec::new();
        assert_eq!(scheduler.drive(|tick| seen.push(tick)), 1);
        assert_eq!(
            seen,
            vec![Tick {
                seq: 0,
                at: t0 + Duration::from_millis(5)
            }]
        );

        assert_eq!(scheduler.drive(|_| {}), 0);

        scheduler.ticks_mut().on_refresh(t0 + Duration::from_millis(16));
        scheduler.drive(|tick| seen.push(tick));
        assert_eq!(seen[1].seq, 1);
        assert_eq!(scheduler.executed(), 2);
    }

    #[test]
    fn test_synthetic_ticks_run_in_order() {
        let t0 = Instant::now();
        let interval = Duration::from_millis(10);
        let mut scheduler = Scheduler::new(SyntheticTicks::every(t0, interval, 4));

        let mut at = Vec::new();
        assert_eq!(scheduler.drive(|tick| at.push((tick.seq, tick.at))), 4);
        assert_eq!(
            at,
            vec![
                (0, t0),
                (1, t0 + interval),
                (2, t0 + interval * 2),
                (3, t0 + interval * 3),
            ]
        );
        assert_eq!(scheduler.ticks_mut().remaining(), 0);
    }
}
