pub mod analyser;

use lazy_static::lazy_static;
use num_complex::Complex32;
use parking_lot::Mutex;
use rustfft::FftPlanner;
use std::collections::HashMap;
use std::f32::consts::PI;
use std::sync::Arc;

pub use analyser::{Analyser, SpectralFrame};

/// Forward transform interface shared by every analysis path.
pub trait Transform: Send + Sync {
    /// In-place forward transform of exactly `size()` values.
    fn process(&self, buffer: &mut [Complex32]);

    fn name(&self) -> String;
    fn size(&self) -> usize;
}

/// Forward plan backed by rustfft's planner.
struct PlannedFft {
    n: usize,
    fft: Arc<dyn rustfft::Fft<f32>>,
}

impl Transform for PlannedFft {
    fn process(&self, buffer: &mut [Complex32]) {
        self.fft.process(buffer);
    }

    fn name(&self) -> String {
        format!("rustfft<{}>", self.n)
    }

    fn size(&self) -> usize {
        self.n
    }
}

lazy_static! {
    static ref PLAN_CACHE: Mutex<HashMap<usize, Arc<dyn Transform>>> = Mutex::new(HashMap::new());
    static ref PLANNER: Mutex<FftPlanner<f32>> = Mutex::new(FftPlanner::new());
}

/// Returns the forward plan for size `n`, building it once per process.
pub fn find_transform(n: usize) -> Arc<dyn Transform> {
    // Cached plan lookup.
    {
        let cache = PLAN_CACHE.lock();
        if let Some(plan) = cache.get(&n) {
            return plan.clone();
        }
    }

    log::debug!("Planning forward FFT for N={}", n);
    let fft = PLANNER.lock().plan_fft_forward(n);
    let plan: Arc<dyn Transform> = Arc::new(PlannedFft { n, fft });

    let mut cache = PLAN_CACHE.lock();
    cache.entry(n).or_insert(plan).clone()
}

/// Hann window coefficient for `index` in a window of `size` samples.
pub fn hann_window(index: usize, size: usize) -> f32 {
    0.5 * (1.0 - (2.0 * PI * index as f32 / (size as f32 - 1.0)).cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::Zero;

    #[test]
    fn test_plans_are_cached() {
        let a = find_transform(512);
        let b = find_transform(512);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.size(), 512);
        assert_eq!(a.name(), "rustfft<512>");
    }

    #[test]
    fn test_hann_window() {
        let size = 1024;

        // Zero at the edges, one in the middle.
        assert!(hann_window(0, size).abs() < 0.01);
        assert!(hann_window(size - 1, size).abs() < 0.01);
        assert!((hann_window(size / 2, size) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_transform_of_impulse_is_flat() {
        let plan = find_transform(64);
        let mut buf = vec![Complex32::zero(); 64];
        buf[0] = Complex32::new(1.0, 0.0);
        plan.process(&mut buf);
        for c in &buf {
            assert!((c.norm() - 1.0).abs() < 1e-5);
        }
    }
}
