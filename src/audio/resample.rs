//! Sample rate conversion between track, output and input clocks.

use rubato::{
    FftFixedIn, Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

use crate::error::Result;

const CHUNK_SIZE: usize = 1024;

/// Converts a whole mono buffer from `from_rate` to `to_rate`.
///
/// Band-limited sinc interpolation; the filter delay is trimmed so sample `i`
/// of the output lines up with time `i / to_rate` of the input.
pub fn resample_channel(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_SIZE, 1)?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(expected + delay + CHUNK_SIZE);

    for chunk in samples.chunks(CHUNK_SIZE) {
        let result = if chunk.len() == CHUNK_SIZE {
            resampler.process(&[chunk], None)?
        } else {
            resampler.process_partial(Some(&[chunk]), None)?
        };
        output.extend_from_slice(&result[0]);
    }

    //
    // Flush the filter tail until the delayed signal is complete.
    //
    while output.len() < expected + delay {
        let result = resampler.process_partial(None::<&[&[f32]]>, None)?;
        if result[0].is_empty() {
            break;
        }
        output.extend_from_slice(&result[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);

    log::debug!(
        "Resampled {} samples {}Hz -> {} samples {}Hz",
        samples.len(),
        from_rate,
        output.len(),
        to_rate
    );
    Ok(output)
}

/// Incremental converter for a continuous stream such as the monitor tap.
pub struct StreamResampler {
    inner: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    /// Passes samples through untouched when the rates already match.
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        let inner = if from_rate == to_rate {
            None
        } else {
            log::info!("Resampling stream {}Hz -> {}Hz", from_rate, to_rate);
            Some(FftFixedIn::<f32>::new(
                from_rate as usize,
                to_rate as usize,
                CHUNK_SIZE / 2,
                2,
                1,
            )?)
        };
        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    /// Feeds `input` and appends every completed output sample to `out`.
    ///
    /// Input shorter than the converter's chunk is held until more arrives.
    pub fn process<E>(&mut self, input: &[f32], out: &mut E) -> Result<()>
    where
        E: Extend<f32>,
    {
        let Some(resampler) = self.inner.as_mut() else {
            out.extend(input.iter().copied());
            return Ok(());
        };

        self.pending.extend_from_slice(input);
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let result = resampler.process(&[&self.pending[..needed]], None)?;
            out.extend(result[0].iter().copied());
            self.pending.drain(..needed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    /// Zero crossings per second, a rough frequency estimate.
    fn crossing_rate(samples: &[f32], rate: u32) -> f32 {
        let crossings = samples
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count();
        crossings as f32 / 2.0 / (samples.len() as f32 / rate as f32)
    }

    #[test]
    fn test_same_rate_is_identity() {
        let input = sine(440.0, 44_100, 1000);
        assert_eq!(resample_channel(&input, 44_100, 44_100).unwrap(), input);
    }

    #[test]
    fn test_output_length_follows_ratio() {
        let input = sine(440.0, 22_050, 22_050);
        let output = resample_channel(&input, 22_050, 44_100).unwrap();
        assert_eq!(output.len(), 44_100);
    }

    #[test]
    fn test_tone_keeps_its_frequency() {
        let input = sine(1_000.0, 48_000, 48_000);
        let output = resample_channel(&input, 48_000, 44_100).unwrap();
        let steady = &output[4_410..output.len() - 4_410];
        assert!((crossing_rate(steady, 44_100) - 1_000.0).abs() < 5.0);
    }

    #[test]
    fn test_stream_resampler_passthrough() {
        let mut stream = StreamResampler::new(44_100, 44_100).unwrap();
        let mut out = Vec::new();
        stream.process(&[0.1, 0.2], &mut out).unwrap();
        assert_eq!(out, vec![0.1, 0.2]);
    }

    #[test]
    fn test_stream_resampler_converts_in_pieces() {
        let input = sine(2_000.0, 44_100, 44_100);
        let mut stream = StreamResampler::new(44_100, 48_000).unwrap();
        let mut out = Vec::new();
        for piece in input.chunks(700) {
            stream.process(piece, &mut out).unwrap();
        }

        // Everything except the held remainder comes out at the new rate.
        assert!(out.len() > 46_000 && out.len() <= 48_000);
        let steady = &out[4_800..out.len() - 4_800];
        assert!((crossing_rate(steady, 48_000) - 2_000.0).abs() < 10.0);
    }
}
