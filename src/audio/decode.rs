use std::path::Path;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{AnalyzerError, Result};
use crate::library::TrackHandle;

/// Fully decoded mono signal.
#[derive(Clone)]
pub struct DecodedTrack {
    pub name: String,
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

impl std::fmt::Debug for DecodedTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedTrack")
            .field("name", &self.name)
            .field("samples", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl DecodedTrack {
    pub fn new(name: impl Into<String>, samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decodes a track into mono samples; channels are averaged.
pub fn decode_track(track: &TrackHandle) -> Result<DecodedTrack> {
    let fail = |reason: String| AnalyzerError::DecodeFailure {
        track: track.name.clone(),
        reason,
    };

    let (samples, sample_rate) = decode_path(&track.path).map_err(fail)?;

    log::info!(
        "Decoded '{}': {} samples @ {}Hz ({:.1}s)",
        track.name,
        samples.len(),
        sample_rate,
        samples.len() as f32 / sample_rate as f32
    );

    Ok(DecodedTrack::new(track.name.clone(), samples, sample_rate))
}

fn decode_path(path: &Path) -> std::result::Result<(Vec<f32>, u32), String> {
    let file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| format!("unsupported format: {}", e))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| "no audio track found".to_string())?
        .clone();

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| "unknown sample rate".to_string())?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("no decoder: {}", e))?;

    let mut mono = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(format!("error reading packet: {}", e)),
        };

        if packet.track_id() != track.id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(format!("decode error: {}", e)),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        for frame in sample_buf.samples().chunks_exact(channels) {
            mono.push(frame.iter().sum::<f32>() / channels as f32);
        }
    }

    if mono.is_empty() {
        return Err("no audio samples decoded".to_string());
    }

    Ok((mono, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_file_is_decode_failure() {
        let handle = TrackHandle {
            name: "missing.wav".into(),
            byte_size: 0,
            mime_type: "audio/wav".into(),
            path: PathBuf::from("/definitely/not/here/missing.wav"),
        };
        match decode_track(&handle) {
            Err(AnalyzerError::DecodeFailure { track, .. }) => assert_eq!(track, "missing.wav"),
            other => panic!("expected decode failure, got {:?}", other),
        }
    }

    #[test]
    fn test_duration() {
        let track = DecodedTrack::new("t", vec![0.0; 22_050], 44_100);
        assert!((track.duration_secs() - 0.5).abs() < 1e-6);
    }
}
