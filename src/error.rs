use std::fmt;

/// Error type shared by every fallible operation of the analyzer.
///
/// All variants are recoverable: the session keeps running and the user may
/// retry by picking another track or requesting capture again.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    /// The selected track could not be opened or decoded.
    DecodeFailure { track: String, reason: String },
    /// Microphone permission refused or no usable input device.
    CaptureDenied(String),
    /// No usable output device for the shared audio context.
    AudioOutput(String),
    /// Encoding or saving a snapshot failed.
    Snapshot(String),
    /// Invalid configuration value or colormap keyframes.
    Config(String),
    /// Sample rate conversion could not be set up or failed mid-stream.
    Resample(String),
}

impl fmt::Display for AnalyzerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyzerError::DecodeFailure { track, reason } => {
                write!(f, "could not decode '{}': {}", track, reason)
            }
            AnalyzerError::CaptureDenied(reason) => {
                write!(f, "microphone unavailable: {}", reason)
            }
            AnalyzerError::AudioOutput(reason) => write!(f, "audio output unavailable: {}", reason),
            AnalyzerError::Snapshot(reason) => write!(f, "snapshot failed: {}", reason),
            AnalyzerError::Config(reason) => write!(f, "invalid configuration: {}", reason),
            AnalyzerError::Resample(reason) => write!(f, "resampling failed: {}", reason),
        }
    }
}

impl std::error::Error for AnalyzerError {}

impl From<image::ImageError> for AnalyzerError {
    fn from(e: image::ImageError) -> Self {
        AnalyzerError::Snapshot(e.to_string())
    }
}

impl From<rubato::ResamplerConstructionError> for AnalyzerError {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        AnalyzerError::Resample(e.to_string())
    }
}

impl From<rubato::ResampleError> for AnalyzerError {
    fn from(e: rubato::ResampleError) -> Self {
        AnalyzerError::Resample(e.to_string())
    }
}

impl From<std::io::Error> for AnalyzerError {
    fn from(e: std::io::Error) -> Self {
        AnalyzerError::Snapshot(e.to_string())
    }
}

/// Convenience alias so callers can write `Result<T>` instead of `Result<T, AnalyzerError>`.
pub type Result<T> = std::result::Result<T, AnalyzerError>;
