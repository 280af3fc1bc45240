//! Frequency analysis sources.
//!
//! Exactly one source is active at a time. Switching goes through
//! [`AnalysisSource::replace_with`], which releases the old source's audio
//! graph before the next one is constructed.

pub mod file;
pub mod live;

pub use file::FileSource;
pub use live::{Gain, LiveSource};

use crate::error::Result;
use crate::fft::SpectralFrame;

/// Anything a renderer can pull spectral frames from.
pub trait FrameSource {
    /// Latest frame; never blocks. Without new audio the previous
    /// magnitudes are returned unchanged.
    fn next_frame(&mut self) -> Option<SpectralFrame>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceStatus {
    Idle,
    Running,
    /// Terminal; the source must be rebuilt.
    Failed(String),
}

/// The active input: nothing, a decoded file, or the microphone.
#[derive(Default)]
pub enum AnalysisSource {
    #[default]
    Idle,
    File(FileSource),
    Live(LiveSource),
}

impl AnalysisSource {
    pub fn is_idle(&self) -> bool {
        matches!(self, AnalysisSource::Idle)
    }

    pub fn status(&self) -> SourceStatus {
        match self {
            AnalysisSource::Idle => SourceStatus::Idle,
            AnalysisSource::File(_) => SourceStatus::Running,
            AnalysisSource::Live(live) => live.status(),
        }
    }

    /// Name used in snapshot filenames: the track name or `live`.
    pub fn label(&self) -> Option<&str> {
        match self {
            AnalysisSource::Idle => None,
            AnalysisSource::File(file) => Some(file.track_name()),
            AnalysisSource::Live(_) => Some("live"),
        }
    }

    pub fn as_file_mut(&mut self) -> Option<&mut FileSource> {
        match self {
            AnalysisSource::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_live_mut(&mut self) -> Option<&mut LiveSource> {
        match self {
            AnalysisSource::Live(live) => Some(live),
            _ => None,
        }
    }

    /// Stops frame production and releases the audio graph, leaving `Idle`.
    pub fn teardown(&mut self) {
        match std::mem::take(self) {
            AnalysisSource::Idle => {}
            AnalysisSource::File(mut file) => {
                file.teardown();
                log::info!("File source '{}' torn down", file.track_name());
            }
            AnalysisSource::Live(mut live) => {
                live.teardown();
                log::info!("Live source on '{}' torn down", live.device_name());
            }
        }
    }

    /// Tears down the current source, then builds and installs the next one.
    ///
    /// On error the source stays `Idle`.
    pub fn replace_with<F>(&mut self, build: F) -> Result<()>
    where
        F: FnOnce() -> Result<AnalysisSource>,
    {
        self.teardown();
        *self = build()?;
        Ok(())
    }
}

impl FrameSource for AnalysisSource {
    fn next_frame(&mut self) -> Option<SpectralFrame> {
        match self {
            AnalysisSource::Idle => None,
            AnalysisSource::File(file) => Some(file.next_frame()),
            AnalysisSource::Live(live) => live.next_frame(),
        }
    }
}
