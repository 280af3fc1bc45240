//! Spectrum analyzer: static spectrograms of audio files, a live microphone
//! waterfall and a calibration sweep, with PNG snapshots of either view.

pub mod audio;
pub mod calibration;
pub mod colormap;
pub mod config;
pub mod error;
pub mod fft;
pub mod gui;
pub mod library;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod source;

pub use error::{AnalyzerError, Result};
