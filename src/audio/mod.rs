pub mod capture;
pub mod context;
pub mod decode;
pub mod resample;

pub use capture::{start_capture, Capture};
pub use context::{AudioContext, MonitorTap, NodeHandle, Voice, DEFAULT_SAMPLE_RATE};
pub use decode::{decode_track, DecodedTrack};
pub use resample::{resample_channel, StreamResampler};
