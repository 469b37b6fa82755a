//! Capture Pipeline
//!
//! Records the master output of a session and encodes it into a
//! downloadable artifact that also feeds the frequency verifier.

pub mod artifact;
pub mod format;
pub mod recorder;

pub use artifact::CaptureArtifact;
pub use format::{CaptureCodec, CaptureFormat, CodecRegistry, WavCodec, FORMAT_PREFERENCE};
pub use recorder::Recorder;
