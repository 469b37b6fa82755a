//! Binaural - Tone Synthesis with Frequency Verification
//!
//! Renders binaural beats, pure tones and power-nap sweeps through a small
//! pull-based audio graph, records what was rendered, and verifies offline
//! that the recording contains the intended frequency.
//!
//! # Architecture
//!
//! - `engine`: rendering context, sample buffers, WAV I/O, transport
//! - `graph`: node arena, oscillator/gain/merger nodes, tone graph builder
//! - `session`: the playback controller state machine
//! - `capture`: recording taps and encoded capture artifacts
//! - `verify`: spectral and envelope frequency detection
//! - `background`: looping background track
//! - `status`: status events reported to the host

pub mod background;
pub mod capture;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod session;
pub mod status;
pub mod verify;

pub use config::{PowerNapSettings, ToneConfiguration, ToneMode};
pub use error::{BinauralError, Result};
pub use session::{PlaybackController, SessionId};
pub use status::{StatusEvent, StatusSink};
pub use verify::{FrequencyVerifier, VerificationResult};
