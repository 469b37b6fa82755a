//! Audio Engine Module
//!
//! Core rendering engine including:
//! - Audio buffer management
//! - The offline rendering context and its sample clock
//! - Transport state machine
//! - WAV encode/decode and test tone generation
//! - Optional real-time device output

pub mod buffer;
pub mod context;
pub mod io;
#[cfg(feature = "device-output")]
pub mod output;
pub mod transport;

pub use buffer::{AudioBuffer, ChannelLayout, DEFAULT_SAMPLE_RATE};
pub use context::{ContextState, RenderContext, TapId};
pub use io::{decode_wav, encode_wav, generate_stereo_test_tone, generate_test_tone, import_audio};
#[cfg(feature = "device-output")]
pub use output::DeviceOutput;
pub use transport::{PlaybackState, Transport};
