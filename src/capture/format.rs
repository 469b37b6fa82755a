//! Capture container formats and codec negotiation
//!
//! The recorder asks the registry for a codec once, at capture start, by
//! walking a fixed preference list: AAC in MP4, Opus in WebM, then PCM in
//! WAV. Only the WAV codec ships with the crate; hosts with an AAC or Opus
//! encoder can register one and it will win the negotiation.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::buffer::AudioBuffer;
use crate::engine::io::encode_wav;
use crate::error::{BinauralError, Result};

/// Containers a capture can be encoded into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureFormat {
    /// AAC-LC in an MP4 container
    Mp4Aac,
    /// Opus in a WebM container
    WebmOpus,
    /// Uncompressed PCM in a RIFF/WAVE container
    Wav,
}

/// Negotiation order, most preferred first
pub const FORMAT_PREFERENCE: [CaptureFormat; 3] =
    [CaptureFormat::Mp4Aac, CaptureFormat::WebmOpus, CaptureFormat::Wav];

impl CaptureFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            CaptureFormat::Mp4Aac => "audio/mp4; codecs=mp4a.40.2",
            CaptureFormat::WebmOpus => "audio/webm; codecs=opus",
            CaptureFormat::Wav => "audio/wav",
        }
    }

    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            CaptureFormat::Mp4Aac => "mp4",
            CaptureFormat::WebmOpus => "webm",
            CaptureFormat::Wav => "wav",
        }
    }
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mime_type())
    }
}

/// Encoder for one capture container
pub trait CaptureCodec: Send + Sync {
    fn format(&self) -> CaptureFormat;

    /// Encode a finished recording into container bytes
    fn encode(&self, audio: &AudioBuffer) -> Result<Vec<u8>>;
}

impl fmt::Debug for dyn CaptureCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.format())
    }
}

/// PCM WAV encoder backed by `hound`
#[derive(Debug, Clone, Copy)]
pub struct WavCodec {
    bit_depth: u16,
}

impl Default for WavCodec {
    fn default() -> Self {
        Self { bit_depth: 16 }
    }
}

impl WavCodec {
    /// Create a WAV codec writing 16, 24 or 32-bit samples
    pub fn new(bit_depth: u16) -> Result<Self> {
        match bit_depth {
            16 | 24 | 32 => Ok(Self { bit_depth }),
            other => Err(BinauralError::UnsupportedFormat {
                format: format!("{}-bit WAV", other),
            }),
        }
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }
}

impl CaptureCodec for WavCodec {
    fn format(&self) -> CaptureFormat {
        CaptureFormat::Wav
    }

    fn encode(&self, audio: &AudioBuffer) -> Result<Vec<u8>> {
        encode_wav(audio, self.bit_depth)
    }
}

/// Available capture codecs
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn CaptureCodec>>,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.codecs.iter().map(|c| c.format()))
            .finish()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CodecRegistry {
    /// Registry with no codecs at all
    pub fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Registry holding the built-in 16-bit WAV codec
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(WavCodec::default()));
        registry
    }

    /// Add a codec, replacing any codec already registered for its format
    pub fn register(&mut self, codec: Arc<dyn CaptureCodec>) {
        let format = codec.format();
        self.codecs.retain(|c| c.format() != format);
        self.codecs.push(codec);
    }

    pub fn supports(&self, format: CaptureFormat) -> bool {
        self.codecs.iter().any(|c| c.format() == format)
    }

    /// Pick the most preferred registered codec
    pub fn negotiate(&self) -> Result<Arc<dyn CaptureCodec>> {
        FORMAT_PREFERENCE
            .iter()
            .find_map(|&format| self.codecs.iter().find(|c| c.format() == format).cloned())
            .ok_or_else(|| BinauralError::Recording {
                reason: "no supported capture format".to_string(),
            })
    }
}
