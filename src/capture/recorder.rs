//! Session recorder
//!
//! Taps a node of the rendering context for the lifetime of a session and
//! encodes what it heard when the session stops.
//!
//! Nothing is encoded before `finalize`: the tap holds the whole session as
//! stereo f32, about 23 MB per minute at 48 kHz (a 20 minute power nap is
//! roughly 460 MB). Hosts rendering long sessions should size memory for
//! that or keep sessions short.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};

use crate::capture::artifact::CaptureArtifact;
use crate::capture::format::{CaptureCodec, CaptureFormat, CodecRegistry};
use crate::config::ToneMode;
use crate::engine::context::{RenderContext, TapId};
use crate::error::{BinauralError, Result};
use crate::graph::arena::NodeId;
use crate::session::SessionId;

/// An in-progress capture
pub struct Recorder {
    session_id: SessionId,
    tap: TapId,
    codec: Arc<dyn CaptureCodec>,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("session_id", &self.session_id)
            .field("tap", &self.tap)
            .field("format", &self.codec.format())
            .finish()
    }
}

impl Recorder {
    /// Negotiate a codec and start recording `source`
    pub fn start(
        ctx: &mut RenderContext,
        source: NodeId,
        registry: &CodecRegistry,
        session_id: SessionId,
    ) -> Result<Self> {
        let codec = registry.negotiate()?;
        let tap = ctx.attach_tap(source).map_err(|e| BinauralError::Recording {
            reason: e.to_string(),
        })?;
        debug!(
            "[CAPTURE] Recording session {} as {}",
            session_id,
            codec.format()
        );
        Ok(Self {
            session_id,
            tap,
            codec,
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn format(&self) -> CaptureFormat {
        self.codec.format()
    }

    /// Seconds of audio held by the tap so far
    pub fn captured_secs(&self, ctx: &RenderContext) -> f64 {
        let frames = ctx.tap_len(self.tap).unwrap_or(0);
        frames as f64 / ctx.sample_rate().max(1) as f64
    }

    /// Stop recording and encode everything captured
    ///
    /// Fails with a recording error when nothing was rendered while the tap
    /// was attached.
    pub fn finalize(
        self,
        ctx: &mut RenderContext,
        source_mode: ToneMode,
        target_frequency_hz: Option<f32>,
    ) -> Result<CaptureArtifact> {
        let audio = ctx
            .detach_tap(self.tap)
            .ok_or_else(|| BinauralError::Recording {
                reason: "capture tap was already detached".to_string(),
            })?;

        if audio.is_empty() {
            return Err(BinauralError::Recording {
                reason: "no audio data was captured".to_string(),
            });
        }

        let bytes = self
            .codec
            .encode(&audio)
            .map_err(|e| BinauralError::Recording {
                reason: e.to_string(),
            })?;
        if bytes.is_empty() {
            return Err(BinauralError::Recording {
                reason: format!("{} encoder produced no data", self.codec.format()),
            });
        }

        info!(
            "[CAPTURE] Finalized {:.2}s of audio into {} bytes",
            audio.duration_secs(),
            bytes.len()
        );

        Ok(CaptureArtifact {
            session_id: self.session_id,
            bytes,
            format: self.codec.format(),
            source_mode,
            target_frequency_hz,
            sample_rate: audio.sample_rate,
            channels: audio.channels() as u16,
            recorded_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::decode_wav;

    fn context_with_tone() -> (RenderContext, NodeId) {
        let mut ctx = RenderContext::new(48000);
        let osc = ctx.create_oscillator(440.0).unwrap();
        let gain = ctx.create_gain(0.5).unwrap();
        ctx.connect(osc, gain, 0).unwrap();
        ctx.start_source(osc, 0.0).unwrap();
        (ctx, gain)
    }

    #[test]
    fn test_finalize_produces_decodable_wav() {
        let (mut ctx, gain) = context_with_tone();
        let recorder =
            Recorder::start(&mut ctx, gain, &CodecRegistry::with_defaults(), SessionId::new())
                .unwrap();
        ctx.render(4800);

        let artifact = recorder
            .finalize(&mut ctx, ToneMode::Mono, Some(440.0))
            .unwrap();
        assert_eq!(artifact.format, CaptureFormat::Wav);
        assert_eq!(artifact.channels, 2);
        assert_eq!(artifact.file_name(), "pure_tone.wav");

        let decoded = decode_wav(&artifact.bytes).unwrap();
        assert_eq!(decoded.len(), 4800);
        assert_eq!(decoded.sample_rate, 48000);
        assert_eq!(ctx.tap_count(), 0);
    }

    #[test]
    fn test_finalize_without_audio_is_recording_error() {
        let (mut ctx, gain) = context_with_tone();
        let recorder =
            Recorder::start(&mut ctx, gain, &CodecRegistry::with_defaults(), SessionId::new())
                .unwrap();

        let err = recorder
            .finalize(&mut ctx, ToneMode::Mono, Some(440.0))
            .unwrap_err();
        assert_eq!(err.error_code(), "RECORDING");
        assert_eq!(ctx.tap_count(), 0);
    }

    #[test]
    fn test_captured_secs_tracks_rendered_audio() {
        let (mut ctx, gain) = context_with_tone();
        let recorder =
            Recorder::start(&mut ctx, gain, &CodecRegistry::with_defaults(), SessionId::new())
                .unwrap();
        assert_eq!(recorder.captured_secs(&ctx), 0.0);

        ctx.render(24000);
        ctx.render(24000);
        assert_eq!(recorder.captured_secs(&ctx), 1.0);

        // A suspended context records nothing
        ctx.suspend();
        ctx.render(24000);
        assert_eq!(recorder.captured_secs(&ctx), 1.0);
    }

    #[test]
    fn test_start_on_unknown_node_is_recording_error() {
        let (mut ctx, gain) = context_with_tone();
        ctx.release(&[gain]);
        let err = Recorder::start(&mut ctx, gain, &CodecRegistry::with_defaults(), SessionId::new())
            .unwrap_err();
        assert_eq!(err.error_code(), "RECORDING");
    }
}
