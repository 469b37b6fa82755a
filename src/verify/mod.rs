//! Frequency Verifier
//!
//! Decodes a capture artifact and checks that the rendered audio contains
//! the frequency the session asked for:
//!
//! - Mono captures use spectral peak detection on the whole recording.
//! - Binaural captures use envelope peak spacing to measure the beat.
//!
//! A result within `TOLERANCE_HZ` of the target passes. A failed check is
//! informational; it never affects the session that produced the capture.

pub mod envelope;
pub mod spectral;
pub mod worker;

use std::fmt;

use log::{debug, info};
use serde::Serialize;

use crate::capture::artifact::CaptureArtifact;
use crate::capture::format::CaptureFormat;
use crate::config::ToneMode;
use crate::engine::buffer::AudioBuffer;
use crate::engine::io::decode_wav;
use crate::error::{BinauralError, Result};
use crate::session::SessionId;

pub use envelope::detect_beat_frequency;
pub use spectral::detect_mono_frequency;
pub use worker::{VerificationReport, VerificationWorker};

/// Largest accepted distance between detected and target frequency
pub const TOLERANCE_HZ: f32 = 2.0;

/// Detection algorithm used for a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Spectral,
    Envelope,
}

impl VerificationMethod {
    pub fn for_mode(mode: ToneMode) -> Option<Self> {
        match mode {
            ToneMode::Binaural => Some(VerificationMethod::Envelope),
            ToneMode::Mono => Some(VerificationMethod::Spectral),
            ToneMode::PowerNap => None,
        }
    }
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationMethod::Spectral => write!(f, "spectral peak"),
            VerificationMethod::Envelope => write!(f, "envelope"),
        }
    }
}

/// Outcome of checking one capture
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub session_id: Option<SessionId>,
    pub detected_hz: f32,
    pub target_hz: f32,
    pub tolerance_hz: f32,
    pub passed: bool,
    pub method: VerificationMethod,
}

impl VerificationResult {
    /// Compare a detected frequency against the target (inclusive tolerance)
    pub fn compare(detected_hz: f32, target_hz: f32, method: VerificationMethod) -> Self {
        Self {
            session_id: None,
            detected_hz,
            target_hz,
            tolerance_hz: TOLERANCE_HZ,
            passed: (detected_hz - target_hz).abs() <= TOLERANCE_HZ,
            method,
        }
    }

    /// Result for a capture whose envelope had too few peaks to measure
    pub fn insufficient_signal(target_hz: f32, method: VerificationMethod) -> Self {
        Self {
            passed: false,
            ..Self::compare(0.0, target_hz, method)
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn error_hz(&self) -> f32 {
        (self.detected_hz - self.target_hz).abs()
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed {
            write!(
                f,
                "PASSED: detected {:.2} Hz (target {:.2} Hz, {} detection)",
                self.detected_hz, self.target_hz, self.method
            )
        } else {
            write!(
                f,
                "FAILED: detected {:.2} Hz, expected {:.2} Hz ±{:.1} ({} detection)",
                self.detected_hz, self.target_hz, self.tolerance_hz, self.method
            )
        }
    }
}

/// Offline checker for capture artifacts
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequencyVerifier;

impl FrequencyVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Verify an artifact against the target it carries
    ///
    /// Returns `Ok(None)` for artifacts with nothing to verify (power-nap
    /// sweeps). Too few envelope peaks is a failed result with a detected
    /// frequency of 0, not an error. Undecodable artifacts are errors.
    pub fn verify(&self, artifact: &CaptureArtifact) -> Result<Option<VerificationResult>> {
        let (Some(target), Some(method)) = (
            artifact.target_frequency_hz,
            VerificationMethod::for_mode(artifact.source_mode),
        ) else {
            debug!(
                "[VERIFY] Session {} ({}) has no target, skipping",
                artifact.session_id, artifact.source_mode
            );
            return Ok(None);
        };

        let audio = decode_artifact(artifact)?;
        let result = self
            .verify_buffer(&audio, target, method)?
            .with_session(artifact.session_id);
        info!("[VERIFY] {}", result);
        Ok(Some(result))
    }

    /// Verify decoded audio directly
    pub fn verify_buffer(
        &self,
        audio: &AudioBuffer,
        target_hz: f32,
        method: VerificationMethod,
    ) -> Result<VerificationResult> {
        let detected = match method {
            VerificationMethod::Spectral => detect_mono_frequency(audio),
            VerificationMethod::Envelope => detect_beat_frequency(audio, target_hz),
        };

        match detected {
            Ok(hz) => Ok(VerificationResult::compare(hz, target_hz, method)),
            Err(BinauralError::InsufficientSignal { peaks_found }) => {
                debug!(
                    "[VERIFY] Insufficient signal ({} peak(s)), reporting 0 Hz",
                    peaks_found
                );
                Ok(VerificationResult::insufficient_signal(target_hz, method))
            }
            Err(e) => Err(e),
        }
    }
}

/// Decode an artifact with the sample rate and channel count in its header
pub fn decode_artifact(artifact: &CaptureArtifact) -> Result<AudioBuffer> {
    match artifact.format {
        CaptureFormat::Wav => decode_wav(&artifact.bytes),
        other => Err(BinauralError::Decode {
            reason: format!("no decoder for {}", other),
            source: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::{encode_wav, generate_stereo_test_tone, generate_test_tone};
    use chrono::Utc;
    use test_case::test_case;

    #[test_case(441.0, 440.0, true ; "one hertz off passes")]
    #[test_case(445.0, 440.0, false ; "five hertz off fails")]
    #[test_case(442.0, 440.0, true ; "exactly at tolerance passes")]
    #[test_case(438.0, 440.0, true ; "exactly at tolerance below passes")]
    #[test_case(12.5, 10.0, false ; "beat too fast fails")]
    fn test_tolerance(detected: f32, target: f32, passed: bool) {
        let result = VerificationResult::compare(detected, target, VerificationMethod::Spectral);
        assert_eq!(result.passed, passed);
        assert_eq!(result.tolerance_hz, 2.0);
    }

    fn artifact(audio: &AudioBuffer, mode: ToneMode, target: Option<f32>) -> CaptureArtifact {
        CaptureArtifact {
            session_id: SessionId::new(),
            bytes: encode_wav(audio, 16).unwrap(),
            format: CaptureFormat::Wav,
            source_mode: mode,
            target_frequency_hz: target,
            sample_rate: audio.sample_rate,
            channels: audio.channels() as u16,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_verify_mono_artifact() {
        let a = artifact(&generate_test_tone(440.0, 1.0, 44100), ToneMode::Mono, Some(440.0));
        let result = FrequencyVerifier::new().verify(&a).unwrap().unwrap();
        assert!(result.passed, "{}", result);
        assert_eq!(result.method, VerificationMethod::Spectral);
        assert_eq!(result.session_id, Some(a.session_id));
    }

    #[test]
    fn test_verify_binaural_artifact() {
        let audio = generate_stereo_test_tone(300.0, 310.0, 2.0, 44100);
        let a = artifact(&audio, ToneMode::Binaural, Some(10.0));
        let result = FrequencyVerifier::new().verify(&a).unwrap().unwrap();
        assert!(result.passed, "{}", result);
        assert_eq!(result.method, VerificationMethod::Envelope);
    }

    #[test]
    fn test_constant_tone_fails_beat_check_with_zero() {
        let a = artifact(&generate_test_tone(300.0, 1.0, 44100), ToneMode::Binaural, Some(10.0));
        let result = FrequencyVerifier::new().verify(&a).unwrap().unwrap();
        assert!(!result.passed);
        assert_eq!(result.detected_hz, 0.0);
    }

    #[test]
    fn test_power_nap_is_not_verified() {
        let a = artifact(&generate_test_tone(300.0, 0.1, 44100), ToneMode::PowerNap, None);
        assert!(FrequencyVerifier::new().verify(&a).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_artifact_is_decode_error() {
        let mut a = artifact(&generate_test_tone(440.0, 0.1, 44100), ToneMode::Mono, Some(440.0));
        a.bytes = b"not a wav file".to_vec();
        let err = FrequencyVerifier::new().verify(&a).unwrap_err();
        assert_eq!(err.error_code(), "DECODE");
    }
}
