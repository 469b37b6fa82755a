//! Encoded capture artifacts

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::capture::format::CaptureFormat;
use crate::config::ToneMode;
use crate::error::Result;
use crate::session::SessionId;

/// A finished, container-encoded recording of one session
///
/// Shared by reference between the controller, which keeps it for download,
/// and the verifier, which decodes it once.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureArtifact {
    pub session_id: SessionId,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub format: CaptureFormat,
    pub source_mode: ToneMode,
    /// Beat frequency (binaural) or tone frequency (mono); none for power-nap
    pub target_frequency_hz: Option<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub recorded_at: DateTime<Utc>,
}

impl CaptureArtifact {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Download stem: `binaural_mix` for binaural sessions, `pure_tone` otherwise
    pub fn file_stem(&self) -> &'static str {
        match self.source_mode {
            ToneMode::Binaural => "binaural_mix",
            ToneMode::Mono | ToneMode::PowerNap => "pure_tone",
        }
    }

    /// Download name with the negotiated extension
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.file_stem(), self.format.extension())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex SHA-256 of the encoded bytes
    pub fn checksum(&self) -> String {
        let digest = Sha256::digest(&self.bytes);
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Write the artifact into `dir` under its download name
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        fs::write(&path, &self.bytes)?;
        info!(
            "[CAPTURE] Saved {} ({} bytes, sha256 {})",
            path.display(),
            self.bytes.len(),
            self.checksum()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifact(mode: ToneMode, format: CaptureFormat) -> CaptureArtifact {
        CaptureArtifact {
            session_id: SessionId::new(),
            bytes: b"abc".to_vec(),
            format,
            source_mode: mode,
            target_frequency_hz: Some(10.0),
            sample_rate: 48000,
            channels: 2,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_file_names_follow_mode_and_format() {
        assert_eq!(
            artifact(ToneMode::Binaural, CaptureFormat::Mp4Aac).file_name(),
            "binaural_mix.mp4"
        );
        assert_eq!(
            artifact(ToneMode::Mono, CaptureFormat::WebmOpus).file_name(),
            "pure_tone.webm"
        );
        assert_eq!(
            artifact(ToneMode::PowerNap, CaptureFormat::Wav).file_name(),
            "pure_tone.wav"
        );
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        let a = artifact(ToneMode::Mono, CaptureFormat::Wav);
        assert_eq!(
            a.checksum(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_save_to_writes_bytes() {
        let dir = TempDir::new().unwrap();
        let a = artifact(ToneMode::Binaural, CaptureFormat::Wav);
        let path = a.save_to(dir.path()).unwrap();

        assert_eq!(path.file_name().unwrap(), "binaural_mix.wav");
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }
}
