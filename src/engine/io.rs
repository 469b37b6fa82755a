//! Audio encoding and file I/O
//!
//! WAV is the container this crate encodes captures into and the format
//! background tracks are imported from. Encoding and decoding work on
//! in-memory byte vectors so captures never touch the disk until the user
//! downloads them.
//!
//! Sample rate conversion uses linear interpolation.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::error::{BinauralError, Result};

/// Encode a buffer as a WAV byte stream
///
/// # Arguments
/// * `buffer` - Mono or stereo audio to encode
/// * `bit_depth` - 16 or 24 for integer PCM, 32 for float
pub fn encode_wav(buffer: &AudioBuffer, bit_depth: u16) -> Result<Vec<u8>> {
    let channels = buffer.num_channels() as u16;
    if channels == 0 {
        return Err(BinauralError::Recording {
            reason: "cannot encode audio with zero channels".to_string(),
        });
    }

    let spec = WavSpec {
        channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: bit_depth,
        sample_format: if bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };

    let interleaved = buffer.to_interleaved();
    let mut cursor = Cursor::new(Vec::with_capacity(interleaved.len() * (bit_depth as usize / 8) + 44));

    {
        let mut writer = WavWriter::new(&mut cursor, spec).map_err(encode_error)?;

        match bit_depth {
            16 => {
                for sample in interleaved {
                    let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                    writer.write_sample(scaled).map_err(encode_error)?;
                }
            }
            24 => {
                for sample in interleaved {
                    // 24-bit stored as i32 in hound
                    let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                    writer.write_sample(scaled).map_err(encode_error)?;
                }
            }
            32 => {
                for sample in interleaved {
                    writer.write_sample(sample).map_err(encode_error)?;
                }
            }
            _ => {
                return Err(BinauralError::UnsupportedFormat {
                    format: format!("{}-bit audio (only 16, 24, 32 supported)", bit_depth),
                });
            }
        }

        writer.finalize().map_err(encode_error)?;
    }

    Ok(cursor.into_inner())
}

/// Decode a WAV byte stream
///
/// The channel count and sample rate come from the stream's own header, so
/// a capture always decodes with the metadata it was encoded with.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| BinauralError::Decode {
        reason: format!("Failed to read WAV header: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;

    // Reject multi-channel audio (>2 channels)
    if ChannelLayout::from_count(channels).is_none() {
        return Err(BinauralError::UnsupportedFormat {
            format: format!("{}-channel audio (only mono/stereo supported)", channels),
        });
    }

    let samples = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    AudioBuffer::from_interleaved(&samples, channels, spec.sample_rate)
}

/// Import a WAV file from disk
///
/// # Errors
/// * `FileNotFound` - If the file does not exist
/// * `Decode` - If the file is not a readable WAV file
/// * `UnsupportedFormat` - If the audio has more than 2 channels
pub fn import_audio(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(BinauralError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let bytes = std::fs::read(path)?;
    let buffer = decode_wav(&bytes)?;

    if buffer.is_empty() {
        return Err(BinauralError::Decode {
            reason: format!("{} contains no samples", path.display()),
            source: None,
        });
    }

    Ok(buffer)
}

/// Resample a buffer to a different sample rate
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> AudioBuffer {
    if buffer.sample_rate == target_rate || buffer.sample_rate == 0 {
        return buffer.clone();
    }

    let ratio = target_rate as f64 / buffer.sample_rate as f64;
    AudioBuffer {
        samples: buffer
            .samples
            .iter()
            .map(|channel| resample_linear(channel, ratio))
            .collect(),
        sample_rate: target_rate,
    }
}

/// Generate a mono sine test tone
///
/// # Arguments
/// * `frequency` - Frequency of the sine wave in Hz
/// * `duration_secs` - Duration of the tone in seconds
/// * `sample_rate` - Sample rate in Hz
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::new(num_samples, ChannelLayout::Mono, sample_rate);

    let angular_freq = 2.0 * std::f64::consts::PI * frequency as f64 / sample_rate as f64;

    for (i, sample) in buffer.samples[0].iter_mut().enumerate() {
        *sample = (angular_freq * i as f64).sin() as f32;
    }

    buffer
}

/// Generate a stereo test tone with different frequencies per channel
///
/// Two carriers a few Hz apart produce a mono mix whose amplitude envelope
/// beats at their difference.
pub fn generate_stereo_test_tone(
    freq_left: f32,
    freq_right: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::new(num_samples, ChannelLayout::Stereo, sample_rate);

    let angular_freq_l = 2.0 * std::f64::consts::PI * freq_left as f64 / sample_rate as f64;
    let angular_freq_r = 2.0 * std::f64::consts::PI * freq_right as f64 / sample_rate as f64;

    for (i, sample) in buffer.samples[0].iter_mut().enumerate() {
        *sample = (angular_freq_l * i as f64).sin() as f32;
    }

    for (i, sample) in buffer.samples[1].iter_mut().enumerate() {
        *sample = (angular_freq_r * i as f64).sin() as f32;
    }

    buffer
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn encode_error(e: hound::Error) -> BinauralError {
    BinauralError::Recording {
        reason: format!("WAV encoding failed: {}", e),
    }
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let decode_error = |bits: &str, e: hound::Error| BinauralError::Decode {
        reason: format!("Failed to read {} samples: {}", bits, e),
        source: Some(Box::new(e)),
    };

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| decode_error("float", e)),
        SampleFormat::Int => match bits_per_sample {
            8 => reader
                .samples::<i8>()
                .map(|s| s.map(|v| v as f32 / 128.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| decode_error("8-bit", e)),
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| decode_error("16-bit", e)),
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 8388608.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| decode_error("24-bit", e)),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 2147483648.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| decode_error("32-bit int", e)),
            _ => Err(BinauralError::UnsupportedFormat {
                format: format!("{}-bit integer audio", bits_per_sample),
            }),
        },
    }
}

/// Linear interpolation resampling
fn resample_linear(samples: &[f32], ratio: f64) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let source_len = samples.len();
    let target_len = ((source_len as f64) * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(target_len);

    for i in 0..target_len {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < source_len {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < source_len {
            samples[src_idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generate_test_tone() {
        let buffer = generate_test_tone(440.0, 1.0, 48000);

        assert_eq!(buffer.num_samples(), 48000);
        assert_eq!(buffer.num_channels(), 1);

        // The sample near half-cycle should be close to zero
        let zero_crossing = (48000.0 / 440.0 / 2.0) as usize;
        assert!(buffer.samples[0][zero_crossing].abs() < 0.1);
    }

    #[test]
    fn test_stereo_wav_keeps_metadata() {
        let original = generate_stereo_test_tone(300.0, 310.0, 0.25, 44100);
        let bytes = encode_wav(&original, 16).unwrap();
        let decoded = decode_wav(&bytes).unwrap();

        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.num_channels(), 2);
        assert_eq!(decoded.num_samples(), original.num_samples());

        for ch in 0..2 {
            for (orig, dec) in original.channel(ch).iter().zip(decoded.channel(ch)) {
                assert!((orig - dec).abs() < 0.001, "channel {}: {} vs {}", ch, orig, dec);
            }
        }
    }

    #[test]
    fn test_float_wav_is_lossless() {
        let original = generate_test_tone(1000.0, 0.1, 48000);
        let decoded = decode_wav(&encode_wav(&original, 32).unwrap()).unwrap();
        for (orig, dec) in original.channel(0).iter().zip(decoded.channel(0)) {
            assert!((orig - dec).abs() < 1e-6);
        }
    }

    #[test]
    fn test_unsupported_bit_depth() {
        let buffer = generate_test_tone(440.0, 0.1, 48000);
        let err = encode_wav(&buffer, 12).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode_wav(b"definitely not a wav file").unwrap_err();
        assert_eq!(err.error_code(), "DECODE");
    }

    #[test]
    fn test_import_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("music.wav");
        let original = generate_stereo_test_tone(220.0, 330.0, 0.2, 48000);
        std::fs::write(&path, encode_wav(&original, 24).unwrap()).unwrap();

        let imported = import_audio(&path).unwrap();
        assert_eq!(imported.num_samples(), original.num_samples());
        assert_eq!(imported.num_channels(), 2);
    }

    #[test]
    fn test_import_nonexistent_file() {
        match import_audio(Path::new("/nonexistent/path/audio.wav")).unwrap_err() {
            BinauralError::FileNotFound { path } => assert!(path.contains("nonexistent")),
            other => panic!("Expected FileNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_resample_changes_length() {
        let buffer = generate_test_tone(440.0, 1.0, 44100);
        let resampled = resample(&buffer, 48000);
        assert_eq!(resampled.sample_rate, 48000);
        assert!((resampled.num_samples() as i64 - 48000).abs() <= 1);
    }

    #[test]
    fn test_resample_linear_upsample() {
        let resampled = resample_linear(&[0.0, 1.0, 0.0], 2.0);
        assert!(resampled.len() >= 5);
        assert!((resampled[1] - 0.5).abs() < 0.01);
    }
}
