//! Audio Buffer Management
//!
//! Non-interleaved 32-bit float buffers used for rendered blocks, captures
//! and decoded recordings.

use crate::error::{BinauralError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default rendering sample rate (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

// ============================================================================
// Helper Functions
// ============================================================================

/// Calculate the peak absolute sample value of a buffer (linear)
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| s.abs())
        .fold(0.0_f32, f32::max)
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    Mono,
    /// Two channels (stereo: left, right)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Core audio buffer type
///
/// Stores audio as non-interleaved 32-bit floating point samples.
/// Each channel is a separate Vec<f32>.
///
/// # Example
/// ```
/// use binaural::engine::buffer::{AudioBuffer, ChannelLayout};
///
/// let buffer = AudioBuffer::new(44100, ChannelLayout::Stereo, 44100);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.duration_secs(), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a zeroed buffer with the given length, layout and sample rate
    pub fn new(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Create an empty buffer with the given channel count
    pub fn empty(num_channels: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![Vec::new(); num_channels],
            sample_rate,
        }
    }

    /// Create an audio buffer from interleaved sample data
    ///
    /// # Returns
    /// Error if the data length is not a multiple of the channel count
    pub fn from_interleaved(interleaved: &[f32], num_channels: usize, sample_rate: u32) -> Result<Self> {
        if num_channels == 0 {
            return Err(BinauralError::Decode {
                reason: "audio has zero channels".to_string(),
                source: None,
            });
        }

        if interleaved.len() % num_channels != 0 {
            return Err(BinauralError::Decode {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
                source: None,
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved format (L, R, L, R, ...)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_channels = self.channels();
        let num_samples = self.len();

        if num_channels == 0 || num_samples == 0 {
            return Vec::new();
        }

        let mut interleaved = Vec::with_capacity(num_channels * num_samples);
        for sample_idx in 0..num_samples {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }
        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Alias for channels()
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer has no samples
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Alias for len()
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.len()
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Average all channels into a single channel
    pub fn mix_to_mono(&self) -> Vec<f32> {
        let num_channels = self.channels();
        let mut mono = vec![0.0_f32; self.len()];
        if num_channels == 0 {
            return mono;
        }

        let scale = 1.0 / num_channels as f32;
        for channel in &self.samples {
            for (out, &sample) in mono.iter_mut().zip(channel.iter()) {
                *out += sample * scale;
            }
        }
        mono
    }

    /// Append another buffer's samples to the end of this one
    ///
    /// A mono block appended to a stereo buffer is copied to both channels;
    /// a stereo block appended to a mono buffer is averaged.
    pub fn append(&mut self, other: &AudioBuffer) {
        match (self.channels(), other.channels()) {
            (a, b) if a == b => {
                for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
                    dst.extend_from_slice(src);
                }
            }
            (_, 1) => {
                for dst in self.samples.iter_mut() {
                    dst.extend_from_slice(&other.samples[0]);
                }
            }
            (1, _) => {
                let mono = other.mix_to_mono();
                self.samples[0].extend_from_slice(&mono);
            }
            _ => {
                let mono = other.mix_to_mono();
                for dst in self.samples.iter_mut() {
                    dst.extend_from_slice(&mono);
                }
            }
        }
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_silent() {
        let buffer = AudioBuffer::new(1024, ChannelLayout::Stereo, 44100);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.len(), 1024);
        assert_eq!(calculate_peak(&buffer), 0.0);
    }

    #[test]
    fn test_from_interleaved() {
        let buffer = AudioBuffer::from_interleaved(&[1.0, 5.0, 2.0, 6.0], 2, 48000).unwrap();
        assert_eq!(buffer.channel(0), &[1.0, 2.0]);
        assert_eq!(buffer.channel(1), &[5.0, 6.0]);
        assert_eq!(buffer.to_interleaved(), vec![1.0, 5.0, 2.0, 6.0]);
    }

    #[test]
    fn test_from_interleaved_rejects_ragged_data() {
        assert!(AudioBuffer::from_interleaved(&[1.0, 2.0, 3.0], 2, 48000).is_err());
        assert!(AudioBuffer::from_interleaved(&[1.0], 0, 48000).is_err());
    }

    #[test]
    fn test_mix_to_mono_averages_channels() {
        let buffer = AudioBuffer::from_interleaved(&[1.0, 0.0, 0.5, -0.5], 2, 48000).unwrap();
        assert_eq!(buffer.mix_to_mono(), vec![0.5, 0.0]);
    }

    #[test]
    fn test_append_upmixes_mono_block() {
        let mut stereo = AudioBuffer::empty(2, 48000);
        let mono = AudioBuffer::from_interleaved(&[0.25, 0.5], 1, 48000).unwrap();
        stereo.append(&mono);
        assert_eq!(stereo.channel(0), &[0.25, 0.5]);
        assert_eq!(stereo.channel(1), &[0.25, 0.5]);
    }

    #[test]
    fn test_duration() {
        let buffer = AudioBuffer::new(24000, ChannelLayout::Mono, 48000);
        assert!((buffer.duration_secs() - 0.5).abs() < 1e-9);
        assert!(buffer.is_finite());
    }
}
