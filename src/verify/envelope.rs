//! Envelope-based beat detection
//!
//! Two carriers a few hertz apart sum to a tone whose amplitude swells and
//! fades at their difference. The capture is mixed to mono, rectified and
//! reduced to a coarse envelope by keeping the largest magnitude in each
//! window of `step` samples. The spacing between envelope peaks gives the
//! beat period.

use crate::engine::buffer::AudioBuffer;
use crate::error::{BinauralError, Result};

/// Envelope values at or below this are ignored
pub const NOISE_FLOOR: f32 = 0.01;

/// A new peak only counts once the envelope has fallen below this share of
/// the previous peak
pub const REARM_RATIO: f32 = 0.5;

// Lowest target used when sizing the downsampling window
const MIN_TARGET_HZ: f32 = 0.1;

/// Downsampling window for a target beat frequency
///
/// Roughly ten envelope points per expected beat cycle.
pub fn downsample_step(sample_rate: u32, target_hz: f32) -> usize {
    let step = (sample_rate as f32 / target_hz.max(MIN_TARGET_HZ) / 10.0).floor();
    (step as usize).max(1)
}

/// Peak-hold envelope of a rectified signal
pub fn envelope(samples: &[f32], step: usize) -> Vec<f32> {
    samples
        .chunks(step.max(1))
        .map(|window| window.iter().fold(0.0_f32, |max, s| max.max(s.abs())))
        .collect()
}

/// Indices of envelope peaks
///
/// A peak is a point above the noise floor that rises above its left
/// neighbour and is not exceeded by its right one. After each peak the
/// detector waits for the envelope to drop below `REARM_RATIO` of that
/// peak before accepting another.
pub fn find_peaks(envelope: &[f32], noise_floor: f32) -> Vec<usize> {
    let mut peaks = Vec::new();
    let mut armed = true;
    let mut last_peak = 0.0_f32;

    for i in 1..envelope.len().saturating_sub(1) {
        let value = envelope[i];
        if !armed && value < last_peak * REARM_RATIO {
            armed = true;
        }
        if armed && value > noise_floor && value > envelope[i - 1] && value >= envelope[i + 1] {
            peaks.push(i);
            last_peak = value;
            armed = false;
        }
    }
    peaks
}

/// Measure the beat frequency of a capture
///
/// Fails with an insufficient signal error when fewer than two envelope
/// peaks are found.
pub fn detect_beat_frequency(buffer: &AudioBuffer, target_hz: f32) -> Result<f32> {
    let step = downsample_step(buffer.sample_rate, target_hz);
    let env = envelope(&buffer.mix_to_mono(), step);
    let peaks = find_peaks(&env, NOISE_FLOOR);

    if peaks.len() < 2 {
        return Err(BinauralError::InsufficientSignal {
            peaks_found: peaks.len(),
        });
    }

    let spacings = peaks.len() - 1;
    let mean_spacing = (peaks[peaks.len() - 1] - peaks[0]) as f64 / spacings as f64;
    let period_secs = mean_spacing * step as f64 / buffer.sample_rate as f64;
    Ok((1.0 / period_secs) as f32)
}
