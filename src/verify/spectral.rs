//! Spectral peak detection for pure tones
//!
//! One Hann-windowed FFT over the whole capture, zero padded to at least
//! 16384 points; the loudest bin above DC gives the tone frequency.

use rustfft::{num_complex::Complex, FftPlanner};

use crate::engine::buffer::AudioBuffer;
use crate::error::{BinauralError, Result};

/// Smallest transform used, whatever the capture length
pub const MIN_FFT_SIZE: usize = 16384;

// Magnitudes below this count as silence
const SILENCE_MAGNITUDE: f32 = 1e-6;

/// Transform size for a signal of `len` samples
pub fn transform_size(len: usize) -> usize {
    MIN_FFT_SIZE.max(len.next_power_of_two())
}

/// Frequency resolution of the analysis, in Hz
pub fn bin_width_hz(len: usize, sample_rate: u32) -> f32 {
    sample_rate as f32 / transform_size(len) as f32
}

/// Find the dominant frequency of a capture
///
/// All channels are averaged to mono first. Silent or empty captures fail
/// with an insufficient signal error.
pub fn detect_mono_frequency(buffer: &AudioBuffer) -> Result<f32> {
    let samples = buffer.mix_to_mono();
    if samples.is_empty() {
        return Err(BinauralError::InsufficientSignal { peaks_found: 0 });
    }

    let size = transform_size(samples.len());
    let len = samples.len() as f32;

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(size);

    let mut spectrum: Vec<Complex<f32>> = samples
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let window = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / len).cos());
            Complex::new(s * window, 0.0)
        })
        .collect();
    spectrum.resize(size, Complex::new(0.0, 0.0));

    fft.process(&mut spectrum);

    let (peak_bin, peak_magnitude) = spectrum
        .iter()
        .take(size / 2)
        .enumerate()
        .skip(1)
        .map(|(i, c)| (i, c.norm()))
        .fold((0, 0.0_f32), |best, (i, m)| if m > best.1 { (i, m) } else { best });

    if peak_bin == 0 || peak_magnitude < SILENCE_MAGNITUDE {
        return Err(BinauralError::InsufficientSignal { peaks_found: 0 });
    }

    Ok(peak_bin as f32 * buffer.sample_rate as f32 / size as f32)
}
