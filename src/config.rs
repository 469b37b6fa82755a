//! Tone configuration
//!
//! The user-facing parameter snapshot consumed by each playback session,
//! its bounds, and the entrainment band naming used for display.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BinauralError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Fixed carrier frequency shared by both channels in binaural mode
pub const BASE_FREQUENCY_HZ: f32 = 300.0;

/// Beat frequency bounds (Hz)
pub const MIN_BEAT_FREQUENCY_HZ: f32 = 0.0;
pub const MAX_BEAT_FREQUENCY_HZ: f32 = 50.0;

/// Pure tone frequency bounds (Hz)
pub const MIN_MONO_FREQUENCY_HZ: f32 = 20.0;
pub const MAX_MONO_FREQUENCY_HZ: f32 = 20000.0;

/// Default pure tone (A4)
pub const DEFAULT_MONO_FREQUENCY_HZ: f32 = 440.0;

pub const DEFAULT_TONE_VOLUME: f32 = 0.5;
pub const DEFAULT_MUSIC_VOLUME: f32 = 0.3;

// ============================================================================
// Tone Mode
// ============================================================================

/// Which stimulus a session synthesizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToneMode {
    /// Two carriers, one per ear, differing by the beat frequency
    #[default]
    Binaural,
    /// A single pure tone on both channels
    Mono,
    /// A scheduled upper → lower → upper frequency sweep
    PowerNap,
}

impl fmt::Display for ToneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToneMode::Binaural => write!(f, "binaural"),
            ToneMode::Mono => write!(f, "mono"),
            ToneMode::PowerNap => write!(f, "power-nap"),
        }
    }
}

// ============================================================================
// Power Nap Settings
// ============================================================================

/// Sweep parameters for power-nap mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerNapSettings {
    /// Frequency at the start and end of the sweep
    pub upper_frequency_hz: f32,
    /// Frequency held through the middle of the sweep
    pub lower_frequency_hz: f32,
    /// Total sweep length in seconds
    pub duration_secs: f32,
}

impl Default for PowerNapSettings {
    fn default() -> Self {
        Self {
            upper_frequency_hz: 300.0,
            lower_frequency_hz: 150.0,
            duration_secs: 1200.0,
        }
    }
}

impl PowerNapSettings {
    /// Create validated sweep settings
    pub fn new(upper_frequency_hz: f32, lower_frequency_hz: f32, duration_secs: f32) -> Result<Self> {
        let settings = Self {
            upper_frequency_hz,
            lower_frequency_hz,
            duration_secs,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// All three values must be positive and finite
    pub fn validate(&self) -> Result<()> {
        validate_positive("power-nap upper frequency", self.upper_frequency_hz)?;
        validate_positive("power-nap lower frequency", self.lower_frequency_hz)?;
        validate_positive("power-nap duration", self.duration_secs)?;
        Ok(())
    }
}

// ============================================================================
// Tone Configuration
// ============================================================================

/// Parameter snapshot for a playback session
///
/// The beat/mono frequency and the volumes are the live fields: they may be
/// changed while a session runs and are pushed into the graph without a
/// rebuild. Everything else is read once when the session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfiguration {
    pub mode: ToneMode,
    /// Beat frequency for binaural mode (0 to 50 Hz)
    pub beat_frequency_hz: f32,
    /// Tone frequency for mono mode (20 to 20000 Hz)
    pub mono_frequency_hz: f32,
    pub power_nap: PowerNapSettings,
    /// Tone gain stage level (0 to 1)
    pub volume: f32,
    /// Background track gain stage level (0 to 1)
    pub music_volume: f32,
}

impl Default for ToneConfiguration {
    fn default() -> Self {
        Self {
            mode: ToneMode::Binaural,
            beat_frequency_hz: 0.0,
            mono_frequency_hz: DEFAULT_MONO_FREQUENCY_HZ,
            power_nap: PowerNapSettings::default(),
            volume: DEFAULT_TONE_VOLUME,
            music_volume: DEFAULT_MUSIC_VOLUME,
        }
    }
}

impl ToneConfiguration {
    /// Binaural configuration with the given beat frequency
    pub fn binaural(beat_frequency_hz: f32) -> Self {
        Self {
            mode: ToneMode::Binaural,
            beat_frequency_hz,
            ..Self::default()
        }
    }

    /// Pure tone configuration at the given frequency
    pub fn mono(mono_frequency_hz: f32) -> Self {
        Self {
            mode: ToneMode::Mono,
            mono_frequency_hz,
            ..Self::default()
        }
    }

    /// Power-nap configuration with the given sweep
    pub fn power_nap(settings: PowerNapSettings) -> Self {
        Self {
            mode: ToneMode::PowerNap,
            power_nap: settings,
            ..Self::default()
        }
    }

    /// Carrier frequency, fixed at 300 Hz
    pub fn base_frequency_hz(&self) -> f32 {
        BASE_FREQUENCY_HZ
    }

    /// Right channel frequency in binaural mode (base + beat)
    pub fn right_frequency_hz(&self) -> f32 {
        BASE_FREQUENCY_HZ + self.beat_frequency_hz
    }

    /// Frequency the verifier should find in a capture of this configuration
    ///
    /// Power-nap sweeps have no single target and are not verified.
    pub fn target_frequency_hz(&self) -> Option<f32> {
        match self.mode {
            ToneMode::Binaural => Some(self.beat_frequency_hz),
            ToneMode::Mono => Some(self.mono_frequency_hz),
            ToneMode::PowerNap => None,
        }
    }

    /// Check every field against its bounds
    pub fn validate(&self) -> Result<()> {
        validate_beat_frequency(self.beat_frequency_hz)?;
        validate_mono_frequency(self.mono_frequency_hz)?;
        validate_volume("volume", self.volume)?;
        validate_volume("music volume", self.music_volume)?;
        self.power_nap.validate()
    }

    /// Load and validate a configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BinauralError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse and validate a configuration from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ============================================================================
// Validation
// ============================================================================

fn check_range(name: &'static str, value: f32, min: f32, max: f32) -> Result<f32> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(BinauralError::InvalidParameter {
            name,
            value: value as f64,
            min: min as f64,
            max: max as f64,
        })
    }
}

/// Beat frequency must lie in [0, 50] Hz
pub fn validate_beat_frequency(hz: f32) -> Result<f32> {
    check_range("beat frequency", hz, MIN_BEAT_FREQUENCY_HZ, MAX_BEAT_FREQUENCY_HZ)
}

/// Pure tone frequency must lie in [20, 20000] Hz
pub fn validate_mono_frequency(hz: f32) -> Result<f32> {
    check_range("mono frequency", hz, MIN_MONO_FREQUENCY_HZ, MAX_MONO_FREQUENCY_HZ)
}

/// Volumes must lie in [0, 1]
pub fn validate_volume(name: &'static str, volume: f32) -> Result<f32> {
    check_range(name, volume, 0.0, 1.0)
}

fn validate_positive(name: &'static str, value: f32) -> Result<f32> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(BinauralError::InvalidParameter {
            name,
            value: value as f64,
            min: f64::MIN_POSITIVE,
            max: f64::INFINITY,
        })
    }
}

// ============================================================================
// Entrainment Bands
// ============================================================================

/// Named entrainment band for a beat frequency
///
/// Upper boundaries are inclusive: 4 Hz is Delta, 8 Hz is Theta,
/// 13 Hz is Alpha and 30 Hz is Beta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BeatBand {
    NoBeat,
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
}

impl BeatBand {
    pub fn from_frequency(hz: f32) -> Self {
        if hz == 0.0 {
            BeatBand::NoBeat
        } else if hz <= 4.0 {
            BeatBand::Delta
        } else if hz <= 8.0 {
            BeatBand::Theta
        } else if hz <= 13.0 {
            BeatBand::Alpha
        } else if hz <= 30.0 {
            BeatBand::Beta
        } else {
            BeatBand::Gamma
        }
    }

    /// Display text for the band
    pub fn description(&self) -> &'static str {
        match self {
            BeatBand::NoBeat => "No Beat",
            BeatBand::Delta => "Delta - Deep Sleep",
            BeatBand::Theta => "Theta - Meditation",
            BeatBand::Alpha => "Alpha - Relaxation",
            BeatBand::Beta => "Beta - Focus",
            BeatBand::Gamma => "Gamma - High Cognition",
        }
    }
}

impl fmt::Display for BeatBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Describe the entrainment band of a beat frequency
pub fn beat_type_description(hz: f32) -> &'static str {
    BeatBand::from_frequency(hz).description()
}
