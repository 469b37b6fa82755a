//! CLI Module
//!
//! Command-line interface for rendering, verifying and describing tone
//! sessions.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::ToneMode;

/// Binaural beat and pure tone generator with frequency verification
#[derive(Parser, Debug)]
#[command(name = "binaural-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Tone mode accepted on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Binaural,
    Mono,
}

impl From<ModeArg> for ToneMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Binaural => ToneMode::Binaural,
            ModeArg::Mono => ToneMode::Mono,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a session offline, save the capture and verify it
    #[command(name = "render")]
    Render {
        /// Tone mode [default: binaural]
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,

        /// Beat frequency in Hz, binaural mode [default: 10]
        #[arg(short, long)]
        beat: Option<f32>,

        /// Tone frequency in Hz, mono mode [default: 440]
        #[arg(long)]
        frequency: Option<f32>,

        /// Tone volume, 0 to 1 [default: 0.5]
        #[arg(long)]
        volume: Option<f32>,

        /// Session length in seconds
        #[arg(short, long, default_value_t = 5.0)]
        duration: f32,

        /// JSON tone configuration; cannot be combined with the tone options
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// WAV file looped under the tones
        #[arg(long)]
        music: Option<PathBuf>,

        /// Directory the capture is saved to
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Print the verification result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a power-nap sweep offline and save the capture
    #[command(name = "power-nap")]
    PowerNap {
        /// Starting and ending frequency in Hz
        #[arg(long, default_value_t = 300.0)]
        upper: f32,

        /// Frequency held in the middle of the sweep in Hz
        #[arg(long, default_value_t = 150.0)]
        lower: f32,

        /// Sweep length in seconds
        #[arg(short, long, default_value_t = 1200.0)]
        duration: f32,

        /// Directory the capture is saved to
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Verify a WAV recording against a target frequency
    #[command(name = "verify")]
    Verify {
        /// WAV file to check
        path: PathBuf,

        /// How the recording was produced
        #[arg(short, long, value_enum)]
        mode: ModeArg,

        /// Expected beat (binaural) or tone (mono) frequency in Hz
        #[arg(short, long)]
        target: f32,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Describe the entrainment band of a beat frequency
    #[command(name = "describe")]
    Describe {
        /// Beat frequency in Hz
        beat: f32,
    },

    /// Play a session on the default output device
    #[cfg(feature = "device-output")]
    #[command(name = "play")]
    Play {
        /// Tone mode
        #[arg(short, long, value_enum, default_value = "binaural")]
        mode: ModeArg,

        /// Beat frequency in Hz (binaural mode)
        #[arg(short, long, default_value_t = 10.0)]
        beat: f32,

        /// Tone frequency in Hz (mono mode)
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,

        /// Playback length in seconds
        #[arg(short, long, default_value_t = 30.0)]
        duration: f32,

        /// WAV file looped under the tones
        #[arg(long)]
        music: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_render() {
        let cli = Cli::parse_from(["binaural-cli", "render", "--mode", "mono", "--frequency", "528"]);
        match cli.command {
            Some(Commands::Render {
                mode, frequency, ..
            }) => {
                assert_eq!(mode, Some(ModeArg::Mono));
                assert_eq!(frequency, Some(528.0));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_verify_requires_target() {
        assert!(Cli::try_parse_from(["binaural-cli", "verify", "a.wav", "--mode", "mono"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
