//! Binaural CLI
//!
//! Command-line front end for rendering and verifying tone sessions.

use clap::Parser;
use env_logger::Env;
use log::info;

use binaural::cli::commands::{self, RenderOptions, ToneOptions};
use binaural::cli::{Cli, Commands};
use binaural::config::PowerNapSettings;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Binaural v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Binaural v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Render {
            mode,
            beat,
            frequency,
            volume,
            duration,
            config,
            music,
            out,
            json,
        } => {
            let options = ToneOptions {
                mode: mode.map(Into::into),
                beat_hz: beat,
                mono_hz: frequency,
                volume,
            };
            let config = commands::tone_configuration(options, config.as_deref())?;
            commands::render(RenderOptions {
                config,
                duration_secs: duration,
                music,
                out,
                json,
            })?;
        }
        Commands::PowerNap {
            upper,
            lower,
            duration,
            out,
        } => {
            let settings = PowerNapSettings::new(upper, lower, duration)?;
            commands::power_nap(settings, &out)?;
        }
        Commands::Verify {
            path,
            mode,
            target,
            json,
        } => commands::verify(&path, mode.into(), target, json)?,
        Commands::Describe { beat } => commands::describe(beat)?,
        #[cfg(feature = "device-output")]
        Commands::Play {
            mode,
            beat,
            frequency,
            duration,
            music,
        } => {
            let options = ToneOptions {
                mode: Some(mode.into()),
                beat_hz: Some(beat),
                mono_hz: Some(frequency),
                volume: None,
            };
            let config = commands::tone_configuration(options, None)?;
            commands::play(config, duration, music.as_deref())?;
        }
    }
    Ok(())
}
