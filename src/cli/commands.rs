//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};

use crate::config::{
    beat_type_description, PowerNapSettings, ToneConfiguration, ToneMode,
    DEFAULT_MONO_FREQUENCY_HZ, DEFAULT_TONE_VOLUME,
};
use crate::engine::buffer::DEFAULT_SAMPLE_RATE;
use crate::engine::context::RenderContext;
use crate::engine::io::import_audio;
use crate::engine::transport::PlaybackState;
use crate::error::{BinauralError, Result};
use crate::session::PlaybackController;
use crate::verify::{FrequencyVerifier, VerificationMethod, VerificationResult};

/// Frames pulled from the controller per offline render step
const RENDER_BLOCK_FRAMES: usize = 1024;

/// Beat used when neither a config file nor `--beat` is given
const DEFAULT_BEAT_HZ: f32 = 10.0;

/// Longest wait for a verification result
const VERIFY_TIMEOUT: Duration = Duration::from_secs(120);

/// Options for an offline render
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub config: ToneConfiguration,
    pub duration_secs: f32,
    pub music: Option<PathBuf>,
    pub out: PathBuf,
    pub json: bool,
}

/// Tone options given on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ToneOptions {
    pub mode: Option<ToneMode>,
    pub beat_hz: Option<f32>,
    pub mono_hz: Option<f32>,
    pub volume: Option<f32>,
}

impl ToneOptions {
    fn names_given(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.mode.is_some() {
            names.push("--mode");
        }
        if self.beat_hz.is_some() {
            names.push("--beat");
        }
        if self.mono_hz.is_some() {
            names.push("--frequency");
        }
        if self.volume.is_some() {
            names.push("--volume");
        }
        names
    }
}

/// Build the tone configuration for `render` and `play`
///
/// Either a JSON file or the tone options describe the session, never both.
pub fn tone_configuration(options: ToneOptions, config_path: Option<&Path>) -> Result<ToneConfiguration> {
    let config = match config_path {
        Some(path) => {
            let given = options.names_given();
            if !given.is_empty() {
                return Err(BinauralError::InvalidConfig {
                    reason: format!(
                        "{} conflicts with {}",
                        path.display(),
                        given.join(", ")
                    ),
                });
            }
            ToneConfiguration::load(path)?
        }
        None => {
            let mut config = match options.mode.unwrap_or(ToneMode::Binaural) {
                ToneMode::Mono => {
                    ToneConfiguration::mono(options.mono_hz.unwrap_or(DEFAULT_MONO_FREQUENCY_HZ))
                }
                _ => ToneConfiguration::binaural(options.beat_hz.unwrap_or(DEFAULT_BEAT_HZ)),
            };
            config.volume = options.volume.unwrap_or(DEFAULT_TONE_VOLUME);
            config
        }
    };
    config.validate()?;
    Ok(config)
}

/// Render a session offline, save its capture and verify it.
pub fn render(options: RenderOptions) -> Result<()> {
    info!(
        "Rendering {:.1}s of {} to {}",
        options.duration_secs,
        options.config.mode,
        options.out.display()
    );

    let mut controller = PlaybackController::with_context(
        RenderContext::new(DEFAULT_SAMPLE_RATE),
        options.config.clone(),
    );
    if let Some(music) = &options.music {
        controller.load_music(music)?;
    }

    controller.play()?;
    render_for(&mut controller, options.duration_secs);
    controller.stop();

    let artifact = controller.last_artifact().ok_or_else(|| BinauralError::Recording {
        reason: "session produced no capture".to_string(),
    })?;
    let path = artifact.save_to(&options.out)?;
    println!("Capture saved: {}", path.display());
    println!("SHA-256: {}", artifact.checksum());

    match controller.wait_for_verification(VERIFY_TIMEOUT) {
        Some(result) => print_result(&result, options.json)?,
        None => warn!("No verification result for this capture"),
    }
    Ok(())
}

/// Render a power-nap sweep offline and save its capture.
pub fn power_nap(settings: PowerNapSettings, out: &Path) -> Result<()> {
    settings.validate()?;
    info!(
        "Rendering power nap {:.1} -> {:.1} Hz over {:.0}s",
        settings.upper_frequency_hz, settings.lower_frequency_hz, settings.duration_secs
    );

    let mut controller = PlaybackController::new(DEFAULT_SAMPLE_RATE);
    controller.start_power_nap(settings)?;

    // The controller stops itself once the sweep has finished
    let max_blocks = blocks_for(settings.duration_secs, DEFAULT_SAMPLE_RATE) + 1;
    for _ in 0..max_blocks {
        if controller.state() == PlaybackState::Stopped {
            break;
        }
        controller.render(RENDER_BLOCK_FRAMES);
    }
    controller.stop();

    let artifact = controller.last_artifact().ok_or_else(|| BinauralError::Recording {
        reason: "power nap produced no capture".to_string(),
    })?;
    let path = artifact.save_to(out)?;
    println!("Capture saved: {}", path.display());
    Ok(())
}

/// Verify a WAV recording against a target frequency.
pub fn verify(path: &Path, mode: ToneMode, target_hz: f32, json: bool) -> Result<()> {
    info!("Verifying {} as {} at {:.2} Hz", path.display(), mode, target_hz);

    let method = VerificationMethod::for_mode(mode).ok_or_else(|| BinauralError::InvalidState {
        operation: "verify",
        state: format!("in {} mode", mode),
    })?;
    let audio = import_audio(path)?;
    let result = FrequencyVerifier::new().verify_buffer(&audio, target_hz, method)?;
    print_result(&result, json)
}

/// Print the entrainment band of a beat frequency.
pub fn describe(beat_hz: f32) -> Result<()> {
    println!("{:.1} Hz: {}", beat_hz, beat_type_description(beat_hz));
    Ok(())
}

/// Play a session on the default output device for `duration_secs`.
#[cfg(feature = "device-output")]
pub fn play(config: ToneConfiguration, duration_secs: f32, music: Option<&Path>) -> Result<()> {
    use std::sync::{Arc, Mutex};

    use crate::engine::output::DeviceOutput;

    let sample_rate = DeviceOutput::default_sample_rate()?;
    let mut controller =
        PlaybackController::with_context(RenderContext::new(sample_rate), config);
    if let Some(music) = music {
        controller.load_music(music)?;
    }
    controller.play()?;

    let controller = Arc::new(Mutex::new(controller));
    let output = DeviceOutput::start(Arc::clone(&controller))?;
    println!(
        "Playing for {:.0}s on the default device ({} Hz)",
        duration_secs,
        output.sample_rate()
    );
    std::thread::sleep(Duration::from_secs_f32(duration_secs.max(0.0)));

    // Close the stream first so the callback no longer competes for the lock
    drop(output);
    let mut controller = controller.lock().map_err(|_| BinauralError::InvalidState {
        operation: "stop",
        state: "the audio callback panicked".to_string(),
    })?;
    controller.stop();

    match controller.wait_for_verification(VERIFY_TIMEOUT) {
        Some(result) => print_result(&result, false),
        None => {
            warn!("No verification result for this session");
            Ok(())
        }
    }
}

fn blocks_for(duration_secs: f32, sample_rate: u32) -> usize {
    let frames = (duration_secs.max(0.0) as f64 * sample_rate as f64).ceil() as usize;
    frames.div_ceil(RENDER_BLOCK_FRAMES)
}

fn render_for(controller: &mut PlaybackController, duration_secs: f32) {
    let sample_rate = controller.context().sample_rate();
    for _ in 0..blocks_for(duration_secs, sample_rate) {
        controller.render(RENDER_BLOCK_FRAMES);
    }
}

fn print_result(result: &VerificationResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("{}", result);
    }
    Ok(())
}
