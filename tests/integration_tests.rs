//! Integration Tests
//!
//! End-to-end tests for the session -> capture -> verification pipeline.

use std::time::Duration;

use approx::assert_abs_diff_eq;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use binaural::capture::CaptureFormat;
use binaural::engine::io::{decode_wav, encode_wav, generate_stereo_test_tone, import_audio};
use binaural::engine::{PlaybackState, RenderContext};
use binaural::status::{self, StatusEvent};
use binaural::verify::{VerificationMethod, TOLERANCE_HZ};
use binaural::{
    FrequencyVerifier, PlaybackController, PowerNapSettings, ToneConfiguration, ToneMode,
};

const SAMPLE_RATE: u32 = 48000;
const BLOCK: usize = 1024;
const VERIFY_TIMEOUT: Duration = Duration::from_secs(60);

fn controller(config: ToneConfiguration) -> PlaybackController {
    PlaybackController::with_context(RenderContext::new(SAMPLE_RATE), config)
}

/// Render roughly `secs` seconds in fixed-size blocks
fn render_secs(controller: &mut PlaybackController, secs: f32) {
    let blocks = (secs * SAMPLE_RATE as f32 / BLOCK as f32).ceil() as usize;
    for _ in 0..blocks {
        controller.render(BLOCK);
    }
}

// === Full Session Tests ===

#[test]
fn test_binaural_session_verifies_beat() {
    let mut c = controller(ToneConfiguration::binaural(10.0));
    c.play().unwrap();
    render_secs(&mut c, 2.0);
    c.stop();

    let artifact = c.last_artifact().unwrap();
    assert_eq!(artifact.source_mode, ToneMode::Binaural);
    assert_eq!(artifact.target_frequency_hz, Some(10.0));
    assert_eq!(artifact.file_name(), "binaural_mix.wav");

    let result = c.wait_for_verification(VERIFY_TIMEOUT).unwrap();
    assert_eq!(result.method, VerificationMethod::Envelope);
    assert!(result.passed, "{}", result);
    assert_eq!(result.session_id, Some(artifact.session_id));
}

#[test]
fn test_mono_session_verifies_tone() {
    let mut c = controller(ToneConfiguration::mono(440.0));
    c.play().unwrap();
    render_secs(&mut c, 1.0);
    c.stop();

    let result = c.wait_for_verification(VERIFY_TIMEOUT).unwrap();
    assert_eq!(result.method, VerificationMethod::Spectral);
    assert!(result.passed, "{}", result);
    assert_abs_diff_eq!(result.detected_hz, 440.0, epsilon = TOLERANCE_HZ);
}

#[test]
fn test_retuned_session_verifies_new_target() {
    let mut c = controller(ToneConfiguration::binaural(10.0));
    c.play().unwrap();
    c.set_beat_frequency(6.0).unwrap();
    render_secs(&mut c, 2.0);
    c.stop();

    let artifact = c.last_artifact().unwrap();
    assert_eq!(artifact.target_frequency_hz, Some(6.0));
    let result = c.wait_for_verification(VERIFY_TIMEOUT).unwrap();
    assert!(result.passed, "{}", result);
}

#[test]
fn test_capture_header_matches_context() {
    let mut c = controller(ToneConfiguration::binaural(10.0));
    c.play().unwrap();
    render_secs(&mut c, 0.5);
    c.stop();

    let artifact = c.last_artifact().unwrap();
    assert_eq!(artifact.format, CaptureFormat::Wav);
    assert_eq!(artifact.mime_type(), "audio/wav");

    let decoded = decode_wav(&artifact.bytes).unwrap();
    assert_eq!(decoded.sample_rate, SAMPLE_RATE);
    assert_eq!(decoded.channels(), 2);
    assert_eq!(artifact.channels, 2);
}

#[test]
fn test_paused_time_is_not_captured() {
    let mut c = controller(ToneConfiguration::mono(440.0));
    c.play().unwrap();
    for _ in 0..10 {
        c.render(BLOCK);
    }
    c.pause();
    for _ in 0..10 {
        c.render(BLOCK);
    }
    c.play().unwrap();
    for _ in 0..10 {
        c.render(BLOCK);
    }
    c.stop();

    let decoded = decode_wav(&c.last_artifact().unwrap().bytes).unwrap();
    assert_eq!(decoded.len(), 20 * BLOCK);
}

#[test]
fn test_saved_capture_verifies_from_disk() {
    let dir = TempDir::new().unwrap();
    let mut c = controller(ToneConfiguration::mono(1000.0));
    c.play().unwrap();
    render_secs(&mut c, 1.0);
    c.stop();

    let artifact = c.last_artifact().unwrap();
    let path = artifact.save_to(dir.path()).unwrap();
    assert_eq!(path, dir.path().join("pure_tone.wav"));
    assert_eq!(artifact.checksum().len(), 64);

    let audio = import_audio(&path).unwrap();
    let result = FrequencyVerifier::new()
        .verify_buffer(&audio, 1000.0, VerificationMethod::Spectral)
        .unwrap();
    assert!(result.passed, "{}", result);
}

// === Session Lifecycle Tests ===

#[test]
fn test_repeated_sessions_do_not_leak_nodes() {
    let mut c = controller(ToneConfiguration::binaural(4.0));
    for _ in 0..5 {
        c.play().unwrap();
        render_secs(&mut c, 0.1);
        c.stop();
    }
    assert_eq!(c.state(), PlaybackState::Stopped);
    assert_eq!(c.context().live_nodes(), 2);
    assert_eq!(c.context().tap_count(), 0);
}

#[test]
fn test_new_session_discards_old_verification() {
    let mut c = controller(ToneConfiguration::mono(440.0));
    c.play().unwrap();
    render_secs(&mut c, 0.5);
    c.stop();

    // Starting again before polling supersedes the first capture
    c.play().unwrap();
    std::thread::sleep(Duration::from_millis(200));
    render_secs(&mut c, 0.5);
    assert!(c.poll_verification().is_none());
    assert!(c.last_result().is_none());

    c.stop();
    let result = c.wait_for_verification(VERIFY_TIMEOUT).unwrap();
    assert_eq!(result.session_id, c.session_id());
}

#[test]
fn test_power_nap_is_captured_but_not_verified() {
    let (sink, rx) = status::channel();
    let mut c = controller(ToneConfiguration::default()).with_status_sink(Box::new(sink));

    c.start_power_nap(PowerNapSettings::new(300.0, 150.0, 1.0).unwrap())
        .unwrap();
    render_secs(&mut c, 1.2);
    assert_eq!(c.state(), PlaybackState::Stopped);

    let artifact = c.last_artifact().unwrap();
    assert_eq!(artifact.source_mode, ToneMode::PowerNap);
    assert_eq!(artifact.target_frequency_hz, None);
    assert_eq!(c.awaiting_verification(), None);

    let events: Vec<StatusEvent> = rx.try_iter().collect();
    assert!(events.contains(&StatusEvent::PowerNapStarted { duration_secs: 1.0 }));
    assert!(events.contains(&StatusEvent::Stopped));
    assert!(!events
        .iter()
        .any(|e| matches!(e, StatusEvent::VerificationPassed { .. })));
}

#[test]
fn test_music_file_mixes_into_capture() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pad.wav");
    let pad = generate_stereo_test_tone(100.0, 100.0, 0.25, 44100);
    std::fs::write(&path, encode_wav(&pad, 16).unwrap()).unwrap();

    let (sink, rx) = status::channel();
    let mut c = controller(ToneConfiguration::mono(440.0)).with_status_sink(Box::new(sink));
    c.load_music(&path).unwrap();
    c.play().unwrap();
    render_secs(&mut c, 1.0);
    assert!(c.music().is_playing());
    c.stop();

    let events: Vec<StatusEvent> = rx.try_iter().collect();
    assert!(events.contains(&StatusEvent::MusicLoaded {
        name: "pad.wav".to_string()
    }));
    assert!(events.contains(&StatusEvent::Playing {
        mode: ToneMode::Mono,
        with_music: true
    }));

    // The louder 440 Hz tone still dominates the spectrum
    let result = c.wait_for_verification(VERIFY_TIMEOUT).unwrap();
    assert!(result.passed, "{}", result);
}

#[test]
fn test_bad_music_file_reports_decode_failure() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.wav");
    std::fs::write(&path, b"not a wav file").unwrap();

    let (sink, rx) = status::channel();
    let mut c = controller(ToneConfiguration::mono(440.0)).with_status_sink(Box::new(sink));
    assert!(c.load_music(&path).is_err());
    assert!(!c.music().is_loaded());
    assert!(rx
        .try_iter()
        .any(|e| matches!(e, StatusEvent::DecodeFailed { .. })));

    // Playback is unaffected
    c.play().unwrap();
    assert_eq!(c.state(), PlaybackState::Playing);
}
