//! Status reporting
//!
//! The controller turns every state change and every caught failure into a
//! `StatusEvent` and hands it to a `StatusSink`. Nothing in the engine
//! panics or exits on failure; the sink is where errors become visible.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

use log::{error, info, warn};
use serde::Serialize;

use crate::config::ToneMode;

/// Something the user should be told about
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    /// The output chain is being prepared
    Loading,
    Playing { mode: ToneMode, with_music: bool },
    Paused,
    Stopped,
    PowerNapStarted { duration_secs: f32 },
    VerificationPassed { detected_hz: f32 },
    VerificationFailed { detected_hz: f32, expected_hz: f32 },
    /// The capture was kept but could not be checked
    VerificationUnavailable { reason: String },
    GraphConstructionFailed { reason: String },
    RecordingFailed { reason: String },
    DecodeFailed { reason: String },
    MusicLoaded { name: String },
    MusicCleared,
}

/// Severity used when logging an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

impl StatusEvent {
    pub fn level(&self) -> StatusLevel {
        match self {
            StatusEvent::GraphConstructionFailed { .. }
            | StatusEvent::RecordingFailed { .. }
            | StatusEvent::DecodeFailed { .. } => StatusLevel::Error,
            StatusEvent::VerificationFailed { .. }
            | StatusEvent::VerificationUnavailable { .. } => StatusLevel::Warning,
            _ => StatusLevel::Info,
        }
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::Loading => write!(f, "Loading..."),
            StatusEvent::Playing { mode, with_music } => {
                let label = match mode {
                    ToneMode::Binaural => "binaural beats",
                    ToneMode::Mono => "pure tone",
                    ToneMode::PowerNap => "power nap",
                };
                if *with_music {
                    write!(f, "Playing {} with music", label)
                } else {
                    write!(f, "Playing {}", label)
                }
            }
            StatusEvent::Paused => write!(f, "Paused"),
            StatusEvent::Stopped => write!(f, "Stopped"),
            StatusEvent::PowerNapStarted { duration_secs } => {
                write!(f, "Power nap started ({:.0} seconds)", duration_secs)
            }
            StatusEvent::VerificationPassed { detected_hz } => {
                write!(f, "Frequency verified: {:.2} Hz", detected_hz)
            }
            StatusEvent::VerificationFailed {
                detected_hz,
                expected_hz,
            } => write!(
                f,
                "Frequency mismatch: detected {:.2} Hz, expected {:.2} Hz",
                detected_hz, expected_hz
            ),
            StatusEvent::VerificationUnavailable { reason } => {
                write!(f, "Frequency not verified: {}", reason)
            }
            StatusEvent::GraphConstructionFailed { reason } => {
                write!(f, "Could not start audio: {}", reason)
            }
            StatusEvent::RecordingFailed { reason } => {
                write!(f, "Recording unavailable: {}", reason)
            }
            StatusEvent::DecodeFailed { reason } => write!(f, "Could not decode audio: {}", reason),
            StatusEvent::MusicLoaded { name } => write!(f, "Music loaded: {}", name),
            StatusEvent::MusicCleared => write!(f, "Music cleared"),
        }
    }
}

/// Receiver of status events
pub trait StatusSink: Send {
    fn report(&mut self, event: StatusEvent);
}

/// Writes every event to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn report(&mut self, event: StatusEvent) {
        match event.level() {
            StatusLevel::Info => info!("[STATUS] {}", event),
            StatusLevel::Warning => warn!("[STATUS] {}", event),
            StatusLevel::Error => error!("[STATUS] {}", event),
        }
    }
}

/// Forwards events over a channel
#[derive(Debug, Clone)]
pub struct ChannelStatusSink {
    tx: Sender<StatusEvent>,
}

impl ChannelStatusSink {
    pub fn new(tx: Sender<StatusEvent>) -> Self {
        Self { tx }
    }
}

impl StatusSink for ChannelStatusSink {
    fn report(&mut self, event: StatusEvent) {
        // Nobody listening is not an error for the engine
        let _ = self.tx.send(event);
    }
}

/// A channel sink and the receiving end of its channel
pub fn channel() -> (ChannelStatusSink, Receiver<StatusEvent>) {
    let (tx, rx) = mpsc::channel();
    (ChannelStatusSink::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_channel_sink_forwards_events() {
        let (mut sink, rx) = channel();
        sink.report(StatusEvent::Loading);
        sink.report(StatusEvent::Stopped);
        let events: Vec<StatusEvent> = rx.try_iter().collect();
        assert_eq!(events, vec![StatusEvent::Loading, StatusEvent::Stopped]);
    }

    #[test]
    fn test_event_messages() {
        let event = StatusEvent::VerificationFailed {
            detected_hz: 445.0,
            expected_hz: 440.0,
        };
        assert_eq!(
            event.to_string(),
            "Frequency mismatch: detected 445.00 Hz, expected 440.00 Hz"
        );
        assert_eq!(event.level(), StatusLevel::Warning);
        assert_eq!(
            StatusEvent::Playing {
                mode: ToneMode::Binaural,
                with_music: true
            }
            .to_string(),
            "Playing binaural beats with music"
        );
    }

    #[test]
    fn test_events_serialize_with_tag() {
        let json = serde_json::to_string(&StatusEvent::VerificationPassed { detected_hz: 10.0 }).unwrap();
        assert_eq!(json, r#"{"event":"verification_passed","detected_hz":10.0}"#);
    }
}
