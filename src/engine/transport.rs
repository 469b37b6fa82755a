//! Transport State Machine
//!
//! Tracks whether a tone session is stopped, playing or paused, how long
//! it has been sounding, and any retune requested while paused that still
//! has to reach the oscillators.

use std::fmt;

use log::{debug, warn};

use crate::engine::buffer::DEFAULT_SAMPLE_RATE;
use crate::error::{BinauralError, Result};

/// Playback states of a tone session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// No graph exists (default state)
    #[default]
    Stopped,
    /// The graph is rendering
    Playing,
    /// The graph exists but the context is suspended
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "Stopped"),
            PlaybackState::Playing => write!(f, "Playing"),
            PlaybackState::Paused => write!(f, "Paused"),
        }
    }
}

/// Session transport
///
/// Transitions:
/// - Stopped -> Playing (`start`)
/// - Playing -> Paused (`pause`)
/// - Paused -> Playing (`resume`)
/// - any -> Stopped (`stop`)
#[derive(Debug, Clone)]
pub struct Transport {
    /// Current playback state
    state: PlaybackState,

    /// Seconds the current session has been sounding
    playhead_position: f64,

    /// Sample rate for position calculations
    sample_rate: u32,

    /// Frequency requested while paused, applied on resume
    staged_retune: Option<f32>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl Transport {
    /// Create a stopped transport
    ///
    /// # Example
    /// ```
    /// use binaural::engine::Transport;
    /// let transport = Transport::new(48000);
    /// assert!(transport.is_stopped());
    /// ```
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: PlaybackState::Stopped,
            playhead_position: 0.0,
            sample_rate,
            staged_retune: None,
        }
    }

    // ========================================================================
    // Transport Controls
    // ========================================================================

    /// Begin a new session
    ///
    /// State transition: Stopped -> Playing. A paused session has to be
    /// resumed, and a playing one stopped first.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            PlaybackState::Stopped => {
                self.state = PlaybackState::Playing;
                self.playhead_position = 0.0;
                debug!("[TRANSPORT] Session started");
                Ok(())
            }
            other => {
                warn!("[TRANSPORT] Cannot start while {}", other);
                Err(BinauralError::InvalidState {
                    operation: "start a session",
                    state: other.to_string(),
                })
            }
        }
    }

    /// Pause a playing session
    ///
    /// Returns true if the state changed.
    pub fn pause(&mut self) -> bool {
        match self.state {
            PlaybackState::Playing => {
                self.state = PlaybackState::Paused;
                debug!("[TRANSPORT] Paused at {:.3}s", self.playhead_position);
                true
            }
            _ => {
                debug!("[TRANSPORT] Pause ignored while {}", self.state);
                false
            }
        }
    }

    /// Resume a paused session
    ///
    /// Returns true if the state changed.
    pub fn resume(&mut self) -> bool {
        match self.state {
            PlaybackState::Paused => {
                self.state = PlaybackState::Playing;
                debug!("[TRANSPORT] Resumed at {:.3}s", self.playhead_position);
                true
            }
            _ => {
                debug!("[TRANSPORT] Resume ignored while {}", self.state);
                false
            }
        }
    }

    /// End the session from any state
    ///
    /// Resets the playhead, drops any staged retune and returns the state
    /// the transport was in.
    pub fn stop(&mut self) -> PlaybackState {
        let previous = self.state;
        self.state = PlaybackState::Stopped;
        self.playhead_position = 0.0;
        self.staged_retune = None;
        if previous != PlaybackState::Stopped {
            debug!("[TRANSPORT] Stopped (was {})", previous);
        }
        previous
    }

    // ========================================================================
    // Retune Staging
    // ========================================================================

    /// Remember a frequency change to apply once playback resumes
    pub fn stage_retune(&mut self, frequency_hz: f32) {
        self.staged_retune = Some(frequency_hz);
        debug!("[TRANSPORT] Retune to {:.2} Hz staged", frequency_hz);
    }

    pub fn staged_retune(&self) -> Option<f32> {
        self.staged_retune
    }

    /// Hand over the staged retune, clearing it
    pub fn take_staged_retune(&mut self) -> Option<f32> {
        self.staged_retune.take()
    }

    // ========================================================================
    // Playhead
    // ========================================================================

    /// Update the playhead after rendering `samples_elapsed` frames
    pub fn advance_playhead(&mut self, samples_elapsed: u64) {
        if self.state == PlaybackState::Playing {
            self.playhead_position += samples_elapsed as f64 / self.sample_rate as f64;
        }
    }

    /// Seconds the session has been sounding
    pub fn playhead_position(&self) -> f64 {
        self.playhead_position
    }

    pub fn playhead_position_samples(&self) -> u64 {
        (self.playhead_position * self.sample_rate as f64) as u64
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state == PlaybackState::Stopped
    }

    /// A graph exists while playing or paused
    pub fn is_active(&self) -> bool {
        self.state != PlaybackState::Stopped
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------------
    // Basic State Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_default_state_is_stopped() {
        let transport = Transport::default();
        assert!(transport.is_stopped());
        assert!(!transport.is_active());
        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert_eq!(transport.sample_rate(), 48000);
    }

    // ------------------------------------------------------------------------
    // State Transition Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_full_cycle() {
        let mut transport = Transport::new(48000);

        transport.start().unwrap();
        assert!(transport.is_playing());

        assert!(transport.pause());
        assert!(transport.is_paused());
        assert!(transport.is_active());

        assert!(transport.resume());
        assert!(transport.is_playing());

        assert_eq!(transport.stop(), PlaybackState::Playing);
        assert!(transport.is_stopped());
    }

    #[test]
    fn test_start_rejected_unless_stopped() {
        let mut transport = Transport::new(48000);
        transport.start().unwrap();

        let err = transport.start().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");

        transport.pause();
        assert!(transport.start().is_err());
        assert!(transport.is_paused());
    }

    #[test]
    fn test_pause_and_resume_are_no_ops_in_wrong_state() {
        let mut transport = Transport::new(48000);
        assert!(!transport.pause());
        assert!(!transport.resume());
        assert!(transport.is_stopped());

        transport.start().unwrap();
        assert!(!transport.resume());
        assert!(transport.is_playing());
    }

    #[test]
    fn test_stop_from_paused() {
        let mut transport = Transport::new(48000);
        transport.start().unwrap();
        transport.pause();
        assert_eq!(transport.stop(), PlaybackState::Paused);
        assert_eq!(transport.stop(), PlaybackState::Stopped);
    }

    // ------------------------------------------------------------------------
    // Playhead Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_advance_playhead_only_while_playing() {
        let mut transport = Transport::new(48000);
        transport.advance_playhead(48000);
        assert_eq!(transport.playhead_position(), 0.0);

        transport.start().unwrap();
        transport.advance_playhead(72000);
        assert!((transport.playhead_position() - 1.5).abs() < 0.0001);
        assert_eq!(transport.playhead_position_samples(), 72000);

        transport.pause();
        transport.advance_playhead(48000);
        assert!((transport.playhead_position() - 1.5).abs() < 0.0001);
    }

    #[test]
    fn test_stop_resets_playhead() {
        let mut transport = Transport::new(48000);
        transport.start().unwrap();
        transport.advance_playhead(48000);
        transport.stop();
        assert_eq!(transport.playhead_position(), 0.0);
    }

    // ------------------------------------------------------------------------
    // Retune Staging Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_staged_retune_is_taken_once() {
        let mut transport = Transport::new(48000);
        transport.start().unwrap();
        transport.pause();
        transport.stage_retune(12.0);
        transport.stage_retune(14.0);

        assert_eq!(transport.staged_retune(), Some(14.0));
        assert_eq!(transport.take_staged_retune(), Some(14.0));
        assert_eq!(transport.take_staged_retune(), None);
    }

    #[test]
    fn test_stop_drops_staged_retune() {
        let mut transport = Transport::new(48000);
        transport.start().unwrap();
        transport.pause();
        transport.stage_retune(5.0);
        transport.stop();
        assert_eq!(transport.staged_retune(), None);
    }

    #[test]
    fn test_playback_state_display() {
        assert_eq!(format!("{}", PlaybackState::Stopped), "Stopped");
        assert_eq!(format!("{}", PlaybackState::Playing), "Playing");
        assert_eq!(format!("{}", PlaybackState::Paused), "Paused");
    }
}
