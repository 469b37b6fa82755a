//! Playback Controller
//!
//! Owns the rendering context and drives one tone session at a time through
//! Stopped -> Playing -> Paused -> Playing -> Stopped. Starting a session
//! builds the tone graph, starts the capture and the background loop;
//! stopping tears the graph down, finalizes the capture and hands it to the
//! verification worker.
//!
//! Every failure is reported to the status sink and leaves the controller
//! in the last consistent state.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::background::BackgroundTrack;
use crate::capture::artifact::CaptureArtifact;
use crate::capture::format::CodecRegistry;
use crate::capture::recorder::Recorder;
use crate::config::{
    validate_beat_frequency, validate_mono_frequency, validate_volume, PowerNapSettings,
    ToneConfiguration, ToneMode,
};
use crate::engine::buffer::AudioBuffer;
use crate::engine::context::{ContextState, RenderContext};
use crate::engine::transport::{PlaybackState, Transport};
use crate::error::{BinauralError, Result};
use crate::graph::arena::NodeId;
use crate::graph::builder::{self, AudioGraphHandle};
use crate::graph::node::SourceState;
use crate::session::SessionId;
use crate::status::{LogStatusSink, StatusEvent, StatusSink};
use crate::verify::{VerificationReport, VerificationResult, VerificationWorker};

/// Gain stages shared by every session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputChain {
    master: NodeId,
    music: NodeId,
}

/// Session state machine and owner of the rendering context
pub struct PlaybackController {
    ctx: RenderContext,
    config: ToneConfiguration,
    transport: Transport,
    output: Option<OutputChain>,
    graph: Option<AudioGraphHandle>,
    recorder: Option<Recorder>,
    codecs: CodecRegistry,
    music: BackgroundTrack,
    worker: VerificationWorker,
    session_id: Option<SessionId>,
    awaiting: Option<SessionId>,
    last_artifact: Option<Arc<CaptureArtifact>>,
    last_result: Option<VerificationResult>,
    status: Box<dyn StatusSink>,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.transport.state())
            .field("mode", &self.config.mode)
            .field("session_id", &self.session_id)
            .field("awaiting", &self.awaiting)
            .field("live_nodes", &self.ctx.live_nodes())
            .finish()
    }
}

impl PlaybackController {
    /// Controller with default configuration, logging its status events
    pub fn new(sample_rate: u32) -> Self {
        Self::with_context(RenderContext::new(sample_rate), ToneConfiguration::default())
    }

    pub fn with_context(ctx: RenderContext, config: ToneConfiguration) -> Self {
        let sample_rate = ctx.sample_rate();
        let mut music = BackgroundTrack::new();
        if let Err(e) = music.set_volume(config.music_volume) {
            warn!("[CONTROLLER] Ignoring music volume: {}", e);
        }
        Self {
            ctx,
            config,
            transport: Transport::new(sample_rate),
            output: None,
            graph: None,
            recorder: None,
            codecs: CodecRegistry::with_defaults(),
            music,
            worker: VerificationWorker::default(),
            session_id: None,
            awaiting: None,
            last_artifact: None,
            last_result: None,
            status: Box::new(LogStatusSink),
        }
    }

    pub fn with_status_sink(mut self, sink: Box<dyn StatusSink>) -> Self {
        self.status = sink;
        self
    }

    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_worker(mut self, worker: VerificationWorker) -> Self {
        self.worker = worker;
        self
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Start a new session, or resume a paused one
    pub fn play(&mut self) -> Result<()> {
        match self.transport.state() {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => self.resume(),
            PlaybackState::Stopped => self.start_session(),
        }
    }

    fn start_session(&mut self) -> Result<()> {
        self.config.validate()?;

        let output = match self.ensure_output_chain() {
            Ok(output) => output,
            Err(e) => {
                self.report(StatusEvent::GraphConstructionFailed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };
        self.ctx.resume();

        let handle = match builder::build(&mut self.ctx, &self.config, output.master) {
            Ok(handle) => handle,
            Err(e) => {
                self.report(StatusEvent::GraphConstructionFailed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        self.transport.start()?;
        let session_id = SessionId::new();
        self.session_id = Some(session_id);
        // A new session supersedes any verification still in flight
        self.awaiting = None;
        self.graph = Some(handle);

        match Recorder::start(&mut self.ctx, output.master, &self.codecs, session_id) {
            Ok(recorder) => self.recorder = Some(recorder),
            Err(e) => self.report(StatusEvent::RecordingFailed {
                reason: e.to_string(),
            }),
        }

        if let Err(e) = self.music.start(&mut self.ctx, output.music) {
            warn!("[CONTROLLER] Background track did not start: {}", e);
        }

        info!(
            "[CONTROLLER] Session {} started in {} mode",
            session_id, self.config.mode
        );
        let event = match self.config.mode {
            ToneMode::PowerNap => StatusEvent::PowerNapStarted {
                duration_secs: self.config.power_nap.duration_secs,
            },
            mode => StatusEvent::Playing {
                mode,
                with_music: self.music.is_playing(),
            },
        };
        self.report(event);
        Ok(())
    }

    // The staged retune is applied while still paused, so a failure leaves
    // the session paused with the retune still staged.
    fn resume(&mut self) -> Result<()> {
        if let (Some(hz), Some(handle)) = (self.transport.staged_retune(), &self.graph) {
            builder::retune(&mut self.ctx, handle, hz)?;
        }
        self.transport.take_staged_retune();

        self.ctx.resume();
        self.transport.resume();

        self.report(StatusEvent::Playing {
            mode: self.config.mode,
            with_music: self.music.is_playing(),
        });
        Ok(())
    }

    /// Freeze a playing session; returns true if it was playing
    pub fn pause(&mut self) -> bool {
        if !self.transport.pause() {
            return false;
        }
        self.ctx.suspend();
        self.report(StatusEvent::Paused);
        true
    }

    /// End the current session
    ///
    /// Tears the graph down, stops the background loop, finalizes the
    /// capture and submits it for verification. Returns the state the
    /// controller was in.
    pub fn stop(&mut self) -> PlaybackState {
        let previous = self.transport.state();
        if previous == PlaybackState::Stopped {
            return previous;
        }

        self.ctx.resume();

        if let Some(handle) = self.graph.take() {
            builder::teardown(&mut self.ctx, handle);
        }
        self.music.stop(&mut self.ctx);

        if let Some(recorder) = self.recorder.take() {
            let target = self.config.target_frequency_hz();
            match recorder.finalize(&mut self.ctx, self.config.mode, target) {
                Ok(artifact) => {
                    let artifact = Arc::new(artifact);
                    self.last_artifact = Some(Arc::clone(&artifact));
                    self.submit_for_verification(artifact);
                }
                Err(e) => self.report(StatusEvent::RecordingFailed {
                    reason: e.to_string(),
                }),
            }
        }

        self.transport.stop();
        debug!("[CONTROLLER] Stopped (was {})", previous);
        self.report(StatusEvent::Stopped);
        previous
    }

    // ========================================================================
    // Live Parameters
    // ========================================================================

    /// Change the beat frequency (0 to 50 Hz)
    ///
    /// Applied immediately while playing, staged while paused.
    pub fn set_beat_frequency(&mut self, hz: f32) -> Result<()> {
        let hz = validate_beat_frequency(hz)?;
        self.config.beat_frequency_hz = hz;
        self.apply_retune(ToneMode::Binaural, hz)
    }

    /// Change the pure tone frequency (20 to 20000 Hz)
    pub fn set_mono_frequency(&mut self, hz: f32) -> Result<()> {
        let hz = validate_mono_frequency(hz)?;
        self.config.mono_frequency_hz = hz;
        self.apply_retune(ToneMode::Mono, hz)
    }

    fn apply_retune(&mut self, mode: ToneMode, hz: f32) -> Result<()> {
        let Some(handle) = &self.graph else {
            return Ok(());
        };
        if handle.mode() != mode {
            return Ok(());
        }
        match self.transport.state() {
            PlaybackState::Playing => builder::retune(&mut self.ctx, handle, hz),
            PlaybackState::Paused => {
                self.transport.stage_retune(hz);
                Ok(())
            }
            PlaybackState::Stopped => Ok(()),
        }
    }

    /// Tone gain stage level (0 to 1)
    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        let volume = validate_volume("volume", volume)?;
        self.config.volume = volume;
        if let Some(handle) = &self.graph {
            builder::set_volume(&mut self.ctx, handle, volume)?;
        }
        Ok(())
    }

    /// Background track gain stage level (0 to 1)
    pub fn set_music_volume(&mut self, volume: f32) -> Result<()> {
        let volume = validate_volume("music volume", volume)?;
        self.config.music_volume = volume;
        self.music.set_volume(volume)?;
        if let Some(output) = self.output {
            let now = self.ctx.current_time();
            self.ctx
                .gain_mut(output.music)?
                .gain
                .set_value_at_time(volume, now);
        }
        Ok(())
    }

    /// Select a different tone mode, stopping any running session
    pub fn switch_mode(&mut self, mode: ToneMode) {
        if mode == self.config.mode {
            return;
        }
        self.stop();
        self.config.mode = mode;
        debug!("[CONTROLLER] Mode switched to {}", mode);
    }

    /// Stop whatever is running and start a power-nap sweep
    pub fn start_power_nap(&mut self, settings: PowerNapSettings) -> Result<()> {
        settings.validate()?;
        self.stop();
        self.config.mode = ToneMode::PowerNap;
        self.config.power_nap = settings;
        self.play()
    }

    // ========================================================================
    // Background Track
    // ========================================================================

    /// Decode a WAV file to loop under the next session
    pub fn load_music(&mut self, path: &Path) -> Result<()> {
        match self.music.load(path, self.ctx.sample_rate()) {
            Ok(name) => {
                self.report(StatusEvent::MusicLoaded { name });
                Ok(())
            }
            Err(e) => {
                self.report(StatusEvent::DecodeFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Use an already decoded buffer as the background track
    pub fn set_music_buffer(&mut self, name: &str, audio: AudioBuffer) {
        self.music.set_buffer(name.to_string(), audio);
        self.report(StatusEvent::MusicLoaded {
            name: name.to_string(),
        });
    }

    pub fn clear_music(&mut self) {
        self.music.stop(&mut self.ctx);
        self.music.clear();
        self.report(StatusEvent::MusicCleared);
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Render the next block of stereo output
    ///
    /// Also restarts a background loop that ended early and stops the
    /// session once a power-nap sweep has finished.
    pub fn render(&mut self, frames: usize) -> AudioBuffer {
        let block = self.ctx.render(frames);
        self.transport.advance_playhead(frames as u64);

        if self.transport.is_playing() {
            if let Some(output) = self.output {
                if let Err(e) = self.music.maintain(&mut self.ctx, output.music, true) {
                    warn!("[CONTROLLER] Could not restart background track: {}", e);
                }
            }
        }

        if self.power_nap_finished() {
            info!("[CONTROLLER] Power nap complete");
            self.stop();
        }
        block
    }

    /// Render the next block as interleaved stereo samples
    pub fn render_interleaved(&mut self, frames: usize) -> Vec<f32> {
        self.render(frames).to_interleaved()
    }

    fn power_nap_finished(&self) -> bool {
        match &self.graph {
            Some(handle) if handle.mode() == ToneMode::PowerNap => matches!(
                self.ctx.source_state(handle.tuned_oscillator()),
                Some(SourceState::Finished)
            ),
            _ => false,
        }
    }

    // ========================================================================
    // Verification
    // ========================================================================

    /// Drain finished verification reports
    ///
    /// Returns the result for the session awaiting verification, if it has
    /// arrived. Reports for any other session are dropped.
    pub fn poll_verification(&mut self) -> Option<VerificationResult> {
        let mut accepted = None;
        while let Some(report) = self.worker.try_recv() {
            if let Some(result) = self.handle_report(report) {
                accepted = Some(result);
            }
        }
        accepted
    }

    /// Block until the awaited verification arrives or `timeout` passes
    pub fn wait_for_verification(&mut self, timeout: Duration) -> Option<VerificationResult> {
        let deadline = Instant::now() + timeout;
        while self.awaiting.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let report = self.worker.recv_timeout(remaining)?;
            if let Some(result) = self.handle_report(report) {
                return Some(result);
            }
        }
        None
    }

    fn submit_for_verification(&mut self, artifact: Arc<CaptureArtifact>) {
        let session_id = artifact.session_id;
        match self.worker.submit(artifact) {
            Ok(()) => self.awaiting = Some(session_id),
            Err(e) => {
                self.awaiting = None;
                self.report(StatusEvent::VerificationUnavailable {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn handle_report(&mut self, report: VerificationReport) -> Option<VerificationResult> {
        if self.awaiting != Some(report.session_id) {
            debug!(
                "[CONTROLLER] Dropping verification for stale session {}",
                report.session_id
            );
            return None;
        }
        self.awaiting = None;

        match report.outcome {
            Ok(Some(result)) => {
                let event = if result.passed {
                    StatusEvent::VerificationPassed {
                        detected_hz: result.detected_hz,
                    }
                } else {
                    StatusEvent::VerificationFailed {
                        detected_hz: result.detected_hz,
                        expected_hz: result.target_hz,
                    }
                };
                self.report(event);
                self.last_result = Some(result.clone());
                Some(result)
            }
            Ok(None) => None,
            Err(e) => {
                if self
                    .last_artifact
                    .as_ref()
                    .is_some_and(|a| a.session_id == report.session_id)
                {
                    self.last_artifact = None;
                }
                self.report(StatusEvent::DecodeFailed {
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_output_chain(&mut self) -> Result<OutputChain> {
        if let Some(output) = self.output {
            return Ok(output);
        }
        self.report(StatusEvent::Loading);

        if self.ctx.state() == ContextState::Closed {
            return Err(BinauralError::GraphConstruction {
                reason: "rendering context is closed".to_string(),
            });
        }

        let master = self.ctx.create_gain(1.0)?;
        let music = match self.ctx.create_gain(self.music.volume()) {
            Ok(music) => music,
            Err(e) => {
                self.ctx.release(&[master]);
                return Err(e);
            }
        };
        if let Err(e) = self
            .ctx
            .connect(music, master, 0)
            .and_then(|_| self.ctx.connect_to_destination(master))
        {
            self.ctx.release(&[master, music]);
            return Err(e);
        }

        let output = OutputChain { master, music };
        self.output = Some(output);
        debug!("[CONTROLLER] Output chain ready");
        Ok(output)
    }

    fn report(&mut self, event: StatusEvent) {
        self.status.report(event);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn state(&self) -> PlaybackState {
        self.transport.state()
    }

    pub fn config(&self) -> &ToneConfiguration {
        &self.config
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    pub fn graph(&self) -> Option<&AudioGraphHandle> {
        self.graph.as_ref()
    }

    pub fn music(&self) -> &BackgroundTrack {
        &self.music
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    /// Session whose verification has not been reported yet
    pub fn awaiting_verification(&self) -> Option<SessionId> {
        self.awaiting
    }

    /// Most recent capture, kept for download
    pub fn last_artifact(&self) -> Option<Arc<CaptureArtifact>> {
        self.last_artifact.clone()
    }

    pub fn last_result(&self) -> Option<&VerificationResult> {
        self.last_result.as_ref()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    /// Seconds held by the running capture, 0 when not recording
    pub fn captured_secs(&self) -> f64 {
        self.recorder
            .as_ref()
            .map_or(0.0, |recorder| recorder.captured_secs(&self.ctx))
    }

    /// Frequency the right (binaural) or only oscillator is set to
    pub fn tuned_frequency_hz(&self) -> Option<f32> {
        self.graph
            .as_ref()
            .and_then(|handle| builder::tuned_frequency(&self.ctx, handle).ok())
    }
}
