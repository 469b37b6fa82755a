//! Background music track
//!
//! An optional decoded WAV file looped under the tones at its own gain
//! stage. The loop state is explicit: when a source that should be looping
//! is found finished while the session is still running, `maintain`
//! starts a fresh one.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::{validate_volume, DEFAULT_MUSIC_VOLUME};
use crate::engine::buffer::AudioBuffer;
use crate::engine::context::RenderContext;
use crate::engine::io::{import_audio, resample};
use crate::error::Result;
use crate::graph::arena::NodeId;
use crate::graph::node::SourceState;

/// Whether a looping source is currently playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    Looping { source: NodeId },
}

/// A loaded background track
#[derive(Debug, Clone)]
pub struct BackgroundTrack {
    name: Option<String>,
    buffer: Option<Arc<AudioBuffer>>,
    volume: f32,
    state: LoopState,
}

impl Default for BackgroundTrack {
    fn default() -> Self {
        Self {
            name: None,
            buffer: None,
            volume: DEFAULT_MUSIC_VOLUME,
            state: LoopState::Idle,
        }
    }
}

impl BackgroundTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a WAV file, resampled to `sample_rate`
    ///
    /// On failure the previously loaded track, if any, is kept.
    pub fn load(&mut self, path: &Path, sample_rate: u32) -> Result<String> {
        let audio = import_audio(path)?;
        let audio = if audio.sample_rate == sample_rate {
            audio
        } else {
            resample(&audio, sample_rate)
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        info!(
            "[MUSIC] Loaded {} ({:.1}s, {} channel(s))",
            name,
            audio.duration_secs(),
            audio.channels()
        );
        self.set_buffer(name.clone(), audio);
        Ok(name)
    }

    /// Use an already decoded buffer as the track
    pub fn set_buffer(&mut self, name: String, audio: AudioBuffer) {
        self.name = Some(name);
        self.buffer = Some(Arc::new(audio));
    }

    /// Forget the loaded track; call `stop` first if it is playing
    pub fn clear(&mut self) {
        self.name = None;
        self.buffer = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.volume = validate_volume("music volume", volume)?;
        Ok(())
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, LoopState::Looping { .. })
    }

    /// Start looping into `music_gain`; does nothing without a track
    pub fn start(&mut self, ctx: &mut RenderContext, music_gain: NodeId) -> Result<()> {
        let Some(buffer) = self.buffer.clone() else {
            return Ok(());
        };
        if self.is_playing() {
            self.stop(ctx);
        }

        let source = ctx.create_buffer_source(buffer, true)?;
        if let Err(e) = ctx
            .connect(source, music_gain, 0)
            .and_then(|_| ctx.start_source(source, ctx.current_time()))
        {
            ctx.release(&[source]);
            return Err(e);
        }
        self.state = LoopState::Looping { source };
        debug!("[MUSIC] Loop started");
        Ok(())
    }

    /// Stop and release the looping source
    pub fn stop(&mut self, ctx: &mut RenderContext) {
        if let LoopState::Looping { source } = std::mem::take(&mut self.state) {
            let now = ctx.current_time();
            let _ = ctx.stop_source(source, now);
            ctx.release(&[source]);
            debug!("[MUSIC] Loop stopped");
        }
    }

    /// Restart the loop if its source ended while the session is active
    ///
    /// Returns true when a restart happened.
    pub fn maintain(
        &mut self,
        ctx: &mut RenderContext,
        music_gain: NodeId,
        session_active: bool,
    ) -> Result<bool> {
        let LoopState::Looping { source } = self.state else {
            return Ok(false);
        };

        let ended = !matches!(
            ctx.source_state(source),
            Some(SourceState::Playing) | Some(SourceState::Scheduled)
        );
        if !ended {
            return Ok(false);
        }

        ctx.release(&[source]);
        self.state = LoopState::Idle;
        if !session_active {
            return Ok(false);
        }

        warn!("[MUSIC] Loop ended unexpectedly, restarting");
        self.start(ctx, music_gain)?;
        Ok(true)
    }
}
