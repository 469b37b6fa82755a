//! Tone Graph Builder
//!
//! Materializes the oscillator and gain topology for one tone session:
//!
//! - Binaural: left oscillator at the 300 Hz carrier, right oscillator at
//!   carrier + beat, each on its own channel of a two-input merger, merged
//!   signal into the session gain stage.
//! - Mono: one oscillator straight into the gain stage.
//! - Power-nap: one oscillator whose frequency ramps from the upper to the
//!   lower frequency, holds, then ramps back up before the oscillator stops.
//!
//! The gain stage of every graph feeds the shared output chain supplied by
//! the caller.

use log::{debug, warn};

use crate::config::{
    validate_beat_frequency, validate_mono_frequency, validate_volume, PowerNapSettings,
    ToneConfiguration, ToneMode, BASE_FREQUENCY_HZ,
};
use crate::engine::context::RenderContext;
use crate::error::{BinauralError, Result};
use crate::graph::arena::NodeId;

// ============================================================================
// Power-Nap Schedule
// ============================================================================

/// Share of the sweep spent on each ramp
pub const POWER_NAP_RAMP_FRACTION: f64 = 0.15;

/// Share of the sweep spent holding the lower frequency
pub const POWER_NAP_HOLD_FRACTION: f64 = 0.70;

/// Timing of a power-nap sweep on the context clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerNapSchedule {
    /// Clock time the sweep begins
    pub start: f64,
    /// Length of each of the two ramps
    pub ramp_secs: f64,
    /// Length of the hold at the lower frequency
    pub hold_secs: f64,
}

impl PowerNapSchedule {
    pub fn new(start: f64, duration_secs: f64) -> Self {
        Self {
            start,
            ramp_secs: duration_secs * POWER_NAP_RAMP_FRACTION,
            hold_secs: duration_secs * POWER_NAP_HOLD_FRACTION,
        }
    }

    /// Full sweep length, `2 * ramp + hold`
    pub fn total(&self) -> f64 {
        2.0 * self.ramp_secs + self.hold_secs
    }

    /// Clock time the lower frequency is first reached
    pub fn ramp_down_end(&self) -> f64 {
        self.start + self.ramp_secs
    }

    /// Clock time the climb back up begins
    pub fn hold_end(&self) -> f64 {
        self.ramp_down_end() + self.hold_secs
    }

    /// Clock time the oscillator stops
    pub fn end(&self) -> f64 {
        self.start + self.total()
    }
}

// ============================================================================
// Graph Handle
// ============================================================================

/// Oscillators owned by a session, by mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToneVoices {
    Binaural {
        left: NodeId,
        right: NodeId,
        merger: NodeId,
    },
    Mono {
        oscillator: NodeId,
    },
    PowerNap {
        oscillator: NodeId,
        schedule: PowerNapSchedule,
    },
}

/// Every node of one session's tone graph
///
/// Owned by exactly one session and released in bulk by `teardown`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioGraphHandle {
    mode: ToneMode,
    voices: ToneVoices,
    gain: NodeId,
}

impl AudioGraphHandle {
    pub fn mode(&self) -> ToneMode {
        self.mode
    }

    pub fn voices(&self) -> &ToneVoices {
        &self.voices
    }

    /// The session gain stage, which feeds the output chain
    pub fn gain(&self) -> NodeId {
        self.gain
    }

    /// Every node in the graph
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes = match self.voices {
            ToneVoices::Binaural {
                left,
                right,
                merger,
            } => vec![left, right, merger],
            ToneVoices::Mono { oscillator } | ToneVoices::PowerNap { oscillator, .. } => {
                vec![oscillator]
            }
        };
        nodes.push(self.gain);
        nodes
    }

    /// Oscillators in the graph
    pub fn oscillators(&self) -> Vec<NodeId> {
        match self.voices {
            ToneVoices::Binaural { left, right, .. } => vec![left, right],
            ToneVoices::Mono { oscillator } | ToneVoices::PowerNap { oscillator, .. } => {
                vec![oscillator]
            }
        }
    }

    /// The oscillator a retune acts on: right in binaural, the only one otherwise
    pub fn tuned_oscillator(&self) -> NodeId {
        match self.voices {
            ToneVoices::Binaural { right, .. } => right,
            ToneVoices::Mono { oscillator } | ToneVoices::PowerNap { oscillator, .. } => oscillator,
        }
    }

    pub fn power_nap_schedule(&self) -> Option<PowerNapSchedule> {
        match self.voices {
            ToneVoices::PowerNap { schedule, .. } => Some(schedule),
            _ => None,
        }
    }
}

// ============================================================================
// Build
// ============================================================================

/// Build the tone graph for `config` and connect its gain stage to `output`
///
/// Oscillators start at the current clock time. If any node cannot be
/// created or wired, the nodes already created are released before the
/// error is returned.
pub fn build(ctx: &mut RenderContext, config: &ToneConfiguration, output: NodeId) -> Result<AudioGraphHandle> {
    let mut created = Vec::new();
    match build_nodes(ctx, config, output, &mut created) {
        Ok(handle) => {
            debug!(
                "[GRAPH] Built {} graph with {} nodes",
                handle.mode,
                handle.nodes().len()
            );
            Ok(handle)
        }
        Err(e) => {
            let released = ctx.release(&created);
            warn!(
                "[GRAPH] Building {} graph failed, released {} node(s): {}",
                config.mode, released, e
            );
            Err(match e {
                e @ BinauralError::GraphConstruction { .. } => e,
                other => BinauralError::GraphConstruction {
                    reason: other.to_string(),
                },
            })
        }
    }
}

fn build_nodes(
    ctx: &mut RenderContext,
    config: &ToneConfiguration,
    output: NodeId,
    created: &mut Vec<NodeId>,
) -> Result<AudioGraphHandle> {
    let gain = track(created, ctx.create_gain(config.volume))?;
    let now = ctx.current_time();

    let voices = match config.mode {
        ToneMode::Binaural => {
            let left = track(created, ctx.create_oscillator(BASE_FREQUENCY_HZ))?;
            let right = track(created, ctx.create_oscillator(config.right_frequency_hz()))?;
            let merger = track(created, ctx.create_merger(2))?;
            ctx.connect(left, merger, 0)?;
            ctx.connect(right, merger, 1)?;
            ctx.connect(merger, gain, 0)?;
            ctx.start_source(left, now)?;
            ctx.start_source(right, now)?;
            ToneVoices::Binaural {
                left,
                right,
                merger,
            }
        }
        ToneMode::Mono => {
            let oscillator = track(created, ctx.create_oscillator(config.mono_frequency_hz))?;
            ctx.connect(oscillator, gain, 0)?;
            ctx.start_source(oscillator, now)?;
            ToneVoices::Mono { oscillator }
        }
        ToneMode::PowerNap => {
            let settings = &config.power_nap;
            let oscillator = track(created, ctx.create_oscillator(settings.upper_frequency_hz))?;
            ctx.connect(oscillator, gain, 0)?;
            let schedule = schedule_power_nap(ctx, oscillator, settings, now)?;
            ToneVoices::PowerNap {
                oscillator,
                schedule,
            }
        }
    };

    ctx.connect(gain, output, 0)?;

    Ok(AudioGraphHandle {
        mode: config.mode,
        voices,
        gain,
    })
}

fn track(created: &mut Vec<NodeId>, node: Result<NodeId>) -> Result<NodeId> {
    let id = node?;
    created.push(id);
    Ok(id)
}

// upper -> ramp -> lower -> hold -> ramp -> upper, then stop
fn schedule_power_nap(
    ctx: &mut RenderContext,
    oscillator: NodeId,
    settings: &PowerNapSettings,
    now: f64,
) -> Result<PowerNapSchedule> {
    let schedule = PowerNapSchedule::new(now, settings.duration_secs as f64);
    let upper = settings.upper_frequency_hz;
    let lower = settings.lower_frequency_hz;

    let osc = ctx.oscillator_mut(oscillator)?;
    osc.frequency.set_value_at_time(upper, schedule.start);
    osc.frequency
        .linear_ramp_to_value_at_time(lower, schedule.ramp_down_end());
    osc.frequency.set_value_at_time(lower, schedule.hold_end());
    osc.frequency.linear_ramp_to_value_at_time(upper, schedule.end());
    osc.start(schedule.start);
    osc.stop(schedule.end());

    debug!(
        "[GRAPH] Power-nap sweep {:.1} -> {:.1} Hz over {:.1}s",
        upper,
        lower,
        schedule.total()
    );
    Ok(schedule)
}

// ============================================================================
// Live Updates
// ============================================================================

/// Push a new beat (binaural) or tone (mono) frequency into a running graph
///
/// Only the frequency parameter of the right or mono oscillator changes, at
/// the current clock time. Power-nap sweeps cannot be retuned.
pub fn retune(ctx: &mut RenderContext, handle: &AudioGraphHandle, frequency_hz: f32) -> Result<()> {
    let target = match handle.mode {
        ToneMode::Binaural => BASE_FREQUENCY_HZ + validate_beat_frequency(frequency_hz)?,
        ToneMode::Mono => validate_mono_frequency(frequency_hz)?,
        ToneMode::PowerNap => {
            return Err(BinauralError::InvalidState {
                operation: "retune",
                state: "running a power-nap sweep".to_string(),
            })
        }
    };

    let now = ctx.current_time();
    ctx.oscillator_mut(handle.tuned_oscillator())?
        .frequency
        .set_value_at_time(target, now);
    debug!("[GRAPH] Retuned to {:.2} Hz at {:.3}s", target, now);
    Ok(())
}

/// Set the session gain stage
pub fn set_volume(ctx: &mut RenderContext, handle: &AudioGraphHandle, volume: f32) -> Result<()> {
    let volume = validate_volume("volume", volume)?;
    let now = ctx.current_time();
    ctx.gain_mut(handle.gain)?.gain.set_value_at_time(volume, now);
    Ok(())
}

/// Stop every oscillator and release all nodes of the graph
pub fn teardown(ctx: &mut RenderContext, handle: AudioGraphHandle) -> usize {
    let now = ctx.current_time();
    for oscillator in handle.oscillators() {
        // Already released nodes are skipped by the bulk release below
        let _ = ctx.stop_source(oscillator, now);
    }
    let released = ctx.release(&handle.nodes());
    debug!("[GRAPH] Tore down {} graph ({} nodes)", handle.mode, released);
    released
}

/// Frequency the right (or only) oscillator is set to right now
pub fn tuned_frequency(ctx: &RenderContext, handle: &AudioGraphHandle) -> Result<f32> {
    let osc = ctx.oscillator(handle.tuned_oscillator())?;
    Ok(osc.frequency.value_at(ctx.current_time()))
}

/// Frequency of the left oscillator in binaural mode
pub fn left_frequency(ctx: &RenderContext, handle: &AudioGraphHandle) -> Option<f32> {
    match handle.voices {
        ToneVoices::Binaural { left, .. } => ctx
            .oscillator(left)
            .ok()
            .map(|osc| osc.frequency.value_at(ctx.current_time())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn context_with_output() -> (RenderContext, NodeId) {
        let mut ctx = RenderContext::new(48000);
        let master = ctx.create_gain(1.0).unwrap();
        ctx.connect_to_destination(master).unwrap();
        (ctx, master)
    }

    #[test]
    fn test_right_frequency_is_base_plus_beat_at_build() {
        for beat in 0..=50 {
            let (mut ctx, master) = context_with_output();
            let config = ToneConfiguration::binaural(beat as f32);
            let handle = build(&mut ctx, &config, master).unwrap();

            assert_eq!(tuned_frequency(&ctx, &handle).unwrap(), 300.0 + beat as f32);
            assert_eq!(left_frequency(&ctx, &handle), Some(300.0));
        }
    }

    #[test]
    fn test_right_frequency_is_base_plus_beat_after_retune() {
        let (mut ctx, master) = context_with_output();
        let handle = build(&mut ctx, &ToneConfiguration::binaural(10.0), master).unwrap();

        for beat in 0..=50 {
            ctx.render(64);
            retune(&mut ctx, &handle, beat as f32).unwrap();
            assert_eq!(tuned_frequency(&ctx, &handle).unwrap(), 300.0 + beat as f32);
            assert_eq!(left_frequency(&ctx, &handle), Some(300.0));
        }
    }

    #[test]
    fn test_retune_rejects_out_of_range_beat() {
        let (mut ctx, master) = context_with_output();
        let handle = build(&mut ctx, &ToneConfiguration::binaural(10.0), master).unwrap();

        let err = retune(&mut ctx, &handle, 51.0).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
        assert_eq!(tuned_frequency(&ctx, &handle).unwrap(), 310.0);
    }

    #[test]
    fn test_mono_graph_has_single_oscillator() {
        let (mut ctx, master) = context_with_output();
        let handle = build(&mut ctx, &ToneConfiguration::mono(440.0), master).unwrap();

        assert_eq!(handle.oscillators().len(), 1);
        assert_eq!(handle.nodes().len(), 2);
        assert_eq!(tuned_frequency(&ctx, &handle).unwrap(), 440.0);
        assert_eq!(left_frequency(&ctx, &handle), None);
    }

    #[test]
    fn test_power_nap_partition() {
        for duration in [1.0, 60.0, 1200.0, 3.7] {
            let schedule = PowerNapSchedule::new(0.0, duration);
            assert_abs_diff_eq!(schedule.ramp_secs, 0.15 * duration, epsilon = 1e-9);
            assert_abs_diff_eq!(schedule.hold_secs, 0.70 * duration, epsilon = 1e-9);
            assert_abs_diff_eq!(schedule.total(), duration, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_power_nap_frequency_schedule() {
        let (mut ctx, master) = context_with_output();
        let settings = PowerNapSettings::new(300.0, 150.0, 100.0).unwrap();
        let handle = build(&mut ctx, &ToneConfiguration::power_nap(settings), master).unwrap();
        let osc = ctx.oscillator(handle.tuned_oscillator()).unwrap();

        assert_abs_diff_eq!(osc.frequency.value_at(0.0), 300.0);
        assert_abs_diff_eq!(osc.frequency.value_at(7.5), 225.0, epsilon = 1e-3);
        assert_abs_diff_eq!(osc.frequency.value_at(15.0), 150.0, epsilon = 1e-3);
        assert_abs_diff_eq!(osc.frequency.value_at(50.0), 150.0);
        assert_abs_diff_eq!(osc.frequency.value_at(85.0), 150.0);
        assert_abs_diff_eq!(osc.frequency.value_at(92.5), 225.0, epsilon = 1e-3);
        assert_abs_diff_eq!(osc.frequency.value_at(100.0), 300.0);
        assert_abs_diff_eq!(osc.stop_time().unwrap(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_power_nap_cannot_be_retuned() {
        let (mut ctx, master) = context_with_output();
        let config = ToneConfiguration::power_nap(PowerNapSettings::default());
        let handle = build(&mut ctx, &config, master).unwrap();
        assert!(retune(&mut ctx, &handle, 200.0).is_err());
    }

    #[test]
    fn test_failed_build_releases_partial_nodes() {
        // Room for the master plus two graph nodes; binaural needs four
        let mut ctx = RenderContext::with_capacity(48000, 3);
        let master = ctx.create_gain(1.0).unwrap();

        let err = build(&mut ctx, &ToneConfiguration::binaural(10.0), master).unwrap_err();
        assert_eq!(err.error_code(), "GRAPH_CONSTRUCTION");
        assert_eq!(ctx.live_nodes(), 1);
    }

    #[test]
    fn test_teardown_releases_everything() {
        let (mut ctx, master) = context_with_output();
        let handle = build(&mut ctx, &ToneConfiguration::binaural(7.0), master).unwrap();
        assert_eq!(ctx.live_nodes(), 5);

        assert_eq!(teardown(&mut ctx, handle), 4);
        assert_eq!(ctx.live_nodes(), 1);
    }

    #[test]
    fn test_set_volume_updates_gain_stage() {
        let (mut ctx, master) = context_with_output();
        let handle = build(&mut ctx, &ToneConfiguration::mono(440.0), master).unwrap();
        set_volume(&mut ctx, &handle, 0.25).unwrap();
        assert_eq!(ctx.gain(handle.gain()).unwrap().gain.final_value(), 0.25);
        assert!(set_volume(&mut ctx, &handle, 1.5).is_err());
    }
}
