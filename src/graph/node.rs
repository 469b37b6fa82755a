//! Audio graph nodes
//!
//! Only the handful of node types the tone graphs need: sine oscillators,
//! gain stages, a stereo channel merger and a looping buffer source for
//! background tracks. Each node renders one block at a time given the
//! block's start time on the context clock.

use std::f64::consts::TAU;
use std::fmt;
use std::sync::Arc;

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::graph::param::AudioParam;

/// Node type tag, used in logs and error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Oscillator,
    Gain,
    ChannelMerger,
    BufferSource,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Oscillator => write!(f, "oscillator"),
            NodeKind::Gain => write!(f, "gain"),
            NodeKind::ChannelMerger => write!(f, "channel merger"),
            NodeKind::BufferSource => write!(f, "buffer source"),
        }
    }
}

/// Lifecycle of a scheduled source node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Not started yet
    Idle,
    /// Start time is in the future
    Scheduled,
    Playing,
    /// Stop time has passed, or a non-looping buffer ran out
    Finished,
}

// ============================================================================
// Oscillator
// ============================================================================

/// Pure sine generator with an automatable frequency
#[derive(Debug, Clone)]
pub struct OscillatorNode {
    pub frequency: AudioParam,
    phase: f64,
    start_time: Option<f64>,
    stop_time: Option<f64>,
    finished: bool,
}

impl OscillatorNode {
    pub fn new(frequency_hz: f32) -> Self {
        Self {
            frequency: AudioParam::new(frequency_hz),
            phase: 0.0,
            start_time: None,
            stop_time: None,
            finished: false,
        }
    }

    pub fn start(&mut self, when: f64) {
        self.start_time = Some(when);
    }

    pub fn stop(&mut self, when: f64) {
        self.stop_time = Some(when);
    }

    pub fn stop_time(&self) -> Option<f64> {
        self.stop_time
    }

    pub fn state(&self, now: f64) -> SourceState {
        match self.start_time {
            _ if self.finished => SourceState::Finished,
            None => SourceState::Idle,
            Some(start) if now < start => SourceState::Scheduled,
            Some(_) => match self.stop_time {
                Some(stop) if now >= stop => SourceState::Finished,
                _ => SourceState::Playing,
            },
        }
    }

    fn render(&mut self, block_start: f64, sample_rate: u32, frames: usize) -> AudioBuffer {
        let mut out = AudioBuffer::new(frames, ChannelLayout::Mono, sample_rate);
        let Some(start) = self.start_time else {
            return out;
        };

        let dt = 1.0 / sample_rate as f64;
        for (k, sample) in out.samples[0].iter_mut().enumerate() {
            let t = block_start + k as f64 * dt;
            if t < start {
                continue;
            }
            if matches!(self.stop_time, Some(stop) if t >= stop) {
                self.finished = true;
                break;
            }
            *sample = self.phase.sin() as f32;
            self.phase = (self.phase + TAU * self.frequency.value_at(t) as f64 * dt) % TAU;
        }
        out
    }
}

// ============================================================================
// Gain
// ============================================================================

/// Volume stage
#[derive(Debug, Clone)]
pub struct GainNode {
    pub gain: AudioParam,
}

impl GainNode {
    pub fn new(gain: f32) -> Self {
        Self {
            gain: AudioParam::new(gain),
        }
    }

    fn render(&self, mut input: AudioBuffer, block_start: f64) -> AudioBuffer {
        let dt = 1.0 / input.sample_rate as f64;
        for channel in input.samples.iter_mut() {
            for (k, sample) in channel.iter_mut().enumerate() {
                *sample *= self.gain.value_at(block_start + k as f64 * dt);
            }
        }
        input
    }
}

// ============================================================================
// Channel Merger
// ============================================================================

/// Places each input on its own output channel
#[derive(Debug, Clone)]
pub struct ChannelMergerNode {
    inputs: usize,
}

impl ChannelMergerNode {
    pub fn new(inputs: usize) -> Self {
        Self { inputs }
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    fn render(&self, inputs: &[AudioBuffer], sample_rate: u32, frames: usize) -> AudioBuffer {
        let mut out = AudioBuffer {
            samples: vec![vec![0.0; frames]; self.inputs],
            sample_rate,
        };
        for (channel, input) in out.samples.iter_mut().zip(inputs.iter()) {
            if !input.is_empty() {
                *channel = input.mix_to_mono();
            }
        }
        out
    }
}

// ============================================================================
// Buffer Source
// ============================================================================

/// Plays a decoded buffer, optionally looping forever
#[derive(Debug, Clone)]
pub struct BufferSourceNode {
    buffer: Arc<AudioBuffer>,
    looping: bool,
    position: usize,
    started: bool,
    ended: bool,
}

impl BufferSourceNode {
    pub fn new(buffer: Arc<AudioBuffer>, looping: bool) -> Self {
        Self {
            buffer,
            looping,
            position: 0,
            started: false,
            ended: false,
        }
    }

    pub fn start(&mut self) {
        self.started = true;
    }

    pub fn stop(&mut self) {
        self.ended = true;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn state(&self) -> SourceState {
        match (self.started, self.ended) {
            (_, true) => SourceState::Finished,
            (false, false) => SourceState::Idle,
            (true, false) => SourceState::Playing,
        }
    }

    fn render(&mut self, sample_rate: u32, frames: usize) -> AudioBuffer {
        let channels = self.buffer.channels().max(1);
        let mut out = AudioBuffer {
            samples: vec![vec![0.0; frames]; channels],
            sample_rate,
        };
        let len = self.buffer.len();
        if !self.started || self.ended || len == 0 {
            return out;
        }

        for k in 0..frames {
            if self.position >= len {
                if self.looping {
                    self.position = 0;
                } else {
                    self.ended = true;
                    break;
                }
            }
            for (ch, channel) in out.samples.iter_mut().enumerate() {
                channel[k] = self.buffer.samples[ch][self.position];
            }
            self.position += 1;
        }
        out
    }
}

// ============================================================================
// Node
// ============================================================================

/// Any node that can live in the arena
#[derive(Debug, Clone)]
pub enum AudioNode {
    Oscillator(OscillatorNode),
    Gain(GainNode),
    ChannelMerger(ChannelMergerNode),
    BufferSource(BufferSourceNode),
}

impl AudioNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            AudioNode::Oscillator(_) => NodeKind::Oscillator,
            AudioNode::Gain(_) => NodeKind::Gain,
            AudioNode::ChannelMerger(_) => NodeKind::ChannelMerger,
            AudioNode::BufferSource(_) => NodeKind::BufferSource,
        }
    }

    /// Number of distinct inputs the node accepts
    pub fn input_count(&self) -> usize {
        match self {
            AudioNode::Oscillator(_) | AudioNode::BufferSource(_) => 0,
            AudioNode::Gain(_) => 1,
            AudioNode::ChannelMerger(merger) => merger.inputs(),
        }
    }

    /// Forget automation events that ended before `t`
    pub fn prune_automation(&mut self, t: f64) {
        match self {
            AudioNode::Oscillator(osc) => osc.frequency.prune_before(t),
            AudioNode::Gain(gain) => gain.gain.prune_before(t),
            AudioNode::ChannelMerger(_) | AudioNode::BufferSource(_) => {}
        }
    }

    /// Render one block
    ///
    /// `inputs` holds the summed signal arriving at each input index; source
    /// nodes ignore it.
    pub fn process(
        &mut self,
        inputs: Vec<AudioBuffer>,
        block_start: f64,
        sample_rate: u32,
        frames: usize,
    ) -> AudioBuffer {
        match self {
            AudioNode::Oscillator(osc) => osc.render(block_start, sample_rate, frames),
            AudioNode::BufferSource(source) => source.render(sample_rate, frames),
            AudioNode::ChannelMerger(merger) => merger.render(&inputs, sample_rate, frames),
            AudioNode::Gain(gain) => {
                let input = inputs
                    .into_iter()
                    .next()
                    .filter(|b| !b.is_empty())
                    .unwrap_or_else(|| AudioBuffer::new(frames, ChannelLayout::Mono, sample_rate));
                gain.render(input, block_start)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_oscillator_silent_until_started() {
        let mut osc = OscillatorNode::new(440.0);
        let out = osc.render(0.0, 48000, 128);
        assert!(out.channel(0).iter().all(|&s| s == 0.0));
        assert_eq!(osc.state(0.0), SourceState::Idle);
    }

    #[test]
    fn test_oscillator_produces_sine() {
        let mut osc = OscillatorNode::new(1000.0);
        osc.start(0.0);
        let out = osc.render(0.0, 48000, 48);

        // One full 1 kHz cycle is 48 samples; quarter cycle peaks at 1.0
        assert_abs_diff_eq!(out.channel(0)[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out.channel(0)[12], 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(out.channel(0)[36], -1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_oscillator_stops_at_scheduled_time() {
        let mut osc = OscillatorNode::new(440.0);
        osc.start(0.0);
        osc.stop(0.001);
        let out = osc.render(0.0, 48000, 96);

        assert!(out.channel(0)[50..].iter().all(|&s| s == 0.0));
        assert_eq!(osc.state(0.002), SourceState::Finished);
    }

    #[test]
    fn test_merger_places_inputs_on_channels() {
        let merger = ChannelMergerNode::new(2);
        let left = AudioBuffer::from_interleaved(&[1.0, 1.0], 1, 48000).unwrap();
        let right = AudioBuffer::from_interleaved(&[-1.0, -1.0], 1, 48000).unwrap();
        let out = merger.render(&[left, right], 48000, 2);

        assert_eq!(out.channel(0), &[1.0, 1.0]);
        assert_eq!(out.channel(1), &[-1.0, -1.0]);
    }

    #[test]
    fn test_gain_scales_input() {
        let gain = GainNode::new(0.5);
        let input = AudioBuffer::from_interleaved(&[1.0, -1.0], 1, 48000).unwrap();
        let out = gain.render(input, 0.0);
        assert_eq!(out.channel(0), &[0.5, -0.5]);
    }

    #[test]
    fn test_buffer_source_loops() {
        let buffer = Arc::new(AudioBuffer::from_interleaved(&[0.1, 0.2, 0.3], 1, 48000).unwrap());
        let mut source = BufferSourceNode::new(buffer, true);
        source.start();
        let out = source.render(48000, 7);
        assert_eq!(out.channel(0), &[0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1]);
        assert_eq!(source.state(), SourceState::Playing);
    }

    #[test]
    fn test_buffer_source_ends_without_loop() {
        let buffer = Arc::new(AudioBuffer::from_interleaved(&[0.1, 0.2], 1, 48000).unwrap());
        let mut source = BufferSourceNode::new(buffer, false);
        source.start();
        let out = source.render(48000, 4);
        assert_eq!(out.channel(0), &[0.1, 0.2, 0.0, 0.0]);
        assert_eq!(source.state(), SourceState::Finished);
    }
}
