//! Offline Rendering Context
//!
//! Owns the node arena and the sample clock. Every call to `render` pulls
//! one block through the graph in topological order, mixes whatever is
//! connected to the destination into a stereo block and feeds any attached
//! capture taps.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, warn};

use crate::engine::buffer::{AudioBuffer, ChannelLayout, DEFAULT_SAMPLE_RATE};
use crate::error::{BinauralError, Result};
use crate::graph::arena::{Endpoint, NodeArena, NodeId, DEFAULT_MAX_NODES};
use crate::graph::node::{
    AudioNode, BufferSourceNode, ChannelMergerNode, GainNode, OscillatorNode, SourceState,
};

/// Lifecycle of the rendering context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextState {
    #[default]
    Running,
    /// Clock frozen, blocks render as silence
    Suspended,
    /// No further nodes may be created
    Closed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextState::Running => write!(f, "running"),
            ContextState::Suspended => write!(f, "suspended"),
            ContextState::Closed => write!(f, "closed"),
        }
    }
}

/// Handle to a capture tap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TapId(u64);

#[derive(Debug)]
struct Tap {
    id: TapId,
    node: NodeId,
    recorded: AudioBuffer,
}

/// Graph owner and sample clock
#[derive(Debug)]
pub struct RenderContext {
    sample_rate: u32,
    frames_rendered: u64,
    state: ContextState,
    arena: NodeArena,
    taps: Vec<Tap>,
    next_tap: u64,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl RenderContext {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_capacity(sample_rate, DEFAULT_MAX_NODES)
    }

    /// Create a context that refuses to hold more than `max_nodes` nodes
    pub fn with_capacity(sample_rate: u32, max_nodes: usize) -> Self {
        Self {
            sample_rate,
            frames_rendered: 0,
            state: ContextState::Running,
            arena: NodeArena::with_capacity(max_nodes),
            taps: Vec::new(),
            next_tap: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds rendered so far
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn live_nodes(&self) -> usize {
        self.arena.live_count()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains(id)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn suspend(&mut self) {
        if self.state == ContextState::Running {
            self.state = ContextState::Suspended;
            debug!("[CONTEXT] Suspended at {:.3}s", self.current_time());
        }
    }

    pub fn resume(&mut self) {
        if self.state == ContextState::Suspended {
            self.state = ContextState::Running;
            debug!("[CONTEXT] Resumed at {:.3}s", self.current_time());
        }
    }

    /// Close the context, releasing every node and tap
    pub fn close(&mut self) {
        self.taps.clear();
        self.arena = NodeArena::with_capacity(self.arena.capacity());
        self.state = ContextState::Closed;
        debug!("[CONTEXT] Closed");
    }

    // ========================================================================
    // Node Creation
    // ========================================================================

    pub fn create_oscillator(&mut self, frequency_hz: f32) -> Result<NodeId> {
        self.insert(AudioNode::Oscillator(OscillatorNode::new(frequency_hz)))
    }

    pub fn create_gain(&mut self, gain: f32) -> Result<NodeId> {
        self.insert(AudioNode::Gain(GainNode::new(gain)))
    }

    pub fn create_merger(&mut self, inputs: usize) -> Result<NodeId> {
        self.insert(AudioNode::ChannelMerger(ChannelMergerNode::new(inputs)))
    }

    pub fn create_buffer_source(&mut self, buffer: Arc<AudioBuffer>, looping: bool) -> Result<NodeId> {
        self.insert(AudioNode::BufferSource(BufferSourceNode::new(buffer, looping)))
    }

    fn insert(&mut self, node: AudioNode) -> Result<NodeId> {
        if self.state == ContextState::Closed {
            return Err(BinauralError::GraphConstruction {
                reason: format!("cannot create {} on a closed context", node.kind()),
            });
        }
        self.arena.insert(node)
    }

    // ========================================================================
    // Wiring
    // ========================================================================

    pub fn connect(&mut self, from: NodeId, to: NodeId, input: usize) -> Result<()> {
        self.arena.connect(from, Endpoint::Node(to), input)
    }

    pub fn connect_to_destination(&mut self, from: NodeId) -> Result<()> {
        self.arena.connect(from, Endpoint::Destination, 0)
    }

    /// Release nodes and every connection touching them
    pub fn release(&mut self, ids: &[NodeId]) -> usize {
        self.arena.release(ids)
    }

    // ========================================================================
    // Node Access
    // ========================================================================

    pub fn oscillator(&self, id: NodeId) -> Result<&OscillatorNode> {
        match self.arena.get(id) {
            Some(AudioNode::Oscillator(osc)) => Ok(osc),
            _ => Err(unknown(id, "oscillator")),
        }
    }

    pub fn oscillator_mut(&mut self, id: NodeId) -> Result<&mut OscillatorNode> {
        match self.arena.get_mut(id) {
            Some(AudioNode::Oscillator(osc)) => Ok(osc),
            _ => Err(unknown(id, "oscillator")),
        }
    }

    pub fn gain(&self, id: NodeId) -> Result<&GainNode> {
        match self.arena.get(id) {
            Some(AudioNode::Gain(gain)) => Ok(gain),
            _ => Err(unknown(id, "gain")),
        }
    }

    pub fn gain_mut(&mut self, id: NodeId) -> Result<&mut GainNode> {
        match self.arena.get_mut(id) {
            Some(AudioNode::Gain(gain)) => Ok(gain),
            _ => Err(unknown(id, "gain")),
        }
    }

    /// Start an oscillator or buffer source at `when`
    pub fn start_source(&mut self, id: NodeId, when: f64) -> Result<()> {
        match self.arena.get_mut(id) {
            Some(AudioNode::Oscillator(osc)) => osc.start(when),
            Some(AudioNode::BufferSource(source)) => source.start(),
            _ => return Err(unknown(id, "source")),
        }
        Ok(())
    }

    /// Schedule a source to stop at `when`
    ///
    /// Buffer sources stop immediately.
    pub fn stop_source(&mut self, id: NodeId, when: f64) -> Result<()> {
        match self.arena.get_mut(id) {
            Some(AudioNode::Oscillator(osc)) => osc.stop(when),
            Some(AudioNode::BufferSource(source)) => source.stop(),
            _ => return Err(unknown(id, "source")),
        }
        Ok(())
    }

    /// Lifecycle of an oscillator or buffer source
    pub fn source_state(&self, id: NodeId) -> Option<SourceState> {
        match self.arena.get(id)? {
            AudioNode::Oscillator(osc) => Some(osc.state(self.current_time())),
            AudioNode::BufferSource(source) => Some(source.state()),
            _ => None,
        }
    }

    // ========================================================================
    // Capture Taps
    // ========================================================================

    /// Start recording the output of `node` as stereo
    ///
    /// The recording grows by one stereo f32 frame per rendered frame until
    /// the tap is detached.
    pub fn attach_tap(&mut self, node: NodeId) -> Result<TapId> {
        if !self.arena.contains(node) {
            return Err(unknown(node, "tap source"));
        }
        let id = TapId(self.next_tap);
        self.next_tap += 1;
        self.taps.push(Tap {
            id,
            node,
            recorded: AudioBuffer::empty(2, self.sample_rate),
        });
        Ok(id)
    }

    /// Stop a tap and hand back everything it recorded
    pub fn detach_tap(&mut self, id: TapId) -> Option<AudioBuffer> {
        let idx = self.taps.iter().position(|t| t.id == id)?;
        Some(self.taps.swap_remove(idx).recorded)
    }

    /// Frames recorded so far by a tap
    pub fn tap_len(&self, id: TapId) -> Option<usize> {
        self.taps.iter().find(|t| t.id == id).map(|t| t.recorded.len())
    }

    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Render the next `frames` frames of the destination as stereo
    ///
    /// A suspended or closed context yields silence and does not advance
    /// the clock.
    pub fn render(&mut self, frames: usize) -> AudioBuffer {
        let mut destination = AudioBuffer::new(frames, ChannelLayout::Stereo, self.sample_rate);
        if self.state != ContextState::Running || frames == 0 {
            return destination;
        }

        let block_start = self.current_time();
        let mut outputs: HashMap<NodeId, AudioBuffer> = HashMap::new();

        for id in self.arena.topological_order() {
            let inputs = self.gather_inputs(id, &outputs);
            let Some(node) = self.arena.get_mut(id) else {
                continue;
            };
            node.prune_automation(block_start);
            let output = node.process(inputs, block_start, self.sample_rate, frames);
            if !output.is_finite() {
                warn!("[CONTEXT] {} produced non-finite samples", id);
            }
            outputs.insert(id, output);
        }

        for c in self.arena.connections() {
            if c.to == Endpoint::Destination {
                if let Some(out) = outputs.get(&c.from) {
                    mix_into(&mut destination, out);
                }
            }
        }

        for tap in self.taps.iter_mut() {
            match outputs.get(&tap.node) {
                Some(out) => tap.recorded.append(out),
                None => tap
                    .recorded
                    .append(&AudioBuffer::new(frames, ChannelLayout::Stereo, self.sample_rate)),
            }
        }

        self.frames_rendered += frames as u64;
        destination
    }

    // Sum everything connected to each input of `id`
    fn gather_inputs(&self, id: NodeId, outputs: &HashMap<NodeId, AudioBuffer>) -> Vec<AudioBuffer> {
        let count = self.arena.get(id).map(|n| n.input_count()).unwrap_or(0);
        let mut inputs: Vec<Option<AudioBuffer>> = vec![None; count];

        for c in self.arena.connections() {
            if c.to != Endpoint::Node(id) || c.input >= count {
                continue;
            }
            let Some(out) = outputs.get(&c.from) else {
                continue;
            };
            inputs[c.input] = Some(match inputs[c.input].take() {
                Some(mut acc) => {
                    if acc.channels() < out.channels() {
                        acc = upmix(&acc);
                    }
                    mix_into(&mut acc, out);
                    acc
                }
                None => out.clone(),
            });
        }

        inputs
            .into_iter()
            .map(|input| input.unwrap_or_else(|| AudioBuffer::empty(1, self.sample_rate)))
            .collect()
    }
}

fn unknown(id: NodeId, expected: &str) -> BinauralError {
    BinauralError::UnknownNode {
        node: format!("{} ({})", id, expected),
    }
}

fn upmix(buffer: &AudioBuffer) -> AudioBuffer {
    let mut stereo = AudioBuffer::empty(2, buffer.sample_rate);
    stereo.append(buffer);
    stereo
}

// Add `src` into `dst`; a mono source feeds every destination channel
fn mix_into(dst: &mut AudioBuffer, src: &AudioBuffer) {
    let src_channels = src.channels();
    if src_channels == 0 {
        return;
    }
    for (ch, channel) in dst.samples.iter_mut().enumerate() {
        let source = &src.samples[ch.min(src_channels - 1)];
        for (d, s) in channel.iter_mut().zip(source.iter()) {
            *d += s;
        }
    }
}
