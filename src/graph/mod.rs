//! Audio Graph Module
//!
//! Nodes, their generational arena, automatable parameters and the tone
//! graph builder that wires them up per session mode.

pub mod arena;
pub mod builder;
pub mod node;
pub mod param;

pub use arena::{Connection, Endpoint, NodeArena, NodeId, DEFAULT_MAX_NODES};
pub use builder::{
    build, retune, set_volume, teardown, AudioGraphHandle, PowerNapSchedule, ToneVoices,
    POWER_NAP_HOLD_FRACTION, POWER_NAP_RAMP_FRACTION,
};
pub use node::{AudioNode, NodeKind, SourceState};
pub use param::{AudioParam, AutomationEvent};
