//! Node arena
//!
//! Graph nodes live in a generational slab. Handles stay small and `Copy`,
//! and a handle to a released node can never alias whatever gets allocated
//! into its slot later.

use std::collections::VecDeque;
use std::fmt;

use crate::error::{BinauralError, Result};
use crate::graph::node::AudioNode;

/// Default upper bound on live nodes in one context
pub const DEFAULT_MAX_NODES: usize = 256;

/// Handle to a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}v{}", self.index, self.generation)
    }
}

/// Where a connection ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Node(NodeId),
    /// The context's output
    Destination,
}

/// A directed edge from one node's output to an input of another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub from: NodeId,
    pub to: Endpoint,
    pub input: usize,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<AudioNode>,
}

/// Generational storage for graph nodes and their connections
#[derive(Debug)]
pub struct NodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    capacity: usize,
    live: usize,
    connections: Vec<Connection>,
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_NODES)
    }
}

impl NodeArena {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            capacity,
            live: 0,
            connections: Vec::new(),
        }
    }

    /// Store a node, failing once the arena is full
    pub fn insert(&mut self, node: AudioNode) -> Result<NodeId> {
        if self.live >= self.capacity {
            return Err(BinauralError::GraphConstruction {
                reason: format!(
                    "node limit of {} reached while creating {}",
                    self.capacity,
                    node.kind()
                ),
            });
        }

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        };
        self.live += 1;
        Ok(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&AudioNode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut AudioNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Release a set of nodes together with every connection touching them
    ///
    /// Stale or already released handles are skipped.
    pub fn release(&mut self, ids: &[NodeId]) -> usize {
        let mut released = 0;
        for &id in ids {
            let Some(slot) = self.slots.get_mut(id.index as usize) else {
                continue;
            };
            if slot.generation != id.generation || slot.node.is_none() {
                continue;
            }
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index);
            self.live -= 1;
            released += 1;
        }

        self.connections.retain(|c| {
            !ids.contains(&c.from) && !matches!(c.to, Endpoint::Node(to) if ids.contains(&to))
        });
        released
    }

    /// Connect `from` to input `input` of `to`
    pub fn connect(&mut self, from: NodeId, to: Endpoint, input: usize) -> Result<()> {
        if !self.contains(from) {
            return Err(BinauralError::UnknownNode {
                node: from.to_string(),
            });
        }
        if let Endpoint::Node(target) = to {
            let Some(node) = self.get(target) else {
                return Err(BinauralError::UnknownNode {
                    node: target.to_string(),
                });
            };
            if input >= node.input_count() {
                return Err(BinauralError::GraphConstruction {
                    reason: format!("{} has no input {}", node.kind(), input),
                });
            }
            if target == from || self.reaches(target, from) {
                return Err(BinauralError::GraphConstruction {
                    reason: format!("connecting {} to {} would form a cycle", from, target),
                });
            }
        }

        let connection = Connection { from, to, input };
        if !self.connections.contains(&connection) {
            self.connections.push(connection);
        }
        Ok(())
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Live nodes ordered so every node comes after all of its inputs
    pub fn topological_order(&self) -> Vec<NodeId> {
        let ids: Vec<NodeId> = self.live_ids().collect();
        let position = |id: NodeId| ids.iter().position(|&other| other == id);

        let mut indegree = vec![0usize; ids.len()];
        for c in &self.connections {
            if let Endpoint::Node(to) = c.to {
                if let Some(idx) = position(to) {
                    indegree[idx] += 1;
                }
            }
        }

        let mut queue: VecDeque<usize> = indegree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(idx, _)| idx)
            .collect();
        let mut order = Vec::with_capacity(ids.len());

        while let Some(idx) = queue.pop_front() {
            let id = ids[idx];
            order.push(id);
            for c in self.connections.iter().filter(|c| c.from == id) {
                if let Endpoint::Node(to) = c.to {
                    if let Some(next) = position(to) {
                        indegree[next] -= 1;
                        if indegree[next] == 0 {
                            queue.push_back(next);
                        }
                    }
                }
            }
        }
        order
    }

    fn live_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.node.as_ref().map(|_| NodeId {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    // Depth-first walk along outgoing edges
    fn reaches(&self, start: NodeId, goal: NodeId) -> bool {
        let mut stack = vec![start];
        let mut seen = Vec::new();
        while let Some(id) = stack.pop() {
            if id == goal {
                return true;
            }
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            for c in self.connections.iter().filter(|c| c.from == id) {
                if let Endpoint::Node(to) = c.to {
                    stack.push(to);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{GainNode, OscillatorNode};

    fn osc() -> AudioNode {
        AudioNode::Oscillator(OscillatorNode::new(300.0))
    }

    fn gain() -> AudioNode {
        AudioNode::Gain(GainNode::new(1.0))
    }

    #[test]
    fn test_insert_respects_capacity() {
        let mut arena = NodeArena::with_capacity(2);
        arena.insert(osc()).unwrap();
        arena.insert(gain()).unwrap();
        let err = arena.insert(osc()).unwrap_err();
        assert_eq!(err.error_code(), "GRAPH_CONSTRUCTION");
    }

    #[test]
    fn test_released_handle_is_stale() {
        let mut arena = NodeArena::default();
        let first = arena.insert(osc()).unwrap();
        assert_eq!(arena.release(&[first]), 1);

        let second = arena.insert(gain()).unwrap();
        assert!(!arena.contains(first));
        assert!(arena.contains(second));
        assert_eq!(arena.live_count(), 1);

        // Releasing twice is a no-op
        assert_eq!(arena.release(&[first]), 0);
    }

    #[test]
    fn test_release_drops_connections() {
        let mut arena = NodeArena::default();
        let o = arena.insert(osc()).unwrap();
        let g = arena.insert(gain()).unwrap();
        arena.connect(o, Endpoint::Node(g), 0).unwrap();
        arena.connect(g, Endpoint::Destination, 0).unwrap();
        assert_eq!(arena.connections().len(), 2);

        arena.release(&[o]);
        assert_eq!(arena.connections().len(), 1);
    }

    #[test]
    fn test_connect_rejects_cycles_and_bad_inputs() {
        let mut arena = NodeArena::default();
        let a = arena.insert(gain()).unwrap();
        let b = arena.insert(gain()).unwrap();
        let o = arena.insert(osc()).unwrap();

        arena.connect(a, Endpoint::Node(b), 0).unwrap();
        assert!(arena.connect(b, Endpoint::Node(a), 0).is_err());
        assert!(arena.connect(a, Endpoint::Node(a), 0).is_err());
        assert!(arena.connect(a, Endpoint::Node(o), 0).is_err());
        assert!(arena.connect(a, Endpoint::Node(b), 1).is_err());
    }

    #[test]
    fn test_topological_order_puts_sources_first() {
        let mut arena = NodeArena::default();
        let g2 = arena.insert(gain()).unwrap();
        let g1 = arena.insert(gain()).unwrap();
        let o = arena.insert(osc()).unwrap();
        arena.connect(o, Endpoint::Node(g1), 0).unwrap();
        arena.connect(g1, Endpoint::Node(g2), 0).unwrap();

        let order = arena.topological_order();
        let pos = |id| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(o) < pos(g1));
        assert!(pos(g1) < pos(g2));
    }
}
