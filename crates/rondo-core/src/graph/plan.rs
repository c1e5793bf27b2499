//! Render plan compiled from the graph topology.
//!
//! A [`RenderPlan`] is an immutable snapshot: nodes in topological order, and
//! for each node the steps whose output feeds it. The audio thread renders
//! from whatever plan it loaded at the start of a block, so a mutation on the
//! control thread never affects a block already in flight.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::node::{Node, NodeId, NodeKind};
use super::GraphState;

/// Audio copied from one step's output channel into another step's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AudioFeed {
    pub from_step: usize,
    pub source_channel: usize,
    pub dest_channel: usize,
}

#[derive(Debug)]
pub(crate) struct RenderStep {
    pub node: Arc<Node>,
    pub audio_feeds: Vec<AudioFeed>,
    pub midi_feeds: Vec<usize>,
}

/// Topologically ordered snapshot the render thread executes.
#[derive(Debug, Default)]
pub struct RenderPlan {
    pub(crate) steps: Vec<RenderStep>,
    pub(crate) output_step: Option<usize>,
}

impl RenderPlan {
    /// Number of nodes rendered per block.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True if the plan renders nothing.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Node IDs in render order.
    pub fn order(&self) -> Vec<NodeId> {
        self.steps.iter().map(|s| s.node.id()).collect()
    }

    /// Position of a node in render order.
    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.steps.iter().position(|s| s.node.id() == id)
    }

    /// Compiles the current topology.
    ///
    /// Kahn's algorithm with the ready set ordered by `NodeId`, so identical
    /// topologies always compile to identical plans.
    pub(crate) fn build(state: &GraphState) -> Self {
        let mut in_degree: BTreeMap<NodeId, usize> =
            state.nodes.keys().map(|&id| (id, 0)).collect();
        let mut outgoing: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for conn in &state.connections {
            if let Some(d) = in_degree.get_mut(&conn.destination.node) {
                *d += 1;
            }
            outgoing
                .entry(conn.source.node)
                .or_default()
                .push(conn.destination.node);
        }

        let mut ready: BTreeSet<NodeId> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut sorted = Vec::with_capacity(state.nodes.len());

        while let Some(id) = ready.pop_first() {
            sorted.push(id);
            for to in outgoing.get(&id).into_iter().flatten() {
                if let Some(d) = in_degree.get_mut(to) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(*to);
                    }
                }
            }
        }

        // Connections are validated against cycles before insertion.
        debug_assert_eq!(sorted.len(), state.nodes.len(), "cycle in graph topology");

        let step_of: BTreeMap<NodeId, usize> =
            sorted.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let mut steps: Vec<RenderStep> = sorted
            .iter()
            .filter_map(|id| state.nodes.get(id))
            .map(|entry| RenderStep {
                node: Arc::clone(&entry.node),
                audio_feeds: Vec::new(),
                midi_feeds: Vec::new(),
            })
            .collect();

        for conn in &state.connections {
            let (Some(&from), Some(&to)) = (
                step_of.get(&conn.source.node),
                step_of.get(&conn.destination.node),
            ) else {
                continue;
            };
            if conn.is_midi() {
                if !steps[to].midi_feeds.contains(&from) {
                    steps[to].midi_feeds.push(from);
                }
            } else {
                steps[to].audio_feeds.push(AudioFeed {
                    from_step: from,
                    source_channel: conn.source.channel,
                    dest_channel: conn.destination.channel,
                });
            }
        }

        let output_step = steps
            .iter()
            .position(|s| s.node.kind() == NodeKind::AudioOutput);

        Self { steps, output_step }
    }
}
