//! Node graph routing audio and MIDI between processing units.
//!
//! [`AudioGraph`] owns a set of nodes and the channel-level connections
//! between them. It is shared by reference between the control thread, which
//! mutates topology, and the audio thread, which renders it.
//!
//! # Architecture
//!
//! ```text
//! control thread                         audio thread
//! ──────────────                         ────────────
//! add_node / add_connection              process(audio, midi)
//!   │ lock structural state                │ load current RenderPlan
//!   │ validate (ports, MIDI, cycles)       │ for each step in order:
//!   │ mutate                               │   try_lock node io (miss → silent)
//!   │ compile RenderPlan                   │   gather feeds, run unit
//!   └ swap plan, defer old plan ──────────►└ copy output node to host
//! ```
//!
//! Every graph has three boundary pseudo-nodes created at construction:
//! audio input, audio output and MIDI input. Their bus layouts always mirror
//! the graph's own layout.
//!
//! # Example
//!
//! ```rust,ignore
//! let graph = AudioGraph::new(BusLayout::stereo(), 48000.0, 256, Arc::new(DeferredQueue::new()));
//! let node = graph.add_node(Box::new(Gain::new(0.5))).unwrap();
//! graph.add_connection(&Connection::new(graph.audio_input_node(), 0, node, 0))?;
//! graph.add_connection(&Connection::new(node, 0, graph.audio_output_node(), 0))?;
//! graph.process(&mut audio, &mut midi);
//! ```

mod connection;
mod node;
mod plan;
mod processing;

pub use connection::{Connection, MIDI_CHANNEL_INDEX, NodeAndChannel};
pub use node::{Node, NodeId, NodeKind};
pub use plan::RenderPlan;

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use thiserror::Error;

use crate::bus::BusLayout;
use crate::deferred::DeferredQueue;
use crate::processor::AudioProcessor;

use node::{BoundaryProcessor, io_channels};

/// Default per-node MIDI event capacity.
pub const DEFAULT_MIDI_CAPACITY: usize = 512;

/// Errors from connection validation and boundary misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The node is not in this graph.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    /// Source and destination are the same node.
    #[error("cannot connect node {0} to itself")]
    SelfConnection(NodeId),
    /// The channel does not exist on the node's side of the connection.
    #[error("channel {channel} out of range on node {node}")]
    ChannelOutOfRange {
        /// Offending node.
        node: NodeId,
        /// Offending channel.
        channel: usize,
    },
    /// One end is MIDI, the other audio.
    #[error("cannot connect a MIDI channel to an audio channel")]
    MixedConnection,
    /// The node lacks the MIDI output or input this connection needs.
    #[error("node {0} has no MIDI port for this connection")]
    NoMidi(NodeId),
    /// The connection would close a loop.
    #[error("adding this connection would create a cycle")]
    CycleDetected,
    /// Boundary nodes cannot be removed.
    #[error("node {0} is a graph boundary node")]
    BoundaryNode(NodeId),
}

/// Port counts cached from a unit's layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct NodePorts {
    pub audio_in: usize,
    pub audio_out: usize,
    pub midi_in: bool,
    pub midi_out: bool,
    pub editor: bool,
}

impl NodePorts {
    fn of(unit: &dyn AudioProcessor) -> Self {
        let layout = unit.layout();
        Self {
            audio_in: layout.total_input_channels(),
            audio_out: layout.total_output_channels(),
            midi_in: unit.accepts_midi(),
            midi_out: unit.produces_midi(),
            editor: unit.has_editor(),
        }
    }
}

pub(crate) struct NodeEntry {
    pub node: Arc<Node>,
    pub ports: NodePorts,
}

/// Structural state guarded by the graph's control lock.
pub(crate) struct GraphState {
    pub nodes: BTreeMap<NodeId, NodeEntry>,
    pub connections: BTreeSet<Connection>,
    pub layout: BusLayout,
    pub sample_rate: f64,
}

impl GraphState {
    fn is_legal(&self, conn: &Connection) -> bool {
        self.validate(conn).is_ok()
    }

    /// Checks endpoints, ports and MIDI capability. Does not check cycles.
    fn validate(&self, conn: &Connection) -> Result<(), GraphError> {
        let src = self
            .nodes
            .get(&conn.source.node)
            .ok_or(GraphError::NodeNotFound(conn.source.node))?;
        let dst = self
            .nodes
            .get(&conn.destination.node)
            .ok_or(GraphError::NodeNotFound(conn.destination.node))?;

        if conn.source.node == conn.destination.node {
            return Err(GraphError::SelfConnection(conn.source.node));
        }

        match (conn.source.is_midi(), conn.destination.is_midi()) {
            (true, true) => {
                if !src.ports.midi_out {
                    return Err(GraphError::NoMidi(conn.source.node));
                }
                if !dst.ports.midi_in {
                    return Err(GraphError::NoMidi(conn.destination.node));
                }
            }
            (false, false) => {
                if conn.source.channel >= src.ports.audio_out {
                    return Err(GraphError::ChannelOutOfRange {
                        node: conn.source.node,
                        channel: conn.source.channel,
                    });
                }
                if conn.destination.channel >= dst.ports.audio_in {
                    return Err(GraphError::ChannelOutOfRange {
                        node: conn.destination.node,
                        channel: conn.destination.channel,
                    });
                }
            }
            _ => return Err(GraphError::MixedConnection),
        }
        Ok(())
    }

    /// DFS reachability: can `from` reach `to` via existing connections?
    fn can_reach(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = BTreeSet::new();
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(
                self.connections
                    .iter()
                    .filter(|c| c.source.node == current)
                    .map(|c| c.destination.node),
            );
        }
        false
    }

    fn prune_illegal(&mut self) -> usize {
        let illegal: Vec<Connection> = self
            .connections
            .iter()
            .filter(|c| !self.is_legal(c))
            .copied()
            .collect();
        for conn in &illegal {
            self.connections.remove(conn);
            #[cfg(feature = "tracing")]
            tracing::debug!("graph_prune: {conn}");
        }
        illegal.len()
    }
}

/// A mutable node graph with a non-blocking render path.
///
/// All methods take `&self`. Structural methods serialize on an internal
/// lock and are meant for control threads. [`process`](Self::process) never
/// waits on that lock.
pub struct AudioGraph {
    state: Mutex<GraphState>,
    plan: ArcSwap<RenderPlan>,
    deferred: Arc<DeferredQueue>,
    audio_input: NodeId,
    audio_output: NodeId,
    midi_input: NodeId,
    block_size: AtomicUsize,
    midi_capacity: usize,
    render_count: AtomicU64,
}

impl AudioGraph {
    /// Creates a graph with the given bus layout and its three boundary nodes.
    pub fn new(
        layout: BusLayout,
        sample_rate: f64,
        block_size: usize,
        deferred: Arc<DeferredQueue>,
    ) -> Self {
        Self::with_midi_capacity(layout, sample_rate, block_size, DEFAULT_MIDI_CAPACITY, deferred)
    }

    /// Like [`new`](Self::new) with an explicit per-node MIDI event capacity.
    pub fn with_midi_capacity(
        layout: BusLayout,
        sample_rate: f64,
        block_size: usize,
        midi_capacity: usize,
        deferred: Arc<DeferredQueue>,
    ) -> Self {
        let boundary = |kind: NodeKind, layout: BusLayout| {
            let unit: Box<dyn AudioProcessor> = Box::new(BoundaryProcessor::new(kind, layout));
            let ports = NodePorts::of(unit.as_ref());
            let node = Arc::new(Node::new(kind, unit, block_size, midi_capacity));
            (node.id(), NodeEntry { node, ports })
        };

        let (audio_input, input_entry) = boundary(NodeKind::AudioInput, layout.input_boundary());
        let (audio_output, output_entry) =
            boundary(NodeKind::AudioOutput, layout.output_boundary());
        let (midi_input, midi_entry) = boundary(NodeKind::MidiInput, BusLayout::default());

        let mut nodes = BTreeMap::new();
        nodes.insert(audio_input, input_entry);
        nodes.insert(audio_output, output_entry);
        nodes.insert(midi_input, midi_entry);

        let state = GraphState {
            nodes,
            connections: BTreeSet::new(),
            layout,
            sample_rate,
        };
        let plan = RenderPlan::build(&state);

        Self {
            state: Mutex::new(state),
            plan: ArcSwap::from_pointee(plan),
            deferred,
            audio_input,
            audio_output,
            midi_input,
            block_size: AtomicUsize::new(block_size),
            midi_capacity,
            render_count: AtomicU64::new(0),
        }
    }

    // --- Boundary nodes ---

    /// The node emitting the host's audio input.
    pub fn audio_input_node(&self) -> NodeId {
        self.audio_input
    }

    /// The node collecting the graph's audio output.
    pub fn audio_output_node(&self) -> NodeId {
        self.audio_output
    }

    /// The node emitting the host's MIDI input.
    pub fn midi_input_node(&self) -> NodeId {
        self.midi_input
    }

    // --- Nodes ---

    /// Prepares `unit` at the graph's rate and block size and adds it.
    ///
    /// Returns `None` if the unit refuses to prepare.
    pub fn add_node(&self, mut unit: Box<dyn AudioProcessor>) -> Option<NodeId> {
        let mut state = self.state.lock();
        let block_size = self.block_size();
        if let Err(_err) = unit.prepare(state.sample_rate, block_size) {
            #[cfg(feature = "tracing")]
            tracing::warn!("graph_add: '{}' rejected: {_err}", unit.name());
            return None;
        }
        let ports = NodePorts::of(unit.as_ref());
        let node = Arc::new(Node::new(NodeKind::Processor, unit, block_size, self.midi_capacity));
        let id = node.id();
        state.nodes.insert(id, NodeEntry { node, ports });
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_add: node {id}");
        self.publish(&state);
        Some(id)
    }

    /// Removes a node and every connection touching it.
    ///
    /// Returns `false` for unknown and boundary nodes.
    pub fn remove_node(&self, id: NodeId) -> bool {
        self.try_remove_node(id).is_ok()
    }

    /// Like [`remove_node`](Self::remove_node) but reports why it failed.
    pub fn try_remove_node(&self, id: NodeId) -> Result<(), GraphError> {
        let mut state = self.state.lock();
        let entry = state.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))?;
        if entry.node.kind().is_boundary() {
            return Err(GraphError::BoundaryNode(id));
        }
        let Some(entry) = state.nodes.remove(&id) else {
            return Err(GraphError::NodeNotFound(id));
        };
        state.connections.retain(|c| !c.touches(id));
        self.publish(&state);
        drop(state);

        #[cfg(feature = "tracing")]
        tracing::debug!("graph_remove: node {id}");

        // The cached flag keeps removal off the unit lock the render may hold.
        if entry.ports.editor {
            self.deferred.close_editor(entry.node);
        } else {
            self.deferred.release(entry.node);
        }
        Ok(())
    }

    /// Returns a shared handle to a node.
    pub fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.state.lock().nodes.get(&id).map(|e| Arc::clone(&e.node))
    }

    /// True if the node is in this graph.
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.state.lock().nodes.contains_key(&id)
    }

    /// All node IDs, boundary nodes included, in ascending order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.state.lock().nodes.keys().copied().collect()
    }

    /// Number of nodes, boundary nodes included.
    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Re-reads a node's layout after its unit changed shape, resizes its
    /// buffer and prunes connections that no longer fit.
    pub fn refresh_node(&self, id: NodeId) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.nodes.get_mut(&id) else {
            return false;
        };
        let (ports, channels) = entry
            .node
            .with_unit(|unit| (NodePorts::of(unit), io_channels(&unit.layout())));
        entry.ports = ports;
        entry.node.resize_io(channels, self.block_size());
        state.prune_illegal();
        self.publish(&state);
        true
    }

    /// Marks a node bypassed. Bypassed processors pass their input through.
    pub fn set_bypassed(&self, id: NodeId, bypassed: bool) -> bool {
        match self.node(id) {
            Some(node) if node.kind() == NodeKind::Processor => {
                node.set_bypassed(bypassed);
                true
            }
            _ => false,
        }
    }

    /// Whether a node is bypassed. Unknown nodes report `false`.
    pub fn is_bypassed(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.is_bypassed())
    }

    // --- Connections ---

    /// Adds a connection after validating it.
    ///
    /// Returns `Ok(false)` if the connection already exists.
    pub fn add_connection(&self, conn: &Connection) -> Result<bool, GraphError> {
        let mut state = self.state.lock();
        state.validate(conn)?;
        if state.connections.contains(conn) {
            return Ok(false);
        }
        if state.can_reach(conn.destination.node, conn.source.node) {
            return Err(GraphError::CycleDetected);
        }
        state.connections.insert(*conn);
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_connect: {conn}");
        self.publish(&state);
        Ok(true)
    }

    /// Checks a connection without adding it.
    pub fn can_connect(&self, conn: &Connection) -> Result<(), GraphError> {
        let state = self.state.lock();
        state.validate(conn)?;
        if !state.connections.contains(conn)
            && state.can_reach(conn.destination.node, conn.source.node)
        {
            return Err(GraphError::CycleDetected);
        }
        Ok(())
    }

    /// Removes a connection. Returns `false` if it was not present.
    pub fn remove_connection(&self, conn: &Connection) -> bool {
        let mut state = self.state.lock();
        if !state.connections.remove(conn) {
            return false;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_disconnect: {conn}");
        self.publish(&state);
        true
    }

    /// Applies removals then additions under one lock acquisition, so other
    /// control threads never observe a half-applied change.
    ///
    /// Additions that fail validation are skipped. Returns the number of
    /// connections added.
    pub fn replace_connections(&self, remove: &[Connection], add: &[Connection]) -> usize {
        let mut state = self.state.lock();
        for conn in remove {
            state.connections.remove(conn);
        }
        let mut added = 0;
        for conn in add {
            if state.validate(conn).is_err() || state.connections.contains(conn) {
                continue;
            }
            if state.can_reach(conn.destination.node, conn.source.node) {
                continue;
            }
            state.connections.insert(*conn);
            added += 1;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_replace: -{} +{added}", remove.len());
        self.publish(&state);
        added
    }

    /// True if the connection exists.
    pub fn is_connected(&self, conn: &Connection) -> bool {
        self.state.lock().connections.contains(conn)
    }

    /// Removes every connection touching `id`. Returns how many were removed.
    pub fn disconnect_node(&self, id: NodeId) -> usize {
        let mut state = self.state.lock();
        let before = state.connections.len();
        state.connections.retain(|c| !c.touches(id));
        let removed = before - state.connections.len();
        if removed > 0 {
            self.publish(&state);
        }
        removed
    }

    /// All connections in ascending order.
    pub fn connections(&self) -> Vec<Connection> {
        self.state.lock().connections.iter().copied().collect()
    }

    /// Connections touching `id`, in ascending order.
    pub fn connections_of(&self, id: NodeId) -> Vec<Connection> {
        self.state
            .lock()
            .connections
            .iter()
            .filter(|c| c.touches(id))
            .copied()
            .collect()
    }

    /// Number of connections.
    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    // --- Layout ---

    /// The graph's bus layout.
    pub fn layout(&self) -> BusLayout {
        self.state.lock().layout.clone()
    }

    /// Changes the graph's bus layout.
    ///
    /// The boundary nodes adopt the new layout in the same critical section,
    /// then every connection referring to a channel that no longer exists is
    /// pruned. Returns the number of pruned connections.
    pub fn set_buses_layout(&self, layout: BusLayout) -> usize {
        let mut state = self.state.lock();
        let block_size = self.block_size();
        for (id, boundary) in [
            (self.audio_input, layout.input_boundary()),
            (self.audio_output, layout.output_boundary()),
        ] {
            if let Some(entry) = state.nodes.get_mut(&id) {
                entry.node.with_unit(|unit| unit.set_layout(&boundary));
                entry.ports.audio_in = boundary.total_input_channels();
                entry.ports.audio_out = boundary.total_output_channels();
                entry.node.resize_io(io_channels(&boundary), block_size);
            }
        }
        state.layout = layout;
        let pruned = state.prune_illegal();
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "graph_layout: {} in / {} out channels, {pruned} connections pruned",
            state.layout.total_input_channels(),
            state.layout.total_output_channels()
        );
        self.publish(&state);
        pruned
    }

    /// Removes every connection that no longer fits its endpoints.
    pub fn remove_illegal_connections(&self) -> usize {
        let mut state = self.state.lock();
        let pruned = state.prune_illegal();
        if pruned > 0 {
            self.publish(&state);
        }
        pruned
    }

    // --- Lifecycle ---

    /// Current sample rate.
    pub fn sample_rate(&self) -> f64 {
        self.state.lock().sample_rate
    }

    /// Maximum frames per render call.
    pub fn block_size(&self) -> usize {
        self.block_size.load(Ordering::Acquire)
    }

    /// Re-prepares every unit and resizes node buffers.
    ///
    /// Returns the nodes whose units refused the new settings. They stay in
    /// the graph and keep rendering with their previous configuration.
    pub fn prepare(&self, sample_rate: f64, block_size: usize) -> Vec<NodeId> {
        let mut state = self.state.lock();
        state.sample_rate = sample_rate;
        self.block_size.store(block_size, Ordering::Release);
        let mut failed = Vec::new();
        for (id, entry) in &state.nodes {
            if let Err(_err) = entry.node.prepare(sample_rate, block_size) {
                #[cfg(feature = "tracing")]
                tracing::warn!("graph_prepare: node {id} rejected {sample_rate} Hz / {block_size}: {_err}");
                failed.push(*id);
            }
        }
        self.publish(&state);
        failed
    }

    /// Resets every unit's internal state.
    pub fn reset(&self) {
        let state = self.state.lock();
        for entry in state.nodes.values() {
            entry.node.with_unit(|unit| unit.reset());
        }
    }

    /// The plan the next render will use.
    pub fn plan(&self) -> Arc<RenderPlan> {
        self.plan.load_full()
    }

    /// Queue receiving removed nodes and superseded plans.
    pub fn deferred(&self) -> &Arc<DeferredQueue> {
        &self.deferred
    }

    fn publish(&self, state: &GraphState) {
        let plan = RenderPlan::build(state);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "graph_plan: {} steps, {} connections",
            plan.len(),
            state.connections.len()
        );
        let old = self.plan.swap(Arc::new(plan));
        self.deferred.release(old);
    }
}

impl core::fmt::Debug for AudioGraph {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AudioGraph")
            .field("nodes", &state.nodes.len())
            .field("connections", &state.connections.len())
            .field("layout", &state.layout)
            .field("sample_rate", &state.sample_rate)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AudioBuffer;
    use crate::bus::ChannelSet;
    use crate::midi::{MidiBuffer, MidiMessage};
    use crate::processor::ProcessorError;

    struct Gain {
        gain: f32,
        layout: BusLayout,
    }

    impl Gain {
        fn new(gain: f32) -> Self {
            Self {
                gain,
                layout: BusLayout::stereo(),
            }
        }
    }

    impl AudioProcessor for Gain {
        fn name(&self) -> &str {
            "gain"
        }

        fn layout(&self) -> BusLayout {
            self.layout.clone()
        }

        fn prepare(&mut self, _sample_rate: f64, _block_size: usize) -> Result<(), ProcessorError> {
            Ok(())
        }

        fn process(&mut self, audio: &mut AudioBuffer, _midi: &mut MidiBuffer) {
            audio.apply_gain(self.gain);
        }
    }

    struct Picky;

    impl AudioProcessor for Picky {
        fn name(&self) -> &str {
            "picky"
        }

        fn layout(&self) -> BusLayout {
            BusLayout::stereo()
        }

        fn prepare(&mut self, sample_rate: f64, _block_size: usize) -> Result<(), ProcessorError> {
            Err(ProcessorError::UnsupportedSampleRate(sample_rate))
        }

        fn process(&mut self, _audio: &mut AudioBuffer, _midi: &mut MidiBuffer) {}
    }

    /// Passes MIDI through and counts note-ons into channel 0.
    struct NoteCounter;

    impl AudioProcessor for NoteCounter {
        fn name(&self) -> &str {
            "notes"
        }

        fn layout(&self) -> BusLayout {
            BusLayout::output_only(ChannelSet::Mono)
        }

        fn accepts_midi(&self) -> bool {
            true
        }

        fn prepare(&mut self, _sample_rate: f64, _block_size: usize) -> Result<(), ProcessorError> {
            Ok(())
        }

        fn process(&mut self, audio: &mut AudioBuffer, midi: &mut MidiBuffer) {
            let count = midi.iter().filter(|e| e.message.is_note_on()).count();
            audio.channel_mut(0).fill(count as f32);
        }
    }

    fn graph() -> AudioGraph {
        AudioGraph::new(BusLayout::stereo(), 48000.0, 64, Arc::new(DeferredQueue::new()))
    }

    fn wire_through(g: &AudioGraph, node: NodeId) {
        for ch in 0..2 {
            g.add_connection(&Connection::new(g.audio_input_node(), ch, node, ch))
                .unwrap();
            g.add_connection(&Connection::new(node, ch, g.audio_output_node(), ch))
                .unwrap();
        }
    }

    fn render(g: &AudioGraph, value: f32) -> AudioBuffer {
        let mut audio = AudioBuffer::new(2, 64);
        for ch in 0..2 {
            audio.channel_mut(ch).fill(value);
        }
        let mut midi = MidiBuffer::new(16);
        g.process(&mut audio, &mut midi);
        audio
    }

    #[test]
    fn test_new_graph_has_boundary_nodes() {
        let g = graph();
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.connection_count(), 0);
        assert!(!g.remove_node(g.audio_input_node()));
        assert_eq!(
            g.try_remove_node(g.audio_output_node()),
            Err(GraphError::BoundaryNode(g.audio_output_node()))
        );
    }

    #[test]
    fn test_add_node_rejects_failed_prepare() {
        let g = graph();
        assert!(g.add_node(Box::new(Picky)).is_none());
        assert_eq!(g.node_count(), 3);
    }

    #[test]
    fn test_duplicate_connection_is_noop() {
        let g = graph();
        let n = g.add_node(Box::new(Gain::new(1.0))).unwrap();
        let conn = Connection::new(g.audio_input_node(), 0, n, 0);
        assert_eq!(g.add_connection(&conn), Ok(true));
        assert_eq!(g.add_connection(&conn), Ok(false));
        assert_eq!(g.connection_count(), 1);
        assert!(g.remove_connection(&conn));
        assert!(!g.remove_connection(&conn));
    }

    #[test]
    fn test_cycle_detection_direct() {
        let g = graph();
        let a = g.add_node(Box::new(Gain::new(1.0))).unwrap();
        let b = g.add_node(Box::new(Gain::new(1.0))).unwrap();
        g.add_connection(&Connection::new(a, 0, b, 0)).unwrap();
        assert_eq!(
            g.add_connection(&Connection::new(b, 0, a, 0)),
            Err(GraphError::CycleDetected)
        );
    }

    #[test]
    fn test_cycle_detection_indirect() {
        let g = graph();
        let a = g.add_node(Box::new(Gain::new(1.0))).unwrap();
        let b = g.add_node(Box::new(Gain::new(1.0))).unwrap();
        let c = g.add_node(Box::new(Gain::new(1.0))).unwrap();
        g.add_connection(&Connection::new(a, 0, b, 0)).unwrap();
        g.add_connection(&Connection::new(b, 1, c, 1)).unwrap();
        assert_eq!(
            g.add_connection(&Connection::new(c, 0, a, 1)),
            Err(GraphError::CycleDetected)
        );
    }

    #[test]
    fn test_connection_validation() {
        let g = graph();
        let a = g.add_node(Box::new(Gain::new(1.0))).unwrap();
        assert_eq!(
            g.add_connection(&Connection::new(a, 0, a, 1)),
            Err(GraphError::SelfConnection(a))
        );
        assert_eq!(
            g.add_connection(&Connection::new(a, 2, g.audio_output_node(), 0)),
            Err(GraphError::ChannelOutOfRange { node: a, channel: 2 })
        );
        assert_eq!(
            g.add_connection(&Connection::new(a, 0, NodeId::sentinel(), 0)),
            Err(GraphError::NodeNotFound(NodeId::sentinel()))
        );
        assert_eq!(
            g.add_connection(&Connection::new(g.midi_input_node(), MIDI_CHANNEL_INDEX, a, 0)),
            Err(GraphError::MixedConnection)
        );
        assert_eq!(
            g.add_connection(&Connection::midi(g.midi_input_node(), a)),
            Err(GraphError::NoMidi(a))
        );
    }

    #[test]
    fn test_remove_node_drops_its_connections() {
        let g = graph();
        let n = g.add_node(Box::new(Gain::new(1.0))).unwrap();
        wire_through(&g, n);
        assert_eq!(g.connection_count(), 4);
        assert!(g.remove_node(n));
        assert_eq!(g.connection_count(), 0);
        assert!(g.node(n).is_none());
        assert!(!g.remove_node(n));
    }

    #[test]
    fn test_render_through_gain() {
        let g = graph();
        let n = g.add_node(Box::new(Gain::new(0.5))).unwrap();
        wire_through(&g, n);
        let out = render(&g, 1.0);
        assert!(out.channel(0).iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert!(out.channel(1).iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_render_sums_parallel_paths() {
        let g = graph();
        let a = g.add_node(Box::new(Gain::new(0.25))).unwrap();
        let b = g.add_node(Box::new(Gain::new(0.5))).unwrap();
        wire_through(&g, a);
        wire_through(&g, b);
        let out = render(&g, 1.0);
        assert!((out.channel(0)[0] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_bypassed_node_passes_through() {
        let g = graph();
        let n = g.add_node(Box::new(Gain::new(0.0))).unwrap();
        wire_through(&g, n);
        assert!(g.set_bypassed(n, true));
        assert!(g.is_bypassed(n));
        let out = render(&g, 0.8);
        assert!((out.channel(1)[10] - 0.8).abs() < 1e-6);
        assert!(!g.set_bypassed(g.audio_input_node(), true));
    }

    #[test]
    fn test_locked_unit_renders_silence() {
        let g = graph();
        let n = g.add_node(Box::new(Gain::new(1.0))).unwrap();
        wire_through(&g, n);
        let node = g.node(n).unwrap();
        let out = node.with_unit(|_| render(&g, 1.0));
        assert_eq!(out.peak(), 0.0);
        assert!((render(&g, 1.0).peak() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unconnected_output_is_silent() {
        let g = graph();
        assert_eq!(render(&g, 1.0).peak(), 0.0);
    }

    #[test]
    fn test_midi_routing_to_unit() {
        let g = graph();
        let n = g.add_node(Box::new(NoteCounter)).unwrap();
        g.add_connection(&Connection::midi(g.midi_input_node(), n)).unwrap();
        g.add_connection(&Connection::new(n, 0, g.audio_output_node(), 0))
            .unwrap();

        let mut audio = AudioBuffer::new(2, 64);
        let mut midi = MidiBuffer::new(16);
        for note in [60, 64] {
            midi.add(
                0,
                MidiMessage::NoteOn {
                    channel: 0,
                    note,
                    velocity: 90,
                },
            );
        }
        g.process(&mut audio, &mut midi);
        assert_eq!(audio.channel(0)[0], 2.0);
        assert!(midi.is_empty());
    }

    #[test]
    fn test_layout_change_prunes_connections() {
        let g = graph();
        let n = g.add_node(Box::new(Gain::new(1.0))).unwrap();
        wire_through(&g, n);
        let pruned = g.set_buses_layout(BusLayout::symmetric(ChannelSet::Mono));
        assert_eq!(pruned, 2);
        assert_eq!(g.connection_count(), 2);
        assert_eq!(g.layout().total_output_channels(), 1);
        assert!(
            g.add_connection(&Connection::new(n, 1, g.audio_output_node(), 1))
                .is_err()
        );
    }

    #[test]
    fn test_replace_connections_is_all_or_skip() {
        let g = graph();
        let n = g.add_node(Box::new(Gain::new(1.0))).unwrap();
        let old = [Connection::new(n, 0, g.audio_output_node(), 0)];
        g.add_connection(&old[0]).unwrap();
        let new = [
            Connection::new(n, 0, g.audio_output_node(), 1),
            Connection::new(n, 5, g.audio_output_node(), 0),
        ];
        assert_eq!(g.replace_connections(&old, &new), 1);
        assert_eq!(g.connections(), vec![new[0]]);
    }

    #[test]
    fn test_plan_order_is_topological() {
        let g = graph();
        let b = g.add_node(Box::new(Gain::new(1.0))).unwrap();
        let a = g.add_node(Box::new(Gain::new(1.0))).unwrap();
        g.add_connection(&Connection::new(a, 0, b, 0)).unwrap();
        let plan = g.plan();
        assert!(plan.position(a).unwrap() < plan.position(b).unwrap());
        assert_eq!(plan.len(), 5);
    }

    #[test]
    fn test_removed_node_is_released_through_queue() {
        let g = graph();
        let n = g.add_node(Box::new(Gain::new(1.0))).unwrap();
        let handle = Arc::downgrade(&g.node(n).unwrap());
        g.remove_node(n);
        assert!(handle.upgrade().is_some());
        while g.deferred().drain().retained > 0 {}
        assert!(handle.upgrade().is_none());
    }
}
