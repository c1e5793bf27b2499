//! The sequencer graph: source and instrument nodes routed into mixer tracks.
//!
//! Sources and instruments live in the mixer's own [`AudioGraph`], so feeding
//! a track is an ordinary connection. Each kind of routing the sequencer owns
//! is also kept in its own list, which answers "what feeds this instrument"
//! without scanning the whole connection set and keeps the sequencer's
//! routing apart from the mixer's.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use rondo_core::{AudioGraph, AudioProcessor, ChannelSet, Connection, NodeId, Transport};
use rondo_source::SourceManager;

use super::instrument::{InstrumentHandle, PluginDecorator};
use super::source::{SeqSource, SeqSourceProcessor};
use crate::mixer::Mixer;
use crate::routing::{AudioRoute, MidiRoute};

#[derive(Debug, Default)]
struct SeqState {
    sources: Vec<(NodeId, Arc<SeqSource>)>,
    instruments: Vec<NodeId>,
    midi_src_to_instr: BTreeSet<Connection>,
    midi_input_to_instr: BTreeSet<Connection>,
    audio_src_to_track: BTreeSet<Connection>,
    midi_src_to_track: BTreeSet<Connection>,
    audio_instr_to_track: BTreeSet<Connection>,
}

impl SeqState {
    fn source_node(&self, index: usize) -> Option<NodeId> {
        self.sources.get(index).map(|(node, _)| *node)
    }

    fn source_index(&self, node: NodeId) -> Option<usize> {
        self.sources.iter().position(|(n, _)| *n == node)
    }

    fn instrument_index(&self, node: NodeId) -> Option<usize> {
        self.instruments.iter().position(|n| *n == node)
    }

    /// Forgets routes into tracks the mixer has since removed.
    fn forget_removed_tracks(&mut self, graph: &AudioGraph) {
        let live = |c: &Connection| graph.contains_node(c.destination.node);
        self.audio_src_to_track.retain(live);
        self.midi_src_to_track.retain(live);
        self.audio_instr_to_track.retain(live);
    }
}

/// Ordered sources and instruments feeding a [`Mixer`].
pub struct SeqGraph {
    graph: Arc<AudioGraph>,
    mixer: Arc<Mixer>,
    manager: Arc<SourceManager>,
    transport: Arc<Transport>,
    state: Mutex<SeqState>,
}

impl SeqGraph {
    /// Creates an empty sequencer graph sharing `mixer`'s graph.
    pub fn new(mixer: Arc<Mixer>, manager: Arc<SourceManager>, transport: Arc<Transport>) -> Self {
        Self {
            graph: Arc::clone(mixer.graph()),
            mixer,
            manager,
            transport,
            state: Mutex::new(SeqState::default()),
        }
    }

    /// The shared graph.
    pub fn graph(&self) -> &Arc<AudioGraph> {
        &self.graph
    }

    /// The mixer the sequencer routes into.
    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    // --- Sources ---

    /// Inserts a source node with output bus `set` at `index`. Indices past
    /// the end append.
    pub fn insert_source(&self, index: usize, set: ChannelSet) -> Option<Arc<SeqSource>> {
        let source = Arc::new(SeqSource::new());
        let unit = SeqSourceProcessor::new(
            Arc::clone(&source),
            Arc::clone(&self.manager),
            Arc::clone(&self.transport),
            set,
        );
        let Some(node) = self.graph.add_node(Box::new(unit)) else {
            tracing::warn!("seq_graph: source node rejected");
            return None;
        };

        let mut state = self.state.lock();
        let index = index.min(state.sources.len());
        state.sources.insert(index, (node, Arc::clone(&source)));
        tracing::debug!("seq_graph: inserted source {node} at {index}");
        Some(source)
    }

    /// Removes the source at `index` together with everything it feeds.
    pub fn remove_source(&self, index: usize) -> bool {
        let mut state = self.state.lock();
        if index >= state.sources.len() {
            return false;
        }
        let (node, _) = state.sources.remove(index);
        state.midi_src_to_instr.retain(|c| c.source.node != node);
        state.midi_src_to_track.retain(|c| c.source.node != node);
        state.audio_src_to_track.retain(|c| c.source.node != node);
        self.graph.remove_node(node);
        tracing::debug!("seq_graph: removed source {node} from {index}");
        true
    }

    /// Number of sources.
    pub fn source_count(&self) -> usize {
        self.state.lock().sources.len()
    }

    /// Control state of the source at `index`.
    pub fn source(&self, index: usize) -> Option<Arc<SeqSource>> {
        self.state
            .lock()
            .sources
            .get(index)
            .map(|(_, s)| Arc::clone(s))
    }

    /// Graph node of the source at `index`.
    pub fn source_node(&self, index: usize) -> Option<NodeId> {
        self.state.lock().source_node(index)
    }

    /// Bypasses the source at `index`. `false` if there is none.
    pub fn set_source_bypass(&self, index: usize, bypass: bool) -> bool {
        self.source_node(index)
            .is_some_and(|node| self.graph.set_bypassed(node, bypass))
    }

    /// Whether the source at `index` is bypassed.
    pub fn source_bypass(&self, index: usize) -> bool {
        self.source_node(index)
            .is_some_and(|node| self.graph.is_bypassed(node))
    }

    /// Position of `source`, `None` if this graph does not hold it.
    pub fn find_source(&self, source: &Arc<SeqSource>) -> Option<usize> {
        self.state
            .lock()
            .sources
            .iter()
            .position(|(_, s)| Arc::ptr_eq(s, source))
    }

    // --- Instruments ---

    /// Inserts an empty instrument slot with output bus `set` at `index`.
    /// Indices past the end append.
    ///
    /// The slot renders silence until a plugin is installed through the
    /// returned handle.
    pub fn insert_instrument(&self, index: usize, set: ChannelSet) -> Option<InstrumentHandle> {
        let Some(node) = self.graph.add_node(Box::new(PluginDecorator::new(set))) else {
            tracing::warn!("seq_graph: instrument node rejected");
            return None;
        };
        let mut state = self.state.lock();
        let index = index.min(state.instruments.len());
        state.instruments.insert(index, node);
        tracing::debug!("seq_graph: inserted instrument {node} at {index}");
        Some(InstrumentHandle::new(&self.graph, node))
    }

    /// Inserts an instrument slot and installs `plugin` into it.
    ///
    /// If the plugin does not fit the slot, the slot is removed again and
    /// `None` is returned.
    pub fn insert_instrument_with(
        &self,
        plugin: Box<dyn AudioProcessor>,
        identifier: &str,
        index: usize,
        set: ChannelSet,
    ) -> Option<InstrumentHandle> {
        let handle = self.insert_instrument(index, set)?;
        if handle.install(plugin, identifier) {
            return Some(handle);
        }
        if let Some(i) = self.find_instrument(&handle) {
            self.remove_instrument(i);
        }
        None
    }

    /// Removes the instrument at `index` together with its MIDI feeds and
    /// track outputs. Closing its plugin's editor is deferred.
    pub fn remove_instrument(&self, index: usize) -> bool {
        let mut state = self.state.lock();
        if index >= state.instruments.len() {
            return false;
        }
        let node = state.instruments.remove(index);
        state.midi_src_to_instr.retain(|c| c.destination.node != node);
        state.midi_input_to_instr.retain(|c| c.destination.node != node);
        state.audio_instr_to_track.retain(|c| c.source.node != node);
        self.graph.remove_node(node);
        tracing::debug!("seq_graph: removed instrument {node} from {index}");
        true
    }

    /// Number of instrument slots.
    pub fn instrument_count(&self) -> usize {
        self.state.lock().instruments.len()
    }

    /// Handle of the instrument slot at `index`.
    pub fn instrument(&self, index: usize) -> Option<InstrumentHandle> {
        let node = *self.state.lock().instruments.get(index)?;
        Some(InstrumentHandle::new(&self.graph, node))
    }

    /// Bypasses the instrument at `index`. `false` if there is none.
    pub fn set_instrument_bypass(&self, index: usize, bypass: bool) -> bool {
        self.instrument(index)
            .is_some_and(|h| self.graph.set_bypassed(h.node_id(), bypass))
    }

    /// Whether the instrument at `index` is bypassed.
    pub fn instrument_bypass(&self, index: usize) -> bool {
        self.instrument(index)
            .is_some_and(|h| self.graph.is_bypassed(h.node_id()))
    }

    /// Position of the slot behind `handle`, `None` if this graph does not
    /// hold it.
    pub fn find_instrument(&self, handle: &InstrumentHandle) -> Option<usize> {
        self.state.lock().instrument_index(handle.node_id())
    }

    // --- MIDI into instruments ---

    /// Adds `conn` unless it already exists and records it in `routes`.
    ///
    /// A live route is never taken down first, so re-setting it cannot drop
    /// a block of audio or a note-off.
    fn connect_tracked(&self, routes: &mut BTreeSet<Connection>, conn: Connection) -> bool {
        match self.graph.add_connection(&conn) {
            Ok(_) => {
                routes.insert(conn);
                true
            }
            Err(err) => {
                tracing::warn!("seq_graph: {conn} rejected: {err}");
                false
            }
        }
    }

    /// Feeds the MIDI of source `src` into instrument `instr`.
    pub fn set_midi_src_to_instr_connection(&self, src: usize, instr: usize) -> bool {
        let mut state = self.state.lock();
        let (Some(from), Some(to)) = (state.source_node(src), state.instruments.get(instr).copied())
        else {
            return false;
        };
        let conn = Connection::midi(from, to);
        self.connect_tracked(&mut state.midi_src_to_instr, conn)
    }

    /// Stops feeding source `src`'s MIDI into `instr`. `false` if it was not.
    pub fn remove_midi_src_to_instr_connection(&self, src: usize, instr: usize) -> bool {
        let mut state = self.state.lock();
        let (Some(from), Some(to)) = (state.source_node(src), state.instruments.get(instr).copied())
        else {
            return false;
        };
        let conn = Connection::midi(from, to);
        self.graph.remove_connection(&conn);
        state.midi_src_to_instr.remove(&conn)
    }

    /// Whether source `src` feeds MIDI into `instr`.
    pub fn is_midi_src_to_instr_connected(&self, src: usize, instr: usize) -> bool {
        let state = self.state.lock();
        let (Some(from), Some(to)) = (state.source_node(src), state.instruments.get(instr).copied())
        else {
            return false;
        };
        state.midi_src_to_instr.contains(&Connection::midi(from, to))
    }

    /// Feeds the device MIDI input into instrument `instr`.
    pub fn set_midi_input_to_instr_connection(&self, instr: usize) -> bool {
        let mut state = self.state.lock();
        let Some(to) = state.instruments.get(instr).copied() else {
            return false;
        };
        let conn = Connection::midi(self.graph.midi_input_node(), to);
        self.connect_tracked(&mut state.midi_input_to_instr, conn)
    }

    /// Disconnects the device MIDI input from `instr`.
    pub fn remove_midi_input_to_instr_connection(&self, instr: usize) -> bool {
        let mut state = self.state.lock();
        let Some(to) = state.instruments.get(instr).copied() else {
            return false;
        };
        let conn = Connection::midi(self.graph.midi_input_node(), to);
        self.graph.remove_connection(&conn);
        state.midi_input_to_instr.remove(&conn)
    }

    /// Whether the device MIDI input feeds `instr`.
    pub fn is_midi_input_to_instr_connected(&self, instr: usize) -> bool {
        let state = self.state.lock();
        state.instruments.get(instr).is_some_and(|to| {
            state
                .midi_input_to_instr
                .contains(&Connection::midi(self.graph.midi_input_node(), *to))
        })
    }

    // --- Outputs into tracks ---

    /// Sends the audio of source `src` to mixer track `track`, channel by
    /// channel up to the narrower of the two buses.
    pub fn set_source_audio_output(&self, src: usize, track: usize) -> bool {
        let mut state = self.state.lock();
        state.forget_removed_tracks(&self.graph);
        let (Some(from), Some(to)) = (state.source_node(src), self.mixer.track_node(track)) else {
            return false;
        };
        let (Some(src_node), Some(track_dock)) = (self.graph.node(from), self.mixer.track_dock(track))
        else {
            return false;
        };
        let width = src_node
            .with_unit(|unit| unit.layout().main_output_channels())
            .min(track_dock.main_bus().size());

        let remove: Vec<Connection> = state
            .audio_src_to_track
            .iter()
            .filter(|c| c.source.node == from && c.destination.node == to)
            .copied()
            .collect();
        let add: Vec<Connection> = (0..width).map(|ch| Connection::new(from, ch, to, ch)).collect();
        self.graph.replace_connections(&remove, &add);
        for conn in &remove {
            state.audio_src_to_track.remove(conn);
        }
        for conn in add {
            if self.graph.is_connected(&conn) {
                state.audio_src_to_track.insert(conn);
            }
        }
        true
    }

    /// Removes every audio route from source `src` to `track`.
    pub fn remove_source_audio_output(&self, src: usize, track: usize) -> bool {
        let mut state = self.state.lock();
        let (Some(from), Some(to)) = (state.source_node(src), self.mixer.track_node(track)) else {
            return false;
        };
        let remove: Vec<Connection> = state
            .audio_src_to_track
            .iter()
            .filter(|c| c.source.node == from && c.destination.node == to)
            .copied()
            .collect();
        self.graph.replace_connections(&remove, &[]);
        for conn in &remove {
            state.audio_src_to_track.remove(conn);
        }
        !remove.is_empty()
    }

    /// Feeds the MIDI of source `src` into mixer track `track`.
    pub fn set_source_midi_output(&self, src: usize, track: usize) -> bool {
        let mut state = self.state.lock();
        state.forget_removed_tracks(&self.graph);
        let (Some(from), Some(to)) = (state.source_node(src), self.mixer.track_node(track)) else {
            return false;
        };
        let conn = Connection::midi(from, to);
        self.connect_tracked(&mut state.midi_src_to_track, conn)
    }

    /// Stops feeding source `src`'s MIDI into `track`.
    pub fn remove_source_midi_output(&self, src: usize, track: usize) -> bool {
        let mut state = self.state.lock();
        let (Some(from), Some(to)) = (state.source_node(src), self.mixer.track_node(track)) else {
            return false;
        };
        let conn = Connection::midi(from, to);
        self.graph.remove_connection(&conn);
        state.midi_src_to_track.remove(&conn)
    }

    /// Routes one output channel of instrument `instr` into one input
    /// channel of mixer track `track`.
    pub fn set_instr_audio_output(
        &self,
        instr: usize,
        src_channel: usize,
        track: usize,
        dst_channel: usize,
    ) -> bool {
        let mut state = self.state.lock();
        state.forget_removed_tracks(&self.graph);
        let (Some(from), Some(to)) = (state.instruments.get(instr).copied(), self.mixer.track_node(track))
        else {
            return false;
        };
        let conn = Connection::new(from, src_channel, to, dst_channel);
        self.connect_tracked(&mut state.audio_instr_to_track, conn)
    }

    /// Removes one channel route from instrument `instr` to `track`.
    pub fn remove_instr_audio_output(
        &self,
        instr: usize,
        src_channel: usize,
        track: usize,
        dst_channel: usize,
    ) -> bool {
        let mut state = self.state.lock();
        let (Some(from), Some(to)) = (state.instruments.get(instr).copied(), self.mixer.track_node(track))
        else {
            return false;
        };
        let conn = Connection::new(from, src_channel, to, dst_channel);
        self.graph.remove_connection(&conn);
        state.audio_instr_to_track.remove(&conn)
    }

    // --- Projections ---

    /// Track outputs of instrument `instr`, sorted by source channel, then
    /// track, then track channel.
    pub fn instr_output_to_track_connections(&self, instr: usize) -> Vec<AudioRoute> {
        let mut state = self.state.lock();
        state.forget_removed_tracks(&self.graph);
        let Some(node) = state.instruments.get(instr).copied() else {
            return Vec::new();
        };
        let mut routes: Vec<AudioRoute> = state
            .audio_instr_to_track
            .iter()
            .filter(|c| c.source.node == node)
            .filter_map(|c| {
                let track = self.mixer.track_index_of(c.destination.node)?;
                Some(AudioRoute::new(instr, c.source.channel, track, c.destination.channel))
            })
            .collect();
        routes.sort();
        routes
    }

    /// Sources feeding instrument `instr`'s MIDI input, sorted by source.
    pub fn instr_midi_input_from_source_connections(&self, instr: usize) -> Vec<MidiRoute> {
        let state = self.state.lock();
        let Some(node) = state.instruments.get(instr).copied() else {
            return Vec::new();
        };
        let mut routes: Vec<MidiRoute> = state
            .midi_src_to_instr
            .iter()
            .filter(|c| c.destination.node == node)
            .filter_map(|c| state.source_index(c.source.node))
            .map(|src| MidiRoute::from_source(src, instr))
            .collect();
        routes.sort();
        routes
    }

    /// The device MIDI feed of instrument `instr`, if connected.
    pub fn instr_midi_input_from_device_connections(&self, instr: usize) -> Vec<MidiRoute> {
        let state = self.state.lock();
        let Some(node) = state.instruments.get(instr).copied() else {
            return Vec::new();
        };
        state
            .midi_input_to_instr
            .iter()
            .filter(|c| c.destination.node == node)
            .map(|_| MidiRoute::from_device(instr))
            .collect()
    }

    /// Audio outputs of source `src`, sorted like the instrument projection.
    pub fn source_audio_output_connections(&self, src: usize) -> Vec<AudioRoute> {
        let mut state = self.state.lock();
        state.forget_removed_tracks(&self.graph);
        let Some(node) = state.source_node(src) else {
            return Vec::new();
        };
        let mut routes: Vec<AudioRoute> = state
            .audio_src_to_track
            .iter()
            .filter(|c| c.source.node == node)
            .filter_map(|c| {
                let track = self.mixer.track_index_of(c.destination.node)?;
                Some(AudioRoute::new(src, c.source.channel, track, c.destination.channel))
            })
            .collect();
        routes.sort();
        routes
    }

    /// Tracks receiving the MIDI of source `src`, sorted by track.
    pub fn source_midi_output_connections(&self, src: usize) -> Vec<MidiRoute> {
        let mut state = self.state.lock();
        state.forget_removed_tracks(&self.graph);
        let Some(node) = state.source_node(src) else {
            return Vec::new();
        };
        let mut routes: Vec<MidiRoute> = state
            .midi_src_to_track
            .iter()
            .filter(|c| c.source.node == node)
            .filter_map(|c| self.mixer.track_index_of(c.destination.node))
            .map(|track| MidiRoute::from_source(src, track))
            .collect();
        routes.sort();
        routes
    }

    // --- Transport ---

    /// Makes every source emit all-notes-off at its next block.
    pub fn close_all_notes(&self) {
        for (_, source) in &self.state.lock().sources {
            source.close_all_notes();
        }
    }

    /// End of the last block of any source, in seconds.
    pub fn end_seconds(&self) -> f64 {
        self.state
            .lock()
            .sources
            .iter()
            .map(|(_, s)| s.end_seconds())
            .fold(0.0, f64::max)
    }
}

impl core::fmt::Debug for SeqGraph {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SeqGraph")
            .field("sources", &state.sources.len())
            .field("instruments", &state.instruments.len())
            .finish_non_exhaustive()
    }
}
