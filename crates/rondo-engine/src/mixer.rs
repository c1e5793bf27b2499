//! Track mixer.
//!
//! The mixer is an [`AudioGraph`] whose nodes are tracks, each a channel strip
//! hosting its own [`PluginDock`]. Track 0 is the master: it is created with
//! the mixer, feeds the graph's audio output and can never be removed. Every
//! other track sends its main bus to the master when inserted.
//!
//! Connections are the single source of truth for routing. The per-track
//! input, output and send lists are projections of the graph's connection
//! set, so they can never drift from what actually renders.

use std::sync::Arc;

use parking_lot::Mutex;
use rondo_core::{AudioGraph, BusLayout, ChannelSet, Connection, DeferredQueue, NodeId};

use crate::dock::PluginDock;
use crate::error::{EngineError, Result};
use crate::routing::AudioRoute;
use crate::track::{TrackProcessor, TrackState};

#[derive(Debug, Clone)]
struct TrackEntry {
    node: NodeId,
    state: Arc<TrackState>,
    dock: Arc<PluginDock>,
}

/// Master track plus an ordered list of tracks, in one graph.
pub struct Mixer {
    graph: Arc<AudioGraph>,
    tracks: Mutex<Vec<TrackEntry>>,
}

impl Mixer {
    /// A stereo-in, stereo-out mixer holding only the master track.
    pub fn new(sample_rate: f64, block_size: usize, deferred: Arc<DeferredQueue>) -> Result<Self> {
        Self::with_layout(
            BusLayout::stereo(),
            sample_rate,
            block_size,
            rondo_core::graph::DEFAULT_MIDI_CAPACITY,
            deferred,
        )
    }

    /// A mixer with an explicit device layout. The master track is as wide
    /// as the main output bus.
    pub fn with_layout(
        layout: BusLayout,
        sample_rate: f64,
        block_size: usize,
        midi_capacity: usize,
        deferred: Arc<DeferredQueue>,
    ) -> Result<Self> {
        let master_set = ChannelSet::from_count(layout.main_output_channels());
        let graph = Arc::new(AudioGraph::with_midi_capacity(
            layout,
            sample_rate,
            block_size,
            midi_capacity,
            deferred,
        ));
        let mixer = Self {
            graph,
            tracks: Mutex::new(Vec::new()),
        };
        {
            let mut tracks = mixer.tracks.lock();
            let master = mixer
                .new_track("Master", master_set)
                .ok_or_else(|| EngineError::NodeRejected("master track".into()))?;
            tracks.push(master);
        }
        mixer.set_track_audio_output(0, 0);
        Ok(mixer)
    }

    /// The mixer's graph, shared with the sequencer graph.
    pub fn graph(&self) -> &Arc<AudioGraph> {
        &self.graph
    }

    fn new_track(&self, name: &str, set: ChannelSet) -> Option<TrackEntry> {
        let dock = Arc::new(PluginDock::new(
            set,
            self.graph.sample_rate(),
            self.graph.block_size(),
            Arc::clone(self.graph.deferred()),
        ));
        let state = Arc::new(TrackState::new(name));
        let unit = TrackProcessor::new(Arc::clone(&state), Arc::clone(&dock));
        let node = self.graph.add_node(Box::new(unit))?;
        self.graph
            .add_connection(&Connection::midi(self.graph.midi_input_node(), node))
            .ok()?;
        Some(TrackEntry { node, state, dock })
    }

    // --- Tracks ---

    /// Inserts a track with main bus `set` at `index`. Index 0 (the master's
    /// slot) and indices past the end append.
    ///
    /// The new track sends its main bus to the master.
    pub fn insert_track(&self, index: usize, set: ChannelSet) -> bool {
        let mut tracks = self.tracks.lock();
        let index = if index == 0 || index > tracks.len() {
            tracks.len()
        } else {
            index
        };
        let Some(entry) = self.new_track(&format!("Track {index}"), set) else {
            tracing::warn!("mixer: track node rejected");
            return false;
        };

        let master = &tracks[0];
        let width = set.size().min(master.dock.main_bus().size());
        let sends: Vec<Connection> = (0..width)
            .map(|ch| Connection::new(entry.node, ch, master.node, ch))
            .collect();
        self.graph.replace_connections(&[], &sends);

        tracing::debug!("mixer: inserted track {} at {index}", entry.node);
        tracks.insert(index, entry);
        true
    }

    /// Removes the track at `index` with all its routing. The master
    /// (index 0) and out-of-range indices are refused.
    pub fn remove_track(&self, index: usize) -> bool {
        let mut tracks = self.tracks.lock();
        if index == 0 || index >= tracks.len() {
            return false;
        }
        let entry = tracks.remove(index);
        self.graph.remove_node(entry.node);
        tracing::debug!("mixer: removed track {} from {index}", entry.node);
        true
    }

    /// Number of tracks, master included.
    pub fn track_count(&self) -> usize {
        self.tracks.lock().len()
    }

    /// Plugin chain of a track.
    pub fn track_dock(&self, index: usize) -> Option<Arc<PluginDock>> {
        self.tracks.lock().get(index).map(|t| Arc::clone(&t.dock))
    }

    /// Name, color, gain, pan and mute of a track.
    pub fn track_state(&self, index: usize) -> Option<Arc<TrackState>> {
        self.tracks.lock().get(index).map(|t| Arc::clone(&t.state))
    }

    /// Graph node of a track.
    pub fn track_node(&self, index: usize) -> Option<NodeId> {
        self.tracks.lock().get(index).map(|t| t.node)
    }

    /// Index of the track rendered by `node`.
    pub fn track_index_of(&self, node: NodeId) -> Option<usize> {
        self.tracks.lock().iter().position(|t| t.node == node)
    }

    /// Bypasses a whole track. A bypassed track passes its input through
    /// without running its chain, fader or pan.
    pub fn set_track_bypass(&self, index: usize, bypass: bool) -> bool {
        self.track_node(index)
            .is_some_and(|node| self.graph.set_bypassed(node, bypass))
    }

    /// Whether a track is bypassed.
    pub fn track_bypass(&self, index: usize) -> bool {
        self.track_node(index)
            .is_some_and(|node| self.graph.is_bypassed(node))
    }

    // --- Device routing ---

    /// Feeds device input bus `bus` into the track's main input, replacing
    /// any previous input routing in one step.
    pub fn set_track_audio_input(&self, track: usize, bus: usize) -> bool {
        let tracks = self.tracks.lock();
        let Some(entry) = tracks.get(track) else {
            return false;
        };
        let Some((start, count)) = self.graph.layout().input_bus_range(bus) else {
            return false;
        };
        let input = self.graph.audio_input_node();
        let remove = self.links(input, entry.node);
        let add: Vec<Connection> = (0..count)
            .map(|i| Connection::new(input, start + i, entry.node, i))
            .collect();
        self.graph.replace_connections(&remove, &add);
        true
    }

    /// Sends the track's main output to device output bus `bus`, replacing
    /// any previous output routing in one step.
    pub fn set_track_audio_output(&self, track: usize, bus: usize) -> bool {
        let tracks = self.tracks.lock();
        let Some(entry) = tracks.get(track) else {
            return false;
        };
        let Some((start, count)) = self.graph.layout().output_bus_range(bus) else {
            return false;
        };
        let output = self.graph.audio_output_node();
        let remove = self.links(entry.node, output);
        let add: Vec<Connection> = (0..count)
            .map(|i| Connection::new(entry.node, i, output, start + i))
            .collect();
        self.graph.replace_connections(&remove, &add);
        true
    }

    /// Disconnects the track from the device input.
    pub fn remove_track_audio_input(&self, track: usize) {
        let tracks = self.tracks.lock();
        if let Some(entry) = tracks.get(track) {
            let remove = self.links(self.graph.audio_input_node(), entry.node);
            self.graph.replace_connections(&remove, &[]);
        }
    }

    /// Disconnects the track from the device output.
    pub fn remove_track_audio_output(&self, track: usize) {
        let tracks = self.tracks.lock();
        if let Some(entry) = tracks.get(track) {
            let remove = self.links(entry.node, self.graph.audio_output_node());
            self.graph.replace_connections(&remove, &[]);
        }
    }

    /// Audio connections from `from` to `to`.
    fn links(&self, from: NodeId, to: NodeId) -> Vec<Connection> {
        self.graph
            .connections_of(to)
            .into_iter()
            .filter(|c| !c.is_midi() && c.source.node == from && c.destination.node == to)
            .collect()
    }

    /// Device-input routing of a track as sorted `(bus channel, track channel)`.
    pub fn track_input_connections(&self, track: usize) -> Vec<(usize, usize)> {
        let Some(node) = self.track_node(track) else {
            return Vec::new();
        };
        let mut pairs: Vec<_> = self
            .links(self.graph.audio_input_node(), node)
            .iter()
            .map(|c| (c.source.channel, c.destination.channel))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Device-output routing of a track as sorted `(bus channel, track channel)`.
    pub fn track_output_connections(&self, track: usize) -> Vec<(usize, usize)> {
        let Some(node) = self.track_node(track) else {
            return Vec::new();
        };
        let mut pairs: Vec<_> = self
            .links(node, self.graph.audio_output_node())
            .iter()
            .map(|c| (c.destination.channel, c.source.channel))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    // --- Sends ---

    /// Routes one channel of track `src` into one channel of track `dst`.
    ///
    /// Returns `false` for unknown tracks, bad channels and sends that would
    /// create a feedback loop.
    pub fn add_track_send(&self, src: usize, src_channel: usize, dst: usize, dst_channel: usize) -> bool {
        let (Some(from), Some(to)) = (self.track_node(src), self.track_node(dst)) else {
            return false;
        };
        let conn = Connection::new(from, src_channel, to, dst_channel);
        match self.graph.add_connection(&conn) {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!("mixer: send {src}:{src_channel} -> {dst}:{dst_channel} rejected: {err}");
                false
            }
        }
    }

    /// Removes a send. Returns `false` if it did not exist.
    pub fn remove_track_send(&self, src: usize, src_channel: usize, dst: usize, dst_channel: usize) -> bool {
        let (Some(from), Some(to)) = (self.track_node(src), self.track_node(dst)) else {
            return false;
        };
        self.graph
            .remove_connection(&Connection::new(from, src_channel, to, dst_channel))
    }

    /// Sends out of a track, sorted by source channel, destination track and
    /// destination channel.
    pub fn track_send_connections(&self, track: usize) -> Vec<AudioRoute> {
        let tracks = self.tracks.lock();
        let Some(entry) = tracks.get(track) else {
            return Vec::new();
        };
        let mut routes: Vec<AudioRoute> = self
            .graph
            .connections_of(entry.node)
            .into_iter()
            .filter(|c| !c.is_midi() && c.source.node == entry.node)
            .filter_map(|c| {
                let dst = tracks.iter().position(|t| t.node == c.destination.node)?;
                Some(AudioRoute::new(track, c.source.channel, dst, c.destination.channel))
            })
            .collect();
        routes.sort();
        routes
    }

    // --- Layout ---

    /// Changes the device layout and drops routing that no longer fits.
    /// Returns the number of connections pruned.
    pub fn set_audio_layout(&self, layout: BusLayout) -> usize {
        let _tracks = self.tracks.lock();
        self.graph.set_buses_layout(layout)
    }

    /// The device layout.
    pub fn audio_layout(&self) -> BusLayout {
        self.graph.layout()
    }

    /// Adds a side-chain input bus to a track's chain.
    pub fn add_track_additional_bus(&self, track: usize) -> bool {
        let tracks = self.tracks.lock();
        let Some(entry) = tracks.get(track) else {
            return false;
        };
        entry.dock.add_additional_audio_bus();
        self.graph.refresh_node(entry.node)
    }

    /// Removes a track's last side-chain bus. Sends into its channels are
    /// pruned.
    pub fn remove_track_additional_bus(&self, track: usize) -> bool {
        let tracks = self.tracks.lock();
        let Some(entry) = tracks.get(track) else {
            return false;
        };
        entry.dock.remove_additional_audio_bus() && self.graph.refresh_node(entry.node)
    }
}

impl core::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mixer")
            .field("tracks", &self.track_count())
            .field("graph", &self.graph)
            .finish()
    }
}
