//! Serial plugin chain.
//!
//! A [`PluginDock`] owns its own [`AudioGraph`] and keeps an ordered list of
//! plugin nodes wired input → p0 → p1 → … → output on every main-bus channel.
//! Inserting or removing a plugin rewires only its two hot-spot neighbors,
//! in one structural step, so a render never sees the chain broken open.
//!
//! Extra input buses carry side-chain signals. They are as wide as the main
//! bus, and their channels are routed to individual plugins with
//! [`add_additional_bus_connection`](PluginDock::add_additional_bus_connection).
//!
//! ```rust,ignore
//! let dock = PluginDock::new(ChannelSet::Stereo, 48000.0, 512, deferred);
//! dock.insert_plugin(Box::new(GainUnit::new(ChannelSet::Stereo, -6.0)), 0);
//! dock.insert_plugin(Box::new(compressor), usize::MAX); // append
//! dock.add_additional_audio_bus();
//! dock.add_additional_bus_connection(1, 2, 2); // bus 1 left → compressor side-chain
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use rondo_core::{
    AudioGraph, AudioProcessor, BusLayout, ChannelSet, Connection, DeferredQueue, Node, NodeId,
};

/// An ordered chain of plugins inside its own graph.
pub struct PluginDock {
    graph: AudioGraph,
    main: ChannelSet,
    plugins: Mutex<Vec<NodeId>>,
    side_chain: Mutex<Vec<Connection>>,
}

impl PluginDock {
    /// Creates an empty chain whose input is wired straight to its output.
    pub fn new(
        main: ChannelSet,
        sample_rate: f64,
        block_size: usize,
        deferred: Arc<DeferredQueue>,
    ) -> Self {
        let graph = AudioGraph::new(BusLayout::symmetric(main), sample_rate, block_size, deferred);
        let (input, output) = (graph.audio_input_node(), graph.audio_output_node());
        let through: Vec<Connection> = (0..main.size())
            .map(|ch| Connection::new(input, ch, output, ch))
            .collect();
        graph.replace_connections(&[], &through);
        Self {
            graph,
            main,
            plugins: Mutex::new(Vec::new()),
            side_chain: Mutex::new(Vec::new()),
        }
    }

    /// The graph hosting the chain.
    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    /// Current bus layout: the main bus plus any side-chain input buses.
    pub fn layout(&self) -> BusLayout {
        self.graph.layout()
    }

    /// Channel set of the main bus.
    pub fn main_bus(&self) -> ChannelSet {
        self.main
    }

    /// Re-prepares every plugin. Returns how many refused.
    pub fn prepare(&self, sample_rate: f64, block_size: usize) -> usize {
        self.graph.prepare(sample_rate, block_size).len()
    }

    fn width(&self) -> usize {
        self.main.size()
    }

    fn neighbors(&self, plugins: &[NodeId], index: usize) -> (NodeId, NodeId) {
        let prev = if index == 0 {
            self.graph.audio_input_node()
        } else {
            plugins[index - 1]
        };
        let next = plugins
            .get(index)
            .copied()
            .unwrap_or_else(|| self.graph.audio_output_node());
        (prev, next)
    }

    fn serial(&self, from: NodeId, to: NodeId) -> Vec<Connection> {
        (0..self.width())
            .map(|ch| Connection::new(from, ch, to, ch))
            .collect()
    }

    // --- Chain ---

    /// Inserts `unit` at `index`. An index past the end appends.
    ///
    /// Returns `false`, leaving the chain untouched, if the unit's main input
    /// or output bus is narrower than the chain's main bus or the unit fails
    /// to prepare.
    pub fn insert_plugin(&self, unit: Box<dyn AudioProcessor>, index: usize) -> bool {
        let layout = unit.layout();
        let width = self.width();
        if layout.main_input_channels() < width || layout.main_output_channels() < width {
            tracing::warn!(
                "plugin_dock: '{}' has {}/{} main channels, chain needs {width}",
                unit.name(),
                layout.main_input_channels(),
                layout.main_output_channels()
            );
            return false;
        }
        let accepts_midi = unit.accepts_midi();

        let mut plugins = self.plugins.lock();
        let Some(node) = self.graph.add_node(unit) else {
            return false;
        };
        let index = index.min(plugins.len());
        let (prev, next) = self.neighbors(&plugins, index);

        let remove = self.serial(prev, next);
        let mut add = self.serial(prev, node);
        add.extend(self.serial(node, next));
        if accepts_midi {
            add.push(Connection::midi(self.graph.midi_input_node(), node));
        }
        self.graph.replace_connections(&remove, &add);
        plugins.insert(index, node);
        tracing::debug!("plugin_dock: inserted node {node} at {index}");
        true
    }

    /// Removes the plugin at `index` and joins its neighbors. Out of range is
    /// a no-op.
    ///
    /// An open editor is closed later from the deferred queue.
    pub fn remove_plugin(&self, index: usize) {
        let mut plugins = self.plugins.lock();
        if index >= plugins.len() {
            return;
        }
        let node = plugins.remove(index);
        let (prev, next) = self.neighbors(&plugins, index);

        // Join the neighbors in the same publish that cuts the node out, then
        // drop the now-dangling node.
        let mut remove = self.serial(prev, node);
        remove.extend(self.serial(node, next));
        self.graph.replace_connections(&remove, &self.serial(prev, next));
        self.graph.remove_node(node);
        self.side_chain.lock().retain(|c| c.destination.node != node);
        tracing::debug!("plugin_dock: removed node {node} from {index}");
    }

    /// Number of plugins.
    pub fn plugin_count(&self) -> usize {
        self.plugins.lock().len()
    }

    /// Node of the plugin at `index`.
    pub fn plugin_node(&self, index: usize) -> Option<Arc<Node>> {
        let id = self.plugins.lock().get(index).copied()?;
        self.graph.node(id)
    }

    /// `(name, enabled)` of every plugin in chain order.
    pub fn plugin_list(&self) -> Vec<(String, bool)> {
        let plugins = self.plugins.lock();
        plugins
            .iter()
            .filter_map(|&id| self.graph.node(id))
            .map(|node| (node.name(), !node.is_bypassed()))
            .collect()
    }

    /// Bypasses or re-enables the plugin at `index`. The plugin stays wired.
    pub fn set_plugin_bypass(&self, index: usize, bypass: bool) {
        if let Some(&id) = self.plugins.lock().get(index) {
            self.graph.set_bypassed(id, bypass);
        }
    }

    /// Whether the plugin at `index` is bypassed.
    pub fn plugin_bypass(&self, index: usize) -> bool {
        self.plugins
            .lock()
            .get(index)
            .is_some_and(|&id| self.graph.is_bypassed(id))
    }

    // --- Side-chain buses ---

    /// Number of input buses, main included.
    pub fn input_bus_count(&self) -> usize {
        self.graph.layout().inputs.len()
    }

    /// Appends a side-chain input bus as wide as the main bus.
    pub fn add_additional_audio_bus(&self) {
        let layout = self.graph.layout().with_input_bus(self.main);
        self.graph.set_buses_layout(layout);
        tracing::debug!("plugin_dock: {} input buses", self.input_bus_count());
    }

    /// Removes the last side-chain bus and any routing from it.
    ///
    /// Returns `false` if only the main bus is left.
    pub fn remove_additional_audio_bus(&self) -> bool {
        let mut layout = self.graph.layout();
        if layout.inputs.len() <= 1 {
            return false;
        }
        layout.inputs.pop();
        self.graph.set_buses_layout(layout);
        self.side_chain.lock().retain(|c| self.graph.is_connected(c));
        true
    }

    /// Routes input channel `source_channel` (on a side-chain bus) to channel
    /// `dest_channel` of the plugin at `plugin`.
    pub fn add_additional_bus_connection(
        &self,
        plugin: usize,
        source_channel: usize,
        dest_channel: usize,
    ) -> bool {
        let layout = self.graph.layout();
        if source_channel < self.width() || source_channel >= layout.total_input_channels() {
            return false;
        }
        let plugins = self.plugins.lock();
        let Some(&node) = plugins.get(plugin) else {
            return false;
        };
        let conn = Connection::new(self.graph.audio_input_node(), source_channel, node, dest_channel);
        match self.graph.add_connection(&conn) {
            Ok(true) => {
                self.side_chain.lock().push(conn);
                true
            }
            Ok(false) => true,
            Err(err) => {
                tracing::warn!("plugin_dock: side-chain {conn} rejected: {err}");
                false
            }
        }
    }

    /// Removes a side-chain route. Returns `false` if it did not exist.
    pub fn remove_additional_bus_connection(
        &self,
        plugin: usize,
        source_channel: usize,
        dest_channel: usize,
    ) -> bool {
        let plugins = self.plugins.lock();
        let Some(&node) = plugins.get(plugin) else {
            return false;
        };
        let conn = Connection::new(self.graph.audio_input_node(), source_channel, node, dest_channel);
        let mut side_chain = self.side_chain.lock();
        let Some(pos) = side_chain.iter().position(|c| *c == conn) else {
            return false;
        };
        side_chain.remove(pos);
        self.graph.remove_connection(&conn);
        true
    }

    /// Side-chain routes as `(plugin index, source channel, plugin channel)`,
    /// sorted.
    pub fn additional_bus_connections(&self) -> Vec<(usize, usize, usize)> {
        let plugins = self.plugins.lock();
        let mut routes: Vec<_> = self
            .side_chain
            .lock()
            .iter()
            .filter_map(|c| {
                let index = plugins.iter().position(|&id| id == c.destination.node)?;
                Some((index, c.source.channel, c.destination.channel))
            })
            .collect();
        routes.sort_unstable();
        routes
    }
}

impl core::fmt::Debug for PluginDock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PluginDock")
            .field("main", &self.main)
            .field("plugins", &self.plugins.lock().len())
            .field("graph", &self.graph)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::GainUnit;
    use rondo_core::{AudioBuffer, MidiBuffer, ProcessorError};

    fn dock() -> PluginDock {
        PluginDock::new(ChannelSet::Stereo, 48000.0, 32, Arc::new(DeferredQueue::new()))
    }

    fn gain(db: f32) -> Box<dyn AudioProcessor> {
        Box::new(GainUnit::new(ChannelSet::Stereo, db))
    }

    fn render(dock: &PluginDock, value: f32) -> AudioBuffer {
        let mut audio = AudioBuffer::from_channels(vec![vec![value; 32]; 2]);
        let mut midi = MidiBuffer::new(8);
        dock.graph().process(&mut audio, &mut midi);
        audio
    }

    struct Editor;

    impl AudioProcessor for Editor {
        fn name(&self) -> &str {
            "editor"
        }

        fn layout(&self) -> BusLayout {
            BusLayout::stereo()
        }

        fn prepare(&mut self, _sample_rate: f64, _block_size: usize) -> Result<(), ProcessorError> {
            Ok(())
        }

        fn process(&mut self, _audio: &mut AudioBuffer, _midi: &mut MidiBuffer) {}

        fn has_editor(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_empty_dock_passes_through() {
        let dock = dock();
        assert_eq!(dock.graph().connection_count(), 2);
        assert_eq!(render(&dock, 0.5).channel(1)[10], 0.5);
    }

    #[test]
    fn test_insert_order_and_rendering() {
        let dock = dock();
        assert!(dock.insert_plugin(gain(-6.0), 0));
        assert!(dock.insert_plugin(gain(-6.0), 99));
        assert_eq!(dock.plugin_count(), 2);
        // in→a, a→b, b→out on two channels
        assert_eq!(dock.graph().connection_count(), 6);
        let out = render(&dock, 1.0);
        assert!((out.channel(0)[0] - 0.251).abs() < 0.01);
    }

    #[test]
    fn test_insert_middle_rewires_neighbors() {
        let dock = dock();
        dock.insert_plugin(gain(0.0), 0);
        dock.insert_plugin(gain(0.0), 1);
        dock.insert_plugin(gain(0.0), 1);
        let ids: Vec<NodeId> = (0..3).map(|i| dock.plugin_node(i).unwrap().id()).collect();
        let g = dock.graph();
        assert!(g.is_connected(&Connection::new(ids[0], 0, ids[1], 0)));
        assert!(g.is_connected(&Connection::new(ids[1], 1, ids[2], 1)));
        assert!(!g.is_connected(&Connection::new(ids[0], 0, ids[2], 0)));
    }

    #[test]
    fn test_remove_out_of_range_is_noop() {
        let dock = dock();
        dock.insert_plugin(gain(0.0), 0);
        dock.remove_plugin(3);
        assert_eq!(dock.plugin_count(), 1);
        dock.remove_plugin(0);
        assert_eq!(dock.plugin_count(), 0);
        assert_eq!(dock.graph().connection_count(), 2);
    }

    #[test]
    fn test_render_never_sees_chain_open() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let dock = Arc::new(dock());
        let running = Arc::new(AtomicBool::new(true));
        let render_thread = {
            let dock = Arc::clone(&dock);
            let running = Arc::clone(&running);
            thread::spawn(move || {
                let mut silent = 0usize;
                while running.load(Ordering::Relaxed) {
                    if render(&dock, 1.0).channel(0)[0] != 1.0 {
                        silent += 1;
                    }
                }
                silent
            })
        };

        for _ in 0..2000 {
            assert!(dock.insert_plugin(gain(0.0), 0));
            dock.remove_plugin(0);
        }
        running.store(false, Ordering::Relaxed);
        assert_eq!(render_thread.join().unwrap(), 0);
        assert_eq!(dock.graph().connection_count(), 2);
        let report = dock.graph().deferred().drain();
        assert_eq!(report.released + report.retained, 2000);
    }

    #[test]
    fn test_bypass_and_list() {
        let dock = dock();
        dock.insert_plugin(gain(-60.0), 0);
        dock.set_plugin_bypass(0, true);
        assert!(dock.plugin_bypass(0));
        assert!(!dock.plugin_bypass(5));
        assert_eq!(dock.plugin_list(), vec![("Gain".to_string(), false)]);
        assert_eq!(render(&dock, 1.0).channel(0)[0], 1.0);
    }

    #[test]
    fn test_editor_close_is_deferred() {
        let dock = dock();
        dock.insert_plugin(Box::new(Editor), 0);
        dock.remove_plugin(0);
        let report = dock.graph().deferred().drain();
        assert_eq!(report.editors_closed, 1);
    }

    #[test]
    fn test_side_chain_bus_lifecycle() {
        let dock = dock();
        assert!(!dock.remove_additional_audio_bus());
        dock.insert_plugin(Box::new(GainUnit::new(ChannelSet::Discrete(4), 0.0)), 0);
        dock.add_additional_audio_bus();
        assert_eq!(dock.layout().total_input_channels(), 4);

        // main-bus channels are not side-chain sources
        assert!(!dock.add_additional_bus_connection(0, 1, 2));
        assert!(dock.add_additional_bus_connection(0, 2, 2));
        assert!(dock.add_additional_bus_connection(0, 3, 3));
        assert_eq!(dock.additional_bus_connections(), vec![(0, 2, 2), (0, 3, 3)]);

        assert!(dock.remove_additional_bus_connection(0, 3, 3));
        assert!(!dock.remove_additional_bus_connection(0, 3, 3));

        assert!(dock.remove_additional_audio_bus());
        assert!(dock.additional_bus_connections().is_empty());
        assert_eq!(dock.input_bus_count(), 1);
    }
}
