//! Instrument slots.
//!
//! An instrument node is allocated before its plugin exists: the graph holds a
//! [`PluginDecorator`] that renders silence until a plugin is installed into
//! it through an [`InstrumentHandle`]. This lets plugin loading run on another
//! thread while the slot is already routed.

use core::any::Any;
use std::sync::{Arc, Weak};

use rondo_core::{
    AudioBuffer, AudioGraph, AudioProcessor, BusLayout, ChannelSet, MidiBuffer, NodeId,
    ProcessorError,
};

/// A node unit that forwards to an optional, late-installed plugin.
pub struct PluginDecorator {
    set: ChannelSet,
    plugin: Option<Box<dyn AudioProcessor>>,
    identifier: String,
    sample_rate: f64,
    block_size: usize,
}

impl PluginDecorator {
    /// An empty slot with a `set`-wide output bus.
    pub fn new(set: ChannelSet) -> Self {
        Self {
            set,
            plugin: None,
            identifier: String::new(),
            sample_rate: 48000.0,
            block_size: 512,
        }
    }

    /// Installs an already prepared plugin, returning the previous one.
    ///
    /// Refused if the plugin cannot fill the slot's output bus.
    pub fn set_plugin(
        &mut self,
        plugin: Box<dyn AudioProcessor>,
        identifier: impl Into<String>,
    ) -> Result<Option<Box<dyn AudioProcessor>>, Box<dyn AudioProcessor>> {
        if plugin.layout().total_output_channels() < self.set.size() {
            return Err(plugin);
        }
        self.identifier = identifier.into();
        Ok(self.plugin.replace(plugin))
    }

    /// Empties the slot.
    pub fn take_plugin(&mut self) -> Option<Box<dyn AudioProcessor>> {
        self.identifier.clear();
        self.plugin.take()
    }

    /// True while a plugin is installed.
    pub fn has_plugin(&self) -> bool {
        self.plugin.is_some()
    }

    /// Identifier the current plugin was installed under. Empty when the
    /// slot is empty.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Rate and block size the slot was last prepared with.
    pub fn settings(&self) -> (f64, usize) {
        (self.sample_rate, self.block_size)
    }
}

impl AudioProcessor for PluginDecorator {
    fn name(&self) -> &str {
        self.plugin.as_ref().map_or("Instrument", |p| p.name())
    }

    fn layout(&self) -> BusLayout {
        BusLayout::output_only(self.set)
    }

    fn accepts_midi(&self) -> bool {
        true
    }

    fn prepare(&mut self, sample_rate: f64, block_size: usize) -> Result<(), ProcessorError> {
        if let Some(plugin) = self.plugin.as_mut() {
            plugin.prepare(sample_rate, block_size)?;
        }
        self.sample_rate = sample_rate;
        self.block_size = block_size;
        Ok(())
    }

    fn process(&mut self, audio: &mut AudioBuffer, midi: &mut MidiBuffer) {
        match self.plugin.as_mut() {
            Some(plugin) => plugin.process(audio, midi),
            None => audio.clear(),
        }
    }

    fn reset(&mut self) {
        if let Some(plugin) = self.plugin.as_mut() {
            plugin.reset();
        }
    }

    fn has_editor(&self) -> bool {
        self.plugin.as_ref().is_some_and(|p| p.has_editor())
    }

    fn close_editor(&mut self) {
        if let Some(plugin) = self.plugin.as_mut() {
            plugin.close_editor();
        }
    }

    fn latency_samples(&self) -> usize {
        self.plugin.as_ref().map_or(0, |p| p.latency_samples())
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}

impl core::fmt::Debug for PluginDecorator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PluginDecorator")
            .field("set", &self.set)
            .field("plugin", &self.plugin.as_ref().map(|p| p.name().to_string()))
            .field("identifier", &self.identifier)
            .finish()
    }
}

/// Weak reference to an instrument slot.
///
/// Does not keep the slot alive. Once the instrument is removed from its
/// graph every operation through the handle is a no-op.
#[derive(Debug, Clone)]
pub struct InstrumentHandle {
    graph: Weak<AudioGraph>,
    node: NodeId,
}

impl InstrumentHandle {
    pub(crate) fn new(graph: &Arc<AudioGraph>, node: NodeId) -> Self {
        Self {
            graph: Arc::downgrade(graph),
            node,
        }
    }

    /// Graph node of the slot.
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Whether the slot is still in its graph.
    pub fn is_alive(&self) -> bool {
        self.graph
            .upgrade()
            .is_some_and(|g| g.contains_node(self.node))
    }

    fn with_slot<R>(&self, f: impl FnOnce(&mut PluginDecorator) -> R) -> Option<R> {
        let graph = self.graph.upgrade()?;
        let node = graph.node(self.node)?;
        node.with_unit(|unit| {
            unit.as_any_mut()
                .and_then(|any| any.downcast_mut::<PluginDecorator>())
                .map(f)
        })
    }

    /// Rate and block size of the slot, `None` once it is gone.
    pub fn settings(&self) -> Option<(f64, usize)> {
        self.with_slot(|slot| slot.settings())
    }

    /// Prepares `plugin` at the slot's settings and installs it.
    ///
    /// Returns `false` if the slot is gone, the plugin refuses the settings
    /// or cannot fill the slot's bus. Preparation happens outside the slot's
    /// lock, so the render thread only misses the swap itself.
    pub fn install(&self, mut plugin: Box<dyn AudioProcessor>, identifier: &str) -> bool {
        let Some((sample_rate, block_size)) = self.settings() else {
            tracing::debug!("instrument: slot {} gone, '{identifier}' dropped", self.node);
            return false;
        };
        if let Err(err) = plugin.prepare(sample_rate, block_size) {
            tracing::warn!("instrument: '{identifier}' rejected {sample_rate} Hz / {block_size}: {err}");
            return false;
        }
        let swapped = self.with_slot(|slot| slot.set_plugin(plugin, identifier));
        match swapped {
            Some(Ok(old)) => {
                if let Some(mut old) = old
                    && old.has_editor()
                {
                    old.close_editor();
                }
                tracing::debug!("instrument: installed '{identifier}' into {}", self.node);
                true
            }
            Some(Err(_)) => {
                tracing::warn!("instrument: '{identifier}' too narrow for slot {}", self.node);
                false
            }
            None => false,
        }
    }

    /// Identifier of the installed plugin, `None` if the slot is gone or empty.
    pub fn identifier(&self) -> Option<String> {
        self.with_slot(|slot| slot.identifier().to_string())
            .filter(|id| !id.is_empty())
    }

    /// Whether the slot is alive and holds a plugin.
    pub fn has_plugin(&self) -> bool {
        self.with_slot(|slot| slot.has_plugin()).unwrap_or(false)
    }
}

impl PartialEq for InstrumentHandle {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && Weak::ptr_eq(&self.graph, &other.graph)
    }
}

impl Eq for InstrumentHandle {}
