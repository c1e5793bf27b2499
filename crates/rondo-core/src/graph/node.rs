//! Graph node types.
//!
//! A [`Node`] pairs a processing unit with the pre-sized I/O buffer the render
//! thread fills for it. Both sit behind their own mutex: the control thread
//! locks them normally, the render thread only ever `try_lock`s them.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::buffer::AudioBuffer;
use crate::bus::BusLayout;
use crate::midi::MidiBuffer;
use crate::processor::{AudioProcessor, ProcessorError};

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique node identifier.
///
/// IDs come from a global counter and are never reused, so an ID held after
/// its node was removed can never alias a newer node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }

    /// An ID no graph ever hands out.
    #[inline]
    pub fn sentinel() -> Self {
        Self(u32::MAX)
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// The role of a node in its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Emits the host's audio input. One per graph.
    AudioInput,
    /// Collects audio handed back to the host. One per graph.
    AudioOutput,
    /// Emits the host's MIDI input. One per graph.
    MidiInput,
    /// Wraps a processing unit.
    Processor,
}

impl NodeKind {
    /// True for the three pseudo-nodes every graph creates.
    pub fn is_boundary(self) -> bool {
        !matches!(self, Self::Processor)
    }
}

/// Per-node render scratch.
#[derive(Debug)]
pub(crate) struct NodeIo {
    pub audio: AudioBuffer,
    pub midi: MidiBuffer,
    /// Render pass that last wrote this buffer.
    pub stamp: u64,
}

impl NodeIo {
    fn new(channels: usize, block_size: usize, midi_capacity: usize) -> Self {
        Self {
            audio: AudioBuffer::new(channels, block_size),
            midi: MidiBuffer::new(midi_capacity),
            stamp: 0,
        }
    }

    /// Starts a render pass: sizes and silences the buffers.
    #[inline]
    pub fn begin(&mut self, frames: usize, stamp: u64) {
        self.audio.set_frames(frames);
        self.audio.clear();
        self.midi.clear();
        self.stamp = stamp;
    }
}

/// A node owned by an `AudioGraph`.
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    pub(crate) unit: Mutex<Box<dyn AudioProcessor>>,
    pub(crate) io: Mutex<NodeIo>,
    bypassed: AtomicBool,
}

impl Node {
    pub(crate) fn new(
        kind: NodeKind,
        unit: Box<dyn AudioProcessor>,
        block_size: usize,
        midi_capacity: usize,
    ) -> Self {
        let channels = io_channels(&unit.layout());
        Self {
            id: NodeId::next(),
            kind,
            unit: Mutex::new(unit),
            io: Mutex::new(NodeIo::new(channels, block_size, midi_capacity)),
            bypassed: AtomicBool::new(false),
        }
    }

    /// Returns the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the node's role.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Returns the unit's current display name.
    pub fn name(&self) -> String {
        self.with_unit(|unit| unit.name().to_string())
    }

    /// Whether the graph skips this node's processing.
    pub fn is_bypassed(&self) -> bool {
        self.bypassed.load(Ordering::Acquire)
    }

    pub(crate) fn set_bypassed(&self, bypassed: bool) {
        self.bypassed.store(bypassed, Ordering::Release);
    }

    /// Runs `f` with exclusive access to the unit.
    ///
    /// Blocks until the render thread finishes the current block with it.
    /// Control-thread only.
    pub fn with_unit<R>(&self, f: impl FnOnce(&mut dyn AudioProcessor) -> R) -> R {
        let mut unit = self.unit.lock();
        f(&mut **unit)
    }

    /// Like [`with_unit`](Self::with_unit) but gives up instead of waiting.
    pub fn try_with_unit<R>(&self, f: impl FnOnce(&mut dyn AudioProcessor) -> R) -> Option<R> {
        let mut unit = self.unit.try_lock()?;
        Some(f(&mut **unit))
    }

    /// Re-prepares the unit and resizes the I/O buffer to its layout.
    pub(crate) fn prepare(&self, sample_rate: f64, block_size: usize) -> Result<(), ProcessorError> {
        let (result, channels) = self.with_unit(|unit| {
            (unit.prepare(sample_rate, block_size), io_channels(&unit.layout()))
        });
        self.resize_io(channels, block_size);
        result
    }

    pub(crate) fn resize_io(&self, channels: usize, block_size: usize) {
        let mut io = self.io.lock();
        io.audio.resize(channels, block_size);
        io.audio.set_frames(block_size);
    }
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("bypassed", &self.is_bypassed())
            .finish_non_exhaustive()
    }
}

/// Channels a unit's in-place buffer needs.
pub(crate) fn io_channels(layout: &BusLayout) -> usize {
    layout
        .total_input_channels()
        .max(layout.total_output_channels())
}

/// Unit standing in for a boundary pseudo-node. The graph renders boundary
/// nodes itself; the unit only carries the layout.
pub(crate) struct BoundaryProcessor {
    kind: NodeKind,
    layout: BusLayout,
}

impl BoundaryProcessor {
    pub(crate) fn new(kind: NodeKind, layout: BusLayout) -> Self {
        Self { kind, layout }
    }
}

impl AudioProcessor for BoundaryProcessor {
    fn name(&self) -> &str {
        match self.kind {
            NodeKind::AudioInput => "Audio Input",
            NodeKind::AudioOutput => "Audio Output",
            NodeKind::MidiInput => "MIDI Input",
            NodeKind::Processor => "Boundary",
        }
    }

    fn layout(&self) -> BusLayout {
        self.layout.clone()
    }

    fn produces_midi(&self) -> bool {
        self.kind == NodeKind::MidiInput
    }

    fn prepare(&mut self, _sample_rate: f64, _block_size: usize) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn process(&mut self, _audio: &mut AudioBuffer, _midi: &mut MidiBuffer) {}

    fn set_layout(&mut self, layout: &BusLayout) -> bool {
        self.layout = layout.clone();
        true
    }
}
