//! Connection endpoints.
//!
//! A [`Connection`] links one channel of a source node to one channel of a
//! destination node. Audio channels are flat indices across all of a node's
//! buses. MIDI travels on the reserved [`MIDI_CHANNEL_INDEX`].

use super::node::NodeId;

/// Channel index reserved for MIDI.
pub const MIDI_CHANNEL_INDEX: usize = 0x1000;

/// One side of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAndChannel {
    /// The node.
    pub node: NodeId,
    /// Flat audio channel index, or [`MIDI_CHANNEL_INDEX`].
    pub channel: usize,
}

impl NodeAndChannel {
    /// Creates an endpoint.
    pub fn new(node: NodeId, channel: usize) -> Self {
        Self { node, channel }
    }

    /// True if this endpoint is the MIDI channel.
    pub fn is_midi(&self) -> bool {
        self.channel == MIDI_CHANNEL_INDEX
    }
}

/// A directed audio or MIDI link between two nodes.
///
/// Ordering is by source then destination, which gives the graph's
/// connection set a stable iteration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Connection {
    /// Upstream endpoint.
    pub source: NodeAndChannel,
    /// Downstream endpoint.
    pub destination: NodeAndChannel,
}

impl Connection {
    /// Audio connection from `source:source_channel` to `destination:destination_channel`.
    pub fn new(
        source: NodeId,
        source_channel: usize,
        destination: NodeId,
        destination_channel: usize,
    ) -> Self {
        Self {
            source: NodeAndChannel::new(source, source_channel),
            destination: NodeAndChannel::new(destination, destination_channel),
        }
    }

    /// MIDI connection from `source` to `destination`.
    pub fn midi(source: NodeId, destination: NodeId) -> Self {
        Self::new(source, MIDI_CHANNEL_INDEX, destination, MIDI_CHANNEL_INDEX)
    }

    /// True if both ends use the MIDI channel.
    pub fn is_midi(&self) -> bool {
        self.source.is_midi() && self.destination.is_midi()
    }

    /// True if either end is `node`.
    pub fn touches(&self, node: NodeId) -> bool {
        self.source.node == node || self.destination.node == node
    }
}

impl core::fmt::Display for Connection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_midi() {
            write!(f, "{}:midi → {}:midi", self.source.node, self.destination.node)
        } else {
            write!(
                f,
                "{}:{} → {}:{}",
                self.source.node, self.source.channel, self.destination.node, self.destination.channel
            )
        }
    }
}
