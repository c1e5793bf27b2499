//! Channel sets and bus layouts.
//!
//! A [`BusLayout`] lists the input and output buses of a unit or a whole
//! graph. Bus 0 on each side is the main bus. Channel indices in connections
//! are flat: bus `n` starts where bus `n - 1` ends.

use serde::{Deserialize, Serialize};

/// Channel configuration of one bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSet {
    /// No channels.
    Disabled,
    /// One channel.
    Mono,
    /// Two channels.
    #[default]
    Stereo,
    /// Any other channel count.
    Discrete(u16),
}

impl ChannelSet {
    /// Returns the channel count.
    pub fn size(self) -> usize {
        match self {
            Self::Disabled => 0,
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::Discrete(n) => n as usize,
        }
    }

    /// Returns the canonical set for a channel count.
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => Self::Disabled,
            1 => Self::Mono,
            2 => Self::Stereo,
            n => Self::Discrete(n.min(u16::MAX as usize) as u16),
        }
    }

    /// True for a zero-channel set.
    pub fn is_disabled(self) -> bool {
        self.size() == 0
    }
}

/// Input and output buses of a unit or graph.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BusLayout {
    /// Input buses. Index 0 is the main input.
    #[serde(default)]
    pub inputs: Vec<ChannelSet>,
    /// Output buses. Index 0 is the main output.
    #[serde(default)]
    pub outputs: Vec<ChannelSet>,
}

impl BusLayout {
    /// Creates a layout from explicit bus lists.
    pub fn new(inputs: Vec<ChannelSet>, outputs: Vec<ChannelSet>) -> Self {
        Self { inputs, outputs }
    }

    /// One main input and one main output bus with the same channel set.
    pub fn symmetric(set: ChannelSet) -> Self {
        Self::new(vec![set], vec![set])
    }

    /// Stereo in, stereo out.
    pub fn stereo() -> Self {
        Self::symmetric(ChannelSet::Stereo)
    }

    /// Output-only layout (sources, instruments).
    pub fn output_only(set: ChannelSet) -> Self {
        Self::new(Vec::new(), vec![set])
    }

    /// Total channels across all input buses.
    pub fn total_input_channels(&self) -> usize {
        self.inputs.iter().map(|s| s.size()).sum()
    }

    /// Total channels across all output buses.
    pub fn total_output_channels(&self) -> usize {
        self.outputs.iter().map(|s| s.size()).sum()
    }

    /// Channels on input bus 0, or 0 without inputs.
    pub fn main_input_channels(&self) -> usize {
        self.inputs.first().map_or(0, |s| s.size())
    }

    /// Channels on output bus 0, or 0 without outputs.
    pub fn main_output_channels(&self) -> usize {
        self.outputs.first().map_or(0, |s| s.size())
    }

    /// Returns `(first_channel, channel_count)` of an input bus.
    pub fn input_bus_range(&self, bus: usize) -> Option<(usize, usize)> {
        bus_range(&self.inputs, bus)
    }

    /// Returns `(first_channel, channel_count)` of an output bus.
    pub fn output_bus_range(&self, bus: usize) -> Option<(usize, usize)> {
        bus_range(&self.outputs, bus)
    }

    /// Layout of a graph's audio-input boundary node: it emits the graph's inputs.
    pub fn input_boundary(&self) -> Self {
        Self::new(Vec::new(), self.inputs.clone())
    }

    /// Layout of a graph's audio-output boundary node: it consumes the graph's outputs.
    pub fn output_boundary(&self) -> Self {
        Self::new(self.outputs.clone(), Vec::new())
    }

    /// Returns the layout with one more input bus appended.
    pub fn with_input_bus(mut self, set: ChannelSet) -> Self {
        self.inputs.push(set);
        self
    }
}

fn bus_range(buses: &[ChannelSet], bus: usize) -> Option<(usize, usize)> {
    let set = buses.get(bus)?;
    let start = buses[..bus].iter().map(|s| s.size()).sum();
    Some((start, set.size()))
}
