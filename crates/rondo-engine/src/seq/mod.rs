//! Sequencer side of the session graph.
//!
//! - [`SeqSource`] places pooled audio and MIDI on the timeline in
//!   [`SeqBlock`]s and plays them against the shared transport
//! - [`PluginDecorator`] is an instrument slot a plugin can be installed into
//!   later through an [`InstrumentHandle`]
//! - [`SeqGraph`] orders both and routes them into mixer tracks

mod graph;
mod instrument;
mod source;

pub use graph::SeqGraph;
pub use instrument::{InstrumentHandle, PluginDecorator};
pub use source::{SeqBlock, SeqSource};
