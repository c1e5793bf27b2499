//! Rondo Core - real-time graph primitives for the rondo audio engine
//!
//! This crate provides the foundation every higher layer builds on: buffers,
//! MIDI events, bus layouts, the processing-unit trait and the node graph that
//! routes audio and MIDI between units while the audio thread keeps running.
//!
//! # Core Abstractions
//!
//! ## Buffers and Events
//!
//! - [`AudioBuffer`] - Pre-sized multichannel sample buffer
//! - [`MidiBuffer`] - Fixed-capacity list of timestamped [`MidiMessage`]s
//!
//! ## Units and Layouts
//!
//! - [`AudioProcessor`] - Object-safe trait for anything that lives in a graph
//! - [`BusLayout`] / [`ChannelSet`] - Declared input/output buses of a unit or graph
//!
//! ## Graph
//!
//! - [`AudioGraph`] - Node/connection topology with a lock-free render path
//! - [`Connection`] - `(node, channel) → (node, channel)` link, MIDI on
//!   [`MIDI_CHANNEL_INDEX`]
//!
//! ## Session Plumbing
//!
//! - [`DeferredQueue`] - Teardown queue drained off the render thread
//! - [`Transport`] - Atomic play position, looping and tempo conversions
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rondo_core::{AudioGraph, BusLayout, Connection, DeferredQueue};
//!
//! let graph = AudioGraph::new(BusLayout::stereo(), 48000.0, 512, Arc::new(DeferredQueue::new()));
//! let gain = graph.add_node(Box::new(MyGain::default())).unwrap();
//! for ch in 0..2 {
//!     graph.add_connection(&Connection::new(graph.audio_input_node(), ch, gain, ch))?;
//!     graph.add_connection(&Connection::new(gain, ch, graph.audio_output_node(), ch))?;
//! }
//!
//! // On the audio thread
//! graph.process(&mut audio, &mut midi);
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: the render path never blocks; contention degrades to silence
//! - **Snapshot rendering**: mutations publish an immutable render plan, the audio
//!   thread finishes the block it started with the plan it loaded
//! - **Object-safe traits**: units are `Box<dyn AudioProcessor>`

pub mod buffer;
pub mod bus;
pub mod deferred;
pub mod graph;
pub mod math;
pub mod midi;
pub mod processor;
pub mod transport;

pub use buffer::AudioBuffer;
pub use bus::{BusLayout, ChannelSet};
pub use deferred::{DeferredQueue, DeferredTask, DrainReport, Retained};
pub use graph::{
    AudioGraph, Connection, GraphError, MIDI_CHANNEL_INDEX, Node, NodeAndChannel, NodeId,
    NodeKind, RenderPlan,
};
pub use math::{balance_gains, db_to_linear, linear_to_db, midi_to_freq};
pub use midi::{MidiBuffer, MidiEvent, MidiMessage};
pub use processor::{AudioProcessor, ProcessorError};
pub use transport::{PositionInfo, Transport};
