//! Session engine for rondo.
//!
//! Builds on the graph primitive in `rondo-core` and the source content in
//! `rondo-source`:
//!
//! - [`PluginDock`]: a serial plugin chain in its own graph, with side-chain
//!   buses
//! - [`Mixer`]: tracks, each hosting a dock, summed into an undeletable
//!   master
//! - [`SeqGraph`]: sources and instrument slots routed into mixer tracks
//! - [`PluginLoader`]: plugin instantiation on a worker thread, installing
//!   into slots held weakly
//! - [`Session`]: all of the above over one shared [`SessionContext`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rondo_config::SessionConfig;
//! use rondo_core::{AudioBuffer, MidiBuffer};
//! use rondo_engine::Session;
//!
//! let session = Session::from_config(&SessionConfig::load("song.toml")?)?;
//! session.play();
//!
//! let mut audio = AudioBuffer::new(2, 512);
//! let mut midi = MidiBuffer::new(512);
//! session.process_block(&mut audio, &mut midi);
//! session.maintenance();
//! ```

mod context;
mod dock;
mod error;
mod loader;
mod mixer;
mod routing;
pub mod seq;
mod session;
mod track;
mod units;

pub use context::SessionContext;
pub use dock::PluginDock;
pub use error::{EngineError, Result};
pub use loader::{
    BuiltinFactory, BuiltinInfo, LoadCallback, LoadTarget, PluginDescriptor, PluginFactory,
    PluginLoader,
};
pub use mixer::Mixer;
pub use routing::{AudioRoute, MidiRoute};
pub use seq::{InstrumentHandle, PluginDecorator, SeqBlock, SeqGraph, SeqSource};
pub use session::Session;
pub use track::{DEFAULT_TRACK_COLOR, TrackState};
pub use units::{GainUnit, SineInstrument};
