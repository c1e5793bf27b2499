//! Shared source content for the rondo audio engine.
//!
//! This crate provides:
//!
//! - **Audio content**: [`AudioSource`] serves try-locked reads to playback and
//!   try-locked writes to a recorder, resampled by [`Resampler`]
//! - **MIDI content**: [`MidiSource`] tracks with paired notes and controller lanes
//! - **Pooling**: [`SourcePool`] deduplicates named [`SourceContainer`]s and forks
//!   private copies on demand
//! - **Handles**: [`SourceManager`] maps opaque [`SourceRef`]s to pooled content
//! - **Codecs**: [`FormatRegistry`] picks an [`AudioCodec`] by file extension
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rondo_source::{FormatRegistry, SourceManager, SourcePool, SourceType};
//!
//! let manager = SourceManager::new(Arc::new(SourcePool::new()), Arc::new(FormatRegistry::new()));
//! manager.sample_rate_changed(48000.0, 512);
//!
//! let take = manager.apply_source(SourceType::Audio);
//! manager.load_audio(take, "drums.wav".as_ref())?;
//!
//! // On the audio thread
//! manager.read_audio_data(take, &mut block, 0.0, position_secs, block_secs);
//! ```

mod audio;
mod codec;
mod container;
mod error;
mod manager;
mod midi;
mod pool;
mod resample;

pub use audio::{AudioSource, SourceState};
pub use codec::{AudioCodec, AudioInfo, DecodedAudio, EncodeOptions, FormatRegistry, WavCodec};
pub use container::{SourceContainer, SourceContent, SourceType};
pub use error::{Result, SourceError};
pub use manager::{SourceManager, SourceRef};
pub use midi::{MidiAfterTouch, MidiNote, MidiSource, MidiTrack, MidiValue, TimedMessage};
pub use pool::{SourcePool, UNNAMED_PREFIX};
pub use resample::Resampler;
