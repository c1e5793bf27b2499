//! The processing-unit trait every graph node wraps.
//!
//! Tracks, plugins, source players, instruments and the graph boundary nodes
//! all implement [`AudioProcessor`]. The graph needs only rendering, a bus
//! layout and a name from a unit; everything else is a capability query with
//! a default answer.
//!
//! ## Design Decisions
//!
//! - **In-place processing**: a unit receives one buffer sized to
//!   `max(total inputs, total outputs)` channels. Inputs arrive in the low
//!   channels and the unit overwrites them with its outputs.
//!
//! - **Object-safe**: units are stored as `Box<dyn AudioProcessor>`, so
//!   heterogeneous units can share one graph.
//!
//! - **No allocations in `process`**: buffers are pre-sized by
//!   [`prepare`](AudioProcessor::prepare).

use core::any::Any;

use thiserror::Error;

use crate::buffer::AudioBuffer;
use crate::bus::BusLayout;
use crate::midi::MidiBuffer;

/// Reasons a unit can refuse to be prepared or created.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessorError {
    /// The unit cannot run at this sample rate.
    #[error("unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(f64),
    /// The unit cannot run with this block size.
    #[error("unsupported block size: {0}")]
    UnsupportedBlockSize(usize),
    /// The unit cannot adopt the requested bus layout.
    #[error("unsupported bus layout")]
    UnsupportedLayout,
    /// Instantiation failed for a unit-specific reason.
    #[error("failed to instantiate unit: {0}")]
    Instantiate(String),
}

/// A processing unit that can live inside an `AudioGraph`.
///
/// # Example
///
/// ```rust
/// use rondo_core::{AudioBuffer, AudioProcessor, BusLayout, MidiBuffer, ProcessorError};
///
/// struct Half;
///
/// impl AudioProcessor for Half {
///     fn name(&self) -> &str {
///         "half"
///     }
///
///     fn layout(&self) -> BusLayout {
///         BusLayout::stereo()
///     }
///
///     fn prepare(&mut self, _sample_rate: f64, _block_size: usize) -> Result<(), ProcessorError> {
///         Ok(())
///     }
///
///     fn process(&mut self, audio: &mut AudioBuffer, _midi: &mut MidiBuffer) {
///         audio.apply_gain(0.5);
///     }
/// }
/// ```
pub trait AudioProcessor: Send {
    /// Display name.
    fn name(&self) -> &str;

    /// Current input and output buses.
    fn layout(&self) -> BusLayout;

    /// Whether the unit consumes MIDI.
    fn accepts_midi(&self) -> bool {
        false
    }

    /// Whether the unit emits MIDI.
    fn produces_midi(&self) -> bool {
        false
    }

    /// Called on the control thread before the unit first renders and whenever
    /// the rate or block size changes.
    fn prepare(&mut self, sample_rate: f64, block_size: usize) -> Result<(), ProcessorError>;

    /// Renders one block in place.
    ///
    /// `audio.frames()` is at most the prepared block size. `midi` holds the
    /// merged incoming events; a MIDI-producing unit replaces them with its
    /// output.
    fn process(&mut self, audio: &mut AudioBuffer, midi: &mut MidiBuffer);

    /// Clears internal state (delay lines, voices) without re-preparing.
    fn reset(&mut self) {}

    /// Asks the unit to adopt a new layout. Returns `true` if it did.
    fn set_layout(&mut self, _layout: &BusLayout) -> bool {
        false
    }

    /// Whether the unit owns an editor window that must be closed on removal.
    fn has_editor(&self) -> bool {
        false
    }

    /// Closes the editor. Always called off the render thread.
    fn close_editor(&mut self) {}

    /// Processing latency in samples.
    fn latency_samples(&self) -> usize {
        0
    }

    /// Downcast hook for control-thread code that needs the concrete unit.
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    impl AudioProcessor for Plain {
        fn name(&self) -> &str {
            "plain"
        }

        fn layout(&self) -> BusLayout {
            BusLayout::stereo()
        }

        fn prepare(&mut self, _sample_rate: f64, _block_size: usize) -> Result<(), ProcessorError> {
            Ok(())
        }

        fn process(&mut self, _audio: &mut AudioBuffer, _midi: &mut MidiBuffer) {}
    }

    #[test]
    fn test_default_capabilities() {
        let mut unit = Plain;
        assert!(!unit.accepts_midi());
        assert!(!unit.produces_midi());
        assert!(!unit.has_editor());
        assert!(!unit.set_layout(&BusLayout::default()));
        assert_eq!(unit.latency_samples(), 0);
        assert!(unit.as_any_mut().is_none());
    }

    #[test]
    fn test_error_display() {
        let err = ProcessorError::UnsupportedSampleRate(22050.0);
        assert_eq!(err.to_string(), "unsupported sample rate: 22050 Hz");
    }
}
