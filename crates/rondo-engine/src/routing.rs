//! Plain-data views of connections, for inspection and serialization.

use serde::Serialize;

/// A channel-level audio link between two indexed endpoints.
///
/// Ordered by source channel, then destination index, then destination
/// channel, the order route lists are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AudioRoute {
    /// Index of the sending track, source or instrument.
    pub source: usize,
    /// Channel on the sender.
    pub source_channel: usize,
    /// Index of the receiving track.
    pub destination: usize,
    /// Channel on the receiver.
    pub destination_channel: usize,
}

impl AudioRoute {
    /// Creates a route.
    pub fn new(
        source: usize,
        source_channel: usize,
        destination: usize,
        destination_channel: usize,
    ) -> Self {
        Self {
            source,
            source_channel,
            destination,
            destination_channel,
        }
    }
}

impl Ord for AudioRoute {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        (
            self.source_channel,
            self.destination,
            self.destination_channel,
            self.source,
        )
            .cmp(&(
                other.source_channel,
                other.destination,
                other.destination_channel,
                other.source,
            ))
    }
}

impl PartialOrd for AudioRoute {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A MIDI link into an instrument or track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MidiRoute {
    /// Index of the sending source. `None` is the host MIDI input.
    pub source: Option<usize>,
    /// Index of the receiver.
    pub destination: usize,
}

impl MidiRoute {
    /// A route from a sequencer source.
    pub fn from_source(source: usize, destination: usize) -> Self {
        Self {
            source: Some(source),
            destination,
        }
    }

    /// A route from the host MIDI input.
    pub fn from_device(destination: usize) -> Self {
        Self {
            source: None,
            destination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_route_order() {
        let mut routes = vec![
            AudioRoute::new(1, 1, 0, 0),
            AudioRoute::new(1, 0, 2, 1),
            AudioRoute::new(1, 0, 2, 0),
            AudioRoute::new(1, 0, 0, 1),
        ];
        routes.sort();
        assert_eq!(
            routes,
            vec![
                AudioRoute::new(1, 0, 0, 1),
                AudioRoute::new(1, 0, 2, 0),
                AudioRoute::new(1, 0, 2, 1),
                AudioRoute::new(1, 1, 0, 0),
            ]
        );
    }

    #[test]
    fn test_device_route_sorts_first() {
        let mut routes = vec![MidiRoute::from_source(0, 3), MidiRoute::from_device(3)];
        routes.sort();
        assert_eq!(routes[0], MidiRoute::from_device(3));
    }
}
