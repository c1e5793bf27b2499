//! MIDI messages and per-block event buffers.
//!
//! [`MidiBuffer`] has a fixed capacity chosen at construction. Pushing past it
//! drops the event instead of reallocating, so buffers owned by graph nodes
//! can be filled from the audio thread.

use serde::{Deserialize, Serialize};

/// Controller number for "All Notes Off".
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// A channel-voice MIDI message. Channels are 0-based (0..=15).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MidiMessage {
    /// Key pressed. A velocity of 0 is treated as a note-off.
    NoteOn {
        /// MIDI channel.
        channel: u8,
        /// Note number.
        note: u8,
        /// Strike velocity.
        velocity: u8,
    },
    /// Key released.
    NoteOff {
        /// MIDI channel.
        channel: u8,
        /// Note number.
        note: u8,
        /// Release velocity.
        velocity: u8,
    },
    /// Per-note pressure.
    PolyAftertouch {
        /// MIDI channel.
        channel: u8,
        /// Note number.
        note: u8,
        /// Pressure amount.
        value: u8,
    },
    /// Continuous controller change.
    ControlChange {
        /// MIDI channel.
        channel: u8,
        /// Controller number.
        controller: u8,
        /// Controller value.
        value: u8,
    },
    /// Program change.
    ProgramChange {
        /// MIDI channel.
        channel: u8,
        /// Program number.
        program: u8,
    },
    /// Channel-wide pressure.
    ChannelPressure {
        /// MIDI channel.
        channel: u8,
        /// Pressure amount.
        value: u8,
    },
    /// Pitch wheel, centered at 0 (range -8192..=8191).
    PitchBend {
        /// MIDI channel.
        channel: u8,
        /// Signed bend amount.
        value: i16,
    },
}

impl MidiMessage {
    /// Returns the message's channel.
    pub fn channel(&self) -> u8 {
        match *self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::PolyAftertouch { channel, .. }
            | Self::ControlChange { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::ChannelPressure { channel, .. }
            | Self::PitchBend { channel, .. } => channel,
        }
    }

    /// True for a note-on with non-zero velocity.
    pub fn is_note_on(&self) -> bool {
        matches!(self, Self::NoteOn { velocity, .. } if *velocity > 0)
    }

    /// True for a note-off, including note-on with zero velocity.
    pub fn is_note_off(&self) -> bool {
        matches!(
            self,
            Self::NoteOff { .. } | Self::NoteOn { velocity: 0, .. }
        )
    }

    /// Returns the note number for note and poly-aftertouch messages.
    pub fn note(&self) -> Option<u8> {
        match *self {
            Self::NoteOn { note, .. } | Self::NoteOff { note, .. } | Self::PolyAftertouch { note, .. } => {
                Some(note)
            }
            _ => None,
        }
    }

    /// "All Notes Off" controller message for `channel`.
    pub fn all_notes_off(channel: u8) -> Self {
        Self::ControlChange {
            channel,
            controller: CC_ALL_NOTES_OFF,
            value: 0,
        }
    }

    /// Parses a raw channel-voice message. Returns `None` for system messages,
    /// running status or truncated input.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        let channel = status & 0x0F;
        let data = |i: usize| bytes.get(i).map(|b| b & 0x7F);
        match status & 0xF0 {
            0x80 => Some(Self::NoteOff {
                channel,
                note: data(1)?,
                velocity: data(2)?,
            }),
            0x90 => Some(Self::NoteOn {
                channel,
                note: data(1)?,
                velocity: data(2)?,
            }),
            0xA0 => Some(Self::PolyAftertouch {
                channel,
                note: data(1)?,
                value: data(2)?,
            }),
            0xB0 => Some(Self::ControlChange {
                channel,
                controller: data(1)?,
                value: data(2)?,
            }),
            0xC0 => Some(Self::ProgramChange {
                channel,
                program: data(1)?,
            }),
            0xD0 => Some(Self::ChannelPressure {
                channel,
                value: data(1)?,
            }),
            0xE0 => {
                let lsb = i16::from(data(1)?);
                let msb = i16::from(data(2)?);
                Some(Self::PitchBend {
                    channel,
                    value: ((msb << 7) | lsb) - 8192,
                })
            }
            _ => None,
        }
    }

    /// Encodes to raw bytes. Returns the buffer and the number of bytes used.
    pub fn to_bytes(&self) -> ([u8; 3], usize) {
        let ch = |c: u8| c & 0x0F;
        match *self {
            Self::NoteOff {
                channel,
                note,
                velocity,
            } => ([0x80 | ch(channel), note & 0x7F, velocity & 0x7F], 3),
            Self::NoteOn {
                channel,
                note,
                velocity,
            } => ([0x90 | ch(channel), note & 0x7F, velocity & 0x7F], 3),
            Self::PolyAftertouch {
                channel,
                note,
                value,
            } => ([0xA0 | ch(channel), note & 0x7F, value & 0x7F], 3),
            Self::ControlChange {
                channel,
                controller,
                value,
            } => ([0xB0 | ch(channel), controller & 0x7F, value & 0x7F], 3),
            Self::ProgramChange { channel, program } => ([0xC0 | ch(channel), program & 0x7F, 0], 2),
            Self::ChannelPressure { channel, value } => ([0xD0 | ch(channel), value & 0x7F, 0], 2),
            Self::PitchBend { channel, value } => {
                let raw = (i32::from(value) + 8192).clamp(0, 16383) as u16;
                (
                    [0xE0 | ch(channel), (raw & 0x7F) as u8, (raw >> 7) as u8],
                    3,
                )
            }
        }
    }
}

/// A MIDI message stamped with its frame offset inside the current block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiEvent {
    /// Frame offset from the start of the block.
    pub frame: u32,
    /// The message.
    pub message: MidiMessage,
}

/// Fixed-capacity, frame-ordered list of MIDI events for one block.
#[derive(Debug, Clone, Default)]
pub struct MidiBuffer {
    events: Vec<MidiEvent>,
    capacity: usize,
    dropped: usize,
}

impl MidiBuffer {
    /// Creates an empty buffer that holds at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Returns the maximum number of events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if there are no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events dropped because the buffer was full since the last clear.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Removes all events.
    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped = 0;
    }

    /// Inserts an event, keeping frame order. Events on the same frame keep
    /// insertion order.
    ///
    /// Returns `false` (and counts a drop) when the buffer is full.
    pub fn push(&mut self, event: MidiEvent) -> bool {
        if self.events.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        let pos = self
            .events
            .iter()
            .rposition(|e| e.frame <= event.frame)
            .map_or(0, |p| p + 1);
        self.events.insert(pos, event);
        true
    }

    /// Convenience for [`push`](Self::push).
    pub fn add(&mut self, frame: u32, message: MidiMessage) -> bool {
        self.push(MidiEvent { frame, message })
    }

    /// Merges every event from `other` into this buffer.
    pub fn merge_from(&mut self, other: &MidiBuffer) {
        for event in &other.events {
            self.push(*event);
        }
    }

    /// Iterates events in frame order.
    pub fn iter(&self) -> impl Iterator<Item = &MidiEvent> {
        self.events.iter()
    }

    /// Keeps only events matching `keep`.
    pub fn retain(&mut self, keep: impl FnMut(&MidiEvent) -> bool) {
        self.events.retain(keep);
    }
}

impl<'a> IntoIterator for &'a MidiBuffer {
    type Item = &'a MidiEvent;
    type IntoIter = core::slice::Iter<'a, MidiEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(note: u8) -> MidiMessage {
        MidiMessage::NoteOn {
            channel: 0,
            note,
            velocity: 100,
        }
    }

    #[test]
    fn test_push_keeps_frame_order() {
        let mut buf = MidiBuffer::new(8);
        buf.add(10, note_on(60));
        buf.add(2, note_on(61));
        buf.add(10, note_on(62));
        let notes: Vec<u8> = buf.iter().filter_map(|e| e.message.note()).collect();
        assert_eq!(notes, vec![61, 60, 62]);
    }

    #[test]
    fn test_full_buffer_drops() {
        let mut buf = MidiBuffer::new(1);
        assert!(buf.add(0, note_on(60)));
        assert!(!buf.add(0, note_on(61)));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.dropped(), 1);
        buf.clear();
        assert_eq!(buf.dropped(), 0);
    }

    #[test]
    fn test_zero_velocity_note_on_is_note_off() {
        let msg = MidiMessage::NoteOn {
            channel: 3,
            note: 64,
            velocity: 0,
        };
        assert!(msg.is_note_off());
        assert!(!msg.is_note_on());
        assert_eq!(msg.channel(), 3);
    }

    #[test]
    fn test_bytes_roundtrip_pitch_bend() {
        let msg = MidiMessage::PitchBend {
            channel: 1,
            value: -100,
        };
        let (bytes, len) = msg.to_bytes();
        assert_eq!(len, 3);
        assert_eq!(MidiMessage::from_bytes(&bytes[..len]), Some(msg));
    }

    #[test]
    fn test_from_bytes_rejects_truncated_and_system() {
        assert_eq!(MidiMessage::from_bytes(&[0x90, 60]), None);
        assert_eq!(MidiMessage::from_bytes(&[0xF8]), None);
        assert_eq!(MidiMessage::from_bytes(&[]), None);
    }
}
