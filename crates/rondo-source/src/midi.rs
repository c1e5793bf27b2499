//! MIDI source content.
//!
//! A [`MidiSource`] holds tracks of timed messages plus the derived views
//! editors need: paired notes, controller lanes, pitch wheel, channel
//! pressure and after-touch. Timing is in seconds. Reads and writes from the
//! render thread use the same try-lock policy as audio sources.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use rondo_core::{MidiBuffer, MidiMessage};

/// A message at a time in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedMessage {
    /// Time in seconds from the start of the content.
    pub time: f64,
    /// The message.
    pub message: MidiMessage,
}

/// A note built from a paired note-on and note-off.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiNote {
    /// MIDI channel.
    pub channel: u8,
    /// Note-on time in seconds.
    pub start: f64,
    /// Note-off time in seconds.
    pub end: f64,
    /// Note number.
    pub pitch: u8,
    /// Note-on velocity.
    pub velocity: u8,
    /// Attached lyric text, empty if none.
    pub lyrics: String,
}

/// A single value on a controller-like lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiValue {
    /// MIDI channel.
    pub channel: u8,
    /// Time in seconds.
    pub time: f64,
    /// Value (pitch wheel is signed, centred at 0).
    pub value: i16,
}

/// A per-note pressure value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiAfterTouch {
    /// MIDI channel.
    pub channel: u8,
    /// Time in seconds.
    pub time: f64,
    /// Note number.
    pub note: u8,
    /// Pressure.
    pub value: u8,
}

/// One track of MIDI content with its derived lanes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MidiTrack {
    events: Vec<TimedMessage>,
    notes: Vec<MidiNote>,
    controllers: BTreeMap<u8, Vec<MidiValue>>,
    pitch_wheel: Vec<MidiValue>,
    channel_pressure: Vec<MidiValue>,
    after_touch: Vec<MidiAfterTouch>,
}

impl MidiTrack {
    /// Builds a track from messages in any order.
    ///
    /// Note-ons pair with the earliest open note-on of the same channel and
    /// pitch. Notes left open end at the last event time.
    pub fn from_messages(mut events: Vec<TimedMessage>) -> Self {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        let mut track = Self {
            events,
            ..Self::default()
        };
        track.rebuild();
        track
    }

    fn rebuild(&mut self) {
        self.notes.clear();
        self.controllers.clear();
        self.pitch_wheel.clear();
        self.channel_pressure.clear();
        self.after_touch.clear();

        let mut open: BTreeMap<(u8, u8), Vec<usize>> = BTreeMap::new();
        for ev in &self.events {
            let msg = ev.message;
            match msg {
                _ if msg.is_note_on() => {
                    if let MidiMessage::NoteOn {
                        channel,
                        note,
                        velocity,
                    } = msg
                    {
                        open.entry((channel, note)).or_default().push(self.notes.len());
                        self.notes.push(MidiNote {
                            channel,
                            start: ev.time,
                            end: ev.time,
                            pitch: note,
                            velocity,
                            lyrics: String::new(),
                        });
                    }
                }
                _ if msg.is_note_off() => {
                    if let Some(note) = msg.note()
                        && let Some(pending) = open.get_mut(&(msg.channel(), note))
                        && !pending.is_empty()
                    {
                        let idx = pending.remove(0);
                        self.notes[idx].end = ev.time;
                    }
                }
                MidiMessage::ControlChange {
                    channel,
                    controller,
                    value,
                } => self.controllers.entry(controller).or_default().push(MidiValue {
                    channel,
                    time: ev.time,
                    value: i16::from(value),
                }),
                MidiMessage::PitchBend { channel, value } => self.pitch_wheel.push(MidiValue {
                    channel,
                    time: ev.time,
                    value,
                }),
                MidiMessage::ChannelPressure { channel, value } => {
                    self.channel_pressure.push(MidiValue {
                        channel,
                        time: ev.time,
                        value: i16::from(value),
                    });
                }
                MidiMessage::PolyAftertouch {
                    channel,
                    note,
                    value,
                } => self.after_touch.push(MidiAfterTouch {
                    channel,
                    time: ev.time,
                    note,
                    value,
                }),
                _ => {}
            }
        }

        let last = self.end_time();
        for pending in open.values() {
            for &idx in pending {
                self.notes[idx].end = last;
            }
        }
    }

    /// Raw messages in time order.
    pub fn events(&self) -> &[TimedMessage] {
        &self.events
    }

    /// Paired notes in note-on order.
    pub fn notes(&self) -> &[MidiNote] {
        &self.notes
    }

    /// Controller numbers that appear on this track.
    pub fn controller_numbers(&self) -> Vec<u8> {
        self.controllers.keys().copied().collect()
    }

    /// Values of one controller.
    pub fn controller(&self, number: u8) -> &[MidiValue] {
        self.controllers.get(&number).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Pitch wheel values.
    pub fn pitch_wheel(&self) -> &[MidiValue] {
        &self.pitch_wheel
    }

    /// Channel pressure values.
    pub fn channel_pressure(&self) -> &[MidiValue] {
        &self.channel_pressure
    }

    /// Per-note after-touch values.
    pub fn after_touch(&self) -> &[MidiAfterTouch] {
        &self.after_touch
    }

    /// Time of the last event, or 0 when empty.
    pub fn end_time(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.time)
    }

    /// Attaches lyric text to a note. Returns `false` for a bad index.
    pub fn set_lyrics(&mut self, note: usize, lyrics: impl Into<String>) -> bool {
        match self.notes.get_mut(note) {
            Some(n) => {
                n.lyrics = lyrics.into();
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MidiData {
    tracks: Vec<MidiTrack>,
    recording: Vec<TimedMessage>,
}

/// MIDI content shared between playback and recording.
#[derive(Debug, Default)]
pub struct MidiSource {
    data: RwLock<MidiData>,
}

impl MidiSource {
    /// Creates empty content.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates content from prepared tracks.
    pub fn from_tracks(tracks: Vec<MidiTrack>) -> Self {
        Self {
            data: RwLock::new(MidiData {
                tracks,
                recording: Vec::new(),
            }),
        }
    }

    /// Replaces all tracks.
    pub fn set_tracks(&self, tracks: Vec<MidiTrack>) {
        self.data.write().tracks = tracks;
    }

    /// Appends a track.
    pub fn add_track(&self, track: MidiTrack) {
        self.data.write().tracks.push(track);
    }

    /// Number of tracks.
    pub fn track_count(&self) -> usize {
        self.data.read().tracks.len()
    }

    /// Copy of one track.
    pub fn track(&self, index: usize) -> Option<MidiTrack> {
        self.data.read().tracks.get(index).cloned()
    }

    /// Copy of all tracks.
    pub fn tracks(&self) -> Vec<MidiTrack> {
        self.data.read().tracks.clone()
    }

    /// Latest event time across tracks.
    pub fn length_seconds(&self) -> f64 {
        self.data
            .read()
            .tracks
            .iter()
            .map(MidiTrack::end_time)
            .fold(0.0, f64::max)
    }

    /// Independent copy.
    pub fn duplicate(&self) -> MidiSource {
        MidiSource {
            data: RwLock::new(self.data.read().clone()),
        }
    }

    /// Deep-copies another source's tracks.
    pub fn clone_from(&self, other: &MidiSource) {
        if core::ptr::eq(self, other) {
            return;
        }
        let tracks = other.tracks();
        self.data.write().tracks = tracks;
    }

    /// Emits events of `track` with times in `[start, end)` into `buffer`.
    ///
    /// An event at time `t` lands on frame
    /// `floor((dest_offset + t - start) * sample_rate)`. Returns the number of
    /// events written, 0 if the content lock was contended.
    pub fn read_into(
        &self,
        buffer: &mut MidiBuffer,
        dest_offset: f64,
        start: f64,
        end: f64,
        track: usize,
        sample_rate: f64,
    ) -> usize {
        let Some(data) = self.data.try_read() else {
            tracing::trace!("midi_source: read contended, block skipped");
            return 0;
        };
        let Some(track) = data.tracks.get(track) else {
            return 0;
        };
        let first = track.events.partition_point(|e| e.time < start);
        let mut written = 0;
        for ev in track.events[first..].iter().take_while(|e| e.time < end) {
            let frame = ((dest_offset + ev.time - start) * sample_rate).floor().max(0.0) as u32;
            if buffer.add(frame, ev.message) {
                written += 1;
            }
        }
        written
    }

    /// Clears the pending recording take.
    pub fn prepare_to_record(&self) {
        self.data.write().recording.clear();
    }

    /// Appends recorded events. An event on frame `f` is stored at
    /// `offset + f / sample_rate` seconds. Returns `false` if dropped on
    /// contention.
    pub fn write_events(&self, buffer: &MidiBuffer, offset: f64, sample_rate: f64) -> bool {
        let Some(mut data) = self.data.try_write() else {
            tracing::trace!("midi_source: write contended, block dropped");
            return false;
        };
        for ev in buffer {
            let time = offset + f64::from(ev.frame) / sample_rate;
            if time >= 0.0 {
                data.recording.push(TimedMessage {
                    time,
                    message: ev.message,
                });
            }
        }
        true
    }

    /// Turns the recording take into a new track. Returns its index, or
    /// `None` if nothing was recorded.
    pub fn recording_finished(&self) -> Option<usize> {
        let mut data = self.data.write();
        if data.recording.is_empty() {
            return None;
        }
        let events = core::mem::take(&mut data.recording);
        data.tracks.push(MidiTrack::from_messages(events));
        Some(data.tracks.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on(time: f64, note: u8) -> TimedMessage {
        TimedMessage {
            time,
            message: MidiMessage::NoteOn {
                channel: 0,
                note,
                velocity: 100,
            },
        }
    }

    fn off(time: f64, note: u8) -> TimedMessage {
        TimedMessage {
            time,
            message: MidiMessage::NoteOff {
                channel: 0,
                note,
                velocity: 0,
            },
        }
    }

    #[test]
    fn test_notes_pair_first_in_first_out() {
        let track = MidiTrack::from_messages(vec![
            off(2.0, 60),
            on(0.0, 60),
            on(1.0, 60),
            off(3.0, 60),
        ]);
        let notes = track.notes();
        assert_eq!(notes.len(), 2);
        assert_eq!((notes[0].start, notes[0].end), (0.0, 2.0));
        assert_eq!((notes[1].start, notes[1].end), (1.0, 3.0));
    }

    #[test]
    fn test_open_note_ends_at_last_event() {
        let track = MidiTrack::from_messages(vec![
            on(0.5, 64),
            TimedMessage {
                time: 4.0,
                message: MidiMessage::all_notes_off(0),
            },
        ]);
        assert_eq!(track.notes()[0].end, 4.0);
        assert_eq!(track.controller_numbers(), vec![123]);
        assert!(track.controller(7).is_empty());
    }

    #[test]
    fn test_read_into_window() {
        let source = MidiSource::from_tracks(vec![MidiTrack::from_messages(vec![
            on(0.5, 60),
            on(1.0, 62),
            off(1.5, 60),
        ])]);
        let mut buffer = MidiBuffer::new(8);
        let n = source.read_into(&mut buffer, 0.0, 1.0, 2.0, 0, 100.0);
        assert_eq!(n, 2);
        let frames: Vec<u32> = buffer.iter().map(|e| e.frame).collect();
        assert_eq!(frames, vec![0, 50]);
        assert_eq!(source.read_into(&mut buffer, 0.0, 0.0, 1.0, 5, 100.0), 0);
    }

    #[test]
    fn test_recording_becomes_track() {
        let source = MidiSource::new();
        source.prepare_to_record();
        let mut block = MidiBuffer::new(4);
        block.add(10, on(0.0, 60).message);
        assert!(source.write_events(&block, 1.0, 100.0));
        assert_eq!(source.recording_finished(), Some(0));
        let track = source.track(0).unwrap();
        assert!((track.events()[0].time - 1.1).abs() < 1e-9);
        assert_eq!(source.recording_finished(), None);
    }

    #[test]
    fn test_lyrics() {
        let mut track = MidiTrack::from_messages(vec![on(0.0, 60), off(1.0, 60)]);
        assert!(track.set_lyrics(0, "la"));
        assert!(!track.set_lyrics(3, "la"));
        assert_eq!(track.notes()[0].lyrics, "la");
    }
}
