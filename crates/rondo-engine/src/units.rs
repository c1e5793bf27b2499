//! Built-in processing units.
//!
//! These are what [`BuiltinFactory`](crate::BuiltinFactory) hands out and what
//! session files refer to by kind: a fixed gain stage for track chains and a
//! small polyphonic sine instrument.

use core::f32::consts::TAU;

use libm::{floorf, sinf};
use rondo_core::midi::CC_ALL_NOTES_OFF;
use rondo_core::{
    AudioBuffer, AudioProcessor, BusLayout, ChannelSet, MidiBuffer, MidiMessage, ProcessorError,
    db_to_linear, midi_to_freq,
};

/// Fixed gain on every channel of one bus.
#[derive(Debug, Clone)]
pub struct GainUnit {
    set: ChannelSet,
    gain_db: f32,
    gain: f32,
}

impl GainUnit {
    /// Creates a gain stage on a `set`-wide bus.
    pub fn new(set: ChannelSet, gain_db: f32) -> Self {
        Self {
            set,
            gain_db,
            gain: db_to_linear(gain_db),
        }
    }

    /// Gain in dB.
    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    /// Sets the gain in dB.
    pub fn set_gain_db(&mut self, gain_db: f32) {
        self.gain_db = gain_db;
        self.gain = db_to_linear(gain_db);
    }
}

impl AudioProcessor for GainUnit {
    fn name(&self) -> &str {
        "Gain"
    }

    fn layout(&self) -> BusLayout {
        BusLayout::symmetric(self.set)
    }

    fn prepare(&mut self, _sample_rate: f64, _block_size: usize) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn process(&mut self, audio: &mut AudioBuffer, _midi: &mut MidiBuffer) {
        audio.apply_gain(self.gain);
    }
}

const MAX_VOICES: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
struct Voice {
    note: u8,
    channel: u8,
    phase: f32,
    phase_inc: f32,
    amp: f32,
    active: bool,
    age: u64,
}

/// Eight-voice sine instrument. Oldest voice is stolen when all are busy.
#[derive(Debug, Clone)]
pub struct SineInstrument {
    set: ChannelSet,
    sample_rate: f32,
    voices: [Voice; MAX_VOICES],
    clock: u64,
}

impl SineInstrument {
    /// Creates an instrument writing the same signal to every channel of `set`.
    pub fn new(set: ChannelSet) -> Self {
        Self {
            set,
            sample_rate: 48000.0,
            voices: [Voice::default(); MAX_VOICES],
            clock: 0,
        }
    }

    /// Number of sounding voices.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    fn handle(&mut self, message: MidiMessage) {
        match message {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } if velocity > 0 => {
                self.clock += 1;
                let slot = self
                    .voices
                    .iter()
                    .position(|v| !v.active)
                    .or_else(|| {
                        self.voices
                            .iter()
                            .enumerate()
                            .min_by_key(|(_, v)| v.age)
                            .map(|(i, _)| i)
                    })
                    .unwrap_or(0);
                self.voices[slot] = Voice {
                    note,
                    channel,
                    phase: 0.0,
                    phase_inc: midi_to_freq(f32::from(note)) / self.sample_rate,
                    amp: f32::from(velocity) / 127.0 * 0.25,
                    active: true,
                    age: self.clock,
                };
            }
            MidiMessage::NoteOn { channel, note, .. } | MidiMessage::NoteOff { channel, note, .. } => {
                for v in &mut self.voices {
                    if v.active && v.note == note && v.channel == channel {
                        v.active = false;
                    }
                }
            }
            MidiMessage::ControlChange {
                channel,
                controller: CC_ALL_NOTES_OFF,
                ..
            } => {
                for v in &mut self.voices {
                    if v.channel == channel {
                        v.active = false;
                    }
                }
            }
            _ => {}
        }
    }

    fn render(&mut self, audio: &mut AudioBuffer, from: usize, to: usize) {
        let channels = audio.num_channels();
        for i in from..to {
            let mut acc = 0.0;
            for v in self.voices.iter_mut().filter(|v| v.active) {
                acc += sinf(v.phase * TAU) * v.amp;
                v.phase += v.phase_inc;
                v.phase -= floorf(v.phase);
            }
            for ch in 0..channels {
                audio.channel_mut(ch)[i] = acc;
            }
        }
    }
}

impl AudioProcessor for SineInstrument {
    fn name(&self) -> &str {
        "Sine"
    }

    fn layout(&self) -> BusLayout {
        BusLayout::output_only(self.set)
    }

    fn accepts_midi(&self) -> bool {
        true
    }

    fn prepare(&mut self, sample_rate: f64, _block_size: usize) -> Result<(), ProcessorError> {
        if sample_rate <= 0.0 {
            return Err(ProcessorError::UnsupportedSampleRate(sample_rate));
        }
        self.sample_rate = sample_rate as f32;
        for v in &mut self.voices {
            v.phase_inc = midi_to_freq(f32::from(v.note)) / self.sample_rate;
        }
        Ok(())
    }

    fn process(&mut self, audio: &mut AudioBuffer, midi: &mut MidiBuffer) {
        let frames = audio.frames();
        let mut cursor = 0;
        for ev in midi.iter() {
            let at = (ev.frame as usize).min(frames);
            self.render(audio, cursor, at);
            cursor = at;
            self.handle(ev.message);
        }
        self.render(audio, cursor, frames);
    }

    fn reset(&mut self) {
        self.voices = [Voice::default(); MAX_VOICES];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(note: u8) -> MidiMessage {
        MidiMessage::NoteOn {
            channel: 0,
            note,
            velocity: 127,
        }
    }

    #[test]
    fn test_gain_unit_scales() {
        let mut unit = GainUnit::new(ChannelSet::Stereo, -6.0);
        let mut audio = AudioBuffer::from_channels(vec![vec![1.0; 8]; 2]);
        let mut midi = MidiBuffer::new(4);
        unit.process(&mut audio, &mut midi);
        assert!((audio.channel(1)[3] - 0.501).abs() < 0.01);
        assert_eq!(unit.layout().main_input_channels(), 2);
    }

    #[test]
    fn test_sine_silent_until_note() {
        let mut sine = SineInstrument::new(ChannelSet::Stereo);
        sine.prepare(48000.0, 64).unwrap();
        let mut audio = AudioBuffer::new(2, 64);
        let mut midi = MidiBuffer::new(8);
        midi.add(32, note_on(69));
        sine.process(&mut audio, &mut midi);

        assert!(audio.channel(0)[..32].iter().all(|&s| s == 0.0));
        assert!(audio.channel(0)[33..].iter().any(|&s| s != 0.0));
        assert_eq!(audio.channel(0), audio.channel(1));
        assert_eq!(sine.active_voices(), 1);
    }

    #[test]
    fn test_sine_note_off_and_all_notes_off() {
        let mut sine = SineInstrument::new(ChannelSet::Mono);
        sine.prepare(48000.0, 16).unwrap();
        let mut audio = AudioBuffer::new(1, 16);
        let mut midi = MidiBuffer::new(8);
        midi.add(0, note_on(60));
        midi.add(0, note_on(64));
        midi.add(4, MidiMessage::NoteOff {
            channel: 0,
            note: 60,
            velocity: 0,
        });
        sine.process(&mut audio, &mut midi);
        assert_eq!(sine.active_voices(), 1);

        midi.clear();
        midi.add(0, MidiMessage::all_notes_off(0));
        sine.process(&mut audio, &mut midi);
        assert_eq!(sine.active_voices(), 0);
    }

    #[test]
    fn test_sine_steals_oldest_voice() {
        let mut sine = SineInstrument::new(ChannelSet::Mono);
        sine.prepare(48000.0, 16).unwrap();
        let mut audio = AudioBuffer::new(1, 16);
        let mut midi = MidiBuffer::new(16);
        for note in 60..70 {
            midi.add(0, note_on(note));
        }
        sine.process(&mut audio, &mut midi);
        assert_eq!(sine.active_voices(), MAX_VOICES);
        assert!(!sine.voices.iter().any(|v| v.note == 60 || v.note == 61));
    }
}
