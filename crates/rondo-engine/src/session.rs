//! A complete session: context, mixer and sequencer over one graph.
//!
//! ```text
//!   sources ──┐
//!             ├──► tracks (plugin docks) ──► master ──► device out
//! instruments ┘        ▲
//!                 device in
//! ```

use std::path::Path;
use std::sync::Arc;

use rondo_config::{InstrumentConfig, SessionConfig, TrackConfig};
use rondo_core::{AudioBuffer, ChannelSet, DrainReport, MidiBuffer, MidiMessage, NodeId, Transport};
use rondo_source::{MidiTrack, SourceType, TimedMessage};

use crate::context::SessionContext;
use crate::error::{EngineError, Result};
use crate::loader::{BuiltinFactory, PluginDescriptor};
use crate::mixer::Mixer;
use crate::seq::{SeqBlock, SeqGraph, SeqSource};

/// Silence kept after the last note of a MIDI clip so its note-offs fall
/// inside the clip's block.
const MIDI_TAIL_SECONDS: f64 = 1.0;

/// Owns everything a render needs.
pub struct Session {
    context: SessionContext,
    mixer: Arc<Mixer>,
    seq: SeqGraph,
    factory: BuiltinFactory,
}

impl Session {
    /// An empty session: master track only, no sources or instruments.
    pub fn new(context: SessionContext) -> Result<Self> {
        let config = context.config();
        let mixer = Arc::new(Mixer::with_layout(
            context.device_layout(),
            config.sample_rate_hz(),
            config.block_size,
            config.midi_capacity,
            Arc::clone(context.deferred()),
        )?);
        let seq = SeqGraph::new(
            Arc::clone(&mixer),
            Arc::clone(context.manager()),
            Arc::clone(context.transport()),
        );
        Ok(Self {
            context,
            mixer,
            seq,
            factory: BuiltinFactory::new(),
        })
    }

    /// Builds a session from a session file's contents.
    ///
    /// Each configured track becomes a mixer track after the master. A track
    /// with a source gets a sequencer source placed at its start time. Each
    /// instrument gets a MIDI source holding its notes.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        let session = Self::new(SessionContext::new(config.engine.clone())?)?;
        for track in &config.tracks {
            session.add_track(track)?;
        }
        for instrument in &config.instruments {
            session.add_instrument(instrument)?;
        }
        tracing::info!(
            "session '{}': {} tracks, {} sources, {} instruments",
            config.name,
            session.mixer.track_count() - 1,
            session.seq.source_count(),
            session.seq.instrument_count()
        );
        Ok(session)
    }

    /// Shared pool, codecs and transport.
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// The mixer and its graph.
    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    /// Sources and instruments feeding the mixer.
    pub fn seq(&self) -> &SeqGraph {
        &self.seq
    }

    /// Shortcut for the context's transport.
    pub fn transport(&self) -> &Arc<Transport> {
        self.context.transport()
    }

    fn main_set(&self) -> ChannelSet {
        ChannelSet::from_count(usize::from(self.context.config().output_channels))
    }

    fn descriptor(&self, kind: &str) -> PluginDescriptor {
        PluginDescriptor::new(kind).with_set(self.main_set())
    }

    // --- Building ---

    /// Appends a mixer track described by `config`. Returns its index.
    pub fn add_track(&self, config: &TrackConfig) -> Result<usize> {
        let set = self.main_set();
        if !self.mixer.insert_track(usize::MAX, set) {
            return Err(EngineError::NodeRejected(format!("track '{}'", config.name)));
        }
        let index = self.mixer.track_count() - 1;
        if let Some(state) = self.mixer.track_state(index) {
            state.set_name(config.name.as_str());
            state.set_color(config.color);
            state.set_gain_db(config.gain_db);
            state.set_pan(config.pan);
            state.set_muted(config.muted);
        }

        let graph = self.mixer.graph();
        let dock = self
            .mixer
            .track_dock(index)
            .ok_or_else(|| EngineError::NodeRejected(format!("track '{}'", config.name)))?;
        for plugin in &config.plugins {
            let descriptor = self.descriptor(&plugin.kind).with_param("gain_db", plugin.gain_db);
            let unit = self
                .factory
                .create(&descriptor, graph.sample_rate(), graph.block_size())?;
            if !dock.insert_plugin(unit, usize::MAX) {
                return Err(EngineError::NodeRejected(format!("plugin '{}'", plugin.kind)));
            }
        }

        if let Some(path) = &config.source {
            self.add_audio_source(path, config.start, index)?;
        }
        tracing::debug!("session: track '{}' at {index}", config.name);
        Ok(index)
    }

    /// Places the audio file at `path` on the timeline at `start` seconds,
    /// playing into mixer track `track`.
    pub fn add_audio_source(&self, path: &Path, start: f64, track: usize) -> Result<Arc<SeqSource>> {
        let manager = self.context.manager();
        let r = manager.apply_source(SourceType::Audio);
        if let Err(err) = manager.load_audio(r, path) {
            manager.release_source(r);
            return Err(err.into());
        }
        manager.prepare_audio_play(r);

        let source = self
            .seq
            .insert_source(usize::MAX, self.main_set())
            .ok_or_else(|| EngineError::NodeRejected(path.display().to_string()))?;
        source.set_audio(Some(r));
        source.add_block(SeqBlock::new(start, manager.length(r)));
        if let Some(index) = self.seq.find_source(&source) {
            self.seq.set_source_audio_output(index, track);
        }
        Ok(source)
    }

    /// Adds an instrument described by `config`, fed by a MIDI source holding
    /// its notes.
    pub fn add_instrument(&self, config: &InstrumentConfig) -> Result<()> {
        let set = self.main_set();
        let graph = self.mixer.graph();
        let unit = self
            .factory
            .create(&self.descriptor(&config.kind), graph.sample_rate(), graph.block_size())?;
        let handle = self
            .seq
            .insert_instrument_with(unit, &config.kind, usize::MAX, set)
            .ok_or_else(|| EngineError::NodeRejected(format!("instrument '{}'", config.kind)))?;
        let instr = self
            .seq
            .find_instrument(&handle)
            .ok_or_else(|| EngineError::NodeRejected(format!("instrument '{}'", config.kind)))?;

        let mut events = Vec::with_capacity(config.midi.len() * 2);
        for note in &config.midi {
            events.push(TimedMessage {
                time: note.start,
                message: MidiMessage::NoteOn {
                    channel: note.channel,
                    note: note.pitch,
                    velocity: note.velocity,
                },
            });
            events.push(TimedMessage {
                time: note.end,
                message: MidiMessage::NoteOff {
                    channel: note.channel,
                    note: note.pitch,
                    velocity: 0,
                },
            });
        }
        let manager = self.context.manager();
        let r = manager.apply_source(SourceType::Midi);
        manager.set_midi(r, &config.kind, vec![MidiTrack::from_messages(events)])?;

        let source = self
            .seq
            .insert_source(usize::MAX, set)
            .ok_or_else(|| EngineError::NodeRejected("instrument notes".into()))?;
        source.set_midi(Some(r));
        source.add_block(SeqBlock::new(0.0, manager.length(r) + MIDI_TAIL_SECONDS));
        let src = self
            .seq
            .find_source(&source)
            .ok_or_else(|| EngineError::NodeRejected("instrument notes".into()))?;

        // Session tracks start after the master.
        let track = config.track + 1;
        self.seq.set_midi_src_to_instr_connection(src, instr);
        for ch in 0..set.size() {
            self.seq.set_instr_audio_output(instr, ch, track, ch);
        }
        Ok(())
    }

    // --- Running ---

    /// Re-prepares every node and source for new device settings. Returns
    /// the nodes that refused them.
    pub fn prepare(&self, sample_rate: f64, block_size: usize) -> Vec<NodeId> {
        self.transport().set_sample_rate(sample_rate);
        self.context.manager().sample_rate_changed(sample_rate, block_size);
        let failed = self.mixer.graph().prepare(sample_rate, block_size);
        if !failed.is_empty() {
            tracing::warn!("session: {} nodes refused {sample_rate} Hz / {block_size}", failed.len());
        }
        failed
    }

    /// Starts the transport.
    pub fn play(&self) {
        self.transport().play();
    }

    /// Stops the transport, ends any recording and silences held notes.
    pub fn stop(&self) {
        let transport = self.transport();
        transport.stop();
        if transport.is_recording() {
            transport.set_recording(false);
            let manager = self.context.manager();
            for source in self.armed_sources() {
                for r in [source.audio(), source.midi()].into_iter().flatten() {
                    manager.recording_finished(r);
                }
            }
        }
        self.seq.close_all_notes();
    }

    /// Arms the content of every record-armed source and starts recording.
    pub fn start_recording(&self) -> Result<()> {
        let manager = self.context.manager();
        let channels = usize::from(self.context.config().input_channels);
        for source in self.armed_sources() {
            if let Some(r) = source.audio() {
                manager.prepare_audio_record(r, channels)?;
            }
            if let Some(r) = source.midi() {
                manager.prepare_midi_record(r)?;
            }
        }
        self.transport().set_recording(true);
        self.play();
        Ok(())
    }

    fn armed_sources(&self) -> Vec<Arc<SeqSource>> {
        (0..self.seq.source_count())
            .filter_map(|i| self.seq.source(i))
            .filter(|s| s.is_record_armed())
            .collect()
    }

    /// Renders one block and advances the transport if it is playing.
    ///
    /// `audio` carries device input in and device output out.
    pub fn process_block(&self, audio: &mut AudioBuffer, midi: &mut MidiBuffer) {
        self.mixer.graph().process(audio, midi);
        let transport = self.transport();
        if transport.is_playing() {
            transport.next(audio.frames());
        }
    }

    /// Runs deferred teardown. Call from a non-real-time thread.
    pub fn maintenance(&self) -> DrainReport {
        let report = self.context.deferred().drain();
        if report.editors_closed + report.released > 0 {
            tracing::trace!(
                "session: drained {} editors, {} releases, {} retained",
                report.editors_closed,
                report.released,
                report.retained
            );
        }
        report
    }

    /// End of the last sequenced block, in seconds.
    pub fn end_seconds(&self) -> f64 {
        self.seq.end_seconds()
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("mixer", &self.mixer)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rondo_config::{EngineConfig, NoteConfig, PluginConfig};

    fn config() -> SessionConfig {
        let mut config = SessionConfig::new("test");
        config.engine = EngineConfig::default().with_block_size(64);
        config
    }

    #[test]
    fn test_empty_session() {
        let s = Session::new(SessionContext::new(EngineConfig::default()).unwrap()).unwrap();
        assert_eq!(s.mixer().track_count(), 1);
        assert_eq!(s.mixer().track_output_connections(0), vec![(0, 0), (1, 1)]);
        assert_eq!(s.end_seconds(), 0.0);
    }

    #[test]
    fn test_tracks_and_plugins_from_config() {
        let mut c = config();
        let mut track = TrackConfig::new("Lead").with_plugin(PluginConfig::new("gain"));
        track.pan = -0.5;
        c.tracks.push(track);
        let s = Session::from_config(&c).unwrap();

        assert_eq!(s.mixer().track_count(), 2);
        let state = s.mixer().track_state(1).unwrap();
        assert_eq!(state.name(), "Lead");
        assert_eq!(state.pan(), -0.5);
        assert_eq!(s.mixer().track_dock(1).unwrap().plugin_count(), 1);
    }

    #[test]
    fn test_unknown_plugin_fails() {
        let mut c = config();
        c.tracks
            .push(TrackConfig::new("Lead").with_plugin(PluginConfig::new("fuzz")));
        assert!(matches!(
            Session::from_config(&c),
            Err(EngineError::UnknownPlugin(ref k)) if k == "fuzz"
        ));
    }

    #[test]
    fn test_instrument_renders_notes() {
        let mut c = config();
        c.tracks.push(TrackConfig::new("Synth"));
        c.instruments.push(InstrumentConfig {
            kind: "sine".into(),
            midi: vec![NoteConfig {
                pitch: 69,
                velocity: 127,
                channel: 0,
                start: 0.0,
                end: 0.5,
            }],
            track: 0,
        });
        let s = Session::from_config(&c).unwrap();
        assert_eq!(s.seq().instrument_count(), 1);
        assert_eq!(s.seq().instr_output_to_track_connections(0).len(), 2);
        assert!((s.end_seconds() - 1.5).abs() < 1e-9);

        s.play();
        let mut audio = AudioBuffer::new(2, 64);
        let mut midi = MidiBuffer::new(64);
        let mut peak = 0.0f32;
        for _ in 0..8 {
            audio.clear();
            s.process_block(&mut audio, &mut midi);
            peak = peak.max(audio.peak());
        }
        assert!(peak > 0.0);
        assert_eq!(s.transport().position(), 8 * 64);
    }

    #[test]
    fn test_stopped_session_does_not_advance() {
        let s = Session::from_config(&config()).unwrap();
        let mut audio = AudioBuffer::new(2, 64);
        let mut midi = MidiBuffer::new(8);
        s.process_block(&mut audio, &mut midi);
        assert_eq!(s.transport().position(), 0);
        s.stop();
        assert!(s.maintenance().released > 0);
    }
}
