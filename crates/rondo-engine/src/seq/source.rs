//! Sequencer sources: timeline blocks that play pooled content.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rondo_core::{
    AudioBuffer, AudioProcessor, BusLayout, ChannelSet, MidiBuffer, MidiMessage, ProcessorError,
    Transport,
};
use rondo_source::{SourceManager, SourceRef};

/// One placement of a source's content on the timeline, in seconds.
///
/// The block sounds from `start` to `end`; `offset` is where in the content
/// playback begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeqBlock {
    /// Timeline start.
    pub start: f64,
    /// Timeline end.
    pub end: f64,
    /// Content position at `start`.
    pub offset: f64,
}

impl SeqBlock {
    /// A block at `start` lasting `length` seconds, playing from the top.
    pub fn new(start: f64, length: f64) -> Self {
        Self {
            start,
            end: start + length.max(0.0),
            offset: 0.0,
        }
    }

    /// Sets the content offset.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Length in seconds.
    pub fn length(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Control-side state of a sequencer source.
///
/// Shared between the editor and the source's graph node. The node reads
/// everything here with `try_*` locks and renders silence on contention.
#[derive(Debug, Default)]
pub struct SeqSource {
    audio: RwLock<Option<SourceRef>>,
    midi: RwLock<Option<SourceRef>>,
    midi_track: AtomicUsize,
    blocks: RwLock<Vec<SeqBlock>>,
    close_notes: AtomicBool,
    armed: AtomicBool,
}

impl SeqSource {
    /// An unbound source with no blocks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Audio content played by this source.
    pub fn audio(&self) -> Option<SourceRef> {
        *self.audio.read()
    }

    /// Binds audio content, or unbinds with `None`.
    pub fn set_audio(&self, source: Option<SourceRef>) {
        *self.audio.write() = source;
    }

    /// MIDI content played by this source.
    pub fn midi(&self) -> Option<SourceRef> {
        *self.midi.read()
    }

    /// Binds MIDI content, or unbinds with `None`.
    pub fn set_midi(&self, source: Option<SourceRef>) {
        *self.midi.write() = source;
    }

    /// Track of the MIDI content that is played.
    pub fn midi_track(&self) -> usize {
        self.midi_track.load(Ordering::Relaxed)
    }

    /// Selects the MIDI track to play.
    pub fn set_midi_track(&self, track: usize) {
        self.midi_track.store(track, Ordering::Relaxed);
    }

    // --- Blocks ---

    /// Adds a block, keeping the list sorted by start time. Returns its index.
    pub fn add_block(&self, block: SeqBlock) -> usize {
        let mut blocks = self.blocks.write();
        let index = blocks.partition_point(|b| b.start <= block.start);
        blocks.insert(index, block);
        index
    }

    /// Removes the block at `index`.
    pub fn remove_block(&self, index: usize) -> Option<SeqBlock> {
        let mut blocks = self.blocks.write();
        (index < blocks.len()).then(|| blocks.remove(index))
    }

    /// Removes every block.
    pub fn clear_blocks(&self) {
        self.blocks.write().clear();
    }

    /// Snapshot of the blocks in start order.
    pub fn blocks(&self) -> Vec<SeqBlock> {
        self.blocks.read().clone()
    }

    /// Number of blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    /// End of the last block, 0 without blocks.
    pub fn end_seconds(&self) -> f64 {
        self.blocks.read().iter().map(|b| b.end).fold(0.0, f64::max)
    }

    // --- Control ---

    /// Makes the node emit all-notes-off on every channel at its next block.
    pub fn close_all_notes(&self) {
        self.close_notes.store(true, Ordering::Release);
    }

    /// Whether a note-off sweep is queued for the next block.
    pub fn close_notes_pending(&self) -> bool {
        self.close_notes.load(Ordering::Acquire)
    }

    /// Arms the source: while the transport records, its node writes
    /// incoming audio and MIDI into the bound content.
    pub fn set_record_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::Release);
    }

    /// Whether the source records while the transport does.
    pub fn is_record_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

/// Graph node of a [`SeqSource`].
pub(crate) struct SeqSourceProcessor {
    source: Arc<SeqSource>,
    manager: Arc<SourceManager>,
    transport: Arc<Transport>,
    set: ChannelSet,
    sample_rate: f64,
}

impl SeqSourceProcessor {
    pub(crate) fn new(
        source: Arc<SeqSource>,
        manager: Arc<SourceManager>,
        transport: Arc<Transport>,
        set: ChannelSet,
    ) -> Self {
        Self {
            source,
            manager,
            transport,
            set,
            sample_rate: 48000.0,
        }
    }

    fn record(&self, audio: &AudioBuffer, midi: &MidiBuffer, at: f64) {
        if let Some(r) = self.source.audio.try_read().and_then(|g| *g) {
            self.manager.write_audio_data(r, audio, at);
        }
        if let Some(r) = self.source.midi.try_read().and_then(|g| *g)
            && !midi.is_empty()
        {
            self.manager.write_midi_data(r, midi, at);
        }
    }
}

impl AudioProcessor for SeqSourceProcessor {
    fn name(&self) -> &str {
        "Source"
    }

    fn layout(&self) -> BusLayout {
        BusLayout::symmetric(self.set)
    }

    fn accepts_midi(&self) -> bool {
        true
    }

    fn produces_midi(&self) -> bool {
        true
    }

    fn prepare(&mut self, sample_rate: f64, _block_size: usize) -> Result<(), ProcessorError> {
        if sample_rate <= 0.0 {
            return Err(ProcessorError::UnsupportedSampleRate(sample_rate));
        }
        self.sample_rate = sample_rate;
        Ok(())
    }

    fn process(&mut self, audio: &mut AudioBuffer, midi: &mut MidiBuffer) {
        let playing = self.transport.is_playing();
        let t0 = self.transport.position_seconds();

        if playing && self.transport.is_recording() && self.source.is_record_armed() {
            self.record(audio, midi, t0);
        }

        audio.clear();
        midi.clear();

        if self.source.close_notes.swap(false, Ordering::AcqRel) {
            for channel in 0..16 {
                midi.add(0, MidiMessage::all_notes_off(channel));
            }
        }
        if !playing {
            return;
        }

        let t1 = t0 + audio.frames() as f64 / self.sample_rate;
        let Some(blocks) = self.source.blocks.try_read() else {
            return;
        };
        let audio_ref = self.source.audio.try_read().and_then(|g| *g);
        let midi_ref = self.source.midi.try_read().and_then(|g| *g);
        let track = self.source.midi_track();

        for block in blocks.iter() {
            let start = block.start.max(t0);
            let end = block.end.min(t1);
            if end <= start {
                continue;
            }
            let from = start - block.start + block.offset;
            if let Some(r) = audio_ref {
                self.manager
                    .read_audio_data(r, audio, start - t0, from, end - start);
            }
            if let Some(r) = midi_ref {
                self.manager
                    .read_midi_data(r, midi, start - t0, from, from + (end - start), track);
            }
        }
    }
}
