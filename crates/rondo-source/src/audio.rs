//! Audio source content shared between playback and recording.
//!
//! An [`AudioSource`] keeps its sample matrix behind a read/write lock. The
//! real-time paths ([`read_data`](AudioSource::read_data) and
//! [`write_data`](AudioSource::write_data)) only ever *try* the lock: a
//! contended read renders nothing and a contended write drops the block.
//! That bounded loss is preferred over stalling the audio callback. Every
//! other operation runs on control threads and blocks normally.
//!
//! Because a writer holds the lock exclusively for the whole block it copies,
//! a reader sees either all or none of that block, never a partly written
//! frame.

use core::sync::atomic::{AtomicU8, Ordering};
use std::path::Path;

use parking_lot::RwLock;
use rondo_core::AudioBuffer;

use crate::codec::{EncodeOptions, FormatRegistry};
use crate::error::{Result, SourceError};
use crate::resample::Resampler;

/// Playback/recording state of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Not in use by the render thread.
    Idle,
    /// Being read for playback.
    Playing,
    /// Being written by a recorder. Clone and load are refused.
    Recording,
}

impl SourceState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Playing,
            2 => Self::Recording,
            _ => Self::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Playing => 1,
            Self::Recording => 2,
        }
    }
}

#[derive(Debug, Clone)]
struct AudioData {
    channels: Vec<Vec<f32>>,
    source_rate: f64,
    session_rate: f64,
    block_size: usize,
    resampler: Resampler,
}

impl AudioData {
    fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    fn rebuild_resampler(&mut self) {
        self.resampler = Resampler::new(self.source_rate, self.session_rate);
    }
}

/// Recorded, loaded or synthesized audio content.
#[derive(Debug)]
pub struct AudioSource {
    data: RwLock<AudioData>,
    state: AtomicU8,
}

impl AudioSource {
    /// Creates an empty source at 48 kHz.
    pub fn new() -> Self {
        Self::from_channels(48000.0, Vec::new())
    }

    /// Creates a source from per-channel sample vectors at `sample_rate`.
    ///
    /// The session rate starts equal to the source rate; call
    /// [`prepare_to_play`](Self::prepare_to_play) to adapt it.
    pub fn from_channels(sample_rate: f64, mut channels: Vec<Vec<f32>>) -> Self {
        equalize(&mut channels);
        Self {
            data: RwLock::new(AudioData {
                channels,
                source_rate: sample_rate,
                session_rate: sample_rate,
                block_size: 0,
                resampler: Resampler::default(),
            }),
            state: AtomicU8::new(SourceState::Idle.as_u8()),
        }
    }

    // --- State ---

    /// Current state.
    pub fn state(&self) -> SourceState {
        SourceState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True while a recorder owns the source.
    pub fn is_recording(&self) -> bool {
        self.state() == SourceState::Recording
    }

    fn set_state(&self, state: SourceState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Configures playback at the session rate and enters `Playing`.
    ///
    /// A recording source stays `Recording`.
    pub fn prepare_to_play(&self, session_rate: f64, block_size: usize) {
        self.sample_rate_changed(session_rate, block_size);
        let _ = self.state.compare_exchange(
            SourceState::Idle.as_u8(),
            SourceState::Playing.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Leaves `Playing`. Has no effect while recording.
    pub fn stop(&self) {
        let _ = self.state.compare_exchange(
            SourceState::Playing.as_u8(),
            SourceState::Idle.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Recomputes the resampling ratio for a new session rate.
    ///
    /// Takes the lock exclusively, so it waits out any in-flight read or write.
    pub fn sample_rate_changed(&self, session_rate: f64, block_size: usize) {
        let mut data = self.data.write();
        data.session_rate = session_rate;
        data.block_size = block_size;
        data.rebuild_resampler();
    }

    /// Reshapes the source for recording `channels` channels at `sample_rate`
    /// and enters `Recording`.
    ///
    /// Existing content recorded at a different rate is discarded.
    pub fn prepare_to_record(&self, channels: usize, sample_rate: f64, block_size: usize) {
        let mut data = self.data.write();
        if data.source_rate != sample_rate {
            data.channels.clear();
            data.source_rate = sample_rate;
        }
        let frames = data.frames();
        data.channels.resize_with(channels, || vec![0.0; frames]);
        data.session_rate = sample_rate;
        data.block_size = block_size;
        data.rebuild_resampler();
        drop(data);
        self.set_state(SourceState::Recording);
        tracing::debug!("audio_source: recording {channels} ch @ {sample_rate} Hz");
    }

    /// Ends recording and returns to `Idle`.
    pub fn recording_finished(&self) {
        if self.is_recording() {
            self.set_state(SourceState::Idle);
        }
    }

    // --- Real-time access ---

    /// Copies a time window of content into `dest`, resampled to the session
    /// rate. Returns the number of frames written.
    ///
    /// Writing starts at frame `floor(dest_offset * session_rate)` and covers
    /// `ceil(length * session_rate)` frames, clamped to the end of `dest`.
    /// Reading starts at source frame `floor(source_offset * source_rate)`.
    /// Content past the end reads as silence.
    ///
    /// Non-blocking: returns 0 without touching `dest` if a writer holds the
    /// lock.
    pub fn read_data(
        &self,
        dest: &mut AudioBuffer,
        dest_offset: f64,
        source_offset: f64,
        length: f64,
    ) -> usize {
        if dest.frames() == 0 || length <= 0.0 {
            return 0;
        }
        let Some(data) = self.data.try_read() else {
            tracing::trace!("audio_source: read contended, block skipped");
            return 0;
        };
        let start = (dest_offset * data.session_rate).floor().max(0.0) as usize;
        if start >= dest.frames() {
            return 0;
        }
        let wanted = (length * data.session_rate).ceil() as usize;
        let count = (dest.frames() - start).min(wanted);
        let source_pos = (source_offset * data.source_rate).floor();
        data.resampler
            .render(&data.channels, source_pos, dest, start, count);
        count
    }

    /// Writes `src` at `offset` seconds (session rate), growing the content as
    /// needed. Returns `false` if the block was dropped on contention.
    ///
    /// A negative offset drops the head of `src`. Channels beyond the source's
    /// channel count are ignored.
    pub fn write_data(&self, src: &AudioBuffer, offset: f64) -> bool {
        let Some(mut data) = self.data.try_write() else {
            tracing::trace!("audio_source: write contended, block dropped");
            return false;
        };
        let mut start = (offset * data.session_rate).floor() as i64;
        let mut src_start = 0usize;
        let mut len = src.frames();
        if start < 0 {
            let skip = start.unsigned_abs() as usize;
            if skip >= len {
                return true;
            }
            src_start = skip;
            len -= skip;
            start = 0;
        }
        let start = start as usize;

        let needed = start + len;
        if needed > data.frames() {
            for ch in &mut data.channels {
                ch.resize(needed, 0.0);
            }
        }
        for (ch, dst) in data.channels.iter_mut().enumerate() {
            if let Some(input) = src.get(ch) {
                dst[start..start + len].copy_from_slice(&input[src_start..src_start + len]);
            }
        }
        true
    }

    // --- Content ---

    /// Replaces the content with `channels` channels of silence.
    pub fn init(&self, channels: usize, sample_rate: f64, length: f64) {
        let frames = (length.max(0.0) * sample_rate).ceil() as usize;
        let mut data = self.data.write();
        data.channels = vec![vec![0.0; frames]; channels];
        data.source_rate = sample_rate;
        data.rebuild_resampler();
    }

    /// Replaces the content. Refused while recording.
    pub fn set_data(&self, sample_rate: f64, mut channels: Vec<Vec<f32>>) -> Result<()> {
        if self.is_recording() {
            return Err(SourceError::Recording);
        }
        equalize(&mut channels);
        let mut data = self.data.write();
        data.channels = channels;
        data.source_rate = sample_rate;
        data.rebuild_resampler();
        Ok(())
    }

    /// Copy of the content and its rate.
    pub fn data(&self) -> (f64, Vec<Vec<f32>>) {
        let data = self.data.read();
        (data.source_rate, data.channels.clone())
    }

    /// Deep-copies another source's content and rate into this one.
    ///
    /// Refused while this source is recording; the content is then untouched.
    pub fn clone_from(&self, other: &AudioSource) -> Result<()> {
        if self.is_recording() {
            return Err(SourceError::Recording);
        }
        if core::ptr::eq(self, other) {
            return Ok(());
        }
        let (rate, channels) = other.data();
        let mut data = self.data.write();
        data.channels = channels;
        data.source_rate = rate;
        data.rebuild_resampler();
        Ok(())
    }

    /// Independent copy with the same content, rates and a fresh `Idle` state.
    pub fn duplicate(&self) -> AudioSource {
        let data = self.data.read().clone();
        AudioSource {
            data: RwLock::new(data),
            state: AtomicU8::new(SourceState::Idle.as_u8()),
        }
    }

    /// Replaces the content with a decoded file. Refused while recording.
    pub fn load(&self, path: &Path, formats: &FormatRegistry) -> Result<()> {
        if self.is_recording() {
            return Err(SourceError::Recording);
        }
        let decoded = match formats.decode(path) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::warn!("audio_source: failed to load {}: {err}", path.display());
                return Err(err);
            }
        };
        self.set_data(decoded.sample_rate, decoded.channels)
    }

    /// Encodes the content at its source rate.
    pub fn save(&self, path: &Path, formats: &FormatRegistry, options: &EncodeOptions) -> Result<()> {
        let (rate, channels) = self.data();
        formats
            .encode(path, rate, &channels, options)
            .inspect_err(|err| {
                tracing::warn!("audio_source: failed to save {}: {err}", path.display());
            })
    }

    // --- Queries ---

    /// Content length in seconds at the source rate.
    pub fn length_seconds(&self) -> f64 {
        let data = self.data.read();
        if data.source_rate > 0.0 {
            data.frames() as f64 / data.source_rate
        } else {
            0.0
        }
    }

    /// Content length in source frames.
    pub fn frames(&self) -> usize {
        self.data.read().frames()
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.data.read().channels.len()
    }

    /// Native rate of the content.
    pub fn source_sample_rate(&self) -> f64 {
        self.data.read().source_rate
    }

    /// Rate reads are resampled to.
    pub fn session_sample_rate(&self) -> f64 {
        self.data.read().session_rate
    }

    /// Block size from the last prepare call.
    pub fn block_size(&self) -> usize {
        self.data.read().block_size
    }
}

impl Default for AudioSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads channels to a common length.
fn equalize(channels: &mut [Vec<f32>]) {
    let len = channels.iter().map(Vec::len).max().unwrap_or(0);
    for ch in channels {
        ch.resize(len, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_read_copies_window() {
        let src = AudioSource::from_channels(10.0, vec![ramp(20)]);
        let mut dest = AudioBuffer::new(1, 8);
        let n = src.read_data(&mut dest, 0.2, 0.5, 0.4);
        assert_eq!(n, 4);
        assert_eq!(dest.channel(0), &[0.0, 0.0, 5.0, 6.0, 7.0, 8.0, 0.0, 0.0]);
    }

    #[test]
    fn test_read_clamps_to_dest() {
        let src = AudioSource::from_channels(10.0, vec![ramp(20)]);
        let mut dest = AudioBuffer::new(1, 4);
        assert_eq!(src.read_data(&mut dest, 0.1, 0.0, 10.0), 3);
        assert_eq!(src.read_data(&mut dest, 1.0, 0.0, 1.0), 0);
        assert_eq!(src.read_data(&mut dest, 0.0, 0.0, 0.0), 0);
    }

    #[test]
    fn test_read_misses_while_write_locked() {
        let src = AudioSource::from_channels(10.0, vec![vec![1.0; 10]]);
        let mut dest = AudioBuffer::new(1, 4);
        let guard = src.data.write();
        assert_eq!(src.read_data(&mut dest, 0.0, 0.0, 0.4), 0);
        assert_eq!(dest.peak(), 0.0);
        drop(guard);
        assert_eq!(src.read_data(&mut dest, 0.0, 0.0, 0.4), 4);
    }

    #[test]
    fn test_write_grows_and_trims_head() {
        let src = AudioSource::new();
        src.prepare_to_record(1, 10.0, 4);
        let block = AudioBuffer::from_channels(vec![vec![1.0, 2.0, 3.0, 4.0]]);
        assert!(src.write_data(&block, 0.2));
        assert_eq!(src.frames(), 6);
        assert!(src.write_data(&block, -0.2));
        let (_, data) = src.data();
        assert_eq!(data[0], vec![3.0, 4.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_write_ignores_extra_channels() {
        let src = AudioSource::new();
        src.prepare_to_record(1, 10.0, 4);
        let block = AudioBuffer::from_channels(vec![vec![1.0; 2], vec![9.0; 2]]);
        assert!(src.write_data(&block, 0.0));
        assert_eq!(src.channel_count(), 1);
    }

    #[test]
    fn test_write_dropped_while_read_locked() {
        let src = AudioSource::from_channels(10.0, vec![vec![0.0; 4]]);
        let guard = src.data.read();
        assert!(!src.write_data(&AudioBuffer::new(1, 2), 0.0));
        drop(guard);
    }

    #[test]
    fn test_clone_refused_while_recording() {
        let target = AudioSource::from_channels(10.0, vec![vec![0.5; 4]]);
        target.prepare_to_record(1, 10.0, 4);
        let other = AudioSource::from_channels(20.0, vec![vec![1.0; 8]]);
        assert!(matches!(target.clone_from(&other), Err(SourceError::Recording)));
        assert_eq!(target.data(), (10.0, vec![vec![0.5; 4]]));

        target.recording_finished();
        target.clone_from(&other).unwrap();
        assert_eq!(target.source_sample_rate(), 20.0);
        assert_eq!(target.frames(), 8);
    }

    #[test]
    fn test_prepare_to_record_clears_on_rate_change() {
        let src = AudioSource::from_channels(44100.0, vec![vec![1.0; 10]]);
        src.prepare_to_record(2, 48000.0, 64);
        assert_eq!(src.frames(), 0);
        assert_eq!(src.channel_count(), 2);
        assert_eq!(src.state(), SourceState::Recording);

        let same = AudioSource::from_channels(48000.0, vec![vec![1.0; 10]]);
        same.prepare_to_record(2, 48000.0, 64);
        assert_eq!(same.frames(), 10);
    }

    #[test]
    fn test_state_transitions() {
        let src = AudioSource::new();
        assert_eq!(src.state(), SourceState::Idle);
        src.prepare_to_play(48000.0, 128);
        assert_eq!(src.state(), SourceState::Playing);
        src.stop();
        assert_eq!(src.state(), SourceState::Idle);
        src.prepare_to_record(1, 48000.0, 128);
        src.prepare_to_play(48000.0, 128);
        src.stop();
        assert!(src.is_recording());
    }

    #[test]
    fn test_duplicate_is_independent() {
        let src = AudioSource::from_channels(10.0, vec![vec![1.0; 4]]);
        let copy = src.duplicate();
        src.set_data(10.0, vec![vec![0.0; 2]]).unwrap();
        assert_eq!(copy.frames(), 4);
    }

    #[test]
    fn test_init_allocates_silence() {
        let src = AudioSource::new();
        src.init(2, 100.0, 0.5);
        assert_eq!(src.channel_count(), 2);
        assert_eq!(src.frames(), 50);
        assert!((src.length_seconds() - 0.5).abs() < 1e-9);
    }
}
