//! Handle-based access to pooled sources.
//!
//! Upstream code (sequencer tracks, recorders, editors) addresses content by
//! an opaque [`SourceRef`] instead of a pool name. The manager maps each
//! handle to the container it is currently bound to; rebinding or releasing a
//! handle hands the old container back to the pool's garbage collection.
//!
//! The `read_*`/`write_*` methods are the real-time entry points. They only
//! `try_read` the handle map and fail fast on contention, like the content
//! locks behind them.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rondo_core::{AudioBuffer, MidiBuffer};

use crate::codec::{EncodeOptions, FormatRegistry};
use crate::container::{SourceContainer, SourceContent, SourceType};
use crate::error::{Result, SourceError};
use crate::midi::{MidiSource, MidiTrack};
use crate::pool::SourcePool;

/// Opaque handle to a manager binding. Never reused within one manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceRef(u64);

impl SourceRef {
    /// Raw handle value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct Binding {
    kind: SourceType,
    container: Option<Arc<SourceContainer>>,
}

/// Maps [`SourceRef`] handles to pooled containers.
#[derive(Debug)]
pub struct SourceManager {
    pool: Arc<SourcePool>,
    formats: Arc<FormatRegistry>,
    bindings: RwLock<BTreeMap<SourceRef, Binding>>,
    next: AtomicU64,
    session_rate: AtomicU64,
    block_size: AtomicUsize,
}

impl SourceManager {
    /// Creates a manager over `pool`, decoding through `formats`.
    pub fn new(pool: Arc<SourcePool>, formats: Arc<FormatRegistry>) -> Self {
        Self {
            pool,
            formats,
            bindings: RwLock::new(BTreeMap::new()),
            next: AtomicU64::new(1),
            session_rate: AtomicU64::new(48000.0_f64.to_bits()),
            block_size: AtomicUsize::new(512),
        }
    }

    /// The pool this manager draws from.
    pub fn pool(&self) -> &Arc<SourcePool> {
        &self.pool
    }

    /// Session sample rate last passed to
    /// [`sample_rate_changed`](Self::sample_rate_changed).
    pub fn session_rate(&self) -> f64 {
        f64::from_bits(self.session_rate.load(Ordering::Acquire))
    }

    /// Session block size.
    pub fn block_size(&self) -> usize {
        self.block_size.load(Ordering::Acquire)
    }

    // --- Lifecycle ---

    /// Allocates a new, unbound handle of `kind`.
    pub fn apply_source(&self, kind: SourceType) -> SourceRef {
        let r = SourceRef(self.next.fetch_add(1, Ordering::Relaxed));
        self.bindings.write().insert(
            r,
            Binding {
                kind,
                container: None,
            },
        );
        r
    }

    /// Drops a handle. Returns `false` if it was unknown.
    pub fn release_source(&self, r: SourceRef) -> bool {
        let Some(binding) = self.bindings.write().remove(&r) else {
            return false;
        };
        if let Some(container) = binding.container {
            let name = container.name().to_string();
            drop(container);
            self.pool.check_source_released(&name);
        }
        true
    }

    fn bind(&self, r: SourceRef, container: Arc<SourceContainer>) -> Result<()> {
        let old = {
            let mut bindings = self.bindings.write();
            let binding = bindings.get_mut(&r).ok_or(SourceError::UnknownRef(r))?;
            if binding.kind != container.kind() {
                return Err(SourceError::TypeMismatch {
                    expected: binding.kind,
                    found: container.kind(),
                });
            }
            binding.container.replace(container)
        };
        if let Some(old) = old {
            let name = old.name().to_string();
            drop(old);
            self.pool.check_source_released(&name);
        }
        Ok(())
    }

    fn expect_kind(&self, r: SourceRef, kind: SourceType) -> Result<()> {
        match self.bindings.read().get(&r) {
            None => Err(SourceError::UnknownRef(r)),
            Some(b) if b.kind != kind => Err(SourceError::TypeMismatch {
                expected: kind,
                found: b.kind,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Creates a private container, handing it back to the pool on failure.
    fn create_bound(
        &self,
        r: SourceRef,
        name: &str,
        kind: SourceType,
        fill: impl FnOnce(&SourceContainer) -> Result<()>,
    ) -> Result<()> {
        self.expect_kind(r, kind)?;
        let container = self.pool.create(name, kind)?;
        if let Err(err) = fill(&container) {
            let name = container.name().to_string();
            drop(container);
            self.pool.check_source_released(&name);
            return Err(err);
        }
        container.mark_changed();
        self.bind(r, container)
    }

    // --- Binding ---

    /// Binds `r` to fresh silence of the given shape.
    pub fn init_audio(
        &self,
        r: SourceRef,
        name: &str,
        channels: usize,
        sample_rate: f64,
        length: f64,
    ) -> Result<()> {
        self.create_bound(r, name, SourceType::Audio, |c| {
            if let Some(audio) = c.audio() {
                audio.init(channels, sample_rate, length);
                audio.sample_rate_changed(self.session_rate(), self.block_size());
            }
            Ok(())
        })
    }

    /// Binds `r` to empty MIDI content.
    pub fn init_midi(&self, r: SourceRef, name: &str) -> Result<()> {
        self.create_bound(r, name, SourceType::Midi, |_| Ok(()))
    }

    /// Binds `r` to a private copy of `channels`.
    pub fn set_audio(
        &self,
        r: SourceRef,
        name: &str,
        sample_rate: f64,
        channels: Vec<Vec<f32>>,
    ) -> Result<()> {
        self.create_bound(r, name, SourceType::Audio, |c| match c.audio() {
            Some(audio) => {
                audio.set_data(sample_rate, channels)?;
                audio.sample_rate_changed(self.session_rate(), self.block_size());
                Ok(())
            }
            None => Ok(()),
        })
    }

    /// Binds `r` to a private copy of `tracks`.
    pub fn set_midi(&self, r: SourceRef, name: &str, tracks: Vec<MidiTrack>) -> Result<()> {
        self.create_bound(r, name, SourceType::Midi, |c| {
            if let Some(midi) = c.midi() {
                midi.set_tracks(tracks);
            }
            Ok(())
        })
    }

    /// Binds `r` to the pooled container for `path`, decoding it on first use.
    ///
    /// Handles loading the same path share one container.
    pub fn load_audio(&self, r: SourceRef, path: &Path) -> Result<()> {
        self.expect_kind(r, SourceType::Audio)?;
        let name = path.to_string_lossy();
        let container = self.pool.add(&name, SourceType::Audio)?;
        let loaded = container.load_once(path, |content| {
            if let SourceContent::Audio(audio) = content {
                audio.load(path, &self.formats)?;
                audio.sample_rate_changed(self.session_rate(), self.block_size());
            }
            Ok(())
        });
        match loaded {
            Ok(true) => tracing::debug!("source_manager: loaded {} into {r}", path.display()),
            Ok(false) => {}
            Err(err) => {
                drop(container);
                self.pool.check_source_released(&name);
                return Err(err);
            }
        }
        self.bind(r, container)
    }

    /// Encodes the audio bound to `r` and marks it saved.
    pub fn save_audio(&self, r: SourceRef, path: &Path, options: &EncodeOptions) -> Result<()> {
        let container = self.container_of(r, SourceType::Audio)?;
        if let Some(audio) = container.audio() {
            audio.save(path, &self.formats, options)?;
        }
        container.set_path(Some(path));
        container.mark_saved();
        Ok(())
    }

    // --- Queries ---

    fn container_of(&self, r: SourceRef, kind: SourceType) -> Result<Arc<SourceContainer>> {
        let bindings = self.bindings.read();
        let binding = bindings.get(&r).ok_or(SourceError::UnknownRef(r))?;
        if binding.kind != kind {
            return Err(SourceError::TypeMismatch {
                expected: kind,
                found: binding.kind,
            });
        }
        binding.container.clone().ok_or(SourceError::Unbound(r))
    }

    /// The container bound to `r`, if any.
    pub fn container(&self, r: SourceRef) -> Option<Arc<SourceContainer>> {
        self.bindings.read().get(&r)?.container.clone()
    }

    /// Kind of the handle.
    pub fn kind(&self, r: SourceRef) -> Option<SourceType> {
        self.bindings.read().get(&r).map(|b| b.kind)
    }

    /// Whether `r` is a `kind` handle bound to content.
    pub fn is_valid(&self, r: SourceRef, kind: SourceType) -> bool {
        self.bindings
            .read()
            .get(&r)
            .is_some_and(|b| b.kind == kind && b.container.is_some())
    }

    /// Snapshot of the bound audio content and its rate.
    pub fn get_audio(&self, r: SourceRef) -> Option<(f64, Vec<Vec<f32>>)> {
        let container = self.container_of(r, SourceType::Audio).ok()?;
        container.audio().map(|a| a.data())
    }

    /// Copy of one bound MIDI track.
    pub fn get_midi(&self, r: SourceRef, track: usize) -> Option<MidiTrack> {
        let container = self.container_of(r, SourceType::Midi).ok()?;
        container.midi().and_then(|m| m.track(track))
    }

    /// File associated with the bound content.
    pub fn file_name(&self, r: SourceRef) -> Option<PathBuf> {
        self.container(r)?.path()
    }

    /// Length of the bound content in seconds, 0 if unbound.
    pub fn length(&self, r: SourceRef) -> f64 {
        self.container(r).map_or(0.0, |c| c.length_seconds())
    }

    /// Native rate of the bound audio.
    pub fn audio_sample_rate(&self, r: SourceRef) -> Option<f64> {
        let container = self.container_of(r, SourceType::Audio).ok()?;
        container.audio().map(|a| a.source_sample_rate())
    }

    /// Number of tracks in the bound MIDI content.
    pub fn midi_track_count(&self, r: SourceRef) -> usize {
        self.container_of(r, SourceType::Midi)
            .ok()
            .and_then(|c| c.midi().map(MidiSource::track_count))
            .unwrap_or(0)
    }

    // --- Saved state ---

    /// Records an edit to the bound content.
    pub fn changed(&self, r: SourceRef) {
        if let Some(c) = self.container(r) {
            c.mark_changed();
        }
    }

    /// Records that the bound content was written out.
    pub fn saved(&self, r: SourceRef) {
        if let Some(c) = self.container(r) {
            c.mark_saved();
        }
    }

    /// Whether the bound content is unchanged since its last save. Unbound
    /// handles count as saved.
    pub fn is_saved(&self, r: SourceRef) -> bool {
        self.container(r).is_none_or(|c| c.is_saved())
    }

    // --- Real-time ---

    /// Reads bound audio into `dest`. See [`AudioSource::read_data`].
    ///
    /// [`AudioSource::read_data`]: crate::AudioSource::read_data
    pub fn read_audio_data(
        &self,
        r: SourceRef,
        dest: &mut AudioBuffer,
        dest_offset: f64,
        source_offset: f64,
        length: f64,
    ) -> usize {
        let Some(bindings) = self.bindings.try_read() else {
            return 0;
        };
        match bindings.get(&r).and_then(|b| b.container.as_ref()) {
            Some(c) => c
                .audio()
                .map_or(0, |a| a.read_data(dest, dest_offset, source_offset, length)),
            None => 0,
        }
    }

    /// Writes a recorded block into bound audio.
    pub fn write_audio_data(&self, r: SourceRef, src: &AudioBuffer, offset: f64) -> bool {
        let Some(bindings) = self.bindings.try_read() else {
            return false;
        };
        bindings
            .get(&r)
            .and_then(|b| b.container.as_ref())
            .and_then(|c| c.audio())
            .is_some_and(|a| a.write_data(src, offset))
    }

    /// Emits events of `track` in `[start, end)` seconds into `dest`, placed
    /// `dest_offset` seconds into the block at the session rate.
    pub fn read_midi_data(
        &self,
        r: SourceRef,
        dest: &mut MidiBuffer,
        dest_offset: f64,
        start: f64,
        end: f64,
        track: usize,
    ) -> usize {
        let Some(bindings) = self.bindings.try_read() else {
            return 0;
        };
        let rate = self.session_rate();
        bindings
            .get(&r)
            .and_then(|b| b.container.as_ref())
            .and_then(|c| c.midi())
            .map_or(0, |m| m.read_into(dest, dest_offset, start, end, track, rate))
    }

    /// Appends recorded MIDI at `offset` seconds.
    pub fn write_midi_data(&self, r: SourceRef, src: &MidiBuffer, offset: f64) -> bool {
        let Some(bindings) = self.bindings.try_read() else {
            return false;
        };
        let rate = self.session_rate();
        bindings
            .get(&r)
            .and_then(|b| b.container.as_ref())
            .and_then(|c| c.midi())
            .is_some_and(|m| m.write_events(src, offset, rate))
    }

    // --- Preparation ---

    /// Moves bound audio into the playing state at the session rate.
    pub fn prepare_audio_play(&self, r: SourceRef) {
        if let Ok(c) = self.container_of(r, SourceType::Audio)
            && let Some(audio) = c.audio()
        {
            audio.prepare_to_play(self.session_rate(), self.block_size());
        }
    }

    /// Arms bound audio for recording `channels` channels at the session rate.
    pub fn prepare_audio_record(&self, r: SourceRef, channels: usize) -> Result<()> {
        let c = self.container_of(r, SourceType::Audio)?;
        if let Some(audio) = c.audio() {
            audio.prepare_to_record(channels, self.session_rate(), self.block_size());
        }
        Ok(())
    }

    /// Starts a fresh MIDI take on the bound content.
    pub fn prepare_midi_record(&self, r: SourceRef) -> Result<()> {
        let c = self.container_of(r, SourceType::Midi)?;
        if let Some(midi) = c.midi() {
            midi.prepare_to_record();
        }
        Ok(())
    }

    /// Ends recording on the bound content and marks it changed.
    pub fn recording_finished(&self, r: SourceRef) {
        let Some(c) = self.container(r) else {
            return;
        };
        match c.content() {
            SourceContent::Audio(audio) => audio.recording_finished(),
            SourceContent::Midi(midi) => {
                midi.recording_finished();
            }
        }
        c.mark_changed();
    }

    /// Stops playback of bound audio.
    pub fn stop(&self, r: SourceRef) {
        if let Some(c) = self.container(r)
            && let Some(audio) = c.audio()
        {
            audio.stop();
        }
    }

    /// Records the session rate and re-targets every bound audio source.
    pub fn sample_rate_changed(&self, sample_rate: f64, block_size: usize) {
        self.session_rate
            .store(sample_rate.to_bits(), Ordering::Release);
        self.block_size.store(block_size, Ordering::Release);
        let bindings = self.bindings.read();
        for c in bindings.values().filter_map(|b| b.container.as_ref()) {
            if let Some(audio) = c.audio() {
                audio.sample_rate_changed(sample_rate, block_size);
            }
        }
        tracing::debug!(
            "source_manager: session rate {sample_rate} Hz, block {block_size}, {} handles",
            bindings.len()
        );
    }
}
