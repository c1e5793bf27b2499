//! Named, type-tagged holders of source content.

use core::sync::atomic::{AtomicU64, Ordering};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::audio::AudioSource;
use crate::error::{Result, SourceError};
use crate::midi::MidiSource;

/// Kind of content a container holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Sampled audio.
    Audio,
    /// MIDI tracks.
    Midi,
}

impl core::fmt::Display for SourceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Midi => f.write_str("midi"),
        }
    }
}

/// Content of a container.
#[derive(Debug)]
pub enum SourceContent {
    /// Sampled audio.
    Audio(AudioSource),
    /// MIDI tracks.
    Midi(MidiSource),
}

impl SourceContent {
    /// Empty content of `kind`.
    pub fn empty(kind: SourceType) -> Self {
        match kind {
            SourceType::Audio => Self::Audio(AudioSource::new()),
            SourceType::Midi => Self::Midi(MidiSource::new()),
        }
    }

    /// The content's kind.
    pub fn kind(&self) -> SourceType {
        match self {
            Self::Audio(_) => SourceType::Audio,
            Self::Midi(_) => SourceType::Midi,
        }
    }

    fn duplicate(&self) -> Self {
        match self {
            Self::Audio(a) => Self::Audio(a.duplicate()),
            Self::Midi(m) => Self::Midi(m.duplicate()),
        }
    }
}

/// A named holder of audio or MIDI content, shared by `Arc`.
///
/// The content itself is interior-mutable, so every holder of the `Arc`
/// sees edits. Use [`duplicate_as`](Self::duplicate_as) (or the pool's
/// `fork`) to obtain an independent copy.
#[derive(Debug)]
pub struct SourceContainer {
    name: String,
    content: SourceContent,
    changed: AtomicU64,
    saved: AtomicU64,
    path: RwLock<Option<PathBuf>>,
}

impl SourceContainer {
    /// Creates an empty container.
    pub fn new(name: impl Into<String>, kind: SourceType) -> Self {
        Self::with_content(name, SourceContent::empty(kind))
    }

    /// Creates a container around existing content.
    pub fn with_content(name: impl Into<String>, content: SourceContent) -> Self {
        Self {
            name: name.into(),
            content,
            changed: AtomicU64::new(0),
            saved: AtomicU64::new(0),
            path: RwLock::new(None),
        }
    }

    /// Pool identity.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind of content.
    pub fn kind(&self) -> SourceType {
        self.content.kind()
    }

    /// The content.
    pub fn content(&self) -> &SourceContent {
        &self.content
    }

    /// Audio content, if this is an audio container.
    pub fn audio(&self) -> Option<&AudioSource> {
        match &self.content {
            SourceContent::Audio(a) => Some(a),
            SourceContent::Midi(_) => None,
        }
    }

    /// MIDI content, if this is a MIDI container.
    pub fn midi(&self) -> Option<&MidiSource> {
        match &self.content {
            SourceContent::Midi(m) => Some(m),
            SourceContent::Audio(_) => None,
        }
    }

    /// Independent copy under a new name. The file path is kept, the saved
    /// state is not.
    pub fn duplicate_as(&self, name: impl Into<String>) -> SourceContainer {
        let copy = Self::with_content(name, self.content.duplicate());
        *copy.path.write() = self.path();
        copy.mark_changed();
        copy
    }

    /// Deep-copies `other`'s content into this container.
    ///
    /// Fails on a type mismatch, or if this container's audio is recording.
    pub fn clone_from(&self, other: &SourceContainer) -> Result<()> {
        match (&self.content, &other.content) {
            (SourceContent::Audio(dst), SourceContent::Audio(src)) => dst.clone_from(src)?,
            (SourceContent::Midi(dst), SourceContent::Midi(src)) => dst.clone_from(src),
            _ => {
                return Err(SourceError::TypeMismatch {
                    expected: self.kind(),
                    found: other.kind(),
                });
            }
        }
        self.mark_changed();
        Ok(())
    }

    /// Records an edit.
    pub fn mark_changed(&self) {
        self.changed.fetch_add(1, Ordering::AcqRel);
    }

    /// Records that the current content was written out.
    pub fn mark_saved(&self) {
        self.saved
            .store(self.changed.load(Ordering::Acquire), Ordering::Release);
    }

    /// Whether the content matches what was last saved.
    pub fn is_saved(&self) -> bool {
        self.saved.load(Ordering::Acquire) == self.changed.load(Ordering::Acquire)
    }

    /// File the content was loaded from or saved to.
    pub fn path(&self) -> Option<PathBuf> {
        self.path.read().clone()
    }

    /// Sets the associated file.
    pub fn set_path(&self, path: Option<&Path>) {
        *self.path.write() = path.map(Path::to_path_buf);
    }

    /// Fills the content from `path` with `load` unless a file is already
    /// associated. Returns whether `load` ran.
    ///
    /// The path lock is held throughout, so concurrent callers wait for the
    /// first and then skip. On error no path is recorded.
    pub fn load_once(
        &self,
        path: &Path,
        load: impl FnOnce(&SourceContent) -> Result<()>,
    ) -> Result<bool> {
        let mut slot = self.path.write();
        if slot.is_some() {
            return Ok(false);
        }
        load(&self.content)?;
        *slot = Some(path.to_path_buf());
        self.mark_saved();
        Ok(true)
    }

    /// Content length in seconds.
    pub fn length_seconds(&self) -> f64 {
        match &self.content {
            SourceContent::Audio(a) => a.length_seconds(),
            SourceContent::Midi(m) => m.length_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_is_independent() {
        let a = SourceContainer::with_content(
            "take",
            SourceContent::Audio(AudioSource::from_channels(10.0, vec![vec![1.0; 4]])),
        );
        let b = a.duplicate_as("take (1)");
        b.audio().unwrap().set_data(10.0, vec![vec![2.0; 2]]).unwrap();
        assert_eq!(a.audio().unwrap().data().1, vec![vec![1.0; 4]]);
        assert_eq!(b.name(), "take (1)");
        assert!(!b.is_saved());
    }

    #[test]
    fn test_load_once_runs_a_single_loader() {
        use std::sync::Arc;
        use std::sync::atomic::AtomicUsize;
        use std::thread;

        let container = Arc::new(SourceContainer::new("kick.wav", SourceType::Audio));
        let loads = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let container = Arc::clone(&container);
                let loads = Arc::clone(&loads);
                thread::spawn(move || {
                    container
                        .load_once(Path::new("kick.wav"), |_| {
                            loads.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(5));
                            Ok(())
                        })
                        .unwrap()
                })
            })
            .collect();
        let ran = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&ran| ran)
            .count();
        assert_eq!(ran, 1);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(container.path().as_deref(), Some(Path::new("kick.wav")));
    }

    #[test]
    fn test_failed_load_records_no_path() {
        let container = SourceContainer::new("gone.wav", SourceType::Audio);
        let err = container
            .load_once(Path::new("gone.wav"), |_| {
                Err(SourceError::UnknownFormat(PathBuf::from("gone.wav")))
            })
            .unwrap_err();
        assert!(matches!(err, SourceError::UnknownFormat(_)));
        assert!(container.path().is_none());
    }

    #[test]
    fn test_clone_from_rejects_other_type() {
        let a = SourceContainer::new("a", SourceType::Audio);
        let m = SourceContainer::new("m", SourceType::Midi);
        let err = a.clone_from(&m).unwrap_err();
        assert!(matches!(
            err,
            SourceError::TypeMismatch {
                expected: SourceType::Audio,
                found: SourceType::Midi
            }
        ));
    }

    #[test]
    fn test_saved_tracking() {
        let c = SourceContainer::new("a", SourceType::Midi);
        assert!(c.is_saved());
        c.mark_changed();
        assert!(!c.is_saved());
        c.mark_saved();
        assert!(c.is_saved());
        c.set_path(Some(Path::new("/tmp/a.mid")));
        assert_eq!(c.path(), Some(PathBuf::from("/tmp/a.mid")));
    }
}
