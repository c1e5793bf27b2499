//! Error type for source content operations.

use std::path::PathBuf;

use crate::container::SourceType;
use crate::manager::SourceRef;

/// Errors from loading, saving, cloning and addressing sources.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// WAV file read/write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No registered codec handles this file.
    #[error("No codec for file: {}", .0.display())]
    UnknownFormat(PathBuf),

    /// The encoder cannot write this bit depth.
    #[error("Unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),

    /// The operation needs content of a different type.
    #[error("Source type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        /// Type the operation needs.
        expected: SourceType,
        /// Type the source holds.
        found: SourceType,
    },

    /// The source is being recorded into.
    #[error("Source is recording")]
    Recording,

    /// No binding exists for this handle.
    #[error("Unknown source reference: {0}")]
    UnknownRef(SourceRef),

    /// The binding exists but holds no content yet.
    #[error("Source reference {0} has no content")]
    Unbound(SourceRef),

    /// The pool refused the name (it exists with another type).
    #[error("Source name conflict: {0}")]
    NameConflict(String),
}

/// Convenience result type for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;
