//! Error types for configuration operations.

use core::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// File system step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoAction {
    /// Reading a session or settings file.
    Read,
    /// Writing a session or settings file.
    Write,
    /// Creating a parent or config directory.
    CreateDir,
}

impl fmt::Display for IoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IoAction::Read => "read",
            IoAction::Write => "write",
            IoAction::CreateDir => "create directory",
        })
    }
}

/// Errors from loading, saving and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file system refused a read, write or mkdir.
    #[error("cannot {action} '{}': {source}", .path.display())]
    Io {
        /// What was being attempted.
        action: IoAction,
        /// File or directory involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid session description.
    #[error("malformed TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The value could not be written as TOML.
    #[error("cannot encode TOML: {0}")]
    Encode(#[from] toml::ser::Error),

    /// A setting is out of range or refers to something missing.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl ConfigError {
    /// A failed read of `path`.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::io(IoAction::Read, path, source)
    }

    /// A failed write of `path`.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::io(IoAction::Write, path, source)
    }

    /// A failed directory creation.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::io(IoAction::CreateDir, path, source)
    }

    fn io(action: IoAction, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// A validation failure with a human-readable reason.
    pub fn invalid(reason: impl Into<String>) -> Self {
        ConfigError::Validation(reason.into())
    }

    /// The failed file system step, if this is an I/O error.
    pub fn io_action(&self) -> Option<IoAction> {
        match self {
            ConfigError::Io { action, .. } => Some(*action),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::path::Path;

    fn denied() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied")
    }

    #[test]
    fn io_helpers_tag_the_action() {
        assert_eq!(
            ConfigError::read_file("/s/a.toml", denied()).io_action(),
            Some(IoAction::Read)
        );
        assert_eq!(
            ConfigError::write_file("/s/a.toml", denied()).io_action(),
            Some(IoAction::Write)
        );
        let err = ConfigError::create_dir("/s", denied());
        assert!(matches!(
            err,
            ConfigError::Io { action: IoAction::CreateDir, ref path, .. } if path == Path::new("/s")
        ));
        assert_eq!(ConfigError::invalid("x").io_action(), None);
    }

    #[test]
    fn display_names_action_and_path() {
        let msg = ConfigError::create_dir("/s/sessions", denied()).to_string();
        assert_eq!(msg, "cannot create directory '/s/sessions': denied");
        assert_eq!(
            ConfigError::invalid("block_size must be positive").to_string(),
            "invalid configuration: block_size must be positive"
        );
    }

    #[test]
    fn only_io_carries_a_source() {
        assert!(ConfigError::write_file("/x", denied()).source().is_some());
        assert!(ConfigError::invalid("r").source().is_none());
    }
}
