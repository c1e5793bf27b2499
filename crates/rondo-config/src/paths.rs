//! Platform-specific paths for configuration and session files.
//!
//! - **User config**: `~/.config/rondo/` (Linux), `~/Library/Application Support/rondo/` (macOS), `%APPDATA%\rondo\` (Windows)
//! - **User sessions**: `sessions/` under the config directory

use std::path::PathBuf;

use crate::error::ConfigError;

/// Application name used for directory paths.
const APP_NAME: &str = "rondo";

/// Subdirectory name for sessions.
const SESSIONS_SUBDIR: &str = "sessions";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the user-specific sessions directory.
pub fn user_sessions_dir() -> PathBuf {
    user_config_dir().join(SESSIONS_SUBDIR)
}

/// Creates the user config directory if missing and returns it.
pub fn ensure_user_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = user_config_dir();
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::create_dir(&dir, e))?;
        tracing::debug!("created config directory {}", dir.display());
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_end_with_app_name() {
        assert!(user_config_dir().ends_with("rondo"));
        assert!(user_sessions_dir().ends_with("rondo/sessions"));
    }
}
