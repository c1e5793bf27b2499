//! Shared CLI helpers used across multiple commands.

use std::path::Path;

use anyhow::Context;
use rondo_config::SessionConfig;
use rondo_core::AudioBuffer;
use rondo_engine::Session;

/// Loads a session file, resolving relative source paths against the
/// file's directory.
pub fn load_session(path: &Path) -> anyhow::Result<Session> {
    let mut config = SessionConfig::load(path)?;
    if let Some(dir) = path.parent() {
        config.resolve_sources(dir);
    }
    Session::from_config(&config).with_context(|| format!("building session {}", path.display()))
}

/// A render buffer wide enough for both the device input and output.
pub fn render_buffer(session: &Session) -> AudioBuffer {
    let config = session.context().config();
    let channels = usize::from(config.input_channels.max(config.output_channels));
    AudioBuffer::new(channels, config.block_size)
}
