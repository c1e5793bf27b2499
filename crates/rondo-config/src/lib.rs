//! Configuration for the rondo audio engine.
//!
//! # Features
//!
//! - **Engine settings**: [`EngineConfig`] fixes sample rate, block size,
//!   channel counts and queue capacities for a session
//! - **Session files**: [`SessionConfig`] describes tracks, plugin chains and
//!   instruments in TOML, for offline rendering and playback
//! - **Paths**: platform-specific config directories
//!
//! # Example
//!
//! ```rust,no_run
//! use rondo_config::{SessionConfig, TrackConfig, user_config_dir};
//!
//! let mut session = SessionConfig::new("Demo");
//! session.tracks.push(TrackConfig::new("Drums").with_source("drums.wav"));
//! session.validate().unwrap();
//!
//! session.save(user_config_dir().join("demo.toml")).unwrap();
//! let loaded = SessionConfig::load(user_config_dir().join("demo.toml")).unwrap();
//! assert_eq!(loaded.tracks.len(), 1);
//! ```

mod engine;
mod error;
mod session;

/// Platform-specific configuration paths.
pub mod paths;

pub use engine::EngineConfig;
pub use error::{ConfigError, IoAction};
pub use paths::{ensure_user_config_dir, user_config_dir, user_sessions_dir};
pub use session::{InstrumentConfig, NoteConfig, PluginConfig, SessionConfig, TrackConfig};
