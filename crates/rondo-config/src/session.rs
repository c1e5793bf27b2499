//! Session file format.
//!
//! A session names the tracks of a mixer, the plugin chain on each track,
//! the audio file each track plays and any sine instruments driven by an
//! inline note list.
//!
//! ```toml
//! name = "Demo"
//!
//! [engine]
//! sample_rate = 48000
//!
//! [[tracks]]
//! name = "Drums"
//! gain_db = -3.0
//! pan = -0.25
//! source = "drums.wav"
//! start = 0.5
//!
//! [[tracks.plugins]]
//! kind = "gain"
//! gain_db = -6.0
//!
//! [[instruments]]
//! kind = "sine"
//! track = 0
//! midi = [{ pitch = 69, start = 0.0, end = 1.0 }]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::EngineConfig;
use crate::error::ConfigError;

/// A complete offline session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session name.
    pub name: String,

    /// Engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Mixer tracks, in order. The master bus is implicit.
    #[serde(default)]
    pub tracks: Vec<TrackConfig>,

    /// Instruments feeding tracks.
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
}

/// One mixer track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    /// Display name.
    pub name: String,

    /// RGB color as `0xRRGGBB`.
    #[serde(default = "default_color")]
    pub color: u32,

    /// Fader gain in dB.
    #[serde(default)]
    pub gain_db: f32,

    /// Balance in `[-1, 1]`.
    #[serde(default)]
    pub pan: f32,

    /// Muted tracks render silence.
    #[serde(default)]
    pub muted: bool,

    /// Audio file played on this track.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,

    /// Timeline position of the source in seconds.
    #[serde(default)]
    pub start: f64,

    /// Plugin chain, first to last.
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

fn default_color() -> u32 {
    0x80_80_80
}

/// One plugin in a track chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Factory identifier, e.g. `"gain"`.
    pub kind: String,

    /// Gain for units that take one.
    #[serde(default)]
    pub gain_db: f32,
}

/// An instrument driven by an inline note list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Factory identifier.
    #[serde(default = "default_instrument_kind")]
    pub kind: String,

    /// Notes played, in seconds.
    #[serde(default)]
    pub midi: Vec<NoteConfig>,

    /// Index into `tracks` that receives the instrument's audio.
    pub track: usize,
}

fn default_instrument_kind() -> String {
    "sine".to_string()
}

/// A single note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteConfig {
    /// MIDI note number.
    pub pitch: u8,

    /// Note-on velocity.
    #[serde(default = "default_velocity")]
    pub velocity: u8,

    /// MIDI channel, 0-15.
    #[serde(default)]
    pub channel: u8,

    /// Note-on time in seconds.
    pub start: f64,

    /// Note-off time in seconds.
    pub end: f64,
}

fn default_velocity() -> u8 {
    100
}

impl SessionConfig {
    /// Create an empty session with default engine settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            engine: EngineConfig::default(),
            tracks: Vec::new(),
            instruments: Vec::new(),
        }
    }

    /// Load a session from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let session = Self::from_toml(&content)?;
        tracing::debug!(
            "loaded session '{}' from {} ({} tracks)",
            session.name,
            path.display(),
            session.tracks.len()
        );
        Ok(session)
    }

    /// Parse a session from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the session to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the session to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolve relative source paths against `base`, normally the directory
    /// holding the session file.
    pub fn resolve_sources(&mut self, base: &Path) {
        for track in &mut self.tracks {
            if let Some(source) = &track.source
                && source.is_relative()
            {
                track.source = Some(base.join(source));
            }
        }
    }

    /// End of the last source start or note, in seconds. Audio file lengths
    /// are not known here.
    pub fn last_event_seconds(&self) -> f64 {
        let notes = self
            .instruments
            .iter()
            .flat_map(|i| i.midi.iter())
            .map(|n| n.end);
        let starts = self.tracks.iter().map(|t| t.start);
        notes.chain(starts).fold(0.0, f64::max)
    }

    /// Check engine settings and cross references.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        for track in &self.tracks {
            if !(-1.0..=1.0).contains(&track.pan) {
                return Err(ConfigError::invalid(format!(
                    "track '{}': pan {} outside [-1, 1]",
                    track.name, track.pan
                )));
            }
            if track.start < 0.0 {
                return Err(ConfigError::invalid(format!(
                    "track '{}': negative start",
                    track.name
                )));
            }
        }
        for (i, instrument) in self.instruments.iter().enumerate() {
            if instrument.track >= self.tracks.len() {
                return Err(ConfigError::invalid(format!(
                    "instrument {i}: track {} does not exist",
                    instrument.track
                )));
            }
            for note in &instrument.midi {
                if note.pitch > 127 || note.velocity > 127 || note.channel > 15 {
                    return Err(ConfigError::invalid(format!(
                        "instrument {i}: note {} out of MIDI range",
                        note.pitch
                    )));
                }
                if note.end < note.start || note.start < 0.0 {
                    return Err(ConfigError::invalid(format!(
                        "instrument {i}: note {} ends before it starts",
                        note.pitch
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

impl TrackConfig {
    /// Create a centred, unity-gain track.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: default_color(),
            gain_db: 0.0,
            pan: 0.0,
            muted: false,
            source: None,
            start: 0.0,
            plugins: Vec::new(),
        }
    }

    /// Set the audio file.
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Append a plugin.
    pub fn with_plugin(mut self, plugin: PluginConfig) -> Self {
        self.plugins.push(plugin);
        self
    }
}

impl PluginConfig {
    /// Create a plugin entry.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            gain_db: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO: &str = r#"
name = "Demo"

[engine]
sample_rate = 44100

[[tracks]]
name = "Drums"
gain_db = -3.0
pan = -0.25
source = "drums.wav"
start = 0.5

[[tracks.plugins]]
kind = "gain"
gain_db = -6.0

[[tracks]]
name = "Lead"

[[instruments]]
track = 1
midi = [{ pitch = 69, start = 0.0, end = 1.5 }]
"#;

    #[test]
    fn test_parse_full_session() {
        let session = SessionConfig::from_toml(DEMO).unwrap();
        assert_eq!(session.name, "Demo");
        assert_eq!(session.engine.sample_rate, 44100);
        assert_eq!(session.engine.block_size, 512);
        assert_eq!(session.tracks.len(), 2);

        let drums = &session.tracks[0];
        assert_eq!(drums.gain_db, -3.0);
        assert_eq!(drums.pan, -0.25);
        assert_eq!(drums.source.as_deref(), Some(Path::new("drums.wav")));
        assert_eq!(drums.plugins, vec![PluginConfig {
            kind: "gain".to_string(),
            gain_db: -6.0
        }]);
        assert_eq!(session.tracks[1].color, 0x80_80_80);

        let inst = &session.instruments[0];
        assert_eq!(inst.kind, "sine");
        assert_eq!(inst.midi[0].velocity, 100);
        assert!(session.validate().is_ok());
        assert_eq!(session.last_event_seconds(), 1.5);
    }

    #[test]
    fn test_toml_roundtrip() {
        let session = SessionConfig::from_toml(DEMO).unwrap();
        let text = session.to_toml().unwrap();
        assert_eq!(SessionConfig::from_toml(&text).unwrap(), session);
    }

    #[test]
    fn test_validate_dangling_instrument_track() {
        let mut session = SessionConfig::from_toml(DEMO).unwrap();
        session.instruments[0].track = 5;
        assert!(matches!(
            session.validate(),
            Err(ConfigError::Validation(ref m)) if m.contains("track 5")
        ));
    }

    #[test]
    fn test_validate_pan_and_notes() {
        let mut session = SessionConfig::from_toml(DEMO).unwrap();
        session.tracks[0].pan = 1.5;
        assert!(session.validate().is_err());

        let mut session = SessionConfig::from_toml(DEMO).unwrap();
        session.instruments[0].midi[0].end = -1.0;
        assert!(session.validate().is_err());
    }

    #[test]
    fn test_resolve_sources() {
        let mut session = SessionConfig::new("s");
        session.tracks.push(TrackConfig::new("a").with_source("a.wav"));
        session.tracks.push(TrackConfig::new("b").with_source("/abs/b.wav"));
        session.resolve_sources(Path::new("/projects/demo"));
        assert_eq!(
            session.tracks[0].source.as_deref(),
            Some(Path::new("/projects/demo/a.wav"))
        );
        assert_eq!(
            session.tracks[1].source.as_deref(),
            Some(Path::new("/abs/b.wav"))
        );
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            SessionConfig::from_toml("name = "),
            Err(ConfigError::Parse(_))
        ));
    }
}
