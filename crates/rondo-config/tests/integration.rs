//! File round-trips for rondo-config.

use rondo_config::{
    ConfigError, EngineConfig, InstrumentConfig, IoAction, NoteConfig, PluginConfig, SessionConfig,
    TrackConfig,
};
use tempfile::TempDir;

fn demo_session() -> SessionConfig {
    let mut session = SessionConfig::new("Roundtrip");
    session.engine = EngineConfig::default().with_sample_rate(44100).with_block_size(256);
    session.tracks.push(
        TrackConfig::new("Bass")
            .with_source("bass.wav")
            .with_plugin(PluginConfig::new("gain")),
    );
    session.instruments.push(InstrumentConfig {
        kind: "sine".to_string(),
        midi: vec![NoteConfig {
            pitch: 60,
            velocity: 90,
            channel: 0,
            start: 0.25,
            end: 0.75,
        }],
        track: 0,
    });
    session
}

#[test]
fn test_save_and_load_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("deeper").join("session.toml");

    let session = demo_session();
    session.save(&path).unwrap();
    assert!(path.exists());

    let loaded = SessionConfig::load(&path).unwrap();
    assert_eq!(loaded, session);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    let err = SessionConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { action: IoAction::Read, path: ref p, .. } if *p == path));
}

#[test]
fn test_load_malformed_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[[tracks]]\nname = 3\n").unwrap();
    assert!(matches!(
        SessionConfig::load(&path),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_loaded_session_resolves_relative_sources() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("s.toml");
    demo_session().save(&path).unwrap();

    let mut loaded = SessionConfig::load(&path).unwrap();
    loaded.resolve_sources(dir.path());
    assert_eq!(
        loaded.tracks[0].source.as_deref(),
        Some(dir.path().join("bass.wav").as_path())
    );
}
