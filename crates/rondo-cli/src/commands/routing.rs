//! Session routing dump.

use std::path::PathBuf;

use clap::Args;
use rondo_engine::Session;
use serde_json::{Value, json};

use super::common::load_session;

#[derive(Args)]
pub struct RoutingArgs {
    /// Session file (TOML)
    #[arg(value_name = "SESSION")]
    session: PathBuf,

    /// Print on a single line
    #[arg(long)]
    compact: bool,
}

pub fn run(args: RoutingArgs) -> anyhow::Result<()> {
    let session = load_session(&args.session)?;
    let report = routing_report(&session);
    let text = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{text}");
    Ok(())
}

/// Tracks, sources and instruments with every connection, by index.
pub fn routing_report(session: &Session) -> Value {
    let mixer = session.mixer();
    let seq = session.seq();

    let tracks: Vec<Value> = (0..mixer.track_count())
        .map(|i| {
            let plugins: Vec<Value> = mixer
                .track_dock(i)
                .map(|dock| dock.plugin_list())
                .unwrap_or_default()
                .into_iter()
                .map(|(name, enabled)| json!({ "name": name, "enabled": enabled }))
                .collect();
            json!({
                "index": i,
                "name": mixer.track_state(i).map(|s| s.name()),
                "bypass": mixer.track_bypass(i),
                "input": mixer.track_input_connections(i),
                "output": mixer.track_output_connections(i),
                "sends": mixer.track_send_connections(i),
                "plugins": plugins,
            })
        })
        .collect();

    let sources: Vec<Value> = (0..seq.source_count())
        .map(|i| {
            json!({
                "index": i,
                "bypass": seq.source_bypass(i),
                "audio_out": seq.source_audio_output_connections(i),
                "midi_out": seq.source_midi_output_connections(i),
            })
        })
        .collect();

    let instruments: Vec<Value> = (0..seq.instrument_count())
        .map(|i| {
            json!({
                "index": i,
                "plugin": seq.instrument(i).and_then(|h| h.identifier()),
                "bypass": seq.instrument_bypass(i),
                "audio_out": seq.instr_output_to_track_connections(i),
                "midi_from_sources": seq.instr_midi_input_from_source_connections(i),
                "midi_from_device": seq.instr_midi_input_from_device_connections(i),
            })
        })
        .collect();

    json!({
        "tracks": tracks,
        "sources": sources,
        "instruments": instruments,
    })
}
