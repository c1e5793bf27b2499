//! Real-time session playback.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use indicatif::{ProgressBar, ProgressStyle};
use rondo_core::MidiBuffer;

use super::common::{load_session, render_buffer};

#[derive(Args)]
pub struct PlayArgs {
    /// Session file (TOML)
    #[arg(value_name = "SESSION")]
    session: PathBuf,

    /// Output device (exact or partial name)
    #[arg(short, long)]
    output: Option<String>,

    /// Seconds played after the last sequenced block
    #[arg(long, default_value = "1.0")]
    tail: f64,

    /// Play exactly this many seconds instead of the session length
    #[arg(long)]
    duration: Option<f64>,
}

fn find_output_device(host: &cpal::Host, name: Option<&str>) -> anyhow::Result<cpal::Device> {
    let Some(search) = name else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("No default output device"));
    };
    let search_lower = search.to_lowercase();
    for device in host.output_devices()? {
        if let Ok(desc) = device.description()
            && desc.name().to_lowercase().contains(&search_lower)
        {
            return Ok(device);
        }
    }
    anyhow::bail!("No output device matching '{}'", search)
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    println!("Loading {}...", args.session.display());
    let session = Arc::new(load_session(&args.session)?);
    let config = session.context().config().clone();
    let seconds = args.duration.unwrap_or(session.end_seconds() + args.tail);
    if seconds <= 0.0 {
        anyhow::bail!("Nothing to play. The session is empty; pass --duration");
    }

    let host = cpal::default_host();
    let device = find_output_device(&host, args.output.as_deref())?;
    let stream_config = cpal::StreamConfig {
        channels: config.output_channels,
        sample_rate: config.sample_rate,
        buffer_size: cpal::BufferSize::Fixed(config.block_size as u32),
    };

    let out_channels = usize::from(config.output_channels);
    let block = config.block_size;
    let render = Arc::clone(&session);
    let mut audio = render_buffer(&session);
    let mut midi = MidiBuffer::new(config.midi_capacity);

    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            for chunk in data.chunks_mut(block * out_channels) {
                audio.set_frames(chunk.len() / out_channels);
                audio.clear();
                render.process_block(&mut audio, &mut midi);
                audio.write_interleaved(chunk, out_channels);
            }
        },
        |err| tracing::error!("output stream error: {err}"),
        None,
    )?;
    stream.play()?;
    tracing::info!(
        channels = config.output_channels,
        sample_rate = config.sample_rate,
        "output stream started"
    );

    println!("\nPlaying {seconds:.1}s...\n");
    let pb = ProgressBar::new((seconds * 1000.0) as u64);
    pb.set_style(ProgressStyle::default_bar().template("[{bar:40.cyan/blue}] {msg}")?);

    session.play();
    let transport = session.transport();
    let poll = Duration::from_millis(config.deferred_drain_ms.max(1));
    // A stalled device never advances the transport.
    let deadline = Instant::now() + Duration::from_secs_f64(seconds + 5.0);
    while transport.position_seconds() < seconds {
        if Instant::now() > deadline {
            tracing::warn!("output device stopped calling back");
            break;
        }
        std::thread::sleep(poll);
        session.maintenance();
        let now = transport.position_seconds();
        pb.set_position((now * 1000.0) as u64);
        pb.set_message(format!("{now:.1}s"));
    }
    session.stop();
    std::thread::sleep(poll);
    drop(stream);
    session.maintenance();

    pb.finish_with_message("done");
    println!("Done!");
    Ok(())
}
