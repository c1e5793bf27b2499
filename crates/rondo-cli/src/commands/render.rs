//! Offline session rendering.

use std::path::PathBuf;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use rondo_core::{MidiBuffer, linear_to_db};
use rondo_source::EncodeOptions;

use super::common::{load_session, render_buffer};

#[derive(Args)]
pub struct RenderArgs {
    /// Session file (TOML)
    #[arg(value_name = "SESSION")]
    session: PathBuf,

    /// Output audio file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Seconds rendered after the last sequenced block
    #[arg(long, default_value = "1.0")]
    tail: f64,

    /// Render exactly this many seconds instead of the session length
    #[arg(long)]
    duration: Option<f64>,

    /// Output bit depth (16, 24, or 32)
    #[arg(long, default_value = "32")]
    bit_depth: u16,
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    println!("Loading {}...", args.session.display());
    let session = load_session(&args.session)?;
    let config = session.context().config().clone();
    let sample_rate = config.sample_rate_hz();

    let seconds = args.duration.unwrap_or(session.end_seconds() + args.tail);
    if seconds <= 0.0 {
        anyhow::bail!("Nothing to render. The session is empty; pass --duration");
    }
    let total = (seconds * sample_rate).ceil() as usize;
    println!(
        "  {} tracks, {} sources, {} instruments, {:.2}s",
        session.mixer().track_count() - 1,
        session.seq().source_count(),
        session.seq().instrument_count(),
        seconds
    );

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );

    let out_channels = usize::from(config.output_channels);
    let mut rendered = vec![Vec::with_capacity(total); out_channels];
    let mut audio = render_buffer(&session);
    let mut midi = MidiBuffer::new(config.midi_capacity);

    session.play();
    let mut done = 0;
    while done < total {
        let frames = audio.set_frames((total - done).min(config.block_size));
        audio.clear();
        session.process_block(&mut audio, &mut midi);
        for (ch, out) in rendered.iter_mut().enumerate() {
            out.extend_from_slice(audio.channel(ch));
        }
        done += frames;
        session.maintenance();
        pb.set_position(done as u64);
    }
    session.stop();
    pb.finish_with_message("done");

    let peak = rendered
        .iter()
        .flatten()
        .fold(0.0f32, |acc, s| acc.max(s.abs()));
    println!("\nPeak {:.1} dB", linear_to_db(peak));

    println!("Writing {}...", args.output.display());
    let options = EncodeOptions {
        bit_depth: args.bit_depth,
        ..EncodeOptions::default()
    };
    session
        .context()
        .formats()
        .encode(&args.output, sample_rate, &rendered, &options)?;
    println!("Done!");
    Ok(())
}
