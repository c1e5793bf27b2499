//! Display audio file metadata.

use clap::Args;
use rondo_source::FormatRegistry;

/// Display audio file information.
#[derive(Args)]
pub struct InfoArgs {
    /// Path to the audio file
    pub file: std::path::PathBuf,
}

/// Run the info command.
pub fn run(args: InfoArgs) -> anyhow::Result<()> {
    let formats = FormatRegistry::new();
    let codec = formats.codec_for(&args.file).ok_or_else(|| {
        anyhow::anyhow!(
            "Unsupported file type (known: {})",
            formats.extensions().join(", ")
        )
    })?;
    let info = codec.info(&args.file)?;

    let format_str = if info.float { "IEEE Float" } else { "PCM" };

    let size = std::fs::metadata(&args.file)?.len();
    let rows = [
        ("File", args.file.display().to_string()),
        ("Codec", codec.name().to_string()),
        ("Format", format!("{format_str} {}-bit", info.bits_per_sample)),
        ("Channels", info.channels.to_string()),
        ("Sample Rate", format!("{} Hz", info.sample_rate)),
        (
            "Duration",
            format!("{:.3}s ({} frames)", info.duration_secs, info.num_frames),
        ),
        ("File Size", format_bytes(size)),
    ];
    for (label, value) in rows {
        println!("{:<13}{value}", format!("{label}:"));
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
