//! rondo CLI - render, play and inspect rondo sessions.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rondo")]
#[command(author, version, about = "rondo session engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a session to an audio file
    Render(commands::render::RenderArgs),

    /// Play a session on an output device
    Play(commands::play::PlayArgs),

    /// Show audio file metadata
    Info(commands::info::InfoArgs),

    /// Print a session's routing as JSON
    Routing(commands::routing::RoutingArgs),

    /// List built-in plugins
    Plugins(commands::plugins::PluginsArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render(args) => commands::render::run(args),
        Commands::Play(args) => commands::play::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Routing(args) => commands::routing::run(args),
        Commands::Plugins(args) => commands::plugins::run(args),
    }
}
