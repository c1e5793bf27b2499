//! Built-in plugin listing.

#![allow(clippy::print_literal)] // Table headers use literal strings intentionally

use clap::Args;
use rondo_engine::BuiltinFactory;

#[derive(Args)]
pub struct PluginsArgs {
    /// Only list instruments
    #[arg(long)]
    instruments: bool,
}

pub fn run(args: PluginsArgs) -> anyhow::Result<()> {
    let factory = BuiltinFactory::new();

    println!("Available Plugins");
    println!("=================");
    println!();
    println!("  {:10}  {:24}  {}", "Id", "Name", "Kind");
    println!("  {:10}  {:24}  {}", "--", "----", "----");
    for info in factory
        .all()
        .into_iter()
        .filter(|i| !args.instruments || i.instrument)
    {
        let kind = if info.instrument { "instrument" } else { "effect" };
        println!("  {:10}  {:24}  {}", info.id, info.name, kind);
    }
    println!();
    println!("Use an id as `kind` in a session file's [[tracks.plugins]] or [[instruments]].");
    Ok(())
}
