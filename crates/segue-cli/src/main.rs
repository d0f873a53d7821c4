//! Segue CLI - inspect, convert, and maintain segue sound files.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "segue")]
#[command(author, version, about = "Segue sound file tool", long_about = None)]
struct Cli {
    /// Engine configuration file (defaults to the user config, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show format, length, cues, and storage statistics
    Info(commands::info::InfoArgs),

    /// Convert a WAV file into a sound file
    Import(commands::convert::ImportArgs),

    /// Convert a sound file into a WAV file
    Export(commands::convert::ExportArgs),

    /// Compact a sound file in place
    Defrag(commands::defrag::DefragArgs),

    /// Print a min/max waveform overview
    Peaks(commands::peaks::PeaksArgs),

    /// List, add, or remove cues
    Cues(commands::cues::CuesArgs),

    /// List the raw pools inside a file
    Pools(commands::pools::PoolsArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();

    let cli = Cli::parse();
    let config = commands::common::load_config(cli.config.as_deref())?;
    tracing::debug!(?config, "engine config");

    match cli.command {
        Commands::Info(args) => commands::info::run(args, &config),
        Commands::Import(args) => commands::convert::run_import(args, &config),
        Commands::Export(args) => commands::convert::run_export(args, &config),
        Commands::Defrag(args) => commands::defrag::run(args, &config),
        Commands::Peaks(args) => commands::peaks::run(args, &config),
        Commands::Cues(args) => commands::cues::run(args, &config),
        Commands::Pools(args) => commands::pools::run(args, &config),
    }
}
