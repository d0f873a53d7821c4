//! Display sound file metadata.

use clap::Args;
use segue_config::EngineConfig;
use segue_sound::Sound;

use super::common::{format_bytes, format_time};

/// Display sound file information.
#[derive(Args)]
pub struct InfoArgs {
    /// Path to the sound file
    pub file: std::path::PathBuf,
}

/// Run the info command.
pub fn run(args: InfoArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let sound = Sound::open(&args.file, config)?;
    let length = sound.length()?;
    let stats = sound.store_stats();

    println!("File:        {}", args.file.display());
    println!("Channels:    {}", sound.channel_count());
    println!("Sample Rate: {} Hz", sound.sample_rate());
    println!(
        "Duration:    {} ({} frames)",
        format_time(length, sound.sample_rate()),
        length
    );
    println!("Cues:        {}", sound.cue_count());
    println!("Peak Chunk:  {} samples", sound.peak_chunk_size());
    println!(
        "Blocks:      {} x {} ({} free)",
        stats.total_blocks,
        format_bytes(u64::from(stats.block_size)),
        stats.free_blocks
    );
    let orphans = sound.orphan_temp_pools();
    if !orphans.is_empty() {
        println!(
            "Orphaned:    {} temp pools (run `segue defrag --purge`)",
            orphans.len()
        );
    }

    let file_size = std::fs::metadata(&args.file)?.len();
    println!("File Size:   {}", format_bytes(file_size));

    Ok(())
}
