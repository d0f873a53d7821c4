//! Compact a sound file in place.

use clap::Args;
use segue_config::EngineConfig;
use segue_sound::Sound;

use super::common::format_bytes;

/// Compact a sound file.
#[derive(Args)]
pub struct DefragArgs {
    /// Path to the sound file
    pub file: std::path::PathBuf,

    /// Also remove temp pools left behind by a crash
    #[arg(long)]
    pub purge: bool,
}

/// Run the defrag command.
pub fn run(args: DefragArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let mut sound = Sound::open(&args.file, config)?;
    if args.purge {
        let removed = sound.purge_orphan_temp_pools()?;
        println!("Removed {removed} orphaned temp pools");
    }
    let before = std::fs::metadata(&args.file)?.len();
    sound.defragment()?;
    sound.close()?;
    let after = std::fs::metadata(&args.file)?.len();

    println!(
        "Defragmented {}: {} -> {}",
        args.file.display(),
        format_bytes(before),
        format_bytes(after)
    );
    Ok(())
}
