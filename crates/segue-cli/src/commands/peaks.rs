//! Text waveform overview from the peak cache.

use clap::Args;
use segue_config::EngineConfig;
use segue_sound::Sound;

/// Print min/max per column.
#[derive(Args)]
pub struct PeaksArgs {
    /// Path to the sound file
    pub file: std::path::PathBuf,

    /// Channel index (0-based)
    #[arg(short, long, default_value = "0")]
    pub channel: usize,

    /// Number of columns to divide the sound into
    #[arg(long, default_value = "16")]
    pub columns: u64,
}

/// Run the peaks command.
pub fn run(args: PeaksArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let sound = Sound::open(&args.file, config)?;
    let length = sound.length()?;
    let columns = args.columns.min(length).max(1);

    println!("{:>12} {:>12} {:>10} {:>10}", "start", "stop", "min", "max");
    for col in 0..columns {
        let start = col * length / columns;
        let stop = (col + 1) * length / columns;
        let peak = sound.get_peak(args.channel, start, stop)?;
        println!("{start:>12} {stop:>12} {:>10.4} {:>10.4}", peak.min, peak.max);
    }
    // Recomputed chunks are worth keeping.
    sound.flush()?;
    Ok(())
}
