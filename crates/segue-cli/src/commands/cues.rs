//! Cue listing and editing.

use anyhow::Context;
use clap::{Args, Subcommand};
use segue_config::EngineConfig;
use segue_sound::Sound;
use std::path::PathBuf;

use super::common::format_time;

/// Manage cues.
#[derive(Args)]
pub struct CuesArgs {
    #[command(subcommand)]
    pub action: CuesAction,
}

/// Cue subcommands.
#[derive(Subcommand)]
pub enum CuesAction {
    /// List cues in time order
    List {
        /// Path to the sound file
        file: PathBuf,
    },

    /// Add a cue
    Add {
        /// Path to the sound file
        file: PathBuf,

        /// Cue name (at most 32 bytes)
        #[arg(short, long)]
        name: String,

        /// Position in samples
        #[arg(short, long)]
        time: u64,

        /// Keep the cue fixed when audio before it changes length
        #[arg(long)]
        anchored: bool,
    },

    /// Remove a cue by name
    Remove {
        /// Path to the sound file
        file: PathBuf,

        /// Cue name
        #[arg(short, long)]
        name: String,
    },
}

/// Run the cues command.
pub fn run(args: CuesArgs, config: &EngineConfig) -> anyhow::Result<()> {
    match args.action {
        CuesAction::List { file } => {
            let sound = Sound::open(&file, config)?;
            if sound.cue_count() == 0 {
                println!("No cues");
                return Ok(());
            }
            let mut order: Vec<usize> = (0..sound.cue_count()).collect();
            order.sort_by_key(|&i| sound.cues()[i].time);
            for i in order {
                let cue = &sound.cues()[i];
                println!(
                    "{:>4}  {:>12}  {:>10}  {}{}",
                    i,
                    cue.time,
                    format_time(cue.time, sound.sample_rate()),
                    cue.name,
                    if cue.anchored { "  [anchored]" } else { "" }
                );
            }
            Ok(())
        }
        CuesAction::Add {
            file,
            name,
            time,
            anchored,
        } => {
            let mut sound = Sound::open(&file, config)?;
            let index = sound.add_cue(&name, time, anchored)?;
            sound.close()?;
            println!("Added cue {index} '{name}' at {time}");
            Ok(())
        }
        CuesAction::Remove { file, name } => {
            let mut sound = Sound::open(&file, config)?;
            let index = sound
                .find_cue_by_name(&name)
                .with_context(|| format!("no cue named '{name}'"))?;
            sound.remove_cue(index)?;
            sound.close()?;
            println!("Removed cue '{name}'");
            Ok(())
        }
    }
}
