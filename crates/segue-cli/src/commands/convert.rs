//! WAV import and export.

use anyhow::Context;
use clap::Args;
use segue_config::EngineConfig;
use segue_sound::{Sound, SoundTranslator, TranslatorSet, WavTranslator};
use std::path::PathBuf;

use super::common::frame_progress;

/// Convert a WAV file into a sound file.
#[derive(Args)]
pub struct ImportArgs {
    /// Input WAV file
    pub input: PathBuf,

    /// Output sound file
    pub output: PathBuf,
}

/// Convert a sound file into a WAV file.
#[derive(Args)]
pub struct ExportArgs {
    /// Input sound file
    pub input: PathBuf,

    /// Output WAV file
    pub output: PathBuf,

    /// Output bit depth (16, 24, or 32 for float)
    #[arg(short, long, default_value = "32")]
    pub bits: u16,
}

/// Run the import command.
pub fn run_import(args: ImportArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let translators = TranslatorSet::default();
    let pb = frame_progress(0)?;
    let sound = translators
        .load(&args.input, &args.output, config, &mut |done, total| {
            pb.set_length(total);
            pb.set_position(done);
        })
        .with_context(|| format!("importing {}", args.input.display()))?;
    pb.finish_and_clear();

    let frames = sound.length()?;
    let channels = sound.channel_count();
    sound.close()?;
    println!(
        "Imported {} frames x {} channels into {}",
        frames,
        channels,
        args.output.display()
    );
    Ok(())
}

/// Run the export command.
pub fn run_export(args: ExportArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let translator = WavTranslator::new(args.bits)?;
    let sound = Sound::open(&args.input, config)
        .with_context(|| format!("opening {}", args.input.display()))?;
    let pb = frame_progress(sound.length()?)?;
    translator.save(&sound, &args.output, &mut |done, _| pb.set_position(done))?;
    pb.finish_and_clear();

    println!(
        "Exported {} frames to {} ({}-bit)",
        sound.length()?,
        args.output.display(),
        args.bits
    );
    Ok(())
}
