use std::io::Read;
use std::path::Path;

use segue_config::EngineConfig;
use segue_store::SIGNATURE;

use super::{Progress, SoundTranslator, has_extension};
use crate::Result;
use crate::sound::{Sound, same_file};

/// File extension of native sound files.
pub const NATIVE_EXTENSION: &str = "seg";

/// The pool file format itself. Loading copies the file to the working path
/// (or opens it in place when both paths name the same file); saving writes a compacted
/// copy without temp pools.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeTranslator;

fn has_signature(path: &Path) -> bool {
    let mut head = [0u8; 8];
    std::fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut head))
        .is_ok_and(|()| head == SIGNATURE)
}

impl SoundTranslator for NativeTranslator {
    fn name(&self) -> &'static str {
        "native"
    }

    fn handles_path(&self, path: &Path) -> bool {
        has_extension(path, &[NATIVE_EXTENSION]) || has_signature(path)
    }

    fn load(
        &self,
        path: &Path,
        working_path: &Path,
        config: &EngineConfig,
        progress: Progress<'_>,
    ) -> Result<Sound> {
        if !same_file(path, working_path)? {
            std::fs::copy(path, working_path)?;
        }
        let sound = Sound::open(working_path, config)?;
        let len = sound.length()?;
        progress(len, len);
        Ok(sound)
    }

    fn save(&self, sound: &Sound, path: &Path, progress: Progress<'_>) -> Result<()> {
        sound.save(path)?;
        let len = sound.length()?;
        progress(len, len);
        Ok(())
    }
}
