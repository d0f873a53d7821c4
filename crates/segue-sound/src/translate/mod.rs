//! Translators adapt external file formats to [`Sound`]s.
//!
//! A translator never reaches into pool internals: loading creates a sound
//! and writes samples through channel accessors, saving reads them back the
//! same way. [`TranslatorSet`] picks the translator for a path and is passed
//! explicitly to whoever needs it.

mod native;
mod wav;

pub use native::{NATIVE_EXTENSION, NativeTranslator};
pub use wav::WavTranslator;

use std::path::Path;

use segue_config::EngineConfig;

use crate::sound::Sound;
use crate::{Error, Result};

/// Progress callback receiving `(done, total)` in sample frames.
pub type Progress<'a> = &'a mut dyn FnMut(u64, u64);

/// Loader/saver for one file format.
pub trait SoundTranslator: Send + Sync {
    /// Short format name for messages.
    fn name(&self) -> &'static str;

    /// Returns true if this translator reads and writes `path`.
    fn handles_path(&self, path: &Path) -> bool;

    /// Loads `path` into a new sound backed by the pool file at
    /// `working_path`.
    fn load(
        &self,
        path: &Path,
        working_path: &Path,
        config: &EngineConfig,
        progress: Progress<'_>,
    ) -> Result<Sound>;

    /// Writes `sound` to `path`.
    fn save(&self, sound: &Sound, path: &Path, progress: Progress<'_>) -> Result<()>;
}

/// Ordered collection of translators; the first that handles a path wins.
pub struct TranslatorSet {
    translators: Vec<Box<dyn SoundTranslator>>,
}

impl Default for TranslatorSet {
    fn default() -> Self {
        Self::new()
            .with(NativeTranslator)
            .with(WavTranslator::default())
    }
}

impl TranslatorSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            translators: Vec::new(),
        }
    }

    /// Adds `translator` after the existing ones.
    #[must_use]
    pub fn with(mut self, translator: impl SoundTranslator + 'static) -> Self {
        self.translators.push(Box::new(translator));
        self
    }

    /// Translator for `path`.
    pub fn for_path(&self, path: &Path) -> Result<&dyn SoundTranslator> {
        self.translators
            .iter()
            .find(|t| t.handles_path(path))
            .map(|t| t.as_ref())
            .ok_or_else(|| Error::UnsupportedFormat(path.display().to_string()))
    }

    /// Loads `path` with whichever translator handles it.
    pub fn load(
        &self,
        path: &Path,
        working_path: &Path,
        config: &EngineConfig,
        progress: Progress<'_>,
    ) -> Result<Sound> {
        let translator = self.for_path(path)?;
        tracing::info!(path = %path.display(), format = translator.name(), "loading sound");
        translator.load(path, working_path, config, progress)
    }

    /// Saves `sound` to `path` with whichever translator handles it.
    pub fn save(&self, sound: &Sound, path: &Path, progress: Progress<'_>) -> Result<()> {
        let translator = self.for_path(path)?;
        tracing::info!(path = %path.display(), format = translator.name(), "saving sound");
        translator.save(sound, path, progress)
    }
}

impl std::fmt::Debug for TranslatorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.translators.iter().map(|t| t.name()))
            .finish()
    }
}

pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
}
