//! Engine tunables and their TOML representation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Block size used when none is configured.
pub const DEFAULT_BLOCK_SIZE: u32 = 32768;
/// Smallest block size accepted from configuration.
pub const MIN_BLOCK_SIZE: u32 = 4096;
/// Largest block size accepted from configuration.
pub const MAX_BLOCK_SIZE: u32 = 1 << 20;
/// Blocks kept in memory when none is configured.
pub const DEFAULT_CACHE_BLOCKS: usize = 64;
/// Samples summarized by one peak chunk when none is configured.
pub const DEFAULT_PEAK_CHUNK_SIZE: u32 = 500;
/// Channel limit applied when none is configured.
pub const DEFAULT_MAX_CHANNELS: u16 = 8;
/// Hard ceiling on channels per sound.
pub const MAX_CHANNELS: u16 = 32;

/// Storage engine configuration.
///
/// # TOML Format
///
/// ```toml
/// block_size = 32768
/// cache_blocks = 64
/// peak_chunk_size = 500
/// max_channels = 8
/// working_dir = "/tmp/segue"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Block size of newly created pool files, in bytes.
    pub block_size: u32,

    /// Maximum number of blocks held in the write-back cache.
    pub cache_blocks: usize,

    /// Samples summarized by one peak chunk. Smaller values cost more
    /// memory but make waveform queries at high zoom cheaper.
    pub peak_chunk_size: u32,

    /// Channel limit for new sounds.
    pub max_channels: u16,

    /// Directory for working files created by imports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            cache_blocks: DEFAULT_CACHE_BLOCKS,
            peak_chunk_size: DEFAULT_PEAK_CHUNK_SIZE,
            max_channels: DEFAULT_MAX_CHANNELS,
            working_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a TOML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save the configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Check every setting against what the engine can honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.block_size.is_power_of_two()
            || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size)
        {
            return Err(ConfigError::invalid(
                "block_size",
                format!(
                    "{} is not a power of two between {MIN_BLOCK_SIZE} and {MAX_BLOCK_SIZE}",
                    self.block_size
                ),
            ));
        }
        if self.cache_blocks == 0 {
            return Err(ConfigError::invalid("cache_blocks", "must be at least 1"));
        }
        if self.peak_chunk_size == 0 {
            return Err(ConfigError::invalid("peak_chunk_size", "must be at least 1"));
        }
        if self.max_channels == 0 || self.max_channels > MAX_CHANNELS {
            return Err(ConfigError::invalid(
                "max_channels",
                format!("{} is not within 1..={MAX_CHANNELS}", self.max_channels),
            ));
        }
        Ok(())
    }
}
