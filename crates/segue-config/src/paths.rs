//! Platform-specific paths for configuration and working files.
//!
//! # Directory Structure
//!
//! - **User config**: `~/.config/segue/` (Linux), `~/Library/Application Support/segue/` (macOS), `%APPDATA%\segue\` (Windows)
//! - **Working files**: `<cache dir>/segue/work/`, or the system temp directory when no cache dir exists

use std::path::PathBuf;

use crate::engine::EngineConfig;

/// Application name used for directory paths.
const APP_NAME: &str = "segue";

/// File name of the engine configuration.
const CONFIG_FILE: &str = "engine.toml";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the path of the user's engine configuration file.
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE)
}

/// Returns the directory where working pool files are created.
pub fn default_working_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
        .join("work")
}

/// Loads the user's engine configuration, falling back to defaults when the
/// file is missing or invalid.
pub fn load_or_default() -> EngineConfig {
    let path = default_config_path();
    if !path.is_file() {
        return EngineConfig::default();
    }
    match EngineConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring invalid engine config");
            EngineConfig::default()
        }
    }
}
