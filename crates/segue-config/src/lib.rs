//! Configuration for the segue storage engine.
//!
//! - **Engine config**: [`EngineConfig`], loaded from and saved to TOML
//! - **Validation**: [`EngineConfig::validate`] rejects block sizes, chunk
//!   sizes, and channel limits the engine cannot honor
//! - **Paths**: platform-specific config and working directories
//!
//! # Example
//!
//! ```rust,no_run
//! use segue_config::{EngineConfig, paths};
//!
//! let config = paths::load_or_default();
//! let tuned = EngineConfig {
//!     peak_chunk_size: 256,
//!     ..config
//! };
//! tuned.save(paths::default_config_path()).unwrap();
//! ```

mod engine;
mod error;

/// Platform-specific configuration and working directories.
pub mod paths;

pub use engine::{
    DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_BLOCKS, DEFAULT_MAX_CHANNELS, DEFAULT_PEAK_CHUNK_SIZE,
    EngineConfig, MAX_BLOCK_SIZE, MAX_CHANNELS, MIN_BLOCK_SIZE,
};
pub use error::ConfigError;
pub use paths::{default_config_path, default_working_dir, load_or_default, user_config_dir};
