//! CLI command implementations.

pub mod common;
pub mod convert;
pub mod cues;
pub mod defrag;
pub mod info;
pub mod peaks;
pub mod pools;
