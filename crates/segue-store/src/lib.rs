//! Segmented pool-file storage.
//!
//! This crate provides the storage layer every audio edit is built on:
//!
//! - **Block store**: [`BlockStore`], a file of fixed-size blocks with a free
//!   list, write-back cache, and a flush that never overwrites the last
//!   durable metadata in place
//! - **Pools**: [`PoolFile`], named arrays inside one block store that grow and
//!   shrink anywhere (insert, delete, move) by splicing block extents
//! - **Accessors**: [`PoolAccessor`], the bounds-checked typed view callers use
//!   to read and write elements
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use segue_store::{PoolFile, StoreOptions};
//!
//! let file = PoolFile::create("work.pf", StoreOptions::default())?;
//! let samples = file.create_or_open::<f32>("Channel 1")?;
//! samples.append(44100, true)?;
//! samples.set(100, 0.5)?;
//!
//! // Cut one second out into another pool without copying sample data
//! file.create_pool("Clipboard", 4)?;
//! file.move_data("Clipboard", 0, "Channel 1", 0, 22050)?;
//! file.flush()?;
//! # Ok::<(), segue_store::Error>(())
//! ```

mod accessor;
mod block_store;
pub mod codec;
mod pool;
mod pool_file;

pub use accessor::{PoolAccessor, PoolElement, decode_into, encode_slice};
pub use block_store::{
    BlockId, BlockStore, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_BLOCKS, FORMAT_VERSION, SIGNATURE,
    StoreOptions, StoreStats,
};
pub use pool_file::PoolFile;

/// Error types for block and pool operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file's signature, checksums, or structure are invalid.
    #[error("corrupt pool file: {reason}")]
    CorruptFile {
        /// What failed validation.
        reason: String,
    },

    /// The file was written by a newer format version.
    #[error("incompatible format version {found} (this build supports up to {supported})")]
    IncompatibleVersion {
        /// Version recorded in the file.
        found: u32,
        /// Newest version this build understands.
        supported: u32,
    },

    /// A position or count exceeds the current bounds.
    #[error("range {pos}+{count} out of bounds (length {len})")]
    OutOfRange {
        /// Start position of the request.
        pos: u64,
        /// Number of elements (or bytes) requested.
        count: u64,
        /// Current length.
        len: u64,
    },

    /// No pool with the given name exists.
    #[error("pool not found: {0}")]
    PoolNotFound(String),

    /// A pool with the given name already exists.
    #[error("pool already exists: {0}")]
    PoolExists(String),

    /// Pool names must be non-empty and fit a 16-bit length prefix.
    #[error("invalid pool name: {0:?}")]
    InvalidPoolName(String),

    /// The typed view does not match the pool's element size.
    #[error("pool '{pool}' holds {found}-byte elements, accessor expects {expected}")]
    ElementSizeMismatch {
        /// Pool name.
        pool: String,
        /// Element size requested.
        expected: u32,
        /// Element size stored.
        found: u32,
    },

    /// A raw buffer does not hold a whole number of elements.
    #[error("pool '{pool}': {len} bytes is not a multiple of the {element_size}-byte element")]
    PartialElement {
        /// Pool name.
        pool: String,
        /// Buffer length in bytes.
        len: usize,
        /// Element size of the pool.
        element_size: u32,
    },

    /// Element size is zero or larger than a block.
    #[error("invalid element size: {0}")]
    InvalidElementSize(u32),

    /// Block size is not a supported power of two.
    #[error("invalid block size: {0}")]
    InvalidBlockSize(u32),

    /// Raw I/O addressed the header block or a block past the end of the file.
    #[error("invalid block id: {0}")]
    InvalidBlock(u64),
}

impl Error {
    /// Create a corrupt file error.
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Error::CorruptFile {
            reason: reason.into(),
        }
    }
}

/// Convenience result type for storage operations.
pub type Result<T> = std::result::Result<T, Error>;
