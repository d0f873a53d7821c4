//! Multichannel sound editing on top of segmented pool files.
//!
//! A [`Sound`] owns one sample pool per channel inside a
//! [`PoolFile`](segue_store::PoolFile), plus a peak chunk pool per channel
//! and a cue pool. Every structural edit (insert or remove space, move to or
//! from a temp pool, rotate) splices block extents rather than rewriting
//! audio, so edits on multi-gigabyte files cost time proportional to the
//! blocks touched.
//!
//! # Core Abstractions
//!
//! - [`Sound`] - channels, cues, peaks, and the structural edit operations
//! - [`ChannelAccessor`] - sample read/write on one channel, keeping the peak
//!   cache honest
//! - [`TempKey`] - handle to a set of temp pools holding relocated samples for
//!   undo
//! - [`SharedSound`] - size lock / resize lock discipline for a recording
//!   thread and an editing thread sharing one sound
//! - [`SoundTranslator`] - loader/saver adapters (native pool file, WAV)
//!
//! # Undo in three calls
//!
//! ```rust,no_run
//! use segue_sound::{NO_MAX_LENGTH, Sound};
//! use segue_config::EngineConfig;
//!
//! let mut sound = Sound::create("edit.seg", 2, 44100, 441000, &EngineConfig::default())?;
//! let all = [true, true];
//!
//! // Relocate the second second into temp pools, leaving silence in its place.
//! let key = sound.move_data_to_temp_and_replace_space(&all, 44100, 44100, 44100, 0, NO_MAX_LENGTH)?;
//! // ... effect writes into the replaced space ...
//!
//! // Undo: cut the replacement and put the original samples back.
//! sound.remove_space_and_move_data_from_temp(&all, 44100, 44100, key, 44100, 44100, true, NO_MAX_LENGTH)?;
//! # Ok::<(), segue_sound::Error>(())
//! ```

mod cues;
mod edit;
mod mix;
mod peaks;
mod shared;
mod sound;
mod temp;

pub mod translate;

pub use cues::{CUE_NAME_LEN, CUE_RECORD_SIZE, Cue, CueIndex};
pub use mix::{MixMethod, SampleSource};
pub use peaks::{Peak, PeakChunk};
pub use shared::{ResizeGuard, SharedSound, SizeGuard};
pub use sound::{ChannelAccessor, NO_MAX_LENGTH, Sample, Sound};
pub use temp::TempKey;
pub use translate::{NativeTranslator, SoundTranslator, TranslatorSet, WavTranslator};

pub use segue_config::MAX_CHANNELS;

/// Error types for sound operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Block store or pool error.
    #[error(transparent)]
    Store(#[from] segue_store::Error),

    /// WAV file read/write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel count is zero or exceeds the configured limit.
    #[error("unsupported channel count {requested} (limit {limit})")]
    TooManyChannels {
        /// Channels requested.
        requested: usize,
        /// Largest allowed count.
        limit: usize,
    },

    /// A channel index or channel mask does not fit the sound.
    #[error("invalid channel {channel} (sound has {channels})")]
    InvalidChannel {
        /// Offending index, or the mask length for mask mismatches.
        channel: usize,
        /// Channels in the sound.
        channels: usize,
    },

    /// No temp pool set is registered under the key, or it lacks a channel.
    #[error("temp pool not found: {0}")]
    TempPoolNotFound(TempKey),

    /// Cue names are limited to 32 bytes.
    #[error("cue name too long ({0} bytes, limit 32)")]
    CueNameTooLong(usize),

    /// No cue exists at the given index.
    #[error("cue not found: {0}")]
    CueNotFound(usize),

    /// A cue time lies beyond the end of the sound.
    #[error("cue time {time} beyond sound length {len}")]
    CueOutOfRange {
        /// Requested time.
        time: u64,
        /// Sound length.
        len: u64,
    },

    /// A lock was requested in a way that would deadlock or break the
    /// channel length invariant.
    #[error("lock discipline violated: {0}")]
    LockDiscipline(String),

    /// The pool file does not describe a sound.
    #[error("invalid sound file: {0}")]
    InvalidFormat(String),

    /// No translator handles the given file.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Convenience result type for sound operations.
pub type Result<T> = std::result::Result<T, Error>;
