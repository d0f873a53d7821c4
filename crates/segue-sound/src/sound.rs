//! The [`Sound`] type: channels, cues, and peaks inside one pool file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use segue_config::EngineConfig;
use segue_store::{PoolAccessor, PoolElement, PoolFile, StoreOptions, StoreStats};

use crate::cues::{self, CUE_RECORD_SIZE, Cue, CueIndex, CueRecord};
use crate::peaks::{Peak, PeakCache, PeakChunk, chunk_count};
use crate::temp::{TempKey, TempRegistry, parse_temp_pool_name};
use crate::{Error, MAX_CHANNELS, Result};

/// Sample type stored in channel pools.
pub type Sample = f32;

/// Pass as `max_length` to leave channel lengths uncapped.
pub const NO_MAX_LENGTH: u64 = u64::MAX;

const FORMAT_INFO_POOL: &str = "Format Info";
const FORMAT_INFO_VERSION: u32 = 1;
const CUES_POOL: &str = "Cues";

pub(crate) fn channel_pool_name(channel: usize) -> String {
    format!("Channel {}", channel + 1)
}

pub(crate) fn peak_pool_name(channel: usize) -> String {
    format!("PeakChunk {}", channel + 1)
}

fn store_options(config: &EngineConfig) -> StoreOptions {
    StoreOptions {
        block_size: config.block_size,
        cache_blocks: config.cache_blocks,
    }
}

/// A multichannel sound stored in a pool file.
///
/// All channels always share one length of at least one sample once a
/// public operation returns. Methods taking `&mut self` may change that
/// length; methods taking `&self` only read or overwrite samples, so a
/// recording thread can keep writing through [`ChannelAccessor`]s while it
/// holds nothing more than a size lock (see [`SharedSound`](crate::SharedSound)).
pub struct Sound {
    pub(crate) file: Arc<PoolFile>,
    sample_rate: u32,
    pub(crate) channels: usize,
    peak_chunk_size: u32,
    pub(crate) max_channels: usize,
    pub(crate) cues: CueIndex,
    pub(crate) temps: TempRegistry,
    modified: AtomicBool,
    peak_lock: Mutex<()>,
}

impl Sound {
    /// Creates a new sound file holding `length` samples of silence per
    /// channel (at least one).
    pub fn create(
        path: impl AsRef<Path>,
        channels: usize,
        sample_rate: u32,
        length: u64,
        config: &EngineConfig,
    ) -> Result<Self> {
        let max_channels = usize::from(config.max_channels);
        if channels == 0 || channels > max_channels {
            return Err(Error::TooManyChannels {
                requested: channels,
                limit: max_channels,
            });
        }
        if sample_rate == 0 {
            return Err(Error::InvalidFormat("sample rate must be positive".into()));
        }

        let path = path.as_ref();
        let file = PoolFile::create(path, store_options(config))?;
        let sound = Self {
            file: Arc::new(file),
            sample_rate,
            channels,
            peak_chunk_size: config.peak_chunk_size.max(1),
            max_channels,
            cues: CueIndex::default(),
            temps: TempRegistry::default(),
            modified: AtomicBool::new(false),
            peak_lock: Mutex::new(()),
        };
        sound.file.create_pool(FORMAT_INFO_POOL, u32::SIZE as u32)?;
        sound.write_format_info()?;
        for ch in 0..channels {
            sound.create_channel_pools(ch, length.max(1))?;
        }
        sound.file.create_pool(CUES_POOL, CUE_RECORD_SIZE as u32)?;

        tracing::info!(path = %path.display(), channels, sample_rate, length, "created sound");
        Ok(sound)
    }

    /// Opens an existing sound file.
    ///
    /// Missing or mis-sized peak pools are rebuilt, and channels of unequal
    /// length (left by a crash between flushes) are padded to match.
    pub fn open(path: impl AsRef<Path>, config: &EngineConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = PoolFile::open(path, store_options(config))?;
        if !file.contains_pool(FORMAT_INFO_POOL) {
            return Err(Error::InvalidFormat(format!(
                "{} has no '{FORMAT_INFO_POOL}' pool",
                path.display()
            )));
        }
        let info = file.accessor::<u32>(FORMAT_INFO_POOL)?;
        if info.len()? < 4 {
            return Err(Error::InvalidFormat("format info is truncated".into()));
        }
        let values = info.read_vec(0, 4)?;
        let (version, sample_rate, channels, peak_chunk_size) =
            (values[0], values[1], values[2] as usize, values[3]);
        if version != FORMAT_INFO_VERSION {
            return Err(Error::InvalidFormat(format!(
                "format info version {version} (supported {FORMAT_INFO_VERSION})"
            )));
        }
        if channels == 0 || channels > usize::from(MAX_CHANNELS) {
            return Err(Error::InvalidFormat(format!("channel count {channels}")));
        }
        if sample_rate == 0 || peak_chunk_size == 0 {
            return Err(Error::InvalidFormat(
                "sample rate and peak chunk size must be positive".into(),
            ));
        }
        for ch in 0..channels {
            let name = channel_pool_name(ch);
            if !file.contains_pool(&name) {
                return Err(Error::InvalidFormat(format!("missing pool '{name}'")));
            }
            file.accessor::<Sample>(&name)?;
        }
        if !file.contains_pool(CUES_POOL) {
            file.create_pool(CUES_POOL, CUE_RECORD_SIZE as u32)?;
        }
        let records = file.accessor::<CueRecord>(CUES_POOL)?;
        let cues = records
            .read_vec(0, records.len()?)?
            .into_iter()
            .map(Cue::from)
            .collect();
        let temps = TempRegistry::resume_after(&file.pool_names());

        let mut sound = Self {
            file: Arc::new(file),
            sample_rate,
            channels,
            peak_chunk_size,
            max_channels: usize::from(config.max_channels).max(channels),
            cues: CueIndex::new(cues),
            temps,
            modified: AtomicBool::new(false),
            peak_lock: Mutex::new(()),
        };

        for ch in 0..channels {
            let peaks = peak_pool_name(ch);
            let len = sound.file.pool_len(&channel_pool_name(ch))?;
            if !sound.file.contains_pool(&peaks) {
                sound.file.create_pool(&peaks, PeakChunk::SIZE as u32)?;
                sound.peaks(ch).rebuild()?;
            } else if sound.file.pool_len(&peaks)? != chunk_count(len, u64::from(peak_chunk_size))
            {
                tracing::warn!(channel = ch, "peak pool out of step with audio, rebuilding");
                sound.peaks(ch).rebuild()?;
            }
        }
        let lens = sound.channel_lengths()?;
        if lens.windows(2).any(|w| w[0] != w[1]) || lens[0] == 0 {
            tracing::warn!(?lens, "channel lengths disagree, padding to match");
            sound.match_up_channel_lengths(NO_MAX_LENGTH)?;
        }
        let orphans = sound.orphan_temp_pools();
        if !orphans.is_empty() {
            tracing::warn!(count = orphans.len(), "found orphaned temp pools");
        }

        tracing::info!(
            path = %path.display(),
            channels,
            sample_rate,
            cues = sound.cues.len(),
            "opened sound"
        );
        Ok(sound)
    }

    pub(crate) fn create_channel_pools(&self, channel: usize, length: u64) -> Result<()> {
        let name = channel_pool_name(channel);
        self.file.create_pool(&name, Sample::SIZE as u32)?;
        self.file.append(&name, length, true)?;
        self.file
            .create_pool(&peak_pool_name(channel), PeakChunk::SIZE as u32)?;
        self.peaks(channel).rebuild()
    }

    pub(crate) fn write_format_info(&self) -> Result<()> {
        let info = self.file.accessor::<u32>(FORMAT_INFO_POOL)?;
        let values = [
            FORMAT_INFO_VERSION,
            self.sample_rate,
            self.channels as u32,
            self.peak_chunk_size,
        ];
        info.set_len(values.len() as u64, true)?;
        info.write(0, &values)?;
        Ok(())
    }

    /// Path of the backing pool file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub(crate) fn pool_file(&self) -> &PoolFile {
        &self.file
    }

    /// Names of every pool in the backing file.
    pub fn pool_names(&self) -> Vec<String> {
        self.file.pool_names()
    }

    /// Block usage of the backing file.
    pub fn store_stats(&self) -> StoreStats {
        self.file.stats()
    }

    /// Samples per second.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Changes the sample rate without resampling.
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            return Err(Error::InvalidFormat("sample rate must be positive".into()));
        }
        self.sample_rate = sample_rate;
        self.write_format_info()?;
        self.mark_modified();
        Ok(())
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Samples summarized by one peak chunk.
    pub fn peak_chunk_size(&self) -> u32 {
        self.peak_chunk_size
    }

    /// Channel length in samples.
    pub fn length(&self) -> Result<u64> {
        Ok(self.file.pool_len(&channel_pool_name(0))?)
    }

    /// Largest length a channel may reach given the channel count.
    pub fn max_length(&self) -> u64 {
        i64::MAX as u64 / (Sample::SIZE as u64 * self.channels as u64)
    }

    /// True if the sound changed since it was created, opened, or saved.
    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_modified(&self) {
        self.modified.store(true, Ordering::Relaxed);
    }

    pub(crate) fn channel_lengths(&self) -> Result<Vec<u64>> {
        (0..self.channels)
            .map(|ch| Ok(self.file.pool_len(&channel_pool_name(ch))?))
            .collect()
    }

    pub(crate) fn check_channel(&self, channel: usize) -> Result<()> {
        if channel >= self.channels {
            return Err(Error::InvalidChannel {
                channel,
                channels: self.channels,
            });
        }
        Ok(())
    }

    pub(crate) fn check_mask(&self, which: &[bool]) -> Result<()> {
        if which.len() != self.channels {
            return Err(Error::InvalidChannel {
                channel: which.len(),
                channels: self.channels,
            });
        }
        Ok(())
    }

    pub(crate) fn check_range(&self, pos: u64, count: u64) -> Result<()> {
        let len = self.length()?;
        if pos.checked_add(count).is_none_or(|end| end > len) {
            return Err(segue_store::Error::OutOfRange { pos, count, len }.into());
        }
        Ok(())
    }

    pub(crate) fn peaks(&self, channel: usize) -> PeakCache<'_> {
        PeakCache::new(
            &self.file,
            channel_pool_name(channel),
            peak_pool_name(channel),
            self.peak_chunk_size,
            &self.peak_lock,
        )
    }

    /// Sample accessor for one channel.
    pub fn get_audio(&self, channel: usize) -> Result<ChannelAccessor<'_>> {
        self.check_channel(channel)?;
        Ok(ChannelAccessor {
            channel,
            audio: self.file.accessor::<Sample>(&channel_pool_name(channel))?,
            peaks: self.peaks(channel),
            modified: &self.modified,
        })
    }

    /// Accessor for the temp pool holding `channel` under `key`.
    pub fn get_temp_audio(&self, key: TempKey, channel: usize) -> Result<PoolAccessor<'_, Sample>> {
        let name = self
            .temps
            .get(key)
            .and_then(|set| set.pools.get(&channel))
            .ok_or(Error::TempPoolNotFound(key))?;
        Ok(self.file.accessor::<Sample>(name)?)
    }

    /// Keys of every live temp pool set.
    pub fn temp_keys(&self) -> Vec<TempKey> {
        self.temps.keys().collect()
    }

    /// Min/max of `channel` over `[start, stop)`.
    pub fn get_peak(&self, channel: usize, start: u64, stop: u64) -> Result<Peak> {
        self.check_channel(channel)?;
        self.peaks(channel).peak(start, stop)
    }

    /// Marks peak chunks of `channel` overlapping `[start, stop)` dirty.
    pub fn invalidate_peaks(&self, channel: usize, start: u64, stop: u64) -> Result<()> {
        self.check_channel(channel)?;
        self.peaks(channel).invalidate(start, stop)
    }

    /// Marks every peak chunk of `channel` dirty.
    pub fn invalidate_all_peaks(&self, channel: usize) -> Result<()> {
        self.check_channel(channel)?;
        self.peaks(channel).invalidate_all()
    }

    pub(crate) fn repair_peaks(&self) {
        for ch in 0..self.channels {
            let name = peak_pool_name(ch);
            if !self.file.contains_pool(&name)
                && let Err(e) = self.file.create_pool(&name, PeakChunk::SIZE as u32)
            {
                tracing::error!(channel = ch, error = %e, "failed to recreate peak pool");
                continue;
            }
            if let Err(e) = self.peaks(ch).rebuild() {
                tracing::error!(channel = ch, error = %e, "failed to rebuild peaks");
            }
        }
    }

    // Cues

    fn persist_cues(&self) -> Result<()> {
        let records: Vec<CueRecord> = self.cues.cues().iter().map(CueRecord::from).collect();
        let pool = self.file.accessor::<CueRecord>(CUES_POOL)?;
        pool.set_len(records.len() as u64, true)?;
        pool.write(0, &records)?;
        self.mark_modified();
        Ok(())
    }

    fn check_cue_time(&self, time: u64) -> Result<()> {
        let len = self.length()?;
        if time > len {
            return Err(Error::CueOutOfRange { time, len });
        }
        Ok(())
    }

    pub(crate) fn cues_inserted(&mut self, pos: u64, len: u64) -> Result<()> {
        if self.cues.adjust_for_insert(pos, len) {
            self.persist_cues()?;
        }
        Ok(())
    }

    pub(crate) fn cues_removed(&mut self, pos: u64, len: u64) -> Result<()> {
        if self.cues.adjust_for_remove(pos, len) {
            self.persist_cues()?;
        }
        Ok(())
    }

    /// Adds a cue and returns its index.
    pub fn add_cue(&mut self, name: &str, time: u64, anchored: bool) -> Result<usize> {
        let cue = Cue::new(name, time, anchored)?;
        self.check_cue_time(time)?;
        let index = self.cues.push(cue);
        self.persist_cues()?;
        Ok(index)
    }

    /// Removes the cue at `index`. Later cues shift down one index.
    pub fn remove_cue(&mut self, index: usize) -> Result<Cue> {
        let cue = self.cues.remove(index)?;
        self.persist_cues()?;
        Ok(cue)
    }

    /// Moves the cue at `index` to `time`.
    pub fn set_cue_time(&mut self, index: usize, time: u64) -> Result<()> {
        self.check_cue_time(time)?;
        self.cues.update(index, |c| c.time = time)?;
        self.persist_cues()
    }

    /// Renames the cue at `index`.
    pub fn set_cue_name(&mut self, index: usize, name: &str) -> Result<()> {
        cues::check_name(name)?;
        self.cues.update(index, |c| c.name = name.to_string())?;
        self.persist_cues()
    }

    /// Pins or releases the cue at `index`.
    pub fn set_cue_anchored(&mut self, index: usize, anchored: bool) -> Result<()> {
        self.cues.update(index, |c| c.anchored = anchored)?;
        self.persist_cues()
    }

    /// Cue at `index`.
    pub fn cue(&self, index: usize) -> Result<&Cue> {
        self.cues.get(index)
    }

    /// Number of cues.
    pub fn cue_count(&self) -> usize {
        self.cues.len()
    }

    /// All cues in index order.
    pub fn cues(&self) -> &[Cue] {
        self.cues.cues()
    }

    /// The time-ordered cue index.
    pub fn cue_index(&self) -> &CueIndex {
        &self.cues
    }

    /// Index of a cue at exactly `time`.
    pub fn find_cue(&self, time: u64) -> Option<usize> {
        self.cues.find_cue(time)
    }

    /// Closest cue to `time` and its distance.
    pub fn find_nearest_cue(&self, time: u64) -> Option<(usize, u64)> {
        self.cues.find_nearest_cue(time)
    }

    /// Index of the first cue named `name`.
    pub fn find_cue_by_name(&self, name: &str) -> Option<usize> {
        self.cues.find_cue_by_name(name)
    }

    /// Latest cue strictly before `time`.
    pub fn find_previous_cue(&self, time: u64) -> Option<usize> {
        self.cues.find_previous_cue(time)
    }

    /// Earliest cue strictly after `time`.
    pub fn find_next_cue(&self, time: u64) -> Option<usize> {
        self.cues.find_next_cue(time)
    }

    /// Copy of the cue list, for undoing cue edits.
    pub fn cue_snapshot(&self) -> Vec<Cue> {
        self.cues.cues().to_vec()
    }

    /// Replaces every cue with `cues`.
    pub fn restore_cues(&mut self, cues: Vec<Cue>) -> Result<()> {
        for cue in &cues {
            cues::check_name(&cue.name)?;
        }
        self.cues = CueIndex::new(cues);
        self.persist_cues()
    }

    // Temp pool hygiene

    /// Temp pools present in the file that no live key refers to.
    pub fn orphan_temp_pools(&self) -> Vec<String> {
        self.file
            .pool_names()
            .into_iter()
            .filter(|n| parse_temp_pool_name(n).is_some() && !self.temps.is_registered(n))
            .collect()
    }

    /// Removes every orphaned temp pool and returns how many were removed.
    pub fn purge_orphan_temp_pools(&mut self) -> Result<usize> {
        let orphans = self.orphan_temp_pools();
        for name in &orphans {
            self.file.remove_pool(name)?;
        }
        if !orphans.is_empty() {
            tracing::info!(count = orphans.len(), "purged orphaned temp pools");
        }
        Ok(orphans.len())
    }

    // Lifecycle

    /// Persists pending changes to the backing file.
    pub fn flush(&self) -> Result<()> {
        self.file.flush()?;
        tracing::debug!(path = %self.path().display(), "flushed sound");
        Ok(())
    }

    /// Saves to `path`, leaving temp pools behind.
    ///
    /// Saving to the sound's own file (under any spelling of its path) is a
    /// flush. Any other path receives a compacted copy, written beside the
    /// target and renamed over it, and the sound keeps editing its original
    /// file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if same_file(path, self.path())? {
            self.file.flush()?;
        } else {
            let staging = staging_path(path);
            let copied = self
                .file
                .copy_to(&staging, |name| parse_temp_pool_name(name).is_none())
                .map_err(Error::from)
                .and_then(|()| Ok(std::fs::rename(&staging, path)?));
            if let Err(e) = copied {
                let _ = std::fs::remove_file(&staging);
                return Err(e);
            }
        }
        self.modified.store(false, Ordering::Relaxed);
        tracing::info!(path = %path.display(), "saved sound");
        Ok(())
    }

    /// Compacts the backing file in place.
    pub fn defragment(&mut self) -> Result<()> {
        self.file.defragment()?;
        Ok(())
    }

    fn into_pool_file(mut self) -> Result<PoolFile> {
        for key in self.temp_keys() {
            self.remove_temp_audio_pools(key)?;
        }
        Arc::try_unwrap(self.file).map_err(|_| {
            Error::LockDiscipline("pool file still referenced at close".into())
        })
    }

    /// Discards live temp pools, flushes, and closes the file.
    pub fn close(self) -> Result<()> {
        self.into_pool_file()?.close()?;
        Ok(())
    }

    /// Closes the sound and deletes its backing file.
    pub fn discard(self) -> Result<()> {
        let path = self.path().to_path_buf();
        self.into_pool_file()?.close()?;
        std::fs::remove_file(&path)?;
        tracing::info!(path = %path.display(), "removed sound file");
        Ok(())
    }
}

/// True when `a` and `b` name the same existing file.
///
/// A path that does not exist yet is never the same file as anything.
pub(crate) fn same_file(a: &Path, b: &Path) -> Result<bool> {
    if a == b {
        return Ok(true);
    }
    let canonical = |p: &Path| match std::fs::canonicalize(p) {
        Ok(c) => Ok(Some(c)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    };
    Ok(match (canonical(a)?, canonical(b)?) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    })
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".saving");
    path.with_file_name(name)
}

impl std::fmt::Debug for Sound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sound")
            .field("path", &self.path())
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("cues", &self.cues.len())
            .field("modified", &self.is_modified())
            .finish_non_exhaustive()
    }
}

/// Sample access to one channel of a [`Sound`].
///
/// Writes mark the overlapping peak chunks dirty. Length never changes
/// through this type, so holding a size lock is enough to use it.
pub struct ChannelAccessor<'a> {
    channel: usize,
    audio: PoolAccessor<'a, Sample>,
    peaks: PeakCache<'a>,
    modified: &'a AtomicBool,
}

impl ChannelAccessor<'_> {
    /// Channel index.
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Channel length in samples.
    pub fn len(&self) -> Result<u64> {
        Ok(self.audio.len()?)
    }

    /// Always false for a live sound; present for symmetry with `len`.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.audio.is_empty()?)
    }

    /// Reads one sample.
    pub fn get(&self, pos: u64) -> Result<Sample> {
        Ok(self.audio.get(pos)?)
    }

    /// Fills `out` with samples starting at `pos`.
    pub fn read(&self, pos: u64, out: &mut [Sample]) -> Result<()> {
        Ok(self.audio.read(pos, out)?)
    }

    /// Reads `count` samples starting at `pos`.
    pub fn read_vec(&self, pos: u64, count: u64) -> Result<Vec<Sample>> {
        Ok(self.audio.read_vec(pos, count)?)
    }

    /// Overwrites one sample.
    pub fn set(&self, pos: u64, value: Sample) -> Result<()> {
        self.write(pos, &[value])
    }

    /// Overwrites samples starting at `pos`.
    pub fn write(&self, pos: u64, values: &[Sample]) -> Result<()> {
        self.audio.write(pos, values)?;
        self.touched(pos, values.len() as u64)
    }

    /// Silences `[pos, pos + count)`.
    pub fn zero(&self, pos: u64, count: u64) -> Result<()> {
        self.audio.zero(pos, count)?;
        self.touched(pos, count)
    }

    fn touched(&self, pos: u64, count: u64) -> Result<()> {
        self.modified.store(true, Ordering::Relaxed);
        self.peaks.invalidate(pos, pos.saturating_add(count))
    }
}

impl std::fmt::Debug for ChannelAccessor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelAccessor")
            .field("channel", &self.channel)
            .field("pool", &self.audio.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> EngineConfig {
        EngineConfig {
            block_size: 4096,
            peak_chunk_size: 64,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn create_enforces_one_sample_floor() {
        let dir = TempDir::new().unwrap();
        let sound = Sound::create(dir.path().join("a.seg"), 2, 8000, 0, &config()).unwrap();
        assert_eq!(sound.length().unwrap(), 1);
        assert_eq!(sound.channel_count(), 2);
        assert!(!sound.is_modified());
    }

    #[test]
    fn create_rejects_bad_channel_counts() {
        let dir = TempDir::new().unwrap();
        for n in [0, 9] {
            assert!(matches!(
                Sound::create(dir.path().join("b.seg"), n, 8000, 10, &config()),
                Err(Error::TooManyChannels { limit: 8, .. })
            ));
        }
    }

    #[test]
    fn pool_layout_uses_well_known_names() {
        let dir = TempDir::new().unwrap();
        let sound = Sound::create(dir.path().join("c.seg"), 2, 8000, 10, &config()).unwrap();
        let names = sound.pool_names();
        for expected in [
            "Channel 1",
            "Channel 2",
            "Cues",
            "Format Info",
            "PeakChunk 1",
            "PeakChunk 2",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[test]
    fn accessor_writes_mark_modified_and_dirty_peaks() {
        let dir = TempDir::new().unwrap();
        let sound = Sound::create(dir.path().join("d.seg"), 1, 8000, 256, &config()).unwrap();
        assert_eq!(sound.get_peak(0, 0, 256).unwrap().max, 0.0);

        let audio = sound.get_audio(0).unwrap();
        audio.set(100, 0.5).unwrap();
        audio.set(200, -0.25).unwrap();
        assert!(sound.is_modified());
        let peak = sound.get_peak(0, 0, 256).unwrap();
        assert_eq!((peak.min, peak.max), (-0.25, 0.5));
        assert!(matches!(
            sound.get_audio(1),
            Err(Error::InvalidChannel { channel: 1, channels: 1 })
        ));
    }

    #[test]
    fn cue_edits_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("e.seg");
        {
            let mut sound = Sound::create(&path, 1, 8000, 1000, &config()).unwrap();
            sound.add_cue("verse", 100, false).unwrap();
            let chorus = sound.add_cue("chorus", 500, true).unwrap();
            sound.set_cue_name(chorus, "hook").unwrap();
            assert!(matches!(
                sound.add_cue("late", 1001, false),
                Err(Error::CueOutOfRange { .. })
            ));
            sound.close().unwrap();
        }
        let sound = Sound::open(&path, &config()).unwrap();
        assert_eq!(sound.cue_count(), 2);
        assert_eq!(sound.cue(1).unwrap(), &Cue::new("hook", 500, true).unwrap());
        assert_eq!(sound.find_cue_by_name("verse"), Some(0));
        assert_eq!(sound.find_next_cue(100), Some(1));
    }

    #[test]
    fn open_rejects_plain_pool_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.seg");
        PoolFile::create(&path, store_options(&config()))
            .unwrap()
            .close()
            .unwrap();
        assert!(matches!(
            Sound::open(&path, &config()),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn open_rebuilds_missing_peaks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.seg");
        {
            let sound = Sound::create(&path, 1, 8000, 300, &config()).unwrap();
            sound.get_audio(0).unwrap().set(10, 0.9).unwrap();
            sound.pool_file().remove_pool("PeakChunk 1").unwrap();
            sound.close().unwrap();
        }
        let sound = Sound::open(&path, &config()).unwrap();
        assert_eq!(sound.pool_file().pool_len("PeakChunk 1").unwrap(), 5);
        assert_eq!(sound.get_peak(0, 0, 300).unwrap().max, 0.9);
    }

    #[test]
    fn save_through_aliased_own_path_flushes_in_place() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let path = dir.path().join("h.seg");
        let alias = dir.path().join("sub").join("..").join("h.seg");
        let sound = Sound::create(&path, 1, 8000, 100, &config()).unwrap();
        sound.get_audio(0).unwrap().set(42, 0.5).unwrap();

        assert!(same_file(&alias, &path).unwrap());
        sound.save(&alias).unwrap();
        assert!(!sound.is_modified());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
        assert_eq!(sound.get_audio(0).unwrap().get(42).unwrap(), 0.5);
        sound.close().unwrap();

        let reopened = Sound::open(&path, &config()).unwrap();
        assert_eq!(reopened.get_audio(0).unwrap().get(42).unwrap(), 0.5);
    }

    #[test]
    fn save_to_new_path_leaves_no_staging_file() {
        let dir = TempDir::new().unwrap();
        let sound = Sound::create(dir.path().join("i.seg"), 1, 8000, 100, &config()).unwrap();
        let target = dir.path().join("copy.seg");
        assert!(!same_file(&target, sound.path()).unwrap());
        sound.save(&target).unwrap();
        assert!(target.exists());
        assert!(!staging_path(&target).exists());
        assert_eq!(staging_path(&target).file_name().unwrap(), "copy.seg.saving");
    }

    #[test]
    fn store_stats_and_pool_names_are_public() {
        let dir = TempDir::new().unwrap();
        let sound = Sound::create(dir.path().join("j.seg"), 2, 8000, 10, &config()).unwrap();
        assert!(sound.store_stats().total_blocks > 0);
        assert_eq!(sound.pool_names(), sound.pool_file().pool_names());
    }

    #[test]
    fn discard_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("g.seg");
        let sound = Sound::create(&path, 1, 8000, 10, &config()).unwrap();
        sound.discard().unwrap();
        assert!(!path.exists());
    }
}
