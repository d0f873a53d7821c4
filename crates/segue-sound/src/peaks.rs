//! Cached per-chunk min/max summaries of channel audio.
//!
//! Each channel has a peak pool with one [`PeakChunk`] per `chunk_size`
//! samples (the last chunk may be partial). Entries are recomputed lazily:
//! edits only mark them dirty, and [`PeakCache::peak`] refreshes whatever a
//! query touches.
//!
//! Refreshing a chunk and dirtying it are serialized by one lock, so a
//! write that lands while a chunk is being rescanned always leaves that
//! chunk dirty afterwards.

use parking_lot::Mutex;
use segue_store::{PoolAccessor, PoolElement, PoolFile};

use crate::sound::Sample;
use crate::{Error, Result};

/// Minimum and maximum sample over a range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Smallest sample value.
    pub min: Sample,
    /// Largest sample value.
    pub max: Sample,
}

impl Peak {
    const EMPTY: Peak = Peak {
        min: Sample::INFINITY,
        max: Sample::NEG_INFINITY,
    };

    fn include(&mut self, other: Peak) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    fn of(samples: &[Sample]) -> Peak {
        let mut peak = Peak::EMPTY;
        for &s in samples {
            peak.min = peak.min.min(s);
            peak.max = peak.max.max(s);
        }
        peak
    }
}

/// One persisted peak entry.
///
/// Encoded as `min: f32`, `max: f32`, then a byte that is 1 when the entry
/// is current. A zero-filled entry therefore reads as dirty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakChunk {
    /// Smallest sample in the chunk.
    pub min: Sample,
    /// Largest sample in the chunk.
    pub max: Sample,
    /// Set when the chunk's audio changed since `min`/`max` were computed.
    pub dirty: bool,
}

impl PeakChunk {
    const DIRTY: PeakChunk = PeakChunk {
        min: 0.0,
        max: 0.0,
        dirty: true,
    };

    fn from_peak(peak: Peak) -> Self {
        Self {
            min: peak.min,
            max: peak.max,
            dirty: false,
        }
    }

    fn peak(self) -> Peak {
        Peak {
            min: self.min,
            max: self.max,
        }
    }
}

impl Default for PeakChunk {
    fn default() -> Self {
        Self::DIRTY
    }
}

impl PoolElement for PeakChunk {
    const SIZE: usize = 9;

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.min.to_le_bytes());
        out[4..8].copy_from_slice(&self.max.to_le_bytes());
        out[8] = u8::from(!self.dirty);
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut min = [0u8; 4];
        let mut max = [0u8; 4];
        min.copy_from_slice(&bytes[0..4]);
        max.copy_from_slice(&bytes[4..8]);
        Self {
            min: f32::from_le_bytes(min),
            max: f32::from_le_bytes(max),
            dirty: bytes[8] == 0,
        }
    }
}

/// Number of peak entries covering `len` samples.
pub(crate) fn chunk_count(len: u64, chunk_size: u64) -> u64 {
    len.div_ceil(chunk_size)
}

/// Peak maintenance for one channel.
#[derive(Debug)]
pub(crate) struct PeakCache<'a> {
    file: &'a PoolFile,
    audio: String,
    peaks: String,
    chunk: u64,
    lock: &'a Mutex<()>,
}

impl<'a> PeakCache<'a> {
    pub fn new(
        file: &'a PoolFile,
        audio: impl Into<String>,
        peaks: impl Into<String>,
        chunk_size: u32,
        lock: &'a Mutex<()>,
    ) -> Self {
        Self {
            file,
            audio: audio.into(),
            peaks: peaks.into(),
            chunk: u64::from(chunk_size.max(1)),
            lock,
        }
    }

    fn audio(&self) -> Result<PoolAccessor<'a, Sample>> {
        Ok(self.file.accessor::<Sample>(&self.audio)?)
    }

    fn entries(&self) -> Result<PoolAccessor<'a, PeakChunk>> {
        Ok(self.file.accessor::<PeakChunk>(&self.peaks)?)
    }

    /// Min/max over `[start, stop)`, refreshing dirty chunks that the range
    /// fully covers. `stop <= start` queries the single sample at `start`.
    pub fn peak(&self, start: u64, stop: u64) -> Result<Peak> {
        let audio = self.audio()?;
        let len = audio.len()?;
        if start >= len {
            return Err(segue_store::Error::OutOfRange {
                pos: start,
                count: 1,
                len,
            }
            .into());
        }
        let stop = stop.max(start + 1).min(len);
        let first = start / self.chunk;
        let last = (stop - 1) / self.chunk;

        let entries = self.entries()?;
        let mut cached = entries.read_vec(first, last - first + 1)?;
        let mut result = Peak::EMPTY;
        for (i, entry) in cached.iter_mut().enumerate() {
            let c = first + i as u64;
            let c_start = c * self.chunk;
            let c_stop = (c_start + self.chunk).min(len);
            if start <= c_start && stop >= c_stop {
                if entry.dirty {
                    *entry = self.refresh(&audio, &entries, c, c_start, c_stop)?;
                }
                result.include(entry.peak());
            } else {
                result.include(scan(&audio, start.max(c_start), stop.min(c_stop))?);
            }
        }
        Ok(result)
    }

    fn refresh(
        &self,
        audio: &PoolAccessor<'_, Sample>,
        entries: &PoolAccessor<'_, PeakChunk>,
        c: u64,
        c_start: u64,
        c_stop: u64,
    ) -> Result<PeakChunk> {
        let _guard = self.lock.lock();
        let current = entries.get(c)?;
        if !current.dirty {
            return Ok(current);
        }
        let fresh = PeakChunk::from_peak(self.recompute(audio, c_start, c_stop)?);
        entries.set(c, fresh)?;
        Ok(fresh)
    }

    fn recompute(&self, audio: &PoolAccessor<'_, Sample>, start: u64, stop: u64) -> Result<Peak> {
        match scan(audio, start, stop) {
            Err(Error::Store(segue_store::Error::Io(e))) => {
                tracing::warn!(pool = %self.audio, start, error = %e, "peak read failed, retrying");
                scan(audio, start, stop)
            }
            other => other,
        }
    }

    /// Marks every chunk overlapping `[start, stop)` dirty.
    pub fn invalidate(&self, start: u64, stop: u64) -> Result<()> {
        let entries = self.entries()?;
        let count = entries.len()?;
        let first = start / self.chunk;
        let end = chunk_count(stop, self.chunk).min(count);
        if first >= end {
            return Ok(());
        }
        let _guard = self.lock.lock();
        Ok(entries.write(first, &vec![PeakChunk::DIRTY; (end - first) as usize])?)
    }

    /// Marks every chunk dirty.
    pub fn invalidate_all(&self) -> Result<()> {
        self.invalidate(0, u64::MAX)
    }

    /// Resizes the peak pool to match the audio and marks everything dirty.
    pub fn rebuild(&self) -> Result<()> {
        let len = self.audio()?.len()?;
        self.resize(len)?;
        self.invalidate_all()
    }

    fn resize(&self, audio_len: u64) -> Result<()> {
        Ok(self
            .entries()?
            .set_len(chunk_count(audio_len, self.chunk), true)?)
    }

    /// Updates the peak pool after `count` samples were inserted at `pos`.
    ///
    /// Chunk-aligned inserts splice in fresh dirty entries; anything else
    /// dirties from `pos` to the end.
    pub fn after_insert(&self, pos: u64, count: u64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        if pos % self.chunk == 0 && count % self.chunk == 0 {
            return Ok(self
                .entries()?
                .insert(pos / self.chunk, count / self.chunk, true)?);
        }
        let len = self.audio()?.len()?;
        self.resize(len)?;
        self.invalidate(pos, len)
    }

    /// Updates the peak pool after `[pos, pos + count)` was removed.
    pub fn after_remove(&self, pos: u64, count: u64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        if pos % self.chunk == 0 && count % self.chunk == 0 {
            return Ok(self.entries()?.remove(pos / self.chunk, count / self.chunk)?);
        }
        let len = self.audio()?.len()?;
        self.resize(len)?;
        self.invalidate(pos, len)
    }
}

fn scan(audio: &PoolAccessor<'_, Sample>, start: u64, stop: u64) -> Result<Peak> {
    const BUF: u64 = 4096;
    let mut peak = Peak::EMPTY;
    let mut buf = vec![0.0; BUF.min(stop - start) as usize];
    let mut at = start;
    while at < stop {
        let n = BUF.min(stop - at) as usize;
        audio.read(at, &mut buf[..n])?;
        peak.include(Peak::of(&buf[..n]));
        at += n as u64;
    }
    Ok(peak)
}

#[cfg(test)]
mod tests {
    use super::*;
    use segue_store::StoreOptions;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use tempfile::TempDir;

    static LOCK: Mutex<()> = parking_lot::const_mutex(());

    fn setup(dir: &TempDir, samples: &[Sample]) -> PoolFile {
        let file = PoolFile::create(
            dir.path().join("p.seg"),
            StoreOptions {
                block_size: 256,
                cache_blocks: 8,
            },
        )
        .unwrap();
        file.create_or_open::<Sample>("a")
            .unwrap()
            .append_values(samples)
            .unwrap();
        file.create_pool("p", PeakChunk::SIZE as u32).unwrap();
        PeakCache::new(&file, "a", "p", 4, &LOCK).rebuild().unwrap();
        file
    }

    #[test]
    fn zero_filled_entry_is_dirty() {
        assert!(PeakChunk::decode(&[0u8; 9]).dirty);
        assert!(PeakChunk::default().dirty);
    }

    #[test]
    fn full_and_partial_chunks() {
        let dir = TempDir::new().unwrap();
        let samples: Vec<Sample> = (0..10).map(|i| i as Sample).collect();
        let file = setup(&dir, &samples);
        let cache = PeakCache::new(&file, "a", "p", 4, &LOCK);

        assert_eq!(file.pool_len("p").unwrap(), 3);
        assert_eq!(cache.peak(0, 10).unwrap(), Peak { min: 0.0, max: 9.0 });
        assert_eq!(cache.peak(2, 6).unwrap(), Peak { min: 2.0, max: 5.0 });
        assert_eq!(cache.peak(7, 7).unwrap(), Peak { min: 7.0, max: 7.0 });
        assert!(cache.peak(10, 11).is_err());

        let entries = file.accessor::<PeakChunk>("p").unwrap();
        assert!(!entries.get(0).unwrap().dirty);
        assert!(!entries.get(2).unwrap().dirty);
    }

    #[test]
    fn write_then_invalidate_reflects_new_data() {
        let dir = TempDir::new().unwrap();
        let file = setup(&dir, &[0.0; 8]);
        let cache = PeakCache::new(&file, "a", "p", 4, &LOCK);
        assert_eq!(cache.peak(0, 8).unwrap().max, 0.0);

        file.accessor::<Sample>("a").unwrap().set(5, 0.75).unwrap();
        cache.invalidate(5, 6).unwrap();
        assert_eq!(cache.peak(0, 8).unwrap().max, 0.75);
    }

    #[test]
    fn aligned_insert_splices_entries() {
        let dir = TempDir::new().unwrap();
        let file = setup(&dir, &[1.0; 8]);
        let cache = PeakCache::new(&file, "a", "p", 4, &LOCK);
        cache.peak(0, 8).unwrap();

        file.insert("a", 4, 4, true).unwrap();
        cache.after_insert(4, 4).unwrap();
        let entries = file.accessor::<PeakChunk>("p").unwrap();
        assert_eq!(entries.len().unwrap(), 3);
        assert!(!entries.get(0).unwrap().dirty);
        assert!(entries.get(1).unwrap().dirty);
        assert!(!entries.get(2).unwrap().dirty);
        assert_eq!(cache.peak(4, 8).unwrap(), Peak { min: 0.0, max: 0.0 });
    }

    #[test]
    fn unaligned_remove_dirties_tail() {
        let dir = TempDir::new().unwrap();
        let file = setup(&dir, &[0.5; 12]);
        let cache = PeakCache::new(&file, "a", "p", 4, &LOCK);
        cache.peak(0, 12).unwrap();

        file.delete("a", 1, 6).unwrap();
        cache.after_remove(1, 6).unwrap();
        let entries = file.accessor::<PeakChunk>("p").unwrap();
        assert_eq!(entries.len().unwrap(), 2);
        assert!(entries.get(0).unwrap().dirty);
        assert_eq!(cache.peak(0, 6).unwrap(), Peak { min: 0.5, max: 0.5 });
    }

    #[test]
    fn refresh_racing_writer_never_leaves_stale_clean_entry() {
        let dir = TempDir::new().unwrap();
        let len = 8192;
        let file = setup(&dir, &vec![0.0; len]);
        let lock = Mutex::new(());
        PeakCache::new(&file, "a", "p", len as u32, &lock)
            .rebuild()
            .unwrap();
        let done = AtomicBool::new(false);

        thread::scope(|s| {
            s.spawn(|| {
                let cache = PeakCache::new(&file, "a", "p", len as u32, &lock);
                while !done.load(Ordering::Relaxed) {
                    cache.peak(0, len as u64).unwrap();
                }
            });
            let cache = PeakCache::new(&file, "a", "p", len as u32, &lock);
            let audio = file.accessor::<Sample>("a").unwrap();
            for i in 1..=200u64 {
                let pos = (i * 37) % len as u64;
                audio.set(pos, i as Sample).unwrap();
                cache.invalidate(pos, pos + 1).unwrap();
                assert!(cache.peak(0, len as u64).unwrap().max >= i as Sample);
            }
            done.store(true, Ordering::Relaxed);
        });

        let cache = PeakCache::new(&file, "a", "p", len as u32, &lock);
        assert_eq!(cache.peak(0, len as u64).unwrap().max, 200.0);
    }
}
