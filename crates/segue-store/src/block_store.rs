//! Fixed-size block file with a free list, write-back cache, and crash-safe flush.
//!
//! # Layout
//!
//! ```text
//! block 0        header (first 64 bytes used)
//! block 1..N     data blocks owned by pools, or metadata chain blocks
//! ```
//!
//! The header records the signature, format version, block size, block
//! count, and where the metadata chain starts. Metadata (free list plus the
//! opaque catalog supplied by the pool layer) is always written to freshly
//! allocated blocks and the header is rewritten last, so an interrupted
//! flush leaves the previous header pointing at the previous, intact
//! metadata.
//!
//! Blocks released with [`BlockStore::free`] are parked until the next
//! flush before they can be handed out again. Until that flush the durable
//! catalog may still reference them.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec::{
    ByteReader, ByteWriter, checksum64, read_u32_at, read_u64_at, write_u32_at, write_u64_at,
};
use crate::{Error, Result};

/// Identifier of a block inside a [`BlockStore`]. Block 0 is the header.
pub type BlockId = u64;

/// File signature stored in the first eight bytes of every pool file.
pub const SIGNATURE: [u8; 8] = *b"SEGUEPF\0";

/// Newest on-disk format version this build reads and writes.
pub const FORMAT_VERSION: u32 = 1;

/// Block size used when none is configured.
pub const DEFAULT_BLOCK_SIZE: u32 = 32768;

/// Number of blocks kept in the write-back cache when none is configured.
pub const DEFAULT_CACHE_BLOCKS: usize = 64;

const MIN_BLOCK_SIZE: u32 = 128;
const MAX_BLOCK_SIZE: u32 = 1 << 24;
const HEADER_LEN: usize = 64;
const CHAIN_LINK_LEN: usize = 8;

/// Tunables for creating or opening a [`BlockStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Block size in bytes. Must be a power of two. Ignored on open, where
    /// the size recorded in the file wins.
    pub block_size: u32,
    /// Maximum number of blocks held in memory.
    pub cache_blocks: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            cache_blocks: DEFAULT_CACHE_BLOCKS,
        }
    }
}

/// Snapshot of block usage, for diagnostics and the CLI `info` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Block size in bytes.
    pub block_size: u32,
    /// Blocks in the file, including the header block.
    pub total_blocks: u64,
    /// Blocks available for allocation right now.
    pub free_blocks: u64,
    /// Blocks released since the last flush.
    pub pending_free_blocks: u64,
    /// Blocks holding the durable metadata chain.
    pub metadata_blocks: u64,
    /// Blocks currently resident in the cache.
    pub cached_blocks: u64,
    /// Number of completed flushes over the life of the file.
    pub generation: u64,
}

struct CachedBlock {
    data: Box<[u8]>,
    dirty: bool,
}

#[derive(Debug, Clone, Copy)]
struct Header {
    block_size: u32,
    block_count: u64,
    meta_head: BlockId,
    meta_len: u64,
    meta_checksum: u64,
    generation: u64,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..8].copy_from_slice(&SIGNATURE);
        write_u32_at(&mut buf, 8, FORMAT_VERSION);
        write_u32_at(&mut buf, 12, self.block_size);
        write_u64_at(&mut buf, 16, self.block_count);
        write_u64_at(&mut buf, 24, self.meta_head);
        write_u64_at(&mut buf, 32, self.meta_len);
        write_u64_at(&mut buf, 40, self.meta_checksum);
        write_u64_at(&mut buf, 48, self.generation);
        let checksum = checksum64(&buf[0..56]);
        write_u64_at(&mut buf, 56, checksum);
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::corrupt("file is shorter than the header"));
        }
        if buf[0..8] != SIGNATURE {
            return Err(Error::corrupt("bad signature"));
        }
        let version = read_u32_at(buf, 8);
        if version > FORMAT_VERSION {
            return Err(Error::IncompatibleVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }
        if read_u64_at(buf, 56) != checksum64(&buf[0..56]) {
            return Err(Error::corrupt("header checksum mismatch"));
        }
        let header = Self {
            block_size: read_u32_at(buf, 12),
            block_count: read_u64_at(buf, 16),
            meta_head: read_u64_at(buf, 24),
            meta_len: read_u64_at(buf, 32),
            meta_checksum: read_u64_at(buf, 40),
            generation: read_u64_at(buf, 48),
        };
        if !valid_block_size(header.block_size) {
            return Err(Error::corrupt(format!(
                "invalid block size {}",
                header.block_size
            )));
        }
        if header.block_count == 0 || header.meta_head >= header.block_count {
            return Err(Error::corrupt("metadata head outside of file"));
        }
        Ok(header)
    }
}

fn valid_block_size(size: u32) -> bool {
    size.is_power_of_two() && (MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&size)
}

/// A file carved into equal-size blocks.
///
/// The store knows nothing about pools; it hands out block ids, performs
/// raw block I/O, and persists a free list plus an opaque catalog blob on
/// [`flush`](BlockStore::flush).
pub struct BlockStore {
    path: PathBuf,
    file: File,
    block_size: u32,
    block_count: u64,
    free: BTreeSet<BlockId>,
    pending_free: Vec<BlockId>,
    meta_blocks: Vec<BlockId>,
    catalog: Vec<u8>,
    generation: u64,
    cache: HashMap<BlockId, CachedBlock>,
    order: VecDeque<BlockId>,
    cache_capacity: usize,
}

impl BlockStore {
    /// Creates a new, empty block file at `path`, truncating any existing file.
    pub fn create(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        if !valid_block_size(options.block_size) {
            return Err(Error::InvalidBlockSize(options.block_size));
        }
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let mut store = Self {
            path,
            file,
            block_size: options.block_size,
            block_count: 1,
            free: BTreeSet::new(),
            pending_free: Vec::new(),
            meta_blocks: Vec::new(),
            catalog: Vec::new(),
            generation: 0,
            cache: HashMap::new(),
            order: VecDeque::new(),
            cache_capacity: options.cache_blocks.max(1),
        };
        store.flush(&[])?;
        tracing::info!(path = %store.path.display(), block_size = store.block_size, "created block store");
        Ok(store)
    }

    /// Opens and validates an existing block file.
    ///
    /// Fails with [`Error::CorruptFile`] on a signature, checksum, or
    /// structural mismatch and with [`Error::IncompatibleVersion`] when the
    /// file was written by a newer format version.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut head = [0u8; HEADER_LEN];
        let file_len = file.metadata()?.len();
        if file_len < HEADER_LEN as u64 {
            return Err(Error::corrupt("file is shorter than the header"));
        }
        file.read_exact(&mut head)?;
        let header = Header::decode(&head)?;

        let mut store = Self {
            path,
            file,
            block_size: header.block_size,
            block_count: header.block_count,
            free: BTreeSet::new(),
            pending_free: Vec::new(),
            meta_blocks: Vec::new(),
            catalog: Vec::new(),
            generation: header.generation,
            cache: HashMap::new(),
            order: VecDeque::new(),
            cache_capacity: options.cache_blocks.max(1),
        };
        store.load_metadata(&header)?;
        tracing::info!(
            path = %store.path.display(),
            blocks = store.block_count,
            generation = store.generation,
            "opened block store"
        );
        Ok(store)
    }

    fn load_metadata(&mut self, header: &Header) -> Result<()> {
        let payload_per_block = self.block_size as usize - CHAIN_LINK_LEN;
        let mut bytes = Vec::with_capacity(header.meta_len as usize);
        let mut next = header.meta_head;
        let mut seen = BTreeSet::new();
        let mut block = vec![0u8; self.block_size as usize];

        while next != 0 {
            if next >= self.block_count || !seen.insert(next) {
                return Err(Error::corrupt("metadata chain is broken"));
            }
            self.read_raw(next, &mut block)?;
            self.meta_blocks.push(next);
            let want = (header.meta_len as usize - bytes.len()).min(payload_per_block);
            bytes.extend_from_slice(&block[CHAIN_LINK_LEN..CHAIN_LINK_LEN + want]);
            next = read_u64_at(&block, 0);
        }
        if bytes.len() as u64 != header.meta_len {
            return Err(Error::corrupt("metadata chain shorter than recorded"));
        }
        if checksum64(&bytes) != header.meta_checksum {
            return Err(Error::corrupt("metadata checksum mismatch"));
        }

        let mut r = ByteReader::new(&bytes);
        let free_count = r.get_u64()?;
        for _ in 0..free_count {
            let id = r.get_u64()?;
            if id == 0 || id >= self.block_count || seen.contains(&id) {
                return Err(Error::corrupt(format!("free list holds invalid block {id}")));
            }
            self.free.insert(id);
        }
        let catalog_len = r.get_u64()? as usize;
        self.catalog = r.get_bytes(catalog_len)?.to_vec();
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block size in bytes.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Total blocks in the file, including the header block.
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// The catalog blob persisted by the last flush (or loaded on open).
    pub fn catalog(&self) -> &[u8] {
        &self.catalog
    }

    /// Returns whether `id` is currently on the free list or pending release.
    pub fn is_free(&self, id: BlockId) -> bool {
        self.free.contains(&id) || self.pending_free.contains(&id)
    }

    /// Returns whether `id` holds part of the durable metadata chain.
    pub fn is_metadata(&self, id: BlockId) -> bool {
        self.meta_blocks.contains(&id)
    }

    /// Current block usage.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            block_size: self.block_size,
            total_blocks: self.block_count,
            free_blocks: self.free.len() as u64,
            pending_free_blocks: self.pending_free.len() as u64,
            metadata_blocks: self.meta_blocks.len() as u64,
            cached_blocks: self.cache.len() as u64,
            generation: self.generation,
        }
    }

    /// Hands out `n` blocks, reusing free blocks first and growing the file
    /// for the remainder.
    pub fn allocate(&mut self, n: usize) -> Vec<BlockId> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            match self.free.pop_first() {
                Some(id) => out.push(id),
                None => break,
            }
        }
        while out.len() < n {
            out.push(self.block_count);
            self.block_count += 1;
        }
        out
    }

    /// Returns blocks to the store. Their contents are not zeroed, and they
    /// become allocatable again after the next flush.
    pub fn free(&mut self, ids: &[BlockId]) {
        for &id in ids {
            self.cache.remove(&id);
            self.pending_free.push(id);
        }
    }

    fn check_io(&self, id: BlockId, offset: usize, len: usize) -> Result<()> {
        if id == 0 || id >= self.block_count {
            return Err(Error::InvalidBlock(id));
        }
        if offset + len > self.block_size as usize {
            return Err(Error::OutOfRange {
                pos: offset as u64,
                count: len as u64,
                len: self.block_size as u64,
            });
        }
        Ok(())
    }

    /// Copies `buf.len()` bytes starting at `offset` within block `id` into `buf`.
    pub fn read(&mut self, id: BlockId, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.check_io(id, offset, buf.len())?;
        let block = self.cached(id, false)?;
        buf.copy_from_slice(&block.data[offset..offset + buf.len()]);
        Ok(())
    }

    /// Writes `bytes` at `offset` within block `id`.
    pub fn write(&mut self, id: BlockId, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check_io(id, offset, bytes.len())?;
        let whole = offset == 0 && bytes.len() == self.block_size as usize;
        let block = self.cached(id, whole)?;
        block.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        block.dirty = true;
        Ok(())
    }

    /// Fills `len` bytes at `offset` within block `id` with zeros.
    pub fn zero(&mut self, id: BlockId, offset: usize, len: usize) -> Result<()> {
        self.check_io(id, offset, len)?;
        let whole = offset == 0 && len == self.block_size as usize;
        let block = self.cached(id, whole)?;
        block.data[offset..offset + len].fill(0);
        block.dirty = true;
        Ok(())
    }

    /// Returns the cache entry for `id`, loading it from disk unless
    /// `overwrite` says the caller is about to replace every byte.
    fn cached(&mut self, id: BlockId, overwrite: bool) -> Result<&mut CachedBlock> {
        if !self.cache.contains_key(&id) {
            self.evict_if_full()?;
            let mut data = vec![0u8; self.block_size as usize].into_boxed_slice();
            if !overwrite {
                self.read_raw(id, &mut data)?;
            }
            self.cache.insert(id, CachedBlock { data, dirty: false });
            self.order.push_back(id);
        }
        self.cache
            .get_mut(&id)
            .ok_or_else(|| Error::corrupt(format!("block {id} vanished from cache")))
    }

    fn evict_if_full(&mut self) -> Result<()> {
        while self.cache.len() >= self.cache_capacity {
            let Some(victim) = self.order.pop_front() else {
                break;
            };
            // Entries freed earlier leave stale ids in the order queue.
            if let Some(block) = self.cache.remove(&victim)
                && block.dirty
            {
                self.write_raw(victim, &block.data)?;
            }
        }
        Ok(())
    }

    /// Reads a whole block straight from disk. Blocks past end-of-file read as zeros.
    fn read_raw(&mut self, id: BlockId, buf: &mut [u8]) -> Result<()> {
        let offset = id * self.block_size as u64;
        let file_len = self.file.metadata()?.len();
        buf.fill(0);
        if offset >= file_len {
            return Ok(());
        }
        let available = ((file_len - offset) as usize).min(buf.len());
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf[..available])?;
        Ok(())
    }

    fn write_raw(&mut self, id: BlockId, data: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(id * self.block_size as u64))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Writes every dirty cached block back to disk without touching metadata.
    pub fn write_back(&mut self) -> Result<()> {
        let mut dirty: Vec<BlockId> = self
            .cache
            .iter()
            .filter(|(_, b)| b.dirty)
            .map(|(&id, _)| id)
            .collect();
        dirty.sort_unstable();
        for id in dirty {
            if let Some(block) = self.cache.get_mut(&id) {
                block.dirty = false;
                let data = block.data.clone();
                self.write_raw(id, &data)?;
            }
        }
        Ok(())
    }

    /// Persists dirty blocks, the free list, and `catalog`.
    ///
    /// Safe to call repeatedly. The new metadata goes to fresh blocks and the
    /// header is rewritten only after those reach disk.
    pub fn flush(&mut self, catalog: &[u8]) -> Result<()> {
        self.write_back()?;

        let old_meta = std::mem::take(&mut self.meta_blocks);
        let payload_per_block = self.block_size as usize - CHAIN_LINK_LEN;
        let releasable = self.pending_free.len() + old_meta.len();
        let upper_bound = 16 + (self.free.len() + releasable) * 8 + catalog.len();
        let needed = upper_bound.div_ceil(payload_per_block).max(1);
        let new_meta = self.allocate(needed);

        let mut freed: BTreeSet<BlockId> = self.free.clone();
        freed.extend(self.pending_free.iter().copied());
        freed.extend(old_meta.iter().copied());

        let mut w = ByteWriter::new();
        w.put_u64(freed.len() as u64);
        for &id in &freed {
            w.put_u64(id);
        }
        w.put_u64(catalog.len() as u64);
        w.put_bytes(catalog);
        let meta = w.into_bytes();

        let mut block = vec![0u8; self.block_size as usize];
        for (i, &id) in new_meta.iter().enumerate() {
            block.fill(0);
            let next = new_meta.get(i + 1).copied().unwrap_or(0);
            write_u64_at(&mut block, 0, next);
            let start = (i * payload_per_block).min(meta.len());
            let end = ((i + 1) * payload_per_block).min(meta.len());
            block[CHAIN_LINK_LEN..CHAIN_LINK_LEN + (end - start)]
                .copy_from_slice(&meta[start..end]);
            self.cache.remove(&id);
            self.write_raw(id, &block)?;
        }

        let wanted_len = self.block_count * self.block_size as u64;
        if self.file.metadata()?.len() < wanted_len {
            self.file.set_len(wanted_len)?;
        }
        self.file.sync_data()?;

        let header = Header {
            block_size: self.block_size,
            block_count: self.block_count,
            meta_head: new_meta[0],
            meta_len: meta.len() as u64,
            meta_checksum: checksum64(&meta),
            generation: self.generation + 1,
        };
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header.encode())?;
        self.file.sync_all()?;

        self.generation = header.generation;
        self.free = freed;
        self.pending_free.clear();
        self.meta_blocks = new_meta;
        self.catalog = catalog.to_vec();
        tracing::debug!(
            generation = self.generation,
            blocks = self.block_count,
            free = self.free.len(),
            "flushed block store"
        );
        Ok(())
    }

    /// Flushes with `catalog` and releases the file handle.
    pub fn close(mut self, catalog: &[u8]) -> Result<()> {
        self.flush(catalog)
    }
}

impl std::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStore")
            .field("path", &self.path)
            .field("block_size", &self.block_size)
            .field("block_count", &self.block_count)
            .field("free", &self.free.len())
            .field("generation", &self.generation)
            .finish()
    }
}
