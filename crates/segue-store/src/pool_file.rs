//! Named, growable typed arrays living inside one [`BlockStore`].
//!
//! [`PoolFile`] is the unit that gets opened, flushed, and closed. Every
//! method takes `&self`; the block store and the pool catalog sit behind one
//! mutex so that a recording thread can write already-allocated samples
//! while another thread reads, with length changes serialized by the
//! caller's own locking.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::accessor::{PoolAccessor, PoolElement};
use crate::block_store::{BlockId, BlockStore, StoreOptions, StoreStats};
use crate::pool::{Extent, PoolEntry, RefCounts, decode_catalog, encode_catalog, release};
use crate::{Error, Result};

struct FileState {
    store: BlockStore,
    pools: BTreeMap<String, PoolEntry>,
    refs: RefCounts,
}

/// A block file hosting any number of named pools.
pub struct PoolFile {
    path: PathBuf,
    options: StoreOptions,
    state: Mutex<FileState>,
}

impl PoolFile {
    /// Creates an empty pool file at `path`, replacing any existing file.
    pub fn create(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let store = BlockStore::create(&path, options)?;
        Ok(Self {
            path,
            options,
            state: Mutex::new(FileState {
                store,
                pools: BTreeMap::new(),
                refs: RefCounts::new(),
            }),
        })
    }

    /// Opens an existing pool file, validating its header and catalog.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let store = BlockStore::open(&path, options)?;
        let (pools, refs) = decode_catalog(store.catalog(), &store)?;
        tracing::debug!(pools = pools.len(), "loaded pool catalog");
        Ok(Self {
            path,
            options,
            state: Mutex::new(FileState { store, pools, refs }),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block size of the backing store.
    pub fn block_size(&self) -> u32 {
        self.state.lock().store.block_size()
    }

    /// Block usage of the backing store.
    pub fn stats(&self) -> StoreStats {
        self.state.lock().store.stats()
    }

    /// Creates an empty pool. Fails if the name is taken.
    pub fn create_pool(&self, name: &str, element_size: u32) -> Result<()> {
        if name.is_empty() || name.len() > u16::MAX as usize {
            return Err(Error::InvalidPoolName(name.to_string()));
        }
        let mut state = self.state.lock();
        if element_size == 0 || element_size > state.store.block_size() {
            return Err(Error::InvalidElementSize(element_size));
        }
        if state.pools.contains_key(name) {
            return Err(Error::PoolExists(name.to_string()));
        }
        state.pools.insert(name.to_string(), PoolEntry::new(element_size));
        tracing::debug!(pool = name, element_size, "created pool");
        Ok(())
    }

    /// Destroys a pool and returns its blocks to the store.
    pub fn remove_pool(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        let FileState { store, pools, refs } = &mut *state;
        let entry = pools
            .remove(name)
            .ok_or_else(|| Error::PoolNotFound(name.to_string()))?;
        let orphaned = release(&entry.extents, refs);
        store.free(&orphaned);
        tracing::debug!(pool = name, blocks = orphaned.len(), "removed pool");
        Ok(())
    }

    /// Returns whether a pool named `name` exists.
    pub fn contains_pool(&self, name: &str) -> bool {
        self.state.lock().pools.contains_key(name)
    }

    /// Names of every pool, in sorted order.
    pub fn pool_names(&self) -> Vec<String> {
        self.state.lock().pools.keys().cloned().collect()
    }

    /// Element count of a pool.
    pub fn pool_len(&self, name: &str) -> Result<u64> {
        let state = self.state.lock();
        Ok(entry(&state.pools, name)?.len)
    }

    /// Element size, in bytes, of a pool.
    pub fn pool_element_size(&self, name: &str) -> Result<u32> {
        let state = self.state.lock();
        Ok(entry(&state.pools, name)?.element_size)
    }

    /// Typed accessor onto a pool. Fails if `T` does not match the pool's element size.
    pub fn accessor<T: PoolElement>(&self, name: &str) -> Result<PoolAccessor<'_, T>> {
        let found = self.pool_element_size(name)?;
        if found as usize != T::SIZE {
            return Err(Error::ElementSizeMismatch {
                pool: name.to_string(),
                expected: T::SIZE as u32,
                found,
            });
        }
        Ok(PoolAccessor::new(self, name))
    }

    /// Creates the pool if missing and returns a typed accessor onto it.
    pub fn create_or_open<T: PoolElement>(&self, name: &str) -> Result<PoolAccessor<'_, T>> {
        if !self.contains_pool(name) {
            self.create_pool(name, T::SIZE as u32)?;
        }
        self.accessor(name)
    }

    /// Grows a pool by `count` elements at `pos`, shifting later elements up.
    ///
    /// With `zero_fill` false the new elements hold whatever the reused
    /// blocks contained.
    pub fn insert(&self, name: &str, pos: u64, count: u64, zero_fill: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.insert(name, pos, count, zero_fill)
    }

    /// Appends `count` elements.
    pub fn append(&self, name: &str, count: u64, zero_fill: bool) -> Result<()> {
        let mut state = self.state.lock();
        let len = entry(&state.pools, name)?.len;
        state.insert(name, len, count, zero_fill)
    }

    /// Removes `[pos, pos + count)`, shifting later elements down.
    pub fn delete(&self, name: &str, pos: u64, count: u64) -> Result<()> {
        let mut state = self.state.lock();
        state.delete(name, pos, count)
    }

    /// Shrinks or grows a pool to exactly `len` elements.
    pub fn set_len(&self, name: &str, len: u64, zero_fill: bool) -> Result<()> {
        let mut state = self.state.lock();
        let current = entry(&state.pools, name)?.len;
        if len < current {
            state.delete(name, len, current - len)
        } else {
            state.insert(name, current, len - current, zero_fill)
        }
    }

    /// Removes every element of a pool.
    pub fn clear_pool(&self, name: &str) -> Result<()> {
        self.set_len(name, 0, false)
    }

    /// Reads `count` raw elements starting at `pos` into `buf`.
    pub fn read_bytes(&self, name: &str, pos: u64, count: u64, buf: &mut [u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.read_bytes(name, pos, count, buf)
    }

    /// Overwrites elements starting at `pos` with the raw bytes in `buf`.
    pub fn write_bytes(&self, name: &str, pos: u64, buf: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.write_bytes(name, pos, buf)
    }

    /// Overwrites `[dst_pos, dst_pos + count)` of `dst` with elements of `src`.
    ///
    /// Overlapping ranges inside one pool behave like `memmove`.
    pub fn copy_data(
        &self,
        dst: &str,
        dst_pos: u64,
        src: &str,
        src_pos: u64,
        count: u64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.copy_data(dst, dst_pos, src, src_pos, count)
    }

    /// Relocates `[src_pos, src_pos + count)` of `src` so it starts at `dst_pos` in `dst`.
    ///
    /// Whole extents change owner without copying. Only fragments sharing a
    /// block with data that stays in `src` are copied. When `src == dst`,
    /// `dst_pos` is measured after the range has been taken out.
    pub fn move_data(
        &self,
        dst: &str,
        dst_pos: u64,
        src: &str,
        src_pos: u64,
        count: u64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.move_data(dst, dst_pos, src, src_pos, count)
    }

    /// Persists all dirty data and the catalog.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        let catalog = encode_catalog(&state.pools);
        state.store.flush(&catalog)
    }

    /// Flushes and closes the file.
    pub fn close(self) -> Result<()> {
        let state = self.state.into_inner();
        let catalog = encode_catalog(&state.pools);
        state.store.close(&catalog)?;
        tracing::info!(path = %self.path.display(), "closed pool file");
        Ok(())
    }

    /// Writes a compacted copy holding only the pools accepted by `keep`.
    ///
    /// Each copied pool occupies consecutive, fully packed blocks.
    pub fn copy_to(&self, path: impl AsRef<Path>, keep: impl Fn(&str) -> bool) -> Result<()> {
        let mut state = self.state.lock();
        state.copy_to(path.as_ref(), self.options, keep)
    }

    /// Rewrites the file with every pool packed into consecutive blocks.
    ///
    /// Logical contents are untouched; only physical placement changes.
    pub fn defragment(&self) -> Result<()> {
        let mut state = self.state.lock();
        let before = state.store.block_count();
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".defrag");
        let tmp = PathBuf::from(tmp);

        state.copy_to(&tmp, self.options, |_| true)?;
        std::fs::rename(&tmp, &self.path)?;
        let store = BlockStore::open(&self.path, self.options)?;
        let (pools, refs) = decode_catalog(store.catalog(), &store)?;
        *state = FileState { store, pools, refs };

        tracing::info!(
            path = %self.path.display(),
            before,
            after = state.store.block_count(),
            "defragmented pool file"
        );
        Ok(())
    }
}

impl std::fmt::Debug for PoolFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolFile").field("path", &self.path).finish()
    }
}

fn entry<'a>(pools: &'a BTreeMap<String, PoolEntry>, name: &str) -> Result<&'a PoolEntry> {
    pools
        .get(name)
        .ok_or_else(|| Error::PoolNotFound(name.to_string()))
}

fn entry_mut<'a>(
    pools: &'a mut BTreeMap<String, PoolEntry>,
    name: &str,
) -> Result<&'a mut PoolEntry> {
    pools
        .get_mut(name)
        .ok_or_else(|| Error::PoolNotFound(name.to_string()))
}

/// Gives every moved fragment that shares a block with elements staying
/// behind a block of its own. Leaves `moved` and `refs` untouched on error.
fn detach_shared(
    store: &mut BlockStore,
    refs: &mut RefCounts,
    moved: &mut [Extent],
    esize: usize,
) -> Result<()> {
    let mut moving: HashMap<BlockId, u32> = HashMap::new();
    for e in moved.iter() {
        *moving.entry(e.block).or_insert(0) += 1;
    }
    let shared: Vec<usize> = moved
        .iter()
        .enumerate()
        .filter(|(_, e)| {
            let total = refs.get(&e.block).copied().unwrap_or(0);
            total > moving.get(&e.block).copied().unwrap_or(0)
        })
        .map(|(i, _)| i)
        .collect();
    if shared.is_empty() {
        return Ok(());
    }

    let fresh = store.allocate(shared.len());
    let mut scratch = Vec::new();
    for (&i, &block) in shared.iter().zip(&fresh) {
        let e = moved[i];
        scratch.resize(e.count as usize * esize, 0);
        let copied = store
            .read(e.block, e.offset as usize * esize, &mut scratch)
            .and_then(|()| store.write(block, 0, &scratch));
        if let Err(err) = copied {
            store.free(&fresh);
            return Err(err);
        }
    }

    for (&i, &block) in shared.iter().zip(&fresh) {
        let e = &mut moved[i];
        if let Some(n) = refs.get_mut(&e.block) {
            *n -= 1;
        }
        refs.insert(block, 1);
        *e = Extent {
            block,
            offset: 0,
            count: e.count,
        };
    }
    Ok(())
}

fn check_range(pos: u64, count: u64, len: u64) -> Result<()> {
    match pos.checked_add(count) {
        Some(end) if end <= len => Ok(()),
        _ => Err(Error::OutOfRange { pos, count, len }),
    }
}

impl FileState {
    fn insert(&mut self, name: &str, pos: u64, count: u64, zero_fill: bool) -> Result<()> {
        let FileState { store, pools, refs } = self;
        let entry = entry_mut(pools, name)?;
        if pos > entry.len {
            return Err(Error::OutOfRange {
                pos,
                count,
                len: entry.len,
            });
        }
        if count == 0 {
            return Ok(());
        }
        let esize = entry.element_size as usize;
        let per_block = entry.per_block(store.block_size());
        let mut remaining = count;
        let mut at = pos;

        // Appends first fill the unused tail of an exclusively owned last block.
        if pos == entry.len
            && let Some(last) = entry.extents.last_mut()
            && refs.get(&last.block) == Some(&1)
            && last.offset + last.count < per_block
        {
            let room = (per_block - last.offset - last.count) as u64;
            let take = room.min(remaining) as u32;
            if zero_fill {
                let start = (last.offset + last.count) as usize * esize;
                store.zero(last.block, start, take as usize * esize)?;
            }
            last.count += take;
            remaining -= take as u64;
            at += take as u64;
            entry.rebuild_starts();
        }

        if remaining > 0 {
            let blocks = store.allocate(remaining.div_ceil(per_block as u64) as usize);
            let mut fresh = Vec::with_capacity(blocks.len());
            for block in blocks {
                let n = remaining.min(per_block as u64) as u32;
                remaining -= n as u64;
                if zero_fill {
                    store.zero(block, 0, n as usize * esize)?;
                }
                refs.insert(block, 1);
                fresh.push(Extent {
                    block,
                    offset: 0,
                    count: n,
                });
            }
            entry.splice_at(at, fresh, refs);
        }
        tracing::trace!(pool = name, pos, count, "inserted");
        Ok(())
    }

    fn delete(&mut self, name: &str, pos: u64, count: u64) -> Result<()> {
        let FileState { store, pools, refs } = self;
        let entry = entry_mut(pools, name)?;
        check_range(pos, count, entry.len)?;
        if count == 0 {
            return Ok(());
        }
        let taken = entry.take_range(pos, count, refs);
        entry.coalesce(refs);
        let orphaned = release(&taken, refs);
        store.free(&orphaned);
        tracing::trace!(pool = name, pos, count, "deleted");
        Ok(())
    }

    /// Calls `f(block, byte_offset, elements, buf_offset)` for each extent piece covering the range.
    fn for_each_piece(
        entry: &PoolEntry,
        pos: u64,
        count: u64,
        mut f: impl FnMut(BlockId, usize, usize, usize) -> Result<()>,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let esize = entry.element_size as usize;
        let (mut idx, mut off) = entry.locate(pos);
        let mut done = 0u64;
        while done < count {
            let e = entry.extents[idx];
            let n = ((e.count - off) as u64).min(count - done) as usize;
            f(
                e.block,
                (e.offset + off) as usize * esize,
                n,
                done as usize * esize,
            )?;
            done += n as u64;
            idx += 1;
            off = 0;
        }
        Ok(())
    }

    fn read_bytes(&mut self, name: &str, pos: u64, count: u64, buf: &mut [u8]) -> Result<()> {
        let FileState { store, pools, .. } = self;
        let entry = entry(pools, name)?;
        check_range(pos, count, entry.len)?;
        let esize = entry.element_size as usize;
        if buf.len() < count as usize * esize {
            return Err(Error::OutOfRange {
                pos: 0,
                count: count * esize as u64,
                len: buf.len() as u64,
            });
        }
        Self::for_each_piece(entry, pos, count, |block, byte_off, n, buf_off| {
            store.read(block, byte_off, &mut buf[buf_off..buf_off + n * esize])
        })
    }

    fn write_bytes(&mut self, name: &str, pos: u64, buf: &[u8]) -> Result<()> {
        let FileState { store, pools, .. } = self;
        let entry = entry(pools, name)?;
        let esize = entry.element_size as usize;
        if buf.len() % esize != 0 {
            return Err(Error::PartialElement {
                pool: name.to_string(),
                len: buf.len(),
                element_size: entry.element_size,
            });
        }
        let count = (buf.len() / esize) as u64;
        check_range(pos, count, entry.len)?;
        Self::for_each_piece(entry, pos, count, |block, byte_off, n, buf_off| {
            store.write(block, byte_off, &buf[buf_off..buf_off + n * esize])
        })
    }

    fn same_element_size(&self, a: &str, b: &str) -> Result<u32> {
        let ea = entry(&self.pools, a)?.element_size;
        let eb = entry(&self.pools, b)?.element_size;
        if ea != eb {
            return Err(Error::ElementSizeMismatch {
                pool: a.to_string(),
                expected: eb,
                found: ea,
            });
        }
        Ok(ea)
    }

    fn copy_data(
        &mut self,
        dst: &str,
        dst_pos: u64,
        src: &str,
        src_pos: u64,
        count: u64,
    ) -> Result<()> {
        let esize = self.same_element_size(dst, src)? as usize;
        check_range(src_pos, count, entry(&self.pools, src)?.len)?;
        check_range(dst_pos, count, entry(&self.pools, dst)?.len)?;
        if count == 0 || (dst == src && dst_pos == src_pos) {
            return Ok(());
        }

        let chunk = (self.store.block_size() as usize / esize).max(1) as u64;
        let mut buf = vec![0u8; chunk as usize * esize];
        let backwards = dst == src && dst_pos > src_pos;
        let mut done = 0u64;
        while done < count {
            let n = chunk.min(count - done);
            let off = if backwards { count - done - n } else { done };
            let bytes = &mut buf[..n as usize * esize];
            self.read_bytes(src, src_pos + off, n, bytes)?;
            self.write_bytes(dst, dst_pos + off, bytes)?;
            done += n;
        }
        Ok(())
    }

    fn move_data(
        &mut self,
        dst: &str,
        dst_pos: u64,
        src: &str,
        src_pos: u64,
        count: u64,
    ) -> Result<()> {
        let esize = self.same_element_size(dst, src)? as usize;
        let src_len = entry(&self.pools, src)?.len;
        check_range(src_pos, count, src_len)?;
        let dst_len = if dst == src {
            src_len - count
        } else {
            entry(&self.pools, dst)?.len
        };
        if dst_pos > dst_len {
            return Err(Error::OutOfRange {
                pos: dst_pos,
                count,
                len: dst_len,
            });
        }
        if count == 0 {
            return Ok(());
        }

        let FileState { store, pools, refs } = self;
        let mut moved = entry_mut(pools, src)?.take_range(src_pos, count, refs);
        entry_mut(pools, src)?.coalesce(refs);

        if dst != src
            && let Err(e) = detach_shared(store, refs, &mut moved, esize)
        {
            entry_mut(pools, src)?.splice_at(src_pos, moved, refs);
            return Err(e);
        }

        entry_mut(pools, dst)?.splice_at(dst_pos, moved, refs);
        tracing::trace!(src, dst, src_pos, dst_pos, count, "moved extents");
        Ok(())
    }

    fn copy_to(
        &mut self,
        path: &Path,
        options: StoreOptions,
        keep: impl Fn(&str) -> bool,
    ) -> Result<()> {
        let block_size = self.store.block_size();
        let mut out = BlockStore::create(
            path,
            StoreOptions {
                block_size,
                ..options
            },
        )?;
        let mut out_pools = BTreeMap::new();
        let names: Vec<String> = self.pools.keys().filter(|n| keep(n.as_str())).cloned().collect();
        let mut buf = vec![0u8; block_size as usize];

        for name in names {
            let (element_size, len) = {
                let e = entry(&self.pools, &name)?;
                (e.element_size, e.len)
            };
            let mut packed = PoolEntry::new(element_size);
            let per_block = packed.per_block(block_size) as u64;
            let blocks = out.allocate(len.div_ceil(per_block) as usize);
            let mut at = 0u64;
            for block in blocks {
                let n = per_block.min(len - at);
                let bytes = &mut buf[..(n * element_size as u64) as usize];
                self.read_bytes(&name, at, n, bytes)?;
                out.write(block, 0, bytes)?;
                packed.extents.push(Extent {
                    block,
                    offset: 0,
                    count: n as u32,
                });
                at += n;
            }
            packed.rebuild_starts();
            out_pools.insert(name, packed);
        }

        out.close(&encode_catalog(&out_pools))?;
        tracing::debug!(path = %path.display(), pools = out_pools.len(), "wrote compacted copy");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn opts() -> StoreOptions {
        StoreOptions {
            block_size: 256,
            cache_blocks: 8,
        }
    }

    fn file(dir: &TempDir) -> PoolFile {
        PoolFile::create(dir.path().join("pools.pf"), opts()).unwrap()
    }

    fn fill(pf: &PoolFile, name: &str, values: &[u32]) {
        pf.create_pool(name, 4).unwrap();
        pf.append(name, values.len() as u64, false).unwrap();
        let acc = pf.accessor::<u32>(name).unwrap();
        acc.write(0, values).unwrap();
    }

    fn contents(pf: &PoolFile, name: &str) -> Vec<u32> {
        let acc = pf.accessor::<u32>(name).unwrap();
        acc.read_vec(0, acc.len().unwrap()).unwrap()
    }

    #[test]
    fn duplicate_and_missing_pools() {
        let dir = TempDir::new().unwrap();
        let pf = file(&dir);
        pf.create_pool("a", 4).unwrap();
        assert!(matches!(pf.create_pool("a", 4), Err(Error::PoolExists(_))));
        assert!(matches!(pf.remove_pool("b"), Err(Error::PoolNotFound(_))));
        assert!(matches!(pf.create_pool("c", 0), Err(Error::InvalidElementSize(0))));
    }

    #[test]
    fn insert_in_middle_shifts_tail() {
        let dir = TempDir::new().unwrap();
        let pf = file(&dir);
        let values: Vec<u32> = (0..200).collect();
        fill(&pf, "p", &values);

        pf.insert("p", 50, 10, true).unwrap();
        let got = contents(&pf, "p");
        assert_eq!(got.len(), 210);
        assert_eq!(&got[..50], &values[..50]);
        assert!(got[50..60].iter().all(|&v| v == 0));
        assert_eq!(&got[60..], &values[50..]);
    }

    #[test]
    fn delete_frees_blocks_after_flush() {
        let dir = TempDir::new().unwrap();
        let pf = file(&dir);
        fill(&pf, "p", &(0..640).collect::<Vec<_>>());
        pf.delete("p", 0, 640).unwrap();
        let stats = pf.stats();
        assert_eq!(stats.pending_free_blocks, 10);
        pf.flush().unwrap();
        assert!(pf.stats().free_blocks >= 10);
    }

    #[test]
    fn move_between_pools_keeps_order() {
        let dir = TempDir::new().unwrap();
        let pf = file(&dir);
        let values: Vec<u32> = (0..500).collect();
        fill(&pf, "src", &values);
        pf.create_pool("dst", 4).unwrap();

        pf.move_data("dst", 0, "src", 37, 300).unwrap();
        assert_eq!(contents(&pf, "dst"), values[37..337].to_vec());
        let mut rest = values[..37].to_vec();
        rest.extend_from_slice(&values[337..]);
        assert_eq!(contents(&pf, "src"), rest);

        // Writes to the moved data must not leak into the source pool.
        pf.accessor::<u32>("dst").unwrap().set(0, 9999).unwrap();
        assert_eq!(contents(&pf, "src"), rest);
    }

    #[test]
    fn move_within_pool_rotates() {
        let dir = TempDir::new().unwrap();
        let pf = file(&dir);
        fill(&pf, "p", &[0, 1, 2, 3, 4, 5, 6, 7]);
        pf.move_data("p", 5, "p", 0, 3).unwrap();
        assert_eq!(contents(&pf, "p"), vec![3, 4, 5, 6, 7, 0, 1, 2]);
    }

    #[test]
    fn overlapping_copy_behaves_like_memmove() {
        let dir = TempDir::new().unwrap();
        let pf = file(&dir);
        let values: Vec<u32> = (0..300).collect();
        fill(&pf, "p", &values);

        pf.copy_data("p", 10, "p", 0, 200).unwrap();
        let got = contents(&pf, "p");
        assert_eq!(&got[10..210], &values[..200]);
        assert_eq!(&got[..10], &values[..10]);
    }

    #[test]
    fn out_of_range_is_reported() {
        let dir = TempDir::new().unwrap();
        let pf = file(&dir);
        fill(&pf, "p", &[1, 2, 3]);
        assert!(matches!(pf.delete("p", 2, 5), Err(Error::OutOfRange { .. })));
        assert!(matches!(pf.insert("p", 4, 1, true), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn reopen_restores_pools() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reopen.pf");
        let pf = PoolFile::create(&path, opts()).unwrap();
        fill(&pf, "a", &(0..1000).collect::<Vec<_>>());
        pf.insert("a", 500, 3, true).unwrap();
        pf.close().unwrap();

        let pf = PoolFile::open(&path, opts()).unwrap();
        let got = contents(&pf, "a");
        assert_eq!(got.len(), 1003);
        assert_eq!(got[499], 499);
        assert_eq!(got[503], 500);
    }

    #[test]
    fn defragment_preserves_contents_and_packs_extents() {
        let dir = TempDir::new().unwrap();
        let pf = file(&dir);
        fill(&pf, "a", &(0..1000).collect::<Vec<_>>());
        for i in 0..20 {
            pf.insert("a", i * 40, 1, true).unwrap();
        }
        let before = contents(&pf, "a");

        pf.defragment().unwrap();
        assert_eq!(contents(&pf, "a"), before);
        let state = pf.state.lock();
        let extents = state.pools["a"].extents.len() as u64;
        assert_eq!(extents, 1020u64.div_ceil(64));
    }

    #[test]
    fn write_bytes_rejects_partial_elements() {
        let dir = TempDir::new().unwrap();
        let pf = file(&dir);
        fill(&pf, "a", &[1, 2, 3]);
        assert!(matches!(
            pf.write_bytes("a", 0, &[0u8; 6]),
            Err(Error::PartialElement {
                len: 6,
                element_size: 4,
                ..
            })
        ));
        assert_eq!(contents(&pf, "a"), vec![1, 2, 3]);
    }

    #[test]
    fn failed_cross_pool_move_leaves_source_intact() {
        let dir = TempDir::new().unwrap();
        let pf = file(&dir);
        fill(&pf, "a", &(0..10).collect::<Vec<_>>());
        pf.create_pool("b", 4).unwrap();

        // Repoint the source extent past the end of the file so copying
        // the shared fragment out fails.
        let (real, bogus) = {
            let mut state = pf.state.lock();
            let bogus = state.store.block_count() + 100;
            let entry = state.pools.get_mut("a").unwrap();
            let real = entry.extents[0].block;
            entry.extents[0].block = bogus;
            let n = state.refs.remove(&real).unwrap();
            state.refs.insert(bogus, n);
            (real, bogus)
        };

        assert!(matches!(
            pf.move_data("b", 0, "a", 2, 3),
            Err(Error::InvalidBlock(_))
        ));
        assert_eq!(pf.pool_len("a").unwrap(), 10);
        assert_eq!(pf.pool_len("b").unwrap(), 0);
        {
            let mut state = pf.state.lock();
            let entry = state.pools.get_mut("a").unwrap();
            assert_eq!(entry.extents.len(), 1);
            entry.extents[0].block = real;
            assert_eq!(state.refs.remove(&bogus), Some(1));
            state.refs.insert(real, 1);
        }
        assert_eq!(contents(&pf, "a"), (0..10).collect::<Vec<u32>>());

        pf.move_data("b", 0, "a", 2, 3).unwrap();
        assert_eq!(contents(&pf, "b"), vec![2, 3, 4]);
        assert_eq!(contents(&pf, "a"), vec![0, 1, 5, 6, 7, 8, 9]);
    }
}
