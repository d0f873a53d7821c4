//! Logical-to-physical extent maps for pools and the catalog that persists them.
//!
//! A pool is a logically contiguous array whose elements live in a list of
//! [`Extent`]s. Each extent is a run of elements inside one block. Inserting
//! or deleting at a logical position only splits the extent under that
//! position and splices the list; blocks holding unaffected elements are
//! never rewritten.

use std::collections::{BTreeMap, HashMap};

use crate::block_store::{BlockId, BlockStore};
use crate::codec::{ByteReader, ByteWriter};
use crate::{Error, Result};

/// A run of `count` elements starting at element `offset` inside `block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Extent {
    pub block: BlockId,
    pub offset: u32,
    pub count: u32,
}

/// Number of extents referencing each block, across every pool.
pub(crate) type RefCounts = HashMap<BlockId, u32>;

#[derive(Debug, Clone)]
pub(crate) struct PoolEntry {
    pub element_size: u32,
    pub len: u64,
    pub extents: Vec<Extent>,
    starts: Vec<u64>,
}

impl PoolEntry {
    pub fn new(element_size: u32) -> Self {
        Self {
            element_size,
            len: 0,
            extents: Vec::new(),
            starts: Vec::new(),
        }
    }

    /// Elements that fit in one block.
    pub fn per_block(&self, block_size: u32) -> u32 {
        block_size / self.element_size
    }

    pub fn rebuild_starts(&mut self) {
        self.starts.clear();
        let mut at = 0u64;
        for e in &self.extents {
            self.starts.push(at);
            at += e.count as u64;
        }
        self.len = at;
    }

    /// Extent index and element offset within it for `pos < len`.
    pub fn locate(&self, pos: u64) -> (usize, u32) {
        let idx = self.starts.partition_point(|&s| s <= pos) - 1;
        (idx, (pos - self.starts[idx]) as u32)
    }

    /// Guarantees an extent boundary at `pos` and returns the index of the
    /// extent starting there (`extents.len()` when `pos == len`).
    pub fn split_at(&mut self, pos: u64, refs: &mut RefCounts) -> usize {
        if pos >= self.len {
            return self.extents.len();
        }
        let (idx, off) = self.locate(pos);
        if off == 0 {
            return idx;
        }
        let e = self.extents[idx];
        self.extents[idx].count = off;
        self.extents.insert(
            idx + 1,
            Extent {
                block: e.block,
                offset: e.offset + off,
                count: e.count - off,
            },
        );
        *refs.entry(e.block).or_insert(0) += 1;
        self.starts.insert(idx + 1, pos);
        idx + 1
    }

    /// Merges neighbouring extents that continue each other inside one block.
    pub fn coalesce(&mut self, refs: &mut RefCounts) {
        if self.extents.len() < 2 {
            self.rebuild_starts();
            return;
        }
        let mut merged: Vec<Extent> = Vec::with_capacity(self.extents.len());
        for e in self.extents.drain(..) {
            match merged.last_mut() {
                Some(prev) if prev.block == e.block && prev.offset + prev.count == e.offset => {
                    prev.count += e.count;
                    if let Some(n) = refs.get_mut(&e.block) {
                        *n -= 1;
                    }
                }
                _ => merged.push(e),
            }
        }
        self.extents = merged;
        self.rebuild_starts();
    }

    /// Removes `[pos, pos + count)` from the map and returns the extents that held it.
    pub fn take_range(&mut self, pos: u64, count: u64, refs: &mut RefCounts) -> Vec<Extent> {
        let a = self.split_at(pos, refs);
        let b = self.split_at(pos + count, refs);
        let taken: Vec<Extent> = self.extents.drain(a..b).collect();
        self.rebuild_starts();
        taken
    }

    /// Inserts `extents` so that their first element lands at `pos`.
    pub fn splice_at(&mut self, pos: u64, extents: Vec<Extent>, refs: &mut RefCounts) {
        let idx = self.split_at(pos, refs);
        self.extents.splice(idx..idx, extents);
        self.coalesce(refs);
    }
}

/// Drops one reference per extent and returns blocks nobody references anymore.
pub(crate) fn release(extents: &[Extent], refs: &mut RefCounts) -> Vec<BlockId> {
    let mut orphaned = Vec::new();
    for e in extents {
        if let Some(n) = refs.get_mut(&e.block) {
            *n -= 1;
            if *n == 0 {
                refs.remove(&e.block);
                orphaned.push(e.block);
            }
        }
    }
    orphaned
}

/// Serializes every pool's extent map into the catalog blob.
pub(crate) fn encode_catalog(pools: &BTreeMap<String, PoolEntry>) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_u32(pools.len() as u32);
    for (name, entry) in pools {
        w.put_str(name);
        w.put_u32(entry.element_size);
        w.put_u64(entry.len);
        w.put_u64(entry.extents.len() as u64);
        for e in &entry.extents {
            w.put_u64(e.block);
            w.put_u32(e.offset);
            w.put_u32(e.count);
        }
    }
    w.into_bytes()
}

/// Rebuilds the pool map and block reference counts from a catalog blob,
/// rejecting extents that point outside the file or into free blocks.
pub(crate) fn decode_catalog(
    bytes: &[u8],
    store: &BlockStore,
) -> Result<(BTreeMap<String, PoolEntry>, RefCounts)> {
    let mut pools = BTreeMap::new();
    let mut refs = RefCounts::new();
    if bytes.is_empty() {
        return Ok((pools, refs));
    }

    let mut r = ByteReader::new(bytes);
    let count = r.get_u32()?;
    for _ in 0..count {
        let name = r.get_str()?;
        let element_size = r.get_u32()?;
        if element_size == 0 || element_size > store.block_size() {
            return Err(Error::corrupt(format!(
                "pool '{name}' has element size {element_size}"
            )));
        }
        let mut entry = PoolEntry::new(element_size);
        let per_block = entry.per_block(store.block_size());
        let len = r.get_u64()?;
        let extent_count = r.get_u64()?;
        for _ in 0..extent_count {
            let e = Extent {
                block: r.get_u64()?,
                offset: r.get_u32()?,
                count: r.get_u32()?,
            };
            let in_file = e.block > 0 && e.block < store.block_count();
            if !in_file
                || store.is_free(e.block)
                || store.is_metadata(e.block)
                || e.count == 0
                || e.offset as u64 + e.count as u64 > per_block as u64
            {
                return Err(Error::corrupt(format!(
                    "pool '{name}' has an invalid extent at block {}",
                    e.block
                )));
            }
            *refs.entry(e.block).or_insert(0) += 1;
            entry.extents.push(e);
        }
        entry.rebuild_starts();
        if entry.len != len {
            return Err(Error::corrupt(format!(
                "pool '{name}' length {len} disagrees with its extents ({})",
                entry.len
            )));
        }
        if pools.insert(name.clone(), entry).is_some() {
            return Err(Error::corrupt(format!("duplicate pool '{name}'")));
        }
    }
    Ok((pools, refs))
}
