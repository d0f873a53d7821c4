//! Temp pool bookkeeping for undo.
//!
//! Samples an edit relocates (rather than destroys) land in temp pools named
//! `TempAudioPool {key} {channel}`. The [`TempRegistry`] hands out keys and
//! remembers which channels each key holds. [`Rollback`] undoes the pool
//! moves of an edit that fails halfway.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use segue_store::PoolFile;

/// Prefix shared by every temp pool name.
pub(crate) const TEMP_POOL_PREFIX: &str = "TempAudioPool ";

/// Handle to a set of temp pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TempKey(pub u64);

impl fmt::Display for TempKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pool name for `channel` under `key`.
pub(crate) fn temp_pool_name(key: TempKey, channel: usize) -> String {
    format!("{TEMP_POOL_PREFIX}{key} {channel}")
}

/// Parses `TempAudioPool {key} {channel}`.
pub(crate) fn parse_temp_pool_name(name: &str) -> Option<(TempKey, usize)> {
    let rest = name.strip_prefix(TEMP_POOL_PREFIX)?;
    let (key, channel) = rest.split_once(' ')?;
    Some((TempKey(key.parse().ok()?), channel.parse().ok()?))
}

/// What a temp pool set holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TempContents {
    /// A sample range of the listed channels.
    Samples,
    /// Whole channels removed from index `at`.
    Channels { at: usize },
}

#[derive(Debug, Clone)]
pub(crate) struct TempPoolSet {
    pub contents: TempContents,
    /// Channel index to pool name. For removed channels the index is the
    /// offset within the removed run.
    pub pools: BTreeMap<usize, String>,
}

#[derive(Debug, Default)]
pub(crate) struct TempRegistry {
    next: u64,
    sets: BTreeMap<TempKey, TempPoolSet>,
}

impl TempRegistry {
    /// Starts numbering after any key already present in `existing` pool
    /// names so orphaned pools are never reused.
    pub fn resume_after<'n>(existing: impl IntoIterator<Item = &'n String>) -> Self {
        let next = existing
            .into_iter()
            .filter_map(|n| parse_temp_pool_name(n))
            .map(|(k, _)| k.0 + 1)
            .max()
            .unwrap_or(0);
        Self {
            next,
            sets: BTreeMap::new(),
        }
    }

    pub fn allocate(&mut self) -> TempKey {
        let key = TempKey(self.next);
        self.next += 1;
        key
    }

    pub fn insert(&mut self, key: TempKey, set: TempPoolSet) {
        self.sets.insert(key, set);
    }

    pub fn get(&self, key: TempKey) -> Option<&TempPoolSet> {
        self.sets.get(&key)
    }

    pub fn remove(&mut self, key: TempKey) -> Option<TempPoolSet> {
        self.sets.remove(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = TempKey> + '_ {
        self.sets.keys().copied()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        parse_temp_pool_name(name)
            .and_then(|(k, _)| self.sets.get(&k))
            .is_some_and(|set| set.pools.values().any(|p| p == name))
    }
}

enum Undo {
    RemovePool(String),
    Delete {
        pool: String,
        pos: u64,
        count: u64,
    },
    Move {
        dst: String,
        dst_pos: u64,
        src: String,
        src_pos: u64,
        count: u64,
    },
}

/// Reverses completed pool steps when dropped without [`Rollback::commit`].
pub(crate) struct Rollback {
    file: Arc<PoolFile>,
    steps: Vec<Undo>,
    armed: bool,
}

impl Rollback {
    pub fn new(file: Arc<PoolFile>) -> Self {
        Self {
            file,
            steps: Vec::new(),
            armed: true,
        }
    }

    /// Records that `name` was created.
    pub fn created(&mut self, name: &str) {
        self.steps.push(Undo::RemovePool(name.to_string()));
    }

    /// Records that `count` elements were inserted into `pool` at `pos`.
    pub fn inserted(&mut self, pool: &str, pos: u64, count: u64) {
        self.steps.push(Undo::Delete {
            pool: pool.to_string(),
            pos,
            count,
        });
    }

    /// Records that `[src_pos, src_pos + count)` of `src` was moved into
    /// `dst` at `dst_pos`.
    pub fn moved(&mut self, dst: &str, dst_pos: u64, src: &str, src_pos: u64, count: u64) {
        self.steps.push(Undo::Move {
            dst: src.to_string(),
            dst_pos: src_pos,
            src: dst.to_string(),
            src_pos: dst_pos,
            count,
        });
    }

    pub fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for step in self.steps.drain(..).rev() {
            let result = match &step {
                Undo::RemovePool(name) => self.file.remove_pool(name),
                Undo::Delete { pool, pos, count } => self.file.delete(pool, *pos, *count),
                Undo::Move {
                    dst,
                    dst_pos,
                    src,
                    src_pos,
                    count,
                } => self.file.move_data(dst, *dst_pos, src, *src_pos, *count),
            };
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to roll back partial edit");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segue_store::StoreOptions;
    use tempfile::TempDir;

    #[test]
    fn names_round_trip() {
        let name = temp_pool_name(TempKey(12), 3);
        assert_eq!(name, "TempAudioPool 12 3");
        assert_eq!(parse_temp_pool_name(&name), Some((TempKey(12), 3)));
        assert_eq!(parse_temp_pool_name("Channel 1"), None);
        assert_eq!(parse_temp_pool_name("TempAudioPool x 1"), None);
    }

    #[test]
    fn keys_resume_after_existing_pools() {
        let existing = vec!["Channel 1".to_string(), temp_pool_name(TempKey(7), 0)];
        let mut reg = TempRegistry::resume_after(&existing);
        assert_eq!(reg.allocate(), TempKey(8));
        assert_eq!(reg.allocate(), TempKey(9));
    }

    #[test]
    fn dropped_rollback_restores_moves() {
        let dir = TempDir::new().unwrap();
        let file = Arc::new(
            PoolFile::create(
                dir.path().join("r.seg"),
                StoreOptions {
                    block_size: 256,
                    cache_blocks: 8,
                },
            )
            .unwrap(),
        );
        let ch = file.create_or_open::<f32>("c").unwrap();
        ch.append_values(&[1.0, 2.0, 3.0, 4.0]).unwrap();

        {
            let mut rb = Rollback::new(Arc::clone(&file));
            file.create_pool("t", 4).unwrap();
            rb.created("t");
            file.move_data("t", 0, "c", 1, 2).unwrap();
            rb.moved("t", 0, "c", 1, 2);
        }

        assert!(!file.contains_pool("t"));
        let ch = file.accessor::<f32>("c").unwrap();
        assert_eq!(ch.read_vec(0, 4).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn committed_rollback_keeps_changes() {
        let dir = TempDir::new().unwrap();
        let file = Arc::new(
            PoolFile::create(
                dir.path().join("k.seg"),
                StoreOptions {
                    block_size: 256,
                    cache_blocks: 8,
                },
            )
            .unwrap(),
        );
        let mut rb = Rollback::new(Arc::clone(&file));
        file.create_pool("t", 4).unwrap();
        rb.created("t");
        rb.commit();
        assert!(file.contains_pool("t"));
    }
}
