//! Named time markers and the index used to search them.
//!
//! Cues persist as fixed 132-byte records in the `Cues` pool:
//!
//! | Offset | Size | Field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 33   | name, UTF-8, NUL padded                 |
//! | 33     | 90   | reserved, zero                          |
//! | 123    | 1    | anchored flag                           |
//! | 124    | 8    | time in samples, little-endian `u64`    |

use std::collections::BTreeSet;

use segue_store::PoolElement;

use crate::{Error, Result};

/// Longest cue name in bytes.
pub const CUE_NAME_LEN: usize = 32;

/// Size of one persisted cue record.
pub const CUE_RECORD_SIZE: usize = 132;

const NAME_FIELD: usize = CUE_NAME_LEN + 1;
const ANCHORED_OFFSET: usize = NAME_FIELD + 90;
const TIME_OFFSET: usize = ANCHORED_OFFSET + 1;

/// A named marker at a sample position.
///
/// Anchored cues keep their time across structural edits; unanchored cues
/// follow the audio they mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    /// Display name, at most [`CUE_NAME_LEN`] bytes.
    pub name: String,
    /// Position in samples.
    pub time: u64,
    /// Pinned to its time regardless of edits.
    pub anchored: bool,
}

impl Cue {
    /// Creates a cue, rejecting names longer than [`CUE_NAME_LEN`] bytes.
    pub fn new(name: impl Into<String>, time: u64, anchored: bool) -> Result<Self> {
        let name = name.into();
        check_name(&name)?;
        Ok(Self {
            name,
            time,
            anchored,
        })
    }
}

pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.len() > CUE_NAME_LEN {
        return Err(Error::CueNameTooLong(name.len()));
    }
    Ok(())
}

/// On-disk representation of a [`Cue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CueRecord {
    name: [u8; NAME_FIELD],
    anchored: bool,
    time: u64,
}

impl Default for CueRecord {
    fn default() -> Self {
        Self {
            name: [0; NAME_FIELD],
            anchored: false,
            time: 0,
        }
    }
}

impl From<&Cue> for CueRecord {
    fn from(cue: &Cue) -> Self {
        let mut name = [0u8; NAME_FIELD];
        let bytes = cue.name.as_bytes();
        let n = bytes.len().min(CUE_NAME_LEN);
        name[..n].copy_from_slice(&bytes[..n]);
        Self {
            name,
            anchored: cue.anchored,
            time: cue.time,
        }
    }
}

impl From<CueRecord> for Cue {
    fn from(rec: CueRecord) -> Self {
        let end = rec
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(CUE_NAME_LEN);
        Self {
            name: String::from_utf8_lossy(&rec.name[..end]).into_owned(),
            time: rec.time,
            anchored: rec.anchored,
        }
    }
}

impl PoolElement for CueRecord {
    const SIZE: usize = CUE_RECORD_SIZE;

    fn encode(&self, out: &mut [u8]) {
        out[..NAME_FIELD].copy_from_slice(&self.name);
        out[NAME_FIELD..ANCHORED_OFFSET].fill(0);
        out[ANCHORED_OFFSET] = u8::from(self.anchored);
        out[TIME_OFFSET..Self::SIZE].copy_from_slice(&self.time.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut name = [0u8; NAME_FIELD];
        name.copy_from_slice(&bytes[..NAME_FIELD]);
        let mut time = [0u8; 8];
        time.copy_from_slice(&bytes[TIME_OFFSET..Self::SIZE]);
        Self {
            name,
            anchored: bytes[ANCHORED_OFFSET] != 0,
            time: u64::from_le_bytes(time),
        }
    }
}

/// In-memory cue list plus a time-ordered index over it.
///
/// Ties on time resolve to the lower cue index so searches are
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct CueIndex {
    cues: Vec<Cue>,
    by_time: BTreeSet<(u64, usize)>,
}

impl CueIndex {
    /// Builds an index over `cues`.
    pub fn new(cues: Vec<Cue>) -> Self {
        let mut index = Self {
            cues,
            by_time: BTreeSet::new(),
        };
        index.rebuild();
        index
    }

    fn rebuild(&mut self) {
        self.by_time = self
            .cues
            .iter()
            .enumerate()
            .map(|(i, c)| (c.time, i))
            .collect();
    }

    /// Number of cues.
    pub fn len(&self) -> usize {
        self.cues.len()
    }

    /// Returns true if there are no cues.
    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Cue at `index`.
    pub fn get(&self, index: usize) -> Result<&Cue> {
        self.cues.get(index).ok_or(Error::CueNotFound(index))
    }

    /// All cues in insertion order.
    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub(crate) fn push(&mut self, cue: Cue) -> usize {
        self.cues.push(cue);
        let index = self.cues.len() - 1;
        self.by_time.insert((self.cues[index].time, index));
        index
    }

    pub(crate) fn remove(&mut self, index: usize) -> Result<Cue> {
        if index >= self.cues.len() {
            return Err(Error::CueNotFound(index));
        }
        let cue = self.cues.remove(index);
        self.rebuild();
        Ok(cue)
    }

    pub(crate) fn update(&mut self, index: usize, f: impl FnOnce(&mut Cue)) -> Result<()> {
        let cue = self.cues.get_mut(index).ok_or(Error::CueNotFound(index))?;
        let old = cue.time;
        f(cue);
        let new = cue.time;
        if old != new {
            self.by_time.remove(&(old, index));
            self.by_time.insert((new, index));
        }
        Ok(())
    }

    /// Index of a cue placed exactly at `time`.
    pub fn find_cue(&self, time: u64) -> Option<usize> {
        self.by_time
            .range((time, 0)..=(time, usize::MAX))
            .next()
            .map(|&(_, i)| i)
    }

    /// Index of the first cue named `name`.
    pub fn find_cue_by_name(&self, name: &str) -> Option<usize> {
        self.cues.iter().position(|c| c.name == name)
    }

    /// Cue closest to `time` and its distance in samples.
    ///
    /// On equal distance the earlier cue wins.
    pub fn find_nearest_cue(&self, time: u64) -> Option<(usize, u64)> {
        let before = self.by_time.range(..=(time, usize::MAX)).next_back();
        let after = self.by_time.range((time.saturating_add(1), 0)..).next();
        match (before, after) {
            (Some(&(bt, bi)), Some(&(at, ai))) => {
                let (db, da) = (time - bt, at - time);
                Some(if da < db { (ai, da) } else { (bi, db) })
            }
            (Some(&(bt, bi)), None) => Some((bi, time - bt)),
            (None, Some(&(at, ai))) => Some((ai, at - time)),
            (None, None) => None,
        }
    }

    /// Latest cue strictly before `time`.
    pub fn find_previous_cue(&self, time: u64) -> Option<usize> {
        let (t, _) = *self.by_time.range(..(time, 0)).next_back()?;
        self.find_cue(t)
    }

    /// Earliest cue strictly after `time`.
    pub fn find_next_cue(&self, time: u64) -> Option<usize> {
        self.by_time
            .range((time.saturating_add(1), 0)..)
            .next()
            .map(|&(_, i)| i)
    }

    /// Shifts unanchored cues at or after `pos` right by `len`.
    ///
    /// Returns true if any cue moved.
    pub(crate) fn adjust_for_insert(&mut self, pos: u64, len: u64) -> bool {
        if len == 0 {
            return false;
        }
        let mut changed = false;
        for cue in self.cues.iter_mut().filter(|c| !c.anchored && c.time >= pos) {
            cue.time += len;
            changed = true;
        }
        if changed {
            self.rebuild();
        }
        changed
    }

    /// Applies the removal of `[pos, pos + len)` to unanchored cues.
    ///
    /// Cues strictly inside the range are dropped; a cue at `pos` stays; cues
    /// at or after `pos + len` shift left by `len`. Returns true if anything
    /// changed.
    pub(crate) fn adjust_for_remove(&mut self, pos: u64, len: u64) -> bool {
        if len == 0 {
            return false;
        }
        let end = pos + len;
        let before = self.cues.len();
        self.cues
            .retain(|c| c.anchored || c.time <= pos || c.time >= end);
        let mut changed = self.cues.len() != before;
        for cue in self.cues.iter_mut().filter(|c| !c.anchored && c.time >= end) {
            cue.time -= len;
            changed = true;
        }
        if changed {
            self.rebuild();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(times: &[(u64, bool)]) -> CueIndex {
        CueIndex::new(
            times
                .iter()
                .enumerate()
                .map(|(i, &(t, a))| Cue::new(format!("c{i}"), t, a).unwrap())
                .collect(),
        )
    }

    #[test]
    fn record_layout() {
        let cue = Cue::new("intro", 0x0102, true).unwrap();
        let mut buf = [0xffu8; CUE_RECORD_SIZE];
        CueRecord::from(&cue).encode(&mut buf);
        assert_eq!(&buf[..5], b"intro");
        assert!(buf[5..ANCHORED_OFFSET].iter().all(|&b| b == 0));
        assert_eq!(buf[ANCHORED_OFFSET], 1);
        assert_eq!(buf[TIME_OFFSET], 0x02);
        assert_eq!(buf[TIME_OFFSET + 1], 0x01);
        assert_eq!(Cue::from(CueRecord::decode(&buf)), cue);
    }

    #[test]
    fn name_limit_is_32_bytes() {
        assert!(Cue::new("x".repeat(32), 0, false).is_ok());
        assert!(matches!(
            Cue::new("x".repeat(33), 0, false),
            Err(Error::CueNameTooLong(33))
        ));
    }

    #[test]
    fn nearest_prefers_earlier_on_tie() {
        let idx = index(&[(100, false), (200, false)]);
        assert_eq!(idx.find_nearest_cue(150), Some((0, 50)));
        assert_eq!(idx.find_nearest_cue(160), Some((1, 40)));
        assert_eq!(idx.find_nearest_cue(0), Some((0, 100)));
        assert_eq!(idx.find_nearest_cue(900), Some((1, 700)));
        assert_eq!(CueIndex::default().find_nearest_cue(5), None);
    }

    #[test]
    fn previous_and_next_are_strict() {
        let idx = index(&[(10, false), (20, false), (20, false), (30, false)]);
        assert_eq!(idx.find_previous_cue(20), Some(0));
        assert_eq!(idx.find_previous_cue(21), Some(1));
        assert_eq!(idx.find_next_cue(20), Some(3));
        assert_eq!(idx.find_next_cue(30), None);
        assert_eq!(idx.find_cue(20), Some(1));
    }

    #[test]
    fn insert_shifts_unanchored_at_or_after() {
        let mut idx = index(&[(10, false), (50, false), (50, true), (80, false)]);
        assert!(idx.adjust_for_insert(50, 5));
        let times: Vec<u64> = idx.cues().iter().map(|c| c.time).collect();
        assert_eq!(times, vec![10, 55, 50, 85]);
    }

    #[test]
    fn remove_drops_strictly_inside() {
        let mut idx = index(&[(10, false), (20, false), (25, false), (30, false), (25, true)]);
        assert!(idx.adjust_for_remove(20, 10));
        let cues: Vec<(u64, bool)> = idx.cues().iter().map(|c| (c.time, c.anchored)).collect();
        assert_eq!(cues, vec![(10, false), (20, false), (20, false), (25, true)]);
    }
}
