//! Structural edits: everything that changes channel length or relocates
//! samples between channel pools and temp pools.
//!
//! Each public edit finishes by re-equalizing channel lengths, updating the
//! peak pools of the channels it touched, and applying the cue shift rule.
//! Pool moves made before a failure are reversed by a [`Rollback`] guard.

use std::collections::BTreeMap;
use std::sync::Arc;

use segue_store::PoolElement;

use crate::peaks::PeakChunk;
use crate::sound::{NO_MAX_LENGTH, Sample, Sound, channel_pool_name, peak_pool_name};
use crate::temp::{Rollback, TempContents, TempKey, TempPoolSet, temp_pool_name};
use crate::{Error, Result};

fn selected(which: &[bool]) -> impl Iterator<Item = usize> + '_ {
    which
        .iter()
        .enumerate()
        .filter(|&(_, &on)| on)
        .map(|(ch, _)| ch)
}

impl Sound {
    /// Runs a length-changing edit, repairing peak pools if it fails.
    fn structural<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        match f(self) {
            Ok(value) => {
                self.mark_modified();
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(op, error = %e, "structural edit failed, rebuilding peaks");
                self.repair_peaks();
                Err(e)
            }
        }
    }

    /// Pads channels shorter than the longest with silence, truncates to
    /// `max_length`, and enforces the one-sample floor.
    pub(crate) fn match_up_channel_lengths(&mut self, max_length: u64) -> Result<()> {
        let lens = self.channel_lengths()?;
        let longest = lens.iter().copied().max().unwrap_or(0);
        let target = longest.min(max_length).min(self.max_length()).max(1);
        for (ch, &len) in lens.iter().enumerate() {
            let name = channel_pool_name(ch);
            if len < target {
                self.file.append(&name, target - len, true)?;
                self.peaks(ch).after_insert(len, target - len)?;
            } else if len > target {
                self.file.delete(&name, target, len - target)?;
                self.peaks(ch).after_remove(target, len - target)?;
            }
        }
        if longest > target {
            self.cues_removed(target, longest - target)?;
        }
        Ok(())
    }

    fn insert_space(&mut self, which: &[bool], at: u64, length: u64, zero_fill: bool) -> Result<()> {
        let mut rollback = Rollback::new(Arc::clone(&self.file));
        for ch in selected(which) {
            let name = channel_pool_name(ch);
            self.file.insert(&name, at, length, zero_fill)?;
            rollback.inserted(&name, at, length);
        }
        rollback.commit();
        for ch in selected(which) {
            self.peaks(ch).after_insert(at, length)?;
        }
        Ok(())
    }

    /// Moves `[at, at + length)` of each selected channel into a fresh temp
    /// pool set, followed by `fudge` samples of trailing context.
    fn move_out(&mut self, which: &[bool], at: u64, length: u64, fudge: u64) -> Result<TempKey> {
        let key = self.temps.allocate();
        let mut rollback = Rollback::new(Arc::clone(&self.file));
        let mut pools = BTreeMap::new();
        for ch in selected(which) {
            let channel = channel_pool_name(ch);
            let temp = temp_pool_name(key, ch);
            self.file.create_pool(&temp, Sample::SIZE as u32)?;
            rollback.created(&temp);
            self.file.move_data(&temp, 0, &channel, at, length)?;
            rollback.moved(&temp, 0, &channel, at, length);
            if fudge > 0 {
                // Context is whatever now follows the hole, zero past the end.
                let avail = self.file.pool_len(&channel)?.saturating_sub(at).min(fudge);
                self.file.append(&temp, fudge, true)?;
                if avail > 0 {
                    self.file.copy_data(&temp, length, &channel, at, avail)?;
                }
            }
            pools.insert(ch, temp);
        }
        rollback.commit();
        let moved = pools.len();
        self.temps.insert(
            key,
            TempPoolSet {
                contents: TempContents::Samples,
                pools,
            },
        );

        for ch in selected(which) {
            if let Err(e) = self.peaks(ch).after_remove(at, length) {
                self.undo_move_out(which, key, at, length);
                return Err(e);
            }
        }
        tracing::debug!(%key, at, length, fudge, channels = moved, "moved samples to temp pools");
        Ok(key)
    }

    /// Moves the first `length` samples of each selected channel's temp pool
    /// back into the channel at `at`.
    fn move_in(&mut self, which: &[bool], key: TempKey, at: u64, length: u64) -> Result<()> {
        let channels = self.move_in_pools(which, key, at, length)?;
        for ch in channels {
            self.peaks(ch).after_insert(at, length)?;
        }
        tracing::debug!(%key, at, length, "moved samples back from temp pools");
        Ok(())
    }

    /// Pool half of [`move_in`](Self::move_in): either every selected
    /// channel receives its samples or none does. Returns the channels moved.
    fn move_in_pools(&self, which: &[bool], key: TempKey, at: u64, length: u64) -> Result<Vec<usize>> {
        let set = self.temps.get(key).ok_or(Error::TempPoolNotFound(key))?;
        if set.contents != TempContents::Samples {
            return Err(Error::TempPoolNotFound(key));
        }
        let mut moves = Vec::new();
        for ch in selected(which) {
            let temp = set.pools.get(&ch).ok_or(Error::TempPoolNotFound(key))?;
            let avail = self.file.pool_len(temp)?;
            if length > avail {
                return Err(segue_store::Error::OutOfRange {
                    pos: 0,
                    count: length,
                    len: avail,
                }
                .into());
            }
            moves.push((ch, temp.clone()));
        }

        let mut rollback = Rollback::new(Arc::clone(&self.file));
        for (ch, temp) in &moves {
            let channel = channel_pool_name(*ch);
            self.file.move_data(&channel, at, temp, 0, length)?;
            rollback.moved(&channel, at, temp, 0, length);
        }
        rollback.commit();
        Ok(moves.into_iter().map(|(ch, _)| ch).collect())
    }

    /// Best-effort reversal of a `move_out` whose follow-up step failed.
    ///
    /// Only pools are restored; the failing edit runs inside
    /// [`structural`](Self::structural), which rebuilds peaks afterwards.
    fn undo_move_out(&mut self, which: &[bool], key: TempKey, at: u64, length: u64) {
        if let Err(e) = self.move_in_pools(which, key, at, length) {
            tracing::error!(%key, error = %e, "could not restore moved samples; temp pools kept");
            return;
        }
        if let Err(e) = self.remove_temp_audio_pools(key) {
            tracing::warn!(%key, error = %e, "could not remove temp pools");
        }
    }

    /// Inserts `length` samples at `at` in the selected channels.
    ///
    /// Unselected channels are padded with silence at the end so every
    /// channel keeps the same length, capped at `max_length`.
    pub fn add_space(
        &mut self,
        which: &[bool],
        at: u64,
        length: u64,
        zero_fill: bool,
        max_length: u64,
    ) -> Result<()> {
        self.check_mask(which)?;
        self.structural("add_space", |s| {
            s.insert_space(which, at, length, zero_fill)?;
            if which.contains(&true) {
                s.cues_inserted(at, length)?;
            }
            s.match_up_channel_lengths(max_length)
        })
    }

    /// Deletes `[at, at + length)` from the selected channels.
    pub fn remove_space(&mut self, which: &[bool], at: u64, length: u64, max_length: u64) -> Result<()> {
        self.check_mask(which)?;
        self.check_range(at, length)?;
        self.structural("remove_space", |s| {
            let scratch = s.move_out(which, at, length, 0)?;
            s.remove_temp_audio_pools(scratch)?;
            if which.contains(&true) {
                s.cues_removed(at, length)?;
            }
            s.match_up_channel_lengths(max_length)
        })
    }

    /// Moves `[at, at + length)` of the selected channels into new temp
    /// pools and returns their key.
    ///
    /// Each temp pool also receives `fudge` samples copied from just past the
    /// range (zeros beyond the end) for algorithms that read ahead. This is
    /// the undo-preparation primitive: [`move_data_from_temp`](Self::move_data_from_temp)
    /// with the same position and length restores the samples exactly.
    pub fn move_data_to_temp(
        &mut self,
        which: &[bool],
        at: u64,
        length: u64,
        fudge: u64,
        max_length: u64,
    ) -> Result<TempKey> {
        self.check_mask(which)?;
        self.check_range(at, length)?;
        self.structural("move_data_to_temp", |s| {
            let key = s.move_out(which, at, length, fudge)?;
            if which.contains(&true) {
                s.cues_removed(at, length)?;
            }
            s.match_up_channel_lengths(max_length)?;
            Ok(key)
        })
    }

    /// Moves a range to temp pools and inserts `replace_length` samples of
    /// silence in its place, for edits that change the selection length.
    #[allow(clippy::too_many_arguments)]
    pub fn move_data_to_temp_and_replace_space(
        &mut self,
        which: &[bool],
        at: u64,
        length: u64,
        replace_length: u64,
        fudge: u64,
        max_length: u64,
    ) -> Result<TempKey> {
        self.check_mask(which)?;
        self.check_range(at, length)?;
        self.structural("move_data_to_temp_and_replace_space", |s| {
            let key = s.move_out(which, at, length, fudge)?;
            if let Err(e) = s.insert_space(which, at, replace_length, true) {
                s.undo_move_out(which, key, at, length);
                return Err(e);
            }
            if which.contains(&true) {
                s.cues_removed(at, length)?;
                s.cues_inserted(at, replace_length)?;
            }
            s.match_up_channel_lengths(max_length)?;
            Ok(key)
        })
    }

    /// Moves `length` samples from the temp pools under `key` back into the
    /// selected channels at `at`.
    ///
    /// With `remove_temp_pools` the key is released afterwards.
    pub fn move_data_from_temp(
        &mut self,
        which: &[bool],
        key: TempKey,
        at: u64,
        length: u64,
        remove_temp_pools: bool,
        max_length: u64,
    ) -> Result<()> {
        self.check_mask(which)?;
        self.structural("move_data_from_temp", |s| {
            s.move_in(which, key, at, length)?;
            if which.contains(&true) {
                s.cues_inserted(at, length)?;
            }
            s.match_up_channel_lengths(max_length)?;
            if remove_temp_pools {
                s.remove_temp_audio_pools(key)?;
            }
            Ok(())
        })
    }

    /// Removes `[remove_at, remove_at + remove_length)` and then moves
    /// `move_length` samples from `key` back in at `move_at`.
    ///
    /// If the restore fails the removed samples are put back.
    #[allow(clippy::too_many_arguments)]
    pub fn remove_space_and_move_data_from_temp(
        &mut self,
        which: &[bool],
        remove_at: u64,
        remove_length: u64,
        key: TempKey,
        move_at: u64,
        move_length: u64,
        remove_temp_pools: bool,
        max_length: u64,
    ) -> Result<()> {
        self.check_mask(which)?;
        self.check_range(remove_at, remove_length)?;
        self.structural("remove_space_and_move_data_from_temp", |s| {
            let scratch = s.move_out(which, remove_at, remove_length, 0)?;
            if let Err(e) = s.move_in(which, key, move_at, move_length) {
                s.undo_move_out(which, scratch, remove_at, remove_length);
                return Err(e);
            }
            s.remove_temp_audio_pools(scratch)?;
            if which.contains(&true) {
                s.cues_removed(remove_at, remove_length)?;
                s.cues_inserted(move_at, move_length)?;
            }
            s.match_up_channel_lengths(max_length)?;
            if remove_temp_pools {
                s.remove_temp_audio_pools(key)?;
            }
            Ok(())
        })
    }

    /// Discards the temp pool set under `key`.
    pub fn remove_temp_audio_pools(&mut self, key: TempKey) -> Result<()> {
        let set = self.temps.remove(key).ok_or(Error::TempPoolNotFound(key))?;
        for name in set.pools.values() {
            if self.file.contains_pool(name) {
                self.file.remove_pool(name)?;
            }
        }
        tracing::debug!(%key, pools = set.pools.len(), "removed temp pools");
        Ok(())
    }

    /// Copies `[at, at + length)` of the selected channels into new temp
    /// pools without changing the sound.
    pub fn copy_data_to_temp(&mut self, which: &[bool], at: u64, length: u64) -> Result<TempKey> {
        self.check_mask(which)?;
        self.check_range(at, length)?;
        let key = self.temps.allocate();
        let mut rollback = Rollback::new(Arc::clone(&self.file));
        let mut pools = BTreeMap::new();
        for ch in selected(which) {
            let temp = temp_pool_name(key, ch);
            self.file.create_pool(&temp, Sample::SIZE as u32)?;
            rollback.created(&temp);
            self.file.append(&temp, length, false)?;
            self.file
                .copy_data(&temp, 0, &channel_pool_name(ch), at, length)?;
            pools.insert(ch, temp);
        }
        rollback.commit();
        tracing::debug!(%key, at, length, "copied samples to temp pools");
        self.temps.insert(
            key,
            TempPoolSet {
                contents: TempContents::Samples,
                pools,
            },
        );
        Ok(key)
    }

    /// Overwrites `[at, at + length)` of the selected channels with the
    /// start of the temp pools under `key`.
    pub fn restore_selection_from_temp(
        &mut self,
        which: &[bool],
        key: TempKey,
        at: u64,
        length: u64,
    ) -> Result<()> {
        self.check_mask(which)?;
        self.check_range(at, length)?;
        let set = self.temps.get(key).ok_or(Error::TempPoolNotFound(key))?;
        let mut copies = Vec::new();
        for ch in selected(which) {
            let temp = set.pools.get(&ch).ok_or(Error::TempPoolNotFound(key))?;
            copies.push((ch, temp.clone()));
        }
        for (ch, temp) in copies {
            self.file
                .copy_data(&channel_pool_name(ch), at, &temp, 0, length)?;
            self.peaks(ch).invalidate(at, at + length)?;
        }
        self.mark_modified();
        Ok(())
    }

    fn rotate(&mut self, which: &[bool], start: u64, stop: u64, amount: u64, left: bool) -> Result<()> {
        self.check_mask(which)?;
        if start >= stop {
            return Ok(());
        }
        self.check_range(start, stop - start)?;
        let amount = amount % (stop - start);
        if amount == 0 {
            return Ok(());
        }
        let (dst_pos, src_pos) = if left {
            (stop - amount, start)
        } else {
            (start, stop - amount)
        };
        self.structural("rotate", |s| {
            let mut rollback = Rollback::new(Arc::clone(&s.file));
            for ch in selected(which) {
                let name = channel_pool_name(ch);
                s.file.move_data(&name, dst_pos, &name, src_pos, amount)?;
                rollback.moved(&name, dst_pos, &name, src_pos, amount);
            }
            rollback.commit();
            for ch in selected(which) {
                s.peaks(ch).invalidate(start, stop)?;
            }
            Ok(())
        })
    }

    /// Rotates `[start, stop)` of the selected channels left by `amount`.
    pub fn rotate_left(&mut self, which: &[bool], start: u64, stop: u64, amount: u64) -> Result<()> {
        self.rotate(which, start, stop, amount, true)
    }

    /// Rotates `[start, stop)` of the selected channels right by `amount`.
    pub fn rotate_right(&mut self, which: &[bool], start: u64, stop: u64, amount: u64) -> Result<()> {
        self.rotate(which, start, stop, amount, false)
    }

    fn rename_pool(&self, from: &str, to: &str) -> Result<()> {
        let element_size = self.file.pool_element_size(from)?;
        self.file.create_pool(to, element_size)?;
        let len = self.file.pool_len(from)?;
        self.file.move_data(to, 0, from, 0, len)?;
        self.file.remove_pool(from)?;
        Ok(())
    }

    fn renumber_channel(&self, from: usize, to: usize) -> Result<()> {
        self.rename_pool(&channel_pool_name(from), &channel_pool_name(to))?;
        self.rename_pool(&peak_pool_name(from), &peak_pool_name(to))
    }

    /// Inserts `count` silent channels before channel `at`.
    pub fn add_channels(&mut self, at: usize, count: usize) -> Result<()> {
        if at > self.channels {
            return Err(Error::InvalidChannel {
                channel: at,
                channels: self.channels,
            });
        }
        self.check_channel_limit(count)?;
        if count == 0 {
            return Ok(());
        }
        let len = self.length()?;
        self.structural("add_channels", |s| {
            for ch in (at..s.channels).rev() {
                s.renumber_channel(ch, ch + count)?;
            }
            for ch in at..at + count {
                s.create_channel_pools(ch, len)?;
            }
            s.channels += count;
            s.write_format_info()?;
            tracing::debug!(at, count, channels = s.channels, "added channels");
            Ok(())
        })
    }

    fn check_channel_limit(&self, adding: usize) -> Result<()> {
        if self.channels + adding > self.max_channels {
            return Err(Error::TooManyChannels {
                requested: self.channels + adding,
                limit: self.max_channels,
            });
        }
        Ok(())
    }

    /// Moves channels `[at, at + count)` into a temp pool set and returns
    /// its key. At least one channel must remain.
    pub fn remove_channels(&mut self, at: usize, count: usize) -> Result<TempKey> {
        if count == 0 || at + count > self.channels || count == self.channels {
            return Err(Error::InvalidChannel {
                channel: at + count,
                channels: self.channels,
            });
        }
        self.structural("remove_channels", |s| {
            let key = s.temps.allocate();
            let mut pools = BTreeMap::new();
            for i in 0..count {
                let temp = temp_pool_name(key, i);
                s.rename_pool(&channel_pool_name(at + i), &temp)?;
                s.file.remove_pool(&peak_pool_name(at + i))?;
                pools.insert(i, temp);
            }
            for ch in at + count..s.channels {
                s.renumber_channel(ch, ch - count)?;
            }
            s.channels -= count;
            s.write_format_info()?;
            s.temps.insert(
                key,
                TempPoolSet {
                    contents: TempContents::Channels { at },
                    pools,
                },
            );
            tracing::debug!(%key, at, count, channels = s.channels, "removed channels");
            Ok(key)
        })
    }

    /// Puts channels removed by [`remove_channels`](Self::remove_channels)
    /// back where they were and releases `key`.
    pub fn restore_channels_from_temp(&mut self, key: TempKey) -> Result<()> {
        let set = self.temps.get(key).ok_or(Error::TempPoolNotFound(key))?;
        let TempContents::Channels { at } = set.contents else {
            return Err(Error::TempPoolNotFound(key));
        };
        let temps: Vec<String> = set.pools.values().cloned().collect();
        let count = temps.len();
        if at > self.channels {
            return Err(Error::InvalidChannel {
                channel: at,
                channels: self.channels,
            });
        }
        self.check_channel_limit(count)?;
        self.structural("restore_channels_from_temp", |s| {
            for ch in (at..s.channels).rev() {
                s.renumber_channel(ch, ch + count)?;
            }
            for (i, temp) in temps.iter().enumerate() {
                s.rename_pool(temp, &channel_pool_name(at + i))?;
                s.file
                    .create_pool(&peak_pool_name(at + i), PeakChunk::SIZE as u32)?;
                s.peaks(at + i).rebuild()?;
            }
            s.channels += count;
            s.temps.remove(key);
            s.write_format_info()?;
            s.match_up_channel_lengths(NO_MAX_LENGTH)?;
            tracing::debug!(%key, at, count, channels = s.channels, "restored channels");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segue_config::EngineConfig;
    use tempfile::TempDir;

    fn config() -> EngineConfig {
        EngineConfig {
            block_size: 4096,
            peak_chunk_size: 16,
            ..EngineConfig::default()
        }
    }

    fn ramp_sound(dir: &TempDir, channels: usize, len: u64) -> Sound {
        let sound = Sound::create(dir.path().join("s.seg"), channels, 8000, len, &config()).unwrap();
        for ch in 0..channels {
            let values: Vec<Sample> = (0..len)
                .map(|i| (ch as Sample) * 1000.0 + i as Sample)
                .collect();
            sound.get_audio(ch).unwrap().write(0, &values).unwrap();
        }
        sound
    }

    fn samples(sound: &Sound, ch: usize) -> Vec<Sample> {
        let len = sound.length().unwrap();
        sound.get_audio(ch).unwrap().read_vec(0, len).unwrap()
    }

    #[test]
    fn add_space_pads_unselected_channels_at_end() {
        let dir = TempDir::new().unwrap();
        let mut sound = ramp_sound(&dir, 2, 10);
        sound.add_space(&[true, false], 4, 3, true, NO_MAX_LENGTH).unwrap();

        assert_eq!(sound.channel_lengths().unwrap(), vec![13, 13]);
        let left = samples(&sound, 0);
        assert_eq!(&left[..4], &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(&left[4..7], &[0.0, 0.0, 0.0]);
        assert_eq!(left[7], 4.0);
        let right = samples(&sound, 1);
        assert_eq!(right[9], 1009.0);
        assert_eq!(&right[10..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn max_length_truncates() {
        let dir = TempDir::new().unwrap();
        let mut sound = ramp_sound(&dir, 1, 10);
        sound.add_space(&[true], 0, 10, true, 15).unwrap();
        assert_eq!(sound.length().unwrap(), 15);
    }

    #[test]
    fn remove_everything_leaves_one_sample() {
        let dir = TempDir::new().unwrap();
        let mut sound = ramp_sound(&dir, 2, 10);
        sound.remove_space(&[true, true], 0, 10, NO_MAX_LENGTH).unwrap();
        assert_eq!(sound.channel_lengths().unwrap(), vec![1, 1]);
        assert_eq!(samples(&sound, 0), vec![0.0]);
    }

    #[test]
    fn remove_space_rejects_out_of_range() {
        let dir = TempDir::new().unwrap();
        let mut sound = ramp_sound(&dir, 1, 10);
        assert!(matches!(
            sound.remove_space(&[true], 5, 6, NO_MAX_LENGTH),
            Err(Error::Store(segue_store::Error::OutOfRange { .. }))
        ));
        assert!(matches!(
            sound.remove_space(&[true, true], 0, 1, NO_MAX_LENGTH),
            Err(Error::InvalidChannel { .. })
        ));
        assert_eq!(sound.length().unwrap(), 10);
    }

    #[test]
    fn fudge_copies_following_samples_then_zeros() {
        let dir = TempDir::new().unwrap();
        let mut sound = ramp_sound(&dir, 1, 10);
        let key = sound.move_data_to_temp(&[true], 6, 2, 4, NO_MAX_LENGTH).unwrap();
        let temp = sound.get_temp_audio(key, 0).unwrap();
        assert_eq!(temp.read_vec(0, 6).unwrap(), vec![6.0, 7.0, 8.0, 9.0, 0.0, 0.0]);
        assert_eq!(sound.length().unwrap(), 8);
    }

    #[test]
    fn replace_space_then_undo() {
        let dir = TempDir::new().unwrap();
        let mut sound = ramp_sound(&dir, 2, 40);
        let before = (samples(&sound, 0), samples(&sound, 1));
        let all = [true, true];

        let key = sound
            .move_data_to_temp_and_replace_space(&all, 10, 8, 20, 0, NO_MAX_LENGTH)
            .unwrap();
        assert_eq!(sound.length().unwrap(), 52);
        assert_eq!(samples(&sound, 0)[10..30], [0.0; 20]);

        sound
            .remove_space_and_move_data_from_temp(&all, 10, 20, key, 10, 8, true, NO_MAX_LENGTH)
            .unwrap();
        assert_eq!((samples(&sound, 0), samples(&sound, 1)), before);
        assert!(sound.temp_keys().is_empty());
        assert!(sound.orphan_temp_pools().is_empty());
    }

    #[test]
    fn move_from_unknown_key_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let mut sound = ramp_sound(&dir, 1, 10);
        assert!(matches!(
            sound.move_data_from_temp(&[true], TempKey(99), 0, 1, true, NO_MAX_LENGTH),
            Err(Error::TempPoolNotFound(TempKey(99)))
        ));
        assert_eq!(samples(&sound, 0).len(), 10);
    }

    #[test]
    fn move_from_temp_longer_than_pool_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut sound = ramp_sound(&dir, 1, 10);
        let key = sound.move_data_to_temp(&[true], 0, 3, 0, NO_MAX_LENGTH).unwrap();
        assert!(sound
            .move_data_from_temp(&[true], key, 0, 4, true, NO_MAX_LENGTH)
            .is_err());
        sound.move_data_from_temp(&[true], key, 0, 3, true, NO_MAX_LENGTH).unwrap();
        assert_eq!(samples(&sound, 0), (0..10).map(|i| i as Sample).collect::<Vec<_>>());
    }

    #[test]
    fn copy_and_restore_selection() {
        let dir = TempDir::new().unwrap();
        let mut sound = ramp_sound(&dir, 1, 20);
        let key = sound.copy_data_to_temp(&[true], 5, 5).unwrap();
        sound.get_audio(0).unwrap().zero(0, 20).unwrap();
        sound.restore_selection_from_temp(&[true], key, 5, 5).unwrap();
        assert_eq!(samples(&sound, 0)[5..10], [5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(sound.get_peak(0, 0, 20).unwrap().max, 9.0);
        sound.remove_temp_audio_pools(key).unwrap();
        assert!(matches!(
            sound.remove_temp_audio_pools(key),
            Err(Error::TempPoolNotFound(_))
        ));
    }

    #[test]
    fn rotations_are_inverse() {
        let dir = TempDir::new().unwrap();
        let mut sound = ramp_sound(&dir, 1, 10);
        sound.rotate_left(&[true], 2, 7, 2).unwrap();
        assert_eq!(
            samples(&sound, 0),
            vec![0.0, 1.0, 4.0, 5.0, 6.0, 2.0, 3.0, 7.0, 8.0, 9.0]
        );
        sound.rotate_right(&[true], 2, 7, 2).unwrap();
        assert_eq!(samples(&sound, 0), (0..10).map(|i| i as Sample).collect::<Vec<_>>());
        assert_eq!(sound.get_peak(0, 2, 7).unwrap().max, 6.0);
    }

    #[test]
    fn remove_and_restore_channels() {
        let dir = TempDir::new().unwrap();
        let mut sound = ramp_sound(&dir, 3, 8);
        let key = sound.remove_channels(1, 1).unwrap();
        assert_eq!(sound.channel_count(), 2);
        assert_eq!(samples(&sound, 1)[0], 2000.0);

        sound.restore_channels_from_temp(key).unwrap();
        assert_eq!(sound.channel_count(), 3);
        assert_eq!(samples(&sound, 1)[3], 1003.0);
        assert_eq!(samples(&sound, 2)[3], 2003.0);
        assert_eq!(sound.get_peak(1, 0, 8).unwrap().max, 1007.0);
        assert!(sound.pool_names().iter().all(|n| !n.starts_with("TempAudioPool")));
    }

    #[test]
    fn failed_rotation_leaves_every_channel_untouched() {
        let dir = TempDir::new().unwrap();
        let mut sound = ramp_sound(&dir, 2, 10);
        let before = samples(&sound, 0);
        sound.pool_file().remove_pool("Channel 2").unwrap();

        assert!(matches!(
            sound.rotate_left(&[true, true], 2, 7, 2),
            Err(Error::Store(segue_store::Error::PoolNotFound(_)))
        ));
        assert_eq!(samples(&sound, 0), before);
        assert_eq!(sound.get_peak(0, 2, 7).unwrap().max, 6.0);
    }

    #[test]
    fn failed_peak_update_restores_moved_samples() {
        let dir = TempDir::new().unwrap();
        let mut sound = ramp_sound(&dir, 2, 40);
        let before = (samples(&sound, 0), samples(&sound, 1));
        sound.pool_file().remove_pool("PeakChunk 2").unwrap();

        assert!(matches!(
            sound.move_data_to_temp(&[true, true], 5, 10, 0, NO_MAX_LENGTH),
            Err(Error::Store(segue_store::Error::PoolNotFound(_)))
        ));
        assert_eq!((samples(&sound, 0), samples(&sound, 1)), before);
        assert!(sound.temp_keys().is_empty());
        assert!(sound.pool_names().iter().all(|n| !n.starts_with("TempAudioPool")));
        assert!(sound.pool_names().iter().any(|n| n == "PeakChunk 2"));
        assert_eq!(sound.get_peak(1, 0, 40).unwrap().max, 1039.0);
    }

    #[test]
    fn add_channels_respects_limit() {
        let dir = TempDir::new().unwrap();
        let mut sound = ramp_sound(&dir, 2, 8);
        sound.add_channels(0, 1).unwrap();
        assert_eq!(sound.channel_count(), 3);
        assert_eq!(samples(&sound, 0), vec![0.0; 8]);
        assert_eq!(samples(&sound, 1)[1], 1.0);
        assert!(matches!(
            sound.add_channels(0, 6),
            Err(Error::TooManyChannels { requested: 9, limit: 8 })
        ));
        assert!(matches!(
            sound.remove_channels(0, 3),
            Err(Error::InvalidChannel { .. })
        ));
    }
}
