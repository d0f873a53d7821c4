//! Sample-wise mixing between a channel and any sample source.

use segue_store::PoolAccessor;

use crate::sound::{ChannelAccessor, Sample, Sound};
use crate::{Error, Result};

const MIX_CHUNK: u64 = 4096;

/// How source samples combine with destination samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixMethod {
    /// Replace the destination.
    #[default]
    Overwrite,
    /// `dst + src`
    Add,
    /// `dst - src`
    Subtract,
    /// `dst * src`
    Multiply,
    /// `(dst + src) / 2`
    Average,
}

impl MixMethod {
    #[inline]
    fn apply(self, dst: Sample, src: Sample) -> Sample {
        match self {
            MixMethod::Overwrite => src,
            MixMethod::Add => dst + src,
            MixMethod::Subtract => dst - src,
            MixMethod::Multiply => dst * src,
            MixMethod::Average => (dst + src) * 0.5,
        }
    }
}

/// Anything samples can be read from: another sound's channel, a temp
/// pool, a clipboard buffer.
pub trait SampleSource {
    /// Samples available.
    fn source_len(&self) -> Result<u64>;

    /// Fills `out` with samples starting at `pos`.
    fn read_samples(&self, pos: u64, out: &mut [Sample]) -> Result<()>;
}

impl SampleSource for PoolAccessor<'_, Sample> {
    fn source_len(&self) -> Result<u64> {
        Ok(self.len()?)
    }

    fn read_samples(&self, pos: u64, out: &mut [Sample]) -> Result<()> {
        Ok(self.read(pos, out)?)
    }
}

impl SampleSource for ChannelAccessor<'_> {
    fn source_len(&self) -> Result<u64> {
        self.len()
    }

    fn read_samples(&self, pos: u64, out: &mut [Sample]) -> Result<()> {
        self.read(pos, out)
    }
}

impl SampleSource for [Sample] {
    fn source_len(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }

    fn read_samples(&self, pos: u64, out: &mut [Sample]) -> Result<()> {
        let start = pos as usize;
        let end = start
            .checked_add(out.len())
            .filter(|&end| end <= self.len())
            .ok_or(segue_store::Error::OutOfRange {
                pos,
                count: out.len() as u64,
                len: self.len() as u64,
            })?;
        out.copy_from_slice(&self[start..end]);
        Ok(())
    }
}

impl SampleSource for Vec<Sample> {
    fn source_len(&self) -> Result<u64> {
        self.as_slice().source_len()
    }

    fn read_samples(&self, pos: u64, out: &mut [Sample]) -> Result<()> {
        self.as_slice().read_samples(pos, out)
    }
}

impl Sound {
    /// Mixes `length` samples of `src` starting at `src_at` into
    /// `dest_channel` starting at `at`.
    ///
    /// Does not change length; both ranges must already exist.
    pub fn mix_sound<S: SampleSource + ?Sized>(
        &self,
        dest_channel: usize,
        at: u64,
        src: &S,
        src_at: u64,
        length: u64,
        method: MixMethod,
    ) -> Result<()> {
        let dest = self.get_audio(dest_channel)?;
        let dest_len = dest.len()?;
        if at.checked_add(length).is_none_or(|end| end > dest_len) {
            return Err(Error::Store(segue_store::Error::OutOfRange {
                pos: at,
                count: length,
                len: dest_len,
            }));
        }
        let src_len = src.source_len()?;
        if src_at.checked_add(length).is_none_or(|end| end > src_len) {
            return Err(Error::Store(segue_store::Error::OutOfRange {
                pos: src_at,
                count: length,
                len: src_len,
            }));
        }

        let n = MIX_CHUNK.min(length) as usize;
        let mut src_buf = vec![0.0; n];
        let mut dst_buf = vec![0.0; n];
        let mut done = 0;
        while done < length {
            let n = MIX_CHUNK.min(length - done) as usize;
            src.read_samples(src_at + done, &mut src_buf[..n])?;
            if method != MixMethod::Overwrite {
                dest.read(at + done, &mut dst_buf[..n])?;
            }
            for (d, &s) in dst_buf[..n].iter_mut().zip(&src_buf[..n]) {
                *d = method.apply(*d, s);
            }
            dest.write(at + done, &dst_buf[..n])?;
            done += n as u64;
        }
        tracing::debug!(channel = dest_channel, at, length, ?method, "mixed samples");
        Ok(())
    }

    /// Silences `[at, at + length)` in the selected channels.
    pub fn silence_sound(&self, which: &[bool], at: u64, length: u64) -> Result<()> {
        self.check_mask(which)?;
        self.check_range(at, length)?;
        for (ch, _) in which.iter().enumerate().filter(|&(_, &on)| on) {
            self.get_audio(ch)?.zero(at, length)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segue_config::EngineConfig;
    use tempfile::TempDir;

    fn sound(dir: &TempDir, values: &[Sample]) -> Sound {
        let sound = Sound::create(
            dir.path().join("m.seg"),
            2,
            8000,
            values.len() as u64,
            &EngineConfig::default(),
        )
        .unwrap();
        sound.get_audio(0).unwrap().write(0, values).unwrap();
        sound
    }

    #[test]
    fn methods_combine_samples() {
        assert_eq!(MixMethod::Overwrite.apply(2.0, 3.0), 3.0);
        assert_eq!(MixMethod::Add.apply(2.0, 3.0), 5.0);
        assert_eq!(MixMethod::Subtract.apply(2.0, 3.0), -1.0);
        assert_eq!(MixMethod::Multiply.apply(2.0, 3.0), 6.0);
        assert_eq!(MixMethod::Average.apply(2.0, 3.0), 2.5);
    }

    #[test]
    fn mix_from_buffer_and_other_channel() {
        let dir = TempDir::new().unwrap();
        let s = sound(&dir, &[1.0, 2.0, 3.0, 4.0]);
        let clip: [Sample; 2] = [10.0, 10.0];
        s.mix_sound(0, 1, &clip[..], 0, 2, MixMethod::Add).unwrap();
        assert_eq!(
            s.get_audio(0).unwrap().read_vec(0, 4).unwrap(),
            vec![1.0, 12.0, 13.0, 4.0]
        );

        let src = s.get_audio(0).unwrap();
        s.mix_sound(1, 0, &src, 0, 4, MixMethod::Overwrite).unwrap();
        assert_eq!(s.get_peak(1, 0, 4).unwrap().max, 13.0);
    }

    #[test]
    fn mix_rejects_short_destination_and_source() {
        let dir = TempDir::new().unwrap();
        let s = sound(&dir, &[0.0; 4]);
        let src: Vec<Sample> = vec![1.0; 8];
        assert!(s.mix_sound(0, 2, &src, 0, 3, MixMethod::Add).is_err());
        assert!(s.mix_sound(0, 0, &src, 6, 3, MixMethod::Add).is_err());
        assert!(matches!(
            s.mix_sound(2, 0, &src, 0, 1, MixMethod::Add),
            Err(Error::InvalidChannel { .. })
        ));
    }

    #[test]
    fn mix_rejects_source_offset_overflow() {
        let dir = TempDir::new().unwrap();
        let s = sound(&dir, &[0.25; 4]);
        let src: Vec<Sample> = vec![1.0; 4];
        assert!(matches!(
            s.mix_sound(0, 0, &src, u64::MAX, 2, MixMethod::Add),
            Err(Error::Store(segue_store::Error::OutOfRange { .. }))
        ));
        assert_eq!(s.get_audio(0).unwrap().read_vec(0, 4).unwrap(), vec![0.25; 4]);
    }

    #[test]
    fn silence_clears_selected_channels_only() {
        let dir = TempDir::new().unwrap();
        let s = sound(&dir, &[0.5; 6]);
        s.get_audio(1).unwrap().write(0, &[0.5; 6]).unwrap();
        s.silence_sound(&[true, false], 1, 4).unwrap();
        assert_eq!(
            s.get_audio(0).unwrap().read_vec(0, 6).unwrap(),
            vec![0.5, 0.0, 0.0, 0.0, 0.0, 0.5]
        );
        assert_eq!(s.get_peak(1, 0, 6).unwrap().min, 0.5);
    }
}
