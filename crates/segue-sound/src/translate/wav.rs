use std::path::Path;

use hound::{SampleFormat, WavReader, WavWriter};
use segue_config::EngineConfig;

use super::{Progress, SoundTranslator, has_extension};
use crate::sound::{Sample, Sound};
use crate::{Error, Result};

/// Frames moved per accessor call.
const FRAMES_PER_CHUNK: u64 = 4096;

/// WAV import/export through `hound`.
///
/// Reads PCM of any bit depth and 32-bit float. Writes PCM 16 or 24, or
/// 32-bit float.
#[derive(Debug, Clone, Copy)]
pub struct WavTranslator {
    /// Bit depth used when saving. 32 means IEEE float.
    pub bits_per_sample: u16,
}

impl Default for WavTranslator {
    fn default() -> Self {
        Self {
            bits_per_sample: 32,
        }
    }
}

impl WavTranslator {
    /// Translator that saves at `bits_per_sample` (16, 24, or 32).
    pub fn new(bits_per_sample: u16) -> Result<Self> {
        if !matches!(bits_per_sample, 16 | 24 | 32) {
            return Err(Error::UnsupportedFormat(format!(
                "{bits_per_sample}-bit WAV output"
            )));
        }
        Ok(Self { bits_per_sample })
    }

    fn spec(&self, sound: &Sound) -> hound::WavSpec {
        hound::WavSpec {
            channels: sound.channel_count() as u16,
            sample_rate: sound.sample_rate(),
            bits_per_sample: self.bits_per_sample,
            sample_format: if self.bits_per_sample == 32 {
                SampleFormat::Float
            } else {
                SampleFormat::Int
            },
        }
    }
}

/// Deinterleaves `samples` into the channels of `sound`.
fn import_frames(
    sound: &Sound,
    mut samples: impl Iterator<Item = hound::Result<Sample>>,
    frames: u64,
    progress: Progress<'_>,
) -> Result<()> {
    let channels = sound.channel_count();
    let accessors = (0..channels)
        .map(|ch| sound.get_audio(ch))
        .collect::<Result<Vec<_>>>()?;
    let mut planes = vec![Vec::with_capacity(FRAMES_PER_CHUNK as usize); channels];

    let mut done = 0;
    while done < frames {
        let n = FRAMES_PER_CHUNK.min(frames - done);
        for plane in &mut planes {
            plane.clear();
        }
        for _ in 0..n {
            for plane in &mut planes {
                let sample = samples
                    .next()
                    .ok_or_else(|| Error::InvalidFormat("WAV data ends early".into()))??;
                plane.push(sample);
            }
        }
        for (acc, plane) in accessors.iter().zip(&planes) {
            acc.write(done, plane)?;
        }
        done += n;
        progress(done, frames);
    }
    Ok(())
}

impl SoundTranslator for WavTranslator {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn handles_path(&self, path: &Path) -> bool {
        has_extension(path, &["wav", "wave"])
    }

    fn load(
        &self,
        path: &Path,
        working_path: &Path,
        config: &EngineConfig,
        progress: Progress<'_>,
    ) -> Result<Sound> {
        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels);
        let frames = u64::from(reader.duration());
        let sound = Sound::create(working_path, channels, spec.sample_rate, frames, config)?;

        match spec.sample_format {
            SampleFormat::Float => {
                import_frames(&sound, reader.samples::<f32>(), frames, progress)?;
            }
            SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as Sample;
                let samples = reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as Sample / max_val));
                import_frames(&sound, samples, frames, progress)?;
            }
        }
        tracing::debug!(
            path = %path.display(),
            channels,
            frames,
            bits = spec.bits_per_sample,
            "imported WAV"
        );
        Ok(sound)
    }

    fn save(&self, sound: &Sound, path: &Path, progress: Progress<'_>) -> Result<()> {
        let spec = self.spec(sound);
        let mut writer = WavWriter::create(path, spec)?;
        let channels = sound.channel_count();
        let frames = sound.length()?;
        let accessors = (0..channels)
            .map(|ch| sound.get_audio(ch))
            .collect::<Result<Vec<_>>>()?;
        let max_val = (1i64 << (self.bits_per_sample - 1)) as Sample;
        let mut planes = vec![vec![0.0; FRAMES_PER_CHUNK as usize]; channels];

        let mut done = 0;
        while done < frames {
            let n = FRAMES_PER_CHUNK.min(frames - done) as usize;
            for (acc, plane) in accessors.iter().zip(&mut planes) {
                acc.read(done, &mut plane[..n])?;
            }
            for i in 0..n {
                for plane in &planes {
                    if self.bits_per_sample == 32 {
                        writer.write_sample(plane[i])?;
                    } else {
                        let int_sample = (plane[i] * max_val).clamp(-max_val, max_val - 1.0) as i32;
                        writer.write_sample(int_sample)?;
                    }
                }
            }
            done += n as u64;
            progress(done, frames);
        }
        writer.finalize()?;
        Ok(())
    }
}
