// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Immutable sound assets.
//!
//! Sample data is held in an `Arc` so every injector playing the same asset
//! shares one copy.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hound::{SampleFormat, WavReader};
use tracing::{debug, info};

use crate::audio::resampler::{convert, DitherBank};
use crate::audio::Resampler;

#[derive(Debug, thiserror::Error)]
pub enum SoundError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("{0} has no audio channels")]
    NoChannels(PathBuf),
}

/// Interleaved 16-bit audio, mono or stereo.
#[derive(Clone)]
pub struct Sound {
    samples: Arc<[i16]>,
    stereo: bool,
    sample_rate: u32,
}

impl Sound {
    /// Wraps raw interleaved samples recorded at `sample_rate`.
    pub fn from_raw(samples: impl Into<Arc<[i16]>>, stereo: bool, sample_rate: u32) -> Sound {
        let samples = samples.into();
        debug_assert!(!stereo || samples.len() % 2 == 0);
        Sound {
            samples,
            stereo,
            sample_rate,
        }
    }

    /// Loads a WAV file and converts it to `target_rate`. Files with more than
    /// two channels keep their first two.
    pub fn load(path: &Path, target_rate: u32) -> Result<Sound, SoundError> {
        let read_error = |source| SoundError::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = WavReader::open(path).map_err(read_error)?;
        let spec = reader.spec();
        let source_channels = spec.channels as usize;
        if source_channels == 0 {
            return Err(SoundError::NoChannels(path.to_path_buf()));
        }
        let channels = source_channels.min(2);

        info!(
            path = ?path,
            channels = source_channels,
            sample_rate = spec.sample_rate,
            bits = spec.bits_per_sample,
            "Loading sound"
        );

        let samples: Vec<i16> = if spec.sample_format == SampleFormat::Int
            && spec.bits_per_sample == 16
            && spec.sample_rate == target_rate
            && source_channels == channels
        {
            reader
                .samples::<i16>()
                .collect::<Result<_, _>>()
                .map_err(read_error)?
        } else {
            let decoded: Vec<f32> = match spec.sample_format {
                SampleFormat::Float => reader
                    .samples::<f32>()
                    .collect::<Result<_, _>>()
                    .map_err(read_error)?,
                SampleFormat::Int => {
                    let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
                    reader
                        .samples::<i32>()
                        .map(|s| s.map(|v| v as f32 * scale))
                        .collect::<Result<_, _>>()
                        .map_err(read_error)?
                }
            };

            let folded: Vec<f32> = if source_channels == channels {
                decoded
            } else {
                decoded
                    .chunks_exact(source_channels)
                    .flat_map(|frame| frame[..channels].iter().copied())
                    .collect()
            };

            let converted = if spec.sample_rate != target_rate {
                debug!(
                    source_rate = spec.sample_rate,
                    target_rate, "Resampling sound"
                );
                let frames = folded.len() / channels;
                let mut resampler = Resampler::new(spec.sample_rate, target_rate, channels);
                let mut out = vec![0.0; resampler.max_output(frames) * channels];
                let made = resampler.render_interleaved(&folded, &mut out, frames);
                out.truncate(made * channels);
                out
            } else {
                folded
            };

            let mut dither = DitherBank::new();
            let mut quantized = Vec::with_capacity(converted.len());
            for frame in converted.chunks_exact(channels) {
                let d = dither.next_value();
                quantized.extend(frame.iter().map(|s| convert::quantize(*s, d)));
            }
            quantized
        };

        let sound = Sound::from_raw(samples, channels == 2, target_rate);
        info!(
            path = ?path,
            stereo = sound.is_stereo(),
            duration_ms = sound.duration().as_millis(),
            memory_kb = sound.memory_size() / 1024,
            "Sound loaded"
        );
        Ok(sound)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub(crate) fn shared_samples(&self) -> Arc<[i16]> {
        self.samples.clone()
    }

    pub fn is_stereo(&self) -> bool {
        self.stereo
    }

    pub fn channels(&self) -> usize {
        if self.stereo {
            2
        } else {
            1
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.frames() as u64 * 1_000_000_000 / self.sample_rate as u64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.samples.len() * std::mem::size_of::<i16>()
    }
}

impl fmt::Debug for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sound")
            .field("frames", &self.frames())
            .field("stereo", &self.stereo)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::testutil::audio_test_utils::{generate_sine, interleave, to_i16};
    use crate::testutil::write_wav;

    #[test]
    fn test_from_raw() {
        let sound = Sound::from_raw(vec![0i16; 480], true, 24000);
        assert_eq!(sound.frames(), 240);
        assert_eq!(sound.channels(), 2);
        assert_eq!(sound.duration(), Duration::from_millis(10));
    }

    #[test]
    fn test_load_matching_rate_is_lossless() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let samples = to_i16(&generate_sine(440.0, 0.5, 24000, 0.1));
        write_wav(&path, &samples, 1, 24000).unwrap();

        let sound = Sound::load(&path, 24000).unwrap();
        assert!(!sound.is_stereo());
        assert_eq!(sound.samples(), &samples[..]);
    }

    #[test]
    fn test_load_resamples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let left = generate_sine(440.0, 0.5, 48000, 0.5);
        let right = generate_sine(880.0, 0.5, 48000, 0.5);
        write_wav(&path, &interleave(&[left, right]), 2, 48000).unwrap();

        let sound = Sound::load(&path, 24000).unwrap();
        assert!(sound.is_stereo());
        assert_eq!(sound.sample_rate(), 24000);
        assert_eq!(sound.frames(), 12000);
    }

    #[test]
    fn test_load_folds_extra_channels() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quad.wav");
        let frames: Vec<i16> = (0..400).map(|i| (i % 4) as i16 * 1000).collect();
        write_wav(&path, &frames, 4, 24000).unwrap();

        let sound = Sound::load(&path, 24000).unwrap();
        assert!(sound.is_stereo());
        assert_eq!(sound.frames(), 100);
        for frame in sound.samples().chunks_exact(2) {
            assert!(frame[0].abs() <= 1);
            assert!((frame[1] - 1000).abs() <= 1);
        }
    }

    #[test]
    fn test_load_missing_file() {
        let err = Sound::load(Path::new("/nonexistent/sound.wav"), 24000).unwrap_err();
        assert!(matches!(err, SoundError::Read { .. }));
    }
}
