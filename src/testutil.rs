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

use std::{error::Error, fs::File, path::Path};

use hound::{SampleFormat, WavSpec, WavWriter};

mod polling;

pub use self::polling::eventually;

/// Audio test utilities for generating test signals and validating results
pub mod audio_test_utils {
    use std::f32::consts::PI;

    /// Generate a sine wave
    pub fn generate_sine(
        frequency: f32,
        amplitude: f32,
        sample_rate: u32,
        duration_seconds: f32,
    ) -> Vec<f32> {
        let sample_count = (sample_rate as f32 * duration_seconds) as usize;
        (0..sample_count)
            .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    /// Interleave equal-length channels into frames
    pub fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        let mut out = Vec::with_capacity(frames * channels.len());
        for i in 0..frames {
            for channel in channels {
                out.push(channel[i]);
            }
        }
        out
    }

    /// Convert float samples to 16-bit without dither
    pub fn to_i16(samples: &[f32]) -> Vec<i16> {
        samples
            .iter()
            .map(|s| (s * 32767.0).round().clamp(-32768.0, 32767.0) as i16)
            .collect()
    }

    /// Calculate RMS (Root Mean Square) of a signal
    pub fn calculate_rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }

        let sum_squares: f32 = samples.iter().map(|&x| x * x).sum();
        (sum_squares / samples.len() as f32).sqrt()
    }
}

/// Writes interleaved samples to a WAV file.
pub fn write_wav<S: hound::Sample + Copy + 'static>(
    path: &Path,
    samples: &[S],
    channels: u16,
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let (sample_format, bits_per_sample) =
        if std::any::TypeId::of::<S>() == std::any::TypeId::of::<f32>() {
            (SampleFormat::Float, 32)
        } else if std::any::TypeId::of::<S>() == std::any::TypeId::of::<i16>() {
            (SampleFormat::Int, 16)
        } else if std::any::TypeId::of::<S>() == std::any::TypeId::of::<i32>() {
            (SampleFormat::Int, 32)
        } else {
            return Err("Unsupported sample format".into());
        };

    let mut writer = WavWriter::new(
        File::create(path)?,
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample,
            sample_format,
        },
    )?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;

    Ok(())
}
