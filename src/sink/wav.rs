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
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;
use tracing::{info, warn};

use super::{FrameSink, SinkError};
use crate::injector::{InjectorFrame, InjectorId};

struct Mix {
    /// Next write position of each injector, in frames.
    offsets: HashMap<InjectorId, usize>,
    /// Stereo interleaved accumulator.
    buffer: Vec<i32>,
    writer: Option<WavWriter<BufWriter<File>>>,
}

/// Mixes every injector into a stereo 16-bit WAV file. Each injector starts
/// at the beginning of the file and advances by the frames it sends, so the
/// result is what a receiver would hear if every sound started together.
pub struct Sink {
    path: PathBuf,
    mix: Mutex<Mix>,
}

impl Sink {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Sink, SinkError> {
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec)?;
        info!(path = ?path, sample_rate, "Writing injector output");
        Ok(Sink {
            path: path.to_path_buf(),
            mix: Mutex::new(Mix {
                offsets: HashMap::new(),
                buffer: Vec::new(),
                writer: Some(writer),
            }),
        })
    }

    /// Writes the mix out and closes the file. Later frames are rejected.
    pub fn finalize(&self) -> Result<(), SinkError> {
        let mut mix = self.mix.lock();
        let Some(mut writer) = mix.writer.take() else {
            return Ok(());
        };
        for sample in mix.buffer.iter() {
            writer.write_sample((*sample).clamp(i16::MIN as i32, i16::MAX as i32) as i16)?;
        }
        writer.finalize()?;
        info!(
            path = ?self.path,
            frames = mix.buffer.len() / 2,
            "Finished writing injector output"
        );
        Ok(())
    }
}

impl FrameSink for Sink {
    fn send_frame(&self, id: InjectorId, frame: &InjectorFrame) -> Result<(), SinkError> {
        let mut mix = self.mix.lock();
        if mix.writer.is_none() {
            return Err(SinkError::Closed);
        }

        let channels = if frame.stereo { 2 } else { 1 };
        let frames = frame.sample_count() / channels;
        let offset = mix.offsets.get(&id).copied().unwrap_or(0);
        let end = (offset + frames) * 2;
        if mix.buffer.len() < end {
            mix.buffer.resize(end, 0);
        }

        if let Some(samples) = frame.samples() {
            let out = &mut mix.buffer[offset * 2..end];
            for (dst, src) in out.chunks_exact_mut(2).zip(samples.chunks_exact(channels)) {
                let (left, right) = if channels == 2 {
                    (src[0], src[1])
                } else {
                    (src[0], src[0])
                };
                dst[0] += left as i32;
                dst[1] += right as i32;
            }
        }

        mix.offsets.insert(id, offset + frames);
        Ok(())
    }

    fn stop(&self, id: InjectorId) {
        self.mix.lock().offsets.remove(&id);
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            warn!(path = ?self.path, error = %e, "Failed to finish WAV output");
        }
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (WAV)", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::*;
    use crate::injector::{Injector, InjectorOptions, Payload, Sound};

    fn frame(payload: Payload, stereo: bool) -> InjectorFrame {
        InjectorFrame {
            sequence: 0,
            stereo,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            payload,
            loudness: 0.0,
        }
    }

    fn ids() -> (InjectorId, InjectorId) {
        let sound = Sound::from_raw(vec![0i16; 1], false, 24000);
        let a = Injector::new(sound.clone(), InjectorOptions::default(), Default::default());
        let b = Injector::new(sound, InjectorOptions::default(), Default::default());
        (a.id(), b.id())
    }

    #[test]
    fn test_mixes_injectors() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.wav");
        let sink = Sink::create(&path, 24000)?;
        let (a, b) = ids();

        sink.send_frame(a, &frame(Payload::Audio(vec![100, 200]), false))?;
        sink.send_frame(b, &frame(Payload::Audio(vec![10, 20, 30, 40]), true))?;
        sink.send_frame(a, &frame(Payload::Silent { samples: 2 }, false))?;
        sink.send_frame(a, &frame(Payload::Audio(vec![i16::MAX]), false))?;
        sink.send_frame(b, &frame(Payload::Audio(vec![i16::MAX, 0]), true))?;
        sink.finalize()?;

        assert!(matches!(
            sink.send_frame(a, &frame(Payload::Audio(vec![1]), false)),
            Err(SinkError::Closed)
        ));

        let mut reader = hound::WavReader::open(&path)?;
        assert_eq!(reader.spec().channels, 2);
        let samples: Vec<i16> = reader.samples::<i16>().collect::<Result<_, _>>()?;
        assert_eq!(
            samples,
            vec![110, 120, 230, 240, i16::MAX, 0, 0, 0, i16::MAX, i16::MAX]
        );
        Ok(())
    }
}
