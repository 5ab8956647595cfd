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

//! A single in-flight sound and the frames it produces.
//!
//! An [`Injector`] is owned by the scheduler's worker thread once submitted.
//! Other threads observe it through the atomics in [`InjectorShared`] and
//! change it only by sending commands to the worker.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::audio::{self, Resampler};

pub mod frame;
pub mod options;
pub mod sound;

pub use self::frame::{InjectorFrame, Payload};
pub use self::options::InjectorOptions;
pub use self::sound::{Sound, SoundError};

/// Global injector ID counter.
static NEXT_INJECTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Frames an injector may fall behind its clock before it skips ahead.
pub const DEFAULT_MAX_LAG_FRAMES: u32 = 15;

/// Process-unique injector identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InjectorId(u64);

impl InjectorId {
    fn next() -> InjectorId {
        InjectorId(NEXT_INJECTOR_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InjectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "injector-{}", self.0)
    }
}

/// Lifecycle of an injector.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InjectorState {
    Created = 0,
    Queued = 1,
    Producing = 2,
    Finished = 3,
}

impl InjectorState {
    fn from_u8(value: u8) -> InjectorState {
        match value {
            0 => InjectorState::Created,
            1 => InjectorState::Queued,
            2 => InjectorState::Producing,
            _ => InjectorState::Finished,
        }
    }
}

/// State readable from any thread without going through the worker.
#[derive(Debug)]
pub(crate) struct InjectorShared {
    state: AtomicU8,
    playing: AtomicBool,
    loudness: AtomicU32,
}

impl InjectorShared {
    fn new() -> InjectorShared {
        InjectorShared {
            state: AtomicU8::new(InjectorState::Created as u8),
            playing: AtomicBool::new(false),
            loudness: AtomicU32::new(0f32.to_bits()),
        }
    }

    pub(crate) fn state(&self) -> InjectorState {
        InjectorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: InjectorState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub(crate) fn loudness(&self) -> f32 {
        f32::from_bits(self.loudness.load(Ordering::Relaxed))
    }

    fn set_loudness(&self, loudness: f32) {
        self.loudness.store(loudness.to_bits(), Ordering::Relaxed);
    }
}

/// Frame size and cadence shared by every injector of a scheduler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameFormat {
    /// Rate frames are produced at, in Hz.
    pub sample_rate: u32,
    /// Samples per channel in each frame.
    pub frame_samples: usize,
    /// Frames an injector may fall behind before skipping ahead.
    pub max_lag_frames: u32,
}

impl Default for FrameFormat {
    fn default() -> Self {
        FrameFormat {
            sample_rate: audio::NETWORK_SAMPLE_RATE,
            frame_samples: audio::NETWORK_FRAME_SAMPLES,
            max_lag_frames: DEFAULT_MAX_LAG_FRAMES,
        }
    }
}

impl FrameFormat {
    pub fn frame_duration(&self) -> Duration {
        audio::frame_duration(self.sample_rate, self.frame_samples)
    }
}

/// Result of asking an injector for its next frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// A frame was produced; the next one is due after `delay`.
    Continue { frame: InjectorFrame, delay: Duration },
    /// No more data.
    Finished,
}

/// One playing sound.
pub struct Injector {
    id: InjectorId,
    sound: Sound,
    /// The sound as it will be played: shared with `sound` at unity pitch,
    /// otherwise resampled once when options are applied.
    playback: Arc<[i16]>,
    /// Present only while the pitch or rate differs from the frame format.
    resampler: Option<Resampler>,
    options: InjectorOptions,
    format: FrameFormat,
    cursor: usize,
    exhausted: bool,
    sequence: u16,
    clock: Option<Instant>,
    frames_produced: u64,
    pending_delete: bool,
    shared: Arc<InjectorShared>,
}

impl Injector {
    pub fn new(sound: Sound, options: InjectorOptions, format: FrameFormat) -> Injector {
        let mut injector = Injector {
            id: InjectorId::next(),
            playback: sound.shared_samples(),
            sound,
            resampler: None,
            options,
            format,
            cursor: 0,
            exhausted: false,
            sequence: 0,
            clock: None,
            frames_produced: 0,
            pending_delete: false,
            shared: Arc::new(InjectorShared::new()),
        };
        injector.prepare_playback();
        injector
    }

    pub fn id(&self) -> InjectorId {
        self.id
    }

    pub fn state(&self) -> InjectorState {
        self.shared.state()
    }

    pub fn options(&self) -> &InjectorOptions {
        &self.options
    }

    /// Number of frames (samples per channel) that will be played.
    pub fn playback_frames(&self) -> usize {
        self.playback.len() / self.sound.channels()
    }

    pub(crate) fn shared(&self) -> &Arc<InjectorShared> {
        &self.shared
    }

    pub(crate) fn set_pending_delete(&mut self, pending_delete: bool) {
        self.pending_delete = pending_delete;
    }

    pub(crate) fn is_pending_delete(&self) -> bool {
        self.pending_delete
    }

    /// Whether any handle outside the worker still refers to this injector.
    pub(crate) fn has_handles(&self) -> bool {
        Arc::strong_count(&self.shared) > 1
    }

    pub(crate) fn mark_queued(&self) {
        self.shared.set_state(InjectorState::Queued);
    }

    /// Produces the next frame, or reports that playback is over.
    pub fn produce_next_frame(&mut self) -> FrameOutcome {
        if self.exhausted || self.playback.is_empty() || self.state() == InjectorState::Finished
        {
            return FrameOutcome::Finished;
        }

        let now = Instant::now();
        let clock = *self.clock.get_or_insert(now);
        if self.state() != InjectorState::Producing {
            self.shared.set_state(InjectorState::Producing);
            self.shared.set_playing(true);
        }

        let frame_len = self.format.frame_samples * self.sound.channels();
        let volume = self.options.clamped_volume();

        let (payload, loudness) = if volume == 0.0 {
            self.read(frame_len, None);
            let samples = u16::try_from(frame_len).unwrap_or(u16::MAX);
            (Payload::Silent { samples }, 0.0)
        } else {
            let mut buffer = Vec::with_capacity(frame_len);
            self.read(frame_len, Some(&mut buffer));
            if volume < 1.0 {
                for sample in &mut buffer {
                    *sample = (*sample as f32 * volume).round() as i16;
                }
            }
            let loudness = loudness(&buffer);
            (Payload::Audio(buffer), loudness)
        };
        self.shared.set_loudness(loudness);

        let frame = InjectorFrame {
            sequence: self.sequence,
            stereo: self.sound.is_stereo(),
            position: self.options.position,
            orientation: self.options.orientation,
            payload,
            loudness,
        };
        self.sequence = self.sequence.wrapping_add(1);

        let delay = self.next_delay(now.saturating_duration_since(clock));
        FrameOutcome::Continue { frame, delay }
    }

    /// Copies `len` samples from the cursor into `out`, wrapping when looping
    /// and padding with silence at the end otherwise.
    fn read(&mut self, len: usize, mut out: Option<&mut Vec<i16>>) {
        let total = self.playback.len();
        let mut remaining = len;
        while remaining > 0 {
            if self.cursor >= total {
                if self.options.looping {
                    self.cursor = 0;
                } else {
                    break;
                }
            }
            let take = remaining.min(total - self.cursor);
            if let Some(out) = out.as_deref_mut() {
                out.extend_from_slice(&self.playback[self.cursor..self.cursor + take]);
            }
            self.cursor += take;
            remaining -= take;
        }

        if let Some(out) = out {
            out.resize(len, 0);
        }
        if !self.options.looping && self.cursor >= total {
            self.exhausted = true;
        }
    }

    /// Delay until the next frame is due on this injector's clock. Skips
    /// ahead when more than `max_lag_frames` behind.
    fn next_delay(&mut self, elapsed: Duration) -> Duration {
        let frame_nanos = self.format.frame_duration().as_nanos().max(1);
        self.frames_produced += 1;

        let elapsed_frames = (elapsed.as_nanos() / frame_nanos) as u64;
        if elapsed_frames > self.frames_produced + self.format.max_lag_frames as u64 {
            warn!(
                id = %self.id,
                behind = elapsed_frames - self.frames_produced,
                "Injector fell behind; skipping ahead"
            );
            self.frames_produced = elapsed_frames;
        }

        let due = Duration::from_nanos((self.frames_produced as u128 * frame_nanos) as u64);
        due.saturating_sub(elapsed)
    }

    /// Marks the injector finished. Returns false if it already was.
    pub(crate) fn finish(&mut self) -> bool {
        if self.state() == InjectorState::Finished {
            return false;
        }
        self.shared.set_state(InjectorState::Finished);
        self.shared.set_playing(false);
        self.shared.set_loudness(0.0);
        debug!(id = %self.id, frames = self.frames_produced, "Injector finished");
        true
    }

    /// Rewinds to the beginning and restarts the frame clock.
    pub(crate) fn restart(&mut self) {
        self.cursor = 0;
        self.exhausted = false;
        self.clock = None;
        self.frames_produced = 0;
        self.shared.set_state(InjectorState::Queued);
        self.shared.set_playing(false);
        debug!(id = %self.id, "Injector restarted");
    }

    /// Applies new options. A pitch change re-resamples the sound and keeps
    /// the relative play position.
    pub(crate) fn set_options(&mut self, options: InjectorOptions) {
        let repitch = options.clamped_pitch() != self.options.clamped_pitch();
        self.options = options;
        if repitch {
            let old_frames = self.playback_frames();
            let position = self.cursor / self.sound.channels();
            self.prepare_playback();
            let new_frames = self.playback_frames();
            let scaled = if old_frames == 0 {
                0
            } else {
                (position as u64 * new_frames as u64 / old_frames as u64) as usize
            };
            self.cursor = scaled * self.sound.channels();
        }
        // Turning looping on revives an injector that just ran out.
        self.exhausted = !self.options.looping && self.cursor >= self.playback.len();
    }

    fn prepare_playback(&mut self) {
        let pitch = self.options.clamped_pitch();
        let output_rate = (self.format.sample_rate as f64 / pitch as f64) as u32;
        let input_rate = self.sound.sample_rate();

        if input_rate == output_rate {
            self.resampler = None;
            self.playback = self.sound.shared_samples();
            return;
        }

        let channels = self.sound.channels();
        let resampler = match self.resampler.take() {
            Some(mut r) if r.input_rate() == input_rate && r.output_rate() == output_rate => {
                r.reset();
                r
            }
            _ => Resampler::new(input_rate, output_rate.max(1), channels),
        };
        let mut resampler = resampler;

        let frames = self.sound.frames();
        let mut out = vec![0i16; resampler.max_output(frames) * channels];
        let made = resampler.render_i16(self.sound.samples(), &mut out, frames);
        out.truncate(made * channels);

        debug!(
            id = %self.id,
            pitch,
            input_rate,
            output_rate,
            frames_in = frames,
            frames_out = made,
            "Resampled sound for playback"
        );

        self.playback = out.into();
        self.resampler = Some(resampler);
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("sound", &self.sound)
            .field("options", &self.options)
            .field("cursor", &self.cursor)
            .field("sequence", &self.sequence)
            .field("pending_delete", &self.pending_delete)
            .finish()
    }
}

/// Mean absolute sample value, normalized to [0, 1].
fn loudness(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: u64 = samples.iter().map(|s| s.unsigned_abs() as u64).sum();
    sum as f32 / samples.len() as f32 / 32768.0
}
