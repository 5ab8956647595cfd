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

//! Multirate polyphase resampling.
//!
//! A [`Resampler`] converts a stream of up to [`MAX_CHANNELS`] channels from
//! one sample rate to another. When the reduced ratio has a small enough
//! numerator the conversion is exact (rational mode). Otherwise a fixed
//! number of phases is used with a 32.32 fixed-point position and linear
//! interpolation between neighbouring phases (irrational mode).
//!
//! Output from a sequence of `render` calls is bit-identical to one call
//! on the concatenated input.

use std::fmt;

use tracing::debug;

use self::filter::CoefficientTable;
use self::kernel::MultirateKernel;

pub mod convert;
mod filter;
pub(crate) mod kernel;


pub use self::convert::DitherBank;

/// Maximum number of channels a resampler can process.
pub const MAX_CHANNELS: usize = 4;

/// Largest reduced numerator handled in rational mode.
const MAX_RATIONAL_PHASES: u64 = 640;

const IRRATIONAL_PHASE_BITS: u32 = 9;
const IRRATIONAL_PHASES: u64 = 1 << IRRATIONAL_PHASE_BITS;
const FRAC_BITS: u32 = 32 - IRRATIONAL_PHASE_BITS;
const FRAC_MASK: u32 = (1 << FRAC_BITS) - 1;
const QFRAC_TO_FLOAT: f32 = 1.0 / (1u32 << FRAC_BITS) as f32;

/// Frames processed per block by the interleaved render paths.
const BLOCK_FRAMES: usize = 256;

/// Position within the input stream, carried between calls.
enum Cursor {
    Rational {
        steps: Vec<usize>,
        phase: usize,
        offset: usize,
    },
    Irrational {
        step: u64,
        offset: u64,
    },
}

/// The coefficient table, the stream position and the kernel used to apply them.
struct Polyphase {
    table: CoefficientTable,
    cursor: Cursor,
    kernel: &'static dyn MultirateKernel,
}

impl Polyphase {
    /// Filters `frames` input frames, writing outputs starting at `out_start`.
    /// Each input must hold `frames + taps - 1` samples.
    fn filter<I, O>(&mut self, inputs: &[I], outputs: &mut [O], out_start: usize, frames: usize) -> usize
    where
        I: AsRef<[f32]>,
        O: AsMut<[f32]>,
    {
        let taps = self.table.taps();
        let mut produced = 0;

        match &mut self.cursor {
            Cursor::Rational {
                steps,
                phase,
                offset,
            } => {
                let mut i = *offset;
                while i < frames {
                    let coefs = self.table.row(*phase);
                    for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
                        output.as_mut()[out_start + produced] =
                            self.kernel.dot(&input.as_ref()[i..i + taps], coefs);
                    }
                    produced += 1;

                    i += steps[*phase];
                    *phase += 1;
                    if *phase == steps.len() {
                        *phase = 0;
                    }
                }
                *offset = i - frames;
            }
            Cursor::Irrational { step, offset } => {
                while (*offset >> 32) < frames as u64 {
                    let i = (*offset >> 32) as usize;
                    let f = *offset as u32;

                    let phase = (f >> FRAC_BITS) as usize;
                    let frac = (f & FRAC_MASK) as f32 * QFRAC_TO_FLOAT;

                    let c0 = self.table.row(phase);
                    let c1 = self.table.row(phase + 1);
                    for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
                        output.as_mut()[out_start + produced] = self.kernel.dot_interpolated(
                            &input.as_ref()[i..i + taps],
                            c0,
                            c1,
                            frac,
                        );
                    }
                    produced += 1;

                    *offset += *step;
                }
                *offset -= (frames as u64) << 32;
            }
        }

        produced
    }

    fn reset(&mut self) {
        match &mut self.cursor {
            Cursor::Rational { phase, offset, .. } => {
                *phase = 0;
                *offset = 0;
            }
            Cursor::Irrational { offset, .. } => *offset = 0,
        }
    }
}

/// Planar buffers and dither state for the interleaved render paths.
struct Staging {
    inputs: Vec<Vec<f32>>,
    outputs: Vec<Vec<f32>>,
    dither: DitherBank,
    block: usize,
}

/// A multirate polyphase FIR resampler.
pub struct Resampler {
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    up: u64,
    down: u64,
    polyphase: Polyphase,
    /// Per channel: `taps - 1` frames of history followed by an equal sized refill area.
    history: Vec<Vec<f32>>,
    staging: Staging,
}

impl Resampler {
    /// Creates a resampler from `input_rate` to `output_rate` for the given number of channels.
    ///
    /// # Panics
    ///
    /// Panics if either rate is zero or if `channels` is not in `1..=MAX_CHANNELS`.
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Resampler {
        Resampler::with_kernel(input_rate, output_rate, channels, kernel::detect())
    }

    pub(crate) fn with_kernel(
        input_rate: u32,
        output_rate: u32,
        channels: usize,
        kernel: &'static dyn MultirateKernel,
    ) -> Resampler {
        assert!(input_rate > 0, "input rate must be positive");
        assert!(output_rate > 0, "output rate must be positive");
        assert!(
            (1..=MAX_CHANNELS).contains(&channels),
            "channel count must be between 1 and {MAX_CHANNELS}"
        );

        let divisor = gcd(input_rate as u64, output_rate as u64);
        let mut up = output_rate as u64 / divisor;
        let mut down = input_rate as u64 / divisor;

        let (table, cursor) = if up <= MAX_RATIONAL_PHASES {
            let (table, steps) = filter::rational_filter(up, down);
            (
                table,
                Cursor::Rational {
                    steps,
                    phase: 0,
                    offset: 0,
                },
            )
        } else {
            up = IRRATIONAL_PHASES;
            down = IRRATIONAL_PHASES * input_rate as u64 / output_rate as u64;
            let step = ((input_rate as u64) << 32) / output_rate as u64;
            (
                filter::irrational_filter(up, down),
                Cursor::Irrational { step, offset: 0 },
            )
        };

        let taps = table.taps();
        let mut resampler = Resampler {
            input_rate,
            output_rate,
            channels,
            up,
            down,
            polyphase: Polyphase {
                table,
                cursor,
                kernel,
            },
            history: vec![vec![0.0; 2 * (taps - 1)]; channels],
            staging: Staging {
                inputs: Vec::new(),
                outputs: Vec::new(),
                dither: DitherBank::new(),
                block: 0,
            },
        };

        let block = resampler.max_input(BLOCK_FRAMES).clamp(1, BLOCK_FRAMES);
        let block_output = resampler.max_output(block) + 1;
        resampler.staging.inputs = vec![vec![0.0; block]; channels];
        resampler.staging.outputs = vec![vec![0.0; block_output]; channels];
        resampler.staging.block = block;

        debug!(
            input_rate,
            output_rate,
            channels,
            up,
            down,
            taps,
            rational = resampler.is_rational(),
            kernel = kernel.name(),
            "Created resampler"
        );

        resampler
    }

    /// Resamples planar input. `inputs` and `outputs` hold one slice per channel; each
    /// input must hold at least `frames` samples and each output at least
    /// `max_output(frames)`. Returns the number of frames written to each output.
    pub fn render(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], frames: usize) -> usize {
        assert_eq!(inputs.len(), self.channels, "one input per channel");
        assert_eq!(outputs.len(), self.channels, "one output per channel");
        let capacity = self.max_output(frames);
        assert!(inputs.iter().all(|input| input.len() >= frames));
        assert!(outputs.iter().all(|output| output.len() >= capacity));

        render_planar(&mut self.polyphase, &mut self.history, inputs, outputs, frames)
    }

    /// Resamples interleaved float frames. `output` must hold at least
    /// `max_output(frames) * channels` samples.
    pub fn render_interleaved(&mut self, input: &[f32], output: &mut [f32], frames: usize) -> usize {
        let channels = self.channels;
        assert!(input.len() >= frames * channels);
        assert!(output.len() >= self.max_output(frames) * channels);

        let staging = &mut self.staging;
        let mut consumed = 0;
        let mut produced = 0;
        while consumed < frames {
            let n = (frames - consumed).min(staging.block);
            convert::deinterleave_f32(
                &input[consumed * channels..(consumed + n) * channels],
                &mut staging.inputs,
                n,
            );
            let made = render_planar(
                &mut self.polyphase,
                &mut self.history,
                &staging.inputs,
                &mut staging.outputs,
                n,
            );
            convert::interleave_f32(
                &staging.outputs,
                &mut output[produced * channels..(produced + made) * channels],
                made,
            );
            consumed += n;
            produced += made;
        }
        produced
    }

    /// Resamples interleaved 16-bit frames with dithered requantization.
    /// `output` must hold at least `max_output(frames) * channels` samples.
    pub fn render_i16(&mut self, input: &[i16], output: &mut [i16], frames: usize) -> usize {
        let channels = self.channels;
        assert!(input.len() >= frames * channels);
        assert!(output.len() >= self.max_output(frames) * channels);

        let staging = &mut self.staging;
        let mut consumed = 0;
        let mut produced = 0;
        while consumed < frames {
            let n = (frames - consumed).min(staging.block);
            convert::deinterleave_i16(
                &input[consumed * channels..(consumed + n) * channels],
                &mut staging.inputs,
                n,
            );
            let made = render_planar(
                &mut self.polyphase,
                &mut self.history,
                &staging.inputs,
                &mut staging.outputs,
                n,
            );
            convert::interleave_i16(
                &staging.outputs,
                &mut output[produced * channels..(produced + made) * channels],
                made,
                &mut staging.dither,
            );
            consumed += n;
            produced += made;
        }
        produced
    }

    /// Minimum number of output frames produced by `input_frames` input frames.
    pub fn min_output(&self, input_frames: usize) -> usize {
        let n = input_frames as u64;
        match &self.polyphase.cursor {
            Cursor::Rational { .. } => (n * self.up / self.down) as usize,
            Cursor::Irrational { step, .. } => ((n << 32) / step) as usize,
        }
    }

    /// Maximum number of output frames produced by `input_frames` input frames.
    pub fn max_output(&self, input_frames: usize) -> usize {
        let n = input_frames as u64;
        match &self.polyphase.cursor {
            Cursor::Rational { .. } => (n * self.up).div_ceil(self.down) as usize,
            Cursor::Irrational { step, .. } => (n << 32).div_ceil(*step) as usize,
        }
    }

    /// Minimum number of input frames that will produce at least `output_frames`.
    pub fn min_input(&self, output_frames: usize) -> usize {
        let n = output_frames as u64;
        match &self.polyphase.cursor {
            Cursor::Rational { .. } => (n * self.down).div_ceil(self.up) as usize,
            Cursor::Irrational { step, .. } => ((n * step + 0xffff_ffff) >> 32) as usize,
        }
    }

    /// Maximum number of input frames that will produce at most `output_frames`.
    pub fn max_input(&self, output_frames: usize) -> usize {
        let n = output_frames as u64;
        match &self.polyphase.cursor {
            Cursor::Rational { .. } => (n * self.down / self.up) as usize,
            Cursor::Irrational { step, .. } => ((n * step) >> 32) as usize,
        }
    }

    /// Clears the history and rewinds the stream position.
    pub fn reset(&mut self) {
        for history in &mut self.history {
            history.fill(0.0);
        }
        self.polyphase.reset();
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Filter length in input frames.
    pub fn taps(&self) -> usize {
        self.polyphase.table.taps()
    }

    /// The reduced ratio as (up, down). In irrational mode `up` is the fixed
    /// phase count and `down` is truncated.
    pub fn ratio(&self) -> (u64, u64) {
        (self.up, self.down)
    }

    /// Whether the exact ratio is used.
    pub fn is_rational(&self) -> bool {
        matches!(self.polyphase.cursor, Cursor::Rational { .. })
    }

    /// Name of the inner-product kernel in use.
    pub fn kernel_name(&self) -> &'static str {
        self.polyphase.kernel.name()
    }
}

impl fmt::Debug for Resampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resampler")
            .field("input_rate", &self.input_rate)
            .field("output_rate", &self.output_rate)
            .field("channels", &self.channels)
            .field("up", &self.up)
            .field("down", &self.down)
            .field("taps", &self.taps())
            .field("rational", &self.is_rational())
            .field("kernel", &self.kernel_name())
            .finish()
    }
}

/// Runs the history bridge and then the new input through the filter, and
/// leaves the trailing `taps - 1` frames of the stream in history.
fn render_planar<I, O>(
    polyphase: &mut Polyphase,
    history: &mut [Vec<f32>],
    inputs: &[I],
    outputs: &mut [O],
    frames: usize,
) -> usize
where
    I: AsRef<[f32]>,
    O: AsMut<[f32]>,
{
    let num_history = polyphase.table.taps() - 1;
    let nh = num_history.min(frames);
    let ni = frames - nh;

    for (buffer, input) in history.iter_mut().zip(inputs) {
        buffer[num_history..num_history + nh].copy_from_slice(&input.as_ref()[..nh]);
    }

    let mut produced = polyphase.filter(&*history, outputs, 0, nh);
    if ni > 0 {
        produced += polyphase.filter(inputs, outputs, produced, ni);
    }

    for (buffer, input) in history.iter_mut().zip(inputs) {
        if ni > 0 {
            buffer[..num_history].copy_from_slice(&input.as_ref()[ni..ni + num_history]);
        } else {
            buffer.copy_within(nh..nh + num_history, 0);
        }
    }

    produced
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
