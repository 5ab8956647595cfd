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

//! Sample format and layout conversion.

const INT16_TO_FLOAT: f32 = 1.0 / 32768.0;
const FLOAT_TO_INT16: f32 = 32768.0;

/// Bank of eight 16-bit linear congruential generators producing
/// triangular-PDF dither in [-1.0, 1.0] LSB.
///
/// Each step advances every generator and yields four dither values, the
/// difference of the low and high halves of the bank.
#[derive(Clone, Debug)]
pub struct DitherBank {
    state: [u16; 8],
    ready: [f32; 4],
    next: usize,
}

const DITHER_MUL: [u16; 8] = [
    -3495i16 as u16,
    30185,
    -27591i16 as u16,
    19445,
    -23279i16 as u16,
    -5975i16 as u16,
    -25511i16 as u16,
    25173,
];

const DITHER_ADD: [u16; 8] = [
    28013,
    -13225i16 as u16,
    -32679i16 as u16,
    -7701i16 as u16,
    -19675i16 as u16,
    105,
    -32767i16 as u16,
    13849,
];

impl DitherBank {
    pub fn new() -> DitherBank {
        DitherBank {
            state: [0; 8],
            ready: [0.0; 4],
            next: 4,
        }
    }

    /// Returns the next dither value.
    pub fn next_value(&mut self) -> f32 {
        if self.next == self.ready.len() {
            self.advance();
        }
        let value = self.ready[self.next];
        self.next += 1;
        value
    }

    fn advance(&mut self) {
        for (lane, state) in self.state.iter_mut().enumerate() {
            *state = state
                .wrapping_mul(DITHER_MUL[lane])
                .wrapping_add(DITHER_ADD[lane]);
        }
        for (i, ready) in self.ready.iter_mut().enumerate() {
            let lo = self.state[i] as i32;
            let hi = self.state[i + 4] as i32;
            *ready = (lo - hi) as f32 * (1.0 / 65536.0);
        }
        self.next = 0;
    }
}

impl Default for DitherBank {
    fn default() -> Self {
        DitherBank::new()
    }
}

/// Scales, dithers, rounds half away from zero and saturates one sample.
#[inline]
pub fn quantize(sample: f32, dither: f32) -> i16 {
    let f = sample * FLOAT_TO_INT16 + dither;
    let f = f + if f < 0.0 { -0.5 } else { 0.5 };
    f.clamp(-32768.0, 32767.0) as i16
}

/// Splits interleaved 16-bit frames into per-channel float buffers.
pub fn deinterleave_i16<O: AsMut<[f32]>>(input: &[i16], outputs: &mut [O], frames: usize) {
    let channels = outputs.len();
    for (ch, output) in outputs.iter_mut().enumerate() {
        let output = output.as_mut();
        for (i, out) in output[..frames].iter_mut().enumerate() {
            *out = input[i * channels + ch] as f32 * INT16_TO_FLOAT;
        }
    }
}

/// Interleaves per-channel float buffers into 16-bit frames. One dither
/// value is shared by every channel of a frame.
pub fn interleave_i16<I: AsRef<[f32]>>(
    inputs: &[I],
    output: &mut [i16],
    frames: usize,
    dither: &mut DitherBank,
) {
    let channels = inputs.len();
    for (i, frame) in output[..frames * channels]
        .chunks_exact_mut(channels)
        .enumerate()
    {
        let d = dither.next_value();
        for (out, input) in frame.iter_mut().zip(inputs) {
            *out = quantize(input.as_ref()[i], d);
        }
    }
}

/// Splits interleaved float frames into per-channel buffers.
pub fn deinterleave_f32<O: AsMut<[f32]>>(input: &[f32], outputs: &mut [O], frames: usize) {
    let channels = outputs.len();
    for (ch, output) in outputs.iter_mut().enumerate() {
        let output = output.as_mut();
        for (i, out) in output[..frames].iter_mut().enumerate() {
            *out = input[i * channels + ch];
        }
    }
}

/// Interleaves per-channel float buffers.
pub fn interleave_f32<I: AsRef<[f32]>>(inputs: &[I], output: &mut [f32], frames: usize) {
    let channels = inputs.len();
    for (i, frame) in output[..frames * channels]
        .chunks_exact_mut(channels)
        .enumerate()
    {
        for (out, input) in frame.iter_mut().zip(inputs) {
            *out = input.as_ref()[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dither_is_bounded_and_centered() {
        let mut dither = DitherBank::new();
        let values: Vec<f32> = (0..40_000).map(|_| dither.next_value()).collect();
        assert!(values.iter().all(|d| (-1.0..=1.0).contains(d)));

        let mean = values.iter().sum::<f32>() / values.len() as f32;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!(values.iter().any(|d| *d != 0.0));
    }

    #[test]
    fn test_dither_is_deterministic() {
        let mut a = DitherBank::new();
        let mut b = DitherBank::new();
        for _ in 0..100 {
            assert_eq!(a.next_value(), b.next_value());
        }
    }

    #[test]
    fn test_quantize_rounding_and_saturation() {
        assert_eq!(quantize(0.0, 0.0), 0);
        assert_eq!(quantize(0.5 / 32768.0, 0.0), 1);
        assert_eq!(quantize(-0.5 / 32768.0, 0.0), -1);
        assert_eq!(quantize(0.4 / 32768.0, 0.0), 0);
        assert_eq!(quantize(2.0, 0.0), 32767);
        assert_eq!(quantize(-2.0, 0.0), -32768);
        assert_eq!(quantize(1000.0 / 32768.0, 0.9), 1001);
    }

    #[test]
    fn test_i16_round_trip() {
        let input: Vec<i16> = vec![0, -32768, 32767, 1, -1, 12345, -12345, 2];
        let mut planar = vec![vec![0.0f32; 4]; 2];
        deinterleave_i16(&input, &mut planar, 4);
        assert_eq!(planar[0][1], -1.0);
        assert_eq!(planar[1][0], -1.0);

        let mut output = vec![0i16; 8];
        interleave_i16(&planar, &mut output, 4, &mut DitherBank::new());
        for (a, b) in input.iter().zip(output.iter()) {
            assert!((*a as i32 - *b as i32).abs() <= 1, "{a} vs {b}");
        }
    }

    #[test]
    fn test_f32_layout_is_lossless() {
        let input: Vec<f32> = (0..12).map(|i| i as f32 * 0.1).collect();
        let mut planar = vec![vec![0.0f32; 4]; 3];
        deinterleave_f32(&input, &mut planar, 4);
        assert_eq!(planar[2], vec![input[2], input[5], input[8], input[11]]);

        let mut output = vec![0.0f32; 12];
        interleave_f32(&planar, &mut output, 4);
        assert_eq!(input, output);
    }
}
