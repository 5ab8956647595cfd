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

//! Polyphase coefficient design.
//!
//! Every filter is derived from a single windowed-sinc prototype spanning
//! [`PROTOTYPE_TAPS`] input samples at [`PROTOTYPE_PHASES`] sub-sample phases.
//! The prototype is stretched to the tap and phase count a given ratio needs
//! with 4-point Lagrange interpolation, then rearranged into rows so that each
//! output sample is a single dot product.

use std::f64::consts::PI;
use std::sync::OnceLock;

/// Taps in the prototype low-pass at unity ratio.
pub(crate) const PROTOTYPE_TAPS: usize = 48;

/// Sub-sample phases in the prototype low-pass.
pub(crate) const PROTOTYPE_PHASES: usize = 128;

const PROTOTYPE_LEN: usize = PROTOTYPE_TAPS * PROTOTYPE_PHASES;

/// Prototype cutoff in cycles per input sample.
const PROTOTYPE_CUTOFF: f64 = 0.45;

/// Tap counts are padded to a multiple of the widest vector kernel.
pub(crate) const LANE_WIDTH: usize = 8;

const Q32_TO_FLOAT: f32 = 1.0 / 4_294_967_296.0;

static PROTOTYPE: OnceLock<Vec<f32>> = OnceLock::new();

/// Returns the shared prototype filter, designing it on first use.
pub(crate) fn prototype() -> &'static [f32] {
    PROTOTYPE.get_or_init(design_prototype)
}

/// Blackman-windowed sinc, normalized so each phase has unity DC gain.
/// The first coefficient is exactly zero; irrational mode relies on it.
fn design_prototype() -> Vec<f32> {
    let len = PROTOTYPE_LEN as f64;
    let center = len / 2.0;

    let mut coefs: Vec<f64> = (0..PROTOTYPE_LEN)
        .map(|k| {
            let k = k as f64;
            let x = 2.0 * PROTOTYPE_CUTOFF * (k - center) / PROTOTYPE_PHASES as f64;
            let sinc = if x == 0.0 {
                1.0
            } else {
                (PI * x).sin() / (PI * x)
            };
            let window =
                0.42 - 0.5 * (2.0 * PI * k / len).cos() + 0.08 * (4.0 * PI * k / len).cos();
            sinc * window
        })
        .collect();
    coefs[0] = 0.0;

    let scale = PROTOTYPE_PHASES as f64 / coefs.iter().sum::<f64>();
    coefs.iter().map(|c| (c * scale) as f32).collect()
}

/// Resamples `input` onto `output.len()` points with a Farrow-structure cubic
/// Lagrange interpolator. Values outside `input` are treated as zero.
pub(crate) fn cubic_interpolation(input: &[f32], output: &mut [f32], gain: f32) {
    let input_len = input.len() as i64;
    let output_len = output.len() as i64;
    if output_len == 0 {
        return;
    }

    let step = (input_len << 32) / output_len;
    let mut offset = if output_len < input_len { step / 2 } else { 0 };

    let at = |i: i64| {
        if (0..input_len).contains(&i) {
            input[i as usize]
        } else {
            0.0
        }
    };

    for out in output.iter_mut() {
        let i = offset >> 32;
        let frac = (offset as u32) as f32 * Q32_TO_FLOAT;

        let x0 = at(i - 1);
        let x1 = at(i);
        let x2 = at(i + 1);
        let x3 = at(i + 2);

        let c0 = (1.0 / 6.0) * (x3 - x0) + 0.5 * (x1 - x2);
        let c1 = 0.5 * (x0 + x2) - x1;
        let c2 = x2 - (1.0 / 3.0) * x0 - 0.5 * x1 - (1.0 / 6.0) * x3;
        let c3 = x1;

        *out = (((c0 * frac + c1) * frac + c2) * frac + c3) * gain;
        offset += step;
    }
}

#[derive(Clone, Copy, Default)]
#[repr(C, align(32))]
struct Lane([f32; LANE_WIDTH]);

/// Row-major coefficient storage. Every row starts on a 32-byte boundary.
pub(crate) struct CoefficientTable {
    lanes: Vec<Lane>,
    taps: usize,
    rows: usize,
}

impl CoefficientTable {
    fn zeroed(taps: usize, rows: usize) -> CoefficientTable {
        assert!(taps % LANE_WIDTH == 0, "tap count must be lane aligned");
        CoefficientTable {
            lanes: vec![Lane::default(); taps / LANE_WIDTH * rows],
            taps,
            rows,
        }
    }

    pub(crate) fn taps(&self) -> usize {
        self.taps
    }

    pub(crate) fn rows(&self) -> usize {
        self.rows
    }

    pub(crate) fn row(&self, row: usize) -> &[f32] {
        let per_row = self.taps / LANE_WIDTH;
        let lanes = &self.lanes[row * per_row..(row + 1) * per_row];
        // SAFETY: Lane is repr(C) over [f32; LANE_WIDTH] and its alignment equals its size,
        // so consecutive lanes are consecutive f32 values with no padding.
        unsafe { std::slice::from_raw_parts(lanes.as_ptr().cast::<f32>(), self.taps) }
    }

    fn row_mut(&mut self, row: usize) -> &mut [f32] {
        let per_row = self.taps / LANE_WIDTH;
        let lanes = &mut self.lanes[row * per_row..(row + 1) * per_row];
        // SAFETY: see `row`.
        unsafe { std::slice::from_raw_parts_mut(lanes.as_mut_ptr().cast::<f32>(), self.taps) }
    }
}

/// Stretches the prototype to `up` phases. When downsampling the prototype
/// is stretched further by `down / up`, which lowers the cutoff to the output
/// Nyquist rate, and the gain is reduced by the same ratio.
/// Returns the interpolated coefficients and the padded tap count.
fn stretch_prototype(up: u64, down: u64) -> (Vec<f32>, usize) {
    let phases = up as usize;
    let mut taps = PROTOTYPE_TAPS;
    let unity_coefs = PROTOTYPE_TAPS * phases;
    let mut coefs = unity_coefs;
    let mut gain = 1.0f32;

    if down > up {
        coefs = (unity_coefs as u64 * down / up) as usize;
        taps = coefs.div_ceil(phases);
        gain *= unity_coefs as f32 / coefs as f32;
    }
    let taps = taps.next_multiple_of(LANE_WIDTH);

    let mut stretched = vec![0.0f32; taps * phases];
    cubic_interpolation(prototype(), &mut stretched[..coefs], gain);
    (stretched, taps)
}

/// Builds the rational-mode table, with rows ordered by use, and the number
/// of input frames to advance after each row.
pub(crate) fn rational_filter(up: u64, down: u64) -> (CoefficientTable, Vec<usize>) {
    let (stretched, taps) = stretch_prototype(up, down);
    let phases = up as usize;

    let mut table = CoefficientTable::zeroed(taps, phases);
    for i in 0..phases {
        let phase = ((i as u64 * down) % up) as usize;
        // Taps are stored reversed so convolution is a dot product.
        for (j, coef) in table.row_mut(i).iter_mut().enumerate() {
            *coef = stretched[(taps - j - 1) * phases + phase];
        }
    }

    let steps = (0..up)
        .map(|i| (((i + 1) * down) / up - (i * down) / up) as usize)
        .collect();

    (table, steps)
}

/// Builds the irrational-mode table, with rows ordered by fractional delay.
/// An extra row past the last phase holds the first phase delayed by one
/// tap so that interpolation between adjacent rows never wraps.
pub(crate) fn irrational_filter(phases: u64, down: u64) -> CoefficientTable {
    let (stretched, taps) = stretch_prototype(phases, down);
    let phases = phases as usize;

    let mut table = CoefficientTable::zeroed(taps, phases + 1);
    for phase in 0..phases {
        for (j, coef) in table.row_mut(phase).iter_mut().enumerate() {
            *coef = stretched[(taps - j - 1) * phases + phase];
        }
    }

    debug_assert_eq!(table.row(0)[taps - 1], 0.0);

    let first = table.row(0)[..taps - 1].to_vec();
    let extra = table.row_mut(phases);
    extra[0] = 0.0;
    extra[1..].copy_from_slice(&first);

    table
}
