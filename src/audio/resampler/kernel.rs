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

//! Inner-product kernels for the polyphase filter.
//!
//! The scalar kernel is the reference. Vector kernels are selected once per
//! process by a CPU feature probe and must agree with it up to rounding.

use std::sync::OnceLock;

use tracing::debug;

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

/// A strategy for the per-output-sample dot product.
pub(crate) trait MultirateKernel: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Sum of `input[j] * coefs[j]` over every coefficient.
    /// `input` must hold at least `coefs.len()` samples.
    fn dot(&self, input: &[f32], coefs: &[f32]) -> f32;

    /// As `dot`, with coefficients linearly interpolated between two rows:
    /// `c0[j] + frac * (c1[j] - c0[j])`.
    fn dot_interpolated(&self, input: &[f32], c0: &[f32], c1: &[f32], frac: f32) -> f32;
}

/// Portable reference kernel.
pub(crate) struct Scalar;

impl MultirateKernel for Scalar {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn dot(&self, input: &[f32], coefs: &[f32]) -> f32 {
        input[..coefs.len()]
            .iter()
            .zip(coefs)
            .fold(0.0, |acc, (x, c)| acc + x * c)
    }

    fn dot_interpolated(&self, input: &[f32], c0: &[f32], c1: &[f32], frac: f32) -> f32 {
        input[..c0.len()]
            .iter()
            .zip(c0.iter().zip(&c1[..c0.len()]))
            .fold(0.0, |acc, (x, (a, b))| acc + x * (a + frac * (b - a)))
    }
}

static SCALAR: Scalar = Scalar;

#[cfg(target_arch = "x86_64")]
pub(crate) struct Avx2 {
    _probed: (),
}

#[cfg(target_arch = "x86_64")]
static AVX2: Avx2 = Avx2 { _probed: () };

#[cfg(target_arch = "x86_64")]
impl MultirateKernel for Avx2 {
    fn name(&self) -> &'static str {
        "avx2"
    }

    fn dot(&self, input: &[f32], coefs: &[f32]) -> f32 {
        let input = &input[..coefs.len()];
        // SAFETY: Avx2 is only handed out after the avx2 probe succeeds, and the
        // slices are the same length.
        unsafe { dot_avx2(input, coefs) }
    }

    fn dot_interpolated(&self, input: &[f32], c0: &[f32], c1: &[f32], frac: f32) -> f32 {
        let input = &input[..c0.len()];
        let c1 = &c1[..c0.len()];
        // SAFETY: as above.
        unsafe { dot_interpolated_avx2(input, c0, c1, frac) }
    }
}

#[cfg(target_arch = "aarch64")]
pub(crate) struct Neon {
    _probed: (),
}

#[cfg(target_arch = "aarch64")]
static NEON: Neon = Neon { _probed: () };

#[cfg(target_arch = "aarch64")]
impl MultirateKernel for Neon {
    fn name(&self) -> &'static str {
        "neon"
    }

    fn dot(&self, input: &[f32], coefs: &[f32]) -> f32 {
        let input = &input[..coefs.len()];
        // SAFETY: Neon is only handed out after the neon probe succeeds, and the
        // slices are the same length.
        unsafe { dot_neon(input, coefs) }
    }

    fn dot_interpolated(&self, input: &[f32], c0: &[f32], c1: &[f32], frac: f32) -> f32 {
        let input = &input[..c0.len()];
        let c1 = &c1[..c0.len()];
        // SAFETY: as above.
        unsafe { dot_interpolated_neon(input, c0, c1, frac) }
    }
}

/// Returns the fastest kernel this CPU supports. The probe runs once.
pub(crate) fn detect() -> &'static dyn MultirateKernel {
    static SELECTED: OnceLock<&'static dyn MultirateKernel> = OnceLock::new();
    *SELECTED.get_or_init(|| {
        let kernel = probe();
        debug!(kernel = kernel.name(), "Selected resampler kernel");
        kernel
    })
}

/// Returns the scalar reference kernel.
pub(crate) fn scalar() -> &'static dyn MultirateKernel {
    &SCALAR
}

fn probe() -> &'static dyn MultirateKernel {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return &AVX2;
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        if is_aarch64_feature_detected!("neon") {
            return &NEON;
        }
    }

    &SCALAR
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn horizontal_sum_avx2(v: __m256) -> f32 {
    let lo = _mm256_castps256_ps128(v);
    let hi = _mm256_extractf128_ps(v, 1);
    let sum = _mm_add_ps(lo, hi);
    let sum = _mm_add_ps(sum, _mm_movehl_ps(sum, sum));
    let sum = _mm_add_ss(sum, _mm_shuffle_ps(sum, sum, 0x55));
    _mm_cvtss_f32(sum)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn dot_avx2(input: &[f32], coefs: &[f32]) -> f32 {
    const SIMD_WIDTH: usize = 8;
    let taps = coefs.len();
    let mut acc = _mm256_setzero_ps();
    let mut idx = 0;

    while idx + SIMD_WIDTH <= taps {
        let x = _mm256_loadu_ps(input.as_ptr().add(idx));
        let c = _mm256_loadu_ps(coefs.as_ptr().add(idx));
        acc = _mm256_add_ps(acc, _mm256_mul_ps(x, c));
        idx += SIMD_WIDTH;
    }

    let mut sum = horizontal_sum_avx2(acc);
    for i in idx..taps {
        sum += input[i] * coefs[i];
    }
    sum
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn dot_interpolated_avx2(input: &[f32], c0: &[f32], c1: &[f32], frac: f32) -> f32 {
    const SIMD_WIDTH: usize = 8;
    let taps = c0.len();
    let frac_vec = _mm256_set1_ps(frac);
    let mut acc = _mm256_setzero_ps();
    let mut idx = 0;

    while idx + SIMD_WIDTH <= taps {
        let x = _mm256_loadu_ps(input.as_ptr().add(idx));
        let a = _mm256_loadu_ps(c0.as_ptr().add(idx));
        let b = _mm256_loadu_ps(c1.as_ptr().add(idx));
        let coef = _mm256_add_ps(a, _mm256_mul_ps(frac_vec, _mm256_sub_ps(b, a)));
        acc = _mm256_add_ps(acc, _mm256_mul_ps(x, coef));
        idx += SIMD_WIDTH;
    }

    let mut sum = horizontal_sum_avx2(acc);
    for i in idx..taps {
        sum += input[i] * (c0[i] + frac * (c1[i] - c0[i]));
    }
    sum
}

#[cfg(target_arch = "aarch64")]
#[target_feature(enable = "neon")]
unsafe fn dot_neon(input: &[f32], coefs: &[f32]) -> f32 {
    const SIMD_WIDTH: usize = 4;
    let taps = coefs.len();
    let mut acc = vdupq_n_f32(0.0);
    let mut idx = 0;

    while idx + SIMD_WIDTH <= taps {
        let x = vld1q_f32(input.as_ptr().add(idx));
        let c = vld1q_f32(coefs.as_ptr().add(idx));
        acc = vmlaq_f32(acc, x, c);
        idx += SIMD_WIDTH;
    }

    let mut sum = vaddvq_f32(acc);
    for i in idx..taps {
        sum += input[i] * coefs[i];
    }
    sum
}

#[cfg(target_arch = "aarch64")]
#[target_feature(enable = "neon")]
unsafe fn dot_interpolated_neon(input: &[f32], c0: &[f32], c1: &[f32], frac: f32) -> f32 {
    const SIMD_WIDTH: usize = 4;
    let taps = c0.len();
    let mut acc = vdupq_n_f32(0.0);
    let mut idx = 0;

    while idx + SIMD_WIDTH <= taps {
        let x = vld1q_f32(input.as_ptr().add(idx));
        let a = vld1q_f32(c0.as_ptr().add(idx));
        let b = vld1q_f32(c1.as_ptr().add(idx));
        let coef = vaddq_f32(a, vmulq_n_f32(vsubq_f32(b, a), frac));
        acc = vmlaq_f32(acc, x, coef);
        idx += SIMD_WIDTH;
    }

    let mut sum = vaddvq_f32(acc);
    for i in idx..taps {
        sum += input[i] * (c0[i] + frac * (c1[i] - c0[i]));
    }
    sum
}
