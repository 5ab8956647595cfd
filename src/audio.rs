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

//! Audio processing primitives for the injection pipeline.

use std::time::Duration;

pub mod resampler;
pub(crate) mod thread_priority;

pub use self::resampler::Resampler;

/// Sample rate of audio handed to the network, in Hz.
pub const NETWORK_SAMPLE_RATE: u32 = 24000;

/// Samples per channel in one network frame.
pub const NETWORK_FRAME_SAMPLES: usize = 240;

/// Playback time covered by one network frame.
pub fn frame_duration(sample_rate: u32, frame_samples: usize) -> Duration {
    Duration::from_nanos(frame_samples as u64 * 1_000_000_000 / sample_rate as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_frame_is_ten_milliseconds() {
        assert_eq!(
            frame_duration(NETWORK_SAMPLE_RATE, NETWORK_FRAME_SAMPLES),
            Duration::from_millis(10)
        );
    }
}
