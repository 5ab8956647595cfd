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

use glam::{Quat, Vec3};

/// Lowest accepted playback pitch.
pub const MIN_PITCH: f32 = 1.0 / 16.0;

/// Highest accepted playback pitch.
pub const MAX_PITCH: f32 = 16.0;

/// Playback options for one injector.
#[derive(Clone, Debug, PartialEq)]
pub struct InjectorOptions {
    /// World position the sound is emitted from.
    pub position: Vec3,
    /// Orientation of the emitter.
    pub orientation: Quat,
    /// Linear gain in [0, 1]. Zero produces silent frames.
    pub volume: f32,
    /// Playback speed multiplier. 2.0 plays an octave higher in half the time.
    pub pitch: f32,
    /// Restart from the beginning when the end is reached.
    pub looping: bool,
}

impl Default for InjectorOptions {
    fn default() -> Self {
        InjectorOptions {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            volume: 1.0,
            pitch: 1.0,
            looping: false,
        }
    }
}

impl InjectorOptions {
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Pitch limited to [`MIN_PITCH`, `MAX_PITCH`]. Non-finite values play at unity.
    pub fn clamped_pitch(&self) -> f32 {
        if self.pitch.is_finite() {
            self.pitch.clamp(MIN_PITCH, MAX_PITCH)
        } else {
            1.0
        }
    }

    /// Volume limited to [0, 1]. Non-finite values are silent.
    pub fn clamped_volume(&self) -> f32 {
        if self.volume.is_finite() {
            self.volume.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}
