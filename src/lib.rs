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

//! Timed audio injection for networked audio clients.
//!
//! A [`Scheduler`] paces any number of injectors, each turning a [`Sound`]
//! into 10ms frames handed to a [`sink::FrameSink`]. Sounds are converted to
//! the network rate, and re-pitched, with the polyphase [`Resampler`].

pub mod audio;
pub mod config;
pub mod injector;
pub mod scheduler;
pub mod sink;
#[cfg(test)]
mod testutil;

pub use self::audio::Resampler;
pub use self::injector::{
    FrameFormat, InjectorFrame, InjectorId, InjectorOptions, InjectorState, Payload, Sound,
};
pub use self::scheduler::{InjectorHandle, Rejected, Scheduler};
