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
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::injector::{InjectorFrame, InjectorId};

pub mod mock;
pub mod wav;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink is closed")]
    Closed,

    #[error("failed to write frame: {0}")]
    Write(#[from] hound::Error),

    #[error("frame for {id} rejected: {reason}")]
    Rejected { id: InjectorId, reason: String },
}

/// Destination for injector frames. Frames arrive on the scheduler's worker
/// thread, so implementations must not block for long.
pub trait FrameSink: fmt::Display + Send + Sync {
    /// Delivers one frame for the given injector.
    fn send_frame(&self, id: InjectorId, frame: &InjectorFrame) -> Result<(), SinkError>;

    /// Tells the sink an injector is done. Called once each time an injector
    /// finishes, so a restarted injector is stopped once per run. During
    /// shutdown this may be called from the thread that stopped the scheduler.
    fn stop(&self, id: InjectorId);
}

/// Gets a sink by name. `mock` records frames in memory; anything else is
/// treated as the path of a WAV file to write.
pub fn get_sink(name: &str, sample_rate: u32) -> Result<Arc<dyn FrameSink>, SinkError> {
    if name == "mock" {
        return Ok(Arc::new(mock::Sink::get(name)));
    }
    Ok(Arc::new(wav::Sink::create(Path::new(name), sample_rate)?))
}
