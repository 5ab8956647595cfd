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
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::{FrameSink, SinkError};
use crate::injector::{InjectorFrame, InjectorId};

#[derive(Default)]
struct Recorded {
    frames: HashMap<InjectorId, Vec<InjectorFrame>>,
    /// Injector of every delivered frame, in delivery order.
    order: Vec<InjectorId>,
    stops: HashMap<InjectorId, usize>,
}

/// A mock sink. Keeps everything it is given in memory.
pub struct Sink {
    name: String,
    recorded: Mutex<Recorded>,
    failing: AtomicBool,
}

impl Sink {
    pub fn get(name: &str) -> Sink {
        Sink {
            name: name.to_string(),
            recorded: Mutex::new(Recorded::default()),
            failing: AtomicBool::new(false),
        }
    }

    /// Makes every following send fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn frames(&self, id: InjectorId) -> Vec<InjectorFrame> {
        self.recorded
            .lock()
            .frames
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn frame_count(&self, id: InjectorId) -> usize {
        self.recorded.lock().frames.get(&id).map_or(0, Vec::len)
    }

    pub fn total_frames(&self) -> usize {
        self.recorded.lock().order.len()
    }

    pub fn order(&self) -> Vec<InjectorId> {
        self.recorded.lock().order.clone()
    }

    pub fn stop_count(&self, id: InjectorId) -> usize {
        self.recorded.lock().stops.get(&id).copied().unwrap_or(0)
    }

    pub fn stopped(&self) -> Vec<InjectorId> {
        let mut stopped: Vec<InjectorId> = self.recorded.lock().stops.keys().copied().collect();
        stopped.sort();
        stopped
    }
}

impl FrameSink for Sink {
    fn send_frame(&self, id: InjectorId, frame: &InjectorFrame) -> Result<(), SinkError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(SinkError::Rejected {
                id,
                reason: "mock sink is failing".to_string(),
            });
        }
        let mut recorded = self.recorded.lock();
        recorded.frames.entry(id).or_default().push(frame.clone());
        recorded.order.push(id);
        Ok(())
    }

    fn stop(&self, id: InjectorId) {
        debug!(sink = self.name, id = %id, "Injector stopped");
        *self.recorded.lock().stops.entry(id).or_insert(0) += 1;
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
