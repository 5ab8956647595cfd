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
use std::path::Path;

use config::{Config, File};
use tracing::info;

mod error;
mod scheduler;

pub use self::error::ConfigError;
pub use self::scheduler::Scheduler;

/// Loads the scheduler configuration from a YAML file.
pub fn load(path: &Path) -> Result<Scheduler, ConfigError> {
    let scheduler: Scheduler = Config::builder()
        .add_source(File::from(path))
        .build()?
        .try_deserialize()?;
    scheduler.validate()?;
    info!(path = ?path, capacity = scheduler.capacity(), "Loaded scheduler config");
    Ok(scheduler)
}
