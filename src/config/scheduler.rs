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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::ConfigError;
use crate::audio;
use crate::injector::{FrameFormat, DEFAULT_MAX_LAG_FRAMES};

const DEFAULT_CAPACITY: usize = 40;
const DEFAULT_COMMAND_CAPACITY: usize = 64;
const DEFAULT_IDLE_YIELD: Duration = Duration::from_micros(500);

/// A YAML representation of the scheduler configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Scheduler {
    /// Maximum injectors queued or in flight (default: 40).
    capacity: Option<usize>,

    /// Maximum pending handle commands (default: 64).
    command_capacity: Option<usize>,

    /// Frame sample rate in Hz (default: 24000).
    sample_rate: Option<u32>,

    /// Samples per channel in each frame (default: 240).
    frame_samples: Option<usize>,

    /// Frames an injector may fall behind before skipping ahead (default: 15).
    max_lag_frames: Option<u32>,

    /// Sleep after each worker pass, e.g. "500us".
    idle_yield: Option<String>,

    /// Worker thread priority, 0-99.
    thread_priority: Option<u8>,

    /// Request SCHED_FIFO for the worker on unix (default: false).
    realtime: Option<bool>,
}

impl Scheduler {
    pub fn with_capacity(mut self, capacity: usize) -> Scheduler {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Scheduler {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_idle_yield(mut self, idle_yield: &str) -> Scheduler {
        self.idle_yield = Some(idle_yield.to_string());
        self
    }

    /// Rejects settings that cannot be clamped to something sensible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate() == 0 {
            return Err(ConfigError::Invalid {
                field: "sample_rate",
                reason: "must be greater than zero".to_string(),
            });
        }
        self.idle_yield()?;
        Ok(())
    }

    /// Returns the admission capacity (default: 40).
    pub fn capacity(&self) -> usize {
        self.capacity.unwrap_or(DEFAULT_CAPACITY).max(1)
    }

    /// Returns the command channel capacity (default: 64).
    pub fn command_capacity(&self) -> usize {
        self.command_capacity
            .unwrap_or(DEFAULT_COMMAND_CAPACITY)
            .max(1)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(audio::NETWORK_SAMPLE_RATE)
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
            .unwrap_or(audio::NETWORK_FRAME_SAMPLES)
            .max(1)
    }

    /// Returns the frame format every injector of the scheduler uses.
    pub fn frame_format(&self) -> FrameFormat {
        FrameFormat {
            sample_rate: self.sample_rate(),
            frame_samples: self.frame_samples(),
            max_lag_frames: self.max_lag_frames.unwrap_or(DEFAULT_MAX_LAG_FRAMES),
        }
    }

    /// Returns the worker's sleep between passes (default: 500us).
    pub fn idle_yield(&self) -> Result<Duration, ConfigError> {
        match &self.idle_yield {
            Some(value) => Ok(DurationString::from_string(value.clone())
                .map_err(|e| ConfigError::Duration {
                    value: value.clone(),
                    reason: e.to_string(),
                })?
                .into()),
            None => Ok(DEFAULT_IDLE_YIELD),
        }
    }

    pub fn thread_priority(&self) -> Option<u8> {
        self.thread_priority
    }

    pub fn realtime(&self) -> bool {
        self.realtime.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Scheduler {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let scheduler = parse("{}");
        assert_eq!(scheduler.capacity(), 40);
        assert_eq!(scheduler.command_capacity(), 64);
        assert_eq!(scheduler.frame_format(), FrameFormat::default());
        assert_eq!(scheduler.idle_yield().unwrap(), Duration::from_micros(500));
        assert_eq!(scheduler.thread_priority(), None);
        assert!(!scheduler.realtime());
    }

    #[test]
    fn test_overrides() {
        let scheduler = parse(
            r#"
            capacity: 10
            command_capacity: 4
            sample_rate: 48000
            frame_samples: 480
            max_lag_frames: 3
            idle_yield: 1ms
            thread_priority: 70
            realtime: true
            "#,
        );
        assert_eq!(scheduler.capacity(), 10);
        assert_eq!(scheduler.command_capacity(), 4);
        let format = scheduler.frame_format();
        assert_eq!(format.sample_rate, 48000);
        assert_eq!(format.frame_samples, 480);
        assert_eq!(format.max_lag_frames, 3);
        assert_eq!(format.frame_duration(), Duration::from_millis(10));
        assert_eq!(scheduler.idle_yield().unwrap(), Duration::from_millis(1));
        assert_eq!(scheduler.thread_priority(), Some(70));
        assert!(scheduler.realtime());
    }

    #[test]
    fn test_invalid_duration() {
        let scheduler = parse("idle_yield: soon");
        assert!(matches!(
            scheduler.idle_yield(),
            Err(ConfigError::Duration { .. })
        ));
    }

    #[test]
    fn test_zero_sample_rate_is_invalid() {
        let scheduler = parse("sample_rate: 0");
        assert!(matches!(
            scheduler.validate(),
            Err(ConfigError::Invalid {
                field: "sample_rate",
                ..
            })
        ));
        assert!(parse("sample_rate: 16000").validate().is_ok());
        assert!(parse("idle_yield: soon").validate().is_err());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(Scheduler::default().with_capacity(0).capacity(), 1);
    }
}
