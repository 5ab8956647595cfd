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

//! Drives every playing injector from one dedicated worker thread.
//!
//! Injectors wait in an admission queue ordered by the instant their next
//! frame is due. The worker sleeps on a condition variable until the head is
//! due, produces frames for everything that is due with the queue unlocked,
//! hands them to the [`FrameSink`] and puts the injectors back at their next
//! due time. Other threads only admit injectors and send commands.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::audio::thread_priority;
use crate::config::{self, ConfigError};
use crate::injector::{
    FrameFormat, Injector, InjectorId, InjectorOptions, InjectorShared, InjectorState, Sound,
};
use crate::sink::FrameSink;

use self::command::Command;
use self::queue::AdmissionQueue;
use self::worker::Worker;

mod command;
mod queue;
mod worker;

/// Why a submission or handle command was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejected {
    #[error("admission queue is full ({capacity} injectors)")]
    QueueFull { capacity: usize },

    #[error("scheduler is stopping")]
    Stopping,

    #[error("command queue is full")]
    CommandQueueFull,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] io::Error),
}

/// State shared between the scheduler, its handles and the worker.
pub(crate) struct Inner {
    queue: Mutex<AdmissionQueue>,
    wake: Condvar,
    stopping: AtomicBool,
    sink: Arc<dyn FrameSink>,
}

impl Inner {
    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Wakes the worker. The queue lock is taken so the wake cannot land
    /// between the worker's last check and its wait.
    fn wake_worker(&self) {
        let _queue = self.queue.lock();
        self.wake.notify_one();
    }
}

pub struct Scheduler {
    inner: Arc<Inner>,
    commands: Sender<Command>,
    format: FrameFormat,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Creates a scheduler and starts its worker thread.
    pub fn new(
        config: &config::Scheduler,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Scheduler, SchedulerError> {
        config.validate()?;
        let idle_yield = config.idle_yield()?;
        let format = config.frame_format();
        let inner = Arc::new(Inner {
            queue: Mutex::new(AdmissionQueue::new(config.capacity())),
            wake: Condvar::new(),
            stopping: AtomicBool::new(false),
            sink,
        });
        let (commands, receiver) = crossbeam_channel::bounded(config.command_capacity());

        let priority = thread_priority::worker_thread_priority(config.thread_priority());
        let realtime = thread_priority::rt_enabled(config.realtime());
        let worker = Worker::new(Arc::clone(&inner), receiver, idle_yield);
        let join_handle = thread::Builder::new()
            .name("injector-scheduler".to_string())
            .spawn(move || {
                if let Some(priority) = priority {
                    thread_priority::configure_worker_thread_priority(priority, realtime);
                }
                worker.run();
            })?;

        info!(
            capacity = config.capacity(),
            sample_rate = format.sample_rate,
            frame_samples = format.frame_samples,
            idle_yield = ?idle_yield,
            "Created scheduler"
        );

        Ok(Scheduler {
            inner,
            commands,
            format,
            worker: Mutex::new(Some(join_handle)),
        })
    }

    /// Starts playing a sound. The first frame is due immediately.
    pub fn submit(
        &self,
        sound: Sound,
        options: InjectorOptions,
    ) -> Result<InjectorHandle, Rejected> {
        self.submit_at(sound, options, Instant::now())
    }

    /// Starts playing a sound nobody will control. It is discarded as soon
    /// as it finishes.
    pub fn submit_detached(
        &self,
        sound: Sound,
        options: InjectorOptions,
    ) -> Result<InjectorId, Rejected> {
        let mut injector = Injector::new(sound, options, self.format);
        injector.set_pending_delete(true);
        let id = injector.id();
        self.admit(injector, Instant::now())?;
        Ok(id)
    }

    /// Starts playing a sound with its first frame due at `due`.
    pub(crate) fn submit_at(
        &self,
        sound: Sound,
        options: InjectorOptions,
        due: Instant,
    ) -> Result<InjectorHandle, Rejected> {
        let injector = Injector::new(sound, options, self.format);
        let handle = InjectorHandle {
            id: injector.id(),
            shared: Arc::clone(injector.shared()),
            commands: self.commands.clone(),
            inner: Arc::clone(&self.inner),
        };
        self.admit(injector, due)?;
        Ok(handle)
    }

    fn admit(&self, injector: Injector, due: Instant) -> Result<(), Rejected> {
        if self.inner.is_stopping() {
            return Err(Rejected::Stopping);
        }

        let mut queue = self.inner.queue.lock();
        if self.inner.is_stopping() {
            return Err(Rejected::Stopping);
        }
        let id = injector.id();
        injector.mark_queued();
        if queue.push(due, Box::new(injector)).is_err() {
            debug!(id = %id, capacity = queue.capacity(), "Admission queue full");
            return Err(Rejected::QueueFull {
                capacity: queue.capacity(),
            });
        }
        debug!(id = %id, queued = queue.len(), "Injector admitted");
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Injectors queued or being serviced.
    pub fn queued(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.queue.lock().capacity()
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.is_stopping()
    }

    pub fn frame_format(&self) -> FrameFormat {
        self.format
    }

    /// Stops the worker. Every queued injector is finished exactly once and
    /// nothing is admitted afterwards. Safe to call more than once.
    pub fn shutdown(&self) {
        let drained = {
            let mut queue = self.inner.queue.lock();
            if self.inner.stopping.swap(true, Ordering::AcqRel) {
                Vec::new()
            } else {
                let mut drained = queue.drain();
                for injector in drained.iter_mut() {
                    if injector.finish() {
                        self.inner.sink.stop(injector.id());
                    }
                }
                drained
            }
        };
        self.inner.wake.notify_all();

        if let Some(join_handle) = self.worker.lock().take() {
            if join_handle.join().is_err() {
                error!("Scheduler thread panicked");
            }
            info!(finalized = drained.len(), "Scheduler shut down");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("sink", &self.inner.sink.to_string())
            .field("queued", &self.queued())
            .field("stopping", &self.is_stopping())
            .field("format", &self.format)
            .finish()
    }
}

/// Controls one submitted injector from any thread. Mutations are applied
/// by the worker; reads come straight from shared atomics.
pub struct InjectorHandle {
    id: InjectorId,
    shared: Arc<InjectorShared>,
    commands: Sender<Command>,
    inner: Arc<Inner>,
}

impl InjectorHandle {
    pub fn id(&self) -> InjectorId {
        self.id
    }

    pub fn state(&self) -> InjectorState {
        self.shared.state()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.is_playing()
    }

    /// Loudness of the most recent frame, in [0, 1].
    pub fn loudness(&self) -> f32 {
        self.shared.loudness()
    }

    pub fn stop(&self) -> Result<(), Rejected> {
        self.send(Command::Stop(self.id))
    }

    /// Plays the sound again from the beginning, even after it finished.
    pub fn restart(&self) -> Result<(), Rejected> {
        self.send(Command::Restart(self.id))
    }

    pub fn set_options(&self, options: InjectorOptions) -> Result<(), Rejected> {
        self.send(Command::SetOptions(self.id, options))
    }

    fn send(&self, command: Command) -> Result<(), Rejected> {
        if self.inner.is_stopping() {
            return Err(Rejected::Stopping);
        }
        match self.commands.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(Rejected::CommandQueueFull),
            Err(TrySendError::Disconnected(_)) => return Err(Rejected::Stopping),
        }
        self.inner.wake_worker();
        Ok(())
    }
}

impl fmt::Debug for InjectorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectorHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("playing", &self.is_playing())
            .finish()
    }
}

#[cfg(test)]
mod tests;
