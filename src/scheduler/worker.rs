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
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, info, span, warn, Level};

use super::command::Command;
use super::queue::Entry;
use super::Inner;
use crate::injector::{FrameOutcome, Injector, InjectorId};

/// Owns every injector that is not queued: the due working set while it is
/// being serviced, and finished injectors whose handles are still alive.
pub(super) struct Worker {
    inner: Arc<Inner>,
    commands: Receiver<Command>,
    /// Finished injectors kept so a handle can restart them.
    parked: HashMap<InjectorId, Box<Injector>>,
    idle_yield: Duration,
}

impl Worker {
    pub(super) fn new(inner: Arc<Inner>, commands: Receiver<Command>, idle_yield: Duration) -> Worker {
        Worker {
            inner,
            commands,
            parked: HashMap::new(),
            idle_yield,
        }
    }

    pub(super) fn run(mut self) {
        let span = span!(Level::INFO, "injector scheduler");
        let _enter = span.enter();
        info!(sink = %self.inner.sink, "Scheduler started");

        let inner = Arc::clone(&self.inner);
        loop {
            self.apply_commands();
            self.parked.retain(|_, injector| injector.has_handles());

            let due = {
                let mut queue = inner.queue.lock();
                loop {
                    if inner.stopping.load(Ordering::Acquire) {
                        let leftover = queue.drain();
                        drop(queue);
                        self.exit(leftover);
                        return;
                    }
                    if !self.commands.is_empty() {
                        break Vec::new();
                    }
                    match queue.next_due() {
                        None => inner.wake.wait(&mut queue),
                        Some(due) => {
                            let now = Instant::now();
                            if due <= now {
                                break queue.pop_due(now);
                            }
                            inner.wake.wait_until(&mut queue, due);
                        }
                    }
                }
            };

            if due.is_empty() {
                continue;
            }

            let mut finished = 0;
            let mut continuing = Vec::with_capacity(due.len());
            for mut injector in due {
                match injector.produce_next_frame() {
                    FrameOutcome::Continue { frame, delay } => {
                        if let Err(e) = inner.sink.send_frame(injector.id(), &frame) {
                            warn!(
                                id = %injector.id(),
                                sequence = frame.sequence,
                                error = %e,
                                "Sink rejected frame"
                            );
                        }
                        continuing.push((Instant::now() + delay, injector));
                    }
                    FrameOutcome::Finished => {
                        finished += 1;
                        self.finalize(injector);
                    }
                }
            }

            let mut queue = inner.queue.lock();
            for _ in 0..finished {
                queue.release();
            }
            if inner.stopping.load(Ordering::Acquire) {
                for (_, injector) in continuing {
                    queue.release();
                    self.finalize(injector);
                }
            } else {
                for (due, injector) in continuing {
                    queue.reschedule(due, injector);
                }
            }
            drop(queue);

            if !self.idle_yield.is_zero() {
                thread::sleep(self.idle_yield);
            }
        }
    }

    /// Finishes an injector, notifying the sink the first time only, and
    /// parks it if a handle may still restart it.
    fn finalize(&mut self, mut injector: Box<Injector>) {
        if injector.finish() {
            self.inner.sink.stop(injector.id());
        }
        if injector.has_handles() && !injector.is_pending_delete() {
            self.parked.insert(injector.id(), injector);
        }
    }

    /// Applies pending handle commands. The queue lock is only held to take
    /// and return entries; injector work runs unlocked.
    fn apply_commands(&mut self) {
        let inner = Arc::clone(&self.inner);
        while let Ok(command) = self.commands.try_recv() {
            let id = command.id();
            debug!(id = %id, command = ?command, "Applying command");

            let queued = inner.queue.lock().take(id);
            if let Some(mut entry) = queued {
                match command {
                    Command::Stop(_) => {
                        inner.queue.lock().release();
                        self.finalize(entry.injector);
                    }
                    Command::Restart(_) => {
                        entry.injector.restart();
                        self.restore(entry, Some(Instant::now()));
                    }
                    Command::SetOptions(_, options) => {
                        entry.injector.set_options(options);
                        self.restore(entry, None);
                    }
                }
            } else if let Some(mut injector) = self.parked.remove(&id) {
                match command {
                    Command::Stop(_) => {
                        self.parked.insert(id, injector);
                    }
                    Command::Restart(_) => {
                        if inner.is_stopping() {
                            self.parked.insert(id, injector);
                            continue;
                        }
                        injector.restart();
                        let mut queue = inner.queue.lock();
                        let rejected = if inner.is_stopping() {
                            Some((injector, true))
                        } else {
                            queue.push(Instant::now(), injector).err().map(|i| (i, false))
                        };
                        let capacity = queue.capacity();
                        drop(queue);
                        if let Some((mut injector, stopping)) = rejected {
                            if stopping {
                                debug!(id = %id, "Scheduler stopping; injector not restarted");
                            } else {
                                warn!(id = %id, capacity, "Queue full; injector not restarted");
                            }
                            injector.finish();
                            self.parked.insert(id, injector);
                        }
                    }
                    Command::SetOptions(_, options) => {
                        injector.set_options(options);
                        self.parked.insert(id, injector);
                    }
                }
            } else {
                debug!(id = %id, "Command for unknown injector ignored");
            }
        }
    }

    /// Returns a taken entry to the queue, at `due` if given. If shutdown
    /// began while it was out, the injector is finalized instead.
    fn restore(&mut self, entry: Entry, due: Option<Instant>) {
        let inner = Arc::clone(&self.inner);
        let mut queue = inner.queue.lock();
        if inner.is_stopping() {
            queue.release();
            drop(queue);
            self.finalize(entry.injector);
            return;
        }
        match due {
            Some(due) => queue.restore_at(entry, due),
            None => queue.restore(entry),
        }
    }

    fn exit(&mut self, leftover: Vec<Box<Injector>>) {
        for injector in leftover {
            self.finalize(injector);
        }
        self.parked.clear();
        info!("Scheduler stopped");
    }
}
