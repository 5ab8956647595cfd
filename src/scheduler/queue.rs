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
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::injector::{Injector, InjectorId};

/// A queued injector. Entries due at the same instant keep admission order.
pub(super) struct Entry {
    pub(super) due: Instant,
    seq: u64,
    pub(super) injector: Box<Injector>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Due-time ordered injectors plus those the worker is currently servicing.
/// Both count against the capacity.
pub(super) struct AdmissionQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    capacity: usize,
    in_flight: usize,
    next_seq: u64,
}

impl AdmissionQueue {
    pub(super) fn new(capacity: usize) -> AdmissionQueue {
        AdmissionQueue {
            heap: BinaryHeap::with_capacity(capacity),
            capacity,
            in_flight: 0,
            next_seq: 0,
        }
    }

    pub(super) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(super) fn len(&self) -> usize {
        self.heap.len() + self.in_flight
    }

    pub(super) fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Admits a new injector. Hands it back if the queue is full.
    pub(super) fn push(&mut self, due: Instant, injector: Box<Injector>) -> Result<(), Box<Injector>> {
        if self.is_full() {
            return Err(injector);
        }
        self.insert(due, injector);
        Ok(())
    }

    fn insert(&mut self, due: Instant, injector: Box<Injector>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry { due, seq, injector }));
    }

    pub(super) fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(entry)| entry.due)
    }

    /// Removes every entry due at or before `now`, in due order. The removed
    /// injectors stay counted as in flight until returned or released.
    pub(super) fn pop_due(&mut self, now: Instant) -> Vec<Box<Injector>> {
        let mut due = Vec::new();
        while self.next_due().is_some_and(|d| d <= now) {
            if let Some(Reverse(entry)) = self.heap.pop() {
                due.push(entry.injector);
            }
        }
        self.in_flight += due.len();
        due
    }

    /// Puts an in-flight injector back.
    pub(super) fn reschedule(&mut self, due: Instant, injector: Box<Injector>) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.insert(due, injector);
    }

    /// Forgets an in-flight injector that will not come back.
    pub(super) fn release(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Removes a queued injector by id. It stays counted as in flight until
    /// restored or released, so its slot cannot be admitted away meanwhile.
    pub(super) fn take(&mut self, id: InjectorId) -> Option<Entry> {
        if !self.heap.iter().any(|Reverse(e)| e.injector.id() == id) {
            return None;
        }
        let mut found = None;
        let entries = std::mem::take(&mut self.heap).into_vec();
        self.heap = entries
            .into_iter()
            .filter_map(|Reverse(entry)| {
                if entry.injector.id() == id {
                    found = Some(entry);
                    None
                } else {
                    Some(Reverse(entry))
                }
            })
            .collect();
        if found.is_some() {
            self.in_flight += 1;
        }
        found
    }

    /// Returns an entry removed with [`AdmissionQueue::take`], keeping its
    /// place among entries due at the same time.
    pub(super) fn restore(&mut self, entry: Entry) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.heap.push(Reverse(entry));
    }

    /// Returns a taken entry at a new due time.
    pub(super) fn restore_at(&mut self, mut entry: Entry, due: Instant) {
        entry.due = due;
        self.restore(entry);
    }

    /// Empties the heap. In-flight injectors are not affected.
    pub(super) fn drain(&mut self) -> Vec<Box<Injector>> {
        let mut entries = std::mem::take(&mut self.heap).into_sorted_vec();
        // Sorted ascending by Reverse, so the latest due comes first.
        entries.reverse();
        entries.into_iter().map(|Reverse(e)| e.injector).collect()
    }
}
