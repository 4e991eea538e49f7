// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable retry queue for profile writes that failed (usually offline).
//!
//! - Entries are persisted to the durable device store on every change.
//! - A drain works through a snapshot in enqueue order. Entries stay in the
//!   persisted list until their retry is settled: removed once delivered,
//!   left in place with the attempt count bumped when it fails.
//! - One entry per uid: a newer write for a queued uid replaces the queued
//!   fields in place. Profile writes are merges, so this loses nothing.
//! - Capacity and retries are capped. Rejected and exhausted entries are
//!   reported on a broadcast channel; exhausted ones are kept in a durable
//!   dead-letter list.

use crate::error::{AuthError, Result};
use crate::models::PendingProfileWrite;
use crate::storage::{get_json, keys, set_json, KeyValueStore};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Event channel depth; slow observers miss old events, not new ones.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Observable queue outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// A write was queued (or merged into an existing entry).
    Enqueued { uid: String },
    /// A queued write finally succeeded.
    Delivered { uid: String },
    /// The queue was full and refused a new uid.
    Overflow(PendingProfileWrite),
    /// A write ran out of attempts and moved to the dead-letter list.
    Exhausted(PendingProfileWrite),
    /// The dead-letter list was full and its oldest entry was discarded.
    DeadLetterEvicted(PendingProfileWrite),
}

/// Where a failed entry ended up after `requeue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueOutcome {
    Requeued,
    Exhausted,
}

/// Counts from a single drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub succeeded: usize,
    pub requeued: usize,
    pub exhausted: usize,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.succeeded == 0 && self.requeued == 0 && self.exhausted == 0
    }
}

/// Persisted queue of pending profile writes.
pub struct ProfileWriteQueue {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
    max_attempts: u32,
    pending: Mutex<VecDeque<PendingProfileWrite>>,
    events: broadcast::Sender<QueueEvent>,
}

impl ProfileWriteQueue {
    /// Load the queue from the durable store.
    pub fn load(store: Arc<dyn KeyValueStore>, capacity: usize, max_attempts: u32) -> Self {
        let pending: VecDeque<PendingProfileWrite> =
            match get_json::<Vec<PendingProfileWrite>>(store.as_ref(), keys::PENDING_PROFILE_WRITES)
            {
                Ok(entries) => entries.unwrap_or_default().into(),
                Err(e) => {
                    tracing::error!(error = %e, "Pending profile writes unreadable, starting empty");
                    VecDeque::new()
                }
            };

        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "Recovered pending profile writes");
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            capacity: capacity.max(1),
            max_attempts: max_attempts.max(1),
            pending: Mutex::new(pending),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Queued entries in retry order.
    pub fn snapshot(&self) -> Vec<PendingProfileWrite> {
        self.lock().iter().cloned().collect()
    }

    /// Entries that exhausted their retry budget.
    pub fn dead_letters(&self) -> Vec<PendingProfileWrite> {
        get_json(self.store.as_ref(), keys::DEAD_PROFILE_WRITES)
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    /// Queue a failed write.
    pub fn enqueue(&self, entry: PendingProfileWrite) -> Result<()> {
        let mut pending = self.lock();

        if let Some(existing) = pending.iter_mut().find(|e| e.uid == entry.uid) {
            existing.fields = entry.fields;
            existing.session_email = entry.session_email.or(existing.session_email.take());
            existing.session_phone = entry.session_phone.or(existing.session_phone.take());
            existing.attempts = existing.attempts.max(entry.attempts);
        } else if pending.len() >= self.capacity {
            tracing::error!(uid = %entry.uid, capacity = self.capacity, "Profile write queue full, write rejected");
            let _ = self.events.send(QueueEvent::Overflow(entry));
            return Err(AuthError::Storage("profile write queue is full".to_string()));
        } else {
            pending.push_back(entry.clone());
        }

        self.persist(&pending)?;
        tracing::info!(uid = %entry.uid, queued = pending.len(), "Profile write queued for retry");
        let _ = self.events.send(QueueEvent::Enqueued { uid: entry.uid });
        Ok(())
    }

    /// Settle a successful retry: drop the entry from the persisted queue.
    ///
    /// If a newer write for the same uid was merged in while the retry was
    /// in flight, that write stays queued for the next drain.
    pub fn delivered(&self, entry: &PendingProfileWrite) -> Result<()> {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|e| !(e.uid == entry.uid && e.fields == entry.fields));
        if pending.len() != before {
            self.persist(&pending)?;
        }
        drop(pending);

        tracing::info!(uid = %entry.uid, "Queued profile write delivered");
        let _ = self.events.send(QueueEvent::Delivered {
            uid: entry.uid.clone(),
        });
        Ok(())
    }

    /// Settle a failed retry. `attempts` must already count the failed
    /// retry. The entry keeps its queue position until it runs out of
    /// attempts.
    pub fn requeue(&self, entry: PendingProfileWrite) -> Result<RequeueOutcome> {
        let mut pending = self.lock();
        let position = pending.iter().position(|e| e.uid == entry.uid);

        if entry.attempts >= self.max_attempts {
            // Dead-letter the freshest fields queued for this uid
            let exhausted = match position {
                Some(i) => PendingProfileWrite {
                    attempts: entry.attempts,
                    ..pending[i].clone()
                },
                None => entry,
            };
            self.dead_letter(exhausted)?;
            if let Some(i) = position {
                pending.remove(i);
                self.persist(&pending)?;
            }
            return Ok(RequeueOutcome::Exhausted);
        }

        match position {
            Some(i) => pending[i].attempts = pending[i].attempts.max(entry.attempts),
            None => pending.push_back(entry),
        }
        self.persist(&pending)?;
        Ok(RequeueOutcome::Requeued)
    }

    fn dead_letter(&self, entry: PendingProfileWrite) -> Result<()> {
        let mut dead = self.dead_letters();
        dead.push(entry.clone());
        let evicted: Vec<_> = if dead.len() > self.capacity {
            let excess = dead.len() - self.capacity;
            dead.drain(..excess).collect()
        } else {
            Vec::new()
        };
        set_json(self.store.as_ref(), keys::DEAD_PROFILE_WRITES, &dead)?;

        tracing::error!(
            uid = %entry.uid,
            attempts = entry.attempts,
            "Profile write exhausted its retries"
        );
        let _ = self.events.send(QueueEvent::Exhausted(entry));

        for old in evicted {
            tracing::error!(uid = %old.uid, enqueued_at = %old.enqueued_at, "Dead-letter list full, discarding oldest entry");
            let _ = self.events.send(QueueEvent::DeadLetterEvicted(old));
        }
        Ok(())
    }

    fn persist(&self, pending: &VecDeque<PendingProfileWrite>) -> Result<()> {
        let entries: Vec<&PendingProfileWrite> = pending.iter().collect();
        set_json(self.store.as_ref(), keys::PENDING_PROFILE_WRITES, &entries)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingProfileWrite>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
