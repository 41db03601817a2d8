//! Bounded upload queue.
//!
//! Entries leave the queue only once the remote store has acknowledged
//! them: [`UploadQueue::front`] peeks, [`UploadQueue::ack_front`] pops.
//! A failed send therefore leaves the entry (and everything behind it) in
//! place for the next cycle.
//!
//! ## Overflow policy
//!
//! When full, the oldest non-alert entry is evicted.  Alerts go only when
//! nothing else is left, and the caller is told so it can raise a
//! connectivity alert.

use std::collections::VecDeque;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::model::{AlertEvent, UploadEntry};

/// An entry with its queue sequence number.  Sequence numbers are unique
/// across reboots (the counter is persisted) and form part of the remote key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEntry {
    pub seq: u64,
    pub entry: UploadEntry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Stored,
    /// A non-alert entry was dropped to make room.
    EvictedOldest,
    /// The queue held only alerts; the oldest one was dropped.
    EvictedAlert(AlertEvent),
}

#[derive(Debug)]
pub struct UploadQueue {
    entries: VecDeque<QueuedEntry>,
    capacity: usize,
    next_seq: u64,
    evicted: u64,
}

impl UploadQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            next_seq: 1,
            evicted: 0,
        }
    }

    pub fn push(&mut self, entry: UploadEntry) -> PushOutcome {
        let mut outcome = PushOutcome::Stored;
        if self.entries.len() >= self.capacity {
            outcome = self.evict_one();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(QueuedEntry { seq, entry });
        outcome
    }

    fn evict_one(&mut self) -> PushOutcome {
        self.evicted += 1;
        if let Some(pos) = self.entries.iter().position(|q| !q.entry.is_alert()) {
            let dropped = self.entries.remove(pos);
            warn!(
                "Upload queue full: dropped entry {}",
                dropped.map_or(0, |q| q.seq)
            );
            return PushOutcome::EvictedOldest;
        }
        match self.entries.pop_front() {
            Some(QueuedEntry {
                seq,
                entry: UploadEntry::Alert(alert),
            }) => {
                warn!("Upload queue full of alerts: dropped alert {} (entry {seq})", alert.alert_id);
                PushOutcome::EvictedAlert(alert)
            }
            _ => PushOutcome::EvictedOldest,
        }
    }

    /// Oldest unacknowledged entry.
    pub fn front(&self) -> Option<&QueuedEntry> {
        self.entries.front()
    }

    /// Drop the oldest entry after the store acknowledged it.
    pub fn ack_front(&mut self) -> Option<QueuedEntry> {
        self.entries.pop_front()
    }

    /// Reload persisted contents.  Entries beyond capacity are dropped with
    /// the normal overflow policy.
    pub fn restore(&mut self, entries: Vec<QueuedEntry>, next_seq: u64) {
        self.entries.clear();
        let max_seq = entries.iter().map(|q| q.seq).max().unwrap_or(0);
        for q in entries {
            if self.entries.len() >= self.capacity {
                self.evict_one();
            }
            self.entries.push_back(q);
        }
        self.next_seq = next_seq.max(max_seq + 1).max(1);
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn alert_count(&self) -> usize {
        self.entries.iter().filter(|q| q.entry.is_alert()).count()
    }

    /// Entries dropped by overflow since boot.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
