//! In-memory queue of scheduled broadcasts.
//!
//! Owned by the releaser task alone; the poller reaches it only through a
//! channel. Entries are released strictly from the head: an entry that is not
//! due yet holds back everything behind it.

use campaign_types::ScheduledBroadcastHandle;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};

/// FIFO of broadcasts waiting for their `schedule_at`.
#[derive(Debug, Default)]
pub struct ScheduledQueue {
    entries: VecDeque<ScheduledBroadcastHandle>,
    queued: HashSet<String>,
    /// Recently released ids and when they were released.
    executed: HashMap<String, DateTime<Utc>>,
}

impl ScheduledQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one poll result in `schedule_at` order, skipping ids that are
    /// queued or were released recently. Returns how many were added.
    pub fn offer(&mut self, mut batch: Vec<ScheduledBroadcastHandle>) -> usize {
        batch.sort_by_key(|handle| handle.schedule_at);

        let mut added = 0;
        for handle in batch {
            if self.executed.contains_key(&handle.broadcast_id) {
                continue;
            }
            if !self.queued.insert(handle.broadcast_id.clone()) {
                continue;
            }
            self.entries.push_back(handle);
            added += 1;
        }
        added
    }

    /// The head entry, if any.
    pub fn peek(&self) -> Option<&ScheduledBroadcastHandle> {
        self.entries.front()
    }

    /// Remove and return the head if it is due at `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<ScheduledBroadcastHandle> {
        if !self.peek()?.is_due(now) {
            return None;
        }
        let handle = self.entries.pop_front()?;
        self.queued.remove(&handle.broadcast_id);
        Some(handle)
    }

    /// Remember that `broadcast_id` was released at `at`.
    pub fn mark_executed(&mut self, broadcast_id: &str, at: DateTime<Utc>) {
        self.executed.insert(broadcast_id.to_string(), at);
    }

    /// Drop released ids older than `cutoff`.
    pub fn forget_executed_before(&mut self, cutoff: DateTime<Utc>) {
        self.executed.retain(|_, at| *at >= cutoff);
    }

    pub fn contains(&self, broadcast_id: &str) -> bool {
        self.queued.contains(broadcast_id)
    }

    pub fn was_executed(&self, broadcast_id: &str) -> bool {
        self.executed.contains_key(broadcast_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
