//! Delivery bookkeeping
//!
//! `DeliveryState` records the last delivered sequence per sender.
//! `PendingQueue` holds messages that arrived ahead of a predecessor and
//! yields them in global order once they become contiguous.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crisscross_core::{ClockedMessage, LogicalTime, PeerId};

/// Last delivered sequence per sender
/// INVARIANT: entries never decrease
#[derive(Clone, Debug, Default)]
pub struct DeliveryState {
    delivered: HashMap<PeerId, u64>,
}

impl DeliveryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last delivered sequence, 0 if nothing delivered yet
    pub fn last(&self, sender: &PeerId) -> u64 {
        self.delivered.get(sender).copied().unwrap_or(0)
    }

    /// Whether `msg` is the next expected message from its sender
    pub fn is_next(&self, msg: &ClockedMessage) -> bool {
        msg.sequence == self.last(&msg.sender) + 1
    }

    /// Already delivered
    pub fn is_stale(&self, msg: &ClockedMessage) -> bool {
        msg.sequence <= self.last(&msg.sender)
    }

    fn record(&mut self, sender: &PeerId, sequence: u64) {
        let entry = self.delivered.entry(sender.clone()).or_insert(0);
        *entry = (*entry).max(sequence);
    }

    /// Senders heard from
    pub fn senders(&self) -> impl Iterator<Item = (&PeerId, u64)> {
        self.delivered.iter().map(|(p, s)| (p, *s))
    }
}

/// Result of offering a message to the queue
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// Already delivered or already pending
    Duplicate,
}

/// Messages waiting for their per-sender predecessor
///
/// Per sender the queue keeps messages by sequence. The only candidate for
/// delivery from a sender is its next contiguous sequence, so the
/// deliverable set holds at most one entry per sender, ordered by
/// `(logical_time, sender)`.
#[derive(Debug, Default)]
pub struct PendingQueue {
    by_sender: HashMap<PeerId, BTreeMap<u64, ClockedMessage>>,
    deliverable: BTreeSet<(LogicalTime, PeerId)>,
    len: usize,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a message; duplicates are discarded
    pub fn insert(&mut self, msg: ClockedMessage, state: &DeliveryState) -> Enqueue {
        if state.is_stale(&msg) {
            return Enqueue::Duplicate;
        }
        let queue = self.by_sender.entry(msg.sender.clone()).or_default();
        if queue.contains_key(&msg.sequence) {
            return Enqueue::Duplicate;
        }
        if state.is_next(&msg) {
            self.deliverable.insert(msg.order_key());
        }
        queue.insert(msg.sequence, msg);
        self.len += 1;
        Enqueue::Queued
    }

    /// Deliver every message that has become deliverable, in order
    pub fn drain(&mut self, state: &mut DeliveryState) -> Vec<ClockedMessage> {
        let mut delivered = Vec::new();

        while let Some(key) = self.deliverable.pop_first() {
            let sender = key.1;
            let next = state.last(&sender) + 1;
            let Some(queue) = self.by_sender.get_mut(&sender) else {
                continue;
            };
            let Some(msg) = queue.remove(&next) else {
                continue;
            };
            self.len -= 1;
            state.record(&sender, msg.sequence);

            if let Some(successor) = queue.get(&(next + 1)) {
                self.deliverable.insert(successor.order_key());
            }
            if queue.is_empty() {
                self.by_sender.remove(&sender);
            }
            delivered.push(msg);
        }

        delivered
    }
}
