//! Per-session effect queue
//!
//! Effects are pushed while the session mutex is held, so queue order is
//! mutation order. After releasing the mutex a caller tries to claim the
//! drain: the first claimant delivers everything queued, including batches
//! pushed by other callers while it was busy; the others return at once.

use std::collections::VecDeque;

use parking_lot::Mutex;

struct OutboxState<T> {
    queue: VecDeque<T>,
    draining: bool,
}

/// Ordered queue with a single drainer at a time
pub struct Outbox<T> {
    state: Mutex<OutboxState<T>>,
}

impl<T> Outbox<T> {
    pub fn new() -> Self {
        Outbox {
            state: Mutex::new(OutboxState {
                queue: VecDeque::new(),
                draining: false,
            }),
        }
    }

    pub fn push(&self, item: T) {
        self.state.lock().queue.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Claim the drain; `None` while another caller holds it
    pub fn drain(&self) -> Option<Drain<'_, T>> {
        let mut state = self.state.lock();
        if state.draining {
            return None;
        }
        state.draining = true;
        Some(Drain {
            outbox: self,
            released: false,
        })
    }
}

impl<T> Default for Outbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive right to pop from an [`Outbox`]
///
/// The claim is released when the queue is found empty, or on drop.
pub struct Drain<'a, T> {
    outbox: &'a Outbox<T>,
    released: bool,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.released {
            return None;
        }
        let mut state = self.outbox.state.lock();
        let item = state.queue.pop_front();
        if item.is_none() {
            // Emptiness and release are one step, so a concurrent push
            // either lands before it or finds the drain free
            state.draining = false;
            self.released = true;
        }
        item
    }
}

impl<T> Drop for Drain<'_, T> {
    fn drop(&mut self) {
        if !self.released {
            self.outbox.state.lock().draining = false;
        }
    }
}
