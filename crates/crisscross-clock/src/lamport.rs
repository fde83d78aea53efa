//! Lamport logical clock

use crisscross_core::LogicalTime;

/// Lamport clock - one counter per process
/// INVARIANT: values handed out by one clock never decrease
#[derive(Clone, Debug, Default)]
pub struct LogicalClock {
    value: LogicalTime,
}

impl LogicalClock {
    /// Create a clock starting at zero
    pub fn new() -> Self {
        LogicalClock {
            value: LogicalTime::ZERO,
        }
    }

    /// Local send: increment, then stamp with the new value
    pub fn tick(&mut self) -> LogicalTime {
        self.value = self.value.next();
        self.value
    }

    /// Receive: advance to `max(local, received) + 1`
    pub fn observe(&mut self, received: LogicalTime) -> LogicalTime {
        self.value = self.value.observe(received);
        self.value
    }

    /// Current value without advancing
    pub fn now(&self) -> LogicalTime {
        self.value
    }
}
