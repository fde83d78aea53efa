//! Logical time primitives
//!
//! CrissCross orders broadcast traffic with Lamport timestamps. Wall-clock
//! time only matters to the liveness detector and never appears on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lamport timestamp
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct LogicalTime(pub u64);

impl LogicalTime {
    pub const ZERO: LogicalTime = LogicalTime(0);

    #[inline]
    pub fn new(value: u64) -> Self {
        LogicalTime(value)
    }

    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }

    /// The next tick (local send rule)
    #[inline]
    pub fn next(self) -> Self {
        LogicalTime(self.0.saturating_add(1))
    }

    /// Receive rule: `max(local, received) + 1`
    #[inline]
    pub fn observe(self, received: LogicalTime) -> Self {
        self.max(received).next()
    }
}

impl fmt::Debug for LogicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Display for LogicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
