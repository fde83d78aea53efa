//! Time sources for the liveness detector
//!
//! The detector only needs a monotonic "now". Tests drive a manual source
//! so that silence of exactly 0.5s, 1.5s or 3.5s can be reproduced.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonic time provider
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Backed by the OS monotonic clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Advanced explicitly by the caller
#[derive(Clone, Debug)]
pub struct ManualTimeSource {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        ManualTimeSource {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move time forward; clones share the same timeline
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock();
        *offset += by;
    }

    /// Time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_source_shared_timeline() {
        let source = ManualTimeSource::new();
        let clone = source.clone();
        let start = source.now();

        clone.advance(Duration::from_millis(1500));

        assert_eq!(source.now() - start, Duration::from_millis(1500));
        assert_eq!(source.elapsed(), Duration::from_millis(1500));
    }

    #[test]
    fn test_system_source_monotonic() {
        let source = SystemTimeSource;
        let t1 = source.now();
        let t2 = source.now();
        assert!(t2 >= t1);
    }
}
