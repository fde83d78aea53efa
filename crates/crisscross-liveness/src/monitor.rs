//! Heartbeat monitor
//!
//! Entries are keyed by (session, actor). `scan` grades every entry against
//! the supplied `now` and returns only entries whose grade changed, so a
//! participant is reported Suspected once and Failed once however often the
//! scan runs. The monitor lock is held only while grading; callers apply
//! transitions afterwards under their own locks.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crisscross_core::{ActorId, CoordError, CoordResult, SessionId};

/// Detector thresholds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Silence after which a participant is suspected (`T`)
    pub timeout: Duration,
    /// Multiple of `timeout` after which it is failed (`K`)
    pub multiplier: u32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        LivenessConfig {
            timeout: Duration::from_secs(1),
            multiplier: 3,
        }
    }
}

impl LivenessConfig {
    pub fn new(timeout: Duration, multiplier: u32) -> Self {
        LivenessConfig { timeout, multiplier }
    }

    /// Silence after which a participant is failed (`T * K`)
    pub fn failure_after(&self) -> Duration {
        self.timeout.saturating_mul(self.multiplier)
    }

    pub fn validate(&self) -> CoordResult<()> {
        if self.timeout.is_zero() {
            return Err(CoordError::Config("heartbeat timeout must be non-zero".into()));
        }
        if self.multiplier < 1 {
            return Err(CoordError::Config("failure multiplier must be at least 1".into()));
        }
        Ok(())
    }

    /// Grade a silence
    pub fn grade(&self, silent: Duration) -> Liveness {
        if silent < self.timeout {
            Liveness::Active
        } else if silent < self.failure_after() {
            Liveness::Suspected
        } else {
            Liveness::Failed
        }
    }
}

/// Liveness grade, ordered by severity
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Liveness {
    Active,
    Suspected,
    Failed,
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Liveness::Active => "active",
            Liveness::Suspected => "suspected",
            Liveness::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A participant whose grade changed during a scan
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub session: SessionId,
    pub actor: ActorId,
    pub from: Liveness,
    pub to: Liveness,
    /// Silence at the time of the scan
    pub silent: Duration,
}

/// Outcome of recording a heartbeat
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatAck {
    /// Timestamp refreshed, participant was active
    Recorded,
    /// Participant was suspected and is active again
    Restored,
    /// Not tracked (never joined, or already failed); must re-join
    Unknown,
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    last_heartbeat: Instant,
    state: Liveness,
}

/// Heartbeat failure detector
pub struct HeartbeatMonitor {
    config: LivenessConfig,
    entries: Mutex<HashMap<(SessionId, ActorId), Entry>>,
}

impl HeartbeatMonitor {
    pub fn new(config: LivenessConfig) -> Self {
        HeartbeatMonitor {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> LivenessConfig {
        self.config
    }

    /// Start watching a participant, as if it had just sent a heartbeat
    pub fn track(&self, session: SessionId, actor: ActorId, now: Instant) {
        self.entries.lock().insert(
            (session, actor),
            Entry {
                last_heartbeat: now,
                state: Liveness::Active,
            },
        );
    }

    pub fn forget(&self, session: SessionId, actor: &ActorId) -> bool {
        self.entries.lock().remove(&(session, actor.clone())).is_some()
    }

    /// Stop watching every participant of a session
    pub fn forget_session(&self, session: SessionId) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(s, _), _| *s != session);
        before - entries.len()
    }

    pub fn record_heartbeat(&self, session: SessionId, actor: &ActorId, now: Instant) -> HeartbeatAck {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&(session, actor.clone())) else {
            return HeartbeatAck::Unknown;
        };

        match entry.state {
            Liveness::Failed => HeartbeatAck::Unknown,
            Liveness::Suspected => {
                entry.last_heartbeat = now;
                entry.state = Liveness::Active;
                debug!(%session, %actor, "Suspected participant restored");
                HeartbeatAck::Restored
            }
            Liveness::Active => {
                entry.last_heartbeat = entry.last_heartbeat.max(now);
                HeartbeatAck::Recorded
            }
        }
    }

    /// Grade every entry and return the ones that changed
    ///
    /// Grades only worsen here; recovery happens through
    /// [`HeartbeatMonitor::record_heartbeat`]. Transitions are sorted by
    /// session, then actor.
    pub fn scan(&self, now: Instant) -> Vec<Transition> {
        let mut transitions = Vec::new();
        {
            let mut entries = self.entries.lock();
            for ((session, actor), entry) in entries.iter_mut() {
                let silent = now.saturating_duration_since(entry.last_heartbeat);
                let grade = self.config.grade(silent);
                if grade > entry.state {
                    transitions.push(Transition {
                        session: *session,
                        actor: actor.clone(),
                        from: entry.state,
                        to: grade,
                        silent,
                    });
                    entry.state = grade;
                }
            }
        }

        transitions.sort_by(|a, b| (a.session, &a.actor).cmp(&(b.session, &b.actor)));
        for t in &transitions {
            warn!(
                session = %t.session,
                actor = %t.actor,
                silent = %humantime::format_duration(t.silent),
                "Participant {}",
                t.to
            );
        }
        transitions
    }

    pub fn state(&self, session: SessionId, actor: &ActorId) -> Option<Liveness> {
        self.entries
            .lock()
            .get(&(session, actor.clone()))
            .map(|e| e.state)
    }

    /// Number of watched participants
    pub fn tracked(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new(LivenessConfig::default())
    }
}
