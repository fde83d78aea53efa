//! Sequence tables for command deduplication

use std::collections::HashMap;

use crisscross_core::{ActorId, Scope};
use parking_lot::Mutex;
use tracing::debug;

/// Outcome of presenting a sequence number
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// New command; the table already records it
    Accepted,
    /// At or below the last accepted sequence
    Rejected { last: u64 },
}

impl Admission {
    #[inline]
    pub fn is_accepted(self) -> bool {
        matches!(self, Admission::Accepted)
    }
}

/// Last accepted sequence per (actor, scope)
///
/// Entries are created lazily (missing = 0) and only ever move forward.
#[derive(Debug, Default)]
pub struct ActorSequenceTable {
    entries: HashMap<(ActorId, Scope), u64>,
}

impl ActorSequenceTable {
    pub fn new() -> Self {
        ActorSequenceTable {
            entries: HashMap::new(),
        }
    }

    /// Last accepted sequence, 0 if none
    pub fn current(&self, actor: &ActorId, scope: Scope) -> u64 {
        self.entries
            .get(&(actor.clone(), scope))
            .copied()
            .unwrap_or(0)
    }

    /// Accept `sequence` iff it is above the last accepted one
    pub fn admit(&mut self, actor: &ActorId, scope: Scope, sequence: u64) -> Admission {
        let last = self.entries.entry((actor.clone(), scope)).or_insert(0);
        if sequence > *last {
            *last = sequence;
            Admission::Accepted
        } else {
            Admission::Rejected { last: *last }
        }
    }

    /// Move the entry forward to `sequence`; lower values are ignored
    pub fn advance_to(&mut self, actor: &ActorId, scope: Scope, sequence: u64) -> u64 {
        let last = self.entries.entry((actor.clone(), scope)).or_insert(0);
        *last = (*last).max(sequence);
        *last
    }

    /// Drop every actor's entry for one scope
    pub fn forget_scope(&mut self, scope: Scope) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(_, s), _| *s != scope);
        before - self.entries.len()
    }

    /// Drop every entry of one actor
    pub fn forget_actor(&mut self, actor: &ActorId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(a, _), _| a != actor);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared, internally locked sequence table
///
/// The lock is held only for the lookup and update. Callers that need
/// admission to be atomic with a state change (session commands) call
/// [`SequenceGuard::admit`] while holding their own lock.
#[derive(Debug, Default)]
pub struct SequenceGuard {
    table: Mutex<ActorSequenceTable>,
}

impl SequenceGuard {
    pub fn new() -> Self {
        SequenceGuard {
            table: Mutex::new(ActorSequenceTable::new()),
        }
    }

    pub fn admit(&self, actor: &ActorId, scope: Scope, sequence: u64) -> Admission {
        let admission = self.table.lock().admit(actor, scope, sequence);
        if let Admission::Rejected { last } = admission {
            debug!(%actor, ?scope, sequence, last, "Duplicate command rejected");
        }
        admission
    }

    pub fn current(&self, actor: &ActorId, scope: Scope) -> u64 {
        self.table.lock().current(actor, scope)
    }

    pub fn advance_to(&self, actor: &ActorId, scope: Scope, sequence: u64) -> u64 {
        self.table.lock().advance_to(actor, scope, sequence)
    }

    pub fn forget_scope(&self, scope: Scope) -> usize {
        self.table.lock().forget_scope(scope)
    }

    pub fn forget_actor(&self, actor: &ActorId) -> usize {
        self.table.lock().forget_actor(actor)
    }

    /// Number of (actor, scope) entries
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}
