//! Session coordinator
//!
//! Owns the session registry and is the only mutator of session state.
//!
//! Locking:
//! - The registry lock is held only to look up or insert/remove an `Arc`.
//! - All work on one session runs under that session's mutex, including
//!   sequence admission for session commands.
//! - The owner index is locked after the session mutex, never before.
//!
//! The effects of a mutation (scoring, notifications, teardown) are queued
//! in the session's [`Outbox`] before its mutex is released and delivered
//! afterwards in queue order. A finished session leaves the registry only
//! after its result notifications went out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use crisscross_clock::TimeSource;
use crisscross_core::{
    ActorId, BoardView, Command, CommandEnvelope, CommandResult, CoordError, CoordResult, Departure,
    GuessResult, Lifecycle, Rejection, Reply, Scope, SessionId,
};
use crisscross_guard::{Admission, SequenceGuard};
use crisscross_liveness::{HeartbeatAck, HeartbeatMonitor, Liveness, Transition};

use crate::{
    Changes, NotificationSink, Outbox, Participant, PuzzleFactory, Scoreboard, Session,
    SessionSettings, WordRepository,
};

/// External services the coordinator delegates to
#[derive(Clone)]
pub struct Collaborators {
    pub puzzles: Arc<dyn PuzzleFactory>,
    pub scoreboard: Arc<dyn Scoreboard>,
    pub words: Arc<dyn WordRepository>,
}

/// Coordinator counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub sessions_created: u64,
    pub sessions_completed: u64,
    pub guesses_applied: u64,
    pub duplicates_rejected: u64,
    pub evictions: u64,
}

/// Registry cleanup for a closed session
struct Teardown {
    session: SessionId,
    completed: bool,
}

/// What one mutation leaves to do once the session mutex is released
struct Effects {
    changes: Changes,
    teardown: Option<Teardown>,
}

struct SessionEntry {
    state: Mutex<Session>,
    outbox: Outbox<Effects>,
}

type SessionHandle = Arc<SessionEntry>;

/// The session/turn state machine service
pub struct SessionCoordinator {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    owners: RwLock<HashMap<ActorId, SessionId>>,
    next_id: AtomicU64,
    guard: Arc<SequenceGuard>,
    monitor: Arc<HeartbeatMonitor>,
    collaborators: Collaborators,
    sink: Arc<dyn NotificationSink>,
    time: Arc<dyn TimeSource>,
    stats: Mutex<CoordinatorStats>,
}

impl SessionCoordinator {
    pub fn new(
        collaborators: Collaborators,
        sink: Arc<dyn NotificationSink>,
        monitor: Arc<HeartbeatMonitor>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        SessionCoordinator {
            sessions: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            guard: Arc::new(SequenceGuard::new()),
            monitor,
            collaborators,
            sink,
            time,
            stats: Mutex::new(CoordinatorStats::default()),
        }
    }

    pub fn monitor(&self) -> &Arc<HeartbeatMonitor> {
        &self.monitor
    }

    pub fn guard(&self) -> &Arc<SequenceGuard> {
        &self.guard
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats.lock().clone()
    }

    fn lookup(&self, session: SessionId) -> CoordResult<SessionHandle> {
        self.sessions
            .read()
            .get(&session)
            .cloned()
            .ok_or(CoordError::UnknownSession(session))
    }

    /// Lock a session that has not been closed
    fn live(entry: &SessionEntry, session: SessionId) -> CoordResult<MutexGuard<'_, Session>> {
        let s = entry.state.lock();
        if s.is_closed() {
            return Err(CoordError::UnknownSession(session));
        }
        Ok(s)
    }

    /// Run `f` on a live session under its mutex
    fn with_session<T>(
        &self,
        session: SessionId,
        f: impl FnOnce(&mut Session) -> CoordResult<T>,
    ) -> CoordResult<T> {
        let handle = self.lookup(session)?;
        let mut s = Self::live(&handle, session)?;
        f(&mut *s)
    }

    /// Mutate a session, queue the effects, then deliver the queue
    async fn run<T>(
        &self,
        session: SessionId,
        op: impl FnOnce(&mut Session) -> CoordResult<(T, Changes)>,
    ) -> CoordResult<T> {
        let handle = self.lookup(session)?;
        let value = {
            let mut s = Self::live(&handle, session)?;
            let (value, changes) = op(&mut *s)?;
            self.commit(&handle, &mut *s, changes);
            value
        };
        self.flush(&handle).await;
        Ok(value)
    }

    /// Like [`Self::run`], admitting `sequence` first under the same mutex
    ///
    /// `Ok(None)` is a duplicate. An admitted command that then fails has
    /// still consumed its sequence.
    async fn run_admitted<T>(
        &self,
        actor: &ActorId,
        session: SessionId,
        sequence: u64,
        op: impl FnOnce(&mut Session) -> CoordResult<(T, Changes)>,
    ) -> CoordResult<Option<T>> {
        let handle = self.lookup(session)?;
        let value = {
            let mut s = Self::live(&handle, session)?;
            if let Admission::Rejected { .. } =
                self.guard.admit(actor, Scope::Session(session), sequence)
            {
                drop(s);
                self.stats.lock().duplicates_rejected += 1;
                return Ok(None);
            }
            let (value, changes) = op(&mut *s)?;
            self.commit(&handle, &mut *s, changes);
            value
        };
        self.flush(&handle).await;
        Ok(Some(value))
    }

    /// Queue a mutation's effects; called with the session mutex held
    fn commit(&self, entry: &SessionEntry, s: &mut Session, changes: Changes) {
        let teardown = changes.closed.then(|| self.close(s));
        if changes.dispatches.is_empty() && changes.winners.is_empty() && teardown.is_none() {
            return;
        }
        entry.outbox.push(Effects { changes, teardown });
    }

    /// Deliver everything queued for a session, unless another caller
    /// already is
    async fn flush(&self, entry: &SessionEntry) {
        let Some(drain) = entry.outbox.drain() else {
            return;
        };
        for Effects { changes, teardown } in drain {
            if !changes.winners.is_empty() {
                self.collaborators.scoreboard.credit_winners(&changes.winners);
            }
            for dispatch in changes.dispatches {
                self.sink.dispatch(dispatch).await;
            }
            if let Some(teardown) = teardown {
                self.destroy(teardown);
            }
        }
    }

    /// Mark a session closed and release its members
    fn close(&self, s: &mut Session) -> Teardown {
        s.close();
        let id = s.id();
        let mut owners = self.owners.write();
        for member in s.participant_ids() {
            if owners.get(&member) == Some(&id) {
                owners.remove(&member);
            }
        }
        Teardown {
            session: id,
            completed: s.lifecycle().is_completed(),
        }
    }

    fn destroy(&self, teardown: Teardown) {
        self.sessions.write().remove(&teardown.session);
        self.monitor.forget_session(teardown.session);
        self.guard.forget_scope(Scope::Session(teardown.session));
        if teardown.completed {
            self.stats.lock().sessions_completed += 1;
        }
        info!(session = %teardown.session, "Session destroyed");
    }

    // ---- Lifecycle ---------------------------------------------------------

    /// Create a session under the next free id
    pub async fn create_session(
        &self,
        creator: ActorId,
        settings: SessionSettings,
    ) -> CoordResult<SessionId> {
        loop {
            let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
            match self.create_session_with_id(id, creator.clone(), settings).await {
                Err(CoordError::SessionExists(_)) => continue,
                other => return other,
            }
        }
    }

    /// Create a session under a caller-chosen id
    pub async fn create_session_with_id(
        &self,
        id: SessionId,
        creator: ActorId,
        settings: SessionSettings,
    ) -> CoordResult<SessionId> {
        settings.validate()?;
        let puzzle = self.collaborators.puzzles.create(&settings)?;
        let now = self.time.now();

        {
            let mut sessions = self.sessions.write();
            if sessions.contains_key(&id) {
                return Err(CoordError::SessionExists(id));
            }
            let mut owners = self.owners.write();
            if let Some(current) = owners.get(&creator) {
                return Err(CoordError::AlreadyInSession {
                    actor: creator,
                    session: *current,
                });
            }
            owners.insert(creator.clone(), id);
            let session = Session::new(id, creator.clone(), settings, puzzle, now);
            sessions.insert(
                id,
                Arc::new(SessionEntry {
                    state: Mutex::new(session),
                    outbox: Outbox::new(),
                }),
            );
        }

        self.monitor.track(id, creator.clone(), now);
        self.stats.lock().sessions_created += 1;
        info!(session = %id, %creator, required = settings.required_players, "Session created");
        Ok(id)
    }

    /// Add a player; returns the new player count
    pub async fn join(&self, session: SessionId, actor: ActorId) -> CoordResult<u32> {
        let now = self.time.now();
        self.run(session, |s| self.join_locked(s, &actor, now)).await
    }

    fn join_locked(
        &self,
        s: &mut Session,
        actor: &ActorId,
        now: Instant,
    ) -> CoordResult<(u32, Changes)> {
        s.check_join(actor)?;
        {
            let mut owners = self.owners.write();
            if let Some(current) = owners.get(actor) {
                return Err(CoordError::AlreadyInSession {
                    actor: actor.clone(),
                    session: *current,
                });
            }
            owners.insert(actor.clone(), s.id());
        }
        let changes = match s.join(actor.clone(), now) {
            Ok(changes) => changes,
            Err(e) => {
                self.owners.write().remove(actor);
                return Err(e);
            }
        };

        self.monitor.track(s.id(), actor.clone(), now);
        let players = s.participants().len() as u32;
        info!(session = %s.id(), %actor, players, "Player joined");
        Ok((players, changes))
    }

    /// Start a ready session
    pub async fn start(&self, session: SessionId) -> CoordResult<()> {
        self.run(session, |s| Ok(((), s.start()?))).await
    }

    /// Apply a guess, admitting it through the sequence guard first
    pub async fn submit_guess(
        &self,
        actor: &ActorId,
        session: SessionId,
        guess: &str,
        sequence: u64,
    ) -> Reply {
        self.execute(CommandEnvelope::guess(actor.clone(), session, sequence, guess))
            .await
    }

    fn guess_locked(
        &self,
        s: &mut Session,
        actor: &ActorId,
        guess: &str,
        sequence: u64,
    ) -> CoordResult<(GuessResult, Changes)> {
        let (result, changes) = s.guess(actor, guess)?;
        self.stats.lock().guesses_applied += 1;
        debug!(session = %s.id(), %actor, sequence, remaining = result.guesses_remaining, "Guess applied");
        Ok((result, changes))
    }

    /// Leave a session voluntarily
    pub async fn quit(&self, actor: &ActorId, session: SessionId) -> CoordResult<()> {
        self.run(session, |s| self.quit_locked(s, actor)).await
    }

    fn quit_locked(&self, s: &mut Session, actor: &ActorId) -> CoordResult<((), Changes)> {
        let changes = s.remove(actor, Departure::Quit).ok_or_else(|| CoordError::UnknownActor {
            actor: actor.clone(),
            session: s.id(),
        })?;
        self.owners.write().remove(actor);
        self.monitor.forget(s.id(), actor);
        info!(session = %s.id(), %actor, "Player quit");
        Ok(((), changes))
    }

    // ---- Liveness ----------------------------------------------------------

    /// Record a liveness ping from a participant
    pub fn heartbeat(&self, session: SessionId, actor: &ActorId) -> CoordResult<HeartbeatAck> {
        let now = self.time.now();
        let handle = self.lookup(session)?;
        let ack = self.monitor.record_heartbeat(session, actor, now);
        if ack != HeartbeatAck::Unknown {
            let mut s = handle.state.lock();
            if !s.is_closed() {
                s.record_heartbeat(actor, now);
            }
        }
        if ack == HeartbeatAck::Restored {
            info!(%session, %actor, "Participant restored");
        }
        Ok(ack)
    }

    /// Act on one transition reported by the heartbeat monitor
    ///
    /// Transitions for sessions or participants that are already gone are
    /// ignored.
    pub async fn apply_liveness(&self, transition: Transition) {
        let Transition { session, actor, to, .. } = transition;
        let Ok(handle) = self.lookup(session) else {
            return;
        };

        {
            let Ok(mut s) = Self::live(&handle, session) else {
                return;
            };
            let changes = match to {
                Liveness::Active => None,
                Liveness::Suspected => s.mark_suspected(&actor),
                Liveness::Failed => s.evict_failed(&actor).map(|changes| {
                    self.owners.write().remove(&actor);
                    self.monitor.forget(session, &actor);
                    self.stats.lock().evictions += 1;
                    warn!(%session, %actor, "Participant evicted");
                    changes
                }),
            };
            let Some(changes) = changes else {
                return;
            };
            self.commit(&handle, &mut *s, changes);
        }
        self.flush(&handle).await;
    }

    // ---- Commands ----------------------------------------------------------

    /// Handle a command envelope
    pub async fn execute(&self, envelope: CommandEnvelope) -> Reply {
        let CommandEnvelope {
            actor,
            scope,
            sequence,
            command,
        } = envelope;
        if !command.accepts_scope(scope) {
            return Reply::Error(CoordError::ScopeMismatch.kind());
        }

        let name = command.name();
        let outcome = match scope {
            Scope::Global => self.execute_global(&actor, sequence, command).await,
            Scope::Session(session) => {
                self.execute_in_session(&actor, session, sequence, command)
                    .await
            }
        };
        match outcome {
            Ok(Some(result)) => Reply::Accepted(result),
            Ok(None) => {
                debug!(%actor, ?scope, sequence, command = name, "Duplicate command");
                Reply::Rejected(Rejection::Duplicate)
            }
            Err(e) => {
                debug!(%actor, ?scope, sequence, command = name, "Command refused: {}", e);
                Reply::Error(e.kind())
            }
        }
    }

    async fn execute_in_session(
        &self,
        actor: &ActorId,
        session: SessionId,
        sequence: u64,
        command: Command,
    ) -> CoordResult<Option<CommandResult>> {
        match command {
            Command::Join => {
                let now = self.time.now();
                let joined = self
                    .run_admitted(actor, session, sequence, |s| self.join_locked(s, actor, now))
                    .await?;
                Ok(joined.map(|players| CommandResult::Joined { players }))
            }
            Command::Start => {
                let started = self
                    .run_admitted(actor, session, sequence, |s| {
                        if !s.contains(actor) {
                            return Err(CoordError::UnknownActor {
                                actor: actor.clone(),
                                session,
                            });
                        }
                        Ok(((), s.start()?))
                    })
                    .await?;
                Ok(started.map(|()| CommandResult::Started))
            }
            Command::Guess { guess } => {
                let applied = self
                    .run_admitted(actor, session, sequence, |s| {
                        self.guess_locked(s, actor, &guess, sequence)
                    })
                    .await?;
                Ok(applied.map(CommandResult::Guess))
            }
            Command::Quit => {
                let left = self
                    .run_admitted(actor, session, sequence, |s| self.quit_locked(s, actor))
                    .await?;
                Ok(left.map(|()| CommandResult::Left))
            }
            Command::CreateSession { .. } | Command::AddWord { .. } | Command::RemoveWord { .. } => {
                Err(CoordError::ScopeMismatch)
            }
        }
    }

    async fn execute_global(
        &self,
        actor: &ActorId,
        sequence: u64,
        command: Command,
    ) -> CoordResult<Option<CommandResult>> {
        if let Admission::Rejected { .. } = self.guard.admit(actor, Scope::Global, sequence) {
            self.stats.lock().duplicates_rejected += 1;
            return Ok(None);
        }

        let result = match command {
            Command::CreateSession { settings } => {
                let session = self.create_session(actor.clone(), settings).await?;
                CommandResult::Created { session }
            }
            Command::AddWord { word } => {
                let changed = self.collaborators.words.add_word(&word);
                debug!(%actor, sequence, changed, "Word added");
                CommandResult::WordEdit { changed }
            }
            Command::RemoveWord { word } => {
                let changed = self.collaborators.words.remove_word(&word);
                debug!(%actor, sequence, changed, "Word removed");
                CommandResult::WordEdit { changed }
            }
            Command::Join | Command::Start | Command::Guess { .. } | Command::Quit => {
                return Err(CoordError::ScopeMismatch);
            }
        };
        Ok(Some(result))
    }

    /// Read-only lookup in the word repository
    pub fn check_word(&self, word: &str) -> bool {
        self.collaborators.words.check_word(word)
    }

    /// Last accepted sequence for an actor in a scope
    pub fn current_sequence(&self, actor: &ActorId, scope: Scope) -> u64 {
        self.guard.current(actor, scope)
    }

    /// Move an actor's counter forward, e.g. when a client resynchronizes
    pub fn advance_to(&self, actor: &ActorId, scope: Scope, sequence: u64) -> u64 {
        self.guard.advance_to(actor, scope, sequence)
    }

    // ---- Queries -----------------------------------------------------------

    pub fn lifecycle(&self, session: SessionId) -> CoordResult<Lifecycle> {
        self.with_session(session, |s| Ok(s.lifecycle()))
    }

    pub fn participants(&self, session: SessionId) -> CoordResult<Vec<Participant>> {
        self.with_session(session, |s| Ok(s.participants().to_vec()))
    }

    pub fn active_player(&self, session: SessionId) -> CoordResult<Option<ActorId>> {
        self.with_session(session, |s| Ok(s.active_player().cloned()))
    }

    pub fn guess_budget(&self, session: SessionId) -> CoordResult<u32> {
        self.with_session(session, |s| Ok(s.guess_budget()))
    }

    /// Current grid and counters
    pub fn snapshot(&self, session: SessionId) -> CoordResult<BoardView> {
        self.with_session(session, |s| Ok(s.board()))
    }

    /// Session an actor currently plays in
    pub fn session_of(&self, actor: &ActorId) -> Option<SessionId> {
        self.owners.read().get(actor).copied()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().keys().copied().collect();
        ids.sort();
        ids
    }
}
