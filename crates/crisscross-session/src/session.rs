//! Session state machine
//!
//! `Forming -> Ready -> Running -> Completed(Won | Lost)`
//!
//! A `Session` never performs I/O and never locks anything. Every mutation
//! returns the notifications it produced as [`Changes`]; the coordinator
//! applies them after releasing the session lock.

use std::fmt;
use std::time::Instant;

use tracing::info;

use crisscross_core::{
    ActorId, BoardView, CoordError, CoordResult, Departure, Dispatch, GuessResult, Lifecycle,
    Outcome, Scores, SessionEvent, SessionId,
};

use crate::{Puzzle, SessionSettings};

/// Liveness of a participant as seen by the session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParticipantStatus {
    Active,
    Suspected,
    Failed,
}

/// One player in a session. Turn order is join order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Participant {
    pub id: ActorId,
    pub status: ParticipantStatus,
    pub last_heartbeat: Instant,
    /// Words completed by this player's guesses
    pub score: u32,
}

impl Participant {
    pub fn new(id: ActorId, now: Instant) -> Self {
        Participant {
            id,
            status: ParticipantStatus::Active,
            last_heartbeat: now,
            score: 0,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == ParticipantStatus::Active
    }
}

/// Side effects of one mutation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Changes {
    /// Notifications, in the order they must be sent
    pub dispatches: Vec<Dispatch>,
    /// Players to credit with a win
    pub winners: Vec<ActorId>,
    /// The session ended or emptied and must be torn down
    pub closed: bool,
}

impl Changes {
    fn push(&mut self, recipients: Vec<ActorId>, event: SessionEvent) {
        if !recipients.is_empty() {
            self.dispatches.push(Dispatch::new(recipients, event));
        }
    }
}

/// One puzzle game
pub struct Session {
    id: SessionId,
    settings: SessionSettings,
    participants: Vec<Participant>,
    active_index: usize,
    lifecycle: Lifecycle,
    guess_budget: u32,
    puzzle: Box<dyn Puzzle>,
    closed: bool,
}

impl Session {
    /// Create a session with its creator as first participant
    pub fn new(
        id: SessionId,
        creator: ActorId,
        settings: SessionSettings,
        puzzle: Box<dyn Puzzle>,
        now: Instant,
    ) -> Self {
        let lifecycle = if settings.required_players <= 1 {
            Lifecycle::Ready
        } else {
            Lifecycle::Forming
        };
        Session {
            id,
            settings,
            participants: vec![Participant::new(creator, now)],
            active_index: 0,
            lifecycle,
            guess_budget: puzzle.guess_budget(),
            puzzle,
            closed: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn guess_budget(&self) -> u32 {
        self.guess_budget
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, actor: &ActorId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == actor)
    }

    pub fn participant_ids(&self) -> Vec<ActorId> {
        self.participants.iter().map(|p| p.id.clone()).collect()
    }

    pub fn contains(&self, actor: &ActorId) -> bool {
        self.position(actor).is_some()
    }

    /// Turn holder, while running
    pub fn active_player(&self) -> Option<&ActorId> {
        if self.lifecycle != Lifecycle::Running {
            return None;
        }
        self.participants.get(self.active_index).map(|p| &p.id)
    }

    /// Set once torn down; a closed session accepts nothing
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn board(&self) -> BoardView {
        BoardView {
            grid: self.puzzle.snapshot(),
            guesses_remaining: self.guess_budget,
            words_solved: self.puzzle.words_solved(),
        }
    }

    pub fn scores(&self) -> Scores {
        self.participants
            .iter()
            .map(|p| (p.id.clone(), p.score))
            .collect()
    }

    fn position(&self, actor: &ActorId) -> Option<usize> {
        self.participants.iter().position(|p| &p.id == actor)
    }

    fn others(&self, actor: &ActorId) -> Vec<ActorId> {
        self.participants
            .iter()
            .filter(|p| &p.id != actor)
            .map(|p| p.id.clone())
            .collect()
    }

    fn active_others(&self, actor: &ActorId) -> Vec<ActorId> {
        self.participants
            .iter()
            .filter(|p| &p.id != actor && p.is_active())
            .map(|p| p.id.clone())
            .collect()
    }

    fn illegal(&self, action: &'static str) -> CoordError {
        CoordError::IllegalTransition {
            from: self.lifecycle,
            action,
        }
    }

    fn turn_changed(&self) -> Option<SessionEvent> {
        self.active_player().map(|active| SessionEvent::TurnChanged {
            session: self.id,
            active: active.clone(),
            board: self.board(),
        })
    }

    /// First Active participant at or after `start`, wrapping
    ///
    /// Falls back to `start` itself when nobody is Active.
    fn first_active_from(&self, start: usize) -> usize {
        let len = self.participants.len();
        (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&i| self.participants[i].is_active())
            .unwrap_or(start % len)
    }

    /// Validate a join without mutating anything
    pub fn check_join(&self, actor: &ActorId) -> CoordResult<()> {
        if self.lifecycle.is_completed() {
            return Err(self.illegal("join"));
        }
        if self.contains(actor) {
            return Err(CoordError::DuplicateActor {
                actor: actor.clone(),
                session: self.id,
            });
        }
        if self.participants.len() >= self.settings.required_players as usize {
            return Err(CoordError::SessionFull(self.id));
        }
        Ok(())
    }

    /// Append a player to the turn order
    ///
    /// A running session that lost players accepts fresh joins; the new
    /// player takes turns after everyone already present.
    pub fn join(&mut self, actor: ActorId, now: Instant) -> CoordResult<Changes> {
        self.check_join(&actor)?;

        let others = self.participant_ids();
        self.participants.push(Participant::new(actor.clone(), now));
        let players = self.participants.len() as u32;

        if self.lifecycle == Lifecycle::Forming && players == self.settings.required_players {
            self.lifecycle = Lifecycle::Ready;
            info!(session = %self.id, players, "Session ready");
        }

        let mut changes = Changes::default();
        changes.push(
            others,
            SessionEvent::PlayerJoined {
                session: self.id,
                player: actor.clone(),
                players,
            },
        );
        if let Some(event) = self.turn_changed() {
            changes.push(vec![actor], event);
        }
        Ok(changes)
    }

    /// `Ready -> Running`; the first participant moves first
    pub fn start(&mut self) -> CoordResult<Changes> {
        if self.lifecycle != Lifecycle::Ready {
            return Err(self.illegal("start"));
        }
        self.lifecycle = Lifecycle::Running;
        self.active_index = 0;
        info!(session = %self.id, players = self.participants.len(), "Session started");

        let everyone = self.participant_ids();
        let mut changes = Changes::default();
        changes.push(everyone.clone(), SessionEvent::GameStarted { session: self.id });
        if let Some(event) = self.turn_changed() {
            changes.push(everyone, event);
        }
        Ok(changes)
    }

    /// Apply the turn holder's guess
    ///
    /// Sequence admission is the caller's job; by the time this runs the
    /// command is known to be new.
    pub fn guess(&mut self, actor: &ActorId, guess: &str) -> CoordResult<(GuessResult, Changes)> {
        let pos = self.position(actor).ok_or_else(|| CoordError::UnknownActor {
            actor: actor.clone(),
            session: self.id,
        })?;
        if self.lifecycle != Lifecycle::Running {
            return Err(self.illegal("guess in"));
        }
        if pos != self.active_index {
            return Err(CoordError::OutOfTurn { actor: actor.clone() });
        }

        let verdict = self.puzzle.apply_guess(guess);
        self.guess_budget = self.guess_budget.saturating_sub(1);
        self.participants[pos].score += verdict.words_completed;

        let mut changes = Changes::default();
        changes.push(
            self.others(actor),
            SessionEvent::GuessApplied {
                session: self.id,
                player: actor.clone(),
                guess: guess.to_owned(),
            },
        );

        let outcome = if verdict.solved {
            changes.winners.push(actor.clone());
            Some(Outcome::Won)
        } else if self.guess_budget == 0 {
            Some(Outcome::Lost)
        } else {
            None
        };

        let next_turn = match outcome {
            Some(outcome) => {
                self.complete(outcome, &mut changes);
                None
            }
            None => {
                self.active_index = self.first_active_from(pos + 1);
                if let Some(event) = self.turn_changed() {
                    changes.push(self.participant_ids(), event);
                }
                self.active_player().cloned()
            }
        };

        let result = GuessResult {
            solved: verdict.solved,
            guesses_remaining: self.guess_budget,
            outcome,
            next_turn,
        };
        Ok((result, changes))
    }

    fn complete(&mut self, outcome: Outcome, changes: &mut Changes) {
        self.lifecycle = Lifecycle::Completed(outcome);
        info!(session = %self.id, ?outcome, "Session completed");
        changes.push(
            self.participant_ids(),
            SessionEvent::GameOver {
                session: self.id,
                outcome,
                board: self.board(),
                scores: self.scores(),
            },
        );
        changes.closed = true;
    }

    /// Remove a participant; `None` if it is not (or no longer) present
    ///
    /// If the turn holder leaves, the turn passes to the next Active
    /// participant after its position without touching the guess budget.
    pub fn remove(&mut self, actor: &ActorId, reason: Departure) -> Option<Changes> {
        let pos = self.position(actor)?;
        let running = self.lifecycle == Lifecycle::Running;
        let held_turn = running && pos == self.active_index;
        self.participants.remove(pos);

        let mut changes = Changes::default();
        if self.participants.is_empty() {
            info!(session = %self.id, "Last participant left");
            changes.closed = true;
            return Some(changes);
        }

        if running {
            if pos < self.active_index {
                self.active_index -= 1;
            } else if held_turn {
                self.active_index = self.first_active_from(pos);
            }
        }
        if self.lifecycle == Lifecycle::Ready
            && self.participants.len() < self.settings.required_players as usize
        {
            self.lifecycle = Lifecycle::Forming;
            info!(session = %self.id, "Session forming again");
        }

        let remaining = self.participant_ids();
        changes.push(
            remaining.clone(),
            SessionEvent::PlayerLeft {
                session: self.id,
                player: actor.clone(),
                players: remaining.len() as u32,
                reason,
            },
        );
        if held_turn {
            if let Some(event) = self.turn_changed() {
                changes.push(remaining, event);
            }
        }
        Some(changes)
    }

    /// Evict a participant the detector declared failed
    pub fn evict_failed(&mut self, actor: &ActorId) -> Option<Changes> {
        if let Some(p) = self.participants.iter_mut().find(|p| &p.id == actor) {
            p.status = ParticipantStatus::Failed;
        }
        let mut changes = self.remove(actor, Departure::Failed)?;
        let witnesses = self.active_others(actor);
        if !witnesses.is_empty() {
            changes.dispatches.insert(
                0,
                Dispatch::new(
                    witnesses,
                    SessionEvent::PlayerTimeout {
                        session: self.id,
                        player: actor.clone(),
                        suspected: false,
                        failed: true,
                    },
                ),
            );
        }
        Some(changes)
    }

    /// Mark an Active participant as suspected; `None` if nothing changed
    pub fn mark_suspected(&mut self, actor: &ActorId) -> Option<Changes> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| &p.id == actor && p.is_active())?;
        participant.status = ParticipantStatus::Suspected;

        let mut changes = Changes::default();
        changes.push(
            self.active_others(actor),
            SessionEvent::PlayerTimeout {
                session: self.id,
                player: actor.clone(),
                suspected: true,
                failed: false,
            },
        );
        Some(changes)
    }

    /// Refresh a participant's heartbeat; a suspected participant becomes Active
    ///
    /// Returns false if the actor is not a participant.
    pub fn record_heartbeat(&mut self, actor: &ActorId, now: Instant) -> bool {
        match self.participants.iter_mut().find(|p| &p.id == actor) {
            Some(p) => {
                p.last_heartbeat = p.last_heartbeat.max(now);
                if p.status == ParticipantStatus::Suspected {
                    p.status = ParticipantStatus::Active;
                }
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("lifecycle", &self.lifecycle)
            .field("participants", &self.participant_ids())
            .field("active_index", &self.active_index)
            .field("guess_budget", &self.guess_budget)
            .finish()
    }
}
