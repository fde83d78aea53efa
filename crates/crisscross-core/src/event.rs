//! Session events
//!
//! The coordinator describes every change it makes as a session event
//! addressed to a set of players. In centralized mode each event is
//! expanded into per-player callbacks; in peer mode it is broadcast once
//! as a clocked message of the matching kind.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ActorId, BoardView, Callback, MessageKind, Scores, SessionId};

/// How a completed session ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Won,
    Lost,
}

/// Session lifecycle
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Waiting for the required number of players
    Forming,
    /// Enough players, waiting for the start signal
    Ready,
    /// Turns are being taken
    Running,
    /// Terminal
    Completed(Outcome),
}

impl Lifecycle {
    pub fn is_completed(self) -> bool {
        matches!(self, Lifecycle::Completed(_))
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Forming => f.write_str("Forming"),
            Lifecycle::Ready => f.write_str("Ready"),
            Lifecycle::Running => f.write_str("Running"),
            Lifecycle::Completed(outcome) => write!(f, "Completed({:?})", outcome),
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a participant left
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Departure {
    Quit,
    Failed,
}

/// Something that happened in a session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    PlayerJoined {
        session: SessionId,
        player: ActorId,
        players: u32,
    },
    PlayerLeft {
        session: SessionId,
        player: ActorId,
        players: u32,
        reason: Departure,
    },
    PlayerTimeout {
        session: SessionId,
        player: ActorId,
        suspected: bool,
        failed: bool,
    },
    GameStarted {
        session: SessionId,
    },
    GuessApplied {
        session: SessionId,
        player: ActorId,
        guess: String,
    },
    TurnChanged {
        session: SessionId,
        active: ActorId,
        board: BoardView,
    },
    GameOver {
        session: SessionId,
        outcome: Outcome,
        board: BoardView,
        scores: Scores,
    },
}

impl SessionEvent {
    pub fn session(&self) -> SessionId {
        match self {
            SessionEvent::PlayerJoined { session, .. }
            | SessionEvent::PlayerLeft { session, .. }
            | SessionEvent::PlayerTimeout { session, .. }
            | SessionEvent::GameStarted { session }
            | SessionEvent::GuessApplied { session, .. }
            | SessionEvent::TurnChanged { session, .. }
            | SessionEvent::GameOver { session, .. } => *session,
        }
    }

    /// Broadcast kind for peer mode
    pub fn message_kind(&self) -> MessageKind {
        match self {
            SessionEvent::PlayerJoined { .. } => MessageKind::Join,
            SessionEvent::PlayerLeft { .. } => MessageKind::Leave,
            SessionEvent::PlayerTimeout { failed: true, .. } => MessageKind::Leave,
            SessionEvent::PlayerTimeout { .. } => MessageKind::StateUpdate,
            SessionEvent::GameStarted { .. } => MessageKind::GameStart,
            SessionEvent::GuessApplied { .. } => MessageKind::Guess,
            SessionEvent::TurnChanged { .. } => MessageKind::StateUpdate,
            SessionEvent::GameOver { .. } => MessageKind::GameOver,
        }
    }

    /// The callback one recipient receives for this event in centralized mode
    pub fn callback_for(&self, recipient: &ActorId) -> Option<Callback> {
        match self {
            SessionEvent::PlayerJoined { player, players, .. } => Some(Callback::OnPlayerJoin {
                player: player.clone(),
                players: *players,
            }),
            SessionEvent::PlayerLeft { player, players, .. } => Some(Callback::OnPlayerQuit {
                player: player.clone(),
                players: *players,
            }),
            SessionEvent::PlayerTimeout {
                player,
                suspected,
                failed,
                ..
            } => Some(Callback::OnPlayerTimeout {
                player: player.clone(),
                suspected: *suspected,
                failed: *failed,
            }),
            SessionEvent::GameStarted { .. } => Some(Callback::OnGameStart),
            SessionEvent::GuessApplied { .. } => None,
            SessionEvent::TurnChanged { active, board, .. } => {
                if active == recipient {
                    Some(Callback::OnYourTurn(board.clone()))
                } else {
                    Some(Callback::OnOpponentTurn(board.clone()))
                }
            }
            SessionEvent::GameOver {
                outcome,
                board,
                scores,
                ..
            } => match outcome {
                Outcome::Won => Some(Callback::OnGameWin {
                    board: board.clone(),
                    scores: scores.clone(),
                }),
                Outcome::Lost => Some(Callback::OnGameLoss {
                    board: board.clone(),
                    scores: scores.clone(),
                }),
            },
        }
    }
}

/// A session event and the players it is addressed to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dispatch {
    pub recipients: Vec<ActorId>,
    pub event: SessionEvent,
}

impl Dispatch {
    pub fn new(recipients: Vec<ActorId>, event: SessionEvent) -> Self {
        Dispatch { recipients, event }
    }
}
