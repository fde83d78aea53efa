//! Error types for CrissCross
//!
//! Duplicate commands are not errors (see [`crate::Reply::Rejected`]) and
//! liveness changes are events, not errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ActorId, Lifecycle, PeerId, SessionId};

/// Core CrissCross errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordError {
    // Session errors
    #[error("Session not found: {0}")]
    UnknownSession(SessionId),

    #[error("Actor {actor} is not in session {session}")]
    UnknownActor { actor: ActorId, session: SessionId },

    #[error("Session {0} is full")]
    SessionFull(SessionId),

    #[error("Actor {actor} already joined session {session}")]
    DuplicateActor { actor: ActorId, session: SessionId },

    #[error("Actor {actor} is already playing in session {session}")]
    AlreadyInSession { actor: ActorId, session: SessionId },

    #[error("Session {0} already exists")]
    SessionExists(SessionId),

    #[error("Illegal transition: cannot {action} a session that is {from}")]
    IllegalTransition { from: Lifecycle, action: &'static str },

    #[error("Not {actor}'s turn")]
    OutOfTurn { actor: ActorId },

    #[error("Command does not match scope")]
    ScopeMismatch,

    // Transport errors
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(PeerId),

    #[error("Transport error: {0}")]
    Transport(String),

    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(u8),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CoordError {
    /// Wire-safe classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordError::UnknownSession(_) => ErrorKind::UnknownSession,
            CoordError::UnknownActor { .. } => ErrorKind::UnknownActor,
            CoordError::SessionFull(_) => ErrorKind::SessionFull,
            CoordError::DuplicateActor { .. } | CoordError::AlreadyInSession { .. } => {
                ErrorKind::DuplicateActor
            }
            CoordError::SessionExists(_) => ErrorKind::SessionExists,
            CoordError::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            CoordError::OutOfTurn { .. } => ErrorKind::OutOfTurn,
            CoordError::ScopeMismatch => ErrorKind::ScopeMismatch,
            CoordError::PeerUnreachable(_) | CoordError::Transport(_) => ErrorKind::Transport,
            CoordError::InvalidWireFormat(_)
            | CoordError::BufferTooShort { .. }
            | CoordError::UnknownMessageKind(_) => ErrorKind::Malformed,
            CoordError::Config(_) => ErrorKind::Internal,
        }
    }
}

/// Error classification carried in [`crate::Reply::Error`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnknownSession,
    UnknownActor,
    SessionFull,
    DuplicateActor,
    SessionExists,
    IllegalTransition,
    OutOfTurn,
    ScopeMismatch,
    Transport,
    Malformed,
    Internal,
}

/// Result type for CrissCross operations
pub type CoordResult<T> = Result<T, CoordError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_projection() {
        let err = CoordError::IllegalTransition {
            from: Lifecycle::Forming,
            action: "start",
        };
        assert_eq!(err.kind(), ErrorKind::IllegalTransition);
        assert_eq!(
            err.to_string(),
            "Illegal transition: cannot start a session that is Forming"
        );
        assert_eq!(
            CoordError::PeerUnreachable(PeerId::new("bob")).kind(),
            ErrorKind::Transport
        );
    }
}
