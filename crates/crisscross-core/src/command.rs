//! Command envelope
//!
//! Every mutating call travels as `{actor, scope, sequence, command}` and is
//! answered with one of `Accepted`, `Rejected(Duplicate)` or `Error(kind)`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ActorId, ErrorKind, Outcome, SessionId, SessionSettings};

/// Deduplication scope of a sequence number
///
/// Each actor keeps one independent counter per scope.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Commands issued outside any session (session creation and word
    /// repository edits)
    Global,
    /// Commands issued inside one session (join, start, guesses, quit)
    Session(SessionId),
}

impl Scope {
    pub fn session(self) -> Option<SessionId> {
        match self {
            Scope::Global => None,
            Scope::Session(id) => Some(id),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("Global"),
            Scope::Session(id) => write!(f, "Session({})", id.0),
        }
    }
}

/// Command body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Open a new session with the sender as first participant
    CreateSession { settings: SessionSettings },
    /// Enter the scoped session
    Join,
    /// Start the scoped session once it is ready
    Start,
    /// Guess a letter or a whole word
    Guess { guess: String },
    /// Leave the scoped session
    Quit,
    /// Add a word to the shared word repository
    AddWord { word: String },
    /// Remove a word from the shared word repository
    RemoveWord { word: String },
}

impl Command {
    /// Session commands must be scoped to their session, the rest must not be
    pub fn accepts_scope(&self, scope: Scope) -> bool {
        match self {
            Command::Join | Command::Start | Command::Guess { .. } | Command::Quit => {
                matches!(scope, Scope::Session(_))
            }
            Command::CreateSession { .. } | Command::AddWord { .. } | Command::RemoveWord { .. } => {
                scope == Scope::Global
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateSession { .. } => "createSession",
            Command::Join => "join",
            Command::Start => "start",
            Command::Guess { .. } => "guess",
            Command::Quit => "quit",
            Command::AddWord { .. } => "addWord",
            Command::RemoveWord { .. } => "removeWord",
        }
    }
}

/// Wire-level envelope for all mutating calls
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub actor: ActorId,
    pub scope: Scope,
    pub sequence: u64,
    pub command: Command,
}

impl CommandEnvelope {
    pub fn create_session(actor: ActorId, sequence: u64, settings: SessionSettings) -> Self {
        CommandEnvelope {
            actor,
            scope: Scope::Global,
            sequence,
            command: Command::CreateSession { settings },
        }
    }

    /// A command on one session: join, start or quit
    pub fn in_session(actor: ActorId, session: SessionId, sequence: u64, command: Command) -> Self {
        CommandEnvelope {
            actor,
            scope: Scope::Session(session),
            sequence,
            command,
        }
    }

    pub fn guess(actor: ActorId, session: SessionId, sequence: u64, guess: impl Into<String>) -> Self {
        CommandEnvelope {
            actor,
            scope: Scope::Session(session),
            sequence,
            command: Command::Guess { guess: guess.into() },
        }
    }

    pub fn add_word(actor: ActorId, sequence: u64, word: impl Into<String>) -> Self {
        CommandEnvelope {
            actor,
            scope: Scope::Global,
            sequence,
            command: Command::AddWord { word: word.into() },
        }
    }

    pub fn remove_word(actor: ActorId, sequence: u64, word: impl Into<String>) -> Self {
        CommandEnvelope {
            actor,
            scope: Scope::Global,
            sequence,
            command: Command::RemoveWord { word: word.into() },
        }
    }
}

/// Result of an applied guess
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessResult {
    pub solved: bool,
    pub guesses_remaining: u32,
    /// Set when the guess ended the session
    pub outcome: Option<Outcome>,
    /// Turn holder after the guess, while the session keeps running
    pub next_turn: Option<ActorId>,
}

/// Result of an applied command
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandResult {
    Created { session: SessionId },
    /// Player count after the join
    Joined { players: u32 },
    Started,
    Guess(GuessResult),
    Left,
    /// Whether the repository changed
    WordEdit { changed: bool },
}

/// Why a command was not applied without it being an error
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    /// Sequence at or below the last accepted one; already applied
    Duplicate,
}

/// Response to a command envelope
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Accepted(CommandResult),
    Rejected(Rejection),
    Error(ErrorKind),
}

impl Reply {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Reply::Accepted(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Reply::Rejected(Rejection::Duplicate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_requires_session_scope() {
        let guess = Command::Guess { guess: "e".into() };
        assert!(guess.accepts_scope(Scope::Session(SessionId(1))));
        assert!(!guess.accepts_scope(Scope::Global));

        let edit = Command::AddWord { word: "apple".into() };
        assert!(edit.accepts_scope(Scope::Global));
        assert!(!edit.accepts_scope(Scope::Session(SessionId(1))));
    }

    #[test]
    fn test_lifecycle_commands_scoped() {
        let create = Command::CreateSession {
            settings: SessionSettings::default(),
        };
        assert!(create.accepts_scope(Scope::Global));
        assert!(!create.accepts_scope(Scope::Session(SessionId(1))));

        for command in [Command::Join, Command::Start, Command::Quit] {
            assert!(command.accepts_scope(Scope::Session(SessionId(1))), "{}", command.name());
            assert!(!command.accepts_scope(Scope::Global), "{}", command.name());
        }
    }

    #[test]
    fn test_envelope_json_shape() {
        let envelope = CommandEnvelope::guess(ActorId::new("alice"), SessionId(7), 5, "e");
        let json = serde_json::to_string(&envelope).unwrap();
        let back: CommandEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
        assert_eq!(back.scope.session(), Some(SessionId(7)));

        let create = CommandEnvelope::create_session(
            ActorId::new("alice"),
            1,
            SessionSettings::new(3, 2, 1),
        );
        let json = serde_json::to_string(&create).unwrap();
        assert_eq!(serde_json::from_str::<CommandEnvelope>(&json).unwrap(), create);
    }
}
