//! Session parameters

use serde::{Deserialize, Serialize};

use crate::{CoordError, CoordResult};

/// Parameters chosen by the creator of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Players needed before the session can start
    pub required_players: u32,
    /// Words in the puzzle
    pub word_count: u32,
    /// Guesses granted per puzzle letter
    pub difficulty: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            required_players: 2,
            word_count: 4,
            difficulty: 1,
        }
    }
}

impl SessionSettings {
    pub fn new(required_players: u32, word_count: u32, difficulty: u32) -> Self {
        SessionSettings {
            required_players,
            word_count,
            difficulty,
        }
    }

    pub fn validate(&self) -> CoordResult<()> {
        if self.required_players == 0 {
            return Err(CoordError::Config("a session needs at least one player".into()));
        }
        if self.word_count == 0 {
            return Err(CoordError::Config("a puzzle needs at least one word".into()));
        }
        if self.difficulty == 0 {
            return Err(CoordError::Config("difficulty factor must be positive".into()));
        }
        Ok(())
    }
}
