//! External collaborators
//!
//! Grid construction, word matching, score persistence and word storage
//! live outside the coordinator. It only needs these narrow interfaces.

use crisscross_core::{ActorId, CoordResult, Grid};

pub use crisscross_core::SessionSettings;

/// What one guess did to the puzzle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GuessVerdict {
    /// The whole grid is revealed
    pub solved: bool,
    /// Words this guess completed, credited to the guesser
    pub words_completed: u32,
}

/// A puzzle instance owned by one session
pub trait Puzzle: Send {
    /// Apply a letter or word guess
    fn apply_guess(&mut self, guess: &str) -> GuessVerdict;

    /// Player-visible grid
    fn snapshot(&self) -> Grid;

    /// Words revealed so far
    fn words_solved(&self) -> u32;

    /// Guesses the session starts with
    fn guess_budget(&self) -> u32;
}

/// Builds puzzles for new sessions
pub trait PuzzleFactory: Send + Sync {
    fn create(&self, settings: &SessionSettings) -> CoordResult<Box<dyn Puzzle>>;
}

/// Score persistence
pub trait Scoreboard: Send + Sync {
    /// Called once per won session
    fn credit_winners(&self, winners: &[ActorId]);
}

/// Shared word list
pub trait WordRepository: Send + Sync {
    /// Returns true if the word was not present
    fn add_word(&self, word: &str) -> bool;

    /// Returns true if the word was present
    fn remove_word(&self, word: &str) -> bool;

    fn check_word(&self, word: &str) -> bool;
}
