//! Client callbacks
//!
//! In centralized mode the coordinator reaches players through these
//! calls on the player's registered endpoint.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ActorId;

/// Player-visible copy of the puzzle grid
///
/// Unrevealed cells are `-`, blank cells are `.`.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Grid {
    rows: Vec<Vec<char>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<char>>) -> Self {
        Grid { rows }
    }

    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Grid {
            rows: lines.into_iter().map(|l| l.chars().collect()).collect(),
        }
    }

    pub fn rows(&self) -> &[Vec<char>] {
        &self.rows
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Grid({}x{})", self.height(), self.width())
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            let line: String = row.iter().collect();
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// What every turn notification carries
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardView {
    pub grid: Grid,
    /// Shared guess budget left
    pub guesses_remaining: u32,
    /// Words revealed so far by all players
    pub words_solved: u32,
}

/// Final per-player scores
pub type Scores = BTreeMap<ActorId, u32>;

/// Calls the coordinator makes on a player's endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Callback {
    OnYourTurn(BoardView),
    OnOpponentTurn(BoardView),
    OnPlayerJoin { player: ActorId, players: u32 },
    OnPlayerQuit { player: ActorId, players: u32 },
    OnPlayerTimeout { player: ActorId, suspected: bool, failed: bool },
    OnGameWin { board: BoardView, scores: Scores },
    OnGameLoss { board: BoardView, scores: Scores },
    OnGameStart,
}

impl Callback {
    /// Callback name as exposed by the client interface
    pub fn name(&self) -> &'static str {
        match self {
            Callback::OnYourTurn(_) => "onYourTurn",
            Callback::OnOpponentTurn(_) => "onOpponentTurn",
            Callback::OnPlayerJoin { .. } => "onPlayerJoin",
            Callback::OnPlayerQuit { .. } => "onPlayerQuit",
            Callback::OnPlayerTimeout { .. } => "onPlayerTimeout",
            Callback::OnGameWin { .. } => "onGameWin",
            Callback::OnGameLoss { .. } => "onGameLoss",
            Callback::OnGameStart => "onGameStart",
        }
    }

    /// Whether this callback ends the player's game
    pub fn is_terminal(&self) -> bool {
        matches!(self, Callback::OnGameWin { .. } | Callback::OnGameLoss { .. })
    }
}
