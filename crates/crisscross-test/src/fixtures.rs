//! Session fixtures
//!
//! In-memory collaborators and a harness that wires a coordinator to them
//! with a manual clock.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crisscross_clock::{ManualTimeSource, TimeSource};
use crisscross_core::{ActorId, CoordError, CoordResult, Dispatch, Grid, SessionEvent, SessionId};
use crisscross_liveness::{HeartbeatMonitor, LivenessConfig};
use crisscross_session::{
    Collaborators, GuessVerdict, NotificationSink, Puzzle, PuzzleFactory, Scoreboard,
    SessionCoordinator, SessionSettings, WordRepository,
};

const HIDDEN: char = '-';

/// A list of words shown one per row
///
/// A letter guess reveals that letter everywhere; a word guess reveals the
/// matching row. Budget is the total letter count times the difficulty.
pub struct ScriptedPuzzle {
    words: Vec<String>,
    revealed: Vec<Vec<bool>>,
    budget: u32,
}

impl ScriptedPuzzle {
    pub fn new(words: &[&str], difficulty: u32) -> Self {
        let words: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
        let letters: usize = words.iter().map(|w| w.chars().count()).sum();
        ScriptedPuzzle {
            revealed: words.iter().map(|w| vec![false; w.chars().count()]).collect(),
            words,
            budget: letters as u32 * difficulty,
        }
    }

    fn is_complete(&self, row: usize) -> bool {
        self.revealed[row].iter().all(|r| *r)
    }

    fn completed(&self) -> Vec<bool> {
        (0..self.words.len()).map(|i| self.is_complete(i)).collect()
    }
}

impl Puzzle for ScriptedPuzzle {
    fn apply_guess(&mut self, guess: &str) -> GuessVerdict {
        let guess = guess.trim().to_lowercase();
        let before = self.completed();

        let mut letters = guess.chars();
        match (letters.next(), letters.next()) {
            (Some(letter), None) => {
                for (word, revealed) in self.words.iter().zip(self.revealed.iter_mut()) {
                    for (c, r) in word.chars().zip(revealed.iter_mut()) {
                        if c == letter {
                            *r = true;
                        }
                    }
                }
            }
            (Some(_), Some(_)) => {
                if let Some(row) = self.words.iter().position(|w| *w == guess) {
                    self.revealed[row].iter_mut().for_each(|r| *r = true);
                }
            }
            _ => {}
        }

        let after = self.completed();
        let words_completed = before
            .iter()
            .zip(&after)
            .filter(|(b, a)| !**b && **a)
            .count() as u32;
        GuessVerdict {
            solved: after.iter().all(|c| *c),
            words_completed,
        }
    }

    fn snapshot(&self) -> Grid {
        let rows = self
            .words
            .iter()
            .zip(&self.revealed)
            .map(|(word, revealed)| {
                word.chars()
                    .zip(revealed)
                    .map(|(c, r)| if *r { c } else { HIDDEN })
                    .collect()
            })
            .collect();
        Grid::new(rows)
    }

    fn words_solved(&self) -> u32 {
        self.completed().into_iter().filter(|c| *c).count() as u32
    }

    fn guess_budget(&self) -> u32 {
        self.budget
    }
}

/// Hands out the first `word_count` words of a fixed list
pub struct ScriptedPuzzleFactory {
    words: Vec<&'static str>,
}

impl ScriptedPuzzleFactory {
    pub fn new(words: &[&'static str]) -> Self {
        ScriptedPuzzleFactory {
            words: words.to_vec(),
        }
    }
}

impl PuzzleFactory for ScriptedPuzzleFactory {
    fn create(&self, settings: &SessionSettings) -> CoordResult<Box<dyn Puzzle>> {
        let count = settings.word_count as usize;
        if count > self.words.len() {
            return Err(CoordError::Config(format!(
                "puzzle needs {} words, only {} available",
                count,
                self.words.len()
            )));
        }
        Ok(Box::new(ScriptedPuzzle::new(
            &self.words[..count],
            settings.difficulty,
        )))
    }
}

/// Records every dispatch in order
#[derive(Default)]
pub struct RecordingSink {
    dispatches: Mutex<Vec<Dispatch>>,
}

impl RecordingSink {
    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.dispatches.lock().clone()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.dispatches.lock().iter().map(|d| d.event.clone()).collect()
    }

    /// Events addressed to `actor`
    pub fn received_by(&self, actor: &ActorId) -> Vec<SessionEvent> {
        self.dispatches
            .lock()
            .iter()
            .filter(|d| d.recipients.contains(actor))
            .map(|d| d.event.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.dispatches.lock().clear();
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn dispatch(&self, dispatch: Dispatch) {
        self.dispatches.lock().push(dispatch);
    }
}

/// Counts wins per player and records every credit call
#[derive(Default)]
pub struct RecordingScoreboard {
    calls: Mutex<Vec<Vec<ActorId>>>,
}

impl RecordingScoreboard {
    pub fn calls(&self) -> Vec<Vec<ActorId>> {
        self.calls.lock().clone()
    }

    pub fn wins(&self) -> BTreeMap<ActorId, u32> {
        let mut wins = BTreeMap::new();
        for winner in self.calls.lock().iter().flatten() {
            *wins.entry(winner.clone()).or_insert(0) += 1;
        }
        wins
    }
}

impl Scoreboard for RecordingScoreboard {
    fn credit_winners(&self, winners: &[ActorId]) {
        self.calls.lock().push(winners.to_vec());
    }
}

/// Case-insensitive word set
#[derive(Default)]
pub struct MemoryWordRepository {
    words: Mutex<BTreeSet<String>>,
}

impl MemoryWordRepository {
    pub fn with_words(words: &[&str]) -> Self {
        MemoryWordRepository {
            words: Mutex::new(words.iter().map(|w| w.to_lowercase()).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.words.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.lock().is_empty()
    }
}

impl WordRepository for MemoryWordRepository {
    fn add_word(&self, word: &str) -> bool {
        self.words.lock().insert(word.to_lowercase())
    }

    fn remove_word(&self, word: &str) -> bool {
        self.words.lock().remove(&word.to_lowercase())
    }

    fn check_word(&self, word: &str) -> bool {
        self.words.lock().contains(&word.to_lowercase())
    }
}

pub const DEFAULT_WORDS: &[&str] = &["apple", "grape", "lemon", "melon", "peach", "plum"];

/// A coordinator wired to recording collaborators and a manual clock
pub struct Harness {
    pub coordinator: Arc<SessionCoordinator>,
    pub sink: Arc<RecordingSink>,
    pub scoreboard: Arc<RecordingScoreboard>,
    pub words: Arc<MemoryWordRepository>,
    pub time: ManualTimeSource,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_liveness(LivenessConfig::default())
    }

    pub fn with_liveness(config: LivenessConfig) -> Self {
        let sink = Arc::new(RecordingSink::default());
        let scoreboard = Arc::new(RecordingScoreboard::default());
        let words = Arc::new(MemoryWordRepository::default());
        let time = ManualTimeSource::new();
        let coordinator = SessionCoordinator::new(
            Collaborators {
                puzzles: Arc::new(ScriptedPuzzleFactory::new(DEFAULT_WORDS)),
                scoreboard: scoreboard.clone(),
                words: words.clone(),
            },
            sink.clone(),
            Arc::new(HeartbeatMonitor::new(config)),
            Arc::new(time.clone()),
        );
        Harness {
            coordinator: Arc::new(coordinator),
            sink,
            scoreboard,
            words,
            time,
        }
    }

    /// Create, fill and start a session; the first name creates it
    pub async fn running_session(
        &self,
        players: &[&str],
        settings: SessionSettings,
    ) -> CoordResult<SessionId> {
        let settings = SessionSettings {
            required_players: players.len() as u32,
            ..settings
        };
        let id = self
            .coordinator
            .create_session(ActorId::new(players[0]), settings)
            .await?;
        for player in &players[1..] {
            self.coordinator.join(id, ActorId::new(*player)).await?;
        }
        self.coordinator.start(id).await?;
        Ok(id)
    }

    /// Advance the clock, heartbeat for `alive`, scan and apply
    pub async fn step(&self, by: Duration, session: SessionId, alive: &[&str]) -> usize {
        self.time.advance(by);
        for actor in alive {
            let _ = self.coordinator.heartbeat(session, &ActorId::new(*actor));
        }
        let transitions = self.coordinator.monitor().scan(self.time.now());
        let count = transitions.len();
        for transition in transitions {
            self.coordinator.apply_liveness(transition).await;
        }
        count
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_puzzle_letters_and_words() {
        let mut puzzle = ScriptedPuzzle::new(&["ab", "ba", "cc"], 2);
        assert_eq!(puzzle.guess_budget(), 12);
        assert_eq!(puzzle.snapshot().to_string(), "--\n--\n--\n");

        let verdict = puzzle.apply_guess("a");
        assert_eq!(verdict, GuessVerdict { solved: false, words_completed: 0 });
        assert_eq!(puzzle.snapshot().to_string(), "a-\n-a\n--\n");

        let verdict = puzzle.apply_guess("b");
        assert_eq!(verdict.words_completed, 2);
        assert_eq!(puzzle.words_solved(), 2);

        let verdict = puzzle.apply_guess("CC");
        assert_eq!(verdict, GuessVerdict { solved: true, words_completed: 1 });
    }

    #[test]
    fn test_wrong_word_reveals_nothing() {
        let mut puzzle = ScriptedPuzzle::new(&["plum"], 1);
        assert_eq!(puzzle.apply_guess("pear"), GuessVerdict::default());
        assert_eq!(puzzle.apply_guess(""), GuessVerdict::default());
        assert_eq!(puzzle.words_solved(), 0);
    }

    #[test]
    fn test_factory_rejects_oversized_puzzle() {
        let factory = ScriptedPuzzleFactory::new(&["one", "two"]);
        assert!(factory.create(&SessionSettings::new(2, 2, 1)).is_ok());
        assert!(factory.create(&SessionSettings::new(2, 3, 1)).is_err());
    }

    #[test]
    fn test_word_repository_case_insensitive() {
        let repo = MemoryWordRepository::with_words(&["Apple"]);
        assert!(repo.check_word("APPLE"));
        assert!(!repo.add_word("apple"));
        assert!(repo.remove_word("aPPle"));
        assert!(repo.is_empty());
    }
}
