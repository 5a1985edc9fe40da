//! Guess debouncing.
//!
//! Cube sensors jitter: the same chain can be reported many times a second.
//! `GuessManager` remembers the last accepted word list for one cube set and
//! swallows identical resubmissions inside the debounce window.

use std::collections::BTreeSet;

use tracing::debug;

use super::config::DEFAULT_DEBOUNCE_MS;
use super::cube_set::{Tile, TileId, Word};

/// Debounce state for one cube set.
#[derive(Debug, Clone)]
pub struct GuessManager {
    pub cube_set_id: usize,

    debounce_ms: i64,

    /// Most recently accepted words
    last_words: Vec<Word>,

    /// Last time `submit` saw a guess, accepted or not
    last_guess_time_ms: Option<i64>,

    /// Rack contents at the previous reload
    last_rack: Vec<Tile>,
}

impl GuessManager {
    pub fn new(cube_set_id: usize) -> Self {
        Self::with_debounce(cube_set_id, DEFAULT_DEBOUNCE_MS)
    }

    pub fn with_debounce(cube_set_id: usize, debounce_ms: i64) -> Self {
        Self {
            cube_set_id,
            debounce_ms,
            last_words: Vec::new(),
            last_guess_time_ms: None,
            last_rack: Vec::new(),
        }
    }

    pub fn last_words(&self) -> &[Word] {
        &self.last_words
    }

    pub fn last_guess_time_ms(&self) -> Option<i64> {
        self.last_guess_time_ms
    }

    pub fn debounce_ms(&self) -> i64 {
        self.debounce_ms
    }

    /// Offer a new word list.
    ///
    /// Returns `false` when it repeats the last list within the debounce
    /// window; the timestamp is still refreshed so a steady stream of
    /// repeats stays suppressed. Otherwise the list replaces the last one
    /// and `true` is returned.
    pub fn submit(&mut self, words: Vec<Word>, now_ms: i64) -> bool {
        let within_window = self
            .last_guess_time_ms
            .is_some_and(|last| now_ms.saturating_sub(last) < self.debounce_ms);

        self.last_guess_time_ms = Some(now_ms);

        if within_window && words == self.last_words {
            debug!(cube_set = self.cube_set_id, "debounced repeat guess");
            return false;
        }

        self.last_words = words;
        true
    }

    /// Chains in the last accepted list that `words` no longer contains,
    /// compared as unordered tile sets.
    pub fn removed_chains(&self, words: &[Word]) -> Vec<Vec<TileId>> {
        let as_set = |w: &Word| w.tiles().iter().cloned().collect::<BTreeSet<TileId>>();
        let current: BTreeSet<BTreeSet<TileId>> = words.iter().map(as_set).collect();
        let previous: BTreeSet<BTreeSet<TileId>> = self.last_words.iter().map(as_set).collect();

        previous
            .difference(&current)
            .map(|chain| chain.iter().cloned().collect())
            .collect()
    }

    /// Record a rack reload. Returns `true` when the tiles differ from the
    /// previous reload, meaning the last guess should be re-validated.
    pub fn reload_rack(&mut self, tiles: &[Tile]) -> bool {
        if self.last_rack.as_slice() == tiles {
            return false;
        }
        self.last_rack = tiles.to_vec();
        true
    }

    /// Forget all guess and rack history.
    pub fn reset(&mut self) {
        self.last_words.clear();
        self.last_guess_time_ms = None;
        self.last_rack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn words(list: &[&[&str]]) -> Vec<Word> {
        list.iter().map(|w| w.iter().copied().collect()).collect()
    }

    #[test]
    fn test_first_submit_accepted() {
        let mut guess = GuessManager::new(0);
        assert!(guess.submit(words(&[&["0", "1", "2"]]), 1_000));
        assert_eq!(guess.last_words(), words(&[&["0", "1", "2"]]).as_slice());
        assert_eq!(guess.last_guess_time_ms(), Some(1_000));
    }

    #[test]
    fn test_repeat_debounced() {
        let mut guess = GuessManager::new(0);
        assert!(guess.submit(words(&[&["0", "1"]]), 1_000));
        assert!(!guess.submit(words(&[&["0", "1"]]), 5_000));
        assert_eq!(guess.last_guess_time_ms(), Some(5_000));
    }

    #[test]
    fn test_repeat_refresh_extends_window() {
        let mut guess = GuessManager::new(0);
        guess.submit(words(&[&["0", "1"]]), 0);
        assert!(!guess.submit(words(&[&["0", "1"]]), 9_000));
        // 12s after the first, 3s after the refresh
        assert!(!guess.submit(words(&[&["0", "1"]]), 12_000));
    }

    #[test]
    fn test_repeat_after_window_accepted() {
        let mut guess = GuessManager::with_debounce(0, 100);
        guess.submit(words(&[&["0", "1"]]), 0);
        assert!(guess.submit(words(&[&["0", "1"]]), 100));
    }

    #[test]
    fn test_extreme_timestamps() {
        let mut guess = GuessManager::new(0);
        assert!(guess.submit(vec![], i64::MAX));
        // Clock jumped backwards across the whole range
        assert!(!guess.submit(vec![], -10));
        assert!(!guess.submit(vec![], i64::MIN));
        assert_eq!(guess.last_guess_time_ms(), Some(i64::MIN));
    }

    #[test]
    fn test_different_words_accepted() {
        let mut guess = GuessManager::new(0);
        guess.submit(words(&[&["0", "1"]]), 0);
        assert!(guess.submit(words(&[&["0", "1", "2"]]), 10));
        assert!(guess.submit(vec![], 20));
        assert!(guess.last_words().is_empty());
    }

    #[test]
    fn test_removed_chains() {
        let mut guess = GuessManager::new(0);
        guess.submit(words(&[&["0", "1"], &["3", "4"]]), 0);

        let removed = guess.removed_chains(&words(&[&["1", "0"]]));
        assert_eq!(removed, vec![vec!["3".to_string(), "4".to_string()]]);

        assert!(guess
            .removed_chains(&words(&[&["0", "1"], &["3", "4"]]))
            .is_empty());
    }

    #[test]
    fn test_reload_rack() {
        let mut guess = GuessManager::new(0);
        let rack = vec![Tile::new("0", "A"), Tile::new("1", "B")];

        assert!(guess.reload_rack(&rack));
        assert!(!guess.reload_rack(&rack));

        let changed = vec![Tile::new("0", "A"), Tile::new("1", "C")];
        assert!(guess.reload_rack(&changed));
    }

    #[test]
    fn test_reset() {
        let mut guess = GuessManager::new(0);
        guess.submit(words(&[&["0", "1"]]), 0);
        guess.reload_rack(&[Tile::new("0", "A")]);
        guess.reset();

        assert!(guess.last_words().is_empty());
        assert_eq!(guess.last_guess_time_ms(), None);
        assert!(guess.reload_rack(&[Tile::new("0", "A")]));
    }
}
