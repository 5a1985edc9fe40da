//! Configuration for the cube coordination layer.
//!
//! Constants mirror the hardware defaults (two players, six cubes each).
//! `CubesConfig` carries the values that tests and replays override.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::error::{CubesError, Result};

/// Rack size and the ceiling on word length.
pub const MAX_LETTERS: usize = 6;

/// Number of player slots (cube sets).
pub const MAX_PLAYERS: usize = 2;

/// Identical guesses inside this window are not re-submitted (10 seconds).
pub const DEFAULT_DEBOUNCE_MS: i64 = 10_000;

/// Delay between ABC countdown stages.
pub const DEFAULT_ABC_COUNTDOWN_DELAY_MS: i64 = 1_000;

/// Border color for a good guess (green, RGB565).
pub const GOOD_GUESS_COLOR: &str = "0x07E0";

/// Border color for a word that was already played (yellow).
pub const OLD_GUESS_COLOR: &str = "0xFFE0";

/// Border color for a bad guess; also the initial highlight color (white).
pub const BAD_GUESS_COLOR: &str = "0xFFFF";

/// Coordination layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CubesConfig {
    /// Rack size; chains longer than this are treated as runaway.
    pub max_letters: usize,

    /// Guess debounce window in milliseconds.
    pub debounce_ms: i64,

    /// Delay between countdown stages in milliseconds.
    pub abc_countdown_delay_ms: i64,

    /// Ordered cube IDs for each player slot. Tile `i` of a set maps to
    /// the set's `i`th cube.
    pub cube_sets: Vec<Vec<String>>,
}

impl Default for CubesConfig {
    fn default() -> Self {
        Self {
            max_letters: MAX_LETTERS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            abc_countdown_delay_ms: DEFAULT_ABC_COUNTDOWN_DELAY_MS,
            cube_sets: default_cube_sets(),
        }
    }
}

/// Hardware cube numbering: 1-6 for player 0, 11-16 for player 1.
pub fn default_cube_sets() -> Vec<Vec<String>> {
    (0..MAX_PLAYERS)
        .map(|set| {
            let base = set * 10 + 1;
            (base..base + MAX_LETTERS).map(|n| n.to_string()).collect()
        })
        .collect()
}

impl CubesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_letters(mut self, max_letters: usize) -> Self {
        self.max_letters = max_letters;
        self
    }

    pub fn with_debounce_ms(mut self, debounce_ms: i64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// Override the stage delay (replays record their own).
    pub fn with_abc_countdown_delay_ms(mut self, delay_ms: i64) -> Self {
        self.abc_countdown_delay_ms = delay_ms;
        self
    }

    pub fn with_cube_sets(mut self, cube_sets: Vec<Vec<String>>) -> Self {
        self.cube_sets = cube_sets;
        self
    }

    /// Number of player slots.
    pub fn player_count(&self) -> usize {
        self.cube_sets.len()
    }

    /// Check the partition is usable: non-empty, disjoint sets that fit the rack.
    pub fn validate(&self) -> Result<()> {
        if self.max_letters == 0 {
            return Err(CubesError::Config("max_letters must be positive".into()));
        }
        if self.debounce_ms < 0 {
            return Err(CubesError::Config(format!(
                "debounce_ms must not be negative, got {}",
                self.debounce_ms
            )));
        }
        if self.abc_countdown_delay_ms <= 0 {
            return Err(CubesError::Config(format!(
                "abc_countdown_delay_ms must be positive, got {}",
                self.abc_countdown_delay_ms
            )));
        }
        if self.cube_sets.is_empty() {
            return Err(CubesError::Config("at least one cube set is required".into()));
        }

        let mut seen = HashSet::new();
        for (set_id, cubes) in self.cube_sets.iter().enumerate() {
            if cubes.is_empty() {
                return Err(CubesError::Config(format!("cube set {} is empty", set_id)));
            }
            if cubes.len() > self.max_letters {
                return Err(CubesError::Config(format!(
                    "cube set {} has {} cubes, rack holds {}",
                    set_id,
                    cubes.len(),
                    self.max_letters
                )));
            }
            for cube in cubes {
                if cube.is_empty() || cube == "-" {
                    return Err(CubesError::Config(format!(
                        "cube set {} has an invalid cube id {:?}",
                        set_id, cube
                    )));
                }
                if !seen.insert(cube.as_str()) {
                    return Err(CubesError::Config(format!("cube {} is listed twice", cube)));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_partition() {
        let config = CubesConfig::default();
        assert_eq!(config.player_count(), 2);
        assert_eq!(config.cube_sets[0], vec!["1", "2", "3", "4", "5", "6"]);
        assert_eq!(config.cube_sets[1], vec!["11", "12", "13", "14", "15", "16"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = CubesConfig::new()
            .with_debounce_ms(500)
            .with_abc_countdown_delay_ms(250)
            .with_cube_sets(vec![vec!["a".into(), "b".into()]]);

        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.abc_countdown_delay_ms, 250);
        assert_eq!(config.player_count(), 1);
    }

    #[test]
    fn test_validate_rejects_duplicate_cube() {
        let config = CubesConfig::new().with_cube_sets(vec![
            vec!["1".into(), "2".into()],
            vec!["2".into(), "3".into()],
        ]);
        assert!(matches!(config.validate(), Err(CubesError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_set() {
        let config = CubesConfig::new().with_max_letters(2).with_cube_sets(vec![vec![
            "1".into(),
            "2".into(),
            "3".into(),
        ]]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert!(CubesConfig::new().with_cube_sets(vec![]).validate().is_err());
        assert!(CubesConfig::new()
            .with_cube_sets(vec![vec![]])
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_rejects_bad_timings() {
        let backwards = CubesConfig::new().with_abc_countdown_delay_ms(-1_000);
        assert!(matches!(backwards.validate(), Err(CubesError::Config(_))));
        assert!(CubesConfig::new()
            .with_abc_countdown_delay_ms(0)
            .validate()
            .is_err());
        assert!(CubesConfig::new().with_debounce_ms(-1).validate().is_err());

        // Zero debounce just disables suppression
        assert!(CubesConfig::new().with_debounce_ms(0).validate().is_ok());
        assert!(matches!(
            CubesConfig::from_json(r#"{"abc_countdown_delay_ms": -5}"#),
            Err(CubesError::Config(_))
        ));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = CubesConfig::from_json(r#"{"abc_countdown_delay_ms": 400}"#).unwrap();
        assert_eq!(config.abc_countdown_delay_ms, 400);
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert_eq!(config.cube_sets, default_cube_sets());
    }

    #[test]
    fn test_from_json_bad_input() {
        assert!(matches!(
            CubesConfig::from_json("not json"),
            Err(CubesError::Serialization(_))
        ));
    }
}
