//! BlockWords Cube State Library
//!
//! This crate turns raw adjacency reports from physical letter cubes into
//! word guesses, and runs the "ABC" gesture that starts a game.
//!
//! # Overview
//!
//! The state module provides:
//!
//! - **Cube Sets** - Each player owns a set of cubes. Cubes report the cube
//!   to their right; the reports form an acyclic chain read as words.
//!
//! - **Guess Debouncing** - Sensors jitter, so identical guesses inside a
//!   short window are swallowed.
//!
//! - **ABC Start** - Three non-adjacent cubes per set show A, B, C. Linking
//!   them in order starts a countdown shared by every set.
//!
//! - **Outbound Messages** - Letter, border, flash and lock updates are
//!   queued for an external publisher.
//!
//! # Design Principles
//!
//! 1. **Caller supplies time** - Every operation takes `now_ms`; nothing
//!    reads a clock, so behavior is deterministic under test.
//!
//! 2. **No networking** - This crate is pure state. Inbound messages are
//!    handed in as topic/payload pairs and outbound ones are drained.
//!
//! 3. **Bad reports never corrupt state** - Cycles, self-links and foreign
//!    cubes are rejected and the previous chain is kept.
//!
//! # Example
//!
//! ```rust
//! use blockwords_cubes::{CubesConfig, CubesToGame, GameCallbacks, TileId};
//!
//! #[derive(Default)]
//! struct Game {
//!     guesses: Vec<Vec<TileId>>,
//! }
//!
//! impl GameCallbacks for Game {
//!     fn on_guess(&mut self, tiles: &[TileId], _move_tiles: bool, _player: usize, _now_ms: i64) {
//!         self.guesses.push(tiles.to_vec());
//!     }
//!
//!     fn on_game_start(&mut self, _force: bool, _now_ms: i64, _player: usize) {}
//! }
//!
//! let mut cubes = CubesToGame::new(CubesConfig::default(), Game::default()).unwrap();
//!
//! // Cube 1 sees cube 2 on its right, cube 2 sees cube 3
//! cubes.handle_message("cube/right/1", "2", 0);
//! cubes.handle_message("cube/right/2", "3", 100);
//!
//! let last = cubes.callbacks().guesses.last().unwrap();
//! assert_eq!(last, &vec!["0".to_string(), "1".to_string(), "2".to_string()]);
//! ```

pub mod state;

// Re-export everything from state module at crate root
pub use state::*;
