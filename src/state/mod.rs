//! Cube coordination state.
//!
//! This module ties the per-set managers together behind one owner:
//!
//! - `cube_set` - adjacency chain and word extraction per player
//! - `guess` - debouncing of extracted words
//! - `abc` - ABC start gesture and the shared countdown
//! - `message` - inbound topic parsing and the outbound queue
//! - `config` / `error` - settings and caller errors
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           CubesToGame                                │
//! │                                                                      │
//! │  cube/right/<id> ──▶ cube_to_set ──▶ CubeSetManager[set]             │
//! │                                            │ words                   │
//! │                                            ▼                         │
//! │                                      GuessManager[set] ──▶ on_guess  │
//! │                                            │                         │
//! │                                            ▼                         │
//! │                                       AbcManager ──▶ on_game_start   │
//! │                                                                      │
//! │  every component ──▶ Outbox (letter / border / flash / lock)         │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here reads a clock. Every operation takes `now_ms` from the
//! caller, and `check_countdown_completion` is polled by the game loop.

pub mod abc;
pub mod config;
pub mod cube_set;
pub mod error;
pub mod guess;
pub mod message;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, info, warn};

pub use abc::{
    select_abc_candidates, AbcManager, AbcPhase, AbcTriple, CountdownStage, CountdownTick,
    ScheduledStage, StageEvent, COUNTDOWN_LETTER, COUNTDOWN_STAGES,
};
pub use config::{
    CubesConfig, BAD_GUESS_COLOR, DEFAULT_ABC_COUNTDOWN_DELAY_MS, DEFAULT_DEBOUNCE_MS,
    GOOD_GUESS_COLOR, MAX_LETTERS, MAX_PLAYERS, OLD_GUESS_COLOR,
};
pub use cube_set::{CubeId, CubeSetManager, Tile, TileId, Word};
pub use error::{CubesError, Result};
pub use guess::GuessManager;
pub use message::{BorderDirective, BorderSide, NeighborReport, OutboundMessage, Outbox};

/// Hooks into the surrounding game, supplied at construction.
pub trait GameCallbacks {
    /// A chain of tiles was accepted as a guess.
    fn on_guess(&mut self, tiles: &[TileId], move_tiles: bool, player: usize, now_ms: i64);

    /// A cube set finished the countdown and its game should start.
    fn on_game_start(&mut self, force: bool, now_ms: i64, player: usize);

    /// A previously guessed chain is no longer on the table.
    fn on_highlight_removed(&mut self, _tiles: &[TileId], _player: usize) {}

    /// A countdown stage fired for a cube set.
    fn on_countdown_stage(&mut self, _cube_set: usize, _stage: CountdownStage, _now_ms: i64) {}
}

/// Callbacks that ignore everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

impl GameCallbacks for NoopCallbacks {
    fn on_guess(&mut self, _tiles: &[TileId], _move_tiles: bool, _player: usize, _now_ms: i64) {}

    fn on_game_start(&mut self, _force: bool, _now_ms: i64, _player: usize) {}
}

/// Coordination layer: owns every cube set, the guess debouncers, the ABC
/// state machine and the outbound queue.
#[derive(Debug)]
pub struct CubesToGame<C: GameCallbacks> {
    config: CubesConfig,

    cube_sets: Vec<CubeSetManager>,

    /// One debouncer per cube set
    guesses: Vec<GuessManager>,

    abc: AbcManager,

    /// Static cube -> set partition
    cube_to_set: HashMap<CubeId, usize>,

    /// Players whose game is running
    started_players: BTreeSet<usize>,

    /// Sets that finished the ABC countdown
    started_cube_sets: BTreeSet<usize>,

    /// Locked cube per set
    locked_cubes: BTreeMap<usize, CubeId>,

    game_running: bool,

    /// A game-on mode game ended; ABC stays off until the next game
    game_on_mode_ended: bool,

    outbox: Outbox,

    callbacks: C,
}

impl<C: GameCallbacks> CubesToGame<C> {
    /// Build the coordinator for a validated cube partition.
    pub fn new(config: CubesConfig, callbacks: C) -> Result<Self> {
        config.validate()?;

        let mut state = Self {
            cube_sets: Vec::new(),
            guesses: Vec::new(),
            abc: AbcManager::new(),
            cube_to_set: HashMap::new(),
            started_players: BTreeSet::new(),
            started_cube_sets: BTreeSet::new(),
            locked_cubes: BTreeMap::new(),
            game_running: false,
            game_on_mode_ended: false,
            outbox: Outbox::new(),
            callbacks,
            config,
        };
        state.reset();
        Ok(state)
    }

    /// Re-initialize every cube set and drop all game, guess and ABC state.
    pub fn reset(&mut self) {
        self.cube_sets.clear();
        self.guesses.clear();
        self.cube_to_set.clear();

        for (set_id, cubes) in self.config.cube_sets.iter().enumerate() {
            let mut manager = CubeSetManager::with_max_letters(set_id, self.config.max_letters);
            manager.init(cubes.clone());
            for cube in cubes {
                self.cube_to_set.insert(cube.clone(), set_id);
            }
            self.cube_sets.push(manager);
            self.guesses
                .push(GuessManager::with_debounce(set_id, self.config.debounce_ms));
        }

        self.abc.reset();
        self.started_players.clear();
        self.started_cube_sets.clear();
        self.locked_cubes.clear();
        self.game_on_mode_ended = false;

        info!(sets = self.cube_sets.len(), "cube sets initialized");
    }

    pub fn config(&self) -> &CubesConfig {
        &self.config
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    pub fn cube_sets(&self) -> &[CubeSetManager] {
        &self.cube_sets
    }

    pub fn cube_set(&self, cube_set: usize) -> Option<&CubeSetManager> {
        self.cube_sets.get(cube_set)
    }

    pub fn guess_manager(&self, cube_set: usize) -> Option<&GuessManager> {
        self.guesses.get(cube_set)
    }

    pub fn abc(&self) -> &AbcManager {
        &self.abc
    }

    /// Set that owns a cube.
    pub fn cube_set_for(&self, cube_id: &str) -> Option<usize> {
        self.cube_to_set.get(cube_id).copied()
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Hand queued messages to the publisher.
    pub fn drain_outbox(&mut self) -> Vec<OutboundMessage> {
        self.outbox.drain()
    }

    fn check_set(&self, cube_set: usize) -> Result<()> {
        if cube_set < self.cube_sets.len() {
            Ok(())
        } else {
            Err(CubesError::UnknownCubeSet(cube_set))
        }
    }

    /// Player credited for a set's guesses: everything counts for player 0
    /// until a second set has started.
    fn player_for(&self, cube_set: usize) -> usize {
        if self.started_players.len() <= 1 {
            0
        } else {
            cube_set
        }
    }

    // --- Inbound ---

    /// Route one bus message. Returns `false` for topics this layer does
    /// not handle and for cubes outside every set.
    pub fn handle_message(&mut self, topic: &str, payload: &str, now_ms: i64) -> bool {
        let Some(report) = NeighborReport::parse(topic, payload) else {
            debug!(topic, "ignoring message");
            return false;
        };
        let Some(cube_set) = self.cube_set_for(&report.sender) else {
            warn!(sender = %report.sender, "neighbor report from unknown cube");
            return false;
        };

        let words = self.cube_sets[cube_set]
            .process_neighbor_report(&report.sender, report.neighbor.as_deref());
        debug!(cube_set, words = ?words, "words from neighbor report");

        let player = self.player_for(cube_set);
        self.submit_words(cube_set, words, player, now_ms);

        if self.abc.is_active() {
            if let Some(completed) = self.abc.check_abc_sequence_complete(&self.cube_sets) {
                let events = self.abc.handle_abc_completion(
                    completed,
                    &self.cube_sets,
                    now_ms,
                    self.config.abc_countdown_delay_ms,
                    &mut self.outbox,
                );
                self.fire_stage_events(&events, now_ms);
            }
        }

        true
    }

    // --- Guesses ---

    /// Submit the words currently formed on a set. Returns whether the
    /// guess got past the debouncer.
    pub fn guess_tiles(
        &mut self,
        cube_set: usize,
        words: Vec<Word>,
        player: usize,
        now_ms: i64,
    ) -> Result<bool> {
        self.check_set(cube_set)?;
        Ok(self.submit_words(cube_set, words, player, now_ms))
    }

    fn submit_words(&mut self, cube_set: usize, words: Vec<Word>, player: usize, now_ms: i64) -> bool {
        let removed = self.guesses[cube_set].removed_chains(&words);
        if !self.guesses[cube_set].submit(words, now_ms) {
            return false;
        }

        for chain in &removed {
            self.callbacks.on_highlight_removed(chain, player);
        }
        self.replay_last_guess(cube_set, player, now_ms);
        true
    }

    /// Re-send the set's last accepted words to the game and redraw borders.
    pub fn guess_last_tiles(&mut self, cube_set: usize, player: usize, now_ms: i64) -> Result<()> {
        self.check_set(cube_set)?;
        self.replay_last_guess(cube_set, player, now_ms);
        Ok(())
    }

    fn replay_last_guess(&mut self, cube_set: usize, player: usize, now_ms: i64) {
        let words = self.guesses[cube_set].last_words().to_vec();
        info!(cube_set, player, words = ?words, "guess");

        for word in &words {
            self.callbacks.on_guess(word.tiles(), true, player, now_ms);
        }

        // Borders belong to a running game only
        if self.started_players.contains(&cube_set) {
            let messages = self.cube_sets[cube_set].highlight_messages(&words, now_ms);
            self.outbox.extend(messages);
        }
    }

    // --- Rack and letters ---

    /// Show the rack on a started set's cubes. If the rack changed since
    /// the last load, the last guess is re-validated.
    pub fn load_rack(
        &mut self,
        cube_set: usize,
        tiles: &[Tile],
        player: usize,
        now_ms: i64,
    ) -> Result<()> {
        self.check_set(cube_set)?;

        if self.started_players.contains(&cube_set) {
            let messages = self.cube_sets[cube_set].load_rack(tiles, now_ms)?;
            self.outbox.extend(messages);
        } else {
            debug!(cube_set, "game not started, skipping rack letters");
        }

        if self.guesses[cube_set].reload_rack(tiles) {
            self.replay_last_guess(cube_set, player, now_ms);
        }
        Ok(())
    }

    pub fn accept_new_letter(
        &mut self,
        cube_set: usize,
        tile_id: &str,
        letter: &str,
        now_ms: i64,
    ) -> Result<()> {
        self.check_set(cube_set)?;
        let message = self.cube_sets[cube_set].accept_new_letter(tile_id, letter, now_ms)?;
        self.outbox.push(message);
        Ok(())
    }

    pub fn flash_guess(&mut self, cube_set: usize, tiles: &[TileId], now_ms: i64) -> Result<()> {
        self.check_set(cube_set)?;
        let messages = self.cube_sets[cube_set].flash_guess(tiles, now_ms);
        self.outbox.extend(messages);
        Ok(())
    }

    /// Valid new word: green borders and a flash.
    pub fn good_guess(&mut self, cube_set: usize, tiles: &[TileId], now_ms: i64) -> Result<()> {
        self.check_set(cube_set)?;
        self.cube_sets[cube_set].set_border_color(GOOD_GUESS_COLOR);
        self.flash_guess(cube_set, tiles, now_ms)
    }

    /// Word already played: yellow borders.
    pub fn old_guess(&mut self, cube_set: usize) -> Result<()> {
        self.check_set(cube_set)?;
        self.cube_sets[cube_set].set_border_color(OLD_GUESS_COLOR);
        Ok(())
    }

    /// Not a word: white borders.
    pub fn bad_guess(&mut self, cube_set: usize) -> Result<()> {
        self.check_set(cube_set)?;
        self.cube_sets[cube_set].set_border_color(BAD_GUESS_COLOR);
        Ok(())
    }

    // --- Letter locks ---

    /// Lock the cube under `tile_id`, unlocking the set's previous lock.
    /// `None` just releases the lock. Returns `false` when the tile is
    /// already the locked one.
    pub fn letter_lock(
        &mut self,
        cube_set: usize,
        tile_id: Option<&str>,
        now_ms: i64,
    ) -> Result<bool> {
        self.check_set(cube_set)?;
        let cube = tile_id
            .and_then(|t| self.cube_sets[cube_set].cube_for_tile(t))
            .map(str::to_string);

        if let Some(last) = self.locked_cubes.get(&cube_set) {
            if Some(last) == cube.as_ref() {
                return Ok(false);
            }
            self.outbox.push(OutboundMessage::unlock(last, now_ms));
        }

        match cube {
            Some(cube) => {
                self.outbox.push(OutboundMessage::lock(&cube, now_ms));
                self.locked_cubes.insert(cube_set, cube);
            }
            None => {
                self.locked_cubes.remove(&cube_set);
            }
        }
        Ok(true)
    }

    pub fn unlock_all_letters(&mut self, now_ms: i64) {
        for cube in self.locked_cubes.values() {
            self.outbox.push(OutboundMessage::unlock(cube, now_ms));
        }
        self.locked_cubes.clear();
    }

    pub fn locked_cube(&self, cube_set: usize) -> Option<&str> {
        self.locked_cubes.get(&cube_set).map(String::as_str)
    }

    // --- Bulk operations ---

    pub fn clear_all_borders(&mut self, now_ms: i64) {
        for manager in &self.cube_sets {
            for cube in manager.cube_list() {
                self.outbox
                    .push(OutboundMessage::border(cube, &BorderDirective::Clear, now_ms));
            }
        }
    }

    pub fn clear_all_letters(&mut self, now_ms: i64) {
        for manager in &self.cube_sets {
            for cube in manager.cube_list() {
                self.outbox.push(OutboundMessage::letter(cube, " ", now_ms));
            }
        }
    }

    /// Blank the A, B, C letters of every armed set and drop those triples.
    /// Sets already counting down keep theirs so later stages still land.
    pub fn clear_remaining_abc_cubes(&mut self, now_ms: i64) {
        for cube_set in self.abc.assigned_sets() {
            if self.abc.is_in_countdown(cube_set) {
                continue;
            }
            if let Some(triple) = self.abc.clear_assignment(cube_set) {
                for cube in triple.cubes() {
                    self.outbox.push(OutboundMessage::letter(cube, " ", now_ms));
                }
            }
        }
    }

    // --- ABC start ---

    /// Hand out ABC triples when no game is running and cubes have started
    /// reporting. Returns the newly armed sets.
    pub fn activate_abc_start_if_ready(&mut self, now_ms: i64) -> Vec<usize> {
        if self.game_on_mode_ended || self.game_running {
            return Vec::new();
        }
        if !self.cube_sets.iter().any(CubeSetManager::has_any_reports) {
            return Vec::new();
        }
        self.abc
            .assign_abc_letters_to_available_players(&self.cube_sets, now_ms, &mut self.outbox)
    }

    pub fn is_any_player_in_countdown(&self) -> bool {
        self.abc.is_any_player_in_countdown()
    }

    pub fn abc_phase(&self, cube_set: usize) -> AbcPhase {
        self.abc.phase(cube_set)
    }

    /// Advance the countdown. Called once per frame by the game loop.
    /// Sets that finish are marked started and `on_game_start` fires once
    /// for each.
    pub fn check_countdown_completion(&mut self, now_ms: i64) -> CountdownTick {
        let tick = self
            .abc
            .check_countdown_completion(&self.cube_sets, now_ms, &mut self.outbox);
        self.fire_stage_events(&tick.stages, now_ms);

        if let Some(complete_time) = tick.completed_at_ms {
            for &cube_set in &tick.started {
                self.started_cube_sets.insert(cube_set);
                self.started_players.insert(cube_set);
                self.callbacks.on_game_start(true, complete_time, cube_set);
            }
        }
        tick
    }

    fn fire_stage_events(&mut self, events: &[StageEvent], now_ms: i64) {
        for event in events {
            self.callbacks
                .on_countdown_stage(event.cube_set, event.stage, now_ms);
        }
    }

    // --- Game lifecycle ---

    pub fn set_game_running(&mut self, running: bool) {
        self.game_running = running;
        if running {
            self.game_on_mode_ended = false;
        }
        info!(running, "game running state");
    }

    pub fn game_running(&self) -> bool {
        self.game_running
    }

    pub fn game_on_mode_ended(&self) -> bool {
        self.game_on_mode_ended
    }

    /// Game over. In game-on mode (`min_win_score > 0`) the ABC start is
    /// disabled until the next game begins; otherwise it stays available.
    pub fn set_game_end_time(&mut self, now_ms: i64, min_win_score: u32) {
        self.game_running = false;
        if min_win_score > 0 {
            self.game_on_mode_ended = true;
            self.abc.reset();
            info!(now_ms, "game ended in game-on mode, abc disabled");
        } else {
            info!(now_ms, "game ended, abc available");
        }
    }

    pub fn has_player_started_game(&self, player: usize) -> bool {
        self.started_players.contains(&player)
    }

    pub fn add_player_started(&mut self, player: usize) {
        self.started_players.insert(player);
    }

    pub fn reset_player_started_state(&mut self) {
        self.started_players.clear();
    }

    pub fn started_cube_sets(&self) -> Vec<usize> {
        self.started_cube_sets.iter().copied().collect()
    }

    pub fn reset_started_cube_sets(&mut self) {
        self.started_cube_sets.clear();
    }

    /// Convert the whole coordination state to JSON for diagnostics.
    pub fn to_json(&self) -> serde_json::Value {
        let cube_sets: Vec<serde_json::Value> =
            self.cube_sets.iter().map(CubeSetManager::to_json).collect();
        let last_words: Vec<Vec<String>> = self
            .guesses
            .iter()
            .map(|g| g.last_words().iter().map(Word::as_string).collect())
            .collect();

        serde_json::json!({
            "cube_sets": cube_sets,
            "last_words": last_words,
            "abc": self.abc.to_json(),
            "started_players": self.started_players,
            "started_cube_sets": self.started_cube_sets,
            "locked_cubes": self.locked_cubes,
            "game_running": self.game_running,
            "game_on_mode_ended": self.game_on_mode_ended,
            "pending_messages": self.outbox.len()
        })
    }
}
