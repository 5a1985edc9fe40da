//! Per-player cube set state.
//!
//! Each cube reports the cube to its right. Those reports form a chain
//! (`sender -> neighbor`, at most one outgoing link per cube) from which
//! words are read left to right.
//!
//! # Chain invariants
//!
//! - No cube links to itself or to a cube outside the set.
//! - The chain never contains a cycle. A report that would close one is
//!   dropped and the previous link is kept.
//! - A word extraction never reports the same tile twice. If two chains
//!   merge into a shared tail the whole extraction is discarded.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::config::{BAD_GUESS_COLOR, MAX_LETTERS};
use super::error::{CubesError, Result};
use super::message::{BorderDirective, BorderSide, OutboundMessage};

/// Physical cube identifier.
pub type CubeId = String;

/// Rack slot identifier (`"0"` up to `max_letters - 1`).
pub type TileId = String;

/// A rack tile and the letter it currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Tile {
    pub id: TileId,
    pub letter: String,
}

impl Tile {
    pub fn new(id: impl Into<TileId>, letter: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            letter: letter.into(),
        }
    }
}

/// Tile IDs along one chain, leftmost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Word {
    tiles: Vec<TileId>,
}

impl Word {
    pub fn new(tiles: Vec<TileId>) -> Self {
        Self { tiles }
    }

    pub fn tiles(&self) -> &[TileId] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tile IDs concatenated, e.g. `"012"`.
    pub fn as_string(&self) -> String {
        self.tiles.concat()
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl<S: Into<TileId>> FromIterator<S> for Word {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// State for a single player's cube set.
#[derive(Debug, Clone)]
pub struct CubeSetManager {
    /// Player slot this set belongs to
    pub cube_set_id: usize,

    /// Rack size; longer walks are treated as runaway
    max_letters: usize,

    /// Cubes in tile order
    cube_list: Vec<CubeId>,

    /// Confirmed right-neighbor links
    chain: HashMap<CubeId, CubeId>,

    tiles_to_cubes: HashMap<TileId, CubeId>,
    cubes_to_tiles: HashMap<CubeId, TileId>,

    /// Last raw report per cube, kept even when the link was rejected
    cubes_to_neighbors: HashMap<CubeId, Option<CubeId>>,

    cubes_to_letters: HashMap<CubeId, String>,

    /// Color used for word highlights
    border_color: String,
}

impl CubeSetManager {
    pub fn new(cube_set_id: usize) -> Self {
        Self::with_max_letters(cube_set_id, MAX_LETTERS)
    }

    pub fn with_max_letters(cube_set_id: usize, max_letters: usize) -> Self {
        Self {
            cube_set_id,
            max_letters,
            cube_list: Vec::new(),
            chain: HashMap::new(),
            tiles_to_cubes: HashMap::new(),
            cubes_to_tiles: HashMap::new(),
            cubes_to_neighbors: HashMap::new(),
            cubes_to_letters: HashMap::new(),
            border_color: BAD_GUESS_COLOR.to_string(),
        }
    }

    /// Install the set's cubes. Tile `i` maps to `cubes[i]`; all chain,
    /// neighbor and letter state is dropped.
    pub fn init(&mut self, cubes: Vec<CubeId>) {
        self.tiles_to_cubes = cubes
            .iter()
            .enumerate()
            .map(|(i, cube)| (i.to_string(), cube.clone()))
            .collect();
        self.cubes_to_tiles = self
            .tiles_to_cubes
            .iter()
            .map(|(tile, cube)| (cube.clone(), tile.clone()))
            .collect();
        self.cube_list = cubes;
        self.chain.clear();
        self.cubes_to_neighbors.clear();
        self.cubes_to_letters.clear();
        debug!(cube_set = self.cube_set_id, cubes = ?self.cube_list, "cube set initialized");
    }

    pub fn cube_list(&self) -> &[CubeId] {
        &self.cube_list
    }

    pub fn contains_cube(&self, cube_id: &str) -> bool {
        self.cubes_to_tiles.contains_key(cube_id)
    }

    pub fn max_letters(&self) -> usize {
        self.max_letters
    }

    /// Confirmed link out of a cube.
    pub fn neighbor_of(&self, cube_id: &str) -> Option<&str> {
        self.chain.get(cube_id).map(String::as_str)
    }

    /// Number of confirmed links.
    pub fn link_count(&self) -> usize {
        self.chain.len()
    }

    /// Whether the cube has sent any neighbor report (including "none").
    pub fn has_reported(&self, cube_id: &str) -> bool {
        self.cubes_to_neighbors.contains_key(cube_id)
    }

    /// Last raw report from a cube: `None` if it never reported,
    /// `Some(None)` if it reported no neighbor.
    pub fn reported_neighbor(&self, cube_id: &str) -> Option<Option<&str>> {
        self.cubes_to_neighbors.get(cube_id).map(|n| n.as_deref())
    }

    /// Cubes that have reported, in tile order.
    pub fn reported_cubes(&self) -> Vec<&str> {
        self.cube_list
            .iter()
            .filter(|c| self.cubes_to_neighbors.contains_key(c.as_str()))
            .map(String::as_str)
            .collect()
    }

    pub fn has_any_reports(&self) -> bool {
        !self.cubes_to_neighbors.is_empty()
    }

    /// Whether two cubes are directly linked in either direction.
    pub fn are_adjacent(&self, a: &str, b: &str) -> bool {
        self.neighbor_of(a) == Some(b) || self.neighbor_of(b) == Some(a)
    }

    pub fn tile_for_cube(&self, cube_id: &str) -> Option<&str> {
        self.cubes_to_tiles.get(cube_id).map(String::as_str)
    }

    pub fn cube_for_tile(&self, tile_id: &str) -> Option<&str> {
        self.tiles_to_cubes.get(tile_id).map(String::as_str)
    }

    pub fn letter_for_cube(&self, cube_id: &str) -> Option<&str> {
        self.cubes_to_letters.get(cube_id).map(String::as_str)
    }

    pub fn border_color(&self) -> &str {
        &self.border_color
    }

    pub fn set_border_color(&mut self, color: &str) {
        self.border_color = color.to_string();
    }

    /// Apply a right-neighbor report and re-read the words.
    ///
    /// A missing neighbor, or one outside this set, removes the sender's
    /// link. A self-link or a link that would close a cycle is rejected:
    /// the chain is left as it was and no words are returned.
    pub fn process_neighbor_report(&mut self, sender: &str, neighbor: Option<&str>) -> Vec<Word> {
        if !self.contains_cube(sender) {
            warn!(cube_set = self.cube_set_id, sender, "report from cube outside set");
            return Vec::new();
        }

        self.cubes_to_neighbors
            .insert(sender.to_string(), neighbor.map(str::to_string));
        debug!(cube_set = self.cube_set_id, sender, ?neighbor, "neighbor report");

        let target = match neighbor {
            Some(target) if self.contains_cube(target) => target,
            _ => {
                self.chain.remove(sender);
                return self.form_words();
            }
        };

        if !self.update_chain(sender, target) {
            debug!(cube_set = self.cube_set_id, sender, neighbor = target, "link rejected");
            return Vec::new();
        }

        debug!(cube_set = self.cube_set_id, chain = %self.chain_description(), "chain updated");
        self.form_words()
    }

    /// Link `sender -> target` unless it is a self-link or closes a cycle.
    fn update_chain(&mut self, sender: &str, target: &str) -> bool {
        if sender == target {
            return false;
        }

        let previous = self.chain.insert(sender.to_string(), target.to_string());
        if self.has_loop_from(sender) {
            match previous {
                Some(prev) => self.chain.insert(sender.to_string(), prev),
                None => self.chain.remove(sender),
            };
            return false;
        }
        true
    }

    /// Walk forward from `start`; revisiting a cube, or walking further
    /// than a rack could hold, counts as a loop.
    fn has_loop_from(&self, start: &str) -> bool {
        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert(start);

        let mut current = self.neighbor_of(start);
        let mut steps = 0;
        while let Some(cube) = current {
            steps += 1;
            if steps > self.max_letters + 1 || !seen.insert(cube) {
                return true;
            }
            current = self.neighbor_of(cube);
        }
        false
    }

    /// Cubes with an outgoing link but no incoming one.
    fn source_cubes(&self) -> Vec<&str> {
        let targets: HashSet<&str> = self.chain.values().map(String::as_str).collect();
        let mut sources: Vec<&str> = self
            .chain
            .keys()
            .map(String::as_str)
            .filter(|c| !targets.contains(c))
            .collect();
        sources.sort_unstable();
        sources
    }

    /// Read every word in the chain. Returns nothing if any walk runs past
    /// the rack size or any tile would appear twice.
    pub fn form_words(&self) -> Vec<Word> {
        if self.chain.is_empty() {
            return Vec::new();
        }

        let mut words = Vec::new();
        for source in self.source_cubes() {
            let mut tiles = Vec::new();
            let mut current = Some(source);
            while let Some(cube) = current {
                let Some(tile) = self.cubes_to_tiles.get(cube) else {
                    return Vec::new();
                };
                tiles.push(tile.clone());
                if tiles.len() > self.max_letters {
                    info!(cube_set = self.cube_set_id, "runaway chain, discarding words");
                    return Vec::new();
                }
                current = self.neighbor_of(cube);
            }
            words.push(Word::new(tiles));
        }

        let mut seen = HashSet::new();
        if !words.iter().flat_map(|w| w.tiles()).all(|t| seen.insert(t)) {
            info!(cube_set = self.cube_set_id, ?words, "duplicate tiles, discarding words");
            return Vec::new();
        }

        words
    }

    /// Border directives for the given words: top and bottom on every
    /// tile, left on the first and right on the last, in the current
    /// highlight color. Every other tile is cleared.
    pub fn mark_tiles_for_guess(&self, words: &[Word]) -> Vec<(CubeId, BorderDirective)> {
        let mut marked = HashSet::new();
        let mut directives = Vec::new();

        for word in words {
            let last = word.len().saturating_sub(1);
            for (i, tile) in word.tiles().iter().enumerate() {
                let Some(cube) = self.cube_for_tile(tile) else {
                    warn!(cube_set = self.cube_set_id, tile = %tile, "highlight for unknown tile");
                    continue;
                };

                let mut sides = vec![BorderSide::North, BorderSide::South];
                if i == 0 {
                    sides.push(BorderSide::West);
                }
                if i == last {
                    sides.push(BorderSide::East);
                }

                marked.insert(tile.as_str());
                directives.push((
                    cube.to_string(),
                    BorderDirective::Draw {
                        sides,
                        color: self.border_color.clone(),
                    },
                ));
            }
        }

        for (i, cube) in self.cube_list.iter().enumerate() {
            if !marked.contains(i.to_string().as_str()) {
                directives.push((cube.clone(), BorderDirective::Clear));
            }
        }

        directives
    }

    /// `mark_tiles_for_guess` as border messages.
    pub fn highlight_messages(&self, words: &[Word], now_ms: i64) -> Vec<OutboundMessage> {
        self.mark_tiles_for_guess(words)
            .iter()
            .map(|(cube, directive)| OutboundMessage::border(cube, directive, now_ms))
            .collect()
    }

    /// Show rack letters on the cubes. Blank tiles also lose their borders.
    pub fn load_rack(&mut self, tiles: &[Tile], now_ms: i64) -> Result<Vec<OutboundMessage>> {
        if let Some(tile) = tiles.iter().find(|t| !self.tiles_to_cubes.contains_key(&t.id)) {
            return Err(CubesError::UnknownTile {
                cube_set: self.cube_set_id,
                tile_id: tile.id.clone(),
            });
        }

        let mut messages = Vec::new();
        for tile in tiles {
            let cube = self.tiles_to_cubes[&tile.id].clone();
            messages.push(OutboundMessage::letter(&cube, &tile.letter, now_ms));
            if tile.letter == " " {
                messages.push(OutboundMessage::border(&cube, &BorderDirective::Clear, now_ms));
            }
            self.cubes_to_letters.insert(cube, tile.letter.clone());
        }
        Ok(messages)
    }

    /// Put a single new letter on a tile's cube.
    pub fn accept_new_letter(
        &mut self,
        tile_id: &str,
        letter: &str,
        now_ms: i64,
    ) -> Result<OutboundMessage> {
        let cube = self
            .cube_for_tile(tile_id)
            .ok_or_else(|| CubesError::UnknownTile {
                cube_set: self.cube_set_id,
                tile_id: tile_id.to_string(),
            })?
            .to_string();
        self.cubes_to_letters.insert(cube.clone(), letter.to_string());
        Ok(OutboundMessage::letter(&cube, letter, now_ms))
    }

    /// Flash the cubes under the given tiles. Unknown tiles are skipped.
    pub fn flash_guess(&self, tiles: &[TileId], now_ms: i64) -> Vec<OutboundMessage> {
        tiles
            .iter()
            .filter_map(|t| self.cube_for_tile(t))
            .map(|cube| OutboundMessage::flash(cube, now_ms))
            .collect()
    }

    /// Human-readable chain for logs: `1 [A] -> 2 [B]; ...`.
    pub fn chain_description(&self) -> String {
        let mut links: Vec<(&String, &String)> = self.chain.iter().collect();
        links.sort();
        links
            .iter()
            .map(|(source, target)| {
                format!(
                    "{} [{}] -> {} [{}]",
                    source,
                    self.letter_for_cube(source).unwrap_or(""),
                    target,
                    self.letter_for_cube(target).unwrap_or("")
                )
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Convert to JSON for diagnostics.
    pub fn to_json(&self) -> serde_json::Value {
        let cubes: Vec<serde_json::Value> = self
            .cube_list
            .iter()
            .map(|cube| {
                serde_json::json!({
                    "cube_id": cube,
                    "tile_id": self.tile_for_cube(cube),
                    "letter": self.letter_for_cube(cube),
                    "neighbor": self.neighbor_of(cube),
                    "reported": self.reported_neighbor(cube).map(|n| n.unwrap_or("-")),
                })
            })
            .collect();

        serde_json::json!({
            "cube_set_id": self.cube_set_id,
            "border_color": self.border_color,
            "cubes": cubes,
            "words": self.form_words().iter().map(Word::as_string).collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn make_manager(cubes: &[&str]) -> CubeSetManager {
        let mut manager = CubeSetManager::new(0);
        manager.init(cubes.iter().map(|c| c.to_string()).collect());
        manager
    }

    fn word(tiles: &[&str]) -> Word {
        tiles.iter().copied().collect()
    }

    #[test]
    fn test_init_maps_tiles() {
        let manager = make_manager(&["1", "2", "3"]);
        assert_eq!(manager.cube_for_tile("0"), Some("1"));
        assert_eq!(manager.cube_for_tile("2"), Some("3"));
        assert_eq!(manager.tile_for_cube("2"), Some("1"));
        assert_eq!(manager.cube_for_tile("3"), None);
    }

    #[test]
    fn test_simple_chain() {
        let mut manager = make_manager(&["1", "2", "3"]);

        let words = manager.process_neighbor_report("1", Some("2"));
        assert_eq!(words, vec![word(&["0", "1"])]);

        let words = manager.process_neighbor_report("2", Some("3"));
        assert_eq!(words, vec![word(&["0", "1", "2"])]);
        assert_eq!(words[0].as_string(), "012");
    }

    #[test]
    fn test_cycle_rejected() {
        let mut manager = make_manager(&["1", "2", "3"]);
        manager.process_neighbor_report("1", Some("2"));

        let words = manager.process_neighbor_report("2", Some("1"));
        assert!(words.is_empty());
        assert_eq!(manager.neighbor_of("1"), Some("2"));
        assert_eq!(manager.neighbor_of("2"), None);
        assert_eq!(manager.link_count(), 1);
        // Raw report is still recorded
        assert_eq!(manager.reported_neighbor("2"), Some(Some("1")));
    }

    #[test]
    fn test_cycle_rejection_keeps_previous_link() {
        let mut manager = make_manager(&["1", "2", "3", "4"]);
        manager.process_neighbor_report("1", Some("2"));
        manager.process_neighbor_report("2", Some("3"));
        manager.process_neighbor_report("3", Some("4"));

        // 3 -> 1 would close 1 -> 2 -> 3 -> 1
        assert!(manager.process_neighbor_report("3", Some("1")).is_empty());
        assert_eq!(manager.neighbor_of("3"), Some("4"));
        assert_eq!(manager.form_words(), vec![word(&["0", "1", "2", "3"])]);
    }

    #[test]
    fn test_self_link_rejected() {
        let mut manager = make_manager(&["1", "2"]);
        assert!(manager.process_neighbor_report("1", Some("1")).is_empty());
        assert_eq!(manager.link_count(), 0);
    }

    #[test]
    fn test_no_neighbor_removes_link() {
        let mut manager = make_manager(&["1", "2", "3"]);
        manager.process_neighbor_report("1", Some("2"));
        manager.process_neighbor_report("2", Some("3"));

        let words = manager.process_neighbor_report("2", None);
        assert_eq!(words, vec![word(&["0", "1"])]);

        let words = manager.process_neighbor_report("1", None);
        assert!(words.is_empty());
        assert!(manager.has_reported("1"));
    }

    #[test]
    fn test_foreign_neighbor_removes_link() {
        let mut manager = make_manager(&["1", "2", "3"]);
        manager.process_neighbor_report("1", Some("2"));

        let words = manager.process_neighbor_report("1", Some("14"));
        assert!(words.is_empty());
        assert_eq!(manager.neighbor_of("1"), None);
    }

    #[test]
    fn test_sender_outside_set_ignored() {
        let mut manager = make_manager(&["1", "2"]);
        assert!(manager.process_neighbor_report("9", Some("1")).is_empty());
        assert!(!manager.has_reported("9"));
    }

    #[test]
    fn test_two_words_sorted_by_source() {
        let mut manager = make_manager(&["1", "2", "3", "4", "5", "6"]);
        manager.process_neighbor_report("4", Some("5"));
        let words = manager.process_neighbor_report("1", Some("2"));
        assert_eq!(words, vec![word(&["0", "1"]), word(&["3", "4"])]);
    }

    #[test]
    fn test_shared_tail_discards_all_words() {
        let mut manager = make_manager(&["1", "2", "3", "4"]);
        manager.process_neighbor_report("1", Some("3"));
        let words = manager.process_neighbor_report("2", Some("3"));
        assert!(words.is_empty());
        // Both links are stored; only extraction is refused
        assert_eq!(manager.link_count(), 2);
    }

    #[test]
    fn test_runaway_chain_discarded() {
        let mut manager = CubeSetManager::with_max_letters(0, 2);
        manager.init(vec!["1".into(), "2".into(), "3".into()]);
        manager.process_neighbor_report("1", Some("2"));
        assert!(manager.process_neighbor_report("2", Some("3")).is_empty());
    }

    #[test]
    fn test_mark_tiles_for_guess() {
        let mut manager = make_manager(&["1", "2", "3", "4"]);
        manager.set_border_color("0x07E0");

        let directives = manager.mark_tiles_for_guess(&[word(&["0", "1", "2"])]);
        let payloads: Vec<(String, String)> = directives
            .iter()
            .map(|(cube, d)| (cube.clone(), d.payload()))
            .collect();

        assert_eq!(
            payloads,
            vec![
                ("1".to_string(), "NSW:0x07E0".to_string()),
                ("2".to_string(), "NS:0x07E0".to_string()),
                ("3".to_string(), "ENS:0x07E0".to_string()),
                ("4".to_string(), ":".to_string()),
            ]
        );
    }

    #[test]
    fn test_mark_tiles_single_tile_word() {
        let manager = make_manager(&["1", "2"]);
        let directives = manager.mark_tiles_for_guess(&[word(&["1"])]);
        assert_eq!(directives[0].0, "2");
        assert_eq!(directives[0].1.payload(), "ENSW:0xFFFF");
        assert!(directives[1].1.is_clear());
    }

    #[test]
    fn test_mark_tiles_no_words_clears_all() {
        let manager = make_manager(&["1", "2", "3"]);
        let messages = manager.highlight_messages(&[], 42);
        assert_eq!(messages.len(), 3);
        assert!(messages
            .iter()
            .all(|m| m.payload.as_deref() == Some(":") && m.timestamp_ms == 42));
    }

    #[test]
    fn test_load_rack() {
        let mut manager = make_manager(&["1", "2"]);
        let messages = manager
            .load_rack(&[Tile::new("0", "A"), Tile::new("1", " ")], 7)
            .unwrap();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].topic, "cube/1/letter");
        assert_eq!(messages[1].topic, "cube/2/letter");
        assert_eq!(messages[2].topic, "cube/2/border");
        assert_eq!(manager.letter_for_cube("1"), Some("A"));
    }

    #[test]
    fn test_load_rack_unknown_tile() {
        let mut manager = make_manager(&["1"]);
        let result = manager.load_rack(&[Tile::new("0", "A"), Tile::new("5", "B")], 0);
        assert!(matches!(result, Err(CubesError::UnknownTile { .. })));
        assert_eq!(manager.letter_for_cube("1"), None);
    }

    #[test]
    fn test_flash_guess() {
        let manager = make_manager(&["1", "2", "3"]);
        let messages = manager.flash_guess(&["2".to_string(), "9".to_string()], 0);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "cube/3/flash");
    }

    #[test]
    fn test_reinit_clears_chain() {
        let mut manager = make_manager(&["1", "2"]);
        manager.process_neighbor_report("1", Some("2"));
        manager.init(vec!["1".into(), "2".into()]);
        assert_eq!(manager.link_count(), 0);
        assert!(!manager.has_any_reports());
    }

    fn chain_has_cycle(manager: &CubeSetManager) -> bool {
        manager.cube_list().iter().any(|start| {
            let mut seen = HashSet::new();
            let mut current = Some(start.as_str());
            while let Some(cube) = current {
                if !seen.insert(cube) {
                    return true;
                }
                current = manager.neighbor_of(cube);
            }
            false
        })
    }

    proptest! {
        #[test]
        fn test_chain_never_cycles(reports in proptest::collection::vec((0usize..6, 0usize..8), 0..64)) {
            let cubes = ["1", "2", "3", "4", "5", "6"];
            let mut manager = make_manager(&cubes);

            for (sender, target) in reports {
                // 6 is "no neighbor", 7 is a foreign cube
                let neighbor = match target {
                    6 => None,
                    7 => Some("99"),
                    t => Some(cubes[t]),
                };
                let words = manager.process_neighbor_report(cubes[sender], neighbor);

                prop_assert!(!chain_has_cycle(&manager));

                let mut seen = HashSet::new();
                for tile in words.iter().flat_map(|w| w.tiles()) {
                    prop_assert!(seen.insert(tile.clone()));
                }
            }
        }
    }
}
