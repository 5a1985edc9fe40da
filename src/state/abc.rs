//! ABC start gesture and the shared countdown.
//!
//! # Phases (per cube set)
//!
//! ```text
//! ┌──────┐  3 cubes reported   ┌───────┐  A->B->C linked   ┌─────────────────┐
//! │ Idle │────────────────────▶│ Armed │──────────────────▶│ CountdownActive │
//! └──────┘                     └───────┘                   └────────┬────────┘
//!    ▲                                                              │
//!    │            shared completion time reached (all sets)         │
//!    └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first set to link its triple creates the schedule. A set that links
//! later joins that schedule: it immediately replays every stage that has
//! already elapsed, then advances in lock-step. The completion time never
//! moves. When it is reached every set in countdown starts its game and all
//! ABC state is wiped, including armed sets that never finished.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::cube_set::{CubeId, CubeSetManager};
use super::message::{OutboundMessage, Outbox};

/// Letter shown on a cube once its countdown stage has fired.
pub const COUNTDOWN_LETTER: &str = "?";

/// Countdown stages in firing order: three decoys, then A, B, C.
pub const COUNTDOWN_STAGES: [CountdownStage; 6] = [
    CountdownStage::Decoy1,
    CountdownStage::Decoy2,
    CountdownStage::Decoy3,
    CountdownStage::A,
    CountdownStage::B,
    CountdownStage::C,
];

/// One step of the countdown. Decoys replace cubes outside the triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CountdownStage {
    Decoy1,
    Decoy2,
    Decoy3,
    A,
    B,
    C,
}

impl CountdownStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decoy1 => "non_abc_1",
            Self::Decoy2 => "non_abc_2",
            Self::Decoy3 => "non_abc_3",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }
}

impl fmt::Display for CountdownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a cube set is in the start ritual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbcPhase {
    #[default]
    Idle,
    Armed,
    CountdownActive,
}

/// The three cubes a set must link as A -> B -> C.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbcTriple {
    pub a: CubeId,
    pub b: CubeId,
    pub c: CubeId,
}

impl AbcTriple {
    pub fn cubes(&self) -> [&str; 3] {
        [self.a.as_str(), self.b.as_str(), self.c.as_str()]
    }

    pub fn contains(&self, cube_id: &str) -> bool {
        self.cubes().contains(&cube_id)
    }

    /// Whether the set's chain currently reads exactly A -> B -> C.
    pub fn is_linked(&self, manager: &CubeSetManager) -> bool {
        manager.neighbor_of(&self.a) == Some(self.b.as_str())
            && manager.neighbor_of(&self.b) == Some(self.c.as_str())
    }
}

/// A stage and the time it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduledStage {
    pub at_ms: i64,
    pub stage: CountdownStage,
}

/// A stage applied to one cube set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEvent {
    pub cube_set: usize,
    pub stage: CountdownStage,
    /// Cube that showed the countdown letter, if the set had one for the stage
    pub cube_id: Option<CubeId>,
    pub scheduled_ms: i64,
}

/// What one countdown poll did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountdownTick {
    pub stages: Vec<StageEvent>,
    /// Sets whose game started on this poll
    pub started: Vec<usize>,
    /// Completion time, when this poll finished the countdown
    pub completed_at_ms: Option<i64>,
}

impl CountdownTick {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty() && self.started.is_empty()
    }
}

/// Pick up to three reporting cubes, none linked to another pick.
///
/// Greedy over tile order. Fewer than three reporting cubes are returned
/// as-is so callers can tell how close the set is.
pub fn select_abc_candidates(manager: &CubeSetManager) -> Vec<CubeId> {
    let available = manager.reported_cubes();
    if available.len() < 3 {
        return available.into_iter().map(str::to_string).collect();
    }

    let mut selected: Vec<&str> = Vec::with_capacity(3);
    for cube in available {
        if selected.len() >= 3 {
            break;
        }
        if !selected.iter().any(|s| manager.are_adjacent(cube, s)) {
            selected.push(cube);
        }
    }
    debug!(cube_set = manager.cube_set_id, ?selected, "abc candidates");

    selected.into_iter().map(str::to_string).collect()
}

/// ABC assignment and countdown state for every cube set.
#[derive(Debug, Clone, Default)]
pub struct AbcManager {
    /// Whether triples are being handed out and checked
    active: bool,

    /// Triple per armed cube set
    assignments: BTreeMap<usize, AbcTriple>,

    /// Sets in countdown, with how many stages each has received
    countdown: BTreeMap<usize, usize>,

    /// Shared schedule, created by the first set to finish
    schedule: Vec<ScheduledStage>,

    complete_time_ms: Option<i64>,
}

impl AbcManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all assignment and countdown state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_any_player_in_countdown(&self) -> bool {
        !self.countdown.is_empty()
    }

    pub fn is_in_countdown(&self, cube_set: usize) -> bool {
        self.countdown.contains_key(&cube_set)
    }

    pub fn phase(&self, cube_set: usize) -> AbcPhase {
        if self.countdown.contains_key(&cube_set) {
            AbcPhase::CountdownActive
        } else if self.assignments.contains_key(&cube_set) {
            AbcPhase::Armed
        } else {
            AbcPhase::Idle
        }
    }

    pub fn assignment(&self, cube_set: usize) -> Option<&AbcTriple> {
        self.assignments.get(&cube_set)
    }

    pub fn assigned_sets(&self) -> Vec<usize> {
        self.assignments.keys().copied().collect()
    }

    /// Remove a set's triple without touching the countdown.
    pub fn clear_assignment(&mut self, cube_set: usize) -> Option<AbcTriple> {
        self.assignments.remove(&cube_set)
    }

    pub fn schedule(&self) -> &[ScheduledStage] {
        &self.schedule
    }

    pub fn complete_time_ms(&self) -> Option<i64> {
        self.complete_time_ms
    }

    /// Stages a set has received so far.
    pub fn stages_applied(&self, cube_set: usize) -> Option<usize> {
        self.countdown.get(&cube_set).copied()
    }

    /// Arm the sequence, but only once some set has three reporting cubes.
    pub fn activate_abc_start_sequence(
        &mut self,
        cube_sets: &[CubeSetManager],
        now_ms: i64,
        outbox: &mut Outbox,
    ) -> Vec<usize> {
        let has_enough = cube_sets.iter().any(|m| m.reported_cubes().len() >= 3);
        if !has_enough {
            return Vec::new();
        }
        self.assign_abc_letters_to_available_players(cube_sets, now_ms, outbox)
    }

    /// Arm the sequence and give a triple to every set that can take one.
    /// Publishes `A`, `B`, `C` on the chosen cubes and returns the newly
    /// armed sets.
    pub fn assign_abc_letters_to_available_players(
        &mut self,
        cube_sets: &[CubeSetManager],
        now_ms: i64,
        outbox: &mut Outbox,
    ) -> Vec<usize> {
        self.active = true;

        let mut armed = Vec::new();
        for manager in cube_sets {
            if self.assignments.contains_key(&manager.cube_set_id) {
                continue;
            }

            let candidates = select_abc_candidates(manager);
            let [a, b, c] = match <[CubeId; 3]>::try_from(candidates) {
                Ok(triple) => triple,
                Err(_) => continue,
            };

            for (cube, letter) in [(&a, "A"), (&b, "B"), (&c, "C")] {
                outbox.push(OutboundMessage::letter(cube, letter, now_ms));
            }
            info!(cube_set = manager.cube_set_id, %a, %b, %c, "abc assigned");

            self.assignments
                .insert(manager.cube_set_id, AbcTriple { a, b, c });
            armed.push(manager.cube_set_id);
        }
        armed
    }

    /// First armed set, not already counting down, whose chain reads A -> B -> C.
    pub fn check_abc_sequence_complete(&self, cube_sets: &[CubeSetManager]) -> Option<usize> {
        if !self.active {
            return None;
        }

        cube_sets
            .iter()
            .filter(|m| !self.countdown.contains_key(&m.cube_set_id))
            .find(|m| {
                self.assignments
                    .get(&m.cube_set_id)
                    .is_some_and(|triple| triple.is_linked(m))
            })
            .map(|m| m.cube_set_id)
    }

    /// Start the shared countdown, or join the running one.
    ///
    /// Returns the stages applied to the set right away: the first stage
    /// for a new countdown, every elapsed stage for a late joiner. A set
    /// with no triple (e.g. after a reset) is ignored.
    pub fn handle_abc_completion(
        &mut self,
        cube_set: usize,
        cube_sets: &[CubeSetManager],
        now_ms: i64,
        delay_ms: i64,
        outbox: &mut Outbox,
    ) -> Vec<StageEvent> {
        if !self.assignments.contains_key(&cube_set) || self.countdown.contains_key(&cube_set) {
            debug!(cube_set, "abc completion ignored");
            return Vec::new();
        }

        if self.is_any_player_in_countdown() {
            info!(cube_set, "joining active countdown");
        } else {
            info!(cube_set, now_ms, "starting countdown");
            self.start_abc_countdown(now_ms, delay_ms);
        }

        self.countdown.insert(cube_set, 0);
        self.advance_set(cube_set, cube_sets, now_ms, outbox)
    }

    fn start_abc_countdown(&mut self, now_ms: i64, delay_ms: i64) {
        self.schedule = COUNTDOWN_STAGES
            .iter()
            .enumerate()
            .map(|(i, stage)| ScheduledStage {
                at_ms: now_ms.saturating_add((i as i64).saturating_mul(delay_ms)),
                stage: *stage,
            })
            .collect();
        let total_ms = (COUNTDOWN_STAGES.len() as i64).saturating_mul(delay_ms);
        self.complete_time_ms = Some(now_ms.saturating_add(total_ms));
    }

    /// Apply every stage the set has not yet received whose time has come.
    fn advance_set(
        &mut self,
        cube_set: usize,
        cube_sets: &[CubeSetManager],
        now_ms: i64,
        outbox: &mut Outbox,
    ) -> Vec<StageEvent> {
        let Some(applied) = self.countdown.get(&cube_set).copied() else {
            return Vec::new();
        };

        let due: Vec<ScheduledStage> = self.schedule[applied.min(self.schedule.len())..]
            .iter()
            .take_while(|s| s.at_ms <= now_ms)
            .copied()
            .collect();

        let events: Vec<StageEvent> = due
            .iter()
            .map(|s| self.execute_stage(cube_set, s, cube_sets, now_ms, outbox))
            .collect();

        self.countdown.insert(cube_set, applied + events.len());
        events
    }

    /// Put the countdown letter on the stage's cube for one set.
    fn execute_stage(
        &self,
        cube_set: usize,
        scheduled: &ScheduledStage,
        cube_sets: &[CubeSetManager],
        now_ms: i64,
        outbox: &mut Outbox,
    ) -> StageEvent {
        let cube_id = self.stage_cube(cube_set, scheduled.stage, cube_sets);
        match &cube_id {
            Some(cube) => outbox.push(OutboundMessage::letter(cube, COUNTDOWN_LETTER, now_ms)),
            None => warn!(cube_set, stage = %scheduled.stage, "no cube for countdown stage"),
        }

        StageEvent {
            cube_set,
            stage: scheduled.stage,
            cube_id,
            scheduled_ms: scheduled.at_ms,
        }
    }

    fn stage_cube(
        &self,
        cube_set: usize,
        stage: CountdownStage,
        cube_sets: &[CubeSetManager],
    ) -> Option<CubeId> {
        let triple = self.assignments.get(&cube_set)?;
        let decoy = |n: usize| {
            cube_sets
                .iter()
                .find(|m| m.cube_set_id == cube_set)?
                .cube_list()
                .iter()
                .filter(|c| !triple.contains(c))
                .nth(n)
                .cloned()
        };

        match stage {
            CountdownStage::Decoy1 => decoy(0),
            CountdownStage::Decoy2 => decoy(1),
            CountdownStage::Decoy3 => decoy(2),
            CountdownStage::A => Some(triple.a.clone()),
            CountdownStage::B => Some(triple.b.clone()),
            CountdownStage::C => Some(triple.c.clone()),
        }
    }

    /// Fire due stages for every set in countdown and finish the countdown
    /// once its completion time is reached. Called once per frame.
    pub fn check_countdown_completion(
        &mut self,
        cube_sets: &[CubeSetManager],
        now_ms: i64,
        outbox: &mut Outbox,
    ) -> CountdownTick {
        let mut tick = CountdownTick::default();

        let in_countdown: Vec<usize> = self.countdown.keys().copied().collect();
        for cube_set in in_countdown {
            tick.stages
                .extend(self.advance_set(cube_set, cube_sets, now_ms, outbox));
        }

        if let Some(complete_time) = self.complete_time_ms {
            if now_ms >= complete_time {
                tick.started = self.countdown.keys().copied().collect();
                tick.completed_at_ms = Some(complete_time);
                info!(started = ?tick.started, complete_time, "abc countdown complete");
                self.reset();
            }
        }

        tick
    }

    /// Convert to JSON for diagnostics.
    pub fn to_json(&self) -> serde_json::Value {
        let assignments: serde_json::Map<String, serde_json::Value> = self
            .assignments
            .iter()
            .map(|(set, triple)| (set.to_string(), serde_json::json!(triple)))
            .collect();
        let schedule: Vec<serde_json::Value> = self
            .schedule
            .iter()
            .map(|s| serde_json::json!({"at_ms": s.at_ms, "stage": s.stage.as_str()}))
            .collect();

        serde_json::json!({
            "active": self.active,
            "assignments": assignments,
            "countdown": self.countdown.keys().collect::<Vec<_>>(),
            "schedule": schedule,
            "complete_time_ms": self.complete_time_ms
        })
    }
}
