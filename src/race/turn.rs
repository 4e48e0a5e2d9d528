//! Race Entry Points
//!
//! The functions collaborators call. Each one takes a snapshot by reference
//! and hands back a new one together with the events it produced:
//!
//! - [`initialize`]: fixture to first state
//! - [`advance_group`]: leadership, movement, capacity for one group
//! - [`resolve_sprints`]: place riders that crossed the line
//! - [`next_round`] and [`play_round`]: round lifecycle helpers
//!
//! Randomness is always injected; nothing here reads a clock or global RNG.

use serde::{Serialize, Deserialize};
use tracing::{debug, info, instrument, warn};

use crate::core::rng::RandomSource;
use crate::race::ai::{self, LeadershipTuning, PaceTuning};
use crate::race::capacity::{self, CapacityConfig};
use crate::race::deck;
use crate::race::error::RaceError;
use crate::race::events::{RaceEvent, RaceEventData};
use crate::race::fixture::Fixture;
use crate::race::movement::{self, MovementConfig};
use crate::race::sprint::{self, SprintConfig};
use crate::race::state::RaceState;
use crate::race::stats::{self, StatsConfig};
use crate::race::track::Track;

/// Every tunable the engine reads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    /// Card selection, slipstream and hand bookkeeping.
    pub movement: MovementConfig,
    /// Leadership estimator.
    pub leadership: LeadershipTuning,
    /// Pace selector.
    pub pace: PaceTuning,
    /// Tile capacity cascade.
    pub capacity: CapacityConfig,
    /// Finish timing and sprint score.
    pub sprint: SprintConfig,
    /// Derived per-round stats.
    pub stats: StatsConfig,
}

impl RaceConfig {
    /// Parse a config from JSON. Missing sections and fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, RaceError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Output of an entry point.
#[derive(Clone, Debug)]
pub struct TurnResult {
    /// The new snapshot.
    pub state: RaceState,
    /// Events produced by this call, in order.
    pub events: Vec<RaceEvent>,
}

impl TurnResult {
    fn from_state(mut state: RaceState) -> Self {
        let events = state.take_events();
        Self { state, events }
    }
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Build the first race state from a fixture.
///
/// Fails on a malformed track, an empty field or an unusable rider.
/// Groups are assigned by position unless every seed names one.
#[instrument(skip_all, fields(round = fixture.round))]
pub fn initialize(
    fixture: &Fixture,
    rng: &mut dyn RandomSource,
    config: &RaceConfig,
) -> Result<TurnResult, RaceError> {
    let track = Track::parse(&fixture.track)?;
    if fixture.riders.is_empty() {
        return Err(RaceError::EmptyField);
    }

    let mut state = RaceState::new(track, fixture.round);
    for (name, seed) in &fixture.riders {
        let mut rider = seed.to_rider(name, rng)?;
        rider.fatigue = deck::fatigue_score(
            &rider.hand,
            &rider.discard,
            config.movement.penalty_weight,
            config.movement.fatigue_weight,
        );
        state.riders.insert(name.clone(), rider);
    }
    if fixture.riders.values().any(|seed| seed.group.is_none()) {
        state.regroup();
    }
    stats::refresh_stats(&mut state, &config.stats);

    let riders = state.riders.len() as u32;
    let groups = state.group_order().len() as u32;
    let finish = state.track.finish_index();
    info!(riders, groups, finish, "race initialized");
    state.push_event(RaceEventData::RaceInitialized { riders, finish, groups });
    state.trace_hash("initialize");

    Ok(TurnResult::from_state(state))
}

/// Resolve one group's turn: leadership, movement, capacity.
///
/// An unknown or empty group is a logged warning, not a fault.
#[instrument(skip(state, rng, config), fields(round = state.round))]
pub fn advance_group(
    state: &RaceState,
    group: u32,
    rng: &mut dyn RandomSource,
    config: &RaceConfig,
) -> Result<TurnResult, RaceError> {
    if state.riders.is_empty() {
        return Err(RaceError::EmptyField);
    }
    let mut next = state.clone();
    next.pending_events.clear();
    run_group(&mut next, group, rng, config);
    Ok(TurnResult::from_state(next))
}

/// Place riders that crossed the line, for one group or all of them.
#[instrument(skip(state, rng, config), fields(round = state.round))]
pub fn resolve_sprints(
    state: &RaceState,
    group: Option<u32>,
    rng: &mut dyn RandomSource,
    config: &RaceConfig,
) -> TurnResult {
    let mut next = state.clone();
    next.pending_events.clear();
    let placed = sprint::resolve(&mut next, group, rng, &config.sprint);
    if placed > 0 {
        next.trace_hash("resolve_sprints");
    }
    TurnResult::from_state(next)
}

/// Open the next round: clear intents, regroup, refresh stats.
#[instrument(skip(state, config), fields(round = state.round))]
pub fn next_round(state: &RaceState, config: &RaceConfig) -> TurnResult {
    let mut next = state.clone();
    next.pending_events.clear();
    start_round(&mut next, config);
    TurnResult::from_state(next)
}

/// Play a whole round: every group front to back, sprints, then the next round.
#[instrument(skip(state, rng, config), fields(round = state.round))]
pub fn play_round(
    state: &RaceState,
    rng: &mut dyn RandomSource,
    config: &RaceConfig,
) -> Result<TurnResult, RaceError> {
    if state.riders.is_empty() {
        return Err(RaceError::EmptyField);
    }
    let mut next = state.clone();
    next.pending_events.clear();

    // Group keys are fixed for the round; later groups may catch earlier ones
    for group in next.group_order() {
        run_group(&mut next, group, rng, config);
    }
    sprint::resolve(&mut next, None, rng, &config.sprint);
    start_round(&mut next, config);

    Ok(TurnResult::from_state(next))
}

// =============================================================================
// STAGES
// =============================================================================

fn run_group(state: &mut RaceState, group: u32, rng: &mut dyn RandomSource, config: &RaceConfig) {
    let members = state.group_members(group);
    if members.is_empty() {
        warn!(group, "no active riders in group");
        state.push_event(RaceEventData::UnknownGroup { group });
        return;
    }

    ai::decide_group(state, &members, rng, &config.leadership, &config.pace);
    let turn = movement::move_group(state, group, &members, rng, &config.movement);
    let report = capacity::enforce(state, &turn, rng, &config.capacity);
    movement::finalize_turn(state, &turn);

    debug!(
        group,
        pace = turn.pace,
        riders = members.len(),
        attack = turn.attack_happened,
        pushes = report.pushes,
        "group turn resolved"
    );
    state.trace_hash("advance_group");
}

fn start_round(state: &mut RaceState, config: &RaceConfig) {
    state.round += 1;
    for rider in state.riders.values_mut() {
        rider.clear_intent();
    }
    state.round_moves.clear();
    state.regroup();
    stats::refresh_stats(state, &config.stats);

    let groups = state.group_order().len() as u32;
    let active = state.active_count();
    state.push_event(RaceEventData::RoundStarted { groups, active });
}

// =============================================================================
// TESTS
// =============================================================================
