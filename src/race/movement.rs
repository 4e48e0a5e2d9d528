//! Movement Resolver
//!
//! Advances one group through its phases in order:
//! non-attackers select and move, attackers select and move, then
//! slipstream catch-up. Capacity enforcement runs afterwards on the
//! returned [`GroupTurn`], and [`finalize_turn`] closes it.
//!
//! Card selection and hand bookkeeping live here too.

use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use crate::core::rng::RandomSource;
use crate::race::card::Card;
use crate::race::deck;
use crate::race::events::RaceEventData;
use crate::race::rider::{AttackStatus, LeadIntent, Rider};
use crate::race::state::{GroupMove, RaceState};
use crate::race::track::Track;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Movement rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Group pace when nobody declared a lead.
    pub leaderless_pace: u32,
    /// Free fields from slipstream per class (narrow, climb, mixed, open).
    pub slipstream_fields: [u32; 4],
    /// Hand size below which the discard is merged back.
    pub reshuffle_threshold: usize,
    /// Card numbers that cost a leader a second fatigue card.
    pub fatigue_card_range: (u8, u8),
    /// Extra fields for the fastest attacker.
    pub attack_bonus: u32,
    /// Weight of a penalty card in the fatigue score.
    pub penalty_weight: f64,
    /// Weight of a fatigue card in the fatigue score.
    pub fatigue_weight: f64,
    /// Largest required value for which the synthetic card is offered.
    pub synthetic_max_required: u32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            leaderless_pace: 2,
            slipstream_fields: [0, 0, 1, 2],
            reshuffle_threshold: 6,
            fatigue_card_range: (3, 8),
            attack_bonus: 1,
            penalty_weight: 1.5,
            fatigue_weight: 1.0,
            synthetic_max_required: 2,
        }
    }
}

impl MovementConfig {
    /// Slipstream fields on the stretch `[from, to]`.
    pub fn slipstream(&self, track: &Track, from: u32, to: u32) -> u32 {
        self.slipstream_fields[track.slipstream_class(from, to).index()]
    }
}

// =============================================================================
// CARD SELECTION
// =============================================================================

/// What the rider needs from its card this turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardRequest {
    /// Declared pace leader committing to `target`.
    Leader {
        /// Declared pace.
        target: u32,
    },
    /// Declared attacker committing to `target`.
    Attack {
        /// Declared attack value.
        target: u32,
    },
    /// Anyone else: at least `required` keeps the rider on the wheel.
    Follow {
        /// Minimum effective value needed.
        required: u32,
    },
}

impl CardRequest {
    fn target(self) -> Option<u32> {
        match self {
            CardRequest::Leader { target } | CardRequest::Attack { target } => Some(target),
            CardRequest::Follow { .. } => None,
        }
    }

    fn required(self) -> u32 {
        match self {
            CardRequest::Leader { target } | CardRequest::Attack { target } => target,
            CardRequest::Follow { required } => required,
        }
    }
}

/// Where the selected card comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardSource {
    /// Index into the hand. Beyond the active four only for a penalty draw.
    Hand(usize),
    /// Synthetic minimum-guarantee card; nothing leaves the hand for it.
    Synthetic,
}

/// A selected card and the value it moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    /// Card origin.
    pub source: CardSource,
    /// The card itself.
    pub card: Card,
    /// Effective value after terrain and penalties.
    pub value: u32,
    /// Active four held only penalties; a deeper card was substituted.
    pub penalty_draw: bool,
    /// Came from the rider's planned card.
    pub planned: bool,
}

/// Choose the card a rider plays.
///
/// Planned card first, then exact/smallest-sufficient for declared
/// leaders, then greedy. Penalty cards are never selected. Returns `None`
/// when no legal card exists anywhere in the hand.
pub fn choose_card(rider: &Rider, track: &Track, request: CardRequest, config: &MovementConfig) -> Option<Selection> {
    let penalties = rider.active_penalties();
    let value_of = |card: Card| track.effective_value(card, rider.position, penalties);
    let active = rider.active_four();
    let pick = |idx: usize, planned: bool| Selection {
        source: CardSource::Hand(idx),
        card: active[idx],
        value: value_of(active[idx]),
        penalty_draw: false,
        planned,
    };

    if let Some(plan) = rider.planned {
        if let Some(idx) = active.iter().position(|c| c.kind == plan.card && !c.is_penalty()) {
            let accepted = match request.target() {
                Some(target) => plan.forced || value_of(active[idx]) >= target,
                None => true,
            };
            if accepted {
                return Some(pick(idx, true));
            }
        }
    }

    let playable: Vec<(usize, u32)> = active
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_penalty())
        .map(|(i, c)| (i, value_of(*c)))
        .collect();

    if let Some(target) = request.target() {
        if let Some(&(idx, _)) = playable.iter().find(|(_, v)| *v == target) {
            return Some(pick(idx, false));
        }
        let smallest = playable
            .iter()
            .filter(|(_, v)| *v >= target)
            .min_by_key(|(i, v)| (*v, std::cmp::Reverse(active[*i].greedy_rank())));
        if let Some(&(idx, _)) = smallest {
            return Some(pick(idx, false));
        }
    }

    // Greedy
    let required = request.required();
    let mut pool: Vec<Selection> = playable.iter().map(|(i, _)| pick(*i, false)).collect();
    if required <= config.synthetic_max_required && !deck::has_fatigue(&rider.hand) {
        let card = Card::synthetic_boost();
        pool.push(Selection {
            source: CardSource::Synthetic,
            card,
            value: value_of(card),
            penalty_draw: false,
            planned: false,
        });
    }

    if pool.is_empty() {
        // Dead draw: substitute the best non-penalty card from the whole hand
        return rider
            .hand
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_penalty())
            .map(|(i, c)| (i, *c, value_of(*c)))
            .max_by_key(|(i, c, v)| (*v, c.greedy_rank(), std::cmp::Reverse(*i)))
            .map(|(idx, card, value)| Selection {
                source: CardSource::Hand(idx),
                card,
                value,
                penalty_draw: true,
                planned: false,
            });
    }

    let meeting = pool
        .iter()
        .filter(|s| s.value >= required)
        .max_by_key(|s| (s.card.greedy_rank(), std::cmp::Reverse(s.value)));
    match meeting {
        Some(selection) => Some(*selection),
        None => pool
            .iter()
            .max_by_key(|s| (s.value, s.card.greedy_rank()))
            .copied(),
    }
}

// =============================================================================
// HAND BOOKKEEPING
// =============================================================================

/// Cards added or converted by one play.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlayLedger {
    /// Fatigue cards added to the discard.
    pub fatigue_added: u32,
    /// Penalty cards added to hand or discard.
    pub penalties_added: u32,
    /// Penalty cards turned into fatigue on discard.
    pub converted: u32,
    /// Discard was merged back into the hand.
    pub reshuffled: bool,
}

impl PlayLedger {
    /// Net change in the rider's total card count.
    pub fn added(&self) -> u32 {
        self.fatigue_added + self.penalties_added
    }
}

/// Apply a selection to a rider's piles.
///
/// The played card moves to the spent pile and the rest of the active four
/// to the discard. Costs are added according to the rider's role this turn.
pub fn apply_play(
    rider: &mut Rider,
    selection: &Selection,
    intent: LeadIntent,
    config: &MovementConfig,
    rng: &mut dyn RandomSource,
) -> PlayLedger {
    let mut ledger = PlayLedger::default();
    let active_len = rider.hand.len().min(deck::ACTIVE_CARDS);
    let mut active: Vec<Card> = rider.hand.drain(..active_len).collect();

    match selection.source {
        CardSource::Hand(idx) if idx < active_len => rider.spent.push(active.remove(idx)),
        CardSource::Hand(idx) if idx - active_len < rider.hand.len() => {
            let card = rider.hand.remove(idx - active_len);
            rider.spent.push(card);
        }
        CardSource::Hand(_) | CardSource::Synthetic => {}
    }

    for card in active {
        if card.is_penalty() {
            ledger.converted += 1;
        }
        rider.discard.push(card.discarded());
    }

    if intent.is_declared() {
        rider.discard.push(Card::fatigue());
        ledger.fatigue_added += 1;
        let (lo, hi) = config.fatigue_card_range;
        if selection.card.number().is_some_and(|n| (lo..=hi).contains(&n)) {
            rider.discard.push(Card::fatigue());
            ledger.fatigue_added += 1;
        }
    }
    if selection.penalty_draw {
        rider.hand.insert(0, Card::penalty());
        ledger.penalties_added += 1;
    }
    if intent == LeadIntent::Attack {
        rider.hand.insert(0, Card::penalty());
        rider.discard.push(Card::penalty());
        ledger.penalties_added += 2;
    }

    if rider.hand.len() < config.reshuffle_threshold {
        deck::reshuffle_discard(&mut rider.hand, &mut rider.discard, rng);
        ledger.reshuffled = true;
    }

    rider.fatigue = deck::fatigue_score(&rider.hand, &rider.discard, config.penalty_weight, config.fatigue_weight);
    ledger
}

// =============================================================================
// GROUP TURN
// =============================================================================

/// One rider's line in a group turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnEntry {
    /// Rider name.
    pub name: String,
    /// Position before moving.
    pub start: u32,
    /// Group speed of the rider's previous turn.
    pub prior_speed: u32,
    /// Effective value of the played card.
    pub played_value: u32,
    /// Fields gained before capacity enforcement.
    pub gain: u32,
    /// Declared pace leader or attacker.
    pub leader: bool,
    /// Declared attacker.
    pub attacker: bool,
    /// False when the rider was skipped.
    pub moved: bool,
}

impl TurnEntry {
    /// Position after moving, before capacity enforcement.
    #[inline]
    pub fn end(&self) -> u32 {
        self.start + self.gain
    }
}

/// The explicit working set of one group's turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupTurn {
    /// Group key.
    pub group: u32,
    /// Group pace.
    pub pace: u32,
    /// Riders in the order they moved.
    pub entries: Vec<TurnEntry>,
    /// At least one attacker moved.
    pub attack_happened: bool,
}

impl GroupTurn {
    /// Entry for a rider.
    pub fn entry(&self, name: &str) -> Option<&TurnEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Riders that actually moved.
    pub fn movers(&self) -> impl Iterator<Item = &TurnEntry> {
        self.entries.iter().filter(|e| e.moved)
    }
}

/// Split roster into declared pace leaders, followers and attackers.
fn partition(state: &RaceState, members: &[String]) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut leaders: Vec<(&String, u32)> = Vec::new();
    let mut followers = Vec::new();
    let mut attackers = Vec::new();
    for name in members {
        let Some(rider) = state.rider(name) else { continue };
        match rider.takes_lead {
            LeadIntent::Attack if rider.selected_value > 0 => attackers.push(name.clone()),
            LeadIntent::Pace if rider.selected_value > 0 => leaders.push((name, rider.selected_value)),
            _ => followers.push(name.clone()),
        }
    }
    // Stable: roster order among equal values
    leaders.sort_by(|a, b| b.1.cmp(&a.1));
    let leaders = leaders.into_iter().map(|(n, _)| n.clone()).collect();
    (leaders, followers, attackers)
}

fn intent_of(state: &RaceState, name: &str) -> (LeadIntent, u32) {
    state
        .rider(name)
        .map(|r| (r.takes_lead, r.selected_value))
        .unwrap_or((LeadIntent::None, 0))
}

/// Select, play and move one rider. Returns `None` if the rider is skipped.
fn play_rider(
    state: &mut RaceState,
    name: &str,
    request: CardRequest,
    intent: LeadIntent,
    config: &MovementConfig,
    rng: &mut dyn RandomSource,
) -> Option<Selection> {
    let track = state.track.clone();
    let rider = state.rider(name)?;
    let Some(selection) = choose_card(rider, &track, request, config) else {
        let reason = format!(
            "no playable card (hand {}, discard {}, needs {})",
            rider.hand.len(),
            rider.discard.len(),
            request.required()
        );
        warn!(rider = name, %reason, "unplayable rider");
        state.push_event(RaceEventData::Unplayable { rider: name.to_string(), reason });
        return None;
    };

    let rider = state.rider_mut(name)?;
    let ledger = apply_play(rider, &selection, intent, config, rng);
    rider.planned = None;
    let hand = rider.hand.len() as u32;

    debug!(
        rider = name, card = %selection.card, value = selection.value,
        fatigue_added = ledger.fatigue_added, penalties_added = ledger.penalties_added,
        "card played"
    );
    if selection.penalty_draw {
        state.push_event(RaceEventData::PenaltySubstituted {
            rider: name.to_string(),
            substitute: selection.card,
        });
    }
    if ledger.reshuffled {
        state.push_event(RaceEventData::Reshuffled { rider: name.to_string(), hand });
    }
    Some(selection)
}

/// Furthest already-moved position a rider can reach from `start`.
fn catch_target(track: &Track, moved: &[u32], start: u32, value: u32, config: &MovementConfig) -> Option<u32> {
    moved
        .iter()
        .copied()
        .filter(|&t| t > start + value && t <= start + value + config.slipstream(track, start, t))
        .max()
}

/// Gain for a rider that is not the fastest attacker.
fn follow_gain(
    state: &mut RaceState,
    name: &str,
    start: u32,
    value: u32,
    pace: u32,
    moved: &[u32],
    config: &MovementConfig,
) -> u32 {
    let slip = config.slipstream(&state.track, start, start + pace);
    if value >= pace || value + slip >= pace {
        return pace;
    }
    match catch_target(&state.track, moved, start, value, config) {
        Some(target) => {
            state.push_event(RaceEventData::Caught { rider: name.to_string(), position: target });
            target - start
        }
        None => value,
    }
}

/// Move a rider and record the turn line.
fn place(state: &mut RaceState, entry: &TurnEntry, pace: u32, card: Card) {
    if let Some(rider) = state.rider_mut(&entry.name) {
        rider.previous_position = Some(entry.start);
        rider.position = entry.end();
        rider.move_distance_for_prel = entry.gain;
        rider.last_group_speed = pace;
        rider.played_value = entry.played_value;
        rider.fields_moved = entry.gain;
    }
    state.push_event(RaceEventData::CardPlayed {
        rider: entry.name.clone(),
        card,
        value: entry.played_value,
        from: entry.start,
        to: entry.end(),
    });
}

fn skipped(state: &RaceState, name: &str, leader: bool, attacker: bool) -> TurnEntry {
    let rider = state.rider(name);
    TurnEntry {
        name: name.to_string(),
        start: rider.map_or(0, |r| r.position),
        prior_speed: rider.map_or(0, |r| r.last_group_speed),
        played_value: 0,
        gain: 0,
        leader,
        attacker,
        moved: false,
    }
}

/// Run the movement phases for one group.
///
/// Intents must already be decided. Riders are moved in place; the returned
/// turn lists every member in the order it moved.
pub fn move_group(
    state: &mut RaceState,
    group: u32,
    members: &[String],
    rng: &mut dyn RandomSource,
    config: &MovementConfig,
) -> GroupTurn {
    let (leaders, followers, attackers) = partition(state, members);
    let pace = leaders
        .first()
        .map(|n| intent_of(state, n).1)
        .unwrap_or(config.leaderless_pace);
    let moved: Vec<u32> = state
        .round_moves
        .iter()
        .filter(|m| m.round == state.round)
        .map(|m| m.position)
        .collect();

    let mut turn = GroupTurn { group, pace, entries: Vec::new(), attack_happened: false };

    // Non-attackers: leaders first
    for name in leaders.iter().chain(followers.iter()) {
        let (intent, selected) = intent_of(state, name);
        let is_leader = intent == LeadIntent::Pace && selected > 0;
        let Some(rider) = state.rider(name) else { continue };
        let start = rider.position;
        let prior_speed = rider.last_group_speed;
        let request = if is_leader {
            CardRequest::Leader { target: selected }
        } else {
            let slip = config.slipstream(&state.track, start, start + pace);
            CardRequest::Follow { required: pace.saturating_sub(slip) }
        };
        let lead = if is_leader { LeadIntent::Pace } else { LeadIntent::None };

        let Some(selection) = play_rider(state, name, request, lead, config, rng) else {
            turn.entries.push(skipped(state, name, is_leader, false));
            continue;
        };
        let gain = follow_gain(state, name, start, selection.value, pace, &moved, config);
        let entry = TurnEntry {
            name: name.clone(),
            start,
            prior_speed,
            played_value: selection.value,
            gain,
            leader: is_leader,
            attacker: false,
            moved: true,
        };
        place(state, &entry, pace, selection.card);
        turn.entries.push(entry);
    }

    // Attackers: select all, then move fastest first
    let mut attacks: Vec<(String, u32, u32, Selection)> = Vec::new();
    for name in &attackers {
        let (_, selected) = intent_of(state, name);
        let Some(rider) = state.rider(name) else { continue };
        let (start, prior_speed) = (rider.position, rider.last_group_speed);
        match play_rider(state, name, CardRequest::Attack { target: selected }, LeadIntent::Attack, config, rng) {
            Some(selection) => attacks.push((name.clone(), start, prior_speed, selection)),
            None => turn.entries.push(skipped(state, name, true, true)),
        }
    }
    attacks.sort_by(|a, b| b.3.value.cmp(&a.3.value).then_with(|| a.0.cmp(&b.0)));

    let finish = state.track.finish_index();
    for (i, (name, start, prior_speed, selection)) in attacks.iter().enumerate() {
        let value = selection.value;
        let mut gain = if value >= pace {
            value
        } else {
            follow_gain(state, name, *start, value, pace, &moved, config)
        };

        if i == 0 {
            let target = start + value + config.attack_bonus;
            let denied = if value < pace {
                Some("below group pace")
            } else if target >= finish {
                Some("would reach the finish")
            } else if target + state.track.descents_between(*start, target) >= finish {
                Some("descent would carry it over the line")
            } else {
                None
            };
            match denied {
                Some(reason) => state.push_event(RaceEventData::AttackBonusDenied {
                    rider: name.clone(),
                    reason: reason.to_string(),
                }),
                None => {
                    gain += config.attack_bonus;
                    state.push_event(RaceEventData::AttackBonus { rider: name.clone(), position: start + gain });
                }
            }
        }

        let entry = TurnEntry {
            name: name.clone(),
            start: *start,
            prior_speed: *prior_speed,
            played_value: value,
            gain,
            leader: true,
            attacker: true,
            moved: true,
        };
        place(state, &entry, pace, selection.card);
        turn.entries.push(entry);
    }
    turn.attack_happened = !attacks.is_empty();

    for entry in &turn.entries {
        if let Some(rider) = state.rider_mut(&entry.name) {
            rider.attacking_status = if entry.attacker && entry.moved {
                AttackStatus::Attacker
            } else if turn.attack_happened {
                AttackStatus::WasAttacked
            } else {
                AttackStatus::None
            };
        }
    }

    post_adjust(state, &mut turn, &moved, config);
    turn
}

/// Slipstream catch-up: riders left short of the pace are pulled to the
/// nearest reachable moved position.
fn post_adjust(state: &mut RaceState, turn: &mut GroupTurn, moved: &[u32], config: &MovementConfig) {
    let mut targets: Vec<u32> = moved.to_vec();
    targets.extend(turn.movers().map(|e| e.end()));

    let pace = turn.pace;
    for entry in turn.entries.iter_mut().filter(|e| e.moved && e.gain < pace) {
        let reach = entry.start + entry.played_value + config.slipstream(&state.track, entry.start, entry.start + pace);
        let nearest = targets
            .iter()
            .copied()
            .filter(|&p| p > entry.end() && p <= reach)
            .min();
        let Some(to) = nearest else { continue };

        let from = entry.end();
        entry.gain = to - entry.start;
        if let Some(rider) = state.rider_mut(&entry.name) {
            rider.position = to;
            rider.move_distance_for_prel = entry.gain;
            rider.fields_moved = entry.gain;
        }
        state.push_event(RaceEventData::PulledForward { rider: entry.name.clone(), from, to });
    }
}

/// Close a group turn after capacity enforcement.
///
/// Records final distances, marks finishers and remembers where the group
/// ended so later groups can catch it.
pub fn finalize_turn(state: &mut RaceState, turn: &GroupTurn) {
    let finish = state.track.finish_index();
    let mut front = 0;
    let mut finishers = Vec::new();

    for entry in turn.movers() {
        let Some(rider) = state.rider_mut(&entry.name) else { continue };
        let gain = rider.position.saturating_sub(entry.start);
        rider.move_distance_for_prel = gain;
        rider.fields_moved = gain;
        front = front.max(rider.position);
        if rider.position >= finish && !rider.finished {
            rider.finished = true;
            finishers.push((entry.name.clone(), rider.position));
        }
    }

    for (rider, position) in finishers {
        state.push_event(RaceEventData::RiderFinished { rider, position });
    }

    let riders = turn.movers().count() as u32;
    if riders > 0 {
        state.round_moves.push(GroupMove {
            group: turn.group,
            position: front,
            pace: turn.pace,
            round: state.round,
        });
    }
    state.push_event(RaceEventData::GroupMoved { group: turn.group, pace: turn.pace, riders });
}
