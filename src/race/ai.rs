//! AI Heuristics
//!
//! Two cooperating decisions per rider and turn:
//! - the leadership estimator picks sit-in, pace or attack from one draw
//! - the pace selector picks the magnitude a declared leader commits to
//!
//! The estimator is the only consumer of randomness here.

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::rng::{RandomSource, draw};
use crate::race::events::RaceEventData;
use crate::race::rider::{AttackStatus, LeadIntent, Rider};
use crate::race::state::RaceState;
use crate::race::track::{SlipstreamClass, Track};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Tunable constants of the leadership estimator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadershipTuning {
    /// Base attack propensity.
    pub attack_base: f64,
    /// Exponent on favoritism relative to the field mean.
    pub favoritism_exponent: f64,
    /// Remaining distance at which the distance factor halves.
    pub distance_reference: f64,
    /// Exponent on the number of other riders in the group.
    pub group_size_exponent: f64,
    /// Attack multiplier per slipstream class (narrow, climb, mixed, open).
    pub terrain_attack_bonus: [f64; 4],
    /// Fields ahead read for the terrain class.
    pub lookahead: u32,
    /// Mentality of an average rider.
    pub mentality_reference: f64,
    /// Exponent on relative mentality.
    pub mentality_exponent: f64,
    /// Exponent on the flat/climb aptitude ratio.
    pub aptitude_exponent: f64,
    /// Multiplier for a rider that attacked last turn.
    pub repeat_attack_damping: f64,
    /// Base pace propensity.
    pub pace_base: f64,
    /// Weight of rival strength in groups ahead.
    pub chase_weight: f64,
    /// Weight of rival strength in groups behind.
    pub defend_weight: f64,
    /// Exponent on freshness (one minus fatigue).
    pub fatigue_exponent: f64,
    /// Card value of an average pace.
    pub best_card_reference: f64,
    /// Multiplier when others already claimed at least this rider's best pace.
    pub claimed_pace_damping: f64,
    /// Multiplier after the group was attacked.
    pub was_attacked_bonus: f64,
}

impl Default for LeadershipTuning {
    fn default() -> Self {
        Self {
            attack_base: 0.08,
            favoritism_exponent: 1.5,
            distance_reference: 20.0,
            group_size_exponent: 0.5,
            terrain_attack_bonus: [1.6, 1.8, 1.2, 0.7],
            lookahead: 6,
            mentality_reference: 5.0,
            mentality_exponent: 1.0,
            aptitude_exponent: 1.5,
            repeat_attack_damping: 0.3,
            pace_base: 0.6,
            chase_weight: 1.0,
            defend_weight: 0.5,
            fatigue_exponent: 2.0,
            best_card_reference: 6.0,
            claimed_pace_damping: 0.3,
            was_attacked_bonus: 1.5,
        }
    }
}

/// Tunable constants of the pace selector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaceTuning {
    /// Ideal move for an attacker.
    pub attack_ideal: f64,
    /// Ideal move for a pace leader before adjustments.
    pub base_ideal: f64,
    /// Ideal gained per unit of pace probability.
    pub propensity_gain: f64,
    /// Distance to the finish where the push term starts.
    pub finish_push_distance: u32,
    /// Ideal gained at the finish line.
    pub finish_push_gain: f64,
    /// Weight of outrunning the best teammate.
    pub teammate_weight: f64,
}

impl Default for PaceTuning {
    fn default() -> Self {
        Self {
            attack_ideal: 12.0,
            base_ideal: 4.0,
            propensity_gain: 4.0,
            finish_push_distance: 10,
            finish_push_gain: 3.0,
            teammate_weight: 0.5,
        }
    }
}

// =============================================================================
// LEADERSHIP ESTIMATOR
// =============================================================================

/// Output of the leadership estimator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeadershipDecision {
    /// Chosen intent.
    pub intent: LeadIntent,
    /// Attack probability after `x / (1 + x)`.
    pub attack_probability: f64,
    /// Pace probability after `x / (1 + x)`.
    pub pace_probability: f64,
    /// The draw consumed. `None` on the fast path.
    pub draw: Option<f64>,
}

impl LeadershipDecision {
    fn sit_in() -> Self {
        Self { intent: LeadIntent::None, attack_probability: 0.0, pace_probability: 0.0, draw: None }
    }
}

/// Convert a propensity to a probability.
#[inline]
pub fn to_probability(x: f64) -> f64 {
    if x.is_finite() && x > 0.0 {
        x / (1.0 + x)
    } else {
        0.0
    }
}

/// Best effective value among the non-penalty cards of the active four.
pub fn best_value(rider: &Rider, track: &Track) -> u32 {
    let penalties = rider.active_penalties();
    rider
        .active_four()
        .iter()
        .filter(|c| !c.is_penalty())
        .map(|c| track.effective_value(*c, rider.position, penalties))
        .max()
        .unwrap_or(0)
}

#[inline]
fn ratio(num: f64, den: f64) -> f64 {
    num / den.max(1.0)
}

/// Decide whether `name` sits in, sets pace, or attacks.
///
/// `members` is the rider's group roster. Intents already declared by
/// earlier members of the roster are visible through `state`.
pub fn evaluate_leadership(
    state: &RaceState,
    name: &str,
    members: &[String],
    rng: &mut dyn RandomSource,
    tuning: &LeadershipTuning,
) -> LeadershipDecision {
    let Some(rider) = state.rider(name) else {
        return LeadershipDecision::sit_in();
    };
    let group: Vec<&Rider> = members.iter().filter_map(|m| state.rider(m)).collect();

    // Fast path: team holds the whole group
    if group.iter().all(|r| r.team == rider.team) {
        return LeadershipDecision {
            intent: LeadIntent::Pace,
            attack_probability: 0.0,
            pace_probability: 1.0,
            draw: None,
        };
    }

    let track = &state.track;
    let group_size = group.len() as f64;
    let teammates = group.iter().filter(|r| r.team == rider.team).count() as f64;
    let remaining = track.remaining(rider.position);

    let attack = if remaining == 0 {
        0.0
    } else {
        attack_propensity(state, rider, group_size, teammates, remaining, tuning)
    };
    let pace = pace_propensity(state, rider, &group, teammates, tuning);

    let attack_probability = to_probability(attack);
    let pace_probability = to_probability(pace);

    let r = draw(rng);
    let intent = if r < attack_probability {
        LeadIntent::Attack
    } else if r < attack_probability + (1.0 - attack_probability) * pace_probability {
        LeadIntent::Pace
    } else {
        LeadIntent::None
    };

    debug!(
        rider = name,
        attack, pace, attack_probability, pace_probability, draw = r, ?intent,
        "leadership"
    );

    LeadershipDecision { intent, attack_probability, pace_probability, draw: Some(r) }
}

fn attack_propensity(
    state: &RaceState,
    rider: &Rider,
    group_size: f64,
    teammates: f64,
    remaining: u32,
    tuning: &LeadershipTuning,
) -> f64 {
    let track = &state.track;
    let (sum, count) = state
        .active_riders()
        .fold((0.0, 0u32), |(s, n), r| (s + r.favoritism_score, n + 1));
    let mean_fav = if count > 0 && sum > 0.0 { sum / f64::from(count) } else { 1.0 };

    let favoritism = (rider.favoritism_score.max(0.0) / mean_fav).powf(tuning.favoritism_exponent);
    let distance = tuning.distance_reference / (f64::from(remaining) + tuning.distance_reference);
    let size = (group_size - 1.0).max(0.0).powf(tuning.group_size_exponent);

    let class = track.slipstream_class(rider.position, rider.position + tuning.lookahead);
    let terrain = tuning.terrain_attack_bonus[class.index()];
    let team = 1.0 / teammates.max(1.0);
    let mentality = ratio(rider.mentality, tuning.mentality_reference).powf(tuning.mentality_exponent);
    let aptitude = if class <= SlipstreamClass::Climb {
        ratio(rider.climb, rider.flat)
    } else {
        ratio(rider.flat, rider.climb)
    }
    .powf(tuning.aptitude_exponent);

    let mut x = tuning.attack_base * favoritism * distance * size * terrain * team * mentality * aptitude;
    if rider.attacking_status == AttackStatus::Attacker {
        x *= tuning.repeat_attack_damping;
    }
    x
}

fn pace_propensity(
    state: &RaceState,
    rider: &Rider,
    group: &[&Rider],
    teammates: f64,
    tuning: &LeadershipTuning,
) -> f64 {
    let group_size = group.len() as f64;
    let group_mass: f64 = group.iter().map(|r| r.win_chance).sum();
    let team_mass: f64 = group
        .iter()
        .filter(|r| r.team == rider.team)
        .map(|r| r.win_chance)
        .sum();
    let fair_share = teammates / group_size.max(1.0);
    let share = if group_mass > 0.0 { team_mass / group_mass } else { fair_share };

    let in_group = |r: &Rider| group.iter().any(|g| g.name == r.name);
    let (mut rival_ahead, mut team_ahead, mut rival_behind) = (0.0, 0.0, 0.0);
    for other in state.active_riders().filter(|r| !in_group(*r)) {
        let same_team = other.team == rider.team;
        if other.position > rider.position {
            if same_team {
                team_ahead += other.win_chance;
            } else {
                rival_ahead += other.win_chance;
            }
        } else if other.position < rider.position && !same_team {
            rival_behind += other.win_chance;
        }
    }

    let strength = share / fair_share.max(f64::EPSILON);
    let race = (1.0 + tuning.chase_weight * rival_ahead + tuning.defend_weight * rival_behind)
        / (1.0 + tuning.chase_weight * team_ahead);
    let freshness = (1.0 - rider.fatigue.clamp(0.0, 1.0)).powf(tuning.fatigue_exponent);
    let best = best_value(rider, &state.track);
    let card = f64::from(best) / tuning.best_card_reference;

    let mut x = tuning.pace_base * strength * race * freshness * card;

    let claimed = group
        .iter()
        .filter(|r| r.name != rider.name && r.takes_lead == LeadIntent::Pace)
        .map(|r| r.selected_value)
        .max()
        .unwrap_or(0);
    if claimed > 0 && claimed >= best {
        x *= tuning.claimed_pace_damping;
    }
    if rider.attacking_status == AttackStatus::WasAttacked {
        x *= tuning.was_attacked_bonus;
    }
    x
}

// =============================================================================
// PACE SELECTOR
// =============================================================================

/// Output of the pace selector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaceChoice {
    /// Selected magnitude. 0 means the rider does not lead after all.
    pub value: u32,
    /// Target the selector aimed at.
    pub ideal: f64,
    /// Set when the value was dropped below another team's declared pace.
    pub suppressed_by: Option<u32>,
}

/// Ideal move for a declared leader.
pub fn ideal_move(rider: &Rider, track: &Track, intent: LeadIntent, pace_probability: f64, tuning: &PaceTuning) -> f64 {
    match intent {
        LeadIntent::None => 0.0,
        LeadIntent::Attack => tuning.attack_ideal,
        LeadIntent::Pace if track.is_descent(rider.position) => 0.0,
        LeadIntent::Pace => {
            let remaining = track.remaining(rider.position);
            let push = if remaining < tuning.finish_push_distance && tuning.finish_push_distance > 0 {
                tuning.finish_push_gain
                    * (1.0 - f64::from(remaining) / f64::from(tuning.finish_push_distance))
            } else {
                0.0
            };
            tuning.base_ideal + tuning.propensity_gain * pace_probability + push
        }
    }
}

/// Pick the pace/attack magnitude for a declared leader.
pub fn select_pace_value(
    state: &RaceState,
    name: &str,
    members: &[String],
    intent: LeadIntent,
    pace_probability: f64,
    tuning: &PaceTuning,
) -> PaceChoice {
    let none = PaceChoice { value: 0, ideal: 0.0, suppressed_by: None };
    let Some(rider) = state.rider(name) else { return none };
    if !intent.is_declared() {
        return none;
    }

    let track = &state.track;
    let ideal = ideal_move(rider, track, intent, pace_probability, tuning);

    let group: Vec<&Rider> = members.iter().filter_map(|m| state.rider(m)).collect();
    let teammate_best = group
        .iter()
        .filter(|r| r.name != rider.name && r.team == rider.team)
        .map(|r| best_value(r, track))
        .max();

    let penalties = rider.active_penalties();
    let mut best: Option<(f64, u32)> = None;
    for card in rider.active_four().iter().filter(|c| !c.is_penalty()) {
        let value = track.effective_value(*card, rider.position, penalties);
        if value == 0 {
            continue;
        }
        let miss = f64::from(value) - ideal;
        let gap = teammate_best
            .map(|tb| f64::from(value.abs_diff(tb)))
            .unwrap_or(0.0);
        let error = miss * miss + tuning.teammate_weight * gap * gap;
        best = match best {
            Some((e, v)) if e < error || (e == error && v <= value) => Some((e, v)),
            _ => Some((error, value)),
        };
    }
    let Some((_, value)) = best else { return PaceChoice { ideal, ..none } };

    if intent == LeadIntent::Pace {
        let rival_pace = group
            .iter()
            .filter(|r| r.team != rider.team && r.takes_lead.is_declared())
            .map(|r| r.selected_value)
            .max()
            .unwrap_or(0);
        let class = track.slipstream_class(rider.position, rider.position + value);
        if rival_pace > 0 && value <= rival_pace && class != SlipstreamClass::Open {
            return PaceChoice { value: 0, ideal, suppressed_by: Some(rival_pace) };
        }
    }

    PaceChoice { value, ideal, suppressed_by: None }
}

// =============================================================================
// GROUP DECISIONS
// =============================================================================

/// Run both heuristics for every member of a group, in roster order.
///
/// Writes `takes_lead` and `selected_value` and records one event per decision.
pub fn decide_group(
    state: &mut RaceState,
    members: &[String],
    rng: &mut dyn RandomSource,
    leadership: &LeadershipTuning,
    pace: &PaceTuning,
) {
    // Intents from an earlier turn must not count as claimed this turn
    for name in members {
        if let Some(rider) = state.rider_mut(name) {
            rider.takes_lead = LeadIntent::None;
            rider.selected_value = 0;
        }
    }

    for name in members {
        let decision = evaluate_leadership(state, name, members, rng, leadership);
        let choice = select_pace_value(state, name, members, decision.intent, decision.pace_probability, pace);

        let intent = if choice.value > 0 { decision.intent } else { LeadIntent::None };
        if let Some(rider) = state.rider_mut(name) {
            rider.takes_lead = intent;
            rider.selected_value = choice.value;
        }

        state.push_event(RaceEventData::LeadershipDecided {
            rider: name.clone(),
            intent: decision.intent,
            attack_probability: decision.attack_probability,
            pace_probability: decision.pace_probability,
            draw: decision.draw,
        });
        if let Some(rival_pace) = choice.suppressed_by {
            state.push_event(RaceEventData::PaceSuppressed {
                rider: name.clone(),
                value: choice.value,
                rival_pace,
            });
        } else if choice.value > 0 {
            state.push_event(RaceEventData::PaceSelected {
                rider: name.clone(),
                value: choice.value,
                ideal: choice.ideal,
            });
        } else if decision.intent.is_declared() {
            state.push_event(RaceEventData::LeadWithdrawn {
                rider: name.clone(),
                intent: decision.intent,
                reason: "no usable card in the active four".to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::card::Card;

    fn rider(name: &str, team: &str, position: u32, hand: Vec<Card>) -> Rider {
        let mut r = Rider::new(name, team);
        r.position = position;
        r.hand = hand;
        r.win_chance = 0.25;
        r.favoritism_score = 5.0;
        r
    }

    fn flat_hand() -> Vec<Card> {
        vec![
            Card::numbered(1, 9, 6),
            Card::numbered(5, 7, 5),
            Card::numbered(9, 5, 4),
            Card::numbered(13, 4, 3),
        ]
    }

    fn state_of(track: &str, riders: Vec<Rider>) -> (RaceState, Vec<String>) {
        let mut state = RaceState::new(Track::parse(track).unwrap(), 0);
        for r in riders {
            state.riders.insert(r.name.clone(), r);
        }
        let members = state.group_members(1);
        (state, members)
    }

    #[test]
    fn test_probability_transform() {
        assert_eq!(to_probability(0.0), 0.0);
        assert_eq!(to_probability(1.0), 0.5);
        assert_eq!(to_probability(-2.0), 0.0);
        assert_eq!(to_probability(f64::NAN), 0.0);
    }

    #[test]
    fn test_fast_path_leads_without_draw() {
        let (state, members) = state_of(
            "33333333333333F",
            vec![rider("A", "UAE", 2, flat_hand()), rider("B", "UAE", 2, flat_hand())],
        );
        let mut calls = 0;
        let mut source = || {
            calls += 1;
            0.99_f64
        };
        let decision = evaluate_leadership(&state, "A", &members, &mut source, &LeadershipTuning::default());
        assert_eq!(decision.intent, LeadIntent::Pace);
        assert_eq!(decision.draw, None);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_draw_thresholds() {
        let (state, members) = state_of(
            "33333333333333F",
            vec![rider("A", "UAE", 2, flat_hand()), rider("B", "Visma", 2, flat_hand())],
        );
        let tuning = LeadershipTuning::default();

        let low = evaluate_leadership(&state, "A", &members, &mut || 0.0_f64, &tuning);
        assert!(low.attack_probability > 0.0);
        assert_eq!(low.intent, LeadIntent::Attack);

        let high = evaluate_leadership(&state, "A", &members, &mut || 0.999_f64, &tuning);
        assert_eq!(high.intent, LeadIntent::None);
        assert_eq!(high.draw, Some(0.999));
    }

    #[test]
    fn test_decision_is_reproducible() {
        let (state, members) = state_of(
            "33311133333333F",
            vec![rider("A", "UAE", 2, flat_hand()), rider("B", "Visma", 2, flat_hand())],
        );
        let tuning = LeadershipTuning::default();
        let a = evaluate_leadership(&state, "B", &members, &mut || 0.37_f64, &tuning);
        let b = evaluate_leadership(&state, "B", &members, &mut || 0.37_f64, &tuning);
        assert_eq!(a, b);
    }

    #[test]
    fn test_pace_selector_minimizes_error() {
        let (state, members) = state_of("33333333333333F", vec![rider("A", "UAE", 0, flat_hand())]);
        let tuning = PaceTuning { base_ideal: 7.0, propensity_gain: 0.0, ..PaceTuning::default() };
        let choice = select_pace_value(&state, "A", &members, LeadIntent::Pace, 0.5, &tuning);
        assert_eq!(choice.value, 7);
        assert!((choice.ideal - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_pace_selector_ties_go_low() {
        let (state, members) = state_of("33333333333333F", vec![rider("A", "UAE", 0, flat_hand())]);
        let tuning = PaceTuning { base_ideal: 6.0, propensity_gain: 0.0, ..PaceTuning::default() };
        let choice = select_pace_value(&state, "A", &members, LeadIntent::Pace, 0.0, &tuning);
        assert_eq!(choice.value, 5);
    }

    #[test]
    fn test_descent_start_aims_for_smallest_card() {
        // Ideal drops to zero, but the floor of 5 still applies to every card.
        let (state, members) = state_of("3_333333333333F", vec![rider("A", "UAE", 1, flat_hand())]);
        let choice = select_pace_value(&state, "A", &members, LeadIntent::Pace, 0.9, &PaceTuning::default());
        assert_eq!(choice.ideal, 0.0);
        assert_eq!(choice.value, 5);
        assert_eq!(choice.suppressed_by, None);
    }

    #[test]
    fn test_teammate_gap_counts_both_ways() {
        // Teammate's best is 5. Sitting below it costs as much as running above it.
        let mate = rider("M", "UAE", 0, vec![Card::numbered(9, 5, 4), Card::numbered(13, 4, 3)]);
        let (state, members) = state_of("33333333333333F", vec![rider("A", "UAE", 0, flat_hand()), mate]);
        let tuning = PaceTuning { base_ideal: 4.0, propensity_gain: 0.0, teammate_weight: 2.0, ..PaceTuning::default() };
        let choice = select_pace_value(&state, "A", &members, LeadIntent::Pace, 0.0, &tuning);
        // 4: miss 0 + 2 * 1 = 2. 5: miss 1 + 0 = 1.
        assert_eq!(choice.value, 5);
    }

    #[test]
    fn test_stale_intents_are_cleared_before_deciding() {
        let tuning = LeadershipTuning::default();
        let (clean, members) = state_of(
            "11111111111111F",
            vec![rider("A", "UAE", 2, flat_hand()), rider("R", "Visma", 2, flat_hand())],
        );
        assert_eq!(members, vec!["A", "R"]);
        let expected = evaluate_leadership(&clean, "A", &members, &mut || 0.999_f64, &tuning);

        // R still carries last turn's pace of 9; A decides first and must not see it.
        let mut stale = rider("R", "Visma", 2, flat_hand());
        stale.takes_lead = LeadIntent::Pace;
        stale.selected_value = 9;
        let (mut state, _) = state_of("11111111111111F", vec![rider("A", "UAE", 2, flat_hand()), stale]);
        decide_group(&mut state, &members, &mut || 0.999_f64, &tuning, &PaceTuning::default());

        let seen = state
            .take_events()
            .into_iter()
            .find_map(|e| match e.data {
                RaceEventData::LeadershipDecided { rider, pace_probability, .. } if rider == "A" => Some(pace_probability),
                _ => None,
            })
            .unwrap();
        assert_eq!(seen, expected.pace_probability);
        assert_eq!(state.rider("R").unwrap().selected_value, 0);
    }

    #[test]
    fn test_withdrawn_lead_is_logged() {
        let hand = vec![Card::penalty(), Card::penalty(), Card::penalty(), Card::penalty(), Card::numbered(1, 9, 6)];
        let (mut state, members) = state_of(
            "33333333333333F",
            vec![rider("A", "UAE", 2, hand), rider("B", "UAE", 2, flat_hand())],
        );
        decide_group(&mut state, &members, &mut || 0.5_f64, &LeadershipTuning::default(), &PaceTuning::default());
        assert_eq!(state.rider("A").unwrap().takes_lead, LeadIntent::None);
        assert!(state.log.iter().any(|l| l.contains("A withdraws") && l.contains("no usable card")));
    }

    #[test]
    fn test_attacker_aims_high() {
        let (state, members) = state_of("33333333333333F", vec![rider("A", "UAE", 0, flat_hand())]);
        let choice = select_pace_value(&state, "A", &members, LeadIntent::Attack, 0.0, &PaceTuning::default());
        assert_eq!(choice.value, 9);
    }

    #[test]
    fn test_rival_pace_suppresses_on_climb() {
        let mut rival = rider("R", "Visma", 0, flat_hand());
        rival.takes_lead = LeadIntent::Pace;
        rival.selected_value = 8;
        let (state, members) = state_of("11111111111111F", vec![rider("A", "UAE", 0, flat_hand()), rival]);
        let choice = select_pace_value(&state, "A", &members, LeadIntent::Pace, 0.5, &PaceTuning::default());
        assert_eq!(choice.value, 0);
        assert_eq!(choice.suppressed_by, Some(8));

        // Open road keeps the value.
        let mut rival = rider("R", "Visma", 0, flat_hand());
        rival.takes_lead = LeadIntent::Pace;
        rival.selected_value = 8;
        let (state, members) = state_of("33333333333333F", vec![rider("A", "UAE", 0, flat_hand()), rival]);
        let choice = select_pace_value(&state, "A", &members, LeadIntent::Pace, 0.5, &PaceTuning::default());
        assert!(choice.value > 0);
    }

    #[test]
    fn test_decide_group_writes_intents() {
        let (mut state, members) = state_of(
            "33333333333333F",
            vec![rider("A", "UAE", 2, flat_hand()), rider("B", "UAE", 2, flat_hand())],
        );
        decide_group(&mut state, &members, &mut || 0.5_f64, &LeadershipTuning::default(), &PaceTuning::default());
        for name in &members {
            let r = state.rider(name).unwrap();
            assert_eq!(r.takes_lead, LeadIntent::Pace);
            assert!(r.selected_value > 0);
        }
        assert!(state.log.iter().any(|l| l.contains("leads")));
    }
}
