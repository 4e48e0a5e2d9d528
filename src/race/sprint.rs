//! Sprint & Finish Resolver
//!
//! Turns riders past the line into placed standings:
//! 1. provisional time from the unfinished share of the last move
//! 2. floor above riders already timed in other groups
//! 3. normalize the crossing group to its slowest time
//! 4. lower the leader baseline and recompute gaps
//! 5. rank by time, then sprint score

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::core::rng::{RandomSource, shuffle};
use crate::race::deck;
use crate::race::events::RaceEventData;
use crate::race::rider::Rider;
use crate::race::state::{RaceState, Standing};

/// Sprint and timing constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SprintConfig {
    /// Time units per round.
    pub time_scale: f64,
    /// Minimum gap to riders timed in other groups.
    pub cross_group_gap: f64,
    /// Weight of the sprint rating in the sprint score.
    pub sprint_weight: f64,
    /// Weights of the four active cards, best first.
    pub card_weights: [f64; 4],
    /// Score lost per fatigue or penalty card beyond the active four.
    pub exhaustion_weight: f64,
}

impl Default for SprintConfig {
    fn default() -> Self {
        Self {
            time_scale: 100.0,
            cross_group_gap: 2.0,
            sprint_weight: 1.05,
            card_weights: [1.0, 1.0, 0.01, 0.001],
            exhaustion_weight: 1.0,
        }
    }
}

/// Distance of the rider's last move.
///
/// Uses the first usable of: previous position, recorded move distance,
/// last group speed. Falls back to one field.
pub fn last_move_distance(rider: &Rider) -> u32 {
    if let Some(prev) = rider.previous_position.filter(|p| *p < rider.position) {
        return rider.position - prev;
    }
    [rider.move_distance_for_prel, rider.last_group_speed]
        .into_iter()
        .find(|d| *d > 0)
        .unwrap_or(1)
}

/// Raw provisional time: `(round + fraction) * scale`.
pub fn provisional_time(rider: &Rider, round: u32, finish: u32, config: &SprintConfig) -> f64 {
    let distance = last_move_distance(rider);
    let start = rider.position.saturating_sub(distance);
    let fraction = ((f64::from(finish) - f64::from(start)) / f64::from(distance)).clamp(0.0, 1.0);
    (f64::from(round) + fraction) * config.time_scale
}

/// Set every time in a crossing group to the group's slowest.
pub fn normalize_group(times: &mut [f64]) {
    let slowest = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    for t in times.iter_mut() {
        *t = slowest;
    }
}

/// Sprint score of a finisher.
pub fn sprint_score(rider: &Rider, config: &SprintConfig) -> f64 {
    let mut values: Vec<u32> = rider.active_four().iter().map(|c| c.sprint_value()).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));
    let cards: f64 = values
        .iter()
        .zip(config.card_weights.iter())
        .map(|(v, w)| f64::from(*v) * w)
        .sum();
    let exhaustion = deck::exhaustion_beyond_active(&rider.hand, &rider.discard);
    rider.sprint * config.sprint_weight + cards - f64::from(exhaustion) * config.exhaustion_weight
}

fn lower_baseline(state: &mut RaceState, time: f64) {
    let old = state.leader_baseline;
    if old.is_some_and(|b| b <= time) {
        return;
    }
    state.leader_baseline = Some(time);
    for standing in &mut state.standings {
        standing.gap = standing.time - time;
    }
    state.push_event(RaceEventData::BaselineLowered { old, new: time });
}

/// Resolve every unplaced finisher, or only those of `group`.
///
/// Returns the number of riders placed.
pub fn resolve(
    state: &mut RaceState,
    group: Option<u32>,
    rng: &mut dyn RandomSource,
    config: &SprintConfig,
) -> u32 {
    let finish = state.track.finish_index();
    let round = state.round;

    let mut crossing: BTreeMap<u32, Vec<(String, f64)>> = BTreeMap::new();
    for rider in state.riders.values() {
        let eligible = rider.finished
            && rider.provisional_time.is_none()
            && group.map_or(true, |g| rider.group == g);
        if eligible {
            crossing
                .entry(rider.group)
                .or_default()
                .push((rider.name.clone(), provisional_time(rider, round, finish, config)));
        }
    }

    let mut order: Vec<(u32, f64)> = crossing
        .iter()
        .map(|(g, riders)| (*g, riders.iter().map(|r| r.1).fold(f64::INFINITY, f64::min)))
        .collect();
    order.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    let mut placed = 0;
    for (group_id, _) in order {
        let Some(riders) = crossing.remove(&group_id) else { continue };
        placed += resolve_group(state, group_id, riders, rng, config);
    }
    placed
}

fn resolve_group(
    state: &mut RaceState,
    group: u32,
    riders: Vec<(String, f64)>,
    rng: &mut dyn RandomSource,
    config: &SprintConfig,
) -> u32 {
    let outside = state
        .riders
        .values()
        .filter(|r| !riders.iter().any(|(n, _)| *n == r.name))
        .filter_map(|r| r.provisional_time)
        .chain(state.standings.iter().map(|s| s.time))
        .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.min(t))));

    let mut times: Vec<f64> = riders
        .iter()
        .map(|(_, raw)| match outside {
            Some(min) => raw.max(min + config.cross_group_gap),
            None => *raw,
        })
        .collect();
    normalize_group(&mut times);
    let group_time = times.first().copied().unwrap_or(0.0);

    let mut ranked: Vec<(String, f64, f64)> = riders
        .iter()
        .zip(times.iter())
        .filter_map(|((name, _), time)| {
            let rider = state.rider_mut(name)?;
            rider.provisional_time = Some(*time);
            Some((name.clone(), *time, sprint_score(rider, config)))
        })
        .collect();

    lower_baseline(state, group_time);
    let baseline = state.leader_baseline.unwrap_or(group_time);

    // Shuffle first so exact ties fall out fairly, then stable sort
    shuffle(&mut ranked, rng);
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.2.total_cmp(&a.2)));

    let mut placed = 0;
    for (name, time, score) in ranked {
        let Some(rider) = state.riders.remove(&name) else { continue };
        let placement = state.standings.len() as u32 + 1;
        let gap = time - baseline;
        info!(placement, rider = %name, team = %rider.team, time, gap, "rider placed");
        state.standings.push(Standing {
            placement,
            name: name.clone(),
            team: rider.team.clone(),
            group,
            time,
            gap,
            sprint_score: score,
        });
        state.push_event(RaceEventData::Placed {
            placement,
            rider: name,
            team: rider.team,
            time,
            gap,
        });
        placed += 1;
    }
    debug!(group, time = group_time, placed, "crossing group resolved");
    placed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::DeterministicRng;
    use crate::race::card::Card;
    use crate::race::track::Track;
    use proptest::prelude::*;

    fn finisher(name: &str, group: u32, position: u32, distance: u32) -> Rider {
        let mut rider = Rider::new(name, "T");
        rider.group = group;
        rider.position = position;
        rider.move_distance_for_prel = distance;
        rider.finished = true;
        rider.hand = vec![Card::numbered(1, 8, 5), Card::numbered(2, 7, 5), Card::numbered(3, 6, 5), Card::numbered(4, 5, 5)];
        rider
    }

    fn race(riders: Vec<Rider>) -> RaceState {
        let mut state = RaceState::new(Track::parse("11111111F").unwrap(), 0);
        for r in riders {
            state.riders.insert(r.name.clone(), r);
        }
        state
    }

    #[test]
    fn test_two_riders_cross_together() {
        let mut state = race(vec![finisher("A", 1, 10, 3), finisher("B", 1, 11, 4)]);
        let placed = resolve(&mut state, None, &mut DeterministicRng::new(3), &SprintConfig::default());

        assert_eq!(placed, 2);
        assert!(state.riders.is_empty());
        assert_eq!(state.standings.len(), 2);
        assert_eq!(state.standings[0].placement, 1);
        assert_eq!(state.standings[1].placement, 2);
        // Both start from 7: fractions 1/3 and 1/4, slowest sets the group time.
        let expected = 100.0 / 3.0;
        for standing in &state.standings {
            assert!((standing.time - expected).abs() < 1e-9);
            assert!(standing.time < 10000.0);
            assert_eq!(standing.gap, 0.0);
        }
        assert_eq!(state.leader_baseline, Some(state.standings[0].time));
    }

    #[test]
    fn test_distance_sources() {
        let mut rider = finisher("A", 1, 10, 3);
        assert_eq!(last_move_distance(&rider), 3);
        rider.previous_position = Some(5);
        assert_eq!(last_move_distance(&rider), 5);
        rider.previous_position = Some(12);
        assert_eq!(last_move_distance(&rider), 3);
        rider.move_distance_for_prel = 0;
        rider.last_group_speed = 6;
        assert_eq!(last_move_distance(&rider), 6);
        rider.last_group_speed = 0;
        assert_eq!(last_move_distance(&rider), 1);
    }

    #[test]
    fn test_fraction_clamped() {
        let config = SprintConfig::default();
        let mut rider = finisher("A", 1, 30, 2);
        assert_eq!(provisional_time(&rider, 4, 8, &config), 400.0);
        rider.position = 8;
        rider.move_distance_for_prel = 8;
        assert_eq!(provisional_time(&rider, 4, 8, &config), 500.0);
    }

    #[test]
    fn test_sprint_score_breaks_ties() {
        let mut fast = finisher("Fast", 1, 9, 2);
        fast.sprint = 9.0;
        let slow = finisher("Slow", 1, 9, 2);
        let mut state = race(vec![slow, fast]);
        resolve(&mut state, None, &mut DeterministicRng::new(3), &SprintConfig::default());
        assert_eq!(state.standings[0].name, "Fast");
        assert!(state.standings[0].sprint_score > state.standings[1].sprint_score);
    }

    #[test]
    fn test_sprint_score_formula() {
        let mut rider = finisher("A", 1, 9, 2);
        rider.sprint = 10.0;
        rider.hand.insert(2, Card::penalty());
        rider.hand.push(Card::fatigue());
        rider.discard.push(Card::penalty());
        // Active four: 8, 7, penalty, 6 -> 8 + 7 + 6*0.01 + 0*0.001
        let expected = 10.0 * 1.05 + 8.0 + 7.0 + 0.06 - 2.0;
        assert!((sprint_score(&rider, &SprintConfig::default()) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_later_group_floored_above_earlier() {
        let mut state = race(vec![finisher("A", 1, 9, 2)]);
        resolve(&mut state, None, &mut DeterministicRng::new(3), &SprintConfig::default());
        let first = state.standings[0].time;

        // Same round, a faster fraction: must still land behind.
        state.riders.insert("B".to_string(), finisher("B", 2, 12, 8));
        resolve(&mut state, Some(2), &mut DeterministicRng::new(3), &SprintConfig::default());
        let second = &state.standings[1];
        assert!((second.time - (first + 2.0)).abs() < 1e-9);
        assert!((second.gap - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_group_filter() {
        let mut state = race(vec![finisher("A", 1, 9, 2), finisher("B", 2, 9, 2)]);
        let placed = resolve(&mut state, Some(2), &mut DeterministicRng::new(3), &SprintConfig::default());
        assert_eq!(placed, 1);
        assert!(state.riders.contains_key("A"));
        assert_eq!(state.standings[0].name, "B");
    }

    #[test]
    fn test_baseline_drop_recomputes_gaps() {
        let mut state = race(Vec::new());
        state.round = 3;
        state.riders.insert("Late".to_string(), finisher("Late", 1, 9, 2));
        resolve(&mut state, None, &mut DeterministicRng::new(3), &SprintConfig::default());
        assert_eq!(state.standings[0].gap, 0.0);

        // An earlier round resolved later lowers the baseline.
        state.round = 1;
        state.riders.insert("Early".to_string(), finisher("Early", 2, 9, 2));
        let config = SprintConfig { cross_group_gap: -1000.0, ..SprintConfig::default() };
        resolve(&mut state, None, &mut DeterministicRng::new(3), &config);
        assert_eq!(state.leader_baseline, Some(150.0));
        assert!((state.standings[0].gap - 200.0).abs() < 1e-9);
        assert!(state.log.iter().any(|l| l.contains("leader baseline 350.00 -> 150.00")));
    }

    proptest! {
        #[test]
        fn prop_normalization_idempotent(mut times in prop::collection::vec(0.0f64..10_000.0, 1..12)) {
            normalize_group(&mut times);
            let once = times.clone();
            normalize_group(&mut times);
            prop_assert_eq!(once, times);
        }

        #[test]
        fn prop_baseline_never_increases(
            batches in prop::collection::vec((0u32..20, prop::collection::vec(1u32..9, 1..4)), 1..8),
            seed in any::<u64>(),
        ) {
            let mut state = race(Vec::new());
            let mut rng = DeterministicRng::new(seed);
            let mut last: Option<f64> = None;
            let mut id = 0;
            for (group, (round, distances)) in batches.into_iter().enumerate() {
                state.round = round;
                for distance in distances {
                    let name = format!("R{id}");
                    id += 1;
                    state.riders.insert(name.clone(), finisher(&name, group as u32, 8 + distance / 2, distance));
                }
                resolve(&mut state, None, &mut rng, &SprintConfig::default());
                let baseline = state.leader_baseline;
                prop_assert!(baseline.is_some());
                if let (Some(prev), Some(now)) = (last, baseline) {
                    prop_assert!(now <= prev);
                }
                for standing in &state.standings {
                    prop_assert!(standing.gap >= 0.0);
                }
                last = baseline;
            }
        }
    }
}
