//! Capacity Enforcement
//!
//! Caps occupancy on narrow, climb and mixed tiles after a group moves.
//! Overflow riders drop back one field; the scan repeats until stable.

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use crate::core::rng::{RandomSource, shuffle};
use crate::race::events::RaceEventData;
use crate::race::movement::{GroupTurn, TurnEntry};
use crate::race::state::RaceState;
use crate::race::track::Track;

/// Capacity enforcement settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    /// Ceiling on cascade iterations.
    pub max_iterations: u32,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self { max_iterations: 50 }
    }
}

/// What enforcement did to a group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapacityReport {
    /// Allowed occupancy used for the whole group, if any bottleneck was crossed.
    pub allowed: Option<u32>,
    /// Scan passes run.
    pub iterations: u32,
    /// Total single-field push-backs.
    pub pushes: u32,
    /// Ended with no tile over capacity.
    pub converged: bool,
}

/// Allowed occupancy for a fraction of the active field.
#[inline]
pub fn allowed_occupancy(total_active: u32, (num, den): (u32, u32)) -> u32 {
    (total_active * num / den).max(1)
}

/// Smallest allowed occupancy over every bottleneck a mover passed or landed on.
pub fn group_allowance(track: &Track, turn: &GroupTurn, total_active: u32) -> Option<u32> {
    turn.movers()
        .flat_map(|e| (e.start + 1)..=e.end())
        .filter_map(|p| track.terrain_at(p).capacity_fraction())
        .map(|fraction| allowed_occupancy(total_active, fraction))
        .min()
}

fn candidate_key(entry: &TurnEntry, fields_moved: u32) -> (bool, u32, u32, u32) {
    (entry.leader, entry.played_value, entry.prior_speed, fields_moved)
}

/// Enforce tile capacity for the group that just moved.
pub fn enforce(
    state: &mut RaceState,
    turn: &GroupTurn,
    rng: &mut dyn RandomSource,
    config: &CapacityConfig,
) -> CapacityReport {
    let total_active = state.active_count();
    let Some(allowed) = group_allowance(&state.track, turn, total_active) else {
        return CapacityReport { converged: true, ..CapacityReport::default() };
    };
    let mut report = CapacityReport { allowed: Some(allowed), ..CapacityReport::default() };
    let movers: Vec<&TurnEntry> = turn.movers().collect();

    while report.iterations < config.max_iterations {
        report.iterations += 1;

        // Bottleneck tiles holding a mover that is still ahead of its start
        let tiles: BTreeSet<u32> = movers
            .iter()
            .filter_map(|e| state.rider(&e.name).map(|r| (e, r.position)))
            .filter(|(e, pos)| *pos > e.start && state.track.terrain_at(*pos).is_bottleneck())
            .map(|(_, pos)| pos)
            .collect();

        let mut changed = false;
        for &tile in tiles.iter().rev() {
            let mut candidates: Vec<(&TurnEntry, u32)> = movers
                .iter()
                .filter_map(|e| state.rider(&e.name).map(|r| (*e, r.position, r.fields_moved)))
                .filter(|(e, pos, _)| *pos == tile && *pos > e.start)
                .map(|(e, _, moved)| (e, moved))
                .collect();
            let others = state
                .occupants(tile)
                .filter(|r| !candidates.iter().any(|(e, _)| e.name == r.name))
                .count() as u32;
            let slots = allowed.saturating_sub(others) as usize;
            if candidates.len() <= slots {
                continue;
            }

            shuffle(&mut candidates, rng);
            candidates.sort_by(|a, b| candidate_key(b.0, b.1).cmp(&candidate_key(a.0, a.1)));

            for (entry, _) in &candidates[slots..] {
                if let Some(rider) = state.rider_mut(&entry.name) {
                    rider.position -= 1;
                    rider.fields_moved = rider.fields_moved.saturating_sub(1);
                }
                report.pushes += 1;
                changed = true;
                state.push_event(RaceEventData::PushedBack {
                    rider: entry.name.clone(),
                    tile,
                    allowed,
                });
            }
        }

        if !changed {
            report.converged = true;
            break;
        }
    }

    if !report.converged {
        warn!(group = turn.group, iterations = report.iterations, "capacity cascade did not converge");
        state.push_event(RaceEventData::CapacityStalled {
            group: turn.group,
            iterations: report.iterations,
        });
    }
    debug!(group = turn.group, allowed, pushes = report.pushes, iterations = report.iterations, "capacity enforced");
    report
}
