//! Race State Definitions
//!
//! The snapshot handed between entry points.
//! Uses BTreeMap for deterministic iteration order.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::hash::{StateHash, compute_state_hash};
use crate::race::events::{RaceEvent, RaceEventData};
use crate::race::rider::Rider;
use crate::race::track::Track;

// =============================================================================
// STANDINGS
// =============================================================================

/// One placed finisher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    /// Overall placement, 1-based.
    pub placement: u32,
    /// Rider name.
    pub name: String,
    /// Team name.
    pub team: String,
    /// Group the rider crossed with.
    pub group: u32,
    /// Normalized provisional time.
    pub time: f64,
    /// Gap to the leader baseline.
    pub gap: f64,
    /// Sprint score used for ranking inside the crossing group.
    pub sprint_score: f64,
}

/// Where a group ended up this round. Later groups can catch it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMove {
    /// Group key.
    pub group: u32,
    /// Furthest position reached by the group.
    pub position: u32,
    /// Pace the group moved at.
    pub pace: u32,
    /// Round the move happened in.
    #[serde(default)]
    pub round: u32,
}

// =============================================================================
// RACE STATE
// =============================================================================

/// Complete state of a race.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RaceState {
    /// Parsed track.
    pub track: Track,

    /// Current round.
    pub round: u32,

    /// Riders still in the race, keyed by name.
    pub riders: BTreeMap<String, Rider>,

    /// Append-only human-readable log.
    pub log: Vec<String>,

    /// Placed finishers in placement order.
    #[serde(default)]
    pub standings: Vec<Standing>,

    /// Best finishing time so far. Never increases.
    #[serde(default)]
    pub leader_baseline: Option<f64>,

    /// Groups already moved this round.
    #[serde(default)]
    pub round_moves: Vec<GroupMove>,

    /// Events generated by the current call (drained into the result).
    #[serde(skip)]
    pub pending_events: Vec<RaceEvent>,
}

impl RaceState {
    /// Create an empty race on a track.
    pub fn new(track: Track, round: u32) -> Self {
        Self {
            track,
            round,
            riders: BTreeMap::new(),
            log: Vec::new(),
            standings: Vec::new(),
            leader_baseline: None,
            round_moves: Vec::new(),
            pending_events: Vec::new(),
        }
    }

    /// Get a rider by name.
    pub fn rider(&self, name: &str) -> Option<&Rider> {
        self.riders.get(name)
    }

    /// Get a rider mutably by name.
    pub fn rider_mut(&mut self, name: &str) -> Option<&mut Rider> {
        self.riders.get_mut(name)
    }

    /// Riders that have not crossed the line.
    pub fn active_riders(&self) -> impl Iterator<Item = &Rider> {
        self.riders.values().filter(|r| r.is_active())
    }

    /// Number of riders that have not crossed the line.
    pub fn active_count(&self) -> u32 {
        self.active_riders().count() as u32
    }

    /// Position of the front of the race.
    pub fn leader_position(&self) -> u32 {
        self.active_riders().map(|r| r.position).max().unwrap_or(0)
    }

    /// Active riders of a group, front first then by name.
    pub fn group_members(&self, group: u32) -> Vec<String> {
        let mut members: Vec<&Rider> = self
            .active_riders()
            .filter(|r| r.group == group)
            .collect();
        members.sort_by(|a, b| b.position.cmp(&a.position).then_with(|| a.name.cmp(&b.name)));
        members.into_iter().map(|r| r.name.clone()).collect()
    }

    /// Groups with active riders, front of the race first.
    pub fn group_order(&self) -> Vec<u32> {
        let mut fronts: BTreeMap<u32, u32> = BTreeMap::new();
        for rider in self.active_riders() {
            let front = fronts.entry(rider.group).or_insert(rider.position);
            *front = (*front).max(rider.position);
        }
        let mut groups: Vec<(u32, u32)> = fronts.into_iter().collect();
        groups.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        groups.into_iter().map(|(group, _)| group).collect()
    }

    /// Active riders standing on a tile.
    pub fn occupants(&self, position: u32) -> impl Iterator<Item = &Rider> {
        self.active_riders().filter(move |r| r.position == position)
    }

    /// Reassign groups by position. Group 1 is the front.
    ///
    /// Finished riders keep their group so a pending sprint can still find them.
    pub fn regroup(&mut self) {
        let positions: BTreeSet<u32> = self.active_riders().map(|r| r.position).collect();
        let group_of: BTreeMap<u32, u32> = positions
            .iter()
            .rev()
            .enumerate()
            .map(|(i, pos)| (*pos, i as u32 + 1))
            .collect();
        for rider in self.riders.values_mut().filter(|r| r.is_active()) {
            if let Some(group) = group_of.get(&rider.position) {
                rider.group = *group;
            }
        }
    }

    /// Record an event: appended to the log and to the pending events.
    pub fn push_event(&mut self, data: RaceEventData) {
        let event = RaceEvent::new(self.round, data);
        self.log.push(event.to_string());
        self.pending_events.push(event);
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<RaceEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Compute hash of current state for verification.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.round, |hasher| {
            hasher.update_str(&self.track.to_string());

            // Riders in key order (BTreeMap guarantees this)
            hasher.update_u32(self.riders.len() as u32);
            for rider in self.riders.values() {
                rider.hash_into(hasher);
            }

            hasher.update_u32(self.standings.len() as u32);
            for standing in &self.standings {
                hasher.update_u32(standing.placement);
                hasher.update_str(&standing.name);
                hasher.update_f64(standing.time);
                hasher.update_f64(standing.gap);
                hasher.update_f64(standing.sprint_score);
            }

            hasher.update_opt_f64(self.leader_baseline);
            for moved in &self.round_moves {
                hasher.update_u32(moved.group);
                hasher.update_u32(moved.position);
                hasher.update_u32(moved.pace);
                hasher.update_u32(moved.round);
            }
            hasher.update_u64(self.log.len() as u64);
        })
    }

    /// Log the current hash at debug level.
    pub fn trace_hash(&self, stage: &str) {
        debug!(stage, round = self.round, hash = %hex::encode(self.compute_hash()), "race state");
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(positions: &[(&str, u32)]) -> RaceState {
        let mut state = RaceState::new(Track::parse("3333333333F").unwrap(), 0);
        for (name, pos) in positions {
            let mut rider = Rider::new(*name, "T");
            rider.position = *pos;
            state.riders.insert(name.to_string(), rider);
        }
        state
    }

    #[test]
    fn test_regroup_front_is_one() {
        let mut state = state_with(&[("A", 4), ("B", 7), ("C", 4), ("D", 1)]);
        state.regroup();
        assert_eq!(state.rider("B").unwrap().group, 1);
        assert_eq!(state.rider("A").unwrap().group, 2);
        assert_eq!(state.rider("C").unwrap().group, 2);
        assert_eq!(state.rider("D").unwrap().group, 3);
        assert_eq!(state.group_order(), vec![1, 2, 3]);
    }

    #[test]
    fn test_group_members_order() {
        let mut state = state_with(&[("Z", 4), ("A", 4), ("M", 5)]);
        for rider in state.riders.values_mut() {
            rider.group = 1;
        }
        assert_eq!(state.group_members(1), vec!["M", "A", "Z"]);
        assert!(state.group_members(9).is_empty());
    }

    #[test]
    fn test_finished_riders_not_active() {
        let mut state = state_with(&[("A", 4), ("B", 11)]);
        state.rider_mut("B").unwrap().finished = true;
        assert_eq!(state.active_count(), 1);
        assert_eq!(state.leader_position(), 4);
        assert_eq!(state.occupants(11).count(), 0);
    }

    #[test]
    fn test_push_event_logs() {
        let mut state = state_with(&[("A", 0)]);
        state.push_event(RaceEventData::UnknownGroup { group: 3 });
        assert_eq!(state.log.len(), 1);
        assert!(state.log[0].contains("group 3"));
        let events = state.take_events();
        assert_eq!(events.len(), 1);
        assert!(state.pending_events.is_empty());
        assert_eq!(state.log.len(), 1);
    }

    #[test]
    fn test_hash_tracks_positions() {
        let a = state_with(&[("A", 2), ("B", 3)]);
        let mut b = a.clone();
        assert_eq!(a.compute_hash(), b.compute_hash());
        b.rider_mut("A").unwrap().position = 3;
        assert_ne!(a.compute_hash(), b.compute_hash());
    }
}
