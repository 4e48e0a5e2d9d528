//! Race Events
//!
//! Typed record of everything the resolver did. Each event renders to one
//! human-readable log line.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::race::card::Card;
use crate::race::rider::LeadIntent;

/// Race event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RaceEventData {
    /// Race state built from a fixture.
    RaceInitialized {
        riders: u32,
        finish: u32,
        groups: u32,
    },

    /// A new round started.
    RoundStarted {
        groups: u32,
        active: u32,
    },

    /// Leadership estimator output.
    LeadershipDecided {
        rider: String,
        intent: LeadIntent,
        attack_probability: f64,
        pace_probability: f64,
        draw: Option<f64>,
    },

    /// Pace/attack magnitude chosen by a declared leader.
    PaceSelected {
        rider: String,
        value: u32,
        ideal: f64,
    },

    /// Declared lead dropped because no pace value could be chosen.
    LeadWithdrawn {
        rider: String,
        intent: LeadIntent,
        reason: String,
    },

    /// Pace value suppressed below another team's declared pace.
    PaceSuppressed {
        rider: String,
        value: u32,
        rival_pace: u32,
    },

    /// A card was played and the rider moved.
    CardPlayed {
        rider: String,
        card: Card,
        value: u32,
        from: u32,
        to: u32,
    },

    /// Active four held only penalties, a card from deeper in the hand was used.
    PenaltySubstituted {
        rider: String,
        substitute: Card,
    },

    /// No legal card; rider skipped.
    Unplayable {
        rider: String,
        reason: String,
    },

    /// Rider below the group pace caught an already-moved group.
    Caught {
        rider: String,
        position: u32,
    },

    /// Fastest attacker took the bonus field.
    AttackBonus {
        rider: String,
        position: u32,
    },

    /// Fastest attacker was denied the bonus field.
    AttackBonusDenied {
        rider: String,
        reason: String,
    },

    /// Slipstream catch-up after movement.
    PulledForward {
        rider: String,
        from: u32,
        to: u32,
    },

    /// Hand reshuffled from discard.
    Reshuffled {
        rider: String,
        hand: u32,
    },

    /// Overflow rider pushed back by capacity enforcement.
    PushedBack {
        rider: String,
        tile: u32,
        allowed: u32,
    },

    /// Capacity cascade hit its iteration ceiling.
    CapacityStalled {
        group: u32,
        iterations: u32,
    },

    /// Group moved.
    GroupMoved {
        group: u32,
        pace: u32,
        riders: u32,
    },

    /// Requested group has no active riders.
    UnknownGroup {
        group: u32,
    },

    /// Rider crossed the line.
    RiderFinished {
        rider: String,
        position: u32,
    },

    /// Rider placed in the standings.
    Placed {
        placement: u32,
        rider: String,
        team: String,
        time: f64,
        gap: f64,
    },

    /// Leader baseline dropped; standings gaps recomputed.
    BaselineLowered {
        old: Option<f64>,
        new: f64,
    },
}

/// A race event stamped with its round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceEvent {
    /// Round when the event occurred.
    pub round: u32,
    /// Event data.
    pub data: RaceEventData,
}

impl RaceEvent {
    /// Create a new event.
    pub fn new(round: u32, data: RaceEventData) -> Self {
        Self { round, data }
    }

    /// Rider named by this event, if any.
    pub fn rider(&self) -> Option<&str> {
        use RaceEventData::*;
        match &self.data {
            LeadershipDecided { rider, .. }
            | PaceSelected { rider, .. }
            | PaceSuppressed { rider, .. }
            | LeadWithdrawn { rider, .. }
            | CardPlayed { rider, .. }
            | PenaltySubstituted { rider, .. }
            | Unplayable { rider, .. }
            | Caught { rider, .. }
            | AttackBonus { rider, .. }
            | AttackBonusDenied { rider, .. }
            | PulledForward { rider, .. }
            | Reshuffled { rider, .. }
            | PushedBack { rider, .. }
            | RiderFinished { rider, .. }
            | Placed { rider, .. } => Some(rider),
            _ => None,
        }
    }

    /// Is this a warning-level event?
    pub fn is_warning(&self) -> bool {
        matches!(
            self.data,
            RaceEventData::Unplayable { .. }
                | RaceEventData::CapacityStalled { .. }
                | RaceEventData::UnknownGroup { .. }
        )
    }
}

impl fmt::Display for RaceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[r{}] ", self.round)?;
        match &self.data {
            RaceEventData::RaceInitialized { riders, finish, groups } => {
                write!(f, "race initialized: {riders} riders in {groups} groups, finish at {finish}")
            }
            RaceEventData::RoundStarted { groups, active } => {
                write!(f, "round started: {active} active riders in {groups} groups")
            }
            RaceEventData::LeadershipDecided { rider, intent, attack_probability, pace_probability, draw } => {
                let intent = match intent {
                    LeadIntent::None => "sits in",
                    LeadIntent::Pace => "leads",
                    LeadIntent::Attack => "attacks",
                };
                write!(
                    f,
                    "{rider} {intent} (p_attack={attack_probability:.3}, p_pace={pace_probability:.3}"
                )?;
                match draw {
                    Some(r) => write!(f, ", draw={r:.3})"),
                    None => write!(f, ", team holds group)"),
                }
            }
            RaceEventData::PaceSelected { rider, value, ideal } => {
                write!(f, "{rider} selects pace {value} (ideal {ideal:.2})")
            }
            RaceEventData::LeadWithdrawn { rider, intent, reason } => {
                let what = match intent {
                    LeadIntent::Attack => "attack",
                    LeadIntent::Pace => "pace",
                    LeadIntent::None => "no",
                };
                write!(f, "{rider} withdraws {what} lead: {reason}")
            }
            RaceEventData::PaceSuppressed { rider, value, rival_pace } => {
                write!(f, "{rider} pace {value} suppressed, rival pace {rival_pace}")
            }
            RaceEventData::CardPlayed { rider, card, value, from, to } => {
                write!(f, "{rider} plays {card} for {value}: {from} -> {to}")
            }
            RaceEventData::PenaltySubstituted { rider, substitute } => {
                write!(f, "{rider} drew only penalties, plays {substitute} from deeper in the hand")
            }
            RaceEventData::Unplayable { rider, reason } => {
                write!(f, "WARNING {rider} skipped: {reason}")
            }
            RaceEventData::Caught { rider, position } => {
                write!(f, "{rider} catches the group at {position}")
            }
            RaceEventData::AttackBonus { rider, position } => {
                write!(f, "{rider} takes the attack bonus to {position}")
            }
            RaceEventData::AttackBonusDenied { rider, reason } => {
                write!(f, "{rider} denied attack bonus: {reason}")
            }
            RaceEventData::PulledForward { rider, from, to } => {
                write!(f, "{rider} pulled forward {from} -> {to}")
            }
            RaceEventData::Reshuffled { rider, hand } => {
                write!(f, "{rider} reshuffles discard, hand now {hand}")
            }
            RaceEventData::PushedBack { rider, tile, allowed } => {
                write!(f, "{rider} pushed back from {tile} (capacity {allowed})")
            }
            RaceEventData::CapacityStalled { group, iterations } => {
                write!(f, "WARNING capacity for group {group} not stable after {iterations} iterations")
            }
            RaceEventData::GroupMoved { group, pace, riders } => {
                write!(f, "group {group} moved at pace {pace} with {riders} riders")
            }
            RaceEventData::UnknownGroup { group } => {
                write!(f, "WARNING group {group} has no active riders")
            }
            RaceEventData::RiderFinished { rider, position } => {
                write!(f, "{rider} crosses the line at {position}")
            }
            RaceEventData::Placed { placement, rider, team, time, gap } => {
                write!(f, "#{placement} {rider} ({team}) time {time:.2} +{gap:.2}")
            }
            RaceEventData::BaselineLowered { old, new } => match old {
                Some(old) => write!(f, "leader baseline {old:.2} -> {new:.2}"),
                None => write!(f, "leader baseline set to {new:.2}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_round_and_rider() {
        let event = RaceEvent::new(
            4,
            RaceEventData::CardPlayed {
                rider: "Evenepoel".to_string(),
                card: Card::numbered(2, 8, 6),
                value: 8,
                from: 10,
                to: 18,
            },
        );
        assert_eq!(event.to_string(), "[r4] Evenepoel plays #2(8/6) for 8: 10 -> 18");
        assert_eq!(event.rider(), Some("Evenepoel"));
        assert!(!event.is_warning());
    }

    #[test]
    fn test_warnings() {
        let stalled = RaceEvent::new(1, RaceEventData::CapacityStalled { group: 2, iterations: 50 });
        assert!(stalled.is_warning());
        assert!(stalled.to_string().contains("WARNING"));
        assert_eq!(stalled.rider(), None);
    }

    #[test]
    fn test_leadership_line() {
        let event = RaceEvent::new(
            0,
            RaceEventData::LeadershipDecided {
                rider: "A".to_string(),
                intent: LeadIntent::Pace,
                attack_probability: 1.0,
                pace_probability: 1.0,
                draw: None,
            },
        );
        assert!(event.to_string().ends_with("team holds group)"));
    }
}
