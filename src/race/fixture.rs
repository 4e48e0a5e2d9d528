//! Fixture Loading
//!
//! Caller-owned race description turned into a fresh `RaceState`.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::rng::{RandomSource, shuffle};
use crate::race::card::{Card, CardKind, standard_deck};
use crate::race::error::RaceError;
use crate::race::rider::{AttackStatus, PlannedCard, Rider};

/// Race snapshot supplied by a collaborator.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Fixture {
    /// Track token string.
    pub track: String,
    /// Starting round.
    #[serde(default)]
    pub round: u32,
    /// Riders keyed by display name.
    pub riders: BTreeMap<String, RiderSeed>,
}

impl Fixture {
    /// Parse a fixture from JSON.
    pub fn from_json(json: &str) -> Result<Self, RaceError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Any subset of rider fields. Missing fields take race-start defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RiderSeed {
    /// Team name.
    pub team: String,
    /// Starting position.
    pub position: u32,
    /// Group key. `None` lets the initializer group by position.
    pub group: Option<u32>,
    /// Hand in draw order.
    pub hand: Vec<Card>,
    /// Discard pile.
    pub discard: Vec<Card>,
    /// Already crossed the line.
    pub finished: bool,
    /// Attack status carried in from a previous round.
    pub attacking_status: AttackStatus,
    /// Pre-planned card.
    pub planned: Option<PlannedCard>,
    /// Sprint rating.
    pub sprint: f64,
    /// Climb rating.
    pub climb: f64,
    /// Flat rating.
    pub flat: f64,
    /// Mentality.
    pub mentality: f64,
    /// Position before the last move.
    pub previous_position: Option<u32>,
    /// Fields covered by the last move.
    pub move_distance_for_prel: u32,
    /// Pace of the rider's group on its last turn.
    pub last_group_speed: u32,
}

impl Default for RiderSeed {
    fn default() -> Self {
        Self {
            team: String::new(),
            position: 0,
            group: None,
            hand: Vec::new(),
            discard: Vec::new(),
            finished: false,
            attacking_status: AttackStatus::None,
            planned: None,
            sprint: 5.0,
            climb: 5.0,
            flat: 5.0,
            mentality: 5.0,
            previous_position: None,
            move_distance_for_prel: 0,
            last_group_speed: 0,
        }
    }
}

impl RiderSeed {
    /// Build a rider record from this seed.
    ///
    /// A seed with no cards at all is dealt a shuffled standard deck.
    pub fn to_rider(&self, name: &str, rng: &mut dyn RandomSource) -> Result<Rider, RaceError> {
        let invalid = |reason: &str| RaceError::InvalidRider {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.trim().is_empty() {
            return Err(invalid("empty name"));
        }
        for (label, value) in [
            ("sprint", self.sprint),
            ("climb", self.climb),
            ("flat", self.flat),
            ("mentality", self.mentality),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(&format!("{label} rating must be a non-negative number")));
            }
        }
        if self.hand.iter().chain(&self.discard).any(|c| c.kind == CardKind::SyntheticBoost) {
            return Err(invalid("synthetic cards cannot be held"));
        }

        let mut rider = Rider::new(name, self.team.clone());
        rider.position = self.position;
        rider.group = self.group.unwrap_or(0);
        rider.finished = self.finished;
        rider.attacking_status = self.attacking_status;
        rider.planned = self.planned;
        rider.sprint = self.sprint;
        rider.climb = self.climb;
        rider.flat = self.flat;
        rider.mentality = self.mentality;
        rider.previous_position = self.previous_position;
        rider.move_distance_for_prel = self.move_distance_for_prel;
        rider.last_group_speed = self.last_group_speed;

        if self.hand.is_empty() && self.discard.is_empty() {
            let mut deck = standard_deck(self.flat, self.climb);
            shuffle(&mut deck, rng);
            rider.hand = deck;
        } else {
            rider.hand = self.hand.clone();
            rider.discard = self.discard.clone();
        }
        Ok(rider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::DeterministicRng;

    #[test]
    fn test_from_json_with_defaults() {
        let fixture = Fixture::from_json(
            r#"{
                "track": "3333F",
                "riders": {
                    "Pogacar": { "team": "UAE", "climb": 9.0 },
                    "Pedersen": { "team": "Lidl", "position": 2, "group": 1 }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(fixture.round, 0);
        let seed = &fixture.riders["Pogacar"];
        assert_eq!(seed.climb, 9.0);
        assert_eq!(seed.flat, 5.0);
        assert!(seed.group.is_none());
        assert_eq!(fixture.riders["Pedersen"].group, Some(1));
    }

    #[test]
    fn test_bad_json_is_error() {
        assert!(matches!(Fixture::from_json("{\"track\": 3}"), Err(RaceError::Json(_))));
    }

    #[test]
    fn test_empty_piles_get_standard_deck() {
        let seed = RiderSeed { team: "T".to_string(), flat: 7.0, ..RiderSeed::default() };
        let mut rng = DeterministicRng::new(11);
        let rider = seed.to_rider("A", &mut rng).unwrap();
        assert_eq!(rider.hand.len(), 15);
        let mut numbers: Vec<u8> = rider.hand.iter().filter_map(|c| c.number()).collect();
        numbers.sort();
        assert_eq!(numbers, (1..=15).collect::<Vec<u8>>());
    }

    #[test]
    fn test_explicit_hand_is_copied() {
        let seed = RiderSeed {
            hand: vec![Card::penalty(), Card::numbered(4, 6, 6)],
            ..RiderSeed::default()
        };
        let rider = seed.to_rider("A", &mut || 0.0_f64).unwrap();
        assert_eq!(rider.hand, seed.hand);
        assert!(rider.discard.is_empty());
    }

    #[test]
    fn test_invalid_ratings_rejected() {
        let seed = RiderSeed { sprint: f64::NAN, ..RiderSeed::default() };
        let err = seed.to_rider("A", &mut || 0.0_f64).unwrap_err();
        assert!(matches!(err, RaceError::InvalidRider { .. }));

        let seed = RiderSeed {
            hand: vec![Card { kind: CardKind::SyntheticBoost, flat: 2, climb: 2 }],
            ..RiderSeed::default()
        };
        assert!(seed.to_rider("A", &mut || 0.0_f64).is_err());
    }
}
