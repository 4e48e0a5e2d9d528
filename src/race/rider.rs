//! Rider State
//!
//! One record per rider, keyed by display name in the race state.

use serde::{Serialize, Deserialize};

use crate::core::hash::StateHasher;
use crate::race::card::{Card, CardKind};
use crate::race::deck;

// =============================================================================
// INTENTS
// =============================================================================

/// Attack status carried between turns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AttackStatus {
    /// No attack involvement.
    #[default]
    None = 0,
    /// Rider attacked on its last turn.
    Attacker = 1,
    /// Rider's group was attacked on its last turn.
    WasAttacked = 2,
}

/// Leadership intent for the current turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LeadIntent {
    /// Sits in.
    #[default]
    None = 0,
    /// Sets the group pace.
    Pace = 1,
    /// Declares an attack.
    Attack = 2,
}

impl LeadIntent {
    /// Does this intent count as a declared leader?
    #[inline]
    pub fn is_declared(self) -> bool {
        !matches!(self, LeadIntent::None)
    }
}

/// A card chosen ahead of the turn by a human or an outside planner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlannedCard {
    /// Kind of card to play. Must be in the active four to be reachable.
    pub card: CardKind,
    /// Play it even if it misses a declared leader's target.
    #[serde(default)]
    pub forced: bool,
}

// =============================================================================
// RIDER
// =============================================================================

/// State of a single rider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rider {
    /// Display name, also the key in the race state.
    pub name: String,
    /// Team name.
    pub team: String,

    /// Field index on the track.
    pub position: u32,
    /// Group key. Riders sharing it pace together.
    pub group: u32,

    /// Hand in draw order. The first four are the active four.
    pub hand: Vec<Card>,
    /// Discard pile.
    pub discard: Vec<Card>,
    /// Cards already played.
    #[serde(default)]
    pub spent: Vec<Card>,

    /// Crossed the finish line.
    #[serde(default)]
    pub finished: bool,
    /// Attack status from the last turn.
    #[serde(default)]
    pub attacking_status: AttackStatus,
    /// Chosen pace/attack magnitude. 0 means not leading.
    #[serde(default)]
    pub selected_value: u32,
    /// Leadership intent for this turn.
    #[serde(default)]
    pub takes_lead: LeadIntent,
    /// Pre-planned card for this turn.
    #[serde(default)]
    pub planned: Option<PlannedCard>,
    /// Fatigue score in `[0, 1]`.
    #[serde(default)]
    pub fatigue: f64,

    // =========================================================================
    // Performance attributes
    // =========================================================================

    /// Sprint rating.
    pub sprint: f64,
    /// Climbing rating. Also the top climb value of a standard deck.
    pub climb: f64,
    /// Flat rating. Also the top flat value of a standard deck.
    pub flat: f64,
    /// Appetite for risk, around 5 for an average rider.
    pub mentality: f64,

    // =========================================================================
    // Derived per round
    // =========================================================================

    /// Strength given terrain ahead, gap and fatigue.
    #[serde(default)]
    pub favoritism_score: f64,
    /// Share of the field's win mass.
    #[serde(default)]
    pub win_chance: f64,
    /// Share of the field's sprint mass.
    #[serde(default)]
    pub sprint_chance: f64,

    // =========================================================================
    // Movement memory
    // =========================================================================

    /// Position before the last move.
    #[serde(default)]
    pub previous_position: Option<u32>,
    /// Fields covered by the last move.
    #[serde(default)]
    pub move_distance_for_prel: u32,
    /// Pace of the rider's group on its last turn.
    #[serde(default)]
    pub last_group_speed: u32,
    /// Effective value of the card played last turn.
    #[serde(default)]
    pub played_value: u32,
    /// Fields moved on the last turn, after push-backs.
    #[serde(default)]
    pub fields_moved: u32,
    /// Provisional finish time, once the line is crossed.
    #[serde(default)]
    pub provisional_time: Option<f64>,
}

impl Rider {
    /// Create a rider with an empty hand at the start line.
    pub fn new(name: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            team: team.into(),
            position: 0,
            group: 1,
            hand: Vec::new(),
            discard: Vec::new(),
            spent: Vec::new(),
            finished: false,
            attacking_status: AttackStatus::None,
            selected_value: 0,
            takes_lead: LeadIntent::None,
            planned: None,
            fatigue: 0.0,
            sprint: 5.0,
            climb: 5.0,
            flat: 5.0,
            mentality: 5.0,
            favoritism_score: 0.0,
            win_chance: 0.0,
            sprint_chance: 0.0,
            previous_position: None,
            move_distance_for_prel: 0,
            last_group_speed: 0,
            played_value: 0,
            fields_moved: 0,
            provisional_time: None,
        }
    }

    /// Still racing?
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.finished
    }

    /// The four cards eligible this turn.
    #[inline]
    pub fn active_four(&self) -> &[Card] {
        deck::active_four(&self.hand)
    }

    /// Penalty cards among the active four.
    #[inline]
    pub fn active_penalties(&self) -> u32 {
        deck::penalties_in_active(&self.hand)
    }

    /// Cards across hand, discard and spent piles.
    pub fn card_count(&self) -> usize {
        self.hand.len() + self.discard.len() + self.spent.len()
    }

    /// Reset per-round intent fields.
    pub fn clear_intent(&mut self) {
        self.takes_lead = LeadIntent::None;
        self.selected_value = 0;
        self.fields_moved = 0;
    }

    /// Hash this rider's state for verification.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_str(&self.name);
        hasher.update_str(&self.team);
        hasher.update_u32(self.position);
        hasher.update_u32(self.group);
        for pile in [&self.hand, &self.discard, &self.spent] {
            hasher.update_u32(pile.len() as u32);
            for card in pile {
                hash_card(hasher, card);
            }
        }
        hasher.update_bool(self.finished);
        hasher.update_u8(self.attacking_status as u8);
        hasher.update_u32(self.selected_value);
        hasher.update_u8(self.takes_lead as u8);
        hasher.update_f64(self.fatigue);
        hasher.update_f64(self.favoritism_score);
        hasher.update_f64(self.win_chance);
        hasher.update_f64(self.sprint_chance);
        hasher.update_u32(self.previous_position.map_or(u32::MAX, |p| p));
        hasher.update_u32(self.move_distance_for_prel);
        hasher.update_u32(self.last_group_speed);
        hasher.update_u32(self.played_value);
        hasher.update_u32(self.fields_moved);
        hasher.update_opt_f64(self.provisional_time);
    }
}

fn hash_card(hasher: &mut StateHasher, card: &Card) {
    let (tag, number) = match card.kind {
        CardKind::Numbered(n) => (0, n),
        CardKind::Fatigue => (1, 0),
        CardKind::Penalty => (2, 0),
        CardKind::SyntheticBoost => (3, 0),
    };
    hasher.update_u8(tag);
    hasher.update_u8(number);
    hasher.update_u8(card.flat);
    hasher.update_u8(card.climb);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::compute_state_hash;

    #[test]
    fn test_new_rider_defaults() {
        let rider = Rider::new("Van Aert", "Visma");
        assert!(rider.is_active());
        assert_eq!(rider.takes_lead, LeadIntent::None);
        assert_eq!(rider.attacking_status, AttackStatus::None);
        assert_eq!(rider.card_count(), 0);
        assert!(rider.provisional_time.is_none());
    }

    #[test]
    fn test_intent_declared() {
        assert!(!LeadIntent::None.is_declared());
        assert!(LeadIntent::Pace.is_declared());
        assert!(LeadIntent::Attack.is_declared());
        assert_eq!(LeadIntent::Attack as u8, 2);
    }

    #[test]
    fn test_hash_sees_hand_order() {
        let mut a = Rider::new("A", "T");
        a.hand = vec![Card::numbered(1, 6, 6), Card::fatigue()];
        let mut b = a.clone();
        b.hand.reverse();

        let ha = compute_state_hash(0, |h| a.hash_into(h));
        let hb = compute_state_hash(0, |h| b.hash_into(h));
        assert_ne!(ha, hb);
    }

    #[test]
    fn test_clear_intent() {
        let mut rider = Rider::new("A", "T");
        rider.takes_lead = LeadIntent::Attack;
        rider.selected_value = 9;
        rider.fields_moved = 4;
        rider.attacking_status = AttackStatus::Attacker;
        rider.clear_intent();
        assert_eq!(rider.takes_lead, LeadIntent::None);
        assert_eq!(rider.selected_value, 0);
        assert_eq!(rider.fields_moved, 0);
        // Status survives into the next round.
        assert_eq!(rider.attacking_status, AttackStatus::Attacker);
    }

    #[test]
    fn test_serde_roundtrip_keeps_piles() {
        let mut rider = Rider::new("A", "T");
        rider.hand = vec![Card::penalty(), Card::numbered(4, 7, 5)];
        rider.planned = Some(PlannedCard { card: CardKind::Numbered(4), forced: true });
        let json = serde_json::to_string(&rider).unwrap();
        let back: Rider = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rider);
    }
}
