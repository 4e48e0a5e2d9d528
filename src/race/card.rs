//! Card Definitions
//!
//! Typed cards carried in a rider's hand, discard and spent piles.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::race::track::SlipstreamClass;

/// Number of numbered cards in a fresh deck (numbers 1..=15).
pub const DECK_SIZE: u8 = 15;

/// Flat and climb value of a fatigue card.
pub const FATIGUE_VALUE: u8 = 2;

/// Value guaranteed by the synthetic boost card.
pub const SYNTHETIC_BOOST_VALUE: u8 = 2;

/// Lowest value a numbered card in a standard deck can carry.
const MIN_NUMBERED_VALUE: u8 = 3;

/// What kind of card this is.
///
/// Lower numbers are stronger efforts; card 1 is a rider's best card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    /// Face value card 1..=15.
    Numbered(u8),
    /// Exhaustion card, neutral on both terrains.
    Fatigue,
    /// Dead draw. Never played, subtracts from played value while in the active four.
    Penalty,
    /// Minimum-guarantee card, exists only during selection.
    SyntheticBoost,
}

/// A single card with its terrain values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    /// Card kind.
    pub kind: CardKind,
    /// Value on open terrain.
    pub flat: u8,
    /// Value on climbs.
    pub climb: u8,
}

impl Card {
    /// Numbered card with explicit values.
    pub const fn numbered(number: u8, flat: u8, climb: u8) -> Self {
        Self { kind: CardKind::Numbered(number), flat, climb }
    }

    /// Fatigue card.
    pub const fn fatigue() -> Self {
        Self { kind: CardKind::Fatigue, flat: FATIGUE_VALUE, climb: FATIGUE_VALUE }
    }

    /// Penalty card.
    pub const fn penalty() -> Self {
        Self { kind: CardKind::Penalty, flat: 0, climb: 0 }
    }

    /// Synthetic minimum-guarantee card.
    pub const fn synthetic_boost() -> Self {
        Self {
            kind: CardKind::SyntheticBoost,
            flat: SYNTHETIC_BOOST_VALUE,
            climb: SYNTHETIC_BOOST_VALUE,
        }
    }

    /// Is this a penalty card?
    #[inline]
    pub const fn is_penalty(self) -> bool {
        matches!(self.kind, CardKind::Penalty)
    }

    /// Is this a fatigue card?
    #[inline]
    pub const fn is_fatigue(self) -> bool {
        matches!(self.kind, CardKind::Fatigue)
    }

    /// Face number, if numbered.
    pub fn number(self) -> Option<u8> {
        match self.kind {
            CardKind::Numbered(n) => Some(n),
            _ => None,
        }
    }

    /// Rank used by greedy selection. Higher means weaker, so cheaper to spend.
    pub fn greedy_rank(self) -> u8 {
        match self.kind {
            CardKind::Penalty => 0,
            CardKind::Numbered(n) => n,
            CardKind::Fatigue => DECK_SIZE + 1,
            CardKind::SyntheticBoost => DECK_SIZE + 2,
        }
    }

    /// Raw value on terrain of the given slipstream class.
    pub fn value_for(self, class: SlipstreamClass) -> u32 {
        let flat = u32::from(self.flat);
        let climb = u32::from(self.climb);
        match class {
            SlipstreamClass::Narrow | SlipstreamClass::Climb => climb,
            SlipstreamClass::Mixed => (flat + climb) / 2,
            SlipstreamClass::Open => flat,
        }
    }

    /// Value counted in a sprint.
    pub fn sprint_value(self) -> u32 {
        if self.is_penalty() {
            0
        } else {
            u32::from(self.flat)
        }
    }

    /// What this card becomes when discarded. Penalties turn into fatigue.
    pub fn discarded(self) -> Self {
        if self.is_penalty() {
            Self::fatigue()
        } else {
            self
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CardKind::Numbered(n) => write!(f, "#{}({}/{})", n, self.flat, self.climb),
            CardKind::Fatigue => write!(f, "fatigue"),
            CardKind::Penalty => write!(f, "penalty"),
            CardKind::SyntheticBoost => write!(f, "boost"),
        }
    }
}

/// Convert a rating to a top card value.
fn rating_to_value(rating: f64) -> u8 {
    if !rating.is_finite() {
        return MIN_NUMBERED_VALUE;
    }
    rating.round().clamp(f64::from(MIN_NUMBERED_VALUE), 15.0) as u8
}

/// Build the standard fifteen-card deck for a rider's flat/climb ratings.
///
/// Cards 1-3 carry the full rating, each following block of three drops by one,
/// never below three. Returned in number order; shuffle before use.
pub fn standard_deck(flat_rating: f64, climb_rating: f64) -> Vec<Card> {
    let flat_top = rating_to_value(flat_rating);
    let climb_top = rating_to_value(climb_rating);

    (1..=DECK_SIZE)
        .map(|n| {
            let drop = (n - 1) / 3;
            Card::numbered(
                n,
                flat_top.saturating_sub(drop).max(MIN_NUMBERED_VALUE),
                climb_top.saturating_sub(drop).max(MIN_NUMBERED_VALUE),
            )
        })
        .collect()
}
